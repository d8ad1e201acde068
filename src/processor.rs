//! End-to-end processing of one burst event.
//!
//! [`BurstProcessor::process`] runs the whole per-event pipeline synchronously:
//!
//! 1. validate the event (primary port, every payload length) before touching state
//! 2. resolve the device state, creating it on first contact
//! 3. estimate one ToF per receiving port and update the ToF/velocity matrices
//! 4. recompute the cardinal velocity stages
//! 5. assemble the output record
//!
//! A degenerate burst on one port skips that pair only; the remaining ports of the
//! event are still processed and the record is still emitted. The processor is
//! `Sync` and can be shared across transport threads: per-device state is locked per
//! device, and the annotation limiter and statistics are atomic.

use crate::config::AnemometerConfig;
use crate::device::{DeviceRegistry, DeviceState};
use crate::dsp::tof::{Calibration, TofEstimate, TofEstimator};
use crate::error::AppResult;
use crate::geometry::Geometry;
use crate::output::{OutputAssembler, OutputRecord, TofMeasure};
use crate::transport::{BurstFrame, ChirpEvent, PortBurst};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info_span, warn};

/// Running counters of a processor.
#[derive(Debug, Default)]
pub struct ProcessorStats {
    bursts: AtomicU64,
    tofs: AtomicU64,
    degenerate: AtomicU64,
    malformed: AtomicU64,
    stale_reciprocal: AtomicU64,
}

/// Point-in-time copy of [`ProcessorStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Events fully processed
    pub bursts: u64,
    /// ToF estimates written into device state
    pub tofs: u64,
    /// Per-port estimates skipped as degenerate
    pub degenerate: u64,
    /// Events rejected before processing
    pub malformed: u64,
    /// Path velocities computed from a stale reciprocal ToF
    pub stale_reciprocal: u64,
}

impl ProcessorStats {
    /// Copy the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bursts: self.bursts.load(Ordering::Relaxed),
            tofs: self.tofs.load(Ordering::Relaxed),
            degenerate: self.degenerate.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            stale_reciprocal: self.stale_reciprocal.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Per-burst pipeline over a shared device registry.
pub struct BurstProcessor {
    geometry: Arc<Geometry>,
    registry: DeviceRegistry,
    estimator: TofEstimator,
    assembler: OutputAssembler,
    stats: ProcessorStats,
    stale_after_bursts: u64,
    dump_bursts: bool,
}

impl BurstProcessor {
    /// Validate the configuration and build the geometry.
    ///
    /// Configuration and geometry invariant violations are returned here and are
    /// never raised per event.
    pub fn new(config: &AnemometerConfig) -> AppResult<Self> {
        config.validate()?;
        let geometry = Arc::new(Geometry::from_config(&config.geometry)?);
        Ok(Self {
            registry: DeviceRegistry::new(Arc::clone(&geometry)),
            geometry,
            estimator: TofEstimator::new(&config.estimator),
            assembler: OutputAssembler::new(config.output.notify_interval),
            stats: ProcessorStats::default(),
            stale_after_bursts: config.output.stale_after_bursts,
            dump_bursts: config.output.dump_bursts,
        })
    }

    /// Replace the output assembler, e.g. to control the annotation clock.
    pub fn with_assembler(mut self, assembler: OutputAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    /// Process one event into one output record.
    ///
    /// Malformed events are rejected without touching device state.
    pub fn process(&self, event: &ChirpEvent) -> AppResult<OutputRecord> {
        let span = info_span!(
            "burst",
            device = %event.device_id,
            seq = event.seqno,
            primary = event.primary
        );
        let _enter = span.enter();

        let frame = event.frame().inspect_err(|err| {
            ProcessorStats::bump(&self.stats.malformed);
            warn!(error = %err, "Dropping malformed burst");
        })?;

        let handle = self.registry.resolve(&event.device_id);
        let mut state = handle.lock();
        let tofs = self.update_pairs(event, &frame, &mut state);
        let velocity = state.complete_burst(&self.geometry);
        drop(state);

        ProcessorStats::bump(&self.stats.bursts);
        Ok(self.assembler.assemble(event, tofs, velocity))
    }

    fn update_pairs(
        &self,
        event: &ChirpEvent,
        frame: &BurstFrame,
        state: &mut DeviceState,
    ) -> Vec<TofMeasure> {
        let tx = self.geometry.index_of_port(frame.primary);
        let mut tofs = Vec::with_capacity(frame.ports.len() - 1);

        for (set, burst) in frame.receivers() {
            let calibration = Calibration {
                sample_freq_factor: burst.sample_freq_factor,
                cal_resolution: event.cal_resolution[set],
                cal_pulse_width_ns: event.cal_pulse_width,
            };

            let estimate = match self.estimator.estimate(&burst.samples, &calibration) {
                Ok(estimate) => estimate,
                Err(reason) => {
                    ProcessorStats::bump(&self.stats.degenerate);
                    warn!(port = set, %reason, "Skipping degenerate burst, keeping previous ToF");
                    continue;
                }
            };
            if self.dump_bursts {
                dump_burst(set, burst, &estimate);
            }

            let rx = self.geometry.index_of_port(set);
            let update = state.record_tof(
                &self.geometry,
                tx,
                rx,
                estimate.tof_us(),
                self.stale_after_bursts,
            );
            ProcessorStats::bump(&self.stats.tofs);
            if update.stale_reciprocal {
                ProcessorStats::bump(&self.stats.stale_reciprocal);
                debug!(tx, rx, velocity = update.velocity, "Path velocity used a stale reciprocal ToF");
            }

            tofs.push(TofMeasure {
                src: frame.primary,
                dst: set,
                tof_seconds: estimate.tof_seconds,
            });
        }
        tofs
    }

    /// Geometry shared by every device.
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Registry of every device seen so far.
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Running counters.
    pub fn stats(&self) -> &ProcessorStats {
        &self.stats
    }
}

fn dump_burst(port: usize, burst: &PortBurst, estimate: &TofEstimate) {
    let diagnostics = &estimate.diagnostics;
    debug!(
        port,
        lerp_index = diagnostics.crossing.lerp_index,
        sample_freq_factor = burst.sample_freq_factor,
        frequency = diagnostics.frequency,
        tof_us = estimate.tof_us(),
        intensity = burst.intensity,
        chip_estimate = burst.tof_estimate,
        coarse_tof_us = diagnostics.coarse_tof_us,
        "Burst estimate"
    );
    for (i, (sample, magnitude)) in burst
        .samples
        .iter()
        .zip(diagnostics.magnitudes.iter())
        .enumerate()
    {
        debug!(
            "[{:2}] {:6} + {:6}i ({:.2})",
            i, sample.im, sample.re, magnitude
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceId;
    use crate::error::AnemometerError;
    use crate::transport::synthetic::{encode_payload, samples_from_magnitudes, EventBuilder};
    use crate::transport::{PAYLOAD_LEN, SAMPLES_PER_BURST};
    use tracing_test::traced_test;

    /// Crosses half of its 200 peak between samples 5 and 6 at 5.5.
    const RAMP: [i16; SAMPLES_PER_BURST] = [
        40, 50, 60, 70, 80, 90, 110, 120, 130, 140, 150, 160, 170, 180, 190, 200,
    ];

    fn processor() -> BurstProcessor {
        BurstProcessor::new(&AnemometerConfig::default()).unwrap()
    }

    fn ramp_payload() -> Vec<u8> {
        encode_payload(2048, &samples_from_magnitudes(&RAMP))
    }

    #[test]
    fn test_self_pair_is_skipped() {
        let processor = processor();
        let event = EventBuilder::new("AA:BB").event(1, 2, |_| ramp_payload());
        let record = processor.process(&event).unwrap();

        assert_eq!(record.tofs.len(), 3);
        assert!(record.tofs.iter().all(|t| t.src == 2 && t.dst != 2));
        assert!(record.tofs.iter().all(|t| t.tof_seconds == 12.0));
    }

    #[test]
    fn test_tof_lands_in_mapped_matrix_cell() {
        let processor = processor();
        let event = EventBuilder::new("AA:BB").event(1, 0, |_| ramp_payload());
        processor.process(&event).unwrap();

        let state = processor.registry().get(&DeviceId::from("AA:BB")).unwrap();
        let state = state.lock();
        // port 0 -> index 1, port 1 -> index 3
        assert_eq!(state.tof_us()[(1, 3)], 12.0e6);
        assert_eq!(state.tof_us()[(3, 1)], 174.92);
        assert_eq!(state.sample_count(), 1);
    }

    #[test]
    fn test_malformed_event_leaves_state_untouched() {
        let processor = processor();
        let event = EventBuilder::new("AA:BB").event(1, 0, |port| {
            if port == 3 {
                vec![0u8; 12]
            } else {
                ramp_payload()
            }
        });

        let err = processor.process(&event).unwrap_err();
        assert!(matches!(err, AnemometerError::MalformedPayload { port: 3, .. }));
        assert!(processor.registry().is_empty());
        assert_eq!(processor.stats().snapshot().malformed, 1);
        assert_eq!(processor.stats().snapshot().bursts, 0);
    }

    #[test]
    fn test_invalid_primary_rejected() {
        let processor = processor();
        let event = EventBuilder::new("AA:BB").event(1, 4, |_| ramp_payload());
        assert!(matches!(
            processor.process(&event),
            Err(AnemometerError::InvalidPrimary(4))
        ));
    }

    #[traced_test]
    #[test]
    fn test_degenerate_port_is_skipped_and_logged() {
        let processor = processor();
        let event = EventBuilder::new("AA:BB").event(1, 0, |port| {
            if port == 2 {
                vec![0u8; PAYLOAD_LEN]
            } else {
                ramp_payload()
            }
        });

        let record = processor.process(&event).unwrap();
        let dsts: Vec<usize> = record.tofs.iter().map(|t| t.dst).collect();
        assert_eq!(dsts, vec![1, 3]);

        let state = processor.registry().get(&DeviceId::from("AA:BB")).unwrap();
        // port 0 -> 1, port 2 -> 0: previous value kept
        assert_eq!(state.lock().tof_us()[(1, 0)], 174.92);

        let stats = processor.stats().snapshot();
        assert_eq!(stats.degenerate, 1);
        assert_eq!(stats.tofs, 2);
        assert!(logs_contain("Skipping degenerate burst"));
    }

    #[test]
    fn test_each_receiver_uses_its_own_calibration() {
        let processor = processor();
        // primary port 0 carries a resolution that no receiver may pick up
        let event = EventBuilder::new("AA:BB")
            .with_port_calibration([16, 2, 4, 8])
            .event(1, 0, |_| ramp_payload());
        let record = processor.process(&event).unwrap();

        // (5.5 - 4) / cal_resolution * 8
        let tofs: Vec<(usize, f64)> = record.tofs.iter().map(|t| (t.dst, t.tof_seconds)).collect();
        assert_eq!(tofs, vec![(1, 6.0), (2, 3.0), (3, 1.5)]);
    }

    #[traced_test]
    #[test]
    fn test_burst_dump_logs_chip_diagnostics() {
        let mut config = AnemometerConfig::default();
        config.output.dump_bursts = true;
        let processor = BurstProcessor::new(&config).unwrap();

        let mut payload = ramp_payload();
        payload[2..4].copy_from_slice(&321u16.to_le_bytes());
        payload[4..6].copy_from_slice(&777u16.to_le_bytes());
        let event = EventBuilder::new("AA:BB").event(1, 0, |_| payload.clone());
        processor.process(&event).unwrap();

        assert!(logs_contain("Burst estimate"));
        assert!(logs_contain("chip_estimate=321"));
        assert!(logs_contain("intensity=777"));
        assert!(logs_contain("lerp_index=5.5"));
        assert!(logs_contain("[ 0]"));
        assert!(logs_contain("[15]"));
    }

    #[traced_test]
    #[test]
    fn test_burst_dump_disabled_by_default() {
        let processor = processor();
        let event = EventBuilder::new("AA:BB").event(1, 0, |_| ramp_payload());
        processor.process(&event).unwrap();
        assert!(!logs_contain("Burst estimate"));
    }

    #[test]
    fn test_first_contact_counts_stale_reciprocals() {
        let processor = processor();
        let event = EventBuilder::new("AA:BB").event(1, 0, |_| ramp_payload());
        processor.process(&event).unwrap();
        assert_eq!(processor.stats().snapshot().stale_reciprocal, 3);
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let mut config = AnemometerConfig::default();
        config.geometry.port_to_index = [0, 1, 1, 3];
        let err = BurstProcessor::new(&config).err().unwrap();
        assert!(!err.is_recoverable());
    }
}
