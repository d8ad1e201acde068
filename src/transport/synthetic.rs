//! Synthetic chirp payloads.
//!
//! Used by the `simulate` command, the benchmarks and the tests to produce bursts with
//! a known half-maximum crossing without real hardware.

use super::event::{ChirpEvent, IqSample, PAYLOAD_LEN, SAMPLES_PER_BURST};
use crate::device::DeviceId;
use crate::geometry::TRANSDUCERS;
use bytes::BufMut;
use chrono::{DateTime, Utc};
use rand::Rng;

/// Encode a port payload in the transport's wire layout.
pub fn encode_payload(sample_freq_factor: u16, samples: &[IqSample; SAMPLES_PER_BURST]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(PAYLOAD_LEN);
    buf.put_u16_le(sample_freq_factor);
    buf.put_u16_le(0); // chip estimate
    buf.put_u16_le(0); // intensity
    for sample in samples {
        buf.put_i16_le(sample.im);
        buf.put_i16_le(sample.re);
    }
    buf
}

/// Samples on the in-phase axis with the given linear magnitudes.
pub fn samples_from_magnitudes(magnitudes: &[i16; SAMPLES_PER_BURST]) -> [IqSample; SAMPLES_PER_BURST] {
    let mut samples = [IqSample::new(0, 0); SAMPLES_PER_BURST];
    for (sample, &m) in samples.iter_mut().zip(magnitudes) {
        *sample = IqSample::new(m, 0);
    }
    samples
}

/// Rising chirp envelope whose magnitude crosses half of `amplitude` at `crossing`.
///
/// The envelope is a logistic step rotated by `phase` radians, which is close to what
/// the matched filter on the chip returns for a clean path.
pub fn chirp_envelope(crossing: f64, amplitude: f64, phase: f64) -> [IqSample; SAMPLES_PER_BURST] {
    let mut samples = [IqSample::new(0, 0); SAMPLES_PER_BURST];
    for (i, sample) in samples.iter_mut().enumerate() {
        let magnitude = amplitude / (1.0 + (-(i as f64 - crossing) * 3.0).exp());
        *sample = IqSample::new(
            (magnitude * phase.cos()).round() as i16,
            (magnitude * phase.sin()).round() as i16,
        );
    }
    samples
}

/// Builder for events from one synthetic device.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    device_id: DeviceId,
    build: u32,
    cal_resolution: [u32; TRANSDUCERS],
    cal_pulse_width: u32,
    timestamp: Option<DateTime<Utc>>,
}

impl EventBuilder {
    /// Events for `device_id` with unit calibration (`cal_resolution = 1`, 1000 ns pulse).
    pub fn new(device_id: impl Into<DeviceId>) -> Self {
        Self {
            device_id: device_id.into(),
            build: 1,
            cal_resolution: [1; TRANSDUCERS],
            cal_pulse_width: 1000,
            timestamp: None,
        }
    }

    /// Firmware build number to report.
    pub fn with_build(mut self, build: u32) -> Self {
        self.build = build;
        self
    }

    /// Calibration scalars to report.
    pub fn with_calibration(mut self, cal_resolution: u32, cal_pulse_width: u32) -> Self {
        self.cal_resolution = [cal_resolution; TRANSDUCERS];
        self.cal_pulse_width = cal_pulse_width;
        self
    }

    /// Per-port calibration resolution, keeping the pulse width.
    pub fn with_port_calibration(mut self, cal_resolution: [u32; TRANSDUCERS]) -> Self {
        self.cal_resolution = cal_resolution;
        self
    }

    /// Fixed delivery timestamp instead of `Utc::now()`.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Event where every port carries the payload returned by `payload(port)`.
    pub fn event(&self, seqno: u32, primary: u8, mut payload: impl FnMut(usize) -> Vec<u8>) -> ChirpEvent {
        ChirpEvent {
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            device_id: self.device_id.clone(),
            build: self.build,
            seqno,
            primary,
            cal_resolution: self.cal_resolution,
            cal_pulse_width: self.cal_pulse_width,
            ports: [payload(0), payload(1), payload(2), payload(3)],
        }
    }
}

/// Random but physically plausible event for the `simulate` command.
///
/// The half-max crossing is placed so that, with a count offset of -4 and the
/// reported calibration, the estimated ToF lands near the still-air value with a
/// little wind-induced jitter.
pub fn random_event<R: Rng>(
    rng: &mut R,
    device_id: &DeviceId,
    seqno: u32,
    primary: u8,
) -> ChirpEvent {
    // freq = 2048/2048 * 201143 / (1000/1000); (8.4 - 4) / freq * 8 is about 175 us
    let builder = EventBuilder::new(device_id.clone()).with_calibration(201_143, 1000);
    builder.event(seqno, primary, |_| {
        let crossing = rng.gen_range(8.2..8.6);
        let amplitude = rng.gen_range(4_000.0..12_000.0);
        let phase = rng.gen_range(0.0..std::f64::consts::TAU);
        encode_payload(2048, &chirp_envelope(crossing, amplitude, phase))
    })
}
