//! Input events delivered by the sensor-network transport.
//!
//! One [`ChirpEvent`] arrives per transmitted chirp. It carries the device header and
//! one raw 70-byte payload per transducer port. Payload layout (little-endian):
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 2 | `sample_freq_factor` (u16) |
//! | 2 | 2 | chip ToF estimate (u16, diagnostic only) |
//! | 4 | 2 | intensity (u16, diagnostic only) |
//! | 6 | 64 | 16 × (quadrature i16, in-phase i16) |

use crate::device::DeviceId;
use crate::error::{AnemometerError, AppResult};
use crate::geometry::TRANSDUCERS;
use bytes::Buf;
use chrono::{DateTime, Utc};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

/// Complex samples per burst.
pub const SAMPLES_PER_BURST: usize = 16;

/// Header bytes preceding the samples.
pub const PAYLOAD_HEADER_LEN: usize = 6;

/// Minimum size of one port payload.
pub const PAYLOAD_LEN: usize = PAYLOAD_HEADER_LEN + SAMPLES_PER_BURST * 4;

/// One IQ sample; `re` is in-phase, `im` is quadrature.
pub type IqSample = Complex<i16>;

/// One event from the transport: a device header plus four raw port payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChirpEvent {
    /// Delivery time stamped by the border router
    pub timestamp: DateTime<Utc>,
    /// Stable identifier of the physical unit
    pub device_id: DeviceId,
    /// Firmware build number (diagnostic only)
    pub build: u32,
    /// Sequence number (diagnostic only)
    pub seqno: u32,
    /// Transmitting port for this chirp
    pub primary: u8,
    /// Per-port calibration resolution
    pub cal_resolution: [u32; TRANSDUCERS],
    /// Calibration pulse width, nanoseconds-scaled
    pub cal_pulse_width: u32,
    /// Raw payload per port
    pub ports: [Vec<u8>; TRANSDUCERS],
}

/// Decoded payload of one port.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortBurst {
    /// Raw sampling-frequency register
    pub sample_freq_factor: u16,
    /// The chip's own coarse ToF estimate
    pub tof_estimate: u16,
    /// Received intensity reported by the chip
    pub intensity: u16,
    /// The 16 IQ samples
    pub samples: [IqSample; SAMPLES_PER_BURST],
}

impl PortBurst {
    /// Decode a port payload, rejecting buffers shorter than [`PAYLOAD_LEN`].
    pub fn parse(port: usize, data: &[u8]) -> AppResult<Self> {
        if data.len() < PAYLOAD_LEN {
            return Err(AnemometerError::MalformedPayload {
                port,
                len: data.len(),
                required: PAYLOAD_LEN,
            });
        }

        let mut buf = &data[..PAYLOAD_LEN];
        let sample_freq_factor = buf.get_u16_le();
        let tof_estimate = buf.get_u16_le();
        let intensity = buf.get_u16_le();

        let mut samples = [IqSample::new(0, 0); SAMPLES_PER_BURST];
        for sample in samples.iter_mut() {
            let quadrature = buf.get_i16_le();
            let in_phase = buf.get_i16_le();
            *sample = IqSample::new(in_phase, quadrature);
        }

        Ok(Self {
            sample_freq_factor,
            tof_estimate,
            intensity,
            samples,
        })
    }
}

/// A fully validated event: primary port checked, every payload decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct BurstFrame {
    /// Transmitting port
    pub primary: usize,
    /// Decoded payload per port
    pub ports: [PortBurst; TRANSDUCERS],
}

impl BurstFrame {
    /// Receiving ports of this frame, i.e. every port except the primary.
    pub fn receivers(&self) -> impl Iterator<Item = (usize, &PortBurst)> + '_ {
        self.ports
            .iter()
            .enumerate()
            .filter(move |(port, _)| *port != self.primary)
    }
}

impl ChirpEvent {
    /// Validate the whole event before any device state is touched.
    pub fn frame(&self) -> AppResult<BurstFrame> {
        let primary = usize::from(self.primary);
        if primary >= TRANSDUCERS {
            return Err(AnemometerError::InvalidPrimary(self.primary));
        }

        let ports = [
            PortBurst::parse(0, &self.ports[0])?,
            PortBurst::parse(1, &self.ports[1])?,
            PortBurst::parse(2, &self.ports[2])?,
            PortBurst::parse(3, &self.ports[3])?,
        ];

        Ok(BurstFrame { primary, ports })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::synthetic::encode_payload;

    #[test]
    fn test_payload_len() {
        assert_eq!(PAYLOAD_LEN, 70);
    }

    #[test]
    fn test_parse_layout() {
        let mut data = vec![0u8; PAYLOAD_LEN];
        data[0..2].copy_from_slice(&2048u16.to_le_bytes());
        data[2..4].copy_from_slice(&321u16.to_le_bytes());
        data[4..6].copy_from_slice(&77u16.to_le_bytes());
        // sample 0: quadrature -5, in-phase 300
        data[6..8].copy_from_slice(&(-5i16).to_le_bytes());
        data[8..10].copy_from_slice(&300i16.to_le_bytes());
        // sample 15: quadrature 1, in-phase -2
        data[66..68].copy_from_slice(&1i16.to_le_bytes());
        data[68..70].copy_from_slice(&(-2i16).to_le_bytes());

        let burst = PortBurst::parse(1, &data).unwrap();
        assert_eq!(burst.sample_freq_factor, 2048);
        assert_eq!(burst.tof_estimate, 321);
        assert_eq!(burst.intensity, 77);
        assert_eq!(burst.samples[0], IqSample::new(300, -5));
        assert_eq!(burst.samples[15], IqSample::new(-2, 1));
    }

    #[test]
    fn test_short_payload_rejected() {
        let err = PortBurst::parse(3, &[0u8; 69]).unwrap_err();
        assert!(matches!(
            err,
            AnemometerError::MalformedPayload {
                port: 3,
                len: 69,
                required: 70
            }
        ));
    }

    #[test]
    fn test_longer_payload_accepted() {
        let mut data = encode_payload(2048, &[IqSample::new(10, 0); SAMPLES_PER_BURST]);
        data.extend_from_slice(&[0xff; 8]);
        assert!(PortBurst::parse(0, &data).is_ok());
    }

    fn event_with(primary: u8, ports: [Vec<u8>; TRANSDUCERS]) -> ChirpEvent {
        ChirpEvent {
            timestamp: Utc::now(),
            device_id: DeviceId::from("AA:BB"),
            build: 1,
            seqno: 1,
            primary,
            cal_resolution: [1; TRANSDUCERS],
            cal_pulse_width: 1000,
            ports,
        }
    }

    #[test]
    fn test_frame_validation() {
        let good = vec![0u8; PAYLOAD_LEN];
        let event = event_with(5, [good.clone(), good.clone(), good.clone(), good.clone()]);
        assert!(matches!(event.frame(), Err(AnemometerError::InvalidPrimary(5))));

        let event = event_with(0, [good.clone(), good.clone(), vec![0u8; 10], good.clone()]);
        assert!(matches!(
            event.frame(),
            Err(AnemometerError::MalformedPayload { port: 2, .. })
        ));

        let event = event_with(2, [good.clone(), good.clone(), good.clone(), good]);
        let frame = event.frame().unwrap();
        let receivers: Vec<usize> = frame.receivers().map(|(port, _)| port).collect();
        assert_eq!(receivers, vec![0, 1, 3]);
    }
}
