//! End-to-end scenarios through the public burst-processing API.

use chirp_anemometer::device::DeviceId;
use chirp_anemometer::dsp::CardinalVelocity;
use chirp_anemometer::geometry::{Axis, TRANSDUCERS};
use chirp_anemometer::transport::synthetic::{encode_payload, samples_from_magnitudes, EventBuilder};
use chirp_anemometer::transport::SAMPLES_PER_BURST;
use chirp_anemometer::{AnemometerConfig, BurstProcessor};

/// Peaks at sample 10; half of the peak (100) is crossed halfway between samples 4 and 5.
const PEAK_AT_TEN: [i16; SAMPLES_PER_BURST] = [
    10, 20, 40, 60, 90, 110, 140, 170, 190, 195, 200, 180, 150, 120, 100, 80,
];

fn payload() -> Vec<u8> {
    encode_payload(2048, &samples_from_magnitudes(&PEAK_AT_TEN))
}

#[test]
fn test_single_burst_scenario() {
    let config = AnemometerConfig::default();
    let processor = BurstProcessor::new(&config).unwrap();
    let event = EventBuilder::new("AA:BB")
        .with_calibration(1, 1000)
        .event(1, 0, |_| payload());

    let record = processor.process(&event).unwrap();

    // freq = 2048 / 2048 * 1 / (1000 / 1000) = 1.0; tof = (4.5 - 4) / 1.0 * 8
    assert_eq!(record.sensor, DeviceId::from("AA:BB"));
    assert_eq!(record.timestamp, event.timestamp);
    assert_eq!(record.tofs.len(), 3);
    for (tof, dst) in record.tofs.iter().zip([1, 2, 3]) {
        assert_eq!(tof.src, 0);
        assert_eq!(tof.dst, dst);
        assert_eq!(tof.tof_seconds, 4.0);
    }
    assert_eq!(record.velocities.len(), 1);

    // Transmitter port 0 is matrix index 1; every path out of it carries the same velocity
    let geometry = processor.geometry();
    let path = 0.5 * (60_000.0 / 4.0e6 - 60_000.0 / 174.92);
    let expected = |axis: Axis| {
        let weight: f64 = (0..TRANSDUCERS)
            .filter(|&j| j != 1)
            .map(|j| geometry.axis_weight(axis, 1, j))
            .sum();
        path * weight / geometry.axis_denominator(axis)
    };
    let velocity = record.velocities[0];
    assert!((velocity.x - expected(Axis::X)).abs() < 1e-9);
    assert!((velocity.y - expected(Axis::Y)).abs() < 1e-9);
    assert!((velocity.z - expected(Axis::Z)).abs() < 1e-9);

    let state = processor.registry().get(&DeviceId::from("AA:BB")).unwrap();
    assert_eq!(state.lock().filtered_velocity(), velocity);
}

#[test]
fn test_symmetric_rotation_settles_to_still_air() {
    let processor = BurstProcessor::new(&AnemometerConfig::default()).unwrap();
    let builder = EventBuilder::new("AA:BB");

    let mut last = None;
    for seqno in 0..8u32 {
        let primary = (seqno % 4) as u8;
        let record = processor
            .process(&builder.event(seqno, primary, |_| payload()))
            .unwrap();
        assert_eq!(record.tofs.len(), 3);
        last = Some(record.velocities[0]);
    }

    assert_eq!(last, Some(CardinalVelocity::default()));

    let stats = processor.stats().snapshot();
    assert_eq!(stats.bursts, 8);
    assert_eq!(stats.tofs, 24);
    // 3 + 2 + 1 + 0 reciprocals never measured during the first rotation
    assert_eq!(stats.stale_reciprocal, 6);

    let state = processor.registry().get(&DeviceId::from("AA:BB")).unwrap();
    assert_eq!(state.lock().sample_count(), 8);
}

#[test]
fn test_output_record_serialises() {
    let processor = BurstProcessor::new(&AnemometerConfig::default()).unwrap();
    let event = EventBuilder::new("AA:BB").event(1, 3, |_| payload());
    let record = processor.process(&event).unwrap();

    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["sensor"], "AA:BB");
    assert_eq!(json["tofs"].as_array().unwrap().len(), 3);
    assert_eq!(json["tofs"][0]["src"], 3);
    assert!(json["velocities"][0]["z"].is_number());
}

#[test]
fn test_event_json_roundtrip_through_processor() {
    let processor = BurstProcessor::new(&AnemometerConfig::default()).unwrap();
    let event = EventBuilder::new("AA:BB").event(5, 1, |_| payload());
    let line = serde_json::to_string(&event).unwrap();
    let parsed: chirp_anemometer::transport::ChirpEvent = serde_json::from_str(&line).unwrap();

    let record = processor.process(&parsed).unwrap();
    assert_eq!(record.tofs.len(), 3);
}
