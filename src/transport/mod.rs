//! Data contracts with the surrounding sensor network.
//!
//! The transport that delivers bursts and the bus that accepts finished records are
//! external collaborators. This module only defines the shapes exchanged with them:
//! [`ChirpEvent`] in, [`OutputRecord`](crate::output::OutputRecord) out through a
//! [`RecordSink`].

pub mod event;
pub mod sink;
pub mod synthetic;

pub use event::{BurstFrame, ChirpEvent, IqSample, PortBurst, PAYLOAD_LEN, SAMPLES_PER_BURST};
pub use sink::{ChannelSink, JsonLinesSink, RecordSink};
