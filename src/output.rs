//! Output records handed to the sink, one per processed burst.

use crate::device::DeviceId;
use crate::dsp::velocity::CardinalVelocity;
use crate::transport::ChirpEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// One time-of-flight measured in a burst.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TofMeasure {
    /// Transmitting port
    pub src: usize,
    /// Receiving port
    pub dst: usize,
    /// Time of flight in seconds
    pub tof_seconds: f64,
}

/// Everything emitted for one burst.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// Delivery time of the burst
    pub timestamp: DateTime<Utc>,
    /// Device the burst came from
    pub sensor: DeviceId,
    /// One entry per receiving port whose estimate succeeded
    pub tofs: Vec<TofMeasure>,
    /// Cardinal velocity estimates
    pub velocities: Vec<CardinalVelocity>,
    /// Rate-limited diagnostic annotations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extradata: Vec<String>,
}

/// Process-wide limiter allowing one notification per interval.
///
/// The last emission time is kept as nanoseconds since construction in an atomic,
/// so concurrent callers race through a compare-and-swap and exactly one wins.
/// Construction counts as an emission.
#[derive(Debug)]
pub struct NotifyLimiter {
    origin: Instant,
    interval: Duration,
    last_emit_ns: AtomicU64,
}

impl NotifyLimiter {
    /// Limiter starting now.
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(Instant::now(), interval)
    }

    /// Limiter whose first interval starts at `origin`.
    pub fn starting_at(origin: Instant, interval: Duration) -> Self {
        Self {
            origin,
            interval,
            last_emit_ns: AtomicU64::new(0),
        }
    }

    /// Take the token if more than one interval has passed since the last emission.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// [`try_acquire`](Self::try_acquire) against an explicit clock reading.
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let now_ns = duration_ns(now.saturating_duration_since(self.origin));
        let interval_ns = duration_ns(self.interval);

        let mut last = self.last_emit_ns.load(Ordering::Acquire);
        loop {
            if now_ns.saturating_sub(last) <= interval_ns {
                return false;
            }
            match self.last_emit_ns.compare_exchange_weak(
                last,
                now_ns,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => last = actual,
            }
        }
    }
}

fn duration_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Builds output records and attaches the periodic build annotation.
#[derive(Debug)]
pub struct OutputAssembler {
    limiter: NotifyLimiter,
}

impl OutputAssembler {
    /// Assembler whose annotation interval starts now.
    pub fn new(notify_interval: Duration) -> Self {
        Self::with_limiter(NotifyLimiter::new(notify_interval))
    }

    /// Assembler using an existing limiter.
    pub fn with_limiter(limiter: NotifyLimiter) -> Self {
        Self { limiter }
    }

    /// Record for `event` with the ToFs measured in it and the current velocity.
    pub fn assemble(
        &self,
        event: &ChirpEvent,
        tofs: Vec<TofMeasure>,
        velocity: CardinalVelocity,
    ) -> OutputRecord {
        self.assemble_at(Instant::now(), event, tofs, velocity)
    }

    /// [`assemble`](Self::assemble) against an explicit clock reading.
    pub fn assemble_at(
        &self,
        now: Instant,
        event: &ChirpEvent,
        tofs: Vec<TofMeasure>,
        velocity: CardinalVelocity,
    ) -> OutputRecord {
        let mut extradata = Vec::new();
        if self.limiter.try_acquire_at(now) {
            extradata.push(format!(
                "anemometer {} build is {}",
                event.device_id, event.build
            ));
        }

        OutputRecord {
            timestamp: event.timestamp,
            sensor: event.device_id.clone(),
            tofs,
            velocities: vec![velocity],
            extradata,
        }
    }
}
