use std::{
    thread,
    time::{Duration, Instant},
};

use codec::payload;

/// A pacing failure. The record it belongs to is sent immediately
/// instead; pacing never terminates a stream.
#[derive(Debug, PartialEq, Eq)]
pub enum PaceError {
    /// RTP timestamps must be non-decreasing.
    OutOfOrder { last: u32, next: u32 },
    /// The payload type is unassigned or its clock rate is zero
    /// (video/unspecified), so no delay can be computed.
    UnknownRate(u8),
}

impl std::error::Error for PaceError {}

impl std::fmt::Display for PaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfOrder { last, next } => {
                write!(f, "packets out of timestamp order: {last} > {next}")
            }
            Self::UnknownRate(pt) => write!(f, "unknown clock rate for payload type {pt}"),
        }
    }
}

/// Replay timing from the capture wall-clock offsets.
pub struct WallClock {
    start: Instant,
}

impl WallClock {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Sleep until `msec` milliseconds after replay start.
    ///
    /// Each call re-measures from the start, so being late on one
    /// packet never carries over as debt: a late packet goes out
    /// immediately and the next one is timed from the same zero.
    pub fn sleep_until(&self, msec: u32) {
        let target = Duration::from_millis(msec as u64);
        let elapsed = self.start.elapsed();
        if elapsed < target {
            thread::sleep(target - elapsed);
        }
    }
}

/// Replay timing from the RTP timestamps and the payload's clock rate.
///
/// A typical audio stream runs at 8000 Hz and advances the timestamp
/// by 160 per packet: 160/8000 of a second, 20 ms between sends.
#[derive(Default)]
pub struct MediaClock {
    /// Timestamp of the last paced packet; 0 until something was sent.
    last: u32,
}

impl MediaClock {
    /// Sleep for the media time between the last packet and this one.
    ///
    /// The first packet sets the baseline and goes out immediately.
    pub fn advance(&mut self, next: u32, pt: u8) -> Result<(), PaceError> {
        if self.last == 0 {
            self.last = next;
            return Ok(());
        }

        if next < self.last {
            return Err(PaceError::OutOfOrder {
                last: self.last,
                next,
            });
        }

        let rate = match payload::lookup(pt) {
            Some(payload) if payload.rate > 0 => payload.rate,
            _ => return Err(PaceError::UnknownRate(pt)),
        };

        let diff = next - self.last;
        self.last = next;
        thread::sleep(Duration::from_secs_f64(diff as f64 / rate as f64));
        Ok(())
    }
}

/// The strategy for one conversion run.
pub enum Pacer {
    Wall(WallClock),
    Media(MediaClock),
}

impl Pacer {
    pub fn pace(&mut self, msec: u32, timestamp: u32, pt: u8) -> Result<(), PaceError> {
        match self {
            Self::Wall(clock) => {
                clock.sleep_until(msec);
                Ok(())
            }
            Self::Media(clock) => clock.advance(timestamp, pt),
        }
    }
}
