//! Scan timing and deadline tracking

use crate::results::format_duration;
use std::time::{Duration, Instant};

/// Wall-clock timer started when a probe begins scanning
#[derive(Debug, Clone, Copy)]
pub struct ScanTimer {
    started: Instant,
}

impl ScanTimer {
    /// Capture the start timestamp
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Elapsed time formatted at seconds/minutes/hours granularity
    pub fn scan_duration(&self) -> String {
        format_duration(self.elapsed())
    }
}

/// Soft and hard job deadlines measured from job start
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    soft: Duration,
    hard: Duration,
}

impl Deadline {
    pub fn new(soft: Duration, hard: Duration) -> Self {
        Self {
            started: Instant::now(),
            soft,
            hard,
        }
    }

    pub fn soft_limit(&self) -> Duration {
        self.soft
    }

    pub fn hard_limit(&self) -> Duration {
        self.hard
    }

    pub fn soft_expired(&self) -> bool {
        self.started.elapsed() >= self.soft
    }

    /// Time left before the hard deadline
    pub fn hard_remaining(&self) -> Duration {
        self.hard.saturating_sub(self.started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_measures_elapsed() {
        let timer = ScanTimer::start();
        std::thread::sleep(Duration::from_millis(10));
        assert!(timer.elapsed() >= Duration::from_millis(10));
        assert!(timer.scan_duration().ends_with("seconds"));
    }

    #[test]
    fn test_deadline_expiry() {
        let deadline = Deadline::new(Duration::ZERO, Duration::from_secs(60));
        assert!(deadline.soft_expired());
        assert!(deadline.hard_remaining() <= Duration::from_secs(60));

        let relaxed = Deadline::new(Duration::from_secs(30), Duration::from_secs(60));
        assert!(!relaxed.soft_expired());
    }
}
