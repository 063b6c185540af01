//! Sync metrics
//!
//! Counters and timings for flush cycles, surfaced read-only for debugging
//! and status screens.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct SyncMetrics {
    pub flush_cycles: u64,
    pub successful_cycles: u64,
    pub failed_cycles: u64,
    pub operations_pushed: u64,
    pub average_cycle_duration: Duration,
    pub last_cycle_duration: Option<Duration>,
    cycle_start: Option<Instant>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            flush_cycles: 0,
            successful_cycles: 0,
            failed_cycles: 0,
            operations_pushed: 0,
            average_cycle_duration: Duration::ZERO,
            last_cycle_duration: None,
            cycle_start: None,
        }
    }

    pub fn record_cycle_start(&mut self) {
        self.cycle_start = Some(Instant::now());
        self.flush_cycles += 1;
    }

    pub fn record_cycle_success(&mut self) {
        if let Some(start) = self.cycle_start.take() {
            let duration = start.elapsed();
            self.last_cycle_duration = Some(duration);
            self.successful_cycles += 1;

            let total = self.average_cycle_duration * (self.successful_cycles - 1) as u32 + duration;
            self.average_cycle_duration = total / self.successful_cycles as u32;
        }
    }

    pub fn record_cycle_failure(&mut self) {
        self.cycle_start = None;
        self.failed_cycles += 1;
    }

    pub fn record_pushed(&mut self) {
        self.operations_pushed += 1;
    }

    pub fn success_rate(&self) -> f64 {
        if self.flush_cycles == 0 {
            0.0
        } else {
            self.successful_cycles as f64 / self.flush_cycles as f64
        }
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}
