//! Per-job performance tracking
//!
//! Counts connector and storage calls with summed durations, and samples
//! process memory and CPU through `sysinfo` at job start and finish.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::debug;

/// Which backend a tracked call hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Outbound platform API call.
    Api,
    /// Persistence-layer call.
    Storage,
}

/// Resource usage captured over one job execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PerformanceMetrics {
    /// Number of platform API calls.
    pub api_calls: u64,
    /// Total time spent in platform API calls.
    pub api_time: Duration,
    /// Number of persistence calls.
    pub storage_calls: u64,
    /// Total time spent in persistence calls.
    pub storage_time: Duration,
    /// Wall-clock duration from start to finish.
    pub duration: Duration,
    /// Process memory growth over the job, floored at zero.
    pub memory_delta_bytes: u64,
    /// Process CPU usage sampled at finish, capped at 100.
    pub cpu_percent: f32,
    /// Bytes written to the network, when reported.
    pub bytes_sent: u64,
    /// Bytes read from the network, when reported.
    pub bytes_received: u64,
}

/// Accumulates call counts and resource samples for one job.
///
/// Counters are atomic so the tracker can be shared across concurrent
/// entity work without locking.
pub struct PerformanceTracker {
    started: Instant,
    start_memory: u64,
    sys: System,
    api_calls: AtomicU64,
    api_time_micros: AtomicU64,
    storage_calls: AtomicU64,
    storage_time_micros: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

impl PerformanceTracker {
    /// Begin tracking. Samples the current process memory as the baseline.
    #[must_use]
    pub fn start() -> Self {
        let mut sys = System::new();
        let start_memory = match sysinfo::get_current_pid() {
            Ok(pid) => {
                sys.refresh_process(pid);
                sys.process(pid).map(|proc| proc.memory()).unwrap_or(0)
            }
            Err(_) => 0,
        };

        Self {
            started: Instant::now(),
            start_memory,
            sys,
            api_calls: AtomicU64::new(0),
            api_time_micros: AtomicU64::new(0),
            storage_calls: AtomicU64::new(0),
            storage_time_micros: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
        }
    }

    /// Record one platform API call.
    pub fn record_api_call(&self, duration: Duration) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
        self.api_time_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record one persistence call.
    pub fn record_storage_call(&self, duration: Duration) {
        self.storage_calls.fetch_add(1, Ordering::Relaxed);
        self.storage_time_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record network byte counts reported by a connector.
    pub fn record_bytes(&self, sent: u64, received: u64) {
        self.bytes_sent.fetch_add(sent, Ordering::Relaxed);
        self.bytes_received.fetch_add(received, Ordering::Relaxed);
    }

    /// Time a future and record it under the given kind.
    ///
    /// The call is recorded whether the future succeeds or errors.
    pub async fn track<T, E, F>(&self, kind: CallKind, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let before = Instant::now();
        let result = fut.await;
        let elapsed = before.elapsed();
        match kind {
            CallKind::Api => self.record_api_call(elapsed),
            CallKind::Storage => self.record_storage_call(elapsed),
        }
        result
    }

    /// Stop tracking and produce the final metrics.
    #[must_use]
    pub fn finish(mut self) -> PerformanceMetrics {
        let duration = self.started.elapsed();

        let (end_memory, cpu_percent) = match sysinfo::get_current_pid() {
            Ok(pid) => {
                self.sys.refresh_process(pid);
                self.sys
                    .process(pid)
                    .map(|proc| (proc.memory(), proc.cpu_usage()))
                    .unwrap_or((self.start_memory, 0.0))
            }
            Err(_) => (self.start_memory, 0.0),
        };

        let metrics = PerformanceMetrics {
            api_calls: self.api_calls.load(Ordering::Relaxed),
            api_time: Duration::from_micros(self.api_time_micros.load(Ordering::Relaxed)),
            storage_calls: self.storage_calls.load(Ordering::Relaxed),
            storage_time: Duration::from_micros(self.storage_time_micros.load(Ordering::Relaxed)),
            duration,
            memory_delta_bytes: end_memory.saturating_sub(self.start_memory),
            cpu_percent: cpu_percent.min(100.0),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        };

        debug!(
            api_calls = metrics.api_calls,
            storage_calls = metrics.storage_calls,
            duration_ms = metrics.duration.as_millis() as u64,
            memory_delta_bytes = metrics.memory_delta_bytes,
            "performance tracking finished"
        );

        metrics
    }
}
