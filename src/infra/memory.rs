//! Memory pressure sampling and level broadcast.
//!
//! [`MemoryPressureMonitor`] owns the current [`MemoryLevel`] and publishes
//! changes over a `watch` channel. Levels come either from a periodic sampler
//! ([`MemoryPressureMonitor::spawn_sampling`]) or from the host directly
//! ([`MemoryPressureMonitor::report`]), e.g. when the OS sends a low-memory
//! notification.

use std::sync::{Arc, Weak};
use std::time::Duration;

use metrics::gauge;
use serde::Deserialize;
use sysinfo::{Pid, System};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::domain::{DomainError, MemoryLevel};
use crate::util::bytes::{ByteSize, mib};

use super::error::InfraError;
use super::telemetry::METRIC_MEMORY_LEVEL;

const SOURCE: &str = "infra::memory";

pub const DEFAULT_SAMPLING_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySample {
    /// Resident size of this process.
    pub process_bytes: u64,
    pub used_bytes: u64,
    pub total_bytes: u64,
}

impl MemorySample {
    pub fn system_ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            self.used_bytes as f64 / self.total_bytes as f64
        }
    }
}

pub trait MemorySampler: Send + 'static {
    fn sample(&mut self) -> Result<MemorySample, InfraError>;
}

/// Samples the current process and the whole system through `sysinfo`.
pub struct SystemMemorySampler {
    system: System,
    pid: Pid,
}

impl SystemMemorySampler {
    pub fn new() -> Result<Self, InfraError> {
        let pid = sysinfo::get_current_pid().map_err(InfraError::memory_sampling)?;
        Ok(Self {
            system: System::new(),
            pid,
        })
    }
}

impl MemorySampler for SystemMemorySampler {
    fn sample(&mut self) -> Result<MemorySample, InfraError> {
        self.system.refresh_memory();
        if !self.system.refresh_process(self.pid) {
            return Err(InfraError::memory_sampling(format!(
                "process {} is not visible",
                self.pid
            )));
        }
        let process_bytes = self
            .system
            .process(self.pid)
            .map(|process| process.memory())
            .unwrap_or_default();

        Ok(MemorySample {
            process_bytes,
            used_bytes: self.system.used_memory(),
            total_bytes: self.system.total_memory(),
        })
    }
}

/// Boundaries between memory levels. A sample takes the higher of its
/// process-footprint and system-usage classifications.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct MemoryThresholds {
    pub warning_process_mib: u64,
    pub critical_process_mib: u64,
    pub warning_system_ratio: f64,
    pub critical_system_ratio: f64,
}

impl Default for MemoryThresholds {
    fn default() -> Self {
        Self {
            warning_process_mib: 512,
            critical_process_mib: 1024,
            warning_system_ratio: 0.85,
            critical_system_ratio: 0.95,
        }
    }
}

impl MemoryThresholds {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.warning_process_mib == 0 || self.warning_process_mib > self.critical_process_mib {
            return Err(DomainError::validation(
                "process thresholds must satisfy 0 < warning <= critical",
            ));
        }
        let ratios_ok = self.warning_system_ratio > 0.0
            && self.warning_system_ratio <= self.critical_system_ratio
            && self.critical_system_ratio <= 1.0;
        if !ratios_ok {
            return Err(DomainError::validation(
                "system ratios must satisfy 0 < warning <= critical <= 1",
            ));
        }
        Ok(())
    }

    pub fn classify(&self, sample: &MemorySample) -> MemoryLevel {
        let process = if sample.process_bytes >= mib(self.critical_process_mib) {
            MemoryLevel::Critical
        } else if sample.process_bytes >= mib(self.warning_process_mib) {
            MemoryLevel::Warning
        } else {
            MemoryLevel::Normal
        };

        let ratio = sample.system_ratio();
        let system = if ratio >= self.critical_system_ratio {
            MemoryLevel::Critical
        } else if ratio >= self.warning_system_ratio {
            MemoryLevel::Warning
        } else {
            MemoryLevel::Normal
        };

        process.max(system)
    }
}

pub struct MemoryPressureMonitor {
    thresholds: MemoryThresholds,
    level: watch::Sender<MemoryLevel>,
}

impl MemoryPressureMonitor {
    pub fn new(thresholds: MemoryThresholds) -> Self {
        let (level, _) = watch::channel(MemoryLevel::Normal);
        Self { thresholds, level }
    }

    pub fn thresholds(&self) -> &MemoryThresholds {
        &self.thresholds
    }

    pub fn subscribe(&self) -> watch::Receiver<MemoryLevel> {
        self.level.subscribe()
    }

    pub fn level(&self) -> MemoryLevel {
        *self.level.borrow()
    }

    /// Publish `level`. Returns `true` when it differs from the previous one.
    pub fn report(&self, level: MemoryLevel) -> bool {
        let previous = self.level();
        let changed = self.level.send_if_modified(|current| {
            if *current == level {
                false
            } else {
                *current = level;
                true
            }
        });
        if changed {
            gauge!(METRIC_MEMORY_LEVEL).set(level.as_gauge());
            if level > previous {
                warn!(target: SOURCE, %previous, %level, "Memory pressure increased");
            } else {
                info!(target: SOURCE, %previous, %level, "Memory pressure eased");
            }
        }
        changed
    }

    /// Classify `sample` and publish the resulting level.
    pub fn record(&self, sample: &MemorySample) -> MemoryLevel {
        let level = self.thresholds.classify(sample);
        debug!(
            target: SOURCE,
            process = %ByteSize(sample.process_bytes),
            used = %ByteSize(sample.used_bytes),
            total = %ByteSize(sample.total_bytes),
            %level,
            "Memory sampled"
        );
        self.report(level);
        level
    }

    /// Sample on a fixed cadence until the monitor is dropped.
    pub fn spawn_sampling<S>(self: &Arc<Self>, mut sampler: S, every: Duration) -> JoinHandle<()>
    where
        S: MemorySampler,
    {
        let monitor: Weak<Self> = Arc::downgrade(self);
        let every = if every.is_zero() {
            DEFAULT_SAMPLING_INTERVAL
        } else {
            every
        };

        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };
                match sampler.sample() {
                    Ok(sample) => {
                        monitor.record(&sample);
                    }
                    Err(err) => warn!(target: SOURCE, error = %err, "Memory sampling failed"),
                }
            }
            debug!(target: SOURCE, "Memory sampling stopped");
        })
    }
}

impl Default for MemoryPressureMonitor {
    fn default() -> Self {
        Self::new(MemoryThresholds::default())
    }
}
