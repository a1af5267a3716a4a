use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Feature counts gathered in a single scan of a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityMetrics {
    pub headings: usize,
    /// Opening fences only; a closing fence does not count again.
    pub code_blocks: usize,
    pub table_rows: usize,
    /// Display (`$$`) blocks plus inline `$…$` spans.
    pub formulas: usize,
    pub images: usize,
    pub links: usize,
    pub list_items: usize,
    pub lines: usize,
    pub characters: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
    Extreme,
}

impl ComplexityLevel {
    /// Factor applied to the adaptive chunk size.
    pub fn chunk_multiplier(self) -> f64 {
        match self {
            ComplexityLevel::Low => 1.5,
            ComplexityLevel::Medium => 1.0,
            ComplexityLevel::High => 0.7,
            ComplexityLevel::Extreme => 0.5,
        }
    }

    /// Pause inserted between chunk deliveries.
    pub fn pacing_delay(self) -> Duration {
        let millis = match self {
            ComplexityLevel::Low => 10,
            ComplexityLevel::Medium => 16,
            ComplexityLevel::High => 33,
            ComplexityLevel::Extreme => 50,
        };
        Duration::from_millis(millis)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComplexityLevel::Low => "low",
            ComplexityLevel::Medium => "medium",
            ComplexityLevel::High => "high",
            ComplexityLevel::Extreme => "extreme",
        }
    }
}

impl fmt::Display for ComplexityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of analysing one document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplexityReport {
    pub metrics: ComplexityMetrics,
    pub score: f64,
    pub level: ComplexityLevel,
}

/// Process memory pressure as classified by the memory monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLevel {
    #[default]
    Normal,
    Warning,
    Critical,
}

impl MemoryLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryLevel::Normal => "normal",
            MemoryLevel::Warning => "warning",
            MemoryLevel::Critical => "critical",
        }
    }

    /// Numeric form for gauges.
    pub fn as_gauge(self) -> f64 {
        match self {
            MemoryLevel::Normal => 0.0,
            MemoryLevel::Warning => 1.0,
            MemoryLevel::Critical => 2.0,
        }
    }
}

impl fmt::Display for MemoryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
