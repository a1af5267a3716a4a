use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::domain::{ComplexityLevel, ContentHash};

/// How a document is delivered to the sink, chosen once per render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderStrategy {
    /// The whole document in a single delivery.
    Direct,
    StandardChunking { chunk_size: usize },
    /// Chunk size already adjusted for document size; complexity scaling is
    /// applied when the chunk plan is built.
    AdaptiveChunking { chunk_size: usize },
    Streaming { buffer_size: usize },
}

impl RenderStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            RenderStrategy::Direct => "direct",
            RenderStrategy::StandardChunking { .. } => "standard",
            RenderStrategy::AdaptiveChunking { .. } => "adaptive",
            RenderStrategy::Streaming { .. } => "streaming",
        }
    }

    /// Target chunk or buffer size; `None` for direct delivery.
    pub fn chunk_size(&self) -> Option<usize> {
        match *self {
            RenderStrategy::Direct => None,
            RenderStrategy::StandardChunking { chunk_size }
            | RenderStrategy::AdaptiveChunking { chunk_size } => Some(chunk_size),
            RenderStrategy::Streaming { buffer_size } => Some(buffer_size),
        }
    }
}

impl fmt::Display for RenderStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.chunk_size() {
            Some(size) => write!(f, "{}({size})", self.name()),
            None => f.write_str(self.name()),
        }
    }
}

/// Terminal and non-terminal failures of a render call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("document is empty")]
    EmptyContent,
    #[error("document of {size} characters exceeds the {limit} character limit")]
    DocumentTooLarge { size: usize, limit: usize },
    #[error("render aborted under critical memory pressure")]
    MemoryPressure,
    #[error("render sink failed: {reason}")]
    RenderFailed { reason: String },
    #[error("render cancelled")]
    Cancelled,
}

impl RenderError {
    pub fn render_failed(reason: impl Into<String>) -> Self {
        Self::RenderFailed {
            reason: reason.into(),
        }
    }

    /// Whether a host should offer a manual retry for this outcome.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            RenderError::EmptyContent | RenderError::DocumentTooLarge { .. }
        )
    }

    /// Short machine-friendly name, also passed to progress callbacks.
    pub fn label(&self) -> &'static str {
        match self {
            RenderError::EmptyContent => "empty_content",
            RenderError::DocumentTooLarge { .. } => "document_too_large",
            RenderError::MemoryPressure => "memory_pressure",
            RenderError::RenderFailed { .. } => "render_failed",
            RenderError::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderState {
    Idle,
    Preprocessing,
    Rendering { progress: f64 },
    /// Waiting for memory pressure to ease; progress is not advanced.
    Paused,
    Completed,
    Cancelled,
    Error(RenderError),
}

impl RenderState {
    pub fn label(&self) -> &'static str {
        match self {
            RenderState::Idle => "idle",
            RenderState::Preprocessing => "preprocessing",
            RenderState::Rendering { .. } => "rendering",
            RenderState::Paused => "paused",
            RenderState::Completed => "completed",
            RenderState::Cancelled => "cancelled",
            RenderState::Error(_) => "error",
        }
    }

    /// States a render is still running in.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RenderState::Preprocessing | RenderState::Rendering { .. } | RenderState::Paused
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RenderState::Completed | RenderState::Cancelled | RenderState::Error(_)
        )
    }
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderState::Rendering { progress } => write!(f, "rendering({progress:.2})"),
            RenderState::Error(error) => write!(f, "error({})", error.label()),
            other => f.write_str(other.label()),
        }
    }
}

/// Summary of a successful render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderReport {
    pub content_hash: ContentHash,
    /// `None` when the markup was served from the cache.
    pub strategy: Option<RenderStrategy>,
    pub chunks_delivered: usize,
    pub cache_hit: bool,
    pub used_fallback: bool,
    pub complexity: Option<ComplexityLevel>,
}

/// Item of the progress stream returned by `RenderPipeline::render_events`.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    Progress { progress: f64, label: String },
    State(RenderState),
    Finished(Result<RenderReport, RenderError>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_input_errors_are_not_retryable() {
        assert!(!RenderError::EmptyContent.is_retryable());
        assert!(
            !RenderError::DocumentTooLarge {
                size: 10,
                limit: 5
            }
            .is_retryable()
        );
        assert!(RenderError::MemoryPressure.is_retryable());
        assert!(RenderError::render_failed("sink down").is_retryable());
        assert!(RenderError::Cancelled.is_retryable());
    }

    #[test]
    fn strategy_display_includes_size() {
        assert_eq!(RenderStrategy::Direct.to_string(), "direct");
        assert_eq!(
            RenderStrategy::AdaptiveChunking { chunk_size: 12_500 }.to_string(),
            "adaptive(12500)"
        );
    }

    #[test]
    fn state_classification() {
        assert!(RenderState::Paused.is_active());
        assert!(!RenderState::Idle.is_active());
        assert!(RenderState::Error(RenderError::MemoryPressure).is_terminal());
        assert_eq!(
            RenderState::Error(RenderError::Cancelled).to_string(),
            "error(cancelled)"
        );
    }
}
