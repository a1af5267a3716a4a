use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("render sink was not initialised")]
    NotInitialized,
    #[error("render sink rejected chunk {index}: {message}")]
    Rejected { index: usize, message: String },
    #[error("render sink failed: {message}")]
    Failed { message: String },
}

impl SinkError {
    pub fn rejected(index: usize, message: impl Into<String>) -> Self {
        Self::Rejected {
            index,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Display surface that turns chunk text into markup.
///
/// The pipeline never overlaps calls on one sink: each call is awaited before
/// the next is issued, so implementations may keep plain append-only state.
#[async_trait]
pub trait RenderSink: Send + Sync {
    /// Reset the surface before a fresh delivery sequence.
    async fn initialize(&self) -> Result<(), SinkError>;

    async fn append_chunk(&self, text: &str, index: usize) -> Result<(), SinkError>;

    /// Complete the sequence and return the produced markup for caching.
    async fn finalize(&self) -> Result<String, SinkError>;

    /// Display markup produced by an earlier render of the same content.
    async fn load_precomputed(&self, markup: &str) -> Result<(), SinkError>;
}
