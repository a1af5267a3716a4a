use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("memory sampling failed: {message}")]
    MemorySampling { message: String },
}

impl InfraError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }

    pub fn memory_sampling(message: impl Into<String>) -> Self {
        Self::MemorySampling {
            message: message.into(),
        }
    }
}
