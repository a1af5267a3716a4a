use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    application::render::RenderError, config::LoadError, domain::DomainError,
    infra::error::InfraError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit status for the binary, loosely following `sysexits.h`.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) => 78,
            AppError::Domain(DomainError::Validation { .. })
            | AppError::Render(RenderError::EmptyContent)
            | AppError::Render(RenderError::DocumentTooLarge { .. }) => 65,
            AppError::Infra(InfraError::Io(_)) => 74,
            AppError::Render(RenderError::Cancelled) => 130,
            AppError::Render(_) | AppError::Infra(_) | AppError::Unexpected(_) => 1,
        }
    }

    /// The error message followed by every message in its source chain.
    pub fn messages(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut current = self.source();
        while let Some(inner) = current {
            let message = inner.to_string();
            if messages.last() != Some(&message) {
                messages.push(message);
            }
            current = inner.source();
        }
        messages
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Infra(InfraError::Io(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_distinguish_input_from_runtime_failures() {
        assert_eq!(AppError::from(RenderError::EmptyContent).exit_code(), 65);
        assert_eq!(AppError::from(RenderError::MemoryPressure).exit_code(), 1);
        assert_eq!(AppError::from(RenderError::Cancelled).exit_code(), 130);
        assert_eq!(
            AppError::from(DomainError::validation("chunk size must be positive")).exit_code(),
            65
        );
        assert_eq!(
            AppError::from(InfraError::memory_sampling("no process entry")).exit_code(),
            1
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(AppError::from(io).exit_code(), 74);
    }

    #[test]
    fn messages_walk_the_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.md");
        let messages = AppError::from(io).messages();
        assert_eq!(messages[0], "io error: missing.md");
        assert!(messages.iter().any(|m| m == "missing.md"));
    }
}
