//! Domain layer types and invariants.

pub mod chunk;
pub mod document;
pub mod error;
pub mod types;

pub use chunk::{Chunk, ElementType, StructuralElement};
pub use document::{ContentHash, Document};
pub use error::DomainError;
pub use types::{ComplexityLevel, ComplexityMetrics, ComplexityReport, MemoryLevel};
