//! Analysis, chunking and render orchestration.

pub mod analysis;
pub mod chunking;
pub mod error;
pub mod render;
pub mod syntax;
