//! The two chunking strategies.
//!
//! [`StructuralChunker`] packs whole structural elements and is used for
//! standard and adaptive renders. [`BoundaryExtensionChunker`] cuts by size and
//! then extends past open constructs; it backs streaming and interactive
//! renders. Both are total over any input and never fail.

pub mod blocks;
mod boundary;
mod structural;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub use boundary::{BoundaryExtensionChunker, BoundaryStrategy};
pub use structural::StructuralChunker;

use crate::domain::Chunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ChunkerKind {
    /// Element-merge chunking.
    Structural,
    /// Size-first chunking with boundary extension.
    Boundary,
}

impl ChunkerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkerKind::Structural => "structural",
            ChunkerKind::Boundary => "boundary",
        }
    }

    /// Run this chunker with `size` as its target or maximum chunk size.
    pub fn chunk(self, text: &str, size: usize) -> Vec<Chunk> {
        match self {
            ChunkerKind::Structural => StructuralChunker.chunk(text, size),
            ChunkerKind::Boundary => {
                BoundaryExtensionChunker.chunk(text, &BoundaryStrategy::new(size))
            }
        }
    }
}
