//! Adaptive document chunking and paced streaming rendering for very large
//! Markdown documents.
//!
//! The crate is layered the same way top to bottom:
//!
//! - [`domain`]: documents, content fingerprints, structural elements, chunks.
//! - [`application`]: complexity analysis, the two chunkers, strategy
//!   selection and the render pipeline state machine.
//! - [`cache`]: the content-hash keyed markup cache.
//! - [`infra`]: telemetry, memory pressure sampling and the HTML render sink.
//! - [`config`]: layered settings and the command line surface.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
