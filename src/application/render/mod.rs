//! Strategy selection, the render sink contract and the render pipeline.
//!
//! Chunking and complexity analysis are total; every failure a caller can see
//! comes from strategy selection, the sink or the memory monitor and is
//! reported as a [`RenderError`].

mod config;
mod pipeline;
mod sink;
mod strategy;
mod types;

pub use config::{
    DEFAULT_PAUSE_RECOVERY_TIMEOUT, DEFAULT_STANDARD_PACING, DEFAULT_STREAMING_PACING,
    RenderPipelineConfig,
};
pub use pipeline::{RenderCanceller, RenderPipeline};
pub use sink::{RenderSink, SinkError};
pub use strategy::{ChunkPlan, RenderStrategySelector, StrategyThresholds, plan_chunks};
pub use types::{RenderError, RenderEvent, RenderReport, RenderState, RenderStrategy};
