//! Document complexity scoring used to tune adaptive chunking.

mod complexity;

pub use complexity::{ComplexityAnalyzer, ComplexityConfig, ComplexityWeights, collect_metrics};
