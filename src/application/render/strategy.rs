use std::time::Duration;

use serde::Deserialize;

use crate::application::analysis::ComplexityAnalyzer;
use crate::application::chunking::ChunkerKind;
use crate::domain::{Chunk, ComplexityReport, DomainError};

use super::config::RenderPipelineConfig;
use super::types::{RenderError, RenderStrategy};

/// Size boundaries and chunk sizes for strategy selection, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StrategyThresholds {
    /// Documents below this size are delivered directly.
    pub direct_limit: usize,
    pub standard_limit: usize,
    pub adaptive_limit: usize,
    /// Documents at or above this size are rejected.
    pub max_document_size: usize,
    pub standard_chunk_size: usize,
    pub streaming_buffer_size: usize,
    pub adaptive_min_chunk: usize,
    pub adaptive_max_chunk: usize,
    pub adaptive_divisor: usize,
}

impl Default for StrategyThresholds {
    fn default() -> Self {
        Self {
            direct_limit: 100_000,
            standard_limit: 1_000_000,
            adaptive_limit: 10_000_000,
            max_document_size: 50_000_000,
            standard_chunk_size: 50_000,
            streaming_buffer_size: 100_000,
            adaptive_min_chunk: 10_000,
            adaptive_max_chunk: 50_000,
            adaptive_divisor: 20,
        }
    }
}

impl StrategyThresholds {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !(self.direct_limit <= self.standard_limit
            && self.standard_limit <= self.adaptive_limit
            && self.adaptive_limit <= self.max_document_size)
        {
            return Err(DomainError::validation(
                "size limits must be ordered direct <= standard <= adaptive <= max",
            ));
        }
        if self.standard_chunk_size == 0 || self.streaming_buffer_size == 0 {
            return Err(DomainError::validation("chunk and buffer sizes must be positive"));
        }
        if self.adaptive_min_chunk == 0 || self.adaptive_min_chunk > self.adaptive_max_chunk {
            return Err(DomainError::validation(
                "adaptive chunk bounds must satisfy 0 < min <= max",
            ));
        }
        if self.adaptive_divisor == 0 {
            return Err(DomainError::validation("adaptive divisor must be positive"));
        }
        Ok(())
    }
}

/// Pure step function from document size to [`RenderStrategy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderStrategySelector {
    thresholds: StrategyThresholds,
}

impl RenderStrategySelector {
    pub fn new(thresholds: StrategyThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &StrategyThresholds {
        &self.thresholds
    }

    pub fn select(&self, size: usize) -> Result<RenderStrategy, RenderError> {
        let t = &self.thresholds;
        if size < t.direct_limit {
            Ok(RenderStrategy::Direct)
        } else if size < t.standard_limit {
            Ok(RenderStrategy::StandardChunking {
                chunk_size: t.standard_chunk_size,
            })
        } else if size < t.adaptive_limit {
            let chunk_size = (size / t.adaptive_divisor.max(1))
                .clamp(t.adaptive_min_chunk, t.adaptive_max_chunk.max(t.adaptive_min_chunk));
            Ok(RenderStrategy::AdaptiveChunking { chunk_size })
        } else if size < t.max_document_size {
            Ok(RenderStrategy::Streaming {
                buffer_size: t.streaming_buffer_size,
            })
        } else {
            Err(RenderError::DocumentTooLarge {
                size,
                limit: t.max_document_size,
            })
        }
    }
}

/// Chunks and pacing resolved for one render.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    pub chunks: Vec<Chunk>,
    pub pacing: Duration,
    /// `None` for direct delivery.
    pub chunker: Option<ChunkerKind>,
    pub complexity: Option<ComplexityReport>,
}

/// Resolve the chunk sequence for `strategy`.
///
/// Interactive configurations use the boundary-extension chunker for every
/// chunked strategy. A plan never has zero chunks for non-empty text.
pub fn plan_chunks(
    text: &str,
    strategy: RenderStrategy,
    analyzer: &ComplexityAnalyzer,
    config: &RenderPipelineConfig,
) -> ChunkPlan {
    let preferred = if config.interactive {
        ChunkerKind::Boundary
    } else {
        ChunkerKind::Structural
    };

    let (chunker, size, pacing, complexity) = match strategy {
        RenderStrategy::Direct => {
            return ChunkPlan {
                chunks: vec![Chunk::whole(text)],
                pacing: Duration::ZERO,
                chunker: None,
                complexity: None,
            };
        }
        RenderStrategy::StandardChunking { chunk_size } => {
            (preferred, chunk_size, config.standard_pacing, None)
        }
        RenderStrategy::AdaptiveChunking { chunk_size } => {
            let report = analyzer.analyze(text);
            let scaled = (chunk_size as f64 * report.level.chunk_multiplier()).round() as usize;
            (
                preferred,
                scaled.max(1),
                report.level.pacing_delay(),
                Some(report),
            )
        }
        RenderStrategy::Streaming { buffer_size } => (
            ChunkerKind::Boundary,
            buffer_size,
            config.streaming_pacing,
            None,
        ),
    };

    let mut chunks = chunker.chunk(text, size);
    if chunks.is_empty() {
        chunks.push(Chunk::whole(text));
    }

    ChunkPlan {
        chunks,
        pacing,
        chunker: Some(chunker),
        complexity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ComplexityLevel;

    fn selector() -> RenderStrategySelector {
        RenderStrategySelector::default()
    }

    #[test]
    fn step_boundaries() {
        let s = selector();
        assert_eq!(s.select(1), Ok(RenderStrategy::Direct));
        assert_eq!(s.select(99_999), Ok(RenderStrategy::Direct));
        assert_eq!(
            s.select(100_000),
            Ok(RenderStrategy::StandardChunking { chunk_size: 50_000 })
        );
        assert_eq!(
            s.select(100_001),
            Ok(RenderStrategy::StandardChunking { chunk_size: 50_000 })
        );
        assert_eq!(
            s.select(999_999),
            Ok(RenderStrategy::StandardChunking { chunk_size: 50_000 })
        );
        for size in [1_000_000, 1_000_001] {
            assert_eq!(
                s.select(size),
                Ok(RenderStrategy::AdaptiveChunking { chunk_size: 50_000 })
            );
        }
        assert_eq!(
            s.select(9_999_999),
            Ok(RenderStrategy::AdaptiveChunking { chunk_size: 50_000 })
        );
        for size in [10_000_000, 10_000_001] {
            assert_eq!(
                s.select(size),
                Ok(RenderStrategy::Streaming {
                    buffer_size: 100_000
                })
            );
        }
        assert_eq!(
            s.select(49_999_999),
            Ok(RenderStrategy::Streaming {
                buffer_size: 100_000
            })
        );
        for size in [50_000_000, 50_000_001] {
            assert_eq!(
                s.select(size),
                Err(RenderError::DocumentTooLarge {
                    size,
                    limit: 50_000_000
                })
            );
        }
    }

    #[test]
    fn adaptive_chunk_size_is_clamped() {
        let s = RenderStrategySelector::new(StrategyThresholds {
            standard_limit: 100_000,
            ..StrategyThresholds::default()
        });
        assert_eq!(
            s.select(150_000),
            Ok(RenderStrategy::AdaptiveChunking { chunk_size: 10_000 })
        );
        assert_eq!(
            s.select(400_000),
            Ok(RenderStrategy::AdaptiveChunking { chunk_size: 20_000 })
        );
        assert_eq!(
            s.select(5_000_000),
            Ok(RenderStrategy::AdaptiveChunking { chunk_size: 50_000 })
        );
    }

    #[test]
    fn rejects_unordered_thresholds() {
        let thresholds = StrategyThresholds {
            direct_limit: 2_000_000,
            ..StrategyThresholds::default()
        };
        assert!(thresholds.validate().is_err());
        assert!(StrategyThresholds::default().validate().is_ok());
    }

    #[test]
    fn direct_plan_is_a_single_unpaced_chunk() {
        let text = "short document";
        let plan = plan_chunks(
            text,
            RenderStrategy::Direct,
            &ComplexityAnalyzer::default(),
            &RenderPipelineConfig::default(),
        );
        assert_eq!(plan.chunks.len(), 1);
        assert_eq!(plan.chunks[0].content, text);
        assert_eq!(plan.pacing, Duration::ZERO);
        assert_eq!(plan.chunker, None);
    }

    #[test]
    fn adaptive_plan_scales_by_complexity() {
        let text = "plain prose line\n".repeat(200);
        let plan = plan_chunks(
            &text,
            RenderStrategy::AdaptiveChunking { chunk_size: 1_000 },
            &ComplexityAnalyzer::default(),
            &RenderPipelineConfig::default(),
        );
        let report = plan.complexity.expect("adaptive plans carry a report");
        assert_eq!(report.level, ComplexityLevel::Low);
        assert_eq!(plan.pacing, ComplexityLevel::Low.pacing_delay());
        assert!(plan.chunks.iter().all(|c| c.chars <= 1_500));
        assert_eq!(plan.chunker, Some(ChunkerKind::Structural));
    }

    #[test]
    fn interactive_and_streaming_use_boundary_chunker() {
        let text = "line\n".repeat(100);
        let config = RenderPipelineConfig {
            interactive: true,
            ..RenderPipelineConfig::default()
        };
        let analyzer = ComplexityAnalyzer::default();
        let standard = plan_chunks(
            &text,
            RenderStrategy::StandardChunking { chunk_size: 50 },
            &analyzer,
            &config,
        );
        assert_eq!(standard.chunker, Some(ChunkerKind::Boundary));
        assert_eq!(standard.chunks.iter().map(|c| c.content.as_str()).collect::<String>(), text);

        let streaming = plan_chunks(
            &text,
            RenderStrategy::Streaming { buffer_size: 50 },
            &analyzer,
            &RenderPipelineConfig::default(),
        );
        assert_eq!(streaming.chunker, Some(ChunkerKind::Boundary));
        assert_eq!(streaming.pacing, RenderPipelineConfig::default().streaming_pacing);
    }

    #[test]
    fn blank_only_text_still_plans_one_chunk() {
        let plan = plan_chunks(
            "\n\n\n",
            RenderStrategy::StandardChunking { chunk_size: 10 },
            &ComplexityAnalyzer::default(),
            &RenderPipelineConfig::default(),
        );
        assert_eq!(plan.chunks.len(), 1);
    }
}
