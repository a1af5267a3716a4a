use std::sync::Arc;

use serde::Deserialize;
use tokio::task::JoinError;

use crate::application::syntax::{LineKind, classify_line, is_fence, is_single_line_math};
use crate::domain::{ComplexityLevel, ComplexityMetrics, ComplexityReport, DomainError};

/// Relative weight of each term in the complexity score.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ComplexityWeights {
    pub density: f64,
    pub formulas: f64,
    pub code_blocks: f64,
    pub table_rows: f64,
    pub media: f64,
    pub structure: f64,
}

impl Default for ComplexityWeights {
    fn default() -> Self {
        Self {
            density: 0.4,
            formulas: 0.2,
            code_blocks: 0.15,
            table_rows: 0.1,
            media: 0.1,
            structure: 0.05,
        }
    }
}

/// Per-feature cost multipliers, score cap and level thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ComplexityConfig {
    pub weights: ComplexityWeights,
    pub formula_cost: f64,
    pub code_block_cost: f64,
    pub table_row_cost: f64,
    pub media_cost: f64,
    pub structure_cost: f64,
    pub max_score: f64,
    /// Lowest score classified as [`ComplexityLevel::Medium`].
    pub medium_threshold: f64,
    pub high_threshold: f64,
    pub extreme_threshold: f64,
}

impl Default for ComplexityConfig {
    fn default() -> Self {
        Self {
            weights: ComplexityWeights::default(),
            formula_cost: 10.0,
            code_block_cost: 8.0,
            table_row_cost: 5.0,
            media_cost: 3.0,
            structure_cost: 2.0,
            max_score: 1000.0,
            medium_threshold: 50.0,
            high_threshold: 150.0,
            extreme_threshold: 300.0,
        }
    }
}

impl ComplexityConfig {
    pub fn validate(&self) -> Result<(), DomainError> {
        let ordered = 0.0 <= self.medium_threshold
            && self.medium_threshold <= self.high_threshold
            && self.high_threshold <= self.extreme_threshold;
        if !ordered {
            return Err(DomainError::validation(
                "complexity thresholds must satisfy 0 <= medium <= high <= extreme",
            ));
        }
        if self.max_score <= 0.0 {
            return Err(DomainError::validation("complexity score cap must be positive"));
        }
        Ok(())
    }
}

/// Pure, deterministic scorer over raw document text.
#[derive(Debug, Clone, Default)]
pub struct ComplexityAnalyzer {
    config: ComplexityConfig,
}

impl ComplexityAnalyzer {
    pub fn new(config: ComplexityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ComplexityConfig {
        &self.config
    }

    pub fn analyze(&self, text: &str) -> ComplexityReport {
        let metrics = collect_metrics(text);
        let score = self.score(&metrics);
        ComplexityReport {
            metrics,
            score,
            level: self.level_for(score),
        }
    }

    /// [`analyze`](Self::analyze) on the blocking pool, away from the async workers.
    pub async fn analyze_blocking(&self, text: Arc<str>) -> Result<ComplexityReport, JoinError> {
        let analyzer = self.clone();
        tokio::task::spawn_blocking(move || analyzer.analyze(&text)).await
    }

    pub fn score(&self, metrics: &ComplexityMetrics) -> f64 {
        let config = &self.config;
        let weights = &config.weights;

        let density = if metrics.lines == 0 {
            0.0
        } else {
            metrics.characters as f64 / metrics.lines as f64
        };
        let media = (metrics.images + metrics.links) as f64;
        let structure = (metrics.headings + metrics.list_items) as f64;

        let score = density * weights.density
            + metrics.formulas as f64 * config.formula_cost * weights.formulas
            + metrics.code_blocks as f64 * config.code_block_cost * weights.code_blocks
            + metrics.table_rows as f64 * config.table_row_cost * weights.table_rows
            + media * config.media_cost * weights.media
            + structure * config.structure_cost * weights.structure;

        score.clamp(0.0, config.max_score)
    }

    pub fn level_for(&self, score: f64) -> ComplexityLevel {
        let config = &self.config;
        if score >= config.extreme_threshold {
            ComplexityLevel::Extreme
        } else if score >= config.high_threshold {
            ComplexityLevel::High
        } else if score >= config.medium_threshold {
            ComplexityLevel::Medium
        } else {
            ComplexityLevel::Low
        }
    }
}

/// Count the features the score is built from in one pass over the lines.
///
/// Lines inside fenced code are not inspected for other features.
pub fn collect_metrics(text: &str) -> ComplexityMetrics {
    let mut metrics = ComplexityMetrics {
        characters: text.chars().count(),
        ..ComplexityMetrics::default()
    };
    let mut in_fence = false;
    let mut in_math = false;

    for line in text.lines() {
        metrics.lines += 1;
        let trimmed = line.trim_start();

        if is_fence(trimmed) {
            if !in_fence {
                metrics.code_blocks += 1;
            }
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        match classify_line(line) {
            LineKind::MathFence => {
                if is_single_line_math(trimmed) {
                    metrics.formulas += 1;
                } else {
                    if !in_math {
                        metrics.formulas += 1;
                    }
                    in_math = !in_math;
                }
                continue;
            }
            _ if in_math => continue,
            LineKind::Heading { .. } => metrics.headings += 1,
            LineKind::ListItem { .. } => metrics.list_items += 1,
            _ => {}
        }

        if trimmed.contains('|') {
            metrics.table_rows += 1;
        }
        metrics.formulas += inline_math_spans(line);

        let images = line.matches("![").count();
        let links = line.matches("](").count().saturating_sub(images);
        metrics.images += images;
        metrics.links += links;
    }

    metrics
}

/// Pairs of single `$` delimiters; `$$` and escaped `\$` are skipped.
fn inline_math_spans(line: &str) -> usize {
    let bytes = line.as_bytes();
    let mut delimiters = 0;
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'\\' => index += 2,
            b'$' if bytes.get(index + 1) == Some(&b'$') => index += 2,
            b'$' => {
                delimiters += 1;
                index += 1;
            }
            _ => index += 1,
        }
    }
    delimiters / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> ComplexityAnalyzer {
        ComplexityAnalyzer::default()
    }

    #[tokio::test]
    async fn blocking_analysis_matches_inline_analysis() {
        let text = "# Title\n\n```\ncode\n```\n\n- item\n| a | b |\n";
        let report = analyzer()
            .analyze_blocking(Arc::from(text))
            .await
            .expect("analysis task");
        assert_eq!(report, analyzer().analyze(text));
    }

    #[test]
    fn empty_document_is_low_with_zero_score() {
        let report = analyzer().analyze("");
        assert_eq!(report.score, 0.0);
        assert_eq!(report.level, ComplexityLevel::Low);
        assert_eq!(report.metrics, ComplexityMetrics::default());
    }

    #[test]
    fn counts_each_feature_once() {
        let text = "\
# Title
Some text with a [link](https://example.com) and ![img](a.png).

- one
- two
1. three

| a | b |
|---|---|
| 1 | 2 |

Inline $x$ and $y$ math.

$$
e = mc^2
$$

```rust
# not a heading
| not | a table |
```
";
        let metrics = collect_metrics(text);
        assert_eq!(metrics.headings, 1);
        assert_eq!(metrics.links, 1);
        assert_eq!(metrics.images, 1);
        assert_eq!(metrics.list_items, 3);
        assert_eq!(metrics.table_rows, 3);
        assert_eq!(metrics.formulas, 3);
        assert_eq!(metrics.code_blocks, 1);
        assert_eq!(metrics.lines, text.lines().count());
        assert_eq!(metrics.characters, text.chars().count());
    }

    #[test]
    fn escaped_dollars_are_not_math() {
        assert_eq!(inline_math_spans(r"costs \$5 and \$6"), 0);
        assert_eq!(inline_math_spans("$a$ then $$b$$"), 1);
    }

    #[test]
    fn score_follows_weighted_formula() {
        let metrics = ComplexityMetrics {
            formulas: 2,
            code_blocks: 1,
            lines: 10,
            characters: 500,
            ..ComplexityMetrics::default()
        };
        // density 50 * 0.4 + 2 * 10 * 0.2 + 1 * 8 * 0.15
        let expected = 20.0 + 4.0 + 1.2;
        assert!((analyzer().score(&metrics) - expected).abs() < 1e-9);
    }

    #[test]
    fn score_is_capped() {
        let metrics = ComplexityMetrics {
            formulas: 1_000_000,
            lines: 1,
            characters: 1,
            ..ComplexityMetrics::default()
        };
        assert_eq!(analyzer().score(&metrics), 1000.0);
    }

    #[test]
    fn score_is_monotonic_in_heavy_features() {
        let analyzer = analyzer();
        let base = ComplexityMetrics {
            lines: 100,
            characters: 4000,
            ..ComplexityMetrics::default()
        };
        let mut previous = analyzer.score(&base);
        for step in 1..50 {
            let metrics = ComplexityMetrics {
                formulas: step,
                code_blocks: step / 2,
                table_rows: step * 3,
                ..base
            };
            let score = analyzer.score(&metrics);
            assert!(score >= previous, "score dropped at step {step}");
            previous = score;
        }
    }

    #[test]
    fn thresholds_partition_levels() {
        let analyzer = analyzer();
        assert_eq!(analyzer.level_for(49.9), ComplexityLevel::Low);
        assert_eq!(analyzer.level_for(50.0), ComplexityLevel::Medium);
        assert_eq!(analyzer.level_for(149.9), ComplexityLevel::Medium);
        assert_eq!(analyzer.level_for(150.0), ComplexityLevel::High);
        assert_eq!(analyzer.level_for(300.0), ComplexityLevel::Extreme);
        assert_eq!(analyzer.level_for(1000.0), ComplexityLevel::Extreme);
    }

    #[test]
    fn rejects_unordered_level_thresholds() {
        let config = ComplexityConfig {
            high_threshold: 20.0,
            ..ComplexityConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(ComplexityConfig::default().validate().is_ok());
    }

    #[test]
    fn analysis_is_deterministic() {
        let text = "# A\n\n| x |\n$$y$$\n".repeat(40);
        assert_eq!(analyzer().analyze(&text), analyzer().analyze(&text));
    }
}
