use std::time::Duration;

use crate::application::analysis::ComplexityConfig;
use crate::config::Settings;

use super::strategy::StrategyThresholds;

pub const DEFAULT_STANDARD_PACING: Duration = Duration::from_millis(16);
pub const DEFAULT_STREAMING_PACING: Duration = Duration::from_millis(10);
pub const DEFAULT_PAUSE_RECOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Runtime knobs for [`super::RenderPipeline`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPipelineConfig {
    pub thresholds: StrategyThresholds,
    pub complexity: ComplexityConfig,
    pub standard_pacing: Duration,
    pub streaming_pacing: Duration,
    /// Use the boundary-extension chunker for every chunked strategy.
    pub interactive: bool,
    /// Longest a render stays paused waiting for memory warnings to clear.
    pub pause_recovery_timeout: Duration,
}

impl Default for RenderPipelineConfig {
    fn default() -> Self {
        Self {
            thresholds: StrategyThresholds::default(),
            complexity: ComplexityConfig::default(),
            standard_pacing: DEFAULT_STANDARD_PACING,
            streaming_pacing: DEFAULT_STREAMING_PACING,
            interactive: false,
            pause_recovery_timeout: DEFAULT_PAUSE_RECOVERY_TIMEOUT,
        }
    }
}

impl RenderPipelineConfig {
    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn with_thresholds(mut self, thresholds: StrategyThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
}

impl From<&Settings> for RenderPipelineConfig {
    fn from(settings: &Settings) -> Self {
        let render = &settings.render;
        Self {
            thresholds: render.thresholds,
            complexity: settings.complexity,
            standard_pacing: render.standard_pacing,
            streaming_pacing: render.streaming_pacing,
            interactive: render.interactive,
            pause_recovery_timeout: render.pause_recovery_timeout,
        }
    }
}
