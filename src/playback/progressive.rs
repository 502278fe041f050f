use tracing::info;

use crate::config::ProgressiveConfig;

/// Ramps the practice tempo between loops: up one step after a loop that
/// met the accuracy threshold, down one step otherwise. Never leaves
/// `[floor, ceiling]`.
#[derive(Clone, Debug)]
pub struct ProgressivePractice {
    scale: f64,
    config: ProgressiveConfig,
    loops: u32,
}

impl ProgressivePractice {
    pub fn new(config: ProgressiveConfig) -> Self {
        let config = config.normalized();
        let scale = config.start_scale;
        ProgressivePractice {
            scale,
            config,
            loops: 0,
        }
    }

    /// Feed the accuracy (percent) of the loop just completed; returns the new scale.
    pub fn on_loop_complete(&mut self, accuracy_pct: f64) -> f64 {
        self.loops += 1;
        let previous = self.scale;
        self.scale = if accuracy_pct >= self.config.accuracy_threshold {
            (self.scale * (1.0 + self.config.step)).min(self.config.ceiling)
        } else {
            (self.scale * (1.0 - self.config.step)).max(self.config.floor)
        };
        info!(
            loop_number = self.loops,
            accuracy_pct,
            from = previous,
            to = self.scale,
            "progressive tempo step"
        );
        self.scale
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn loops(&self) -> u32 {
        self.loops
    }

    pub fn at_target(&self) -> bool {
        self.scale >= self.config.ceiling
    }
}
