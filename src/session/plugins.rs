use tracing::info;

use crate::error::{KeyfallError, Result};
use crate::score::Song;
use crate::scoring::{HitGrade, HitResult};
use crate::session::io::InputSource;

/// Custom scoring that rides along with the built-in grading.
pub trait ScoringPlugin {
    fn name(&self) -> &str;

    /// Points awarded for one resolved note.
    fn on_hit(&mut self, result: &HitResult) -> i64;

    fn on_frame(&mut self, _dt: f64) {}

    fn score(&self) -> i64;
}

/// Read-only observer of the playback timeline, e.g. a host-side overlay.
pub trait VisualizationPlugin {
    fn name(&self) -> &str;

    fn observe(&mut self, song: &Song, position: f64);
}

pub enum Plugin {
    Scoring(Box<dyn ScoringPlugin>),
    Visualization(Box<dyn VisualizationPlugin>),
    Input(Box<dyn InputSource>),
}

impl Plugin {
    pub fn name(&self) -> &str {
        match self {
            Plugin::Scoring(p) => p.name(),
            Plugin::Visualization(p) => p.name(),
            Plugin::Input(p) => p.name(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Plugin::Scoring(_) => "scoring",
            Plugin::Visualization(_) => "visualization",
            Plugin::Input(_) => "input",
        }
    }
}

/// Registered plugins, grouped by capability. Names are unique across groups.
#[derive(Default)]
pub struct PluginRegistry {
    scoring: Vec<Box<dyn ScoringPlugin>>,
    visualizations: Vec<Box<dyn VisualizationPlugin>>,
    inputs: Vec<Box<dyn InputSource>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        PluginRegistry::default()
    }

    pub fn register(&mut self, plugin: Plugin) -> Result<()> {
        if self.names().any(|n| n == plugin.name()) {
            return Err(KeyfallError::Config(format!(
                "plugin '{}' is already registered",
                plugin.name()
            )));
        }
        info!(name = plugin.name(), kind = plugin.kind(), "plugin registered");
        match plugin {
            Plugin::Scoring(p) => self.scoring.push(p),
            Plugin::Visualization(p) => self.visualizations.push(p),
            Plugin::Input(p) => self.inputs.push(p),
        }
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scoring
            .iter()
            .map(|p| p.name())
            .chain(self.visualizations.iter().map(|p| p.name()))
            .chain(self.inputs.iter().map(|p| p.name()))
    }

    pub fn scoring(&self) -> &[Box<dyn ScoringPlugin>] {
        &self.scoring
    }

    pub fn scoring_mut(&mut self) -> &mut [Box<dyn ScoringPlugin>] {
        &mut self.scoring
    }

    pub fn visualizations_mut(&mut self) -> &mut [Box<dyn VisualizationPlugin>] {
        &mut self.visualizations
    }

    pub fn inputs_mut(&mut self) -> &mut [Box<dyn InputSource>] {
        &mut self.inputs
    }

    /// (name, score) for every scoring plugin.
    pub fn scores(&self) -> Vec<(String, i64)> {
        self.scoring
            .iter()
            .map(|p| (p.name().to_string(), p.score()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.scoring.len() + self.visualizations.len() + self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn close_inputs(&mut self) {
        for input in &mut self.inputs {
            input.close();
        }
    }
}

/// Arcade-style points: a base value per grade, multiplied by one plus a
/// tenth of the running combo.
#[derive(Clone, Debug, Default)]
pub struct ComboScorer {
    score: i64,
    combo: u32,
    max_combo: u32,
}

impl ComboScorer {
    pub fn new() -> Self {
        ComboScorer::default()
    }

    fn base_points(grade: HitGrade) -> i64 {
        match grade {
            HitGrade::Perfect => 300,
            HitGrade::Good => 100,
            HitGrade::Ok => 50,
            HitGrade::Miss => 0,
        }
    }

    pub fn combo(&self) -> u32 {
        self.combo
    }

    pub fn max_combo(&self) -> u32 {
        self.max_combo
    }
}

impl ScoringPlugin for ComboScorer {
    fn name(&self) -> &str {
        "combo"
    }

    fn on_hit(&mut self, result: &HitResult) -> i64 {
        if !result.grade.is_hit() {
            self.combo = 0;
            return 0;
        }
        let multiplier = 1 + (self.combo / 10) as i64;
        let points = ComboScorer::base_points(result.grade) * multiplier;
        self.combo += 1;
        self.max_combo = self.max_combo.max(self.combo);
        self.score += points;
        points
    }

    fn score(&self) -> i64 {
        self.score
    }
}
