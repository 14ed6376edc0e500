use crate::StoppingCondition;
use skein::Float;
use skein_la::DVec;
use std::time::Duration;

/// Value record summarizing a completed (or cancelled) training run.
#[derive(Debug, Clone)]
pub struct TrainingResults {
    /// Parameters installed on the network when the run ended.
    pub final_parameters: DVec<Float>,
    /// Training loss per epoch.
    pub training_history: Vec<Float>,
    /// Selection loss per epoch.
    pub selection_history: Vec<Float>,
    /// Gradient norm per epoch; empty for gradient-free optimizers.
    pub gradient_norm_history: Vec<Float>,
    /// Epochs actually run.
    pub epochs: usize,
    pub elapsed: Duration,
    pub stopping_condition: StoppingCondition,
}

impl TrainingResults {
    pub fn final_training_loss(&self) -> Float {
        self.training_history.last().copied().unwrap_or(Float::INFINITY)
    }

    pub fn final_selection_loss(&self) -> Float {
        self.selection_history.last().copied().unwrap_or(Float::INFINITY)
    }

    /// A run converged when it ended for a reason other than numerical
    /// failure and its final losses are finite.
    pub fn converged(&self) -> bool {
        self.stopping_condition != StoppingCondition::NumericalFailure
            && self.final_training_loss().is_finite()
    }
}
