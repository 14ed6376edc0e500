use skein::{Error, Float, Result};
use std::time::{Duration, Instant};

/// Why a training run ended. Recorded in the results; ties between
/// simultaneously-true conditions break in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoppingCondition {
    LossGoal,
    GradientNormGoal,
    SelectionLossIncreases,
    MaximumEpochs,
    MaximumTime,
    NumericalFailure,
    Cancelled,
}

impl StoppingCondition {
    pub fn name(self) -> &'static str {
        match self {
            Self::LossGoal => "LossGoal",
            Self::GradientNormGoal => "GradientNormGoal",
            Self::SelectionLossIncreases => "SelectionLossIncreases",
            Self::MaximumEpochs => "MaximumEpochs",
            Self::MaximumTime => "MaximumTime",
            Self::NumericalFailure => "NumericalFailure",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "LossGoal" => Self::LossGoal,
            "GradientNormGoal" => Self::GradientNormGoal,
            "SelectionLossIncreases" => Self::SelectionLossIncreases,
            "MaximumEpochs" => Self::MaximumEpochs,
            "MaximumTime" => Self::MaximumTime,
            "NumericalFailure" => Self::NumericalFailure,
            "Cancelled" => Self::Cancelled,
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "unknown stopping condition {other:?}"
                )))
            }
        })
    }
}

/// Termination settings shared by every optimizer. The predicate is a
/// disjunction evaluated once per epoch, in this order: loss goal, gradient
/// norm goal, early stopping, epoch budget, time budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoppingCriteria {
    /// Stop when the training loss falls below this.
    pub loss_goal: Float,
    /// Stop when the gradient norm falls below this.
    pub gradient_norm_goal: Float,
    /// Stop after this many consecutive epochs of rising selection loss.
    pub max_selection_failures: usize,
    pub max_epochs: usize,
    pub max_time: Duration,
}

impl Default for StoppingCriteria {
    fn default() -> Self {
        Self {
            loss_goal: 0.0,
            gradient_norm_goal: 0.0,
            max_selection_failures: usize::MAX,
            max_epochs: 1000,
            max_time: Duration::from_secs(3600),
        }
    }
}

/// Per-run bookkeeping for the stopping predicate: wall clock, the previous
/// epoch's selection loss, and the consecutive-failure counter.
pub(crate) struct EpochControl {
    criteria: StoppingCriteria,
    start: Instant,
    previous_selection_loss: Option<Float>,
    selection_failures: usize,
}

impl EpochControl {
    pub fn new(criteria: StoppingCriteria) -> Self {
        Self {
            criteria,
            start: Instant::now(),
            previous_selection_loss: None,
            selection_failures: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Record an epoch's selection loss and update the failure counter:
    /// rising loss extends the streak, anything else resets it.
    pub fn observe_selection(&mut self, selection_loss: Float) {
        if let Some(previous) = self.previous_selection_loss {
            if selection_loss > previous {
                self.selection_failures += 1;
            } else {
                self.selection_failures = 0;
            }
        }
        self.previous_selection_loss = Some(selection_loss);
    }

    /// The ordered predicate. `gradient_norm` is absent for optimizers that
    /// have no gradient (evolutionary search).
    pub fn check(
        &self,
        epoch: usize,
        training_loss: Float,
        gradient_norm: Option<Float>,
    ) -> Option<StoppingCondition> {
        if training_loss < self.criteria.loss_goal {
            return Some(StoppingCondition::LossGoal);
        }
        if let Some(norm) = gradient_norm {
            if norm < self.criteria.gradient_norm_goal {
                return Some(StoppingCondition::GradientNormGoal);
            }
        }
        if self.selection_failures >= self.criteria.max_selection_failures {
            return Some(StoppingCondition::SelectionLossIncreases);
        }
        if epoch + 1 >= self.criteria.max_epochs {
            return Some(StoppingCondition::MaximumEpochs);
        }
        if self.start.elapsed() >= self.criteria.max_time {
            return Some(StoppingCondition::MaximumTime);
        }
        None
    }
}
