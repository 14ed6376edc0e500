use crate::optim::line_search::LineSearch;
use crate::optim::{numerical_failure_retreat, RunRecorder, TrainingContext};
use crate::{StoppingCondition, StoppingCriteria, TrainingResults};
use skein::{Float, Result};

const NAME: &str = "gradient descent";

/// First-order descent along the negative gradient with either a fixed
/// learning rate or a bracketing line search per epoch.
#[derive(Debug, Clone)]
pub struct GradientDescent {
    /// Step size used when no line search is configured.
    pub learning_rate: Float,
    pub line_search: Option<LineSearch>,
    pub criteria: StoppingCriteria,
}

impl GradientDescent {
    pub fn new() -> Self {
        Self {
            learning_rate: 0.01,
            line_search: Some(LineSearch::default()),
            criteria: StoppingCriteria::default(),
        }
    }

    /// Fixed-rate variant.
    pub fn with_fixed_rate(learning_rate: Float) -> Self {
        Self {
            learning_rate,
            line_search: None,
            criteria: StoppingCriteria::default(),
        }
    }

    pub fn train(&self, ctx: &mut TrainingContext<'_>) -> Result<TrainingResults> {
        let mut recorder = RunRecorder::new(self.criteria);
        let mut last_accepted = ctx.parameters();
        let mut consecutive_failures = 0usize;
        let mut rate_scale: Float = 1.0;
        let mut epoch = 0usize;

        let condition = loop {
            if ctx.cancelled() {
                break StoppingCondition::Cancelled;
            }

            let (loss, gradient) = ctx.loss_and_gradient()?;
            if !loss.is_finite() || !gradient.is_finite() {
                if numerical_failure_retreat(ctx, &last_accepted, &mut consecutive_failures)? {
                    break StoppingCondition::NumericalFailure;
                }
                rate_scale *= 0.5;
                continue;
            }
            consecutive_failures = 0;
            last_accepted = ctx.parameters();

            if let Some(condition) =
                recorder.record(ctx, NAME, epoch, loss, Some(gradient.norm()))?
            {
                break condition;
            }

            let direction = -&gradient;
            let step = match &self.line_search {
                Some(search) => {
                    let base = last_accepted.clone();
                    let step = search.find(loss, |s| ctx.step_loss(&base, &direction, s))?;
                    ctx.set_parameters(&base)?;
                    step * rate_scale
                }
                None => self.learning_rate * rate_scale,
            };

            let mut parameters = last_accepted.clone();
            parameters.axpy(step, &direction);
            ctx.set_parameters(&parameters)?;
            epoch += 1;
        };

        Ok(recorder.finish(ctx, NAME, condition))
    }
}

impl Default for GradientDescent {
    fn default() -> Self {
        Self::new()
    }
}
