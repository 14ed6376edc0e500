use crate::optim::line_search::LineSearch;
use crate::optim::{numerical_failure_retreat, RunRecorder, TrainingContext};
use crate::{StoppingCondition, StoppingCriteria, TrainingResults};
use skein::{Error, Float, Result};
use skein_la::DVec;

const NAME: &str = "conjugate gradient";

/// Direction update rule for the conjugate gradient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConjugateGradientMethod {
    FletcherReeves,
    PolakRibiere,
}

impl ConjugateGradientMethod {
    pub fn name(self) -> &'static str {
        match self {
            Self::FletcherReeves => "FletcherReeves",
            Self::PolakRibiere => "PolakRibiere",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "FletcherReeves" => Self::FletcherReeves,
            "PolakRibiere" => Self::PolakRibiere,
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "unknown conjugate gradient method {other:?}"
                )))
            }
        })
    }
}

/// Conjugate-gradient descent with a bracketing line search. The direction
/// restarts to steepest descent every `restart_interval` epochs (0 means
/// the parameter count) and whenever the conjugate direction stops being a
/// descent direction.
#[derive(Debug, Clone)]
pub struct ConjugateGradient {
    pub method: ConjugateGradientMethod,
    pub line_search: LineSearch,
    /// Epochs between forced steepest-descent restarts; 0 picks the
    /// parameter count.
    pub restart_interval: usize,
    pub criteria: StoppingCriteria,
}

impl ConjugateGradient {
    pub fn new() -> Self {
        Self {
            method: ConjugateGradientMethod::PolakRibiere,
            line_search: LineSearch::default(),
            restart_interval: 0,
            criteria: StoppingCriteria::default(),
        }
    }

    pub fn train(&self, ctx: &mut TrainingContext<'_>) -> Result<TrainingResults> {
        let mut recorder = RunRecorder::new(self.criteria);
        let mut last_accepted = ctx.parameters();
        let mut consecutive_failures = 0usize;
        let mut epoch = 0usize;
        let restart_every = if self.restart_interval == 0 {
            last_accepted.len().max(1)
        } else {
            self.restart_interval
        };

        let mut previous_gradient: Option<DVec<Float>> = None;
        let mut previous_direction: Option<DVec<Float>> = None;

        let condition = loop {
            if ctx.cancelled() {
                break StoppingCondition::Cancelled;
            }

            let (loss, gradient) = ctx.loss_and_gradient()?;
            if !loss.is_finite() || !gradient.is_finite() {
                if numerical_failure_retreat(ctx, &last_accepted, &mut consecutive_failures)? {
                    break StoppingCondition::NumericalFailure;
                }
                previous_gradient = None;
                previous_direction = None;
                continue;
            }
            consecutive_failures = 0;
            last_accepted = ctx.parameters();

            if let Some(condition) =
                recorder.record(ctx, NAME, epoch, loss, Some(gradient.norm()))?
            {
                break condition;
            }

            let restart = epoch % restart_every == 0;
            let direction = match (&previous_gradient, &previous_direction) {
                (Some(prev_g), Some(prev_d)) if !restart => {
                    let denominator = prev_g.norm_sq();
                    let beta = match self.method {
                        ConjugateGradientMethod::FletcherReeves => {
                            gradient.norm_sq() / denominator
                        }
                        ConjugateGradientMethod::PolakRibiere => {
                            (gradient.dot(&(&gradient - prev_g)) / denominator).max(0.0)
                        }
                    };
                    let mut d = -&gradient;
                    d.axpy(beta, prev_d);
                    // Non-descent conjugate directions restart to steepest
                    // descent.
                    if d.dot(&gradient) >= 0.0 {
                        -&gradient
                    } else {
                        d
                    }
                }
                _ => -&gradient,
            };

            let base = last_accepted.clone();
            let step = self
                .line_search
                .find(loss, |s| ctx.step_loss(&base, &direction, s))?;
            let mut parameters = base;
            parameters.axpy(step, &direction);
            ctx.set_parameters(&parameters)?;

            previous_gradient = Some(gradient);
            previous_direction = Some(direction);
            epoch += 1;
        };

        Ok(recorder.finish(ctx, NAME, condition))
    }
}

impl Default for ConjugateGradient {
    fn default() -> Self {
        Self::new()
    }
}
