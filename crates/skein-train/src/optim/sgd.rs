use crate::optim::{numerical_failure_retreat, RunRecorder, TrainingContext};
use crate::{StoppingCondition, StoppingCriteria, TrainingResults};
use skein::{Float, Result, Rng};
use skein_la::DVec;

const NAME: &str = "stochastic gradient descent";

/// Mini-batch gradient descent with optional momentum. Batches are drawn
/// from a fresh shuffle of the training partition every epoch; the stopping
/// predicate is evaluated on the full training partition.
#[derive(Debug, Clone)]
pub struct StochasticGradientDescent {
    pub learning_rate: Float,
    pub momentum: Float,
    pub batch_size: usize,
    pub seed: u64,
    pub criteria: StoppingCriteria,
}

impl StochasticGradientDescent {
    pub fn new() -> Self {
        Self {
            learning_rate: 0.01,
            momentum: 0.0,
            batch_size: 32,
            seed: 0,
            criteria: StoppingCriteria::default(),
        }
    }

    pub fn train(&self, ctx: &mut TrainingContext<'_>) -> Result<TrainingResults> {
        let mut recorder = RunRecorder::new(self.criteria);
        let mut last_accepted = ctx.parameters();
        let mut consecutive_failures = 0usize;
        let mut epoch = 0usize;
        let mut rng = Rng::new(self.seed);
        let samples = ctx.training_inputs.dims()[0];
        let batch_size = self.batch_size.max(1);
        let mut velocity = DVec::<Float>::zeros(last_accepted.len());
        let mut rate_scale: Float = 1.0;

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
                velocity.fill(0.0);
                continue;
            }
            consecutive_failures = 0;
            last_accepted = ctx.parameters();

            if let Some(condition) =
                recorder.record(ctx, NAME, epoch, loss, Some(gradient.norm()))?
            {
                break condition;
            }

            let mut order: Vec<usize> = (0..samples).collect();
            rng.shuffle(&mut order);

            let rate = self.learning_rate * rate_scale;
            let mut parameters = last_accepted.clone();
            for batch in order.chunks(batch_size) {
                let batch_inputs = ctx.training_inputs.gather_rows(batch)?;
                let batch_targets = ctx.training_targets.gather_rows(batch)?;
                let (_, batch_gradient) = ctx.loss_index.loss_and_gradient(
                    ctx.network,
                    &batch_inputs,
                    &batch_targets,
                    ctx.device,
                )?;

                if self.momentum > 0.0 {
                    velocity.scale(self.momentum);
                    velocity.axpy(1.0, &batch_gradient);
                    parameters.axpy(-rate, &velocity);
                } else {
                    parameters.axpy(-rate, &batch_gradient);
                }
                ctx.set_parameters(&parameters)?;
            }
            epoch += 1;
        };

        Ok(recorder.finish(ctx, NAME, condition))
    }
}

impl Default for StochasticGradientDescent {
    fn default() -> Self {
        Self::new()
    }
}
