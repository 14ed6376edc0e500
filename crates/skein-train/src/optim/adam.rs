use crate::optim::{numerical_failure_retreat, RunRecorder, TrainingContext};
use crate::{StoppingCondition, StoppingCriteria, TrainingResults};
use skein::{Float, Result, Rng};
use skein_la::DVec;

const NAME: &str = "adaptive moment estimation";

/// Adam: mini-batch descent scaled by bias-corrected running estimates of
/// the first and second gradient moments.
#[derive(Debug, Clone)]
pub struct AdaptiveMomentEstimation {
    pub learning_rate: Float,
    pub beta_1: Float,
    pub beta_2: Float,
    pub epsilon: Float,
    pub batch_size: usize,
    pub seed: u64,
    pub criteria: StoppingCriteria,
}

impl AdaptiveMomentEstimation {
    pub fn new() -> Self {
        Self {
            learning_rate: 0.001,
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-8,
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

        let n = last_accepted.len();
        let mut first_moment = DVec::<Float>::zeros(n);
        let mut second_moment = DVec::<Float>::zeros(n);
        let mut step_count = 0usize;
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

                step_count += 1;
                let correction_1 = 1.0 - self.beta_1.powi(step_count as i32);
                let correction_2 = 1.0 - self.beta_2.powi(step_count as i32);
                for k in 0..n {
                    let g = batch_gradient[k];
                    first_moment[k] = self.beta_1 * first_moment[k] + (1.0 - self.beta_1) * g;
                    second_moment[k] =
                        self.beta_2 * second_moment[k] + (1.0 - self.beta_2) * g * g;
                    let m_hat = first_moment[k] / correction_1;
                    let v_hat = second_moment[k] / correction_2;
                    parameters[k] -= rate * m_hat / (v_hat.sqrt() + self.epsilon);
                }
                ctx.set_parameters(&parameters)?;
            }
            epoch += 1;
        };

        Ok(recorder.finish(ctx, NAME, condition))
    }
}

impl Default for AdaptiveMomentEstimation {
    fn default() -> Self {
        Self::new()
    }
}
