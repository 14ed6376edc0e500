use crate::optim::{numerical_failure_retreat, RunRecorder, TrainingContext};
use crate::{Regularization, StoppingCondition, StoppingCriteria, TrainingResults};
use skein::{Error, Float, Result};
use skein_la::Lu;

const NAME: &str = "Levenberg-Marquardt";

/// Damped Gauss-Newton for squared-error losses: each epoch solves
/// `(J'J + damping*I) delta = -J'r` and accepts the step only when the loss
/// drops, shrinking the damping on acceptance and growing it on rejection.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardt {
    pub initial_damping: Float,
    pub damping_factor: Float,
    pub minimum_damping: Float,
    pub maximum_damping: Float,
    pub criteria: StoppingCriteria,
}

impl LevenbergMarquardt {
    pub fn new() -> Self {
        Self {
            initial_damping: 1e-3,
            damping_factor: 10.0,
            minimum_damping: 1e-12,
            maximum_damping: 1e12,
            criteria: StoppingCriteria::default(),
        }
    }

    pub fn train(&self, ctx: &mut TrainingContext<'_>) -> Result<TrainingResults> {
        // The squared-error family check happens in residuals(); the
        // regularization term has no residual formulation.
        if ctx.loss_index.regularization() != Regularization::None {
            return Err(Error::InvalidConfiguration(
                "Levenberg-Marquardt does not support a regularization term".into(),
            ));
        }

        let mut recorder = RunRecorder::new(self.criteria);
        let mut last_accepted = ctx.parameters();
        let mut consecutive_failures = 0usize;
        let mut damping = self.initial_damping;
        let mut epoch = 0usize;

        let condition = loop {
            if ctx.cancelled() {
                break StoppingCondition::Cancelled;
            }

            let residuals = ctx.loss_index.residuals(
                ctx.network,
                &ctx.training_inputs,
                &ctx.training_targets,
                ctx.device,
            )?;
            let loss = residuals.norm_sq();
            let jacobian = ctx.loss_index.residual_jacobian(
                ctx.network,
                &ctx.training_inputs,
                &ctx.training_targets,
                ctx.device,
            )?;
            let gradient = &jacobian.tr_mul_vec(&residuals) * 2.0;

            if !loss.is_finite() || !gradient.is_finite() {
                if numerical_failure_retreat(ctx, &last_accepted, &mut consecutive_failures)? {
                    break StoppingCondition::NumericalFailure;
                }
                damping = (damping * self.damping_factor).min(self.maximum_damping);
                continue;
            }
            consecutive_failures = 0;
            last_accepted = ctx.parameters();

            if let Some(condition) =
                recorder.record(ctx, NAME, epoch, loss, Some(gradient.norm()))?
            {
                break condition;
            }

            // Damped normal equations; a singular system grows the damping
            // and tries again within the same epoch.
            let gram = jacobian.gram();
            let neg_jtr = -&jacobian.tr_mul_vec(&residuals);
            let mut delta = None;
            for _ in 0..32 {
                let mut damped = gram.clone();
                damped.add_diagonal(damping);
                if let Some(lu) = Lu::new(&damped) {
                    delta = Some(lu.solve(&neg_jtr));
                    break;
                }
                damping = (damping * self.damping_factor).min(self.maximum_damping);
            }
            let Some(delta) = delta else {
                break StoppingCondition::NumericalFailure;
            };

            let mut trial = last_accepted.clone();
            trial.axpy(1.0, &delta);
            ctx.set_parameters(&trial)?;
            let trial_loss = ctx.training_loss()?;

            if trial_loss.is_finite() && trial_loss < loss {
                damping = (damping / self.damping_factor).max(self.minimum_damping);
            } else {
                ctx.set_parameters(&last_accepted)?;
                damping = (damping * self.damping_factor).min(self.maximum_damping);
            }
            epoch += 1;
        };

        Ok(recorder.finish(ctx, NAME, condition))
    }
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self::new()
    }
}
