use crate::optim::line_search::LineSearch;
use crate::optim::{numerical_failure_retreat, RunRecorder, TrainingContext};
use crate::{StoppingCondition, StoppingCriteria, TrainingResults};
use skein::{Error, Float, Result};
use skein_la::{DMat, DVec};

const NAME: &str = "quasi-Newton";

/// Inverse-Hessian approximation update rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InverseHessianUpdate {
    Bfgs,
    Dfp,
}

impl InverseHessianUpdate {
    pub fn name(self) -> &'static str {
        match self {
            Self::Bfgs => "BFGS",
            Self::Dfp => "DFP",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "BFGS" => Self::Bfgs,
            "DFP" => Self::Dfp,
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "unknown inverse hessian update {other:?}"
                )))
            }
        })
    }
}

/// Quasi-Newton descent: the direction is the gradient premultiplied by a
/// running inverse-Hessian approximation, refined each epoch by a BFGS or
/// DFP update and reset to the identity when curvature turns non-positive.
#[derive(Debug, Clone)]
pub struct QuasiNewton {
    pub update: InverseHessianUpdate,
    pub line_search: LineSearch,
    pub criteria: StoppingCriteria,
}

impl QuasiNewton {
    pub fn new() -> Self {
        Self {
            update: InverseHessianUpdate::Bfgs,
            line_search: LineSearch::default(),
            criteria: StoppingCriteria::default(),
        }
    }

    pub fn train(&self, ctx: &mut TrainingContext<'_>) -> Result<TrainingResults> {
        let mut recorder = RunRecorder::new(self.criteria);
        let mut last_accepted = ctx.parameters();
        let n = last_accepted.len();
        let mut consecutive_failures = 0usize;
        let mut epoch = 0usize;

        let mut inverse_hessian = DMat::<Float>::identity(n);
        let mut previous: Option<(DVec<Float>, DVec<Float>)> = None; // (parameters, gradient)

        let condition = loop {
            if ctx.cancelled() {
                break StoppingCondition::Cancelled;
            }

            let (loss, gradient) = ctx.loss_and_gradient()?;
            if !loss.is_finite() || !gradient.is_finite() {
                if numerical_failure_retreat(ctx, &last_accepted, &mut consecutive_failures)? {
                    break StoppingCondition::NumericalFailure;
                }
                inverse_hessian = DMat::identity(n);
                previous = None;
                continue;
            }
            consecutive_failures = 0;
            let parameters = ctx.parameters();
            last_accepted = parameters.clone();

            // Refine the approximation from the last accepted step.
            if let Some((prev_p, prev_g)) = &previous {
                let s = &parameters - prev_p;
                let y = &gradient - prev_g;
                let sy = s.dot(&y);
                if sy <= 1e-12 {
                    // Non-positive curvature: recover by resetting.
                    inverse_hessian = DMat::identity(n);
                } else {
                    match self.update {
                        InverseHessianUpdate::Bfgs => {
                            bfgs_update(&mut inverse_hessian, &s, &y, sy)
                        }
                        InverseHessianUpdate::Dfp => dfp_update(&mut inverse_hessian, &s, &y, sy),
                    }
                }
            }
            previous = Some((parameters.clone(), gradient.clone()));

            if let Some(condition) =
                recorder.record(ctx, NAME, epoch, loss, Some(gradient.norm()))?
            {
                break condition;
            }

            let mut direction = -&inverse_hessian.mul_vec(&gradient);
            if direction.dot(&gradient) >= 0.0 {
                inverse_hessian = DMat::identity(n);
                direction = -&gradient;
            }

            let base = parameters;
            let step = self
                .line_search
                .find(loss, |s| ctx.step_loss(&base, &direction, s))?;
            let mut next = base;
            next.axpy(step, &direction);
            ctx.set_parameters(&next)?;
            epoch += 1;
        };

        Ok(recorder.finish(ctx, NAME, condition))
    }
}

impl Default for QuasiNewton {
    fn default() -> Self {
        Self::new()
    }
}

/// H <- H + (1 + y'Hy/sy) ss'/sy - (Hys' + sy'H)/sy
fn bfgs_update(h: &mut DMat<Float>, s: &DVec<Float>, y: &DVec<Float>, sy: Float) {
    let n = s.len();
    let hy = h.mul_vec(y);
    let yhy = y.dot(&hy);
    let c1 = (1.0 + yhy / sy) / sy;
    for i in 0..n {
        for j in 0..n {
            let v = h.get(i, j) + c1 * s[i] * s[j] - (hy[i] * s[j] + s[i] * hy[j]) / sy;
            h.set(i, j, v);
        }
    }
}

/// H <- H + ss'/sy - (Hy)(Hy)'/y'Hy
fn dfp_update(h: &mut DMat<Float>, s: &DVec<Float>, y: &DVec<Float>, sy: Float) {
    let n = s.len();
    let hy = h.mul_vec(y);
    let yhy = y.dot(&hy);
    if yhy <= 1e-12 {
        return;
    }
    for i in 0..n {
        for j in 0..n {
            let v = h.get(i, j) + s[i] * s[j] / sy - hy[i] * hy[j] / yhy;
            h.set(i, j, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bfgs_update_stays_symmetric() {
        let mut h = DMat::<Float>::identity(3);
        let s = DVec::from_slice(&[0.1, -0.2, 0.3]);
        let y = DVec::from_slice(&[0.2, -0.1, 0.4]);
        let sy = s.dot(&y);
        bfgs_update(&mut h, &s, &y, sy);
        for i in 0..3 {
            for j in 0..3 {
                assert!(
                    (h.get(i, j) - h.get(j, i)).abs() < 1e-12,
                    "asymmetry at ({i}, {j})"
                );
            }
        }
    }

    #[test]
    fn dfp_update_stays_symmetric() {
        let mut h = DMat::<Float>::identity(3);
        let s = DVec::from_slice(&[0.3, 0.1, -0.2]);
        let y = DVec::from_slice(&[0.25, 0.05, -0.15]);
        let sy = s.dot(&y);
        dfp_update(&mut h, &s, &y, sy);
        for i in 0..3 {
            for j in 0..3 {
                assert!((h.get(i, j) - h.get(j, i)).abs() < 1e-12);
            }
        }
    }
}
