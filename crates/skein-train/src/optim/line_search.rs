use skein::{Error, Float, Result};

const GOLDEN: Float = 0.381_966_011_250_105;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSearchMethod {
    GoldenSection,
    BrentMethod,
}

impl LineSearchMethod {
    pub fn name(self) -> &'static str {
        match self {
            Self::GoldenSection => "GoldenSection",
            Self::BrentMethod => "BrentMethod",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "GoldenSection" => Self::GoldenSection,
            "BrentMethod" => Self::BrentMethod,
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "unknown line search method {other:?}"
                )))
            }
        })
    }
}

/// One-dimensional minimization of the loss along a descent direction:
/// bracket a minimum inside [0, training_rate_max], then refine by
/// golden-section or Brent steps. A failed bracket falls back to a small
/// fixed step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSearch {
    pub method: LineSearchMethod,
    pub training_rate_max: Float,
    pub tolerance: Float,
    pub maximum_bracketing_iterations: usize,
    pub fallback_step: Float,
}

impl Default for LineSearch {
    fn default() -> Self {
        Self {
            method: LineSearchMethod::BrentMethod,
            training_rate_max: 10.0,
            tolerance: 1e-3,
            maximum_bracketing_iterations: 32,
            fallback_step: 1e-3,
        }
    }
}

impl LineSearch {
    /// Find a step with `phi(step) < phi(0)`. `phi` evaluates the loss at a
    /// trial step along the direction. Returns the chosen step; never zero.
    pub fn find<F>(&self, phi0: Float, mut phi: F) -> Result<Float>
    where
        F: FnMut(Float) -> Result<Float>,
    {
        // Bracket: shrink from the cap until the loss improves.
        let mut step = self.training_rate_max;
        let mut value = phi(step)?;
        let mut found = value.is_finite() && value < phi0;
        for _ in 0..self.maximum_bracketing_iterations {
            if found {
                break;
            }
            step *= 0.5;
            value = phi(step)?;
            found = value.is_finite() && value < phi0;
        }
        if !found {
            return Ok(self.fallback_step.min(self.training_rate_max));
        }

        // Refine inside [0, hi] around the improving step.
        let hi = (step * 2.0).min(self.training_rate_max);
        match self.method {
            LineSearchMethod::GoldenSection => self.golden_section(0.0, hi, &mut phi),
            LineSearchMethod::BrentMethod => self.brent(0.0, hi, step, value, &mut phi),
        }
    }

    fn golden_section<F>(&self, mut a: Float, mut b: Float, phi: &mut F) -> Result<Float>
    where
        F: FnMut(Float) -> Result<Float>,
    {
        let mut x1 = a + GOLDEN * (b - a);
        let mut x2 = b - GOLDEN * (b - a);
        let mut f1 = phi(x1)?;
        let mut f2 = phi(x2)?;
        for _ in 0..self.maximum_bracketing_iterations {
            if (b - a).abs() < self.tolerance * self.training_rate_max {
                break;
            }
            if f1 < f2 {
                b = x2;
                x2 = x1;
                f2 = f1;
                x1 = a + GOLDEN * (b - a);
                f1 = phi(x1)?;
            } else {
                a = x1;
                x1 = x2;
                f1 = f2;
                x2 = b - GOLDEN * (b - a);
                f2 = phi(x2)?;
            }
        }
        let step = if f1 < f2 { x1 } else { x2 };
        Ok(if step > 0.0 { step } else { self.fallback_step })
    }

    /// Brent refinement: parabolic interpolation through the three best
    /// points, falling back to golden-section steps when the parabola
    /// misbehaves.
    fn brent<F>(
        &self,
        lo: Float,
        hi: Float,
        start: Float,
        start_value: Float,
        phi: &mut F,
    ) -> Result<Float>
    where
        F: FnMut(Float) -> Result<Float>,
    {
        let mut a = lo;
        let mut b = hi;
        let mut x = start;
        let mut w = start;
        let mut v = start;
        let mut fx = start_value;
        let mut fw = start_value;
        let mut fv = start_value;
        let mut e: Float = 0.0;
        let mut d: Float = 0.0;

        for _ in 0..self.maximum_bracketing_iterations {
            let m = 0.5 * (a + b);
            let tol = self.tolerance * x.abs().max(self.training_rate_max * 1e-3);
            if (x - m).abs() + 0.5 * (b - a) <= 2.0 * tol {
                break;
            }

            let mut take_golden = true;
            if e.abs() > tol {
                // Parabola through x, w, v.
                let r = (x - w) * (fx - fv);
                let mut q = (x - v) * (fx - fw);
                let mut p = (x - v) * q - (x - w) * r;
                q = 2.0 * (q - r);
                if q > 0.0 {
                    p = -p;
                }
                q = q.abs();
                if p.abs() < (0.5 * q * e).abs() && p > q * (a - x) && p < q * (b - x) {
                    e = d;
                    d = p / q;
                    take_golden = false;
                }
            }
            if take_golden {
                e = if x < m { b - x } else { a - x };
                d = GOLDEN * e;
            }

            let u = if d.abs() >= tol {
                x + d
            } else {
                x + tol.copysign(d)
            };
            let fu = phi(u)?;

            if fu <= fx {
                if u < x {
                    b = x;
                } else {
                    a = x;
                }
                v = w;
                fv = fw;
                w = x;
                fw = fx;
                x = u;
                fx = fu;
            } else {
                if u < x {
                    a = u;
                } else {
                    b = u;
                }
                if fu <= fw || w == x {
                    v = w;
                    fv = fw;
                    w = u;
                    fw = fu;
                } else if fu <= fv || v == x || v == w {
                    v = u;
                    fv = fu;
                }
            }
        }

        Ok(if x > 0.0 { x } else { self.fallback_step })
    }
}
