use skein::{Error, Float, Result};

const SELU_LAMBDA: Float = 1.0507009873554805;
const SELU_ALPHA: Float = 1.6732632423543772;

/// Elementwise nonlinearity applied to a layer's combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Threshold,
    SymmetricThreshold,
    Logistic,
    HyperbolicTangent,
    Linear,
    RectifiedLinear,
    ScaledExponentialLinear,
    SoftPlus,
    SoftSign,
    HardSigmoid,
    ExponentialLinear,
}

impl Activation {
    /// Activation value from a combination.
    pub fn apply(self, x: Float) -> Float {
        match self {
            Self::Threshold => {
                if x < 0.0 {
                    0.0
                } else {
                    1.0
                }
            }
            Self::SymmetricThreshold => {
                if x < 0.0 {
                    -1.0
                } else {
                    1.0
                }
            }
            Self::Logistic => 1.0 / (1.0 + (-x).exp()),
            Self::HyperbolicTangent => x.tanh(),
            Self::Linear => x,
            Self::RectifiedLinear => {
                if x > 0.0 {
                    x
                } else {
                    0.0
                }
            }
            Self::ScaledExponentialLinear => {
                if x > 0.0 {
                    SELU_LAMBDA * x
                } else {
                    SELU_LAMBDA * SELU_ALPHA * (x.exp() - 1.0)
                }
            }
            Self::SoftPlus => (1.0 + x.exp()).ln(),
            Self::SoftSign => x / (1.0 + x.abs()),
            Self::HardSigmoid => {
                if x < -2.5 {
                    0.0
                } else if x > 2.5 {
                    1.0
                } else {
                    0.2 * x + 0.5
                }
            }
            Self::ExponentialLinear => {
                if x > 0.0 {
                    x
                } else {
                    x.exp() - 1.0
                }
            }
        }
    }

    /// Derivative with respect to the combination. The threshold variants
    /// are flat almost everywhere, so their derivative is zero.
    pub fn derivative(self, x: Float) -> Float {
        match self {
            Self::Threshold | Self::SymmetricThreshold => 0.0,
            Self::Logistic => {
                let a = Self::Logistic.apply(x);
                a * (1.0 - a)
            }
            Self::HyperbolicTangent => {
                let t = x.tanh();
                1.0 - t * t
            }
            Self::Linear => 1.0,
            Self::RectifiedLinear => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::ScaledExponentialLinear => {
                if x > 0.0 {
                    SELU_LAMBDA
                } else {
                    SELU_LAMBDA * SELU_ALPHA * x.exp()
                }
            }
            Self::SoftPlus => 1.0 / (1.0 + (-x).exp()),
            Self::SoftSign => {
                let d = 1.0 + x.abs();
                1.0 / (d * d)
            }
            Self::HardSigmoid => {
                if (-2.5..=2.5).contains(&x) {
                    0.2
                } else {
                    0.0
                }
            }
            Self::ExponentialLinear => {
                if x > 0.0 {
                    1.0
                } else {
                    x.exp()
                }
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Threshold => "Threshold",
            Self::SymmetricThreshold => "SymmetricThreshold",
            Self::Logistic => "Logistic",
            Self::HyperbolicTangent => "HyperbolicTangent",
            Self::Linear => "Linear",
            Self::RectifiedLinear => "RectifiedLinear",
            Self::ScaledExponentialLinear => "ScaledExponentialLinear",
            Self::SoftPlus => "SoftPlus",
            Self::SoftSign => "SoftSign",
            Self::HardSigmoid => "HardSigmoid",
            Self::ExponentialLinear => "ExponentialLinear",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "Threshold" => Self::Threshold,
            "SymmetricThreshold" => Self::SymmetricThreshold,
            "Logistic" => Self::Logistic,
            "HyperbolicTangent" => Self::HyperbolicTangent,
            "Linear" => Self::Linear,
            "RectifiedLinear" => Self::RectifiedLinear,
            "ScaledExponentialLinear" => Self::ScaledExponentialLinear,
            "SoftPlus" => Self::SoftPlus,
            "SoftSign" => Self::SoftSign,
            "HardSigmoid" => Self::HardSigmoid,
            "ExponentialLinear" => Self::ExponentialLinear,
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "unknown activation {other:?}"
                )))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Activation; 11] = [
        Activation::Threshold,
        Activation::SymmetricThreshold,
        Activation::Logistic,
        Activation::HyperbolicTangent,
        Activation::Linear,
        Activation::RectifiedLinear,
        Activation::ScaledExponentialLinear,
        Activation::SoftPlus,
        Activation::SoftSign,
        Activation::HardSigmoid,
        Activation::ExponentialLinear,
    ];

    #[test]
    fn known_values() {
        assert_eq!(Activation::Threshold.apply(-0.1), 0.0);
        assert_eq!(Activation::SymmetricThreshold.apply(-0.1), -1.0);
        assert!((Activation::Logistic.apply(0.0) - 0.5).abs() < 1e-12);
        assert_eq!(Activation::RectifiedLinear.apply(-3.0), 0.0);
        assert_eq!(Activation::RectifiedLinear.apply(3.0), 3.0);
        assert_eq!(Activation::Linear.apply(1.25), 1.25);
        assert!((Activation::HardSigmoid.apply(0.0) - 0.5).abs() < 1e-12);
        assert_eq!(Activation::HardSigmoid.apply(-3.0), 0.0);
    }

    #[test]
    fn derivatives_match_central_differences() {
        let eps = 1e-6;
        for act in ALL {
            // Avoid the kink points of the piecewise activations.
            for &x in &[-2.0, -0.7, 0.3, 1.9] {
                let numerical = (act.apply(x + eps) - act.apply(x - eps)) / (2.0 * eps);
                let analytical = act.derivative(x);
                assert!(
                    (numerical - analytical).abs() < 1e-5,
                    "{}: derivative mismatch at {x}: {numerical} vs {analytical}",
                    act.name()
                );
            }
        }
    }

    #[test]
    fn names_roundtrip() {
        for act in ALL {
            assert_eq!(Activation::from_name(act.name()).unwrap(), act);
        }
        assert!(Activation::from_name("Swish").is_err());
    }
}
