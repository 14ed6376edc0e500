use crate::layer::{LayerBackward, LayerForward};
use skein::{Device, Error, Float, Result};
use skein_la::DVec;
use skein_tensor::{Descriptives, Tensor};

/// How a feature is mapped into network range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingMethod {
    NoScaling,
    /// Maps [min, max] to [-1, 1].
    MinimumMaximum,
    MeanStandardDeviation,
    StandardDeviation,
}

impl ScalingMethod {
    pub fn name(self) -> &'static str {
        match self {
            Self::NoScaling => "NoScaling",
            Self::MinimumMaximum => "MinimumMaximum",
            Self::MeanStandardDeviation => "MeanStandardDeviation",
            Self::StandardDeviation => "StandardDeviation",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "NoScaling" => Self::NoScaling,
            "MinimumMaximum" => Self::MinimumMaximum,
            "MeanStandardDeviation" => Self::MeanStandardDeviation,
            "StandardDeviation" => Self::StandardDeviation,
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "unknown scaling method {other:?}"
                )))
            }
        })
    }
}

/// Per-feature affine transform into network range. First layer of every
/// non-empty network; owns no trainable parameters.
///
/// A degenerate feature (zero spread) passes through unchanged.
#[derive(Debug, Clone)]
pub struct ScalingLayer {
    descriptives: Vec<Descriptives<Float>>,
    method: ScalingMethod,
}

impl ScalingLayer {
    pub fn new(neurons: usize) -> Self {
        Self {
            descriptives: vec![Descriptives::default(); neurons],
            method: ScalingMethod::MeanStandardDeviation,
        }
    }

    pub fn neurons_number(&self) -> usize {
        self.descriptives.len()
    }

    pub fn method(&self) -> ScalingMethod {
        self.method
    }

    pub fn set_method(&mut self, method: ScalingMethod) {
        self.method = method;
    }

    pub fn descriptives(&self) -> &[Descriptives<Float>] {
        &self.descriptives
    }

    pub fn set_descriptives(&mut self, descriptives: Vec<Descriptives<Float>>) -> Result<()> {
        if descriptives.len() != self.descriptives.len() {
            return Err(Error::shape(
                "ScalingLayer::set_descriptives",
                self.descriptives.len(),
                descriptives.len(),
            ));
        }
        self.descriptives = descriptives;
        Ok(())
    }

    /// Affine slope and offset for feature `j`: scaled = slope * x + offset.
    fn affine(&self, j: usize) -> (Float, Float) {
        let d = &self.descriptives[j];
        match self.method {
            ScalingMethod::NoScaling => (1.0, 0.0),
            ScalingMethod::MinimumMaximum => {
                let range = d.maximum - d.minimum;
                if range.abs() < Float::EPSILON {
                    (1.0, 0.0)
                } else {
                    (2.0 / range, -1.0 - 2.0 * d.minimum / range)
                }
            }
            ScalingMethod::MeanStandardDeviation => {
                if d.standard_deviation.abs() < Float::EPSILON {
                    (1.0, 0.0)
                } else {
                    (
                        1.0 / d.standard_deviation,
                        -d.mean / d.standard_deviation,
                    )
                }
            }
            ScalingMethod::StandardDeviation => {
                if d.standard_deviation.abs() < Float::EPSILON {
                    (1.0, 0.0)
                } else {
                    (1.0 / d.standard_deviation, 0.0)
                }
            }
        }
    }

    pub fn forward(&self, inputs: &Tensor<Float>, _device: &Device) -> Result<LayerForward> {
        let outputs = self.apply_affine(inputs, |slope, offset, x| slope * x + offset)?;
        Ok(LayerForward {
            combinations: outputs.clone(),
            activations: outputs,
            aux: Vec::new(),
        })
    }

    /// Invert the transform; used by tests and by the unscaling pairing.
    pub fn invert(&self, outputs: &Tensor<Float>) -> Result<Tensor<Float>> {
        self.apply_affine(outputs, |slope, offset, y| (y - offset) / slope)
    }

    fn apply_affine(
        &self,
        inputs: &Tensor<Float>,
        f: impl Fn(Float, Float, Float) -> Float,
    ) -> Result<Tensor<Float>> {
        let n = self.neurons_number();
        if inputs.ndim() != 2 || inputs.dims()[1] != n {
            return Err(Error::shape("ScalingLayer::forward", n, inputs.dims()));
        }
        let mut out = inputs.clone();
        let cols = n;
        for (i, v) in out.data_mut().iter_mut().enumerate() {
            let (slope, offset) = self.affine(i % cols);
            *v = f(slope, offset, *v);
        }
        Ok(out)
    }

    pub fn backward(
        &self,
        _inputs: &Tensor<Float>,
        delta: &Tensor<Float>,
        _device: &Device,
    ) -> Result<LayerBackward> {
        let cols = self.neurons_number();
        let mut input_delta = delta.clone();
        for (i, v) in input_delta.data_mut().iter_mut().enumerate() {
            let (slope, _) = self.affine(i % cols);
            *v *= slope;
        }
        Ok(LayerBackward {
            input_delta,
            gradient: DVec::zeros(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_tensor::Shape;

    const DEV: Device = Device::SingleThreaded;

    fn stats() -> Vec<Descriptives<Float>> {
        vec![
            Descriptives {
                minimum: 0.0,
                maximum: 10.0,
                mean: 5.0,
                standard_deviation: 2.0,
            },
            Descriptives {
                minimum: -1.0,
                maximum: 1.0,
                mean: 0.0,
                standard_deviation: 0.5,
            },
        ]
    }

    #[test]
    fn minimum_maximum_maps_to_unit_range() {
        let mut layer = ScalingLayer::new(2);
        layer.set_descriptives(stats()).unwrap();
        layer.set_method(ScalingMethod::MinimumMaximum);

        let x = Tensor::new(vec![0.0, -1.0, 10.0, 1.0], Shape::matrix(2, 2));
        let out = layer.forward(&x, &DEV).unwrap().activations;
        assert_eq!(out.data(), &[-1.0, -1.0, 1.0, 1.0]);
    }

    #[test]
    fn mean_standard_deviation_centers() {
        let mut layer = ScalingLayer::new(2);
        layer.set_descriptives(stats()).unwrap();

        let x = Tensor::new(vec![5.0, 0.5, 7.0, 0.0], Shape::matrix(2, 2));
        let out = layer.forward(&x, &DEV).unwrap().activations;
        assert_eq!(out.data(), &[0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn invert_undoes_forward() {
        for method in [
            ScalingMethod::NoScaling,
            ScalingMethod::MinimumMaximum,
            ScalingMethod::MeanStandardDeviation,
            ScalingMethod::StandardDeviation,
        ] {
            let mut layer = ScalingLayer::new(2);
            layer.set_descriptives(stats()).unwrap();
            layer.set_method(method);

            let x = Tensor::new(vec![3.0, 0.25, -2.0, 0.75], Shape::matrix(2, 2));
            let scaled = layer.forward(&x, &DEV).unwrap().activations;
            let back = layer.invert(&scaled).unwrap();
            for (a, b) in x.data().iter().zip(back.data()) {
                assert!((a - b).abs() < 1e-12, "{}: {a} vs {b}", method.name());
            }
        }
    }

    #[test]
    fn degenerate_feature_passes_through() {
        let mut layer = ScalingLayer::new(1);
        layer
            .set_descriptives(vec![Descriptives {
                minimum: 3.0,
                maximum: 3.0,
                mean: 3.0,
                standard_deviation: 0.0,
            }])
            .unwrap();
        let x = Tensor::new(vec![3.0], Shape::matrix(1, 1));
        let out = layer.forward(&x, &DEV).unwrap().activations;
        assert_eq!(out.data(), &[3.0]);
    }

    #[test]
    fn wrong_width_is_shape_mismatch() {
        let layer = ScalingLayer::new(2);
        let x = Tensor::new(vec![1.0, 2.0, 3.0], Shape::matrix(1, 3));
        assert!(layer.forward(&x, &DEV).is_err());
    }
}
