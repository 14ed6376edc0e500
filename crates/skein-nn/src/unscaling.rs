use crate::layer::{LayerBackward, LayerForward};
use crate::scaling::ScalingMethod;
use skein::{Device, Error, Float, Result};
use skein_la::DVec;
use skein_tensor::{Descriptives, Tensor};

/// Per-feature affine transform out of network range, the inverse of
/// [`ScalingLayer`](crate::ScalingLayer) under the same method and
/// descriptives. Last layer of a regression stack (before optional
/// bounding); owns no trainable parameters.
#[derive(Debug, Clone)]
pub struct UnscalingLayer {
    descriptives: Vec<Descriptives<Float>>,
    method: ScalingMethod,
}

impl UnscalingLayer {
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
                "UnscalingLayer::set_descriptives",
                self.descriptives.len(),
                descriptives.len(),
            ));
        }
        self.descriptives = descriptives;
        Ok(())
    }

    /// Unscaled = slope * y + offset, the inverse of the scaling affine.
    fn affine(&self, j: usize) -> (Float, Float) {
        let d = &self.descriptives[j];
        match self.method {
            ScalingMethod::NoScaling => (1.0, 0.0),
            ScalingMethod::MinimumMaximum => {
                let range = d.maximum - d.minimum;
                if range.abs() < Float::EPSILON {
                    (1.0, 0.0)
                } else {
                    (range / 2.0, d.minimum + range / 2.0)
                }
            }
            ScalingMethod::MeanStandardDeviation => {
                if d.standard_deviation.abs() < Float::EPSILON {
                    (1.0, 0.0)
                } else {
                    (d.standard_deviation, d.mean)
                }
            }
            ScalingMethod::StandardDeviation => {
                if d.standard_deviation.abs() < Float::EPSILON {
                    (1.0, 0.0)
                } else {
                    (d.standard_deviation, 0.0)
                }
            }
        }
    }

    pub fn forward(&self, inputs: &Tensor<Float>, _device: &Device) -> Result<LayerForward> {
        let n = self.neurons_number();
        if inputs.ndim() != 2 || inputs.dims()[1] != n {
            return Err(Error::shape("UnscalingLayer::forward", n, inputs.dims()));
        }
        let mut out = inputs.clone();
        for (i, v) in out.data_mut().iter_mut().enumerate() {
            let (slope, offset) = self.affine(i % n);
            *v = slope * *v + offset;
        }
        Ok(LayerForward {
            combinations: out.clone(),
            activations: out,
            aux: Vec::new(),
        })
    }

    pub fn backward(
        &self,
        _inputs: &Tensor<Float>,
        delta: &Tensor<Float>,
        _device: &Device,
    ) -> Result<LayerBackward> {
        let n = self.neurons_number();
        let mut input_delta = delta.clone();
        for (i, v) in input_delta.data_mut().iter_mut().enumerate() {
            let (slope, _) = self.affine(i % n);
            *v *= slope;
        }
        Ok(LayerBackward {
            input_delta,
            gradient: DVec::zeros(0),
        })
    }
}
