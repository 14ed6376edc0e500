use crate::layer::{LayerBackward, LayerForward};
use skein::{Device, Error, Float, Result};
use skein_la::DVec;
use skein_tensor::Tensor;

/// Element-wise clamp to per-feature [lower, upper]. No trainable
/// parameters; applying it twice equals applying it once.
#[derive(Debug, Clone)]
pub struct BoundingLayer {
    lower_bounds: Vec<Float>,
    upper_bounds: Vec<Float>,
}

impl BoundingLayer {
    /// Unbounded layer: every feature clamps to (-inf, inf).
    pub fn new(neurons: usize) -> Self {
        Self {
            lower_bounds: vec![Float::NEG_INFINITY; neurons],
            upper_bounds: vec![Float::INFINITY; neurons],
        }
    }

    pub fn neurons_number(&self) -> usize {
        self.lower_bounds.len()
    }

    pub fn lower_bounds(&self) -> &[Float] {
        &self.lower_bounds
    }

    pub fn upper_bounds(&self) -> &[Float] {
        &self.upper_bounds
    }

    pub fn set_bounds(&mut self, lower: Vec<Float>, upper: Vec<Float>) -> Result<()> {
        let n = self.neurons_number();
        if lower.len() != n || upper.len() != n {
            return Err(Error::shape(
                "BoundingLayer::set_bounds",
                n,
                (lower.len(), upper.len()),
            ));
        }
        for j in 0..n {
            if lower[j] > upper[j] {
                return Err(Error::InvalidConfiguration(format!(
                    "bounding feature {j}: lower {} exceeds upper {}",
                    lower[j], upper[j]
                )));
            }
        }
        self.lower_bounds = lower;
        self.upper_bounds = upper;
        Ok(())
    }

    pub fn forward(&self, inputs: &Tensor<Float>, _device: &Device) -> Result<LayerForward> {
        let n = self.neurons_number();
        if inputs.ndim() != 2 || inputs.dims()[1] != n {
            return Err(Error::shape("BoundingLayer::forward", n, inputs.dims()));
        }
        let mut out = inputs.clone();
        for (i, v) in out.data_mut().iter_mut().enumerate() {
            let j = i % n;
            *v = v.clamp(self.lower_bounds[j], self.upper_bounds[j]);
        }
        Ok(LayerForward {
            combinations: out.clone(),
            activations: out,
            aux: Vec::new(),
        })
    }

    /// Subgradient: passes the delta through where the input was within
    /// bounds, zero where it was clamped.
    pub fn backward(
        &self,
        inputs: &Tensor<Float>,
        delta: &Tensor<Float>,
        _device: &Device,
    ) -> Result<LayerBackward> {
        let n = self.neurons_number();
        let mut input_delta = delta.clone();
        for (i, v) in input_delta.data_mut().iter_mut().enumerate() {
            let j = i % n;
            let x = inputs.data()[i];
            if x < self.lower_bounds[j] || x > self.upper_bounds[j] {
                *v = 0.0;
            }
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

    #[test]
    fn clamps_to_bounds() {
        let mut layer = BoundingLayer::new(2);
        layer.set_bounds(vec![0.0, -1.0], vec![1.0, 1.0]).unwrap();
        let x = Tensor::new(vec![-0.5, -2.0, 0.5, 3.0], Shape::matrix(2, 2));
        let out = layer.forward(&x, &DEV).unwrap().activations;
        assert_eq!(out.data(), &[0.0, -1.0, 0.5, 1.0]);
    }

    #[test]
    fn idempotent() {
        let mut layer = BoundingLayer::new(1);
        layer.set_bounds(vec![-1.0], vec![1.0]).unwrap();
        let x = Tensor::new(vec![-5.0, 0.3, 5.0], Shape::matrix(3, 1));
        let once = layer.forward(&x, &DEV).unwrap().activations;
        let twice = layer.forward(&once, &DEV).unwrap().activations;
        assert_eq!(once, twice);
    }

    #[test]
    fn inverted_bounds_rejected() {
        let mut layer = BoundingLayer::new(1);
        assert!(layer.set_bounds(vec![2.0], vec![1.0]).is_err());
    }

    #[test]
    fn backward_zeroes_clamped_positions() {
        let mut layer = BoundingLayer::new(1);
        layer.set_bounds(vec![0.0], vec![1.0]).unwrap();
        let x = Tensor::new(vec![-1.0, 0.5, 2.0], Shape::matrix(3, 1));
        let delta = Tensor::new(vec![1.0, 1.0, 1.0], Shape::matrix(3, 1));
        let back = layer.backward(&x, &delta, &DEV).unwrap();
        assert_eq!(back.input_delta.data(), &[0.0, 1.0, 0.0]);
    }
}
