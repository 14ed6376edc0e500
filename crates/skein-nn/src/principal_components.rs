use crate::layer::{LayerBackward, LayerForward};
use skein::{Device, Error, Float, Result};
use skein_la::DVec;
use skein_tensor::{Shape, Tensor};

/// Fixed linear projection onto a precomputed principal-component basis:
/// y = (x - means) · basis. The basis is supplied by whoever computed it;
/// nothing here is trained.
#[derive(Debug, Clone)]
pub struct PrincipalComponentsLayer {
    means: DVec<Float>,
    basis: Tensor<Float>,
}

impl PrincipalComponentsLayer {
    /// `basis` is [inputs, components] with one component per column.
    pub fn new(means: Vec<Float>, basis: Tensor<Float>) -> Result<Self> {
        if basis.ndim() != 2 || basis.dims()[0] != means.len() {
            return Err(Error::shape(
                "PrincipalComponentsLayer::new",
                means.len(),
                basis.dims(),
            ));
        }
        Ok(Self {
            means: DVec::from_vec(means),
            basis,
        })
    }

    pub fn inputs_number(&self) -> usize {
        self.basis.dims()[0]
    }

    pub fn outputs_number(&self) -> usize {
        self.basis.dims()[1]
    }

    pub fn means(&self) -> &DVec<Float> {
        &self.means
    }

    pub fn basis(&self) -> &Tensor<Float> {
        &self.basis
    }

    pub fn forward(&self, inputs: &Tensor<Float>, device: &Device) -> Result<LayerForward> {
        if inputs.ndim() != 2 || inputs.dims()[1] != self.inputs_number() {
            return Err(Error::shape(
                "PrincipalComponentsLayer::forward",
                self.inputs_number(),
                inputs.dims(),
            ));
        }
        let n = self.inputs_number();
        let mut centered = inputs.clone();
        for (i, v) in centered.data_mut().iter_mut().enumerate() {
            *v -= self.means[i % n];
        }
        let outputs = centered.matmul(device, &self.basis)?;
        Ok(LayerForward {
            combinations: outputs.clone(),
            activations: outputs,
            aux: Vec::new(),
        })
    }

    pub fn backward(
        &self,
        _inputs: &Tensor<Float>,
        delta: &Tensor<Float>,
        device: &Device,
    ) -> Result<LayerBackward> {
        let input_delta = delta.matmul(device, &self.basis.transpose()?)?;
        Ok(LayerBackward {
            input_delta,
            gradient: DVec::zeros(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEV: Device = Device::SingleThreaded;

    #[test]
    fn projects_centered_inputs() {
        // Basis keeps the first axis and drops the second.
        let basis = Tensor::new(vec![1.0, 0.0], Shape::matrix(2, 1));
        let layer = PrincipalComponentsLayer::new(vec![1.0, 2.0], basis).unwrap();
        let x = Tensor::new(vec![3.0, 7.0, 1.0, 2.0], Shape::matrix(2, 2));
        let out = layer.forward(&x, &DEV).unwrap().activations;
        assert_eq!(out.dims(), &[2, 1]);
        assert_eq!(out.data(), &[2.0, 0.0]);
    }

    #[test]
    fn mismatched_basis_rejected() {
        let basis = Tensor::new(vec![1.0, 0.0], Shape::matrix(2, 1));
        assert!(PrincipalComponentsLayer::new(vec![0.0; 3], basis).is_err());
    }
}
