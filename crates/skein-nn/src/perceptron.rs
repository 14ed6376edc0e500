use crate::layer::{LayerBackward, LayerForward};
use crate::Activation;
use skein::{Device, Error, Float, Result, Rng};
use skein_la::DVec;
use skein_tensor::{Shape, Tensor};

/// Fully-connected layer: activation(x·W + b).
///
/// Parameter block: biases [outputs] followed by weights [inputs, outputs]
/// in row-major order.
#[derive(Debug, Clone)]
pub struct PerceptronLayer {
    biases: DVec<Float>,
    weights: Tensor<Float>,
    activation: Activation,
}

impl PerceptronLayer {
    /// New layer with normally distributed weights scaled by 1/sqrt(inputs)
    /// and zero biases.
    pub fn new(inputs: usize, outputs: usize, activation: Activation, rng: &mut Rng) -> Self {
        let scale = 1.0 / (inputs.max(1) as f64).sqrt();
        let weights = Tensor::new(
            (0..inputs * outputs)
                .map(|_| (rng.normal() * scale) as Float)
                .collect(),
            Shape::matrix(inputs, outputs),
        );
        Self {
            biases: DVec::zeros(outputs),
            weights,
            activation,
        }
    }

    pub fn inputs_number(&self) -> usize {
        self.weights.dims()[0]
    }

    pub fn outputs_number(&self) -> usize {
        self.weights.dims()[1]
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn set_activation(&mut self, activation: Activation) {
        self.activation = activation;
    }

    pub fn weights(&self) -> &Tensor<Float> {
        &self.weights
    }

    pub fn biases(&self) -> &DVec<Float> {
        &self.biases
    }

    pub fn parameter_count(&self) -> usize {
        self.biases.len() + self.weights.numel()
    }

    pub fn pack_parameters(&self, out: &mut [Float]) {
        out[..self.biases.len()].copy_from_slice(self.biases.as_slice());
        out[self.biases.len()..].copy_from_slice(self.weights.data());
    }

    pub fn unpack_parameters(&mut self, p: &[Float]) {
        let nb = self.biases.len();
        self.biases.as_mut_slice().copy_from_slice(&p[..nb]);
        self.weights.data_mut().copy_from_slice(&p[nb..]);
    }

    /// Accepts a [batch, inputs] matrix; a rank-4 image batch is flattened
    /// to one row per sample first.
    fn as_batch(&self, inputs: &Tensor<Float>) -> Result<Tensor<Float>> {
        match inputs.ndim() {
            2 => Ok(inputs.clone()),
            4 => {
                let batch = inputs.dims()[0];
                inputs.reshape(Shape::matrix(batch, inputs.numel() / batch))
            }
            _ => Err(Error::shape(
                "PerceptronLayer::forward",
                "rank 2 or 4",
                inputs.dims(),
            )),
        }
    }

    pub fn forward(&self, inputs: &Tensor<Float>, device: &Device) -> Result<LayerForward> {
        let x = self.as_batch(inputs)?;
        if x.dims()[1] != self.inputs_number() {
            return Err(Error::shape(
                "PerceptronLayer::forward",
                self.inputs_number(),
                x.dims(),
            ));
        }
        let bias_row = Tensor::from_dvec(&self.biases);
        let combinations = x.matmul(device, &self.weights)?.broadcast_add_rows(&bias_row)?;
        let act = self.activation;
        let activations = combinations.map(device, |v| act.apply(v));
        Ok(LayerForward {
            combinations,
            activations,
            aux: Vec::new(),
        })
    }

    pub fn backward(
        &self,
        inputs: &Tensor<Float>,
        forward: &LayerForward,
        delta: &Tensor<Float>,
        device: &Device,
    ) -> Result<LayerBackward> {
        let x = self.as_batch(inputs)?;
        let act = self.activation;
        let derivatives = forward.combinations.map(device, |v| act.derivative(v));
        let combination_delta = delta.mul(device, &derivatives)?;

        // grad_W = x^T · dC, grad_b = column sums of dC.
        let weight_gradient = x.transpose()?.matmul(device, &combination_delta)?;
        let bias_gradient = combination_delta.sum_rows(device)?;

        let input_delta = combination_delta.matmul(device, &self.weights.transpose()?)?;

        let mut gradient = DVec::zeros(self.parameter_count());
        let nb = self.biases.len();
        gradient.as_mut_slice()[..nb].copy_from_slice(bias_gradient.data());
        gradient.as_mut_slice()[nb..].copy_from_slice(weight_gradient.data());

        Ok(LayerBackward {
            input_delta,
            gradient,
        })
    }
}
