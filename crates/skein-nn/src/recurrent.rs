use crate::layer::{LayerBackward, LayerForward};
use crate::Activation;
use skein::{Device, Error, Float, Result, Rng};
use skein_la::DVec;
use skein_tensor::{Shape, Tensor};

/// Simple recurrent layer: activation(x·W + h·U + b), with the hidden state
/// carried across consecutive batch rows and reset every `timesteps` rows.
///
/// Back-propagation unrolls through time within each window. Parameter
/// block: biases [outputs], input weights [inputs, outputs], recurrent
/// weights [outputs, outputs].
#[derive(Debug, Clone)]
pub struct RecurrentLayer {
    biases: DVec<Float>,
    input_weights: Tensor<Float>,
    recurrent_weights: Tensor<Float>,
    activation: Activation,
    timesteps: usize,
}

impl RecurrentLayer {
    pub fn new(inputs: usize, outputs: usize, activation: Activation, rng: &mut Rng) -> Self {
        let scale = 1.0 / (inputs.max(1) as f64).sqrt();
        let recurrent_scale = 1.0 / (outputs.max(1) as f64).sqrt();
        Self {
            biases: DVec::zeros(outputs),
            input_weights: Tensor::new(
                (0..inputs * outputs)
                    .map(|_| (rng.normal() * scale) as Float)
                    .collect(),
                Shape::matrix(inputs, outputs),
            ),
            recurrent_weights: Tensor::new(
                (0..outputs * outputs)
                    .map(|_| (rng.normal() * recurrent_scale) as Float)
                    .collect(),
                Shape::matrix(outputs, outputs),
            ),
            activation,
            timesteps: 10,
        }
    }

    pub fn inputs_number(&self) -> usize {
        self.input_weights.dims()[0]
    }

    pub fn outputs_number(&self) -> usize {
        self.input_weights.dims()[1]
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn timesteps(&self) -> usize {
        self.timesteps
    }

    pub fn set_timesteps(&mut self, timesteps: usize) -> Result<()> {
        if timesteps == 0 {
            return Err(Error::InvalidConfiguration(
                "recurrent timesteps must be positive".into(),
            ));
        }
        self.timesteps = timesteps;
        Ok(())
    }

    pub fn parameter_count(&self) -> usize {
        self.biases.len() + self.input_weights.numel() + self.recurrent_weights.numel()
    }

    pub fn pack_parameters(&self, out: &mut [Float]) {
        let nb = self.biases.len();
        let nw = self.input_weights.numel();
        out[..nb].copy_from_slice(self.biases.as_slice());
        out[nb..nb + nw].copy_from_slice(self.input_weights.data());
        out[nb + nw..].copy_from_slice(self.recurrent_weights.data());
    }

    pub fn unpack_parameters(&mut self, p: &[Float]) {
        let nb = self.biases.len();
        let nw = self.input_weights.numel();
        self.biases.as_mut_slice().copy_from_slice(&p[..nb]);
        self.input_weights.data_mut().copy_from_slice(&p[nb..nb + nw]);
        self.recurrent_weights
            .data_mut()
            .copy_from_slice(&p[nb + nw..]);
    }

    pub fn forward(&self, inputs: &Tensor<Float>, _device: &Device) -> Result<LayerForward> {
        let (n_in, n_out) = (self.inputs_number(), self.outputs_number());
        if inputs.ndim() != 2 || inputs.dims()[1] != n_in {
            return Err(Error::shape("RecurrentLayer::forward", n_in, inputs.dims()));
        }
        let batch = inputs.dims()[0];

        let mut combinations = Tensor::zeros(Shape::matrix(batch, n_out));
        let mut activations = Tensor::zeros(Shape::matrix(batch, n_out));
        let mut previous_hidden = Tensor::zeros(Shape::matrix(batch, n_out));

        let mut hidden = vec![0.0 as Float; n_out];
        for t in 0..batch {
            if t % self.timesteps == 0 {
                hidden.fill(0.0);
            }
            previous_hidden.data_mut()[t * n_out..(t + 1) * n_out].copy_from_slice(&hidden);

            let x = inputs.row(t);
            for j in 0..n_out {
                let mut c = self.biases[j];
                for i in 0..n_in {
                    c += x[i] * self.input_weights.get(&[i, j]);
                }
                for k in 0..n_out {
                    c += hidden[k] * self.recurrent_weights.get(&[k, j]);
                }
                combinations.data_mut()[t * n_out + j] = c;
                activations.data_mut()[t * n_out + j] = self.activation.apply(c);
            }
            hidden.copy_from_slice(&activations.data()[t * n_out..(t + 1) * n_out]);
        }

        Ok(LayerForward {
            combinations,
            activations,
            aux: vec![previous_hidden],
        })
    }

    pub fn backward(
        &self,
        inputs: &Tensor<Float>,
        forward: &LayerForward,
        delta: &Tensor<Float>,
        _device: &Device,
    ) -> Result<LayerBackward> {
        let (n_in, n_out) = (self.inputs_number(), self.outputs_number());
        let batch = inputs.dims()[0];
        if delta.dims() != [batch, n_out] {
            return Err(Error::shape(
                "RecurrentLayer::backward",
                [batch, n_out],
                delta.dims(),
            ));
        }
        let previous_hidden = &forward.aux[0];

        let mut bias_gradient = vec![0.0 as Float; n_out];
        let mut input_weight_gradient = vec![0.0 as Float; n_in * n_out];
        let mut recurrent_weight_gradient = vec![0.0 as Float; n_out * n_out];
        let mut input_delta = Tensor::zeros(Shape::matrix(batch, n_in));

        // Gradient flowing into the hidden state from the following row of
        // the same window.
        let mut hidden_carry = vec![0.0 as Float; n_out];

        for t in (0..batch).rev() {
            // The last row of each window receives no carry.
            if t == batch - 1 || (t + 1) % self.timesteps == 0 {
                hidden_carry.fill(0.0);
            }

            let mut combination_delta = vec![0.0 as Float; n_out];
            for j in 0..n_out {
                let dh = delta.get(&[t, j]) + hidden_carry[j];
                combination_delta[j] = dh * self.activation.derivative(forward.combinations.get(&[t, j]));
            }

            let x = inputs.row(t);
            let h_prev = previous_hidden.row(t);
            for j in 0..n_out {
                let dc = combination_delta[j];
                bias_gradient[j] += dc;
                for i in 0..n_in {
                    input_weight_gradient[i * n_out + j] += x[i] * dc;
                }
                for k in 0..n_out {
                    recurrent_weight_gradient[k * n_out + j] += h_prev[k] * dc;
                }
            }
            for i in 0..n_in {
                let mut d = 0.0;
                for j in 0..n_out {
                    d += combination_delta[j] * self.input_weights.get(&[i, j]);
                }
                input_delta.data_mut()[t * n_in + i] = d;
            }

            // Carry to the previous row, unless this row starts a window.
            if t % self.timesteps == 0 {
                hidden_carry.fill(0.0);
            } else {
                for k in 0..n_out {
                    let mut d = 0.0;
                    for j in 0..n_out {
                        d += combination_delta[j] * self.recurrent_weights.get(&[k, j]);
                    }
                    hidden_carry[k] = d;
                }
            }
        }

        let mut gradient = DVec::zeros(self.parameter_count());
        let nb = n_out;
        let nw = n_in * n_out;
        gradient.as_mut_slice()[..nb].copy_from_slice(&bias_gradient);
        gradient.as_mut_slice()[nb..nb + nw].copy_from_slice(&input_weight_gradient);
        gradient.as_mut_slice()[nb + nw..].copy_from_slice(&recurrent_weight_gradient);

        Ok(LayerBackward {
            input_delta,
            gradient,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEV: Device = Device::SingleThreaded;

    #[test]
    fn hidden_state_resets_each_window() {
        let mut rng = Rng::new(3);
        let mut layer = RecurrentLayer::new(1, 1, Activation::Linear, &mut rng);
        layer.set_timesteps(2).unwrap();
        // b = 0, W = 1, U = 1: within a window outputs accumulate.
        layer.unpack_parameters(&[0.0, 1.0, 1.0]);

        let x = Tensor::new(vec![1.0, 1.0, 1.0, 1.0], Shape::matrix(4, 1));
        let out = layer.forward(&x, &DEV).unwrap().activations;
        // Rows 0,1 form one window (1, 2), rows 2,3 restart (1, 2).
        assert_eq!(out.data(), &[1.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn gradient_matches_central_differences() {
        let mut rng = Rng::new(21);
        let mut layer = RecurrentLayer::new(2, 2, Activation::HyperbolicTangent, &mut rng);
        layer.set_timesteps(3).unwrap();

        let x = Tensor::new(
            vec![0.5, -0.3, 0.2, 0.8, -0.6, 0.1, 0.9, -0.2, 0.4, 0.7],
            Shape::matrix(5, 2),
        );
        let forward = layer.forward(&x, &DEV).unwrap();
        let delta = Tensor::new(vec![1.0; 10], Shape::matrix(5, 2));
        let back = layer.backward(&x, &forward, &delta, &DEV).unwrap();

        let eps = 1e-6;
        let count = layer.parameter_count();
        let mut packed = vec![0.0; count];
        layer.pack_parameters(&mut packed);
        for k in 0..count {
            let orig = packed[k];
            packed[k] = orig + eps;
            layer.unpack_parameters(&packed);
            let plus: Float = layer.forward(&x, &DEV).unwrap().activations.data().iter().sum();
            packed[k] = orig - eps;
            layer.unpack_parameters(&packed);
            let minus: Float = layer.forward(&x, &DEV).unwrap().activations.data().iter().sum();
            packed[k] = orig;
            layer.unpack_parameters(&packed);

            let numerical = (plus - minus) / (2.0 * eps);
            assert!(
                (numerical - back.gradient[k]).abs() < 1e-5,
                "parameter {k}: numerical {numerical} vs analytical {}",
                back.gradient[k]
            );
        }
    }

    #[test]
    fn input_delta_matches_central_differences() {
        let mut rng = Rng::new(8);
        let mut layer = RecurrentLayer::new(2, 2, Activation::HyperbolicTangent, &mut rng);
        layer.set_timesteps(4).unwrap();

        let x = Tensor::new(
            vec![0.1, 0.2, -0.4, 0.5, 0.3, -0.1, 0.6, 0.2],
            Shape::matrix(4, 2),
        );
        let forward = layer.forward(&x, &DEV).unwrap();
        let delta = Tensor::new(vec![1.0; 8], Shape::matrix(4, 2));
        let back = layer.backward(&x, &forward, &delta, &DEV).unwrap();

        let eps = 1e-6;
        for k in 0..x.numel() {
            let mut xp = x.clone();
            xp.data_mut()[k] += eps;
            let plus: Float = layer.forward(&xp, &DEV).unwrap().activations.data().iter().sum();
            let mut xm = x.clone();
            xm.data_mut()[k] -= eps;
            let minus: Float = layer.forward(&xm, &DEV).unwrap().activations.data().iter().sum();
            let numerical = (plus - minus) / (2.0 * eps);
            assert!(
                (numerical - back.input_delta.data()[k]).abs() < 1e-5,
                "input {k}: numerical {numerical} vs analytical {}",
                back.input_delta.data()[k]
            );
        }
    }
}
