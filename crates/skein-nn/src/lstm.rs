use crate::layer::{LayerBackward, LayerForward};
use crate::Activation;
use skein::{Device, Error, Float, Result, Rng};
use skein_la::DVec;
use skein_tensor::{Shape, Tensor};

/// Gate order inside the parameter block and the auxiliary buffers.
const FORGET: usize = 0;
const INPUT: usize = 1;
const STATE: usize = 2;
const OUTPUT: usize = 3;

/// Long short-term memory layer with forget/input/state/output gates.
///
/// Hidden and cell state are carried across consecutive batch rows and reset
/// every `timesteps` rows, like [`RecurrentLayer`](crate::RecurrentLayer);
/// back-propagation unrolls through time within each window.
///
/// Parameter block: four gate blocks in forget/input/state/output order,
/// each holding biases [outputs], input weights [inputs, outputs] and
/// recurrent weights [outputs, outputs].
#[derive(Debug, Clone)]
pub struct LongShortTermMemoryLayer {
    biases: [DVec<Float>; 4],
    input_weights: [Tensor<Float>; 4],
    recurrent_weights: [Tensor<Float>; 4],
    /// Candidate and cell-output nonlinearity.
    activation: Activation,
    /// Gate nonlinearity.
    recurrent_activation: Activation,
    timesteps: usize,
}

impl LongShortTermMemoryLayer {
    pub fn new(inputs: usize, outputs: usize, rng: &mut Rng) -> Self {
        let scale = 1.0 / (inputs.max(1) as f64).sqrt();
        let recurrent_scale = 1.0 / (outputs.max(1) as f64).sqrt();
        let mut weight = |rows: usize, cols: usize, s: f64| {
            Tensor::new(
                (0..rows * cols)
                    .map(|_| (rng.normal() * s) as Float)
                    .collect(),
                Shape::matrix(rows, cols),
            )
        };
        Self {
            biases: core::array::from_fn(|_| DVec::zeros(outputs)),
            input_weights: core::array::from_fn(|_| weight(inputs, outputs, scale)),
            recurrent_weights: core::array::from_fn(|_| weight(outputs, outputs, recurrent_scale)),
            activation: Activation::HyperbolicTangent,
            recurrent_activation: Activation::Logistic,
            timesteps: 10,
        }
    }

    pub fn inputs_number(&self) -> usize {
        self.input_weights[0].dims()[0]
    }

    pub fn outputs_number(&self) -> usize {
        self.input_weights[0].dims()[1]
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn set_activation(&mut self, activation: Activation) {
        self.activation = activation;
    }

    pub fn timesteps(&self) -> usize {
        self.timesteps
    }

    pub fn set_timesteps(&mut self, timesteps: usize) -> Result<()> {
        if timesteps == 0 {
            return Err(Error::InvalidConfiguration(
                "lstm timesteps must be positive".into(),
            ));
        }
        self.timesteps = timesteps;
        Ok(())
    }

    fn gate_block_len(&self) -> usize {
        let (n_in, n_out) = (self.inputs_number(), self.outputs_number());
        n_out + n_in * n_out + n_out * n_out
    }

    pub fn parameter_count(&self) -> usize {
        4 * self.gate_block_len()
    }

    pub fn pack_parameters(&self, out: &mut [Float]) {
        let (n_in, n_out) = (self.inputs_number(), self.outputs_number());
        let block = self.gate_block_len();
        for g in 0..4 {
            let b = &mut out[g * block..(g + 1) * block];
            b[..n_out].copy_from_slice(self.biases[g].as_slice());
            b[n_out..n_out + n_in * n_out].copy_from_slice(self.input_weights[g].data());
            b[n_out + n_in * n_out..].copy_from_slice(self.recurrent_weights[g].data());
        }
    }

    pub fn unpack_parameters(&mut self, p: &[Float]) {
        let (n_in, n_out) = (self.inputs_number(), self.outputs_number());
        let block = self.gate_block_len();
        for g in 0..4 {
            let b = &p[g * block..(g + 1) * block];
            self.biases[g].as_mut_slice().copy_from_slice(&b[..n_out]);
            self.input_weights[g]
                .data_mut()
                .copy_from_slice(&b[n_out..n_out + n_in * n_out]);
            self.recurrent_weights[g]
                .data_mut()
                .copy_from_slice(&b[n_out + n_in * n_out..]);
        }
    }

    /// Gate pre-activation for row `x` and hidden state `hidden`.
    fn gate_combination(&self, g: usize, x: &[Float], hidden: &[Float], j: usize) -> Float {
        let (n_in, n_out) = (self.inputs_number(), self.outputs_number());
        let mut z = self.biases[g][j];
        for i in 0..n_in {
            z += x[i] * self.input_weights[g].get(&[i, j]);
        }
        for k in 0..n_out {
            z += hidden[k] * self.recurrent_weights[g].get(&[k, j]);
        }
        z
    }

    pub fn forward(&self, inputs: &Tensor<Float>, _device: &Device) -> Result<LayerForward> {
        let (n_in, n_out) = (self.inputs_number(), self.outputs_number());
        if inputs.ndim() != 2 || inputs.dims()[1] != n_in {
            return Err(Error::shape(
                "LongShortTermMemoryLayer::forward",
                n_in,
                inputs.dims(),
            ));
        }
        let batch = inputs.dims()[0];
        let shape = Shape::matrix(batch, n_out);

        // aux layout: h_prev, c_prev, then per-gate pre-activations and
        // activations in gate order.
        let mut hidden_prev = Tensor::zeros(shape.clone());
        let mut cell_prev = Tensor::zeros(shape.clone());
        let mut gate_z: Vec<Tensor<Float>> = (0..4).map(|_| Tensor::zeros(shape.clone())).collect();
        let mut gate_a: Vec<Tensor<Float>> = (0..4).map(|_| Tensor::zeros(shape.clone())).collect();
        let mut combinations = Tensor::zeros(shape.clone()); // cell states
        let mut activations = Tensor::zeros(shape.clone()); // hidden states

        let mut hidden = vec![0.0 as Float; n_out];
        let mut cell = vec![0.0 as Float; n_out];

        for t in 0..batch {
            if t % self.timesteps == 0 {
                hidden.fill(0.0);
                cell.fill(0.0);
            }
            hidden_prev.data_mut()[t * n_out..(t + 1) * n_out].copy_from_slice(&hidden);
            cell_prev.data_mut()[t * n_out..(t + 1) * n_out].copy_from_slice(&cell);

            let x = inputs.row(t);
            for j in 0..n_out {
                for g in 0..4 {
                    let z = self.gate_combination(g, x, &hidden, j);
                    gate_z[g].data_mut()[t * n_out + j] = z;
                    let a = if g == STATE {
                        self.activation.apply(z)
                    } else {
                        self.recurrent_activation.apply(z)
                    };
                    gate_a[g].data_mut()[t * n_out + j] = a;
                }
            }
            for j in 0..n_out {
                let f = gate_a[FORGET].get(&[t, j]);
                let i = gate_a[INPUT].get(&[t, j]);
                let g = gate_a[STATE].get(&[t, j]);
                let o = gate_a[OUTPUT].get(&[t, j]);
                let c = f * cell[j] + i * g;
                combinations.data_mut()[t * n_out + j] = c;
                activations.data_mut()[t * n_out + j] = o * self.activation.apply(c);
            }
            hidden.copy_from_slice(&activations.data()[t * n_out..(t + 1) * n_out]);
            cell.copy_from_slice(&combinations.data()[t * n_out..(t + 1) * n_out]);
        }

        let mut aux = vec![hidden_prev, cell_prev];
        aux.extend(gate_z);
        aux.extend(gate_a);
        Ok(LayerForward {
            combinations,
            activations,
            aux,
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
                "LongShortTermMemoryLayer::backward",
                [batch, n_out],
                delta.dims(),
            ));
        }

        let hidden_prev = &forward.aux[0];
        let cell_prev = &forward.aux[1];
        let gate_z = &forward.aux[2..6];
        let gate_a = &forward.aux[6..10];
        let cell = &forward.combinations;

        let block = self.gate_block_len();
        let mut gradient = DVec::zeros(self.parameter_count());
        let mut input_delta = Tensor::zeros(Shape::matrix(batch, n_in));

        let mut hidden_carry = vec![0.0 as Float; n_out];
        let mut cell_carry = vec![0.0 as Float; n_out];

        for t in (0..batch).rev() {
            if t == batch - 1 || (t + 1) % self.timesteps == 0 {
                hidden_carry.fill(0.0);
                cell_carry.fill(0.0);
            }

            // Per-gate pre-activation deltas for this row.
            let mut dz = vec![0.0 as Float; 4 * n_out];
            let mut dc_row = vec![0.0 as Float; n_out];

            for j in 0..n_out {
                let dh = delta.get(&[t, j]) + hidden_carry[j];
                let c = cell.get(&[t, j]);
                let o = gate_a[OUTPUT].get(&[t, j]);
                let d_o = dh * self.activation.apply(c);
                let dc = dh * o * self.activation.derivative(c) + cell_carry[j];
                dc_row[j] = dc;

                let d_f = dc * cell_prev.get(&[t, j]);
                let d_i = dc * gate_a[STATE].get(&[t, j]);
                let d_g = dc * gate_a[INPUT].get(&[t, j]);

                dz[FORGET * n_out + j] =
                    d_f * self.recurrent_activation.derivative(gate_z[FORGET].get(&[t, j]));
                dz[INPUT * n_out + j] =
                    d_i * self.recurrent_activation.derivative(gate_z[INPUT].get(&[t, j]));
                dz[STATE * n_out + j] =
                    d_g * self.activation.derivative(gate_z[STATE].get(&[t, j]));
                dz[OUTPUT * n_out + j] =
                    d_o * self.recurrent_activation.derivative(gate_z[OUTPUT].get(&[t, j]));
            }

            let x = inputs.row(t);
            let h_prev = hidden_prev.row(t);
            for g in 0..4 {
                let grad_block = &mut gradient.as_mut_slice()[g * block..(g + 1) * block];
                for j in 0..n_out {
                    let d = dz[g * n_out + j];
                    grad_block[j] += d;
                    for i in 0..n_in {
                        grad_block[n_out + i * n_out + j] += x[i] * d;
                    }
                    for k in 0..n_out {
                        grad_block[n_out + n_in * n_out + k * n_out + j] += h_prev[k] * d;
                    }
                }
            }

            for i in 0..n_in {
                let mut d = 0.0;
                for g in 0..4 {
                    for j in 0..n_out {
                        d += dz[g * n_out + j] * self.input_weights[g].get(&[i, j]);
                    }
                }
                input_delta.data_mut()[t * n_in + i] = d;
            }

            if t % self.timesteps == 0 {
                hidden_carry.fill(0.0);
                cell_carry.fill(0.0);
            } else {
                for k in 0..n_out {
                    let mut d = 0.0;
                    for g in 0..4 {
                        for j in 0..n_out {
                            d += dz[g * n_out + j] * self.recurrent_weights[g].get(&[k, j]);
                        }
                    }
                    hidden_carry[k] = d;
                }
                for j in 0..n_out {
                    cell_carry[j] = dc_row[j] * gate_a[FORGET].get(&[t, j]);
                }
            }
        }

        Ok(LayerBackward {
            input_delta,
            gradient,
        })
    }
}
