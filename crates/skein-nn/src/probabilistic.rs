use crate::layer::{LayerBackward, LayerForward};
use skein::{Device, Error, Float, Result, Rng};
use skein_la::DVec;
use skein_tensor::{Shape, Tensor};

/// How logits become probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbabilisticMethod {
    /// Per-unit sigmoid; the binary case.
    Logistic,
    /// Row-normalized exponentials; the multiclass case.
    Softmax,
    /// One-hot at the row argmax. Inference only; not differentiable.
    Competitive,
}

impl ProbabilisticMethod {
    pub fn name(self) -> &'static str {
        match self {
            Self::Logistic => "Logistic",
            Self::Softmax => "Softmax",
            Self::Competitive => "Competitive",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "Logistic" => Self::Logistic,
            "Softmax" => Self::Softmax,
            "Competitive" => Self::Competitive,
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "unknown probabilistic method {other:?}"
                )))
            }
        })
    }
}

/// Output layer of a classification stack: a linear transform whose
/// combinations are normalized into probabilities, plus the decision
/// threshold downstream consumers compare against.
///
/// Parameter block: biases [outputs] then weights [inputs, outputs].
#[derive(Debug, Clone)]
pub struct ProbabilisticLayer {
    biases: DVec<Float>,
    weights: Tensor<Float>,
    method: ProbabilisticMethod,
    decision_threshold: Float,
}

impl ProbabilisticLayer {
    /// One output unit gets the logistic method, more get softmax.
    pub fn new(inputs: usize, outputs: usize, rng: &mut Rng) -> Self {
        let scale = 1.0 / (inputs.max(1) as f64).sqrt();
        let weights = Tensor::new(
            (0..inputs * outputs)
                .map(|_| (rng.normal() * scale) as Float)
                .collect(),
            Shape::matrix(inputs, outputs),
        );
        let method = if outputs == 1 {
            ProbabilisticMethod::Logistic
        } else {
            ProbabilisticMethod::Softmax
        };
        Self {
            biases: DVec::zeros(outputs),
            weights,
            method,
            decision_threshold: 0.5,
        }
    }

    pub fn inputs_number(&self) -> usize {
        self.weights.dims()[0]
    }

    pub fn outputs_number(&self) -> usize {
        self.weights.dims()[1]
    }

    pub fn method(&self) -> ProbabilisticMethod {
        self.method
    }

    pub fn set_method(&mut self, method: ProbabilisticMethod) {
        self.method = method;
    }

    pub fn weights(&self) -> &Tensor<Float> {
        &self.weights
    }

    pub fn biases(&self) -> &DVec<Float> {
        &self.biases
    }

    pub fn decision_threshold(&self) -> Float {
        self.decision_threshold
    }

    pub fn set_decision_threshold(&mut self, threshold: Float) -> Result<()> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::InvalidConfiguration(format!(
                "decision threshold {threshold} outside [0, 1]"
            )));
        }
        self.decision_threshold = threshold;
        Ok(())
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

    pub fn forward(&self, inputs: &Tensor<Float>, device: &Device) -> Result<LayerForward> {
        if inputs.ndim() != 2 || inputs.dims()[1] != self.inputs_number() {
            return Err(Error::shape(
                "ProbabilisticLayer::forward",
                self.inputs_number(),
                inputs.dims(),
            ));
        }
        let bias_row = Tensor::from_dvec(&self.biases);
        let combinations = inputs
            .matmul(device, &self.weights)?
            .broadcast_add_rows(&bias_row)?;

        let activations = match self.method {
            ProbabilisticMethod::Logistic => {
                combinations.map(device, |v| 1.0 / (1.0 + (-v).exp()))
            }
            ProbabilisticMethod::Softmax => softmax_rows(&combinations),
            ProbabilisticMethod::Competitive => {
                let mut out = Tensor::zeros(combinations.shape().clone());
                let cols = combinations.dims()[1];
                for (i, best) in combinations.argmax_rows()?.into_iter().enumerate() {
                    out.data_mut()[i * cols + best] = 1.0;
                }
                out
            }
        };

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
        let combination_delta = match self.method {
            ProbabilisticMethod::Logistic => {
                let a = &forward.activations;
                let derivatives = a.map(device, |v| v * (1.0 - v));
                delta.mul(device, &derivatives)?
            }
            ProbabilisticMethod::Softmax => {
                // dC_j = a_j * (delta_j - sum_k delta_k a_k), per row.
                let a = &forward.activations;
                if a.shape() != delta.shape() {
                    return Err(Error::shape(
                        "ProbabilisticLayer::backward",
                        a.dims(),
                        delta.dims(),
                    ));
                }
                let (rows, cols) = (a.dims()[0], a.dims()[1]);
                let mut out = Tensor::zeros(a.shape().clone());
                for i in 0..rows {
                    let ar = a.row(i);
                    let dr = delta.row(i);
                    let mut dot = 0.0;
                    for j in 0..cols {
                        dot += ar[j] * dr[j];
                    }
                    let or = &mut out.data_mut()[i * cols..(i + 1) * cols];
                    for j in 0..cols {
                        or[j] = ar[j] * (dr[j] - dot);
                    }
                }
                out
            }
            ProbabilisticMethod::Competitive => {
                return Err(Error::InvalidConfiguration(
                    "competitive probabilistic layer is not differentiable".into(),
                ))
            }
        };

        let weight_gradient = inputs.transpose()?.matmul(device, &combination_delta)?;
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

/// Row-wise softmax with max-shift stabilization.
fn softmax_rows(combinations: &Tensor<Float>) -> Tensor<Float> {
    let (rows, cols) = (combinations.dims()[0], combinations.dims()[1]);
    let mut out = combinations.clone();
    for i in 0..rows {
        let row = &mut out.data_mut()[i * cols..(i + 1) * cols];
        let max = row.iter().copied().fold(Float::NEG_INFINITY, Float::max);
        let mut sum = 0.0;
        for v in row.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        let inv = 1.0 / sum;
        for v in row.iter_mut() {
            *v *= inv;
        }
    }
    out
}
