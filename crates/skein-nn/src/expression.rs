//! Textual expression of a network's input-to-output mapping, for
//! deployment outside the library.

use crate::scaling::ScalingMethod;
use crate::{Activation, Layer, NeuralNetwork, ProbabilisticMethod};
use skein::{Error, Float, Result};

fn function_name(activation: Activation) -> &'static str {
    match activation {
        Activation::Threshold => "threshold",
        Activation::SymmetricThreshold => "symmetric_threshold",
        Activation::Logistic => "logistic",
        Activation::HyperbolicTangent => "tanh",
        Activation::Linear => "",
        Activation::RectifiedLinear => "rectified_linear",
        Activation::ScaledExponentialLinear => "scaled_exponential_linear",
        Activation::SoftPlus => "soft_plus",
        Activation::SoftSign => "soft_sign",
        Activation::HardSigmoid => "hard_sigmoid",
        Activation::ExponentialLinear => "exponential_linear",
    }
}

fn wrap(function: &str, body: String) -> String {
    if function.is_empty() {
        body
    } else {
        format!("{function}({body})")
    }
}

fn number(v: Float) -> String {
    format!("{v:?}")
}

/// Weighted-sum body: bias + w0*x0 + w1*x1 + ...
fn combination(bias: Float, weights: impl Iterator<Item = (Float, String)>) -> String {
    let mut body = number(bias);
    for (w, name) in weights {
        if w >= 0.0 {
            body.push_str(&format!(" + {}*{name}", number(w)));
        } else {
            body.push_str(&format!(" - {}*{name}", number(-w)));
        }
    }
    body
}

impl NeuralNetwork {
    /// One assignment per layer output, variable names carried through from
    /// the input/output name tables, activation functions named. Supported
    /// for the tabular layer kinds; recurrent and image kinds have no
    /// closed-form expression.
    pub fn write_expression(&self) -> Result<String> {
        if self.is_empty() {
            return Err(Error::UnboundReference("neural network layers"));
        }
        let mut out = String::new();
        let mut names: Vec<String> = self.inputs_names().to_vec();

        for (index, layer) in self.layers().iter().enumerate() {
            let last = index == self.layers().len() - 1;
            match layer {
                Layer::Scaling(scaling) => {
                    let mut next = Vec::with_capacity(names.len());
                    for (j, d) in scaling.descriptives().iter().enumerate() {
                        let target = format!("scaled_{}", names[j]);
                        let rhs = match scaling.method() {
                            ScalingMethod::NoScaling => names[j].clone(),
                            ScalingMethod::MinimumMaximum => format!(
                                "2*({} - {})/({} - {}) - 1",
                                names[j],
                                number(d.minimum),
                                number(d.maximum),
                                number(d.minimum)
                            ),
                            ScalingMethod::MeanStandardDeviation => format!(
                                "({} - {})/{}",
                                names[j],
                                number(d.mean),
                                number(d.standard_deviation)
                            ),
                            ScalingMethod::StandardDeviation => {
                                format!("{}/{}", names[j], number(d.standard_deviation))
                            }
                        };
                        out.push_str(&format!("{target} = {rhs};\n"));
                        next.push(target);
                    }
                    names = next;
                }
                Layer::PrincipalComponents(pca) => {
                    let mut next = Vec::new();
                    for j in 0..pca.outputs_number() {
                        let target = format!("principal_component_{j}");
                        let body = combination(
                            0.0,
                            (0..pca.inputs_number()).map(|i| {
                                (
                                    pca.basis().get(&[i, j]),
                                    format!("({} - {})", names[i], number(pca.means()[i])),
                                )
                            }),
                        );
                        out.push_str(&format!("{target} = {body};\n"));
                        next.push(target);
                    }
                    names = next;
                }
                Layer::Perceptron(perceptron) => {
                    let mut next = Vec::new();
                    for j in 0..perceptron.outputs_number() {
                        let target = if last {
                            self.outputs_names()[j].clone()
                        } else {
                            format!("perceptron_{index}_{j}")
                        };
                        let body = combination(
                            perceptron.biases()[j],
                            (0..perceptron.inputs_number())
                                .map(|i| (perceptron.weights().get(&[i, j]), names[i].clone())),
                        );
                        let rhs = wrap(function_name(perceptron.activation()), body);
                        out.push_str(&format!("{target} = {rhs};\n"));
                        next.push(target);
                    }
                    names = next;
                }
                Layer::Probabilistic(probabilistic) => {
                    let n = probabilistic.outputs_number();
                    let mut combs = Vec::new();
                    for j in 0..n {
                        let target = format!("probabilistic_combination_{j}");
                        let body = combination(
                            probabilistic.biases()[j],
                            (0..probabilistic.inputs_number())
                                .map(|i| (probabilistic.weights().get(&[i, j]), names[i].clone())),
                        );
                        out.push_str(&format!("{target} = {body};\n"));
                        combs.push(target);
                    }
                    let mut next = Vec::new();
                    for j in 0..n {
                        let target = self.outputs_names()[j].clone();
                        let rhs = match probabilistic.method() {
                            ProbabilisticMethod::Logistic => {
                                format!("logistic({})", combs[j])
                            }
                            ProbabilisticMethod::Softmax => {
                                let denominator = combs
                                    .iter()
                                    .map(|c| format!("exp({c})"))
                                    .collect::<Vec<_>>()
                                    .join(" + ");
                                format!("exp({})/({denominator})", combs[j])
                            }
                            ProbabilisticMethod::Competitive => {
                                format!("competitive({}, {})", combs.join(", "), j)
                            }
                        };
                        out.push_str(&format!("{target} = {rhs};\n"));
                        next.push(target);
                    }
                    names = next;
                }
                Layer::Unscaling(unscaling) => {
                    let mut next = Vec::new();
                    for (j, d) in unscaling.descriptives().iter().enumerate() {
                        let target = if last {
                            self.outputs_names()[j].clone()
                        } else {
                            format!("unscaled_{j}")
                        };
                        let rhs = match unscaling.method() {
                            ScalingMethod::NoScaling => names[j].clone(),
                            ScalingMethod::MinimumMaximum => format!(
                                "{} + ({} + 1)*({} - {})/2",
                                number(d.minimum),
                                names[j],
                                number(d.maximum),
                                number(d.minimum)
                            ),
                            ScalingMethod::MeanStandardDeviation => format!(
                                "{}*{} + {}",
                                names[j],
                                number(d.standard_deviation),
                                number(d.mean)
                            ),
                            ScalingMethod::StandardDeviation => {
                                format!("{}*{}", names[j], number(d.standard_deviation))
                            }
                        };
                        out.push_str(&format!("{target} = {rhs};\n"));
                        next.push(target);
                    }
                    names = next;
                }
                Layer::Bounding(bounding) => {
                    let mut next = Vec::new();
                    for j in 0..bounding.neurons_number() {
                        let target = if last {
                            self.outputs_names()[j].clone()
                        } else {
                            format!("bounded_{j}")
                        };
                        let lower = bounding.lower_bounds()[j];
                        let upper = bounding.upper_bounds()[j];
                        let mut rhs = names[j].clone();
                        if upper.is_finite() {
                            rhs = format!("min({rhs}, {})", number(upper));
                        }
                        if lower.is_finite() {
                            rhs = format!("max({rhs}, {})", number(lower));
                        }
                        out.push_str(&format!("{target} = {rhs};\n"));
                        next.push(target);
                    }
                    names = next;
                }
                Layer::Recurrent(_)
                | Layer::LongShortTermMemory(_)
                | Layer::Convolutional(_)
                | Layer::Pooling(_) => {
                    return Err(Error::InvalidConfiguration(format!(
                        "{} layers have no closed-form expression",
                        layer.kind_name()
                    )))
                }
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use crate::{ModelType, NeuralNetwork};

    #[test]
    fn classification_expression_mentions_everything() {
        let mut net = NeuralNetwork::new(ModelType::Classification, &[2, 2, 1], 4).unwrap();
        net.set_inputs_names(vec!["width".into(), "height".into()])
            .unwrap();
        net.set_outputs_names(vec!["is_defect".into()]).unwrap();

        let expr = net.write_expression().unwrap();
        assert!(expr.contains("scaled_width"));
        assert!(expr.contains("scaled_height"));
        assert!(expr.contains("tanh("));
        assert!(expr.contains("is_defect = logistic("));
    }

    #[test]
    fn approximation_expression_unscales() {
        let net = NeuralNetwork::new(ModelType::Approximation, &[1, 1], 4).unwrap();
        let expr = net.write_expression().unwrap();
        // Linear output perceptron has no wrapping function.
        assert!(expr.contains("perceptron_"));
        assert!(expr.contains("output_0 ="));
    }

    #[test]
    fn forecasting_expression_is_unsupported() {
        let net = NeuralNetwork::new(ModelType::Forecasting, &[2, 3, 1], 4).unwrap();
        assert!(net.write_expression().is_err());
    }
}
