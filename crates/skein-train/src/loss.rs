use skein::{Device, Error, Float, Result};
use skein_data::{DataSet, Partition};
use skein_la::{DMat, DVec};
use skein_nn::NeuralNetwork;
use skein_tensor::Tensor;

/// Clamp applied to probabilities before taking logarithms.
const LOG_EPSILON: Float = 1e-6;

/// Error functional mapping (network outputs, targets) to a scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossMethod {
    SumSquaredError,
    MeanSquaredError,
    NormalizedSquaredError,
    MinkowskiError,
    CrossEntropyError,
    WeightedSquaredError,
}

impl LossMethod {
    pub fn name(self) -> &'static str {
        match self {
            Self::SumSquaredError => "SumSquaredError",
            Self::MeanSquaredError => "MeanSquaredError",
            Self::NormalizedSquaredError => "NormalizedSquaredError",
            Self::MinkowskiError => "MinkowskiError",
            Self::CrossEntropyError => "CrossEntropyError",
            Self::WeightedSquaredError => "WeightedSquaredError",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "SumSquaredError" => Self::SumSquaredError,
            "MeanSquaredError" => Self::MeanSquaredError,
            "NormalizedSquaredError" => Self::NormalizedSquaredError,
            "MinkowskiError" => Self::MinkowskiError,
            "CrossEntropyError" => Self::CrossEntropyError,
            "WeightedSquaredError" => Self::WeightedSquaredError,
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "unknown loss method {other:?}"
                )))
            }
        })
    }

    fn is_squared_family(self) -> bool {
        matches!(
            self,
            Self::SumSquaredError | Self::MeanSquaredError | Self::NormalizedSquaredError
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regularization {
    None,
    L1,
    L2,
}

impl Regularization {
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::L1 => "L1",
            Self::L2 => "L2",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "None" => Self::None,
            "L1" => Self::L1,
            "L2" => Self::L2,
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "unknown regularization {other:?}"
                )))
            }
        })
    }
}

/// Maps (network, batch) to loss value and gradient: error term plus a
/// regularization term over the flat parameter vector.
///
/// Holds no references to the network or the data set; both are arguments
/// to every call. The one piece of cross-call state is the normalized
/// squared error's normalization coefficient, computed once per partition
/// by [`prepare`](Self::prepare) and cached until the partition changes.
#[derive(Debug, Clone)]
pub struct LossIndex {
    method: LossMethod,
    regularization: Regularization,
    regularization_weight: Float,
    minkowski_parameter: Float,
    positives_weight: Option<Float>,
    negatives_weight: Option<Float>,
    normalization_coefficient: Option<Float>,
}

impl LossIndex {
    pub fn new(method: LossMethod) -> Self {
        Self {
            method,
            regularization: Regularization::None,
            regularization_weight: 0.01,
            minkowski_parameter: 1.5,
            positives_weight: None,
            negatives_weight: None,
            normalization_coefficient: None,
        }
    }

    pub fn method(&self) -> LossMethod {
        self.method
    }

    pub fn regularization(&self) -> Regularization {
        self.regularization
    }

    pub fn regularization_weight(&self) -> Float {
        self.regularization_weight
    }

    pub fn set_regularization(&mut self, kind: Regularization, weight: Float) -> Result<()> {
        if weight < 0.0 || !weight.is_finite() {
            return Err(Error::InvalidConfiguration(format!(
                "regularization weight must be non-negative, got {weight}"
            )));
        }
        self.regularization = kind;
        self.regularization_weight = weight;
        Ok(())
    }

    pub fn minkowski_parameter(&self) -> Float {
        self.minkowski_parameter
    }

    pub fn set_minkowski_parameter(&mut self, p: Float) -> Result<()> {
        if !(1.0..=2.0).contains(&p) {
            return Err(Error::InvalidConfiguration(format!(
                "minkowski parameter must lie in [1, 2], got {p}"
            )));
        }
        self.minkowski_parameter = p;
        Ok(())
    }

    pub fn positives_weight(&self) -> Option<Float> {
        self.positives_weight
    }

    pub fn negatives_weight(&self) -> Option<Float> {
        self.negatives_weight
    }

    pub fn set_class_weights(&mut self, positives: Float, negatives: Float) -> Result<()> {
        if positives <= 0.0 || negatives <= 0.0 {
            return Err(Error::InvalidConfiguration(format!(
                "class weights must be positive, got {positives}/{negatives}"
            )));
        }
        self.positives_weight = Some(positives);
        self.negatives_weight = Some(negatives);
        Ok(())
    }

    /// Bind per-partition state: the normalized squared error's
    /// normalization coefficient and the weighted error's default class
    /// weights (negatives/positives, 1).
    pub fn prepare(&mut self, data: &DataSet, partition: Partition) -> Result<()> {
        match self.method {
            LossMethod::NormalizedSquaredError => {
                let targets = data.target_matrix(partition)?;
                let (rows, cols) = (targets.dims()[0], targets.dims()[1]);
                let mut coefficient = 0.0;
                for j in 0..cols {
                    let mut mean = 0.0;
                    for i in 0..rows {
                        mean += targets.get(&[i, j]);
                    }
                    mean /= rows as Float;
                    for i in 0..rows {
                        let d = targets.get(&[i, j]) - mean;
                        coefficient += d * d;
                    }
                }
                if coefficient < Float::EPSILON {
                    return Err(Error::InvalidConfiguration(
                        "normalized squared error: constant targets give a zero normalization coefficient"
                            .into(),
                    ));
                }
                self.normalization_coefficient = Some(coefficient);
            }
            LossMethod::WeightedSquaredError => {
                if self.positives_weight.is_none() {
                    let (positives, negatives) = data.target_class_counts()?;
                    if positives == 0 {
                        return Err(Error::InvalidConfiguration(
                            "weighted squared error: no positive samples to weight".into(),
                        ));
                    }
                    self.positives_weight = Some(negatives as Float / positives as Float);
                    self.negatives_weight = Some(1.0);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn difference_scale(&self, samples: usize) -> Result<Float> {
        Ok(match self.method {
            LossMethod::SumSquaredError => 1.0,
            LossMethod::MeanSquaredError => 1.0 / samples as Float,
            LossMethod::NormalizedSquaredError => {
                let coefficient = self
                    .normalization_coefficient
                    .ok_or(Error::UnboundReference("normalization coefficient"))?;
                1.0 / coefficient
            }
            _ => unreachable!("difference_scale is for the squared family"),
        })
    }

    /// Data error term, without regularization.
    pub fn error_term(&self, outputs: &Tensor<Float>, targets: &Tensor<Float>) -> Result<Float> {
        if outputs.shape() != targets.shape() {
            return Err(Error::shape("error_term", targets.dims(), outputs.dims()));
        }
        let samples = outputs.dims()[0];
        let value = match self.method {
            LossMethod::SumSquaredError
            | LossMethod::MeanSquaredError
            | LossMethod::NormalizedSquaredError => {
                let scale = self.difference_scale(samples)?;
                let mut sum = 0.0;
                for (o, t) in outputs.data().iter().zip(targets.data()) {
                    let d = o - t;
                    sum += d * d;
                }
                sum * scale
            }
            LossMethod::MinkowskiError => {
                let p = self.minkowski_parameter;
                let mut sum = 0.0;
                for (o, t) in outputs.data().iter().zip(targets.data()) {
                    sum += (o - t).abs().powf(p);
                }
                sum
            }
            LossMethod::CrossEntropyError => {
                let cols = outputs.dims()[1];
                let mut sum = 0.0;
                if cols == 1 {
                    for (o, t) in outputs.data().iter().zip(targets.data()) {
                        let p = o.clamp(LOG_EPSILON, 1.0 - LOG_EPSILON);
                        sum -= t * p.ln() + (1.0 - t) * (1.0 - p).ln();
                    }
                } else {
                    for (o, t) in outputs.data().iter().zip(targets.data()) {
                        let p = o.clamp(LOG_EPSILON, 1.0 - LOG_EPSILON);
                        sum -= t * p.ln();
                    }
                }
                sum / samples as Float
            }
            LossMethod::WeightedSquaredError => {
                let positives = self
                    .positives_weight
                    .ok_or(Error::UnboundReference("class weights"))?;
                let negatives = self
                    .negatives_weight
                    .ok_or(Error::UnboundReference("class weights"))?;
                let mut sum = 0.0;
                for (o, t) in outputs.data().iter().zip(targets.data()) {
                    let w = if *t > 0.5 { positives } else { negatives };
                    let d = o - t;
                    sum += w * d * d;
                }
                sum
            }
        };
        Ok(value)
    }

    /// Gradient of the data error term with respect to the outputs.
    pub fn output_delta(
        &self,
        outputs: &Tensor<Float>,
        targets: &Tensor<Float>,
    ) -> Result<Tensor<Float>> {
        if outputs.shape() != targets.shape() {
            return Err(Error::shape("output_delta", targets.dims(), outputs.dims()));
        }
        let samples = outputs.dims()[0];
        let mut delta = outputs.clone();
        match self.method {
            LossMethod::SumSquaredError
            | LossMethod::MeanSquaredError
            | LossMethod::NormalizedSquaredError => {
                let scale = 2.0 * self.difference_scale(samples)?;
                for (d, t) in delta.data_mut().iter_mut().zip(targets.data()) {
                    *d = scale * (*d - t);
                }
            }
            LossMethod::MinkowskiError => {
                let p = self.minkowski_parameter;
                for (d, t) in delta.data_mut().iter_mut().zip(targets.data()) {
                    let diff = *d - t;
                    *d = p * diff.abs().powf(p - 1.0) * diff.signum();
                }
            }
            LossMethod::CrossEntropyError => {
                let cols = outputs.dims()[1];
                let n = samples as Float;
                if cols == 1 {
                    for (d, t) in delta.data_mut().iter_mut().zip(targets.data()) {
                        let p = d.clamp(LOG_EPSILON, 1.0 - LOG_EPSILON);
                        *d = (p - t) / (p * (1.0 - p) * n);
                    }
                } else {
                    for (d, t) in delta.data_mut().iter_mut().zip(targets.data()) {
                        let p = d.clamp(LOG_EPSILON, 1.0 - LOG_EPSILON);
                        *d = -t / (p * n);
                    }
                }
            }
            LossMethod::WeightedSquaredError => {
                let positives = self
                    .positives_weight
                    .ok_or(Error::UnboundReference("class weights"))?;
                let negatives = self
                    .negatives_weight
                    .ok_or(Error::UnboundReference("class weights"))?;
                for (d, t) in delta.data_mut().iter_mut().zip(targets.data()) {
                    let w = if *t > 0.5 { positives } else { negatives };
                    *d = 2.0 * w * (*d - t);
                }
            }
        }
        Ok(delta)
    }

    /// Regularization term over the flat parameter vector.
    pub fn regularization_term(&self, parameters: &DVec<Float>) -> Float {
        match self.regularization {
            Regularization::None => 0.0,
            Regularization::L1 => {
                self.regularization_weight * parameters.iter().map(|p| p.abs()).sum::<Float>()
            }
            Regularization::L2 => {
                self.regularization_weight * parameters.iter().map(|p| p * p).sum::<Float>()
            }
        }
    }

    /// Add the regularization derivative to a gradient in place.
    pub fn add_regularization_gradient(&self, gradient: &mut DVec<Float>, parameters: &DVec<Float>) {
        match self.regularization {
            Regularization::None => {}
            Regularization::L1 => {
                let w = self.regularization_weight;
                for k in 0..gradient.len() {
                    gradient[k] += w * parameters[k].signum();
                }
            }
            Regularization::L2 => {
                let w = self.regularization_weight;
                for k in 0..gradient.len() {
                    gradient[k] += 2.0 * w * parameters[k];
                }
            }
        }
    }

    /// Loss on a batch at the network's current parameters.
    pub fn loss(
        &self,
        network: &NeuralNetwork,
        inputs: &Tensor<Float>,
        targets: &Tensor<Float>,
        device: &Device,
    ) -> Result<Float> {
        let outputs = network.calculate_outputs(inputs, device)?;
        let error = self.error_term(&outputs, targets)?;
        Ok(error + self.regularization_term(&network.get_parameters()))
    }

    /// Loss and flat gradient on a batch: forward propagation, output-delta
    /// seeding, whole-network backward pass, regularization.
    pub fn loss_and_gradient(
        &self,
        network: &NeuralNetwork,
        inputs: &Tensor<Float>,
        targets: &Tensor<Float>,
        device: &Device,
    ) -> Result<(Float, DVec<Float>)> {
        let state = network.forward_propagate(inputs, device)?;
        let error = self.error_term(state.outputs(), targets)?;
        let delta = self.output_delta(state.outputs(), targets)?;
        let (mut gradient, _) = network.backward(&state, &delta, device)?;

        let parameters = network.get_parameters();
        let loss = error + self.regularization_term(&parameters);
        self.add_regularization_gradient(&mut gradient, &parameters);
        Ok((loss, gradient))
    }

    // --- Levenberg-Marquardt support (squared-error family only) ---

    fn squared_family_scale(&self, samples: usize) -> Result<Float> {
        if !self.method.is_squared_family() {
            return Err(Error::InvalidConfiguration(format!(
                "{} cannot drive Levenberg-Marquardt; a squared-error loss is required",
                self.method.name()
            )));
        }
        Ok(self.difference_scale(samples)?.sqrt())
    }

    /// Residual vector r with sum(r^2) equal to the data error term.
    pub fn residuals(
        &self,
        network: &NeuralNetwork,
        inputs: &Tensor<Float>,
        targets: &Tensor<Float>,
        device: &Device,
    ) -> Result<DVec<Float>> {
        let scale = self.squared_family_scale(inputs.dims()[0])?;
        let outputs = network.calculate_outputs(inputs, device)?;
        if outputs.shape() != targets.shape() {
            return Err(Error::shape("residuals", targets.dims(), outputs.dims()));
        }
        Ok(DVec::from_fn(outputs.numel(), |k| {
            scale * (outputs.data()[k] - targets.data()[k])
        }))
    }

    /// Jacobian of the residual vector with respect to the parameters:
    /// [samples * outputs, parameters], one backward pass per output unit
    /// per sample.
    pub fn residual_jacobian(
        &self,
        network: &NeuralNetwork,
        inputs: &Tensor<Float>,
        targets: &Tensor<Float>,
        device: &Device,
    ) -> Result<DMat<Float>> {
        let samples = inputs.dims()[0];
        let scale = self.squared_family_scale(samples)?;
        let outputs_number = targets.dims()[1];
        let parameters = network.parameters_number();
        let mut jacobian = DMat::zeros(samples * outputs_number, parameters);

        for s in 0..samples {
            let row = inputs.slice_rows(s..s + 1)?;
            let state = network.forward_propagate(&row, device)?;
            for o in 0..outputs_number {
                let mut seed = Tensor::zeros(state.outputs().shape().clone());
                seed.data_mut()[o] = scale;
                let (gradient, _) = network.backward(&state, &seed, device)?;
                jacobian
                    .row_mut(s * outputs_number + o)
                    .copy_from_slice(gradient.as_slice());
            }
        }
        Ok(jacobian)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_nn::ModelType;
    use skein_tensor::Shape;

    const DEV: Device = Device::SingleThreaded;

    fn approximation_net() -> NeuralNetwork {
        NeuralNetwork::new(ModelType::Approximation, &[2, 3, 1], 31).unwrap()
    }

    fn classification_net() -> NeuralNetwork {
        NeuralNetwork::new(ModelType::Classification, &[2, 3, 1], 31).unwrap()
    }

    fn batch() -> (Tensor<Float>, Tensor<Float>) {
        let inputs = Tensor::new(
            vec![0.2, -0.5, 0.9, 0.3, -0.7, 0.8, 0.1, 0.4],
            Shape::matrix(4, 2),
        );
        let targets = Tensor::new(vec![0.0, 1.0, 1.0, 0.0], Shape::matrix(4, 1));
        (inputs, targets)
    }

    fn check_gradient(loss_index: &LossIndex, network: &mut NeuralNetwork) {
        let (inputs, targets) = batch();
        let (_, analytical) = loss_index
            .loss_and_gradient(network, &inputs, &targets, &DEV)
            .unwrap();

        let eps = 1e-6;
        let params = network.get_parameters();
        for k in 0..params.len() {
            let mut plus = params.clone();
            plus[k] += eps;
            network.set_parameters(&plus).unwrap();
            let fp = loss_index.loss(network, &inputs, &targets, &DEV).unwrap();
            let mut minus = params.clone();
            minus[k] -= eps;
            network.set_parameters(&minus).unwrap();
            let fm = loss_index.loss(network, &inputs, &targets, &DEV).unwrap();
            let numerical = (fp - fm) / (2.0 * eps);

            let denom = numerical.abs().max(analytical[k].abs()).max(1.0);
            assert!(
                ((numerical - analytical[k]) / denom).abs() < 1e-4,
                "{}: parameter {k}: numerical {numerical} vs analytical {}",
                loss_index.method().name(),
                analytical[k]
            );
        }
        network.set_parameters(&params).unwrap();
    }

    #[test]
    fn sum_squared_known_value() {
        let loss_index = LossIndex::new(LossMethod::SumSquaredError);
        let outputs = Tensor::new(vec![1.0, 2.0], Shape::matrix(2, 1));
        let targets = Tensor::new(vec![0.0, 0.0], Shape::matrix(2, 1));
        assert_eq!(loss_index.error_term(&outputs, &targets).unwrap(), 5.0);
    }

    #[test]
    fn mean_squared_divides_by_samples() {
        let loss_index = LossIndex::new(LossMethod::MeanSquaredError);
        let outputs = Tensor::new(vec![1.0, 2.0], Shape::matrix(2, 1));
        let targets = Tensor::new(vec![0.0, 0.0], Shape::matrix(2, 1));
        assert_eq!(loss_index.error_term(&outputs, &targets).unwrap(), 2.5);
    }

    #[test]
    fn gradients_match_for_squared_losses() {
        for method in [LossMethod::SumSquaredError, LossMethod::MeanSquaredError] {
            let loss_index = LossIndex::new(method);
            check_gradient(&loss_index, &mut approximation_net());
        }
    }

    #[test]
    fn gradient_matches_for_minkowski() {
        let mut loss_index = LossIndex::new(LossMethod::MinkowskiError);
        loss_index.set_minkowski_parameter(1.5).unwrap();
        check_gradient(&loss_index, &mut approximation_net());
    }

    #[test]
    fn gradient_matches_for_cross_entropy() {
        let loss_index = LossIndex::new(LossMethod::CrossEntropyError);
        check_gradient(&loss_index, &mut classification_net());
    }

    #[test]
    fn gradient_matches_for_weighted_squared() {
        let mut loss_index = LossIndex::new(LossMethod::WeightedSquaredError);
        loss_index.set_class_weights(2.5, 1.0).unwrap();
        check_gradient(&loss_index, &mut classification_net());
    }

    #[test]
    fn gradient_matches_with_regularization() {
        for kind in [Regularization::L1, Regularization::L2] {
            let mut loss_index = LossIndex::new(LossMethod::SumSquaredError);
            loss_index.set_regularization(kind, 0.05).unwrap();
            check_gradient(&loss_index, &mut approximation_net());
        }
    }

    #[test]
    fn minkowski_parameter_validated() {
        let mut loss_index = LossIndex::new(LossMethod::MinkowskiError);
        assert!(loss_index.set_minkowski_parameter(0.5).is_err());
        assert!(loss_index.set_minkowski_parameter(2.5).is_err());
        assert!(loss_index.set_minkowski_parameter(2.0).is_ok());
    }

    #[test]
    fn normalized_needs_prepare() {
        let loss_index = LossIndex::new(LossMethod::NormalizedSquaredError);
        let (inputs, targets) = batch();
        let network = approximation_net();
        assert!(loss_index
            .loss(&network, &inputs, &targets, &DEV)
            .is_err());
    }

    #[test]
    fn residuals_square_to_error() {
        let loss_index = LossIndex::new(LossMethod::SumSquaredError);
        let network = approximation_net();
        let (inputs, targets) = batch();
        let residuals = loss_index
            .residuals(&network, &inputs, &targets, &DEV)
            .unwrap();
        let outputs = network.calculate_outputs(&inputs, &DEV).unwrap();
        let error = loss_index.error_term(&outputs, &targets).unwrap();
        assert!((residuals.norm_sq() - error).abs() < 1e-10);
    }

    #[test]
    fn jacobian_matches_central_differences() {
        let loss_index = LossIndex::new(LossMethod::SumSquaredError);
        let mut network = approximation_net();
        let (inputs, targets) = batch();
        let jacobian = loss_index
            .residual_jacobian(&network, &inputs, &targets, &DEV)
            .unwrap();

        let eps = 1e-6;
        let params = network.get_parameters();
        for k in 0..params.len() {
            let mut plus = params.clone();
            plus[k] += eps;
            network.set_parameters(&plus).unwrap();
            let rp = loss_index
                .residuals(&network, &inputs, &targets, &DEV)
                .unwrap();
            let mut minus = params.clone();
            minus[k] -= eps;
            network.set_parameters(&minus).unwrap();
            let rm = loss_index
                .residuals(&network, &inputs, &targets, &DEV)
                .unwrap();
            for i in 0..rp.len() {
                let numerical = (rp[i] - rm[i]) / (2.0 * eps);
                assert!(
                    (numerical - jacobian.get(i, k)).abs() < 1e-5,
                    "residual {i}, parameter {k}: numerical {numerical} vs {}",
                    jacobian.get(i, k)
                );
            }
        }
        network.set_parameters(&params).unwrap();
    }

    #[test]
    fn cross_entropy_cannot_drive_lm() {
        let loss_index = LossIndex::new(LossMethod::CrossEntropyError);
        let network = classification_net();
        let (inputs, targets) = batch();
        match loss_index.residuals(&network, &inputs, &targets, &DEV) {
            Err(Error::InvalidConfiguration(_)) => {}
            other => panic!("expected InvalidConfiguration, got {other:?}"),
        }
    }
}
