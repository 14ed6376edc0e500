use crate::optim::TrainingContext;
use crate::{
    AdaptiveMomentEstimation, ConjugateGradient, EvolutionaryAlgorithm, GradientDescent,
    LevenbergMarquardt, LossIndex, LossMethod, QuasiNewton, StochasticGradientDescent,
    StoppingCriteria, TrainingResults,
};
use skein::{CancelToken, Device, Error, Result};
use skein_data::{DataSet, Partition};
use skein_nn::NeuralNetwork;
use tracing::info;

/// Runtime choice among the optimizer family.
#[derive(Debug, Clone)]
pub enum OptimizationAlgorithm {
    GradientDescent(GradientDescent),
    ConjugateGradient(ConjugateGradient),
    QuasiNewton(QuasiNewton),
    LevenbergMarquardt(LevenbergMarquardt),
    StochasticGradientDescent(StochasticGradientDescent),
    AdaptiveMomentEstimation(AdaptiveMomentEstimation),
    EvolutionaryAlgorithm(EvolutionaryAlgorithm),
}

impl OptimizationAlgorithm {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::GradientDescent(_) => "GradientDescent",
            Self::ConjugateGradient(_) => "ConjugateGradient",
            Self::QuasiNewton(_) => "QuasiNewton",
            Self::LevenbergMarquardt(_) => "LevenbergMarquardt",
            Self::StochasticGradientDescent(_) => "StochasticGradientDescent",
            Self::AdaptiveMomentEstimation(_) => "AdaptiveMomentEstimation",
            Self::EvolutionaryAlgorithm(_) => "EvolutionaryAlgorithm",
        }
    }

    pub fn criteria(&self) -> &StoppingCriteria {
        match self {
            Self::GradientDescent(o) => &o.criteria,
            Self::ConjugateGradient(o) => &o.criteria,
            Self::QuasiNewton(o) => &o.criteria,
            Self::LevenbergMarquardt(o) => &o.criteria,
            Self::StochasticGradientDescent(o) => &o.criteria,
            Self::AdaptiveMomentEstimation(o) => &o.criteria,
            Self::EvolutionaryAlgorithm(o) => &o.criteria,
        }
    }

    pub fn criteria_mut(&mut self) -> &mut StoppingCriteria {
        match self {
            Self::GradientDescent(o) => &mut o.criteria,
            Self::ConjugateGradient(o) => &mut o.criteria,
            Self::QuasiNewton(o) => &mut o.criteria,
            Self::LevenbergMarquardt(o) => &mut o.criteria,
            Self::StochasticGradientDescent(o) => &mut o.criteria,
            Self::AdaptiveMomentEstimation(o) => &mut o.criteria,
            Self::EvolutionaryAlgorithm(o) => &mut o.criteria,
        }
    }

    fn train(&self, ctx: &mut TrainingContext<'_>) -> Result<TrainingResults> {
        match self {
            Self::GradientDescent(o) => o.train(ctx),
            Self::ConjugateGradient(o) => o.train(ctx),
            Self::QuasiNewton(o) => o.train(ctx),
            Self::LevenbergMarquardt(o) => o.train(ctx),
            Self::StochasticGradientDescent(o) => o.train(ctx),
            Self::AdaptiveMomentEstimation(o) => o.train(ctx),
            Self::EvolutionaryAlgorithm(o) => o.train(ctx),
        }
    }
}

/// Wires a loss index and an optimizer around a network and a data set and
/// orchestrates one training run.
#[derive(Debug, Clone)]
pub struct TrainingStrategy {
    pub loss_index: LossIndex,
    pub optimizer: OptimizationAlgorithm,
    display: bool,
    cancel: Option<CancelToken>,
}

impl TrainingStrategy {
    /// Quasi-Newton with the given loss; the default pairing.
    pub fn new(loss_method: LossMethod) -> Self {
        Self {
            loss_index: LossIndex::new(loss_method),
            optimizer: OptimizationAlgorithm::QuasiNewton(QuasiNewton::new()),
            display: false,
            cancel: None,
        }
    }

    pub fn with_optimizer(loss_method: LossMethod, optimizer: OptimizationAlgorithm) -> Self {
        Self {
            loss_index: LossIndex::new(loss_method),
            optimizer,
            display: false,
            cancel: None,
        }
    }

    pub fn display(&self) -> bool {
        self.display
    }

    pub fn set_display(&mut self, display: bool) {
        self.display = display;
    }

    /// Install a cancellation token checked at epoch boundaries.
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = Some(token);
    }

    /// Validate the wiring, bind per-partition loss state, and run the
    /// optimizer loop until the stopping predicate fires.
    pub fn perform_training(
        &mut self,
        network: &mut NeuralNetwork,
        data: &DataSet,
        device: &Device,
    ) -> Result<TrainingResults> {
        if network.is_empty() {
            return Err(Error::UnboundReference("neural network layers"));
        }
        if data.samples_in(Partition::Training) == 0 {
            return Err(Error::EmptyPartition("training"));
        }
        if data.samples_in(Partition::Selection) == 0 {
            return Err(Error::EmptyPartition("selection"));
        }

        self.loss_index.prepare(data, Partition::Training)?;

        if self.display {
            info!(
                "training strategy: {} with {} on {} training / {} selection samples",
                self.optimizer.kind_name(),
                self.loss_index.method().name(),
                data.samples_in(Partition::Training),
                data.samples_in(Partition::Selection),
            );
        }

        let mut ctx = TrainingContext::new(
            network,
            &self.loss_index,
            data,
            device,
            self.cancel.clone(),
            self.display,
        )?;
        self.optimizer.train(&mut ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein::Float;
    use skein_nn::ModelType;
    use skein_tensor::{Shape, Tensor};

    fn linear_data() -> DataSet {
        // y = 2x in [0, 1]; enough samples for a split.
        let mut rows = Vec::new();
        for i in 0..20 {
            let x = i as Float / 19.0;
            rows.push(x);
            rows.push(2.0 * x);
        }
        let mut data = DataSet::from_matrix(Tensor::new(rows, Shape::matrix(20, 2)), 1, 1).unwrap();
        data.split_samples_random(0.6, 0.2, 0.2, 7).unwrap();
        data
    }

    #[test]
    fn empty_network_is_unbound() {
        let mut strategy = TrainingStrategy::new(LossMethod::MeanSquaredError);
        let mut network = NeuralNetwork::empty(ModelType::Approximation);
        let data = linear_data();
        match strategy.perform_training(&mut network, &data, &Device::SingleThreaded) {
            Err(Error::UnboundReference(_)) => {}
            other => panic!("expected UnboundReference, got {other:?}"),
        }
    }

    #[test]
    fn missing_selection_partition_is_reported() {
        let mut strategy = TrainingStrategy::new(LossMethod::MeanSquaredError);
        let mut network = NeuralNetwork::new(ModelType::Approximation, &[1, 1], 3).unwrap();
        let rows: Vec<Float> = (0..8).flat_map(|i| [i as Float, i as Float]).collect();
        let data = DataSet::from_matrix(Tensor::new(rows, Shape::matrix(8, 2)), 1, 1).unwrap();
        // All samples stay in training; no selection partition exists.
        match strategy.perform_training(&mut network, &data, &Device::SingleThreaded) {
            Err(Error::EmptyPartition("selection")) => {}
            other => panic!("expected EmptyPartition, got {other:?}"),
        }
    }

    #[test]
    fn quasi_newton_learns_a_line() {
        let mut strategy = TrainingStrategy::new(LossMethod::MeanSquaredError);
        strategy.optimizer.criteria_mut().max_epochs = 200;
        let mut network = NeuralNetwork::new(ModelType::Approximation, &[1, 1], 3).unwrap();
        let data = linear_data();
        network
            .set_input_descriptives(data.input_descriptives().unwrap())
            .unwrap();
        network
            .set_target_descriptives(data.target_descriptives().unwrap())
            .unwrap();

        let results = strategy
            .perform_training(&mut network, &data, &Device::SingleThreaded)
            .unwrap();
        assert!(
            results.final_training_loss() < 1e-3,
            "loss {}",
            results.final_training_loss()
        );
        assert_eq!(results.training_history.len(), results.epochs);
    }
}
