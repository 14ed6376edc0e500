//! Tree persistence for the training stack: `LossIndex`,
//! `OptimizationAlgorithm` and the `TrainingStrategy` aggregate.

use crate::optim::line_search::LineSearch;
use crate::{
    AdaptiveMomentEstimation, ConjugateGradient, ConjugateGradientMethod, EvolutionaryAlgorithm,
    GradientDescent, InverseHessianUpdate, LevenbergMarquardt, LineSearchMethod, LossIndex,
    LossMethod, MutationMethod, OptimizationAlgorithm, QuasiNewton, RecombinationMethod,
    Regularization, SelectionMethod, StochasticGradientDescent, StoppingCriteria,
    TrainingStrategy,
};
use skein::{Error, Float, Result, TreeNode};
use std::time::Duration;

impl LossIndex {
    pub fn to_tree(&self) -> TreeNode {
        let mut root = TreeNode::new("LossIndex");
        root.push(TreeNode::leaf("Method", self.method().name()));
        root.push(TreeNode::leaf("Regularization", self.regularization().name()));
        root.push(TreeNode::float_leaf(
            "RegularizationWeight",
            self.regularization_weight() as f64,
        ));
        root.push(TreeNode::float_leaf(
            "MinkowskiParameter",
            self.minkowski_parameter() as f64,
        ));
        if let (Some(positives), Some(negatives)) =
            (self.positives_weight(), self.negatives_weight())
        {
            root.push(TreeNode::float_leaf("PositivesWeight", positives as f64));
            root.push(TreeNode::float_leaf("NegativesWeight", negatives as f64));
        }
        root
    }

    pub fn from_tree(root: &TreeNode) -> Result<Self> {
        if root.name() != "LossIndex" {
            return Err(Error::InvalidConfiguration(format!(
                "expected LossIndex element, found {}",
                root.name()
            )));
        }
        let method = LossMethod::from_name(root.require("Method")?.value().unwrap_or(""))?;
        let mut loss_index = LossIndex::new(method);
        loss_index.set_regularization(
            Regularization::from_name(root.require("Regularization")?.value().unwrap_or(""))?,
            root.parse_child::<f64>("RegularizationWeight")? as Float,
        )?;
        loss_index.set_minkowski_parameter(root.parse_child::<f64>("MinkowskiParameter")? as Float)?;
        if root.child("PositivesWeight").is_some() {
            loss_index.set_class_weights(
                root.parse_child::<f64>("PositivesWeight")? as Float,
                root.parse_child::<f64>("NegativesWeight")? as Float,
            )?;
        }
        Ok(loss_index)
    }
}

fn criteria_to_tree(criteria: &StoppingCriteria) -> TreeNode {
    let mut node = TreeNode::new("StoppingCriteria");
    node.push(TreeNode::float_leaf("LossGoal", criteria.loss_goal as f64));
    node.push(TreeNode::float_leaf(
        "GradientNormGoal",
        criteria.gradient_norm_goal as f64,
    ));
    node.push(TreeNode::leaf(
        "MaximumSelectionFailures",
        criteria.max_selection_failures,
    ));
    node.push(TreeNode::leaf("MaximumEpochs", criteria.max_epochs));
    node.push(TreeNode::float_leaf(
        "MaximumTimeSeconds",
        criteria.max_time.as_secs_f64(),
    ));
    node
}

fn criteria_from_tree(parent: &TreeNode) -> Result<StoppingCriteria> {
    let node = parent.require("StoppingCriteria")?;
    Ok(StoppingCriteria {
        loss_goal: node.parse_child::<f64>("LossGoal")? as Float,
        gradient_norm_goal: node.parse_child::<f64>("GradientNormGoal")? as Float,
        max_selection_failures: node.parse_child("MaximumSelectionFailures")?,
        max_epochs: node.parse_child("MaximumEpochs")?,
        max_time: Duration::from_secs_f64(node.parse_child::<f64>("MaximumTimeSeconds")?),
    })
}

fn line_search_to_tree(search: &LineSearch) -> TreeNode {
    let mut node = TreeNode::new("LineSearch");
    node.push(TreeNode::leaf("Method", search.method.name()));
    node.push(TreeNode::float_leaf(
        "TrainingRateMax",
        search.training_rate_max as f64,
    ));
    node.push(TreeNode::float_leaf("Tolerance", search.tolerance as f64));
    node.push(TreeNode::leaf(
        "MaximumBracketingIterations",
        search.maximum_bracketing_iterations,
    ));
    node.push(TreeNode::float_leaf(
        "FallbackStep",
        search.fallback_step as f64,
    ));
    node
}

fn line_search_from_tree(node: &TreeNode) -> Result<LineSearch> {
    Ok(LineSearch {
        method: LineSearchMethod::from_name(node.require("Method")?.value().unwrap_or(""))?,
        training_rate_max: node.parse_child::<f64>("TrainingRateMax")? as Float,
        tolerance: node.parse_child::<f64>("Tolerance")? as Float,
        maximum_bracketing_iterations: node.parse_child("MaximumBracketingIterations")?,
        fallback_step: node.parse_child::<f64>("FallbackStep")? as Float,
    })
}

impl OptimizationAlgorithm {
    pub fn to_tree(&self) -> TreeNode {
        let mut root = TreeNode::new("OptimizationAlgorithm");
        root.push(TreeNode::leaf("Kind", self.kind_name()));
        root.push(criteria_to_tree(self.criteria()));
        match self {
            Self::GradientDescent(o) => {
                root.push(TreeNode::float_leaf("LearningRate", o.learning_rate as f64));
                if let Some(search) = &o.line_search {
                    root.push(line_search_to_tree(search));
                }
            }
            Self::ConjugateGradient(o) => {
                root.push(TreeNode::leaf("Method", o.method.name()));
                root.push(TreeNode::leaf("RestartInterval", o.restart_interval));
                root.push(line_search_to_tree(&o.line_search));
            }
            Self::QuasiNewton(o) => {
                root.push(TreeNode::leaf("Update", o.update.name()));
                root.push(line_search_to_tree(&o.line_search));
            }
            Self::LevenbergMarquardt(o) => {
                root.push(TreeNode::float_leaf("InitialDamping", o.initial_damping as f64));
                root.push(TreeNode::float_leaf("DampingFactor", o.damping_factor as f64));
                root.push(TreeNode::float_leaf("MinimumDamping", o.minimum_damping as f64));
                root.push(TreeNode::float_leaf("MaximumDamping", o.maximum_damping as f64));
            }
            Self::StochasticGradientDescent(o) => {
                root.push(TreeNode::float_leaf("LearningRate", o.learning_rate as f64));
                root.push(TreeNode::float_leaf("Momentum", o.momentum as f64));
                root.push(TreeNode::leaf("BatchSize", o.batch_size));
                root.push(TreeNode::leaf("Seed", o.seed));
            }
            Self::AdaptiveMomentEstimation(o) => {
                root.push(TreeNode::float_leaf("LearningRate", o.learning_rate as f64));
                root.push(TreeNode::float_leaf("Beta1", o.beta_1 as f64));
                root.push(TreeNode::float_leaf("Beta2", o.beta_2 as f64));
                root.push(TreeNode::float_leaf("Epsilon", o.epsilon as f64));
                root.push(TreeNode::leaf("BatchSize", o.batch_size));
                root.push(TreeNode::leaf("Seed", o.seed));
            }
            Self::EvolutionaryAlgorithm(o) => {
                root.push(TreeNode::leaf("PopulationSize", o.population_size));
                root.push(TreeNode::leaf("Selection", o.selection.name()));
                root.push(TreeNode::leaf("Recombination", o.recombination.name()));
                root.push(TreeNode::leaf("Mutation", o.mutation.name()));
                root.push(TreeNode::float_leaf("MutationRate", o.mutation_rate as f64));
                root.push(TreeNode::float_leaf("MutationRange", o.mutation_range as f64));
                root.push(TreeNode::leaf("Seed", o.seed));
            }
        }
        root
    }

    pub fn from_tree(root: &TreeNode) -> Result<Self> {
        if root.name() != "OptimizationAlgorithm" {
            return Err(Error::InvalidConfiguration(format!(
                "expected OptimizationAlgorithm element, found {}",
                root.name()
            )));
        }
        let criteria = criteria_from_tree(root)?;
        let kind = root.require("Kind")?.value().unwrap_or("");
        Ok(match kind {
            "GradientDescent" => {
                let mut o = GradientDescent::new();
                o.learning_rate = root.parse_child::<f64>("LearningRate")? as Float;
                o.line_search = match root.child("LineSearch") {
                    Some(node) => Some(line_search_from_tree(node)?),
                    None => None,
                };
                o.criteria = criteria;
                Self::GradientDescent(o)
            }
            "ConjugateGradient" => {
                let mut o = ConjugateGradient::new();
                o.method = ConjugateGradientMethod::from_name(
                    root.require("Method")?.value().unwrap_or(""),
                )?;
                o.restart_interval = root.parse_child("RestartInterval")?;
                o.line_search = line_search_from_tree(root.require("LineSearch")?)?;
                o.criteria = criteria;
                Self::ConjugateGradient(o)
            }
            "QuasiNewton" => {
                let mut o = QuasiNewton::new();
                o.update =
                    InverseHessianUpdate::from_name(root.require("Update")?.value().unwrap_or(""))?;
                o.line_search = line_search_from_tree(root.require("LineSearch")?)?;
                o.criteria = criteria;
                Self::QuasiNewton(o)
            }
            "LevenbergMarquardt" => {
                let mut o = LevenbergMarquardt::new();
                o.initial_damping = root.parse_child::<f64>("InitialDamping")? as Float;
                o.damping_factor = root.parse_child::<f64>("DampingFactor")? as Float;
                o.minimum_damping = root.parse_child::<f64>("MinimumDamping")? as Float;
                o.maximum_damping = root.parse_child::<f64>("MaximumDamping")? as Float;
                o.criteria = criteria;
                Self::LevenbergMarquardt(o)
            }
            "StochasticGradientDescent" => {
                let mut o = StochasticGradientDescent::new();
                o.learning_rate = root.parse_child::<f64>("LearningRate")? as Float;
                o.momentum = root.parse_child::<f64>("Momentum")? as Float;
                o.batch_size = root.parse_child("BatchSize")?;
                o.seed = root.parse_child("Seed")?;
                o.criteria = criteria;
                Self::StochasticGradientDescent(o)
            }
            "AdaptiveMomentEstimation" => {
                let mut o = AdaptiveMomentEstimation::new();
                o.learning_rate = root.parse_child::<f64>("LearningRate")? as Float;
                o.beta_1 = root.parse_child::<f64>("Beta1")? as Float;
                o.beta_2 = root.parse_child::<f64>("Beta2")? as Float;
                o.epsilon = root.parse_child::<f64>("Epsilon")? as Float;
                o.batch_size = root.parse_child("BatchSize")?;
                o.seed = root.parse_child("Seed")?;
                o.criteria = criteria;
                Self::AdaptiveMomentEstimation(o)
            }
            "EvolutionaryAlgorithm" => {
                let mut o = EvolutionaryAlgorithm::new();
                o.population_size = root.parse_child("PopulationSize")?;
                o.selection =
                    SelectionMethod::from_name(root.require("Selection")?.value().unwrap_or(""))?;
                o.recombination = RecombinationMethod::from_name(
                    root.require("Recombination")?.value().unwrap_or(""),
                )?;
                o.mutation =
                    MutationMethod::from_name(root.require("Mutation")?.value().unwrap_or(""))?;
                o.mutation_rate = root.parse_child::<f64>("MutationRate")? as Float;
                o.mutation_range = root.parse_child::<f64>("MutationRange")? as Float;
                o.seed = root.parse_child("Seed")?;
                o.criteria = criteria;
                Self::EvolutionaryAlgorithm(o)
            }
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "unknown optimization algorithm {other:?}"
                )))
            }
        })
    }
}

impl TrainingStrategy {
    pub fn to_tree(&self) -> TreeNode {
        let mut root = TreeNode::new("TrainingStrategy");
        root.push(TreeNode::leaf("Display", self.display()));
        root.push(self.loss_index.to_tree());
        root.push(self.optimizer.to_tree());
        root
    }

    pub fn from_tree(root: &TreeNode) -> Result<Self> {
        if root.name() != "TrainingStrategy" {
            return Err(Error::InvalidConfiguration(format!(
                "expected TrainingStrategy element, found {}",
                root.name()
            )));
        }
        let loss_index = LossIndex::from_tree(root.require("LossIndex")?)?;
        let optimizer = OptimizationAlgorithm::from_tree(root.require("OptimizationAlgorithm")?)?;
        let mut strategy = TrainingStrategy::with_optimizer(loss_index.method(), optimizer);
        strategy.loss_index = loss_index;
        strategy.set_display(root.parse_child("Display")?);
        Ok(strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_index_roundtrip() {
        let mut loss_index = LossIndex::new(LossMethod::MinkowskiError);
        loss_index.set_minkowski_parameter(1.25).unwrap();
        loss_index
            .set_regularization(Regularization::L2, 0.003)
            .unwrap();

        let text = loss_index.to_tree().write();
        let parsed = LossIndex::from_tree(&TreeNode::parse(&text).unwrap()).unwrap();
        assert_eq!(parsed.method(), LossMethod::MinkowskiError);
        assert_eq!(parsed.minkowski_parameter(), 1.25);
        assert_eq!(parsed.regularization(), Regularization::L2);
        assert_eq!(parsed.regularization_weight(), 0.003);
    }

    #[test]
    fn quasi_newton_roundtrip() {
        let mut optimizer = QuasiNewton::new();
        optimizer.update = InverseHessianUpdate::Dfp;
        optimizer.criteria.loss_goal = 0.01;
        optimizer.criteria.max_epochs = 123;
        let algorithm = OptimizationAlgorithm::QuasiNewton(optimizer);

        let text = algorithm.to_tree().write();
        let parsed = OptimizationAlgorithm::from_tree(&TreeNode::parse(&text).unwrap()).unwrap();
        match parsed {
            OptimizationAlgorithm::QuasiNewton(o) => {
                assert_eq!(o.update, InverseHessianUpdate::Dfp);
                assert_eq!(o.criteria.loss_goal, 0.01);
                assert_eq!(o.criteria.max_epochs, 123);
            }
            other => panic!("wrong kind parsed: {}", other.kind_name()),
        }
    }

    #[test]
    fn evolutionary_roundtrip() {
        let mut optimizer = EvolutionaryAlgorithm::new();
        optimizer.selection = SelectionMethod::Tournament;
        optimizer.mutation = MutationMethod::Uniform;
        optimizer.mutation_rate = 0.25;
        let algorithm = OptimizationAlgorithm::EvolutionaryAlgorithm(optimizer);

        let text = algorithm.to_tree().write();
        let parsed = OptimizationAlgorithm::from_tree(&TreeNode::parse(&text).unwrap()).unwrap();
        match parsed {
            OptimizationAlgorithm::EvolutionaryAlgorithm(o) => {
                assert_eq!(o.selection, SelectionMethod::Tournament);
                assert_eq!(o.mutation, MutationMethod::Uniform);
                assert_eq!(o.mutation_rate, 0.25);
            }
            other => panic!("wrong kind parsed: {}", other.kind_name()),
        }
    }

    #[test]
    fn training_strategy_roundtrip() {
        let mut strategy = TrainingStrategy::new(LossMethod::CrossEntropyError);
        strategy.set_display(true);
        strategy.optimizer.criteria_mut().max_epochs = 55;

        let text = strategy.to_tree().write();
        let parsed = TrainingStrategy::from_tree(&TreeNode::parse(&text).unwrap()).unwrap();
        assert!(parsed.display());
        assert_eq!(parsed.loss_index.method(), LossMethod::CrossEntropyError);
        assert_eq!(parsed.optimizer.criteria().max_epochs, 55);
    }

    #[test]
    fn unknown_kind_is_invalid_configuration() {
        let text = "<OptimizationAlgorithm>\n<Kind>SimulatedAnnealing</Kind>\n<StoppingCriteria>\n<LossGoal>0.0</LossGoal>\n<GradientNormGoal>0.0</GradientNormGoal>\n<MaximumSelectionFailures>10</MaximumSelectionFailures>\n<MaximumEpochs>10</MaximumEpochs>\n<MaximumTimeSeconds>10.0</MaximumTimeSeconds>\n</StoppingCriteria>\n</OptimizationAlgorithm>\n";
        match OptimizationAlgorithm::from_tree(&TreeNode::parse(text).unwrap()) {
            Err(Error::InvalidConfiguration(_)) => {}
            other => panic!("expected InvalidConfiguration, got {other:?}"),
        }
    }
}
