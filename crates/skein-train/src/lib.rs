//! Training: loss indices, iterative optimizers and the strategy that wires
//! them around a network and a data set.
//!
//! The strategy owns the run; each epoch asks the loss index for loss and
//! gradient, which asks the network for a forward pass followed by a
//! backward pass. Every optimizer shares one ordered stopping predicate and
//! cooperative cancellation at epoch boundaries.

mod analysis;
mod loss;
mod optim;
mod persistence;
mod results;
mod stopping;
mod strategy;

pub use analysis::{classification_accuracy, confusion_matrix};
pub use loss::{LossIndex, LossMethod, Regularization};
pub use optim::adam::AdaptiveMomentEstimation;
pub use optim::conjugate_gradient::{ConjugateGradient, ConjugateGradientMethod};
pub use optim::evolutionary::{
    EvolutionaryAlgorithm, MutationMethod, RecombinationMethod, SelectionMethod,
};
pub use optim::gradient_descent::GradientDescent;
pub use optim::levenberg_marquardt::LevenbergMarquardt;
pub use optim::line_search::{LineSearch, LineSearchMethod};
pub use optim::quasi_newton::{InverseHessianUpdate, QuasiNewton};
pub use optim::sgd::StochasticGradientDescent;
pub use optim::TrainingContext;
pub use results::TrainingResults;
pub use stopping::{StoppingCondition, StoppingCriteria};
pub use strategy::{OptimizationAlgorithm, TrainingStrategy};
