//! Model selection: retrain-and-score loops that vary either the hidden
//! width (neurons selection) or the active input subset (inputs selection).
//!
//! Every driver treats the training strategy as a black box: snapshot the
//! configuration, apply a candidate change, run a full training, score it
//! on the selection partition, restore, and finally re-apply the best
//! candidate. A run that fails to converge scores +infinity and the loop
//! continues.

mod common;
mod genetic;
mod growing_inputs;
mod model;
mod neurons;
mod persistence;
mod pruning_inputs;
mod results;

pub use genetic::GeneticInputs;
pub use growing_inputs::GrowingInputs;
pub use model::{InputsSelectionMethod, ModelSelection};
pub use neurons::IncrementalNeurons;
pub use pruning_inputs::PruningInputs;
pub use results::{
    InputsCandidate, InputsSelectionResults, NeuronsCandidate, NeuronsSelectionResults,
};
