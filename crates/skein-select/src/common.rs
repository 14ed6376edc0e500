//! Shared plumbing for the selection drivers: candidate construction,
//! black-box training, and data-set input masking.

use skein::{Device, Float, Result};
use skein_data::{DataSet, VariableUse};
use skein_la::DVec;
use skein_nn::NeuralNetwork;
use skein_train::{StoppingCondition, TrainingStrategy};

/// Hidden widths of a template network: everything between the inputs and
/// the output layer in its architecture.
pub(crate) fn hidden_widths(template: &NeuralNetwork) -> Vec<usize> {
    let arch = template.architecture();
    arch[1..arch.len() - 1].to_vec()
}

/// Build a fresh candidate network shaped like the template but sized to
/// the data set's currently active inputs, with descriptives wired in.
pub(crate) fn build_candidate(
    template: &NeuralNetwork,
    data: &DataSet,
    hidden: &[usize],
    seed: u64,
) -> Result<NeuralNetwork> {
    let mut architecture = vec![data.inputs_number()];
    architecture.extend_from_slice(hidden);
    architecture.push(template.outputs_number());

    let mut network = NeuralNetwork::new(template.model_type(), &architecture, seed)?;
    network.set_input_descriptives(data.input_descriptives()?)?;
    if network.unscaling_layer_mut().is_some() {
        network.set_target_descriptives(data.target_descriptives()?)?;
    }
    network.set_inputs_names(data.input_variable_names())?;
    network.set_outputs_names(template.outputs_names().to_vec())?;
    Ok(network)
}

/// Run one full training and score it. Non-convergence (numerical failure
/// or a non-finite loss) scores +infinity; genuine wiring errors propagate.
pub(crate) fn train_and_score(
    strategy: &mut TrainingStrategy,
    network: &mut NeuralNetwork,
    data: &DataSet,
    device: &Device,
) -> Result<(Float, Float, DVec<Float>)> {
    let results = strategy.perform_training(network, data, device)?;
    let failed = results.stopping_condition == StoppingCondition::NumericalFailure
        || !results.final_selection_loss().is_finite()
        || !results.final_training_loss().is_finite();
    if failed {
        return Ok((Float::INFINITY, Float::INFINITY, results.final_parameters));
    }
    Ok((
        results.final_training_loss(),
        results.final_selection_loss(),
        results.final_parameters,
    ))
}

/// Set exactly `selected` (column indices) as inputs, turning the other
/// pool columns off.
pub(crate) fn apply_input_mask(data: &mut DataSet, pool: &[usize], selected: &[usize]) {
    for &column in pool {
        data.set_variable_use(
            column,
            if selected.contains(&column) {
                VariableUse::Input
            } else {
                VariableUse::Unused
            },
        );
    }
}

/// Restore a data set's variable uses from a snapshot.
pub(crate) fn restore_uses(data: &mut DataSet, snapshot: &[(usize, VariableUse)]) {
    for &(column, use_) in snapshot {
        data.set_variable_use(column, use_);
    }
}

/// Snapshot the variable uses of the given columns.
pub(crate) fn snapshot_uses(data: &DataSet, pool: &[usize]) -> Vec<(usize, VariableUse)> {
    pool.iter().map(|&c| (c, data.variable_use(c))).collect()
}
