use crate::common::{
    apply_input_mask, build_candidate, hidden_widths, restore_uses, snapshot_uses, train_and_score,
};
use crate::{InputsCandidate, InputsSelectionResults};
use skein::{Device, Error, Float, Result};
use skein_data::DataSet;
use skein_nn::NeuralNetwork;
use skein_train::TrainingStrategy;
use tracing::info;

/// Backward elimination over the input columns: starting from the full
/// set, each step removes the input whose exclusion most reduces (or least
/// increases) the selection loss. Stops when the overall best has not
/// improved for `max_selection_failures` steps or at `minimum_inputs`.
#[derive(Debug, Clone)]
pub struct PruningInputs {
    pub minimum_inputs: usize,
    pub max_selection_failures: usize,
    pub seed: u64,
    pub display: bool,
}

impl PruningInputs {
    pub fn new() -> Self {
        Self {
            minimum_inputs: 1,
            max_selection_failures: 2,
            seed: 0,
            display: false,
        }
    }

    /// Run the loop. The winning input subset is applied to the data set's
    /// use flags, and `network` is replaced by the retrained best candidate.
    pub fn perform(
        &self,
        network: &mut NeuralNetwork,
        strategy: &mut TrainingStrategy,
        data: &mut DataSet,
        device: &Device,
    ) -> Result<InputsSelectionResults> {
        let pool = data.input_indices();
        if pool.is_empty() {
            return Err(Error::UnboundReference("input variables"));
        }
        let snapshot = snapshot_uses(data, &pool);

        let searched = self.search(network, strategy, data, device, &pool);
        let candidates = match searched {
            Ok(candidates) => candidates,
            Err(e) => {
                restore_uses(data, &snapshot);
                return Err(e);
            }
        };

        let optimum = (0..candidates.len())
            .min_by(|&a, &b| {
                candidates[a]
                    .selection_loss
                    .total_cmp(&candidates[b].selection_loss)
            })
            .expect("the search always records at least one candidate");

        let hidden = hidden_widths(network);
        let best = candidates[optimum].clone();
        apply_input_mask(data, &pool, &best.inputs);
        let mut best_network = build_candidate(network, data, &hidden, self.seed)?;
        best_network.set_parameters(&best.parameters)?;
        *network = best_network;
        if self.display {
            info!(
                "pruning inputs: optimum {:?} with selection loss {:.6e}",
                best.inputs, best.selection_loss
            );
        }

        Ok(InputsSelectionResults {
            candidates,
            optimum,
        })
    }

    fn search(
        &self,
        template: &NeuralNetwork,
        strategy: &mut TrainingStrategy,
        data: &mut DataSet,
        device: &Device,
        pool: &[usize],
    ) -> Result<Vec<InputsCandidate>> {
        let hidden = hidden_widths(template);
        let minimum = self.minimum_inputs.max(1);

        let mut candidates: Vec<InputsCandidate> = Vec::new();
        let mut selected: Vec<usize> = pool.to_vec();
        let mut best_selection: Float;
        let mut failures = 0usize;
        let mut round = 0u64;

        // Baseline on the full set, so the final optimum can be "keep
        // everything".
        {
            apply_input_mask(data, pool, &selected);
            let mut baseline_network = build_candidate(template, data, &hidden, self.seed)?;
            let (training_loss, selection_loss, parameters) =
                train_and_score(strategy, &mut baseline_network, data, device)?;
            best_selection = selection_loss;
            candidates.push(InputsCandidate {
                inputs: selected.clone(),
                training_loss,
                selection_loss,
                parameters,
            });
        }

        while selected.len() > minimum {
            let mut step_best: Option<InputsCandidate> = None;
            for &column in &selected {
                let subset: Vec<usize> =
                    selected.iter().copied().filter(|&c| c != column).collect();
                apply_input_mask(data, pool, &subset);

                let mut candidate_network =
                    build_candidate(template, data, &hidden, self.seed ^ (round << 16))?;
                let (training_loss, selection_loss, parameters) =
                    train_and_score(strategy, &mut candidate_network, data, device)?;
                let candidate = InputsCandidate {
                    inputs: subset,
                    training_loss,
                    selection_loss,
                    parameters,
                };
                if self.display {
                    info!(
                        "pruning inputs: {:?} -> selection loss {:.6e}",
                        candidate.inputs, candidate.selection_loss
                    );
                }
                let better = step_best
                    .as_ref()
                    .map_or(true, |b| candidate.selection_loss < b.selection_loss);
                if better {
                    step_best = Some(candidate);
                }
            }
            let Some(step_best) = step_best else { break };

            selected = step_best.inputs.clone();
            if step_best.selection_loss < best_selection {
                best_selection = step_best.selection_loss;
                failures = 0;
            } else {
                failures += 1;
            }
            candidates.push(step_best);
            round += 1;

            if failures >= self.max_selection_failures {
                break;
            }
        }

        Ok(candidates)
    }
}

impl Default for PruningInputs {
    fn default() -> Self {
        Self::new()
    }
}
