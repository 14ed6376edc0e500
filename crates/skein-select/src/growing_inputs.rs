use crate::common::{
    apply_input_mask, build_candidate, hidden_widths, restore_uses, snapshot_uses, train_and_score,
};
use crate::{InputsCandidate, InputsSelectionResults};
use skein::{Device, Error, Float, Result};
use skein_data::DataSet;
use skein_nn::NeuralNetwork;
use skein_train::TrainingStrategy;
use tracing::info;

/// Forward selection over the input columns: starting from the empty set,
/// each step tries every not-yet-selected input and keeps the one whose
/// inclusion gives the lowest selection loss. Stops when the overall best
/// has not improved for `max_selection_failures` steps, or when the input
/// budget runs out.
#[derive(Debug, Clone)]
pub struct GrowingInputs {
    /// Largest subset to grow to; 0 means every available input.
    pub maximum_inputs: usize,
    pub max_selection_failures: usize,
    pub seed: u64,
    pub display: bool,
}

impl GrowingInputs {
    pub fn new() -> Self {
        Self {
            maximum_inputs: 0,
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

        // Re-apply the best subset and install its trained network.
        let hidden = hidden_widths(network);
        let best = candidates[optimum].clone();
        apply_input_mask(data, &pool, &best.inputs);
        let mut best_network = build_candidate(network, data, &hidden, self.seed)?;
        best_network.set_parameters(&best.parameters)?;
        *network = best_network;
        if self.display {
            info!(
                "growing inputs: optimum {:?} with selection loss {:.6e}",
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
        let budget = if self.maximum_inputs == 0 {
            pool.len()
        } else {
            self.maximum_inputs.min(pool.len())
        };

        let mut candidates: Vec<InputsCandidate> = Vec::new();
        let mut selected: Vec<usize> = Vec::new();
        let mut best_selection = Float::INFINITY;
        let mut failures = 0usize;
        let mut round = 0u64;

        while selected.len() < budget {
            // Try each remaining input on top of the current subset.
            let mut step_best: Option<InputsCandidate> = None;
            for &column in pool.iter().filter(|c| !selected.contains(c)) {
                let mut subset = selected.clone();
                subset.push(column);
                subset.sort_unstable();
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
                        "growing inputs: {:?} -> selection loss {:.6e}",
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

        if candidates.is_empty() {
            return Err(Error::EmptyPartition("inputs selection candidates"));
        }
        Ok(candidates)
    }
}

impl Default for GrowingInputs {
    fn default() -> Self {
        Self::new()
    }
}
