use crate::common::train_and_score;
use crate::{NeuronsCandidate, NeuronsSelectionResults};
use skein::{Device, Error, Float, Result};
use skein_data::DataSet;
use skein_nn::NeuralNetwork;
use skein_train::TrainingStrategy;
use tracing::info;

/// Grows the last hidden layer from `minimum_neurons` to `maximum_neurons`
/// in `step` increments, retraining at every width and keeping the one with
/// the lowest selection loss. Stops early after `max_selection_failures`
/// widths without improvement.
#[derive(Debug, Clone)]
pub struct IncrementalNeurons {
    pub minimum_neurons: usize,
    pub maximum_neurons: usize,
    pub step: usize,
    /// Independent trainings per width; the best one scores the width.
    pub trials: usize,
    pub max_selection_failures: usize,
    pub seed: u64,
    pub display: bool,
}

impl IncrementalNeurons {
    pub fn new() -> Self {
        Self {
            minimum_neurons: 1,
            maximum_neurons: 10,
            step: 1,
            trials: 1,
            max_selection_failures: 2,
            seed: 0,
            display: false,
        }
    }

    /// Run the loop; the best width and its trained parameters are applied
    /// to `network` before returning.
    pub fn perform(
        &self,
        network: &mut NeuralNetwork,
        strategy: &mut TrainingStrategy,
        data: &DataSet,
        device: &Device,
    ) -> Result<NeuronsSelectionResults> {
        if self.minimum_neurons == 0 || self.maximum_neurons < self.minimum_neurons || self.step == 0
        {
            return Err(Error::InvalidConfiguration(format!(
                "bad neurons range {}..={} step {}",
                self.minimum_neurons, self.maximum_neurons, self.step
            )));
        }

        let mut candidates: Vec<NeuronsCandidate> = Vec::new();
        let mut best_selection = Float::INFINITY;
        let mut failures = 0usize;

        let mut width = self.minimum_neurons;
        while width <= self.maximum_neurons {
            let mut width_best: Option<NeuronsCandidate> = None;
            for trial in 0..self.trials.max(1) {
                // Snapshot-and-mutate: each trial rebuilds the hidden layer
                // on a clone of the incoming network.
                let mut candidate_network = network.clone();
                candidate_network
                    .set_hidden_neurons(width, self.seed ^ (width as u64) << 8 ^ trial as u64)?;
                let (training_loss, selection_loss, parameters) =
                    train_and_score(strategy, &mut candidate_network, data, device)?;
                let candidate = NeuronsCandidate {
                    neurons: width,
                    training_loss,
                    selection_loss,
                    parameters,
                };
                let better = width_best
                    .as_ref()
                    .map_or(true, |b| candidate.selection_loss < b.selection_loss);
                if better {
                    width_best = Some(candidate);
                }
            }
            let candidate = width_best.unwrap();
            if self.display {
                info!(
                    "neurons selection: width {width}, training loss {:.6e}, selection loss {:.6e}",
                    candidate.training_loss, candidate.selection_loss
                );
            }
            if candidate.selection_loss < best_selection {
                best_selection = candidate.selection_loss;
                failures = 0;
            } else {
                failures += 1;
            }
            candidates.push(candidate);

            if failures >= self.max_selection_failures {
                break;
            }
            width += self.step;
        }

        let optimum = (0..candidates.len())
            .min_by(|&a, &b| candidates[a].selection_loss.total_cmp(&candidates[b].selection_loss))
            .expect("at least one width was tried");

        // Re-apply the best configuration.
        let best = &candidates[optimum];
        network.set_hidden_neurons(best.neurons, self.seed)?;
        network.set_parameters(&best.parameters)?;
        if self.display {
            info!(
                "neurons selection: optimum width {} with selection loss {:.6e}",
                best.neurons, best.selection_loss
            );
        }

        Ok(NeuronsSelectionResults {
            candidates,
            optimum,
        })
    }
}

impl Default for IncrementalNeurons {
    fn default() -> Self {
        Self::new()
    }
}
