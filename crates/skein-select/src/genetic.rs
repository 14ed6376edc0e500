use crate::common::{
    apply_input_mask, build_candidate, hidden_widths, restore_uses, snapshot_uses, train_and_score,
};
use crate::{InputsCandidate, InputsSelectionResults};
use skein::{Device, Error, Float, Result, Rng};
use skein_data::DataSet;
use skein_nn::NeuralNetwork;
use skein_train::{SelectionMethod, TrainingStrategy};
use std::collections::HashMap;
use tracing::info;

/// Genetic search over binary input masks: fitness is the negated selection
/// loss of the retrained network, parents are chosen with the same
/// selection operators as the evolutionary optimizer, recombination is
/// uniform bitwise crossover and mutation flips bits. The best mask of
/// each generation survives unchanged.
#[derive(Debug, Clone)]
pub struct GeneticInputs {
    pub population_size: usize,
    pub max_generations: usize,
    pub selection: SelectionMethod,
    /// Per-bit flip probability.
    pub mutation_rate: Float,
    pub seed: u64,
    pub display: bool,
}

impl GeneticInputs {
    pub fn new() -> Self {
        Self {
            population_size: 10,
            max_generations: 10,
            selection: SelectionMethod::Tournament,
            mutation_rate: 0.1,
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
        if self.population_size < 2 {
            return Err(Error::InvalidConfiguration(
                "genetic population needs at least two individuals".into(),
            ));
        }
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
                "genetic inputs: optimum {:?} with selection loss {:.6e}",
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
        let genes = pool.len();
        let mut rng = Rng::new(self.seed);

        // Each mask is evaluated once; repeated masks reuse the cached
        // score instead of retraining.
        let mut cache: HashMap<Vec<bool>, usize> = HashMap::new();
        let mut candidates: Vec<InputsCandidate> = Vec::new();

        let mut population: Vec<Vec<bool>> = (0..self.population_size)
            .map(|i| {
                if i == 0 {
                    vec![true; genes]
                } else {
                    random_mask(genes, &mut rng)
                }
            })
            .collect();

        for generation in 0..self.max_generations.max(1) {
            let mut losses = Vec::with_capacity(population.len());
            for mask in &population {
                let index = match cache.get(mask) {
                    Some(&index) => index,
                    None => {
                        let subset: Vec<usize> = pool
                            .iter()
                            .zip(mask)
                            .filter(|(_, &bit)| bit)
                            .map(|(&c, _)| c)
                            .collect();
                        apply_input_mask(data, pool, &subset);
                        let mut candidate_network =
                            build_candidate(template, data, &hidden, self.seed)?;
                        let (training_loss, selection_loss, parameters) =
                            train_and_score(strategy, &mut candidate_network, data, device)?;
                        if self.display {
                            info!(
                                "genetic inputs: generation {generation}, {subset:?} -> \
                                 selection loss {selection_loss:.6e}"
                            );
                        }
                        candidates.push(InputsCandidate {
                            inputs: subset,
                            training_loss,
                            selection_loss,
                            parameters,
                        });
                        cache.insert(mask.clone(), candidates.len() - 1);
                        candidates.len() - 1
                    }
                };
                losses.push(candidates[index].selection_loss);
            }

            let best = (0..losses.len())
                .min_by(|&a, &b| losses[a].total_cmp(&losses[b]))
                .unwrap();

            // Elitism plus selected-parent crossover and bit-flip mutation.
            let parents = self.select_parents(&losses, &mut rng);
            let mut next = Vec::with_capacity(population.len());
            next.push(population[best].clone());
            while next.len() < population.len() {
                let a = &population[parents[rng.index(parents.len())]];
                let b = &population[parents[rng.index(parents.len())]];
                let mut child: Vec<bool> = a
                    .iter()
                    .zip(b)
                    .map(|(&x, &y)| if rng.bernoulli(0.5) { x } else { y })
                    .collect();
                for bit in child.iter_mut() {
                    if rng.bernoulli(self.mutation_rate as f64) {
                        *bit = !*bit;
                    }
                }
                if !child.contains(&true) {
                    child[rng.index(genes)] = true;
                }
                next.push(child);
            }
            population = next;
        }

        Ok(candidates)
    }

    fn select_parents(&self, losses: &[Float], rng: &mut Rng) -> Vec<usize> {
        let n = losses.len();
        match self.selection {
            SelectionMethod::Tournament => (0..n)
                .map(|_| {
                    let a = rng.index(n);
                    let b = rng.index(n);
                    if losses[a] <= losses[b] {
                        a
                    } else {
                        b
                    }
                })
                .collect(),
            SelectionMethod::RouletteWheel => {
                let worst = losses
                    .iter()
                    .copied()
                    .filter(|l| l.is_finite())
                    .fold(Float::NEG_INFINITY, Float::max);
                let fitness: Vec<Float> = losses
                    .iter()
                    .map(|&l| if l.is_finite() { worst - l + 1e-9 } else { 0.0 })
                    .collect();
                let total: Float = fitness.iter().sum();
                (0..n)
                    .map(|_| {
                        let mut spin = rng.next_f64() as Float * total;
                        for (i, f) in fitness.iter().enumerate() {
                            if spin < *f {
                                return i;
                            }
                            spin -= f;
                        }
                        n - 1
                    })
                    .collect()
            }
            SelectionMethod::Rank => {
                let mut order: Vec<usize> = (0..n).collect();
                order.sort_by(|&a, &b| losses[b].total_cmp(&losses[a]));
                let mut rank = vec![0usize; n];
                for (position, &individual) in order.iter().enumerate() {
                    rank[individual] = position + 1;
                }
                let total = (n * (n + 1) / 2) as Float;
                (0..n)
                    .map(|_| {
                        let mut spin = rng.next_f64() as Float * total;
                        for (i, &r) in rank.iter().enumerate() {
                            let f = r as Float;
                            if spin < f {
                                return i;
                            }
                            spin -= f;
                        }
                        n - 1
                    })
                    .collect()
            }
        }
    }
}

fn random_mask(genes: usize, rng: &mut Rng) -> Vec<bool> {
    let mut mask: Vec<bool> = (0..genes).map(|_| rng.bernoulli(0.5)).collect();
    if !mask.contains(&true) {
        mask[rng.index(genes)] = true;
    }
    mask
}

impl Default for GeneticInputs {
    fn default() -> Self {
        Self::new()
    }
}
