use crate::optim::{RunRecorder, TrainingContext};
use crate::{StoppingCondition, StoppingCriteria, TrainingResults};
use skein::{Error, Float, Result, Rng};
use skein_la::DVec;

const NAME: &str = "evolutionary algorithm";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMethod {
    RouletteWheel,
    Rank,
    Tournament,
}

impl SelectionMethod {
    pub fn name(self) -> &'static str {
        match self {
            Self::RouletteWheel => "RouletteWheel",
            Self::Rank => "Rank",
            Self::Tournament => "Tournament",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "RouletteWheel" => Self::RouletteWheel,
            "Rank" => Self::Rank,
            "Tournament" => Self::Tournament,
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "unknown selection method {other:?}"
                )))
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecombinationMethod {
    /// Per-gene blend between the parents.
    Intermediate,
    /// One blend factor for the whole vector.
    Line,
}

impl RecombinationMethod {
    pub fn name(self) -> &'static str {
        match self {
            Self::Intermediate => "Intermediate",
            Self::Line => "Line",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "Intermediate" => Self::Intermediate,
            "Line" => Self::Line,
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "unknown recombination method {other:?}"
                )))
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationMethod {
    Normal,
    Uniform,
}

impl MutationMethod {
    pub fn name(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Uniform => "Uniform",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "Normal" => Self::Normal,
            "Uniform" => Self::Uniform,
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "unknown mutation method {other:?}"
                )))
            }
        })
    }
}

/// Population search over flat parameter vectors: fitness is the negated
/// training loss, parents are chosen by roulette, rank or tournament
/// selection, children by intermediate or line recombination plus normal or
/// uniform mutation, and the best individual survives unchanged each
/// generation.
#[derive(Debug, Clone)]
pub struct EvolutionaryAlgorithm {
    pub population_size: usize,
    pub selection: SelectionMethod,
    pub recombination: RecombinationMethod,
    pub mutation: MutationMethod,
    /// Per-gene mutation probability.
    pub mutation_rate: Float,
    /// Scale of a mutation perturbation.
    pub mutation_range: Float,
    pub seed: u64,
    pub criteria: StoppingCriteria,
}

impl EvolutionaryAlgorithm {
    pub fn new() -> Self {
        Self {
            population_size: 32,
            selection: SelectionMethod::Rank,
            recombination: RecombinationMethod::Intermediate,
            mutation: MutationMethod::Normal,
            mutation_rate: 0.1,
            mutation_range: 0.1,
            seed: 0,
            criteria: StoppingCriteria::default(),
        }
    }

    pub fn train(&self, ctx: &mut TrainingContext<'_>) -> Result<TrainingResults> {
        if self.population_size < 2 {
            return Err(Error::InvalidConfiguration(
                "evolutionary population needs at least two individuals".into(),
            ));
        }
        let mut recorder = RunRecorder::new(self.criteria);
        let mut rng = Rng::new(self.seed);
        let genes = ctx.parameters().len();

        // Seed the population around the current parameters; individual 0
        // is the network as handed in.
        let base = ctx.parameters();
        let mut population: Vec<DVec<Float>> = (0..self.population_size)
            .map(|i| {
                if i == 0 {
                    base.clone()
                } else {
                    DVec::from_fn(genes, |k| base[k] + 0.5 * rng.normal() as Float)
                }
            })
            .collect();

        let mut epoch = 0usize;
        let condition = loop {
            if ctx.cancelled() {
                break StoppingCondition::Cancelled;
            }

            // Fitness pass: negated training loss per individual.
            let mut losses = Vec::with_capacity(population.len());
            for individual in &population {
                ctx.set_parameters(individual)?;
                let loss = ctx.training_loss()?;
                losses.push(if loss.is_finite() { loss } else { Float::INFINITY });
            }
            let best = (0..losses.len())
                .min_by(|&a, &b| losses[a].total_cmp(&losses[b]))
                .unwrap();
            if !losses[best].is_finite() {
                ctx.set_parameters(&base)?;
                break StoppingCondition::NumericalFailure;
            }
            ctx.set_parameters(&population[best])?;

            if let Some(condition) = recorder.record(ctx, NAME, epoch, losses[best], None)? {
                break condition;
            }

            // Parents, children, mutation; the best individual is carried
            // over unchanged (elitism).
            let parents = self.select_parents(&losses, &mut rng);
            let mut next: Vec<DVec<Float>> = Vec::with_capacity(population.len());
            next.push(population[best].clone());
            while next.len() < population.len() {
                let a = &population[parents[rng.index(parents.len())]];
                let b = &population[parents[rng.index(parents.len())]];
                let mut child = self.recombine(a, b, &mut rng);
                self.mutate(&mut child, &mut rng);
                next.push(child);
            }
            population = next;
            epoch += 1;
        };

        Ok(recorder.finish(ctx, NAME, condition))
    }

    /// Mating pool of individual indices, one slot per population member.
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
                    .map(|&l| {
                        if l.is_finite() {
                            worst - l + 1e-9
                        } else {
                            0.0
                        }
                    })
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
                // Rank 1 for the worst individual up to n for the best.
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

    fn recombine(&self, a: &DVec<Float>, b: &DVec<Float>, rng: &mut Rng) -> DVec<Float> {
        match self.recombination {
            RecombinationMethod::Intermediate => DVec::from_fn(a.len(), |k| {
                let u = rng.next_f64() as Float;
                a[k] + u * (b[k] - a[k])
            }),
            RecombinationMethod::Line => {
                let u = rng.next_f64() as Float;
                DVec::from_fn(a.len(), |k| a[k] + u * (b[k] - a[k]))
            }
        }
    }

    fn mutate(&self, individual: &mut DVec<Float>, rng: &mut Rng) {
        for k in 0..individual.len() {
            if rng.bernoulli(self.mutation_rate as f64) {
                let perturbation = match self.mutation {
                    MutationMethod::Normal => self.mutation_range * rng.normal() as Float,
                    MutationMethod::Uniform => {
                        rng.uniform(-self.mutation_range as f64, self.mutation_range as f64)
                            as Float
                    }
                };
                individual[k] += perturbation;
            }
        }
    }
}

impl Default for EvolutionaryAlgorithm {
    fn default() -> Self {
        Self::new()
    }
}
