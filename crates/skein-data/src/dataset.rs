use skein::{Error, Float, Result, Rng};
use skein_tensor::{column_descriptives, Descriptives, Shape, Tensor};

/// Role of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableUse {
    Input,
    Target,
    Unused,
}

/// Role of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleUse {
    Training,
    Selection,
    Testing,
    Unused,
}

/// One of the three disjoint sample partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Training,
    Selection,
    Testing,
}

impl Partition {
    fn sample_use(self) -> SampleUse {
        match self {
            Self::Training => SampleUse::Training,
            Self::Selection => SampleUse::Selection,
            Self::Testing => SampleUse::Testing,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Training => "training",
            Self::Selection => "selection",
            Self::Testing => "testing",
        }
    }
}

/// Tabular data: a samples-by-variables matrix plus per-variable and
/// per-sample use flags.
///
/// The matrix itself is immutable after construction; model selection
/// mutates only the use flags between training runs.
#[derive(Debug, Clone)]
pub struct DataSet {
    data: Tensor<Float>,
    variable_uses: Vec<VariableUse>,
    sample_uses: Vec<SampleUse>,
    variable_names: Vec<String>,
}

impl DataSet {
    /// Build from a samples-by-variables matrix whose first `inputs` columns
    /// are inputs and next `targets` columns are targets. All samples start
    /// in the training partition.
    pub fn from_matrix(data: Tensor<Float>, inputs: usize, targets: usize) -> Result<Self> {
        if data.ndim() != 2 {
            return Err(Error::shape("DataSet::from_matrix", "rank 2", data.dims()));
        }
        let variables = data.dims()[1];
        if inputs + targets != variables {
            return Err(Error::shape(
                "DataSet::from_matrix",
                inputs + targets,
                variables,
            ));
        }
        let samples = data.dims()[0];
        if samples == 0 {
            return Err(Error::EmptyPartition("data set"));
        }

        let mut variable_uses = vec![VariableUse::Input; inputs];
        variable_uses.extend(vec![VariableUse::Target; targets]);
        let variable_names = (0..variables).map(|i| format!("variable_{i}")).collect();

        Ok(Self {
            data,
            variable_uses,
            sample_uses: vec![SampleUse::Training; samples],
            variable_names,
        })
    }

    pub fn samples_number(&self) -> usize {
        self.data.dims()[0]
    }

    pub fn variables_number(&self) -> usize {
        self.data.dims()[1]
    }

    pub fn data(&self) -> &Tensor<Float> {
        &self.data
    }

    // --- Variable uses and names ---

    pub fn variable_use(&self, index: usize) -> VariableUse {
        self.variable_uses[index]
    }

    pub fn set_variable_use(&mut self, index: usize, use_: VariableUse) {
        self.variable_uses[index] = use_;
    }

    pub fn set_variable_names(&mut self, names: Vec<String>) -> Result<()> {
        if names.len() != self.variables_number() {
            return Err(Error::shape(
                "set_variable_names",
                self.variables_number(),
                names.len(),
            ));
        }
        self.variable_names = names;
        Ok(())
    }

    pub fn variable_name(&self, index: usize) -> &str {
        &self.variable_names[index]
    }

    /// Column indices currently flagged as inputs, in column order.
    pub fn input_indices(&self) -> Vec<usize> {
        self.indices_with_use(VariableUse::Input)
    }

    pub fn target_indices(&self) -> Vec<usize> {
        self.indices_with_use(VariableUse::Target)
    }

    fn indices_with_use(&self, use_: VariableUse) -> Vec<usize> {
        self.variable_uses
            .iter()
            .enumerate()
            .filter(|(_, u)| **u == use_)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn inputs_number(&self) -> usize {
        self.input_indices().len()
    }

    pub fn targets_number(&self) -> usize {
        self.target_indices().len()
    }

    pub fn input_variable_names(&self) -> Vec<String> {
        self.input_indices()
            .iter()
            .map(|&i| self.variable_names[i].clone())
            .collect()
    }

    pub fn target_variable_names(&self) -> Vec<String> {
        self.target_indices()
            .iter()
            .map(|&i| self.variable_names[i].clone())
            .collect()
    }

    /// Flag columns whose value never changes as unused. Returns the
    /// indices that were turned off.
    pub fn unuse_constant_variables(&mut self) -> Vec<usize> {
        let samples = self.samples_number();
        let mut turned_off = Vec::new();
        for j in 0..self.variables_number() {
            if self.variable_uses[j] == VariableUse::Unused {
                continue;
            }
            let first = self.data.get(&[0, j]);
            if (1..samples).all(|i| self.data.get(&[i, j]) == first) {
                self.variable_uses[j] = VariableUse::Unused;
                turned_off.push(j);
            }
        }
        turned_off
    }

    // --- Sample uses and splitting ---

    pub fn sample_use(&self, index: usize) -> SampleUse {
        self.sample_uses[index]
    }

    pub fn set_sample_use(&mut self, index: usize, use_: SampleUse) {
        self.sample_uses[index] = use_;
    }

    /// Randomly assign samples to training/selection/testing with the given
    /// ratios (must sum to 1).
    pub fn split_samples_random(
        &mut self,
        training: f64,
        selection: f64,
        testing: f64,
        seed: u64,
    ) -> Result<()> {
        let total = training + selection + testing;
        if (total - 1.0).abs() > 1e-9 || training < 0.0 || selection < 0.0 || testing < 0.0 {
            return Err(Error::InvalidConfiguration(format!(
                "split ratios must be non-negative and sum to 1, got {training}/{selection}/{testing}"
            )));
        }
        let n = self.samples_number();
        let mut order: Vec<usize> = (0..n).collect();
        Rng::new(seed).shuffle(&mut order);

        let n_training = (n as f64 * training).round() as usize;
        let n_selection = (n as f64 * selection).round() as usize;
        let n_training = n_training.min(n);
        let n_selection = n_selection.min(n - n_training);

        for (pos, &sample) in order.iter().enumerate() {
            self.sample_uses[sample] = if pos < n_training {
                SampleUse::Training
            } else if pos < n_training + n_selection {
                SampleUse::Selection
            } else {
                SampleUse::Testing
            };
        }
        Ok(())
    }

    /// Row indices of a partition, in row order.
    pub fn sample_indices(&self, partition: Partition) -> Vec<usize> {
        let use_ = partition.sample_use();
        self.sample_uses
            .iter()
            .enumerate()
            .filter(|(_, u)| **u == use_)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn samples_in(&self, partition: Partition) -> usize {
        self.sample_indices(partition).len()
    }

    // --- Partition matrices ---

    /// Input columns of a partition as a [samples, inputs] tensor.
    pub fn input_matrix(&self, partition: Partition) -> Result<Tensor<Float>> {
        self.submatrix(partition, &self.input_indices())
    }

    /// Target columns of a partition as a [samples, targets] tensor.
    pub fn target_matrix(&self, partition: Partition) -> Result<Tensor<Float>> {
        self.submatrix(partition, &self.target_indices())
    }

    fn submatrix(&self, partition: Partition, columns: &[usize]) -> Result<Tensor<Float>> {
        let rows = self.sample_indices(partition);
        if rows.is_empty() {
            return Err(Error::EmptyPartition(partition.name()));
        }
        let mut data = Vec::with_capacity(rows.len() * columns.len());
        for &i in &rows {
            for &j in columns {
                data.push(self.data.get(&[i, j]));
            }
        }
        Ok(Tensor::new(data, Shape::matrix(rows.len(), columns.len())))
    }

    /// Descriptives of the input columns over the training partition.
    pub fn input_descriptives(&self) -> Result<Vec<Descriptives<Float>>> {
        column_descriptives(&self.input_matrix(Partition::Training)?)
    }

    /// Descriptives of the target columns over the training partition.
    pub fn target_descriptives(&self) -> Result<Vec<Descriptives<Float>>> {
        column_descriptives(&self.target_matrix(Partition::Training)?)
    }

    /// (positives, negatives) of a single binary target over the training
    /// partition. Values above 0.5 count as positive.
    pub fn target_class_counts(&self) -> Result<(usize, usize)> {
        let targets = self.target_matrix(Partition::Training)?;
        if targets.dims()[1] != 1 {
            return Err(Error::InvalidConfiguration(format!(
                "class counts need a single binary target, found {}",
                targets.dims()[1]
            )));
        }
        let positives = targets.data().iter().filter(|&&v| v > 0.5).count();
        Ok((positives, targets.dims()[0] - positives))
    }

    // --- Time series ---

    /// Rebuild the matrix as a lag-window supervised problem: every variable
    /// lagged `lags` steps becomes an input and every variable
    /// `steps_ahead` past the window becomes a target. Sample uses reset to
    /// training.
    pub fn transform_time_series(&mut self, lags: usize, steps_ahead: usize) -> Result<()> {
        if lags == 0 || steps_ahead == 0 {
            return Err(Error::InvalidConfiguration(
                "lags and steps_ahead must be positive".into(),
            ));
        }
        let samples = self.samples_number();
        let variables = self.variables_number();
        let window = lags + steps_ahead;
        if samples <= window {
            return Err(Error::EmptyPartition("time series"));
        }

        let new_samples = samples - window + 1;
        let new_inputs = variables * lags;
        let mut data = Vec::with_capacity(new_samples * (new_inputs + variables));
        for t in 0..new_samples {
            for lag in 0..lags {
                for j in 0..variables {
                    data.push(self.data.get(&[t + lag, j]));
                }
            }
            for j in 0..variables {
                data.push(self.data.get(&[t + window - 1, j]));
            }
        }

        let mut names = Vec::with_capacity(new_inputs + variables);
        for lag in 0..lags {
            for j in 0..variables {
                names.push(format!("{}_lag_{}", self.variable_names[j], lags - lag));
            }
        }
        for j in 0..variables {
            names.push(format!("{}_ahead_{}", self.variable_names[j], steps_ahead));
        }

        self.data = Tensor::new(data, Shape::matrix(new_samples, new_inputs + variables));
        self.variable_uses = vec![VariableUse::Input; new_inputs];
        self.variable_uses
            .extend(vec![VariableUse::Target; variables]);
        self.variable_names = names;
        self.sample_uses = vec![SampleUse::Training; new_samples];
        Ok(())
    }
}
