use crate::{
    GeneticInputs, GrowingInputs, IncrementalNeurons, InputsSelectionResults,
    NeuronsSelectionResults, PruningInputs,
};
use skein::{Device, Result};
use skein_data::DataSet;
use skein_nn::NeuralNetwork;
use skein_train::TrainingStrategy;

/// Runtime choice among the inputs-selection drivers.
#[derive(Debug, Clone)]
pub enum InputsSelectionMethod {
    GrowingInputs(GrowingInputs),
    PruningInputs(PruningInputs),
    GeneticAlgorithm(GeneticInputs),
}

impl InputsSelectionMethod {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::GrowingInputs(_) => "GrowingInputs",
            Self::PruningInputs(_) => "PruningInputs",
            Self::GeneticAlgorithm(_) => "GeneticAlgorithm",
        }
    }

    pub fn perform(
        &self,
        network: &mut NeuralNetwork,
        strategy: &mut TrainingStrategy,
        data: &mut DataSet,
        device: &Device,
    ) -> Result<InputsSelectionResults> {
        match self {
            Self::GrowingInputs(driver) => driver.perform(network, strategy, data, device),
            Self::PruningInputs(driver) => driver.perform(network, strategy, data, device),
            Self::GeneticAlgorithm(driver) => driver.perform(network, strategy, data, device),
        }
    }
}

/// Facade over the two selection loops, mirroring how a whole
/// model-selection pass runs: first settle the input subset, then the
/// hidden width.
#[derive(Debug, Clone)]
pub struct ModelSelection {
    pub neurons_selection: IncrementalNeurons,
    pub inputs_selection: InputsSelectionMethod,
}

impl ModelSelection {
    pub fn new() -> Self {
        Self {
            neurons_selection: IncrementalNeurons::new(),
            inputs_selection: InputsSelectionMethod::GrowingInputs(GrowingInputs::new()),
        }
    }

    pub fn perform_neurons_selection(
        &self,
        network: &mut NeuralNetwork,
        strategy: &mut TrainingStrategy,
        data: &DataSet,
        device: &Device,
    ) -> Result<NeuronsSelectionResults> {
        self.neurons_selection.perform(network, strategy, data, device)
    }

    pub fn perform_inputs_selection(
        &self,
        network: &mut NeuralNetwork,
        strategy: &mut TrainingStrategy,
        data: &mut DataSet,
        device: &Device,
    ) -> Result<InputsSelectionResults> {
        self.inputs_selection.perform(network, strategy, data, device)
    }

    /// Inputs first, then hidden width on the surviving subset.
    pub fn perform_model_selection(
        &self,
        network: &mut NeuralNetwork,
        strategy: &mut TrainingStrategy,
        data: &mut DataSet,
        device: &Device,
    ) -> Result<(InputsSelectionResults, NeuronsSelectionResults)> {
        let inputs = self.perform_inputs_selection(network, strategy, data, device)?;
        let neurons = self.perform_neurons_selection(network, strategy, data, device)?;
        Ok((inputs, neurons))
    }
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self::new()
    }
}
