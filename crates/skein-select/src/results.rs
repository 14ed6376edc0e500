use skein::Float;
use skein_la::DVec;

/// One attempted hidden width.
#[derive(Debug, Clone)]
pub struct NeuronsCandidate {
    pub neurons: usize,
    pub training_loss: Float,
    pub selection_loss: Float,
    pub parameters: DVec<Float>,
}

/// Every width tried plus the index of the optimum.
#[derive(Debug, Clone)]
pub struct NeuronsSelectionResults {
    pub candidates: Vec<NeuronsCandidate>,
    pub optimum: usize,
}

impl NeuronsSelectionResults {
    pub fn best(&self) -> &NeuronsCandidate {
        &self.candidates[self.optimum]
    }
}

/// One attempted input subset, as absolute data-set column indices.
#[derive(Debug, Clone)]
pub struct InputsCandidate {
    pub inputs: Vec<usize>,
    pub training_loss: Float,
    pub selection_loss: Float,
    pub parameters: DVec<Float>,
}

/// Every subset tried plus the index of the optimum.
#[derive(Debug, Clone)]
pub struct InputsSelectionResults {
    pub candidates: Vec<InputsCandidate>,
    pub optimum: usize,
}

impl InputsSelectionResults {
    pub fn best(&self) -> &InputsCandidate {
        &self.candidates[self.optimum]
    }
}
