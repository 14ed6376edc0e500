//! Tree persistence for the selection drivers: `NeuronsSelection`,
//! `InputsSelection` and the `ModelSelection` aggregate.

use crate::{
    GeneticInputs, GrowingInputs, IncrementalNeurons, InputsSelectionMethod, ModelSelection,
    PruningInputs,
};
use skein::{Error, Float, Result, TreeNode};
use skein_train::SelectionMethod;

impl IncrementalNeurons {
    pub fn to_tree(&self) -> TreeNode {
        let mut root = TreeNode::new("NeuronsSelection");
        root.push(TreeNode::leaf("MinimumNeurons", self.minimum_neurons));
        root.push(TreeNode::leaf("MaximumNeurons", self.maximum_neurons));
        root.push(TreeNode::leaf("Step", self.step));
        root.push(TreeNode::leaf("Trials", self.trials));
        root.push(TreeNode::leaf(
            "MaximumSelectionFailures",
            self.max_selection_failures,
        ));
        root.push(TreeNode::leaf("Seed", self.seed));
        root.push(TreeNode::leaf("Display", self.display));
        root
    }

    pub fn from_tree(root: &TreeNode) -> Result<Self> {
        if root.name() != "NeuronsSelection" {
            return Err(Error::InvalidConfiguration(format!(
                "expected NeuronsSelection element, found {}",
                root.name()
            )));
        }
        Ok(Self {
            minimum_neurons: root.parse_child("MinimumNeurons")?,
            maximum_neurons: root.parse_child("MaximumNeurons")?,
            step: root.parse_child("Step")?,
            trials: root.parse_child("Trials")?,
            max_selection_failures: root.parse_child("MaximumSelectionFailures")?,
            seed: root.parse_child("Seed")?,
            display: root.parse_child("Display")?,
        })
    }
}

impl InputsSelectionMethod {
    pub fn to_tree(&self) -> TreeNode {
        let mut root = TreeNode::new("InputsSelection");
        root.push(TreeNode::leaf("Method", self.kind_name()));
        match self {
            Self::GrowingInputs(driver) => {
                root.push(TreeNode::leaf("MaximumInputs", driver.maximum_inputs));
                root.push(TreeNode::leaf(
                    "MaximumSelectionFailures",
                    driver.max_selection_failures,
                ));
                root.push(TreeNode::leaf("Seed", driver.seed));
                root.push(TreeNode::leaf("Display", driver.display));
            }
            Self::PruningInputs(driver) => {
                root.push(TreeNode::leaf("MinimumInputs", driver.minimum_inputs));
                root.push(TreeNode::leaf(
                    "MaximumSelectionFailures",
                    driver.max_selection_failures,
                ));
                root.push(TreeNode::leaf("Seed", driver.seed));
                root.push(TreeNode::leaf("Display", driver.display));
            }
            Self::GeneticAlgorithm(driver) => {
                root.push(TreeNode::leaf("PopulationSize", driver.population_size));
                root.push(TreeNode::leaf("MaximumGenerations", driver.max_generations));
                root.push(TreeNode::leaf("Selection", driver.selection.name()));
                root.push(TreeNode::float_leaf(
                    "MutationRate",
                    driver.mutation_rate as f64,
                ));
                root.push(TreeNode::leaf("Seed", driver.seed));
                root.push(TreeNode::leaf("Display", driver.display));
            }
        }
        root
    }

    pub fn from_tree(root: &TreeNode) -> Result<Self> {
        if root.name() != "InputsSelection" {
            return Err(Error::InvalidConfiguration(format!(
                "expected InputsSelection element, found {}",
                root.name()
            )));
        }
        Ok(match root.require("Method")?.value().unwrap_or("") {
            "GrowingInputs" => Self::GrowingInputs(GrowingInputs {
                maximum_inputs: root.parse_child("MaximumInputs")?,
                max_selection_failures: root.parse_child("MaximumSelectionFailures")?,
                seed: root.parse_child("Seed")?,
                display: root.parse_child("Display")?,
            }),
            "PruningInputs" => Self::PruningInputs(PruningInputs {
                minimum_inputs: root.parse_child("MinimumInputs")?,
                max_selection_failures: root.parse_child("MaximumSelectionFailures")?,
                seed: root.parse_child("Seed")?,
                display: root.parse_child("Display")?,
            }),
            "GeneticAlgorithm" => Self::GeneticAlgorithm(GeneticInputs {
                population_size: root.parse_child("PopulationSize")?,
                max_generations: root.parse_child("MaximumGenerations")?,
                selection: SelectionMethod::from_name(
                    root.require("Selection")?.value().unwrap_or(""),
                )?,
                mutation_rate: root.parse_child::<f64>("MutationRate")? as Float,
                seed: root.parse_child("Seed")?,
                display: root.parse_child("Display")?,
            }),
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "unknown inputs selection method {other:?}"
                )))
            }
        })
    }
}

impl ModelSelection {
    pub fn to_tree(&self) -> TreeNode {
        let mut root = TreeNode::new("ModelSelection");
        root.push(self.neurons_selection.to_tree());
        root.push(self.inputs_selection.to_tree());
        root
    }

    pub fn from_tree(root: &TreeNode) -> Result<Self> {
        if root.name() != "ModelSelection" {
            return Err(Error::InvalidConfiguration(format!(
                "expected ModelSelection element, found {}",
                root.name()
            )));
        }
        Ok(Self {
            neurons_selection: IncrementalNeurons::from_tree(root.require("NeuronsSelection")?)?,
            inputs_selection: InputsSelectionMethod::from_tree(root.require("InputsSelection")?)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neurons_selection_roundtrip() {
        let mut driver = IncrementalNeurons::new();
        driver.minimum_neurons = 2;
        driver.maximum_neurons = 14;
        driver.step = 3;
        let text = driver.to_tree().write();
        let parsed = IncrementalNeurons::from_tree(&TreeNode::parse(&text).unwrap()).unwrap();
        assert_eq!(parsed.minimum_neurons, 2);
        assert_eq!(parsed.maximum_neurons, 14);
        assert_eq!(parsed.step, 3);
    }

    #[test]
    fn inputs_selection_roundtrip() {
        let method = InputsSelectionMethod::GeneticAlgorithm(GeneticInputs {
            population_size: 16,
            max_generations: 5,
            selection: SelectionMethod::Rank,
            mutation_rate: 0.2,
            seed: 3,
            display: false,
        });
        let text = method.to_tree().write();
        let parsed = InputsSelectionMethod::from_tree(&TreeNode::parse(&text).unwrap()).unwrap();
        match parsed {
            InputsSelectionMethod::GeneticAlgorithm(driver) => {
                assert_eq!(driver.population_size, 16);
                assert_eq!(driver.selection, SelectionMethod::Rank);
                assert_eq!(driver.mutation_rate, 0.2);
            }
            other => panic!("wrong method parsed: {}", other.kind_name()),
        }
    }

    #[test]
    fn model_selection_roundtrip() {
        let selection = ModelSelection::new();
        let text = selection.to_tree().write();
        let parsed = ModelSelection::from_tree(&TreeNode::parse(&text).unwrap()).unwrap();
        assert_eq!(
            parsed.inputs_selection.kind_name(),
            selection.inputs_selection.kind_name()
        );
    }
}
