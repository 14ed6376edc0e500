//! Iterative parameter updaters. Every optimizer consumes a
//! [`TrainingContext`], honors the shared ordered stopping predicate, checks
//! cancellation at epoch boundaries, and returns a
//! [`TrainingResults`](crate::TrainingResults).

pub mod adam;
pub mod conjugate_gradient;
pub mod evolutionary;
pub mod gradient_descent;
pub mod levenberg_marquardt;
pub mod line_search;
pub mod quasi_newton;
pub mod sgd;

use crate::stopping::EpochControl;
use crate::{LossIndex, StoppingCondition, StoppingCriteria, TrainingResults};
use skein::{CancelToken, Device, Error, Float, Result};
use skein_data::{DataSet, Partition};
use skein_la::DVec;
use skein_nn::NeuralNetwork;
use skein_tensor::Tensor;
use tracing::info;

/// Everything one training run touches: the network being trained, the loss
/// index scoring it, the partition matrices, the device, and the optional
/// cancellation token. Optimizer state itself lives inside each `train`
/// call and dies with it.
pub struct TrainingContext<'a> {
    pub network: &'a mut NeuralNetwork,
    pub loss_index: &'a LossIndex,
    pub device: &'a Device,
    pub training_inputs: Tensor<Float>,
    pub training_targets: Tensor<Float>,
    pub selection_inputs: Tensor<Float>,
    pub selection_targets: Tensor<Float>,
    pub cancel: Option<CancelToken>,
    pub display: bool,
}

impl<'a> TrainingContext<'a> {
    /// Wire a context from a data set's training and selection partitions.
    pub fn new(
        network: &'a mut NeuralNetwork,
        loss_index: &'a LossIndex,
        data: &DataSet,
        device: &'a Device,
        cancel: Option<CancelToken>,
        display: bool,
    ) -> Result<Self> {
        if network.is_empty() {
            return Err(Error::UnboundReference("neural network layers"));
        }
        let training_inputs = data.input_matrix(Partition::Training)?;
        let training_targets = data.target_matrix(Partition::Training)?;
        let selection_inputs = data.input_matrix(Partition::Selection)?;
        let selection_targets = data.target_matrix(Partition::Selection)?;
        if training_inputs.dims()[1] != network.inputs_number() {
            return Err(Error::shape(
                "TrainingContext",
                network.inputs_number(),
                training_inputs.dims(),
            ));
        }
        if training_targets.dims()[1] != network.outputs_number() {
            return Err(Error::shape(
                "TrainingContext",
                network.outputs_number(),
                training_targets.dims(),
            ));
        }
        Ok(Self {
            network,
            loss_index,
            device,
            training_inputs,
            training_targets,
            selection_inputs,
            selection_targets,
            cancel,
            display,
        })
    }

    pub fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    pub fn parameters(&self) -> DVec<Float> {
        self.network.get_parameters()
    }

    pub fn set_parameters(&mut self, parameters: &DVec<Float>) -> Result<()> {
        self.network.set_parameters(parameters)
    }

    /// Loss and gradient over the full training partition at the current
    /// parameters.
    pub fn loss_and_gradient(&self) -> Result<(Float, DVec<Float>)> {
        self.loss_index.loss_and_gradient(
            self.network,
            &self.training_inputs,
            &self.training_targets,
            self.device,
        )
    }

    pub fn training_loss(&self) -> Result<Float> {
        self.loss_index.loss(
            self.network,
            &self.training_inputs,
            &self.training_targets,
            self.device,
        )
    }

    pub fn selection_loss(&self) -> Result<Float> {
        self.loss_index.loss(
            self.network,
            &self.selection_inputs,
            &self.selection_targets,
            self.device,
        )
    }

    /// Training loss at `base + step * direction`; the trial parameters
    /// stay installed, the caller accepts or restores.
    pub fn step_loss(
        &mut self,
        base: &DVec<Float>,
        direction: &DVec<Float>,
        step: Float,
    ) -> Result<Float> {
        let mut trial = base.clone();
        trial.axpy(step, direction);
        self.set_parameters(&trial)?;
        self.training_loss()
    }
}

/// Per-run history plus the stopping bookkeeping every optimizer shares.
pub(crate) struct RunRecorder {
    control: EpochControl,
    training_history: Vec<Float>,
    selection_history: Vec<Float>,
    gradient_norm_history: Vec<Float>,
    epochs: usize,
}

impl RunRecorder {
    pub fn new(criteria: StoppingCriteria) -> Self {
        Self {
            control: EpochControl::new(criteria),
            training_history: Vec::new(),
            selection_history: Vec::new(),
            gradient_norm_history: Vec::new(),
            epochs: 0,
        }
    }

    /// Record an epoch and evaluate the ordered stopping predicate.
    pub fn record(
        &mut self,
        ctx: &TrainingContext<'_>,
        optimizer: &'static str,
        epoch: usize,
        training_loss: Float,
        gradient_norm: Option<Float>,
    ) -> Result<Option<StoppingCondition>> {
        let selection_loss = ctx.selection_loss()?;
        self.training_history.push(training_loss);
        self.selection_history.push(selection_loss);
        if let Some(norm) = gradient_norm {
            self.gradient_norm_history.push(norm);
        }
        self.epochs = epoch + 1;
        self.control.observe_selection(selection_loss);
        if ctx.display {
            match gradient_norm {
                Some(norm) => info!(
                    "{optimizer}: epoch {epoch}, training loss {training_loss:.6e}, \
                     selection loss {selection_loss:.6e}, gradient norm {norm:.6e}"
                ),
                None => info!(
                    "{optimizer}: epoch {epoch}, training loss {training_loss:.6e}, \
                     selection loss {selection_loss:.6e}"
                ),
            }
        }
        Ok(self.control.check(epoch, training_loss, gradient_norm))
    }

    /// Seal the run into a results record.
    pub fn finish(
        self,
        ctx: &TrainingContext<'_>,
        optimizer: &'static str,
        condition: StoppingCondition,
    ) -> TrainingResults {
        if ctx.display {
            info!(
                "{optimizer}: training stopped because {} after {} epochs",
                condition.name(),
                self.epochs
            );
        }
        TrainingResults {
            final_parameters: ctx.parameters(),
            training_history: self.training_history,
            selection_history: self.selection_history,
            gradient_norm_history: self.gradient_norm_history,
            epochs: self.epochs,
            elapsed: self.control.elapsed(),
            stopping_condition: condition,
        }
    }
}

/// Shared reaction to a non-finite loss or gradient: retreat to the last
/// accepted parameters and report whether the run must die (second
/// consecutive failure).
pub(crate) fn numerical_failure_retreat(
    ctx: &mut TrainingContext<'_>,
    last_accepted: &DVec<Float>,
    consecutive_failures: &mut usize,
) -> Result<bool> {
    *consecutive_failures += 1;
    if *consecutive_failures >= 2 {
        return Ok(true);
    }
    ctx.set_parameters(last_accepted)?;
    Ok(false)
}
