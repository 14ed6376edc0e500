//! Post-training scoring on the testing partition: the confusion matrix
//! and classification accuracy the end-to-end scenarios check.

use skein::{Device, Error, Float, Result};
use skein_data::{DataSet, Partition};
use skein_nn::NeuralNetwork;

/// Confusion matrix over the testing partition, actual classes in rows and
/// predicted classes in columns. A single target column is a binary
/// problem thresholded at the network's decision threshold (0.5 without a
/// probabilistic layer); several target columns are one-hot classes
/// decided by argmax.
pub fn confusion_matrix(
    network: &NeuralNetwork,
    data: &DataSet,
    device: &Device,
) -> Result<Vec<Vec<usize>>> {
    let inputs = data.input_matrix(Partition::Testing)?;
    let targets = data.target_matrix(Partition::Testing)?;
    let outputs = network.calculate_outputs(&inputs, device)?;
    if outputs.shape() != targets.shape() {
        return Err(Error::shape("confusion_matrix", targets.dims(), outputs.dims()));
    }

    let samples = targets.dims()[0];
    let columns = targets.dims()[1];

    if columns == 1 {
        let threshold: Float = network
            .probabilistic_layer()
            .map_or(0.5, |p| p.decision_threshold());
        let mut matrix = vec![vec![0usize; 2]; 2];
        for i in 0..samples {
            let actual = usize::from(targets.get(&[i, 0]) > 0.5);
            let predicted = usize::from(outputs.get(&[i, 0]) >= threshold);
            matrix[actual][predicted] += 1;
        }
        Ok(matrix)
    } else {
        let mut matrix = vec![vec![0usize; columns]; columns];
        let actual = targets.argmax_rows()?;
        let predicted = outputs.argmax_rows()?;
        for i in 0..samples {
            matrix[actual[i]][predicted[i]] += 1;
        }
        Ok(matrix)
    }
}

/// Fraction of testing samples on the confusion matrix diagonal.
pub fn classification_accuracy(
    network: &NeuralNetwork,
    data: &DataSet,
    device: &Device,
) -> Result<Float> {
    let matrix = confusion_matrix(network, data, device)?;
    let total: usize = matrix.iter().map(|row| row.iter().sum::<usize>()).sum();
    if total == 0 {
        return Err(Error::EmptyPartition("testing"));
    }
    let correct: usize = (0..matrix.len()).map(|i| matrix[i][i]).sum();
    Ok(correct as Float / total as Float)
}
