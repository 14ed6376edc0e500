use crate::Tensor;
use skein::{Error, Result, Scalar};

/// Per-feature summary statistics used by the scaling layers and the data
/// set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Descriptives<S: Scalar> {
    pub minimum: S,
    pub maximum: S,
    pub mean: S,
    pub standard_deviation: S,
}

impl<S: Scalar> Default for Descriptives<S> {
    /// Neutral descriptives: scaling through these is the identity.
    fn default() -> Self {
        Self {
            minimum: -S::ONE,
            maximum: S::ONE,
            mean: S::ZERO,
            standard_deviation: S::ONE,
        }
    }
}

/// Column statistics of a 2-D tensor (samples in rows, features in columns).
/// Standard deviation uses the n-1 denominator; a single-row column gets 0.
pub fn column_descriptives<S: Scalar>(matrix: &Tensor<S>) -> Result<Vec<Descriptives<S>>> {
    if matrix.ndim() != 2 {
        return Err(Error::shape("column_descriptives", "rank 2", matrix.dims()));
    }
    let (rows, cols) = (matrix.dims()[0], matrix.dims()[1]);
    if rows == 0 {
        return Err(Error::EmptyPartition("column_descriptives"));
    }

    let mut out = Vec::with_capacity(cols);
    for j in 0..cols {
        let mut minimum = S::INFINITY;
        let mut maximum = S::NEG_INFINITY;
        let mut sum = S::ZERO;
        for i in 0..rows {
            let v = matrix.get(&[i, j]);
            minimum = minimum.min(v);
            maximum = maximum.max(v);
            sum += v;
        }
        let mean = sum / S::from_usize(rows);

        let standard_deviation = if rows < 2 {
            S::ZERO
        } else {
            let mut ss = S::ZERO;
            for i in 0..rows {
                let d = matrix.get(&[i, j]) - mean;
                ss += d * d;
            }
            (ss / S::from_usize(rows - 1)).sqrt()
        };

        out.push(Descriptives {
            minimum,
            maximum,
            mean,
            standard_deviation,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Shape;

    #[test]
    fn known_column_stats() {
        let m = Tensor::new(vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0], Shape::matrix(3, 2));
        let stats = column_descriptives(&m).unwrap();
        assert_eq!(stats[0].minimum, 1.0);
        assert_eq!(stats[0].maximum, 3.0);
        assert_eq!(stats[0].mean, 2.0);
        assert!((stats[0].standard_deviation - 1.0).abs() < 1e-12);
        assert_eq!(stats[1].mean, 20.0);
        assert!((stats[1].standard_deviation - 10.0).abs() < 1e-12);
    }

    #[test]
    fn single_row_has_zero_deviation() {
        let m = Tensor::new(vec![5.0, 7.0], Shape::matrix(1, 2));
        let stats = column_descriptives(&m).unwrap();
        assert_eq!(stats[0].standard_deviation, 0.0);
        assert_eq!(stats[1].mean, 7.0);
    }
}
