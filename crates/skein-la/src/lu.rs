use crate::{DMat, DVec};
use skein::Scalar;

/// LU decomposition with partial pivoting: PA = LU.
///
/// Factors are stored packed in one row-major matrix, L below the unit
/// diagonal, U on and above it.
pub struct Lu<S> {
    lu: DMat<S>,
    piv: Vec<usize>,
}

impl<S: Scalar> Lu<S> {
    /// Factor a square matrix. Returns `None` when the matrix is singular to
    /// working precision.
    pub fn new(a: &DMat<S>) -> Option<Self> {
        assert!(a.is_square(), "Lu: matrix must be square");
        let n = a.nrows();
        let mut lu = a.clone();
        let mut piv: Vec<usize> = (0..n).collect();

        for k in 0..n {
            // Largest |a[i][k]| for i >= k picks the pivot row.
            let mut max_val = S::ZERO;
            let mut max_row = k;
            for i in k..n {
                let v = lu.get(i, k).abs();
                if v > max_val {
                    max_val = v;
                    max_row = i;
                }
            }

            if max_val < S::EPSILON {
                return None;
            }

            if max_row != k {
                lu.swap_rows(k, max_row);
                piv.swap(k, max_row);
            }

            let pivot_inv = lu.get(k, k).recip();
            for i in (k + 1)..n {
                let factor = lu.get(i, k) * pivot_inv;
                lu.set(i, k, factor);
                for j in (k + 1)..n {
                    let update = lu.get(i, j) - factor * lu.get(k, j);
                    lu.set(i, j, update);
                }
            }
        }

        Some(Self { lu, piv })
    }

    /// Solve Ax = b.
    pub fn solve(&self, b: &DVec<S>) -> DVec<S> {
        let n = self.lu.nrows();
        assert_eq!(b.len(), n, "Lu solve: rhs length mismatch");

        // Permute, then forward substitution (L y = Pb).
        let mut x = DVec::from_fn(n, |i| b[self.piv[i]]);
        for i in 1..n {
            let mut sum = x[i];
            for j in 0..i {
                sum = sum - self.lu.get(i, j) * x[j];
            }
            x[i] = sum;
        }

        // Back substitution (U x = y).
        for i in (0..n).rev() {
            let mut sum = x[i];
            for j in (i + 1)..n {
                sum = sum - self.lu.get(i, j) * x[j];
            }
            x[i] = sum * self.lu.get(i, i).recip();
        }

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solve_simple() {
        // [2 1] [x]   [5]    x=2, y=1
        // [1 3] [y] = [5]
        let a = DMat::from_raw(2, 2, vec![2.0, 1.0, 1.0, 3.0]);
        let b = DVec::from_slice(&[5.0, 5.0]);
        let lu = Lu::new(&a).unwrap();
        let x = lu.solve(&b);
        assert!((x[0] - 2.0).abs() < 1e-12);
        assert!((x[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn solve_with_pivoting() {
        // Leading zero forces a row swap.
        let a = DMat::from_raw(3, 3, vec![0.0, 2.0, 1.0, 1.0, 1.0, 1.0, 2.0, 0.0, 3.0]);
        let truth = DVec::from_slice(&[1.0, -2.0, 3.0]);
        let b = a.mul_vec(&truth);
        let lu = Lu::new(&a).unwrap();
        let x = lu.solve(&b);
        for i in 0..3 {
            assert!(
                (x[i] - truth[i]).abs() < 1e-10,
                "component {i}: {} vs {}",
                x[i],
                truth[i]
            );
        }
    }

    #[test]
    fn singular_returns_none() {
        let a = DMat::from_raw(2, 2, vec![1.0, 2.0, 2.0, 4.0]);
        assert!(Lu::new(&a).is_none());
    }
}
