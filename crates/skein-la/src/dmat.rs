use crate::DVec;
use skein::Scalar;

/// Heap-allocated row-major matrix.
///
/// Element (row, col) is stored at `data[row * ncols + col]`.
#[derive(Clone, Debug, PartialEq)]
pub struct DMat<S> {
    data: Vec<S>,
    nrows: usize,
    ncols: usize,
}

impl<S: Scalar> DMat<S> {
    /// Create from raw row-major data.
    pub fn from_raw(nrows: usize, ncols: usize, data: Vec<S>) -> Self {
        assert_eq!(data.len(), nrows * ncols, "DMat: data length mismatch");
        Self { data, nrows, ncols }
    }

    pub fn from_fn(nrows: usize, ncols: usize, f: impl Fn(usize, usize) -> S) -> Self {
        let mut data = Vec::with_capacity(nrows * ncols);
        for i in 0..nrows {
            for j in 0..ncols {
                data.push(f(i, j));
            }
        }
        Self { data, nrows, ncols }
    }

    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            data: vec![S::ZERO; nrows * ncols],
            nrows,
            ncols,
        }
    }

    pub fn identity(n: usize) -> Self {
        Self::from_fn(n, n, |i, j| if i == j { S::ONE } else { S::ZERO })
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn is_square(&self) -> bool {
        self.nrows == self.ncols
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> S {
        self.data[row * self.ncols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: S) {
        self.data[row * self.ncols + col] = val;
    }

    /// Row slice.
    #[inline]
    pub fn row(&self, i: usize) -> &[S] {
        let start = i * self.ncols;
        &self.data[start..start + self.ncols]
    }

    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [S] {
        let start = i * self.ncols;
        &mut self.data[start..start + self.ncols]
    }

    pub fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for j in 0..self.ncols {
            self.data.swap(a * self.ncols + j, b * self.ncols + j);
        }
    }

    pub fn transpose(&self) -> Self {
        Self::from_fn(self.ncols, self.nrows, |i, j| self.get(j, i))
    }

    /// y = A * x
    pub fn mul_vec(&self, x: &DVec<S>) -> DVec<S> {
        debug_assert_eq!(self.ncols, x.len(), "DMat mul_vec: dimension mismatch");
        DVec::from_fn(self.nrows, |i| {
            let row = self.row(i);
            let mut sum = S::ZERO;
            for j in 0..self.ncols {
                sum += row[j] * x[j];
            }
            sum
        })
    }

    /// y = A^T * x
    pub fn tr_mul_vec(&self, x: &DVec<S>) -> DVec<S> {
        debug_assert_eq!(self.nrows, x.len(), "DMat tr_mul_vec: dimension mismatch");
        let mut y = DVec::zeros(self.ncols);
        for i in 0..self.nrows {
            let row = self.row(i);
            let xi = x[i];
            for j in 0..self.ncols {
                y[j] += row[j] * xi;
            }
        }
        y
    }

    /// C = A * B
    pub fn mul_mat(&self, rhs: &DMat<S>) -> DMat<S> {
        debug_assert_eq!(self.ncols, rhs.nrows, "DMat mul_mat: dimension mismatch");
        let mut c = DMat::zeros(self.nrows, rhs.ncols);
        for i in 0..self.nrows {
            for k in 0..self.ncols {
                let a_ik = self.get(i, k);
                let rhs_row = rhs.row(k);
                let c_row = c.row_mut(i);
                for j in 0..rhs_row.len() {
                    c_row[j] += a_ik * rhs_row[j];
                }
            }
        }
        c
    }

    /// Gram matrix A^T * A, the left side of the normal equations.
    pub fn gram(&self) -> DMat<S> {
        let n = self.ncols;
        let mut g = DMat::zeros(n, n);
        for i in 0..self.nrows {
            let row = self.row(i);
            for a in 0..n {
                let ra = row[a];
                if ra == S::ZERO {
                    continue;
                }
                let g_row = g.row_mut(a);
                for b in 0..n {
                    g_row[b] += ra * row[b];
                }
            }
        }
        g
    }

    /// Add `v` to every diagonal element.
    pub fn add_diagonal(&mut self, v: S) {
        let n = self.nrows.min(self.ncols);
        for i in 0..n {
            let idx = i * self.ncols + i;
            self.data[idx] += v;
        }
    }
}
