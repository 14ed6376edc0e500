use crate::Shape;
use core::ops::Range;
use skein::{Device, Error, Result, Scalar};
use skein_la::{DMat, DVec};

/// Dense row-major tensor with value semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<S: Scalar> {
    data: Vec<S>,
    shape: Shape,
}

/// Work below this many elements is not worth fanning out to the pool.
const PARALLEL_THRESHOLD: usize = 4096;

impl<S: Scalar> Tensor<S> {
    /// Create a tensor from flat data and shape. The data length must equal
    /// the shape's element count; anything else is a programmer error.
    pub fn new(data: Vec<S>, shape: Shape) -> Self {
        assert_eq!(
            data.len(),
            shape.numel(),
            "Tensor::new: data length {} does not match shape {shape}",
            data.len()
        );
        Self { data, shape }
    }

    pub fn zeros(shape: Shape) -> Self {
        let n = shape.numel();
        Self::new(vec![S::ZERO; n], shape)
    }

    pub fn from_fn(shape: Shape, f: impl Fn(&[usize]) -> S) -> Self {
        let n = shape.numel();
        let ndim = shape.ndim();
        let mut data = Vec::with_capacity(n);
        let mut idx = vec![0usize; ndim];
        for _ in 0..n {
            data.push(f(&idx));
            for d in (0..ndim).rev() {
                idx[d] += 1;
                if idx[d] < shape[d] {
                    break;
                }
                idx[d] = 0;
            }
        }
        Self::new(data, shape)
    }

    /// 1-D tensor from a slice.
    pub fn from_slice(s: &[S]) -> Self {
        Self::new(s.to_vec(), Shape::vector(s.len()))
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }
    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }
    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }
    pub fn numel(&self) -> usize {
        self.shape.numel()
    }
    pub fn data(&self) -> &[S] {
        &self.data
    }
    pub fn data_mut(&mut self) -> &mut [S] {
        &mut self.data
    }

    fn flat_index(&self, idx: &[usize]) -> usize {
        debug_assert_eq!(idx.len(), self.ndim());
        let strides = self.shape.contiguous_strides();
        idx.iter().zip(strides.iter()).map(|(i, s)| i * s).sum()
    }

    pub fn get(&self, idx: &[usize]) -> S {
        self.data[self.flat_index(idx)]
    }

    pub fn set(&mut self, idx: &[usize], val: S) {
        let fi = self.flat_index(idx);
        self.data[fi] = val;
    }

    /// Row slice of a 2-D tensor.
    pub fn row(&self, i: usize) -> &[S] {
        debug_assert_eq!(self.ndim(), 2);
        let cols = self.shape[1];
        &self.data[i * cols..(i + 1) * cols]
    }

    /// In-place fill.
    pub fn fill(&mut self, v: S) {
        self.data.fill(v);
    }

    pub fn reshape(&self, new_shape: Shape) -> Result<Self> {
        if self.numel() != new_shape.numel() {
            return Err(Error::shape("reshape", new_shape.dims(), self.dims()));
        }
        Ok(Self::new(self.data.clone(), new_shape))
    }

    /// Transpose a 2-D tensor.
    pub fn transpose(&self) -> Result<Self> {
        if self.ndim() != 2 {
            return Err(Error::shape("transpose", "rank 2", self.dims()));
        }
        let (m, n) = (self.shape[0], self.shape[1]);
        let mut data = vec![S::ZERO; m * n];
        for i in 0..m {
            for j in 0..n {
                data[j * m + i] = self.data[i * n + j];
            }
        }
        Ok(Self::new(data, Shape::matrix(n, m)))
    }

    /// Contiguous slice along the leading dimension, for mini-batches.
    pub fn slice_rows(&self, range: Range<usize>) -> Result<Self> {
        if self.ndim() == 0 || range.end > self.shape[0] || range.start > range.end {
            return Err(Error::shape("slice_rows", self.dims(), range));
        }
        let stride = self.shape.leading_stride();
        let data = self.data[range.start * stride..range.end * stride].to_vec();
        let mut dims = self.dims().to_vec();
        dims[0] = range.len();
        Ok(Self::new(data, Shape::new(dims)))
    }

    /// Gather rows of a 2-D tensor by index, for shuffled mini-batches.
    pub fn gather_rows(&self, indices: &[usize]) -> Result<Self> {
        if self.ndim() != 2 {
            return Err(Error::shape("gather_rows", "rank 2", self.dims()));
        }
        let cols = self.shape[1];
        let mut data = Vec::with_capacity(indices.len() * cols);
        for &i in indices {
            if i >= self.shape[0] {
                return Err(Error::shape("gather_rows", self.dims(), i));
            }
            data.extend_from_slice(self.row(i));
        }
        Ok(Self::new(data, Shape::matrix(indices.len(), cols)))
    }

    // --- Element-wise primitives ---

    /// Element-wise unary map, chunked across the device.
    pub fn map(&self, device: &Device, f: impl Fn(S) -> S + Sync) -> Self {
        let n = self.numel();
        if n < PARALLEL_THRESHOLD || device.threads() == 1 {
            let data: Vec<S> = self.data.iter().map(|&v| f(v)).collect();
            return Self::new(data, self.shape.clone());
        }
        let chunks = device.run_chunks(n, |r| {
            self.data[r].iter().map(|&v| f(v)).collect::<Vec<S>>()
        });
        let mut data = Vec::with_capacity(n);
        for c in chunks {
            data.extend_from_slice(&c);
        }
        Self::new(data, self.shape.clone())
    }

    /// Element-wise binary op. Shapes must match exactly; there is no
    /// implicit broadcasting.
    pub fn zip(
        &self,
        device: &Device,
        other: &Self,
        op: &'static str,
        f: impl Fn(S, S) -> S + Sync,
    ) -> Result<Self> {
        if self.shape != other.shape {
            return Err(Error::shape(op, self.dims(), other.dims()));
        }
        let n = self.numel();
        if n < PARALLEL_THRESHOLD || device.threads() == 1 {
            let data: Vec<S> = self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(&a, &b)| f(a, b))
                .collect();
            return Ok(Self::new(data, self.shape.clone()));
        }
        let chunks = device.run_chunks(n, |r| {
            self.data[r.clone()]
                .iter()
                .zip(other.data[r].iter())
                .map(|(&a, &b)| f(a, b))
                .collect::<Vec<S>>()
        });
        let mut data = Vec::with_capacity(n);
        for c in chunks {
            data.extend_from_slice(&c);
        }
        Ok(Self::new(data, self.shape.clone()))
    }

    pub fn add(&self, device: &Device, other: &Self) -> Result<Self> {
        self.zip(device, other, "add", |a, b| a + b)
    }

    pub fn sub(&self, device: &Device, other: &Self) -> Result<Self> {
        self.zip(device, other, "sub", |a, b| a - b)
    }

    pub fn mul(&self, device: &Device, other: &Self) -> Result<Self> {
        self.zip(device, other, "mul", |a, b| a * b)
    }

    pub fn scale(&self, device: &Device, s: S) -> Self {
        self.map(device, |v| v * s)
    }

    // --- Axis broadcasts (explicit, never implicit) ---

    /// Add a length-`cols` vector to every row of a 2-D tensor.
    pub fn broadcast_add_rows(&self, vector: &Self) -> Result<Self> {
        self.broadcast_rows(vector, "broadcast_add_rows", |a, b| a + b)
    }

    /// Multiply every row of a 2-D tensor by a length-`cols` vector.
    pub fn broadcast_mul_rows(&self, vector: &Self) -> Result<Self> {
        self.broadcast_rows(vector, "broadcast_mul_rows", |a, b| a * b)
    }

    fn broadcast_rows(
        &self,
        vector: &Self,
        op: &'static str,
        f: impl Fn(S, S) -> S,
    ) -> Result<Self> {
        if self.ndim() != 2 || vector.ndim() != 1 || vector.numel() != self.shape[1] {
            return Err(Error::shape(op, self.dims(), vector.dims()));
        }
        let cols = self.shape[1];
        let data: Vec<S> = self
            .data
            .iter()
            .enumerate()
            .map(|(i, &v)| f(v, vector.data[i % cols]))
            .collect();
        Ok(Self::new(data, self.shape.clone()))
    }

    // --- Reductions ---

    /// Sum of all elements, pairwise per device chunk, with chunk partials
    /// combined pairwise in chunk order. Deterministic for a fixed thread
    /// count.
    pub fn sum(&self, device: &Device) -> S {
        if self.numel() < PARALLEL_THRESHOLD || device.threads() == 1 {
            return pairwise_sum(&self.data);
        }
        let partials = device.run_chunks(self.numel(), |r| pairwise_sum(&self.data[r]));
        pairwise_sum(&partials)
    }

    pub fn mean(&self, device: &Device) -> S {
        if self.numel() == 0 {
            return S::ZERO;
        }
        self.sum(device) / S::from_usize(self.numel())
    }

    /// Largest element. Empty tensors have no maximum; do not ask.
    pub fn max(&self, device: &Device) -> S {
        assert!(self.numel() > 0, "Tensor::max: empty tensor");
        if self.numel() < PARALLEL_THRESHOLD || device.threads() == 1 {
            return slice_max(&self.data);
        }
        let partials = device.run_chunks(self.numel(), |r| slice_max(&self.data[r]));
        slice_max(&partials)
    }

    /// Per-row index of the largest element of a 2-D tensor.
    pub fn argmax_rows(&self) -> Result<Vec<usize>> {
        if self.ndim() != 2 {
            return Err(Error::shape("argmax_rows", "rank 2", self.dims()));
        }
        Ok((0..self.shape[0])
            .map(|i| {
                let row = self.row(i);
                let mut best = 0;
                for (j, &v) in row.iter().enumerate() {
                    if v > row[best] {
                        best = j;
                    }
                }
                best
            })
            .collect())
    }

    /// Column sums of a 2-D tensor (reduce over rows).
    pub fn sum_rows(&self, device: &Device) -> Result<Self> {
        if self.ndim() != 2 {
            return Err(Error::shape("sum_rows", "rank 2", self.dims()));
        }
        let (rows, cols) = (self.shape[0], self.shape[1]);
        let partials = device.run_chunks(rows, |r| {
            let mut acc = vec![S::ZERO; cols];
            for i in r {
                let row = self.row(i);
                for j in 0..cols {
                    acc[j] += row[j];
                }
            }
            acc
        });
        let mut out = vec![S::ZERO; cols];
        for p in partials {
            for j in 0..cols {
                out[j] += p[j];
            }
        }
        Ok(Self::new(out, Shape::vector(cols)))
    }

    // --- Contractions ---

    /// Matrix product of 2-D tensors: [m,k] · [k,n]. Any other pairing is a
    /// shape mismatch. Rows of the output are computed in parallel chunks.
    pub fn matmul(&self, device: &Device, rhs: &Self) -> Result<Self> {
        if self.ndim() != 2 || rhs.ndim() != 2 || self.shape[1] != rhs.shape[0] {
            return Err(Error::shape("matmul", self.dims(), rhs.dims()));
        }
        let (m, k) = (self.shape[0], self.shape[1]);
        let n = rhs.shape[1];

        let chunks = device.run_chunks(m, |range| {
            let mut block = vec![S::ZERO; range.len() * n];
            for (bi, i) in range.enumerate() {
                let lhs_row = self.row(i);
                let out_row = &mut block[bi * n..(bi + 1) * n];
                for kk in 0..k {
                    let a = lhs_row[kk];
                    if a == S::ZERO {
                        continue;
                    }
                    let rhs_row = rhs.row(kk);
                    for j in 0..n {
                        out_row[j] += a * rhs_row[j];
                    }
                }
            }
            block
        });

        let mut data = Vec::with_capacity(m * n);
        for c in chunks {
            data.extend_from_slice(&c);
        }
        Ok(Self::new(data, Shape::matrix(m, n)))
    }

    // --- Conversions ---

    pub fn to_dvec(&self) -> DVec<S> {
        DVec::from_slice(&self.data)
    }

    pub fn from_dvec(v: &DVec<S>) -> Self {
        Self::from_slice(v.as_slice())
    }

    pub fn to_dmat(&self) -> Result<DMat<S>> {
        if self.ndim() != 2 {
            return Err(Error::shape("to_dmat", "rank 2", self.dims()));
        }
        Ok(DMat::from_raw(
            self.shape[0],
            self.shape[1],
            self.data.clone(),
        ))
    }

    /// True when every element is finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

/// Pairwise summation tree: O(log n) error growth and a fixed association
/// order, independent of scheduling.
fn pairwise_sum<S: Scalar>(xs: &[S]) -> S {
    if xs.len() <= 8 {
        let mut s = S::ZERO;
        for &x in xs {
            s += x;
        }
        return s;
    }
    let mid = xs.len() / 2;
    pairwise_sum(&xs[..mid]) + pairwise_sum(&xs[mid..])
}

fn slice_max<S: Scalar>(xs: &[S]) -> S {
    let mut m = xs[0];
    for &v in &xs[1..] {
        if v > m {
            m = v;
        }
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEV: Device = Device::SingleThreaded;

    #[test]
    fn construction_and_access() {
        let t = Tensor::<f64>::zeros(Shape::matrix(2, 3));
        assert_eq!(t.numel(), 6);
        assert_eq!(t.get(&[1, 2]), 0.0);

        let t = Tensor::<f64>::from_fn(Shape::matrix(2, 3), |idx| (idx[0] * 3 + idx[1]) as f64);
        assert_eq!(t.get(&[1, 1]), 4.0);
        assert_eq!(t.row(1), &[3.0, 4.0, 5.0]);
    }

    #[test]
    fn exact_shape_arithmetic() {
        let a = Tensor::from_slice(&[1.0, 2.0, 3.0]);
        let b = Tensor::from_slice(&[4.0, 5.0, 6.0]);
        assert_eq!(a.add(&DEV, &b).unwrap().data(), &[5.0, 7.0, 9.0]);
        assert_eq!(b.sub(&DEV, &a).unwrap().data(), &[3.0, 3.0, 3.0]);
    }

    #[test]
    fn mismatched_shapes_are_errors_not_broadcasts() {
        let a = Tensor::<f64>::zeros(Shape::matrix(2, 3));
        let b = Tensor::from_slice(&[1.0, 2.0, 3.0]);
        match a.add(&DEV, &b) {
            Err(Error::ShapeMismatch { op, .. }) => assert_eq!(op, "add"),
            other => panic!("expected ShapeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn explicit_row_broadcast() {
        let m = Tensor::new(vec![0.0, 0.0, 10.0, 10.0], Shape::matrix(2, 2));
        let v = Tensor::from_slice(&[1.0, 2.0]);
        let out = m.broadcast_add_rows(&v).unwrap();
        assert_eq!(out.data(), &[1.0, 2.0, 11.0, 12.0]);

        let scaled = m.broadcast_mul_rows(&v).unwrap();
        assert_eq!(scaled.data(), &[0.0, 0.0, 10.0, 20.0]);

        let wrong = Tensor::from_slice(&[1.0, 2.0, 3.0]);
        assert!(m.broadcast_add_rows(&wrong).is_err());
    }

    #[test]
    fn matmul_known_values() {
        let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], Shape::matrix(2, 2));
        let b = Tensor::new(vec![5.0, 6.0, 7.0, 8.0], Shape::matrix(2, 2));
        let c = a.matmul(&DEV, &b).unwrap();
        assert_eq!(c.data(), &[19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn matmul_shape_rules() {
        let a = Tensor::<f64>::zeros(Shape::matrix(2, 3));
        let b = Tensor::<f64>::zeros(Shape::matrix(4, 2));
        assert!(a.matmul(&DEV, &b).is_err());
        let ok = Tensor::<f64>::zeros(Shape::matrix(3, 4));
        assert_eq!(a.matmul(&DEV, &ok).unwrap().dims(), &[2, 4]);
    }

    #[test]
    fn matmul_parallel_matches_serial() {
        let a = Tensor::<f64>::from_fn(Shape::matrix(17, 13), |idx| {
            (idx[0] * 13 + idx[1]) as f64 * 0.01
        });
        let b = Tensor::<f64>::from_fn(Shape::matrix(13, 9), |idx| {
            (idx[0] as f64 - idx[1] as f64) * 0.1
        });
        let serial = a.matmul(&Device::SingleThreaded, &b).unwrap();
        let parallel = a.matmul(&Device::ThreadPool(4), &b).unwrap();
        assert_eq!(serial, parallel);
    }

    #[test]
    fn slice_rows_minibatch() {
        let t = Tensor::<f64>::from_fn(Shape::matrix(5, 2), |idx| (idx[0] * 2 + idx[1]) as f64);
        let s = t.slice_rows(1..3).unwrap();
        assert_eq!(s.dims(), &[2, 2]);
        assert_eq!(s.data(), &[2.0, 3.0, 4.0, 5.0]);
        assert!(t.slice_rows(4..6).is_err());
    }

    #[test]
    fn gather_rows_shuffled() {
        let t = Tensor::<f64>::from_fn(Shape::matrix(3, 2), |idx| (idx[0] * 2 + idx[1]) as f64);
        let g = t.gather_rows(&[2, 0]).unwrap();
        assert_eq!(g.data(), &[4.0, 5.0, 0.0, 1.0]);
    }

    #[test]
    fn reductions() {
        let t = Tensor::from_slice(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(t.sum(&DEV), 10.0);
        assert_eq!(t.mean(&DEV), 2.5);
        assert_eq!(t.max(&DEV), 4.0);

        let m = Tensor::new(vec![1.0, 5.0, 2.0, 0.0, 7.0, 1.0], Shape::matrix(2, 3));
        assert_eq!(m.argmax_rows().unwrap(), vec![1, 1]);
        assert_eq!(m.sum_rows(&DEV).unwrap().data(), &[1.0, 12.0, 3.0]);
    }

    #[test]
    fn sum_deterministic_across_thread_counts_of_same_device() {
        let t = Tensor::<f64>::from_fn(Shape::vector(10_000), |idx| (idx[0] as f64).sin() * 1e-3);
        let a = t.sum(&Device::ThreadPool(4));
        let b = t.sum(&Device::ThreadPool(4));
        assert_eq!(a, b);
    }

    #[test]
    fn transpose_roundtrip() {
        let t = Tensor::<f64>::from_fn(Shape::matrix(2, 3), |idx| (idx[0] * 3 + idx[1]) as f64);
        let tt = t.transpose().unwrap();
        assert_eq!(tt.dims(), &[3, 2]);
        assert_eq!(tt.get(&[2, 1]), 5.0);
        assert_eq!(tt.transpose().unwrap(), t);
    }
}
