//! Dense linear algebra — flat parameter vectors, row-major matrices and the
//! LU decomposition the Levenberg-Marquardt step solves through.

mod dmat;
mod dvec;
mod lu;

pub use dmat::DMat;
pub use dvec::DVec;
pub use lu::Lu;
