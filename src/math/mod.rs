//! Mathematical utilities: least squares, polynomial trends, splines and
//! descriptive statistics.

pub mod ols;
pub mod poly;
pub mod spline;
pub mod stats;

pub use ols::*;
pub use poly::*;
pub use spline::*;
pub use stats::*;
