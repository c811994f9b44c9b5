pub mod fit;
pub mod rng;

pub use fit::{linear_regression, quadratic_through};
pub use rng::Ran1;
