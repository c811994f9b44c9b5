pub mod grid;
pub mod phase;
pub mod species;
