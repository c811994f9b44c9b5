pub mod aux_data;
pub mod microstructure;
pub mod output;
pub mod params;
