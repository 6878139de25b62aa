pub mod controller;
pub mod sampler;
