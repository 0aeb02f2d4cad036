pub mod escape;
pub mod numbers;
