pub mod bruker;
pub mod experiments;
pub mod spectrum;
