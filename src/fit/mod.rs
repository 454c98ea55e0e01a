pub mod optimizer;
pub mod ranges;
pub mod result;
pub mod shape;
pub mod signal;
pub mod two_stage;
pub mod windows;
