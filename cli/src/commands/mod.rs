pub mod status;
pub mod steps;
