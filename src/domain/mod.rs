pub mod aggregation;
pub mod models;
pub mod range;
