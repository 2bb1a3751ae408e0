pub mod aggregation;
pub mod cancellation;
pub mod outliers;
pub mod runner;
pub mod trial;
