pub mod company;
pub mod distributions;
pub mod events;
pub mod follow_on;
pub mod lifecycle;
pub mod orchestrator;
pub mod parameters;
