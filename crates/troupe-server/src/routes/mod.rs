// Troupe Server - Route groups

pub mod agents;
pub mod observability;
pub mod orchestration;
pub mod tools;
pub mod workflows;
