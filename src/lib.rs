// Lifeline - Crisis keyword detection and escalation
// Library exports

pub mod audit; // Flagged entry persistence and the background audit worker
pub mod config;
pub mod crisis; // Lexicons, detector, resources, escalation flow
pub mod errors;
pub mod metrics;
pub mod server; // HTTP daemon mode
