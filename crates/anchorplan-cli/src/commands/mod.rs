pub mod chain;
pub mod config;
pub mod plan;
pub mod scenario;
pub mod template;

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;
