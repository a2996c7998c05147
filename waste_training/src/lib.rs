pub mod balancing;
pub mod cleaning;
pub mod config;
pub mod dataset;
pub mod evaluation;
pub mod history;
pub mod manifest;
pub mod monitor;
pub mod pipeline;
pub mod publish;
pub mod se_block;
