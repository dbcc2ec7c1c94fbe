pub mod config;
pub mod errors;
pub mod input;
pub mod logging;
pub mod pipeline;
pub mod repo;
pub mod ui;
pub mod workspace;
