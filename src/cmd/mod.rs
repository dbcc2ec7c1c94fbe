//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `run`    | `Run`            |
//! | `worker` | `Worker`         |
//! | `config` | `Config`         |

pub mod config;
pub mod run;
pub mod worker;

pub use config::cmd_config;
pub use run::cmd_run;
pub use worker::cmd_worker;
