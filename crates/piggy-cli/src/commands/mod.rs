//! Command implementations

mod core;
mod serve;
mod weekly;

pub use core::{cmd_init, cmd_seed, open_db};
pub use serve::cmd_serve;
pub use weekly::cmd_weekly_suggestions;
