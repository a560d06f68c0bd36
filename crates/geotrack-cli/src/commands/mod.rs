//! Command implementations for the CLI.

mod clear;
mod config;
mod jobs;
mod list;
mod preview;
mod refresh;
mod watch;
mod worker;

pub use clear::cmd_clear;
pub use config::cmd_config;
pub use jobs::{JobsArgs, cmd_jobs};
pub use list::{ListArgs, cmd_list};
pub use preview::{PreviewArgs, cmd_preview};
pub use refresh::{RefreshArgs, cmd_refresh};
pub use watch::{WatchArgs, cmd_watch};
pub use worker::{WorkerArgs, cmd_worker};
