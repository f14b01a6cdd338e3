//! Command implementations
//!
//! Each module corresponds to a subcommand in the CLI.

pub mod ask;
pub mod build_index;
pub mod history;
pub mod probe;

pub use ask::{run as ask_run, AskArgs, Mode};
pub use build_index::{run as build_index_run, show_stats};
pub use history::{run as history_run, HistoryArgs};
pub use probe::run as probe_run;
