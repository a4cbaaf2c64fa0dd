//! Terminal presentation of plans and runs
//!
//! 1. Preview - probe results and file diffs for `--dry-run` and `status`
//! 2. Progress - a bar over the steps while the engine runs
//! 3. Summary - per-step terminal status once the run ends

pub mod differ;
pub mod executor;

pub use differ::display_preview;
pub use executor::{DisplayOptions, ProgressObserver, confirm, print_summary};
