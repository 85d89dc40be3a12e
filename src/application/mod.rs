//! Application layer - use cases that coordinate the backend and catalog.
//!
//! Every use case takes a [`SessionContext`] by reference and streams
//! per-module progress to an output sink as it goes.

mod context;
mod outcome;
mod report;
mod scan;
mod select;
mod update;

pub use context::{SessionContext, SessionOptions};
pub use outcome::{ActionOutcome, BatchReport, OutcomeKind};
pub use report::{ModuleReport, ModuleStatus, Reporter, classify};
pub use scan::{ModuleScanner, ScanResult, sort_newest_first};
pub use select::{
    BatchPlan, InstalledMap, SelectionEntry, SelectionState, Selector, SelectorInput,
    SelectorState, execute, scan_catalog,
};
pub use update::{PreconditionError, Updater, ensure_privileged};
