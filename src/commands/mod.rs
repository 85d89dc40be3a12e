//! Command layer - one entry point per subcommand.

mod catalog;
pub mod config;
mod list;
mod select;
pub mod services;
mod update;

pub use catalog::catalog;
pub use list::list;
pub use select::select;
pub use update::{clean, update};
