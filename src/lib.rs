pub mod application;
pub mod backend;
pub mod commands;
pub mod package;
pub mod runtime;

#[cfg(test)]
pub mod test_utils;
