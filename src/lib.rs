pub mod api;
pub mod cli;
pub mod config;
pub mod conflict;
pub mod data;
pub mod error;
pub mod logging;
pub mod optimizer;
pub mod parallel;
pub mod pricing;

pub use error::{Error, ErrorKind, Result};
