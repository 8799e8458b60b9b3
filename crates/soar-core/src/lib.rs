pub mod approval;
pub mod classifier;
pub mod config;
pub mod error;
pub mod exec;
pub mod io;
pub mod notify;
pub mod oracle;
pub mod paths;
pub mod pending;
pub mod proposal;
pub mod report;
pub mod signal;
pub mod types;

pub use error::{Result, SoarError};
