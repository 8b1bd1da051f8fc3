pub mod models;
pub mod config;
pub mod error;
pub mod store;
pub mod logs;
pub mod notify;
pub mod logging;

pub use config::Config;
pub use error::{Error, Result};
