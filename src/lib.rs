pub mod ai;
pub mod app;
pub mod clock;
pub mod config;
pub mod db;
pub mod digest;
pub mod error;
pub mod feed;
pub mod history;
pub mod models;

pub use app::{App, RefreshSummary, Services, Settings, WriteAck};
pub use config::Config;
pub use error::{AppError, Result};
