pub mod browser;
pub mod collector;
pub mod config;
pub mod error;
pub mod init;
pub mod models;
pub mod modules;
pub mod output;
pub mod scoring;
pub mod trends;

pub use error::{AppError, Result};
