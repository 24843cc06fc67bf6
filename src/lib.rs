pub mod config;
pub mod error;
pub mod mapping;
pub mod process;
pub mod runlog;
pub mod scrape;
