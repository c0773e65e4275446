pub mod backup;
pub mod cli;
pub mod config;
pub mod disk;
pub mod error;
pub mod journal;
pub mod report;
pub mod types;
pub mod util;
