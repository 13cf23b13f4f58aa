pub mod config;
pub mod top;
