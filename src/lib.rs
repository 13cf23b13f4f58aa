pub mod engine;
pub mod mem;
pub mod sim;
pub mod timeq;
pub mod traffic;
pub mod ui;
