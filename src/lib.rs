pub mod config;
pub mod constants;
pub mod core;
pub mod package;
pub mod sandbox;
pub mod stubs;
