pub mod job;
pub mod sandbox;
