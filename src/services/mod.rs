pub mod animate;
pub mod download;
pub mod events;
pub mod params;
pub mod persistence;
pub mod processor;
pub mod queue;
