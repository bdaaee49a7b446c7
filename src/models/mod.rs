pub mod animation;
pub mod job;
pub mod submission;
