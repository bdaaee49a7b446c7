//! Sprite animation queue
//!
//! This library provides the core of the sprite-queue system: an ordered,
//! persisted store of animation jobs and a processor that runs them one at
//! a time against the Ludo.ai sprite animation API, plus the HTTP surface
//! that fronts both.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
