//! Data Transfer Objects
//!
//! Request and response shapes exchanged between the API layer and the engine.

pub mod deployment;
