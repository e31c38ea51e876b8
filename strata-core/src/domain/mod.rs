//! Core domain types
//!
//! These types represent the fundamental business entities and are shared between
//! the engine (which drives pipelines) and the server (which persists them).

pub mod deployment;
pub mod template;
pub mod variable;
