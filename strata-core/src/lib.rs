//! Strata Core
//!
//! Core types shared by the Strata provisioning engine and its API server.
//!
//! This crate contains:
//! - Domain types: templates, deployments, variable values and the status graph
//! - DTOs: request/response shapes exchanged with the API layer

pub mod domain;
pub mod dto;
