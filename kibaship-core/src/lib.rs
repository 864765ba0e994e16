//! Kibaship Core
//!
//! Core types and pure logic for the Kibaship deployment lifecycle engine.
//!
//! This crate contains:
//! - Domain types: the stored resources (Application, Deployment, PipelineRun, etc.)
//! - DTOs: request and event payloads exchanged with the outside world
//! - Naming and labels: the deterministic naming contract for generated objects
//! - Phase: the pure deployment phase state machine
//! - Template: the build pipeline generator

pub mod domain;
pub mod dto;
pub mod labels;
pub mod naming;
pub mod phase;
pub mod profile;
pub mod template;
