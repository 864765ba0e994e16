//! Core domain types
//!
//! This module contains the resources stored in the object store. Every
//! resource carries an [`meta::ObjectMeta`] and implements [`meta::Resource`]
//! so the store can handle it generically.

pub mod application;
pub mod condition;
pub mod deployment;
pub mod domain;
pub mod meta;
pub mod pipeline;
pub mod routing;
pub mod secret;
pub mod workload;
