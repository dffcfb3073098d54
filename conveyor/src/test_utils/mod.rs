//! Testing utilities for pipelines.
//!
//! This module provides in-memory implementations of the [`crate::source::Source`]
//! and [`crate::destination::Destination`] traits, plus async waiting helpers, so
//! pipeline behavior can be tested without any external system.
//!
//! The doubles record everything that flows through them and support targeted fault
//! injection, a specific fetch call, write call, or acknowledgement can be told to
//! fail. This is enough to drive every stage of a pipeline into its failure path
//! deterministically.
//!
//! # Module Organization
//!
//! - [`source`] - Scripted in-memory source with fetch and acknowledgement records
//! - [`destination`] - In-memory destination that records written batches
//! - [`notify`] - Async notification and waiting utilities for test coordination

pub mod destination;
pub mod notify;
pub mod source;
