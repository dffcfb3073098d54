//! Concurrency utilities for coordinating pipeline stages.
//!
//! This module provides the fundamental concurrency primitives used throughout the pipeline
//! to coordinate the fetch, process, and commit stages and to handle graceful shutdown.
//!
//! # Coordination Patterns
//!
//! ## Graceful Shutdown
//!
//! The [`shutdown`] module implements a per-stage shutdown pattern where:
//! 1. Every stage owns its own shutdown token, so stages can be stopped selectively
//! 2. Closing a token is idempotent and observable from the stage it belongs to
//! 3. Stages complete their current operation before terminating
//!
//! ## Channel Operations
//!
//! The [`channel`] module wraps channel sends and receives so that every blocking
//! channel operation also honors the stage's shutdown token. This keeps the stage
//! loops free of ad-hoc `select!` blocks and guarantees that no stage can hang on a
//! full or empty channel once its token has been closed.

pub mod channel;
pub mod shutdown;
