//! Stage tasks making up the pipeline.
//!
//! A pipeline runs three stages as independent tasks, connected by bounded channels:
//!
//! - The **fetch** stage pulls pages from the source and accumulates them into
//!   size-limited batches.
//! - The **process** stage writes sealed batches to the destination and forwards
//!   their cookies on success.
//! - The **commit** stage acknowledges cookies back to the source, one at a time.
//!
//! Each stage owns its end of the connecting channels, its shutdown token receiver,
//! and a sender for reporting at most one failure to the coordinator. Dropping a
//! stage closes its output channel, which is how downstream stages learn that no
//! more work is coming.

pub mod commit;
pub mod fetch;
pub mod process;
