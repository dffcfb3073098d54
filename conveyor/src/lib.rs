pub mod concurrency;
pub mod destination;
pub mod error;
mod macros;
pub mod pipeline;
pub mod source;
pub mod stages;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
