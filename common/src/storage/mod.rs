pub mod dataset;
#[cfg(any(test, feature = "test-utils"))]
pub mod fixtures;
pub mod store;
pub mod types;
