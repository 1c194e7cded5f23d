//! SheetFlow Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities used by every SheetFlow workspace member:
//!
//! - **Error Handling**: the common error and result types
//! - **Checksums**: content hashing used to address cached extractions
//! - **Logging**: tracing subscriber setup driven by `SHEETFLOW_LOG_*` variables
//!
//! # Example
//!
//! ```no_run
//! use sheetflow_common::checksum::content_hash;
//!
//! let key = content_hash(b"1TVk7_vQbl__q5a4sAgBf6#gid=0");
//! println!("cache key: {}", key);
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CommonError, Result};
