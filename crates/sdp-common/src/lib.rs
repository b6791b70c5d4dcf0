//! SDP Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared functionality for the SDP workspace members:
//!
//! - **Error Handling**: the top-level [`SdpError`] type and [`Result`] alias
//! - **Logging**: tracing bootstrap with console/file output and env config
//! - **Checksums**: digest utilities for snapshot provenance
//!
//! # Example
//!
//! ```no_run
//! use sdp_common::{Result, SdpError};
//! use sdp_common::checksum::{compute_file_checksum, ChecksumAlgorithm};
//!
//! fn fingerprint(path: &str) -> Result<String> {
//!     compute_file_checksum(path, ChecksumAlgorithm::Sha256)
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, SdpError};
