//! Utility functions for common operations.
//!
//! - **URL validation**: Security-focused validation to prevent SSRF through
//!   configured feed URLs and upstream redirects

mod url_validator;

pub use url_validator::{UrlPolicy, UrlValidationError};
