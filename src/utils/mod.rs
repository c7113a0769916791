//! Shared utility functions.
//!
//! - [`content_length`] - size and range extraction from response headers

pub mod content_length;

pub use content_length::{content_length, content_range, parse_content_range, total_size, ContentRange};
