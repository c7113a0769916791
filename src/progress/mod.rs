//! Throughput estimation and terminal progress display.
//!
//! - `speed` - smoothed throughput and ETA fed into task records
//! - `style` - progress bar styling options and templates
//! - `display` - rendering of polled task snapshots
//!
//! # Examples
//!
//! ```rust
//! use comfy_fetch::progress::SpeedEstimator;
//! use std::time::{Duration, Instant};
//!
//! let mut speed = SpeedEstimator::new();
//! let start = Instant::now();
//! speed.sample(0, start);
//! speed.sample(1024, start + Duration::from_secs(1));
//! assert_eq!(speed.eta(1024, Some(4096)), Some(Duration::from_secs(3)));
//! ```

pub(crate) mod display;
pub mod speed;
pub(crate) mod style;

pub use display::TaskDisplay;
pub use speed::SpeedEstimator;
pub use style::{ProgressBarOpts, StyleOptions};
