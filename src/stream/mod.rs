//! Stream utilities

mod pacing;

pub use pacing::{Pace, PaceExt};
