//! Stream combinators used by subscriptions

mod throttle;

pub use throttle::{SampleExt, SampleLatest};
