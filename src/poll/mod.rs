//! Fetch orchestration.
//!
//! [`Poller`] runs one cycle at a time over a group of configured instances;
//! [`spawn_poll_loop`] drives it on an interval and publishes each
//! [`CycleOutcome`] on a watch channel.

mod cycle;
mod fetch;

pub use cycle::{
    spawn_poll_loop, CycleOutcome, CycleReport, InstanceReport, PollState, Poller,
};
pub use fetch::{HttpFetcher, StatusFetcher};
