//! Shared helpers: alignment arithmetic and cooperative cancellation.

mod math;
mod synchronization;

pub use math::{align_up, is_power_of_two};
pub use synchronization::CancellationToken;
