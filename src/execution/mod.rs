//! Streaming pull loop shared by every C5 compute-client RPC, plus the
//! cancellation primitives C6 uses to stop a running request.
//!
//! The model-discovery runtime streams its responses; a stream can go quiet
//! without closing (a slow search, a stalled worker) or never close at all.
//! [`pull_loop`] centralizes the two guards spec §4.5/§9 require of every
//! such stream: `pull_max` consecutive empty pulls raise
//! [`OrchestrationError::Stalled`], and a single pull taking longer than
//! `pull_timeout` raises [`OrchestrationError::Timeout`]. A clean end of
//! stream resolves normally; any other transport error propagates as-is.

mod timeout;

pub use timeout::{CancelHandle, PullTimeout, PullTimeoutError};

use std::future::Future;
use std::time::Duration;

use crate::error::{OrchestrationError, OrchestrationResult};

/// One outcome of a single pull against a streaming RPC.
pub enum PullOutcome<T> {
    Item(T),
    /// A transient empty response; counts toward the `pull_max` stall budget
    /// but is not itself an error.
    Empty,
    EndOfStream,
}

/// Drives `receive` until end of stream, cancellation, or a stall/timeout
/// trips. `on_item` is invoked synchronously for every [`PullOutcome::Item`]
/// in arrival order before the next pull begins.
pub async fn pull_loop<T, F, Fut>(
    mut receive: F,
    pull_max: u32,
    pull_timeout: Duration,
    cancel: &CancelHandle,
    mut on_item: impl FnMut(T),
) -> OrchestrationResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = OrchestrationResult<PullOutcome<T>>>,
{
    let mut empty_streak: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(OrchestrationError::Cancelled);
        }
        let outcome = match tokio::time::timeout(pull_timeout, receive()).await {
            Ok(result) => result?,
            Err(_) => return Err(OrchestrationError::Timeout(pull_timeout)),
        };
        match outcome {
            PullOutcome::Item(item) => {
                empty_streak = 0;
                on_item(item);
            }
            PullOutcome::Empty => {
                empty_streak += 1;
                if empty_streak >= pull_max {
                    return Err(OrchestrationError::Stalled(empty_streak));
                }
            }
            PullOutcome::EndOfStream => return Ok(()),
        }
    }
}
