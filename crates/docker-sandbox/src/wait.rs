use std::{future::Future, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

#[derive(Debug)]
pub(crate) enum WaitError<E> {
    Check(E),
    TimedOut { waited: Duration },
    Cancelled,
}

/// Calls `check` until it yields `Some`, sleeping `policy.interval` between
/// calls. The timeout is checked after each unsuccessful check, so the check
/// always runs at least once.
pub(crate) async fn poll_until<T, E, F, Fut>(
    policy: PollPolicy,
    cancellation: &CancellationToken,
    mut check: F,
) -> Result<T, WaitError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let started = Instant::now();
    loop {
        let ready = tokio::select! {
            biased;
            _ = cancellation.cancelled() => return Err(WaitError::Cancelled),
            outcome = check() => outcome.map_err(WaitError::Check)?,
        };
        if let Some(value) = ready {
            return Ok(value);
        }

        let waited = started.elapsed();
        if waited >= policy.timeout {
            return Err(WaitError::TimedOut { waited });
        }

        tokio::select! {
            biased;
            _ = cancellation.cancelled() => return Err(WaitError::Cancelled),
            _ = tokio::time::sleep(policy.interval) => {}
        }
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
