//! Bounded polling.

use crate::error::{Error, Result};
use std::time::{Duration, Instant};

/// Outcome of one polled attempt.
#[derive(Debug)]
pub enum Attempt<T> {
    /// The condition is met.
    Done(T),
    /// Not yet; try again after the interval.
    Retry(String),
    /// Stop polling and return the error.
    Fatal(Error),
}

/// Run `attempt` immediately and then every `interval` until it is done,
/// fails fatally or `timeout` has elapsed.
///
/// On timeout the last retry reason is returned inside
/// [`Error::Timeout`].
pub fn poll_immediate<T, F>(
    what: &str,
    interval: Duration,
    timeout: Duration,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Attempt<T>,
{
    let start = Instant::now();

    loop {
        let reason = match attempt() {
            Attempt::Done(value) => return Ok(value),
            Attempt::Fatal(err) => return Err(err),
            Attempt::Retry(reason) => reason,
        };

        let elapsed = start.elapsed();
        if elapsed + interval > timeout {
            return Err(Error::Timeout {
                what: format!("{} ({})", what, reason),
                seconds: timeout.as_secs(),
            });
        }

        tracing::debug!(what = %what, reason = %reason, "retrying");
        std::thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(5);

    #[test]
    fn test_done_on_first_attempt_does_not_sleep() {
        let start = Instant::now();
        let value = poll_immediate("value", Duration::from_secs(10), Duration::from_secs(60), || {
            Attempt::Done(7)
        })
        .unwrap();
        assert_eq!(value, 7);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_retries_until_done() {
        let mut calls = 0;
        let value = poll_immediate("third call", TICK, Duration::from_secs(5), || {
            calls += 1;
            if calls < 3 {
                Attempt::Retry(format!("call {}", calls))
            } else {
                Attempt::Done(calls)
            }
        })
        .unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn test_fatal_stops_immediately() {
        let mut calls = 0;
        let err = poll_immediate::<(), _>("nothing", TICK, Duration::from_secs(5), || {
            calls += 1;
            Attempt::Fatal(Error::FatalNetwork("broken".into()))
        })
        .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(err, Error::FatalNetwork(_)));
    }

    #[test]
    fn test_timeout_carries_last_reason() {
        let err = poll_immediate::<(), _>("interfaces", TICK, Duration::from_millis(30), || {
            Attempt::Retry("no addresses yet".into())
        })
        .unwrap_err();
        match err {
            Error::Timeout { what, .. } => {
                assert!(what.contains("interfaces"));
                assert!(what.contains("no addresses yet"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
