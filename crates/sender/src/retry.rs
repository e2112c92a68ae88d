//! Retry policy for individual delivery parts.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::SendError;

pub(crate) const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(20);
const JITTER_PCT: f64 = 0.20;

/// Whether an error is worth another attempt.
///
/// HTTP statuses are classified structurally (429 and 5xx retry). Everything
/// else falls back to the substring safety net over the error message.
pub(crate) fn is_retryable(err: &SendError) -> bool {
    match err {
        SendError::HttpStatus { code, .. } => *code == 429 || (500..=599).contains(code),
        err => {
            let message = err.to_string().to_lowercase();
            ["timeout", "temporary", "eof", "reset", "deadline"]
                .iter()
                .any(|needle| message.contains(needle))
        }
    }
}

/// Run one part with exponential backoff (±20% jitter, capped). Returns the
/// final result together with the number of attempts made, 1-based.
pub(crate) async fn with_retry<F, Fut>(mut op: F) -> (Result<(), SendError>, i64)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), SendError>>,
{
    let mut backoff = BASE_BACKOFF;
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(()) => return (Ok(()), i64::from(attempt)),
            Err(err) => {
                if attempt >= MAX_ATTEMPTS || !is_retryable(&err) {
                    return (Err(err), i64::from(attempt));
                }
                let wait = {
                    let mut rng = rand::thread_rng();
                    let factor = 1.0 + JITTER_PCT * rng.gen_range(-1.0..=1.0);
                    backoff.mul_f64(factor).min(MAX_BACKOFF)
                };
                tokio::time::sleep(wait).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::ProtoError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn classification() {
        let retryable = SendError::HttpStatus {
            code: 429,
            url: "u".into(),
        };
        assert!(is_retryable(&retryable));
        let retryable = SendError::HttpStatus {
            code: 503,
            url: "u".into(),
        };
        assert!(is_retryable(&retryable));
        let terminal = SendError::HttpStatus {
            code: 404,
            url: "u".into(),
        };
        assert!(!is_retryable(&terminal));

        let by_message = SendError::Proto(ProtoError::SendFailed("stream reset by peer".into()));
        assert!(is_retryable(&by_message));
        let by_message = SendError::Proto(ProtoError::SendFailed("deadline exceeded".into()));
        assert!(is_retryable(&by_message));
        let terminal = SendError::Proto(ProtoError::SendFailed("forbidden".into()));
        assert!(!is_retryable(&terminal));
    }

    #[tokio::test]
    async fn retries_up_to_budget() {
        let calls = AtomicU32::new(0);
        let (result, attempts) = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(SendError::Proto(ProtoError::SendFailed(
                    "timeout talking to server".into(),
                )))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let (result, attempts) = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SendError::Proto(ProtoError::SendFailed("rejected".into()))) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let (result, attempts) = with_retry(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(SendError::Proto(ProtoError::SendFailed("timeout".into())))
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(attempts, 3);
    }
}
