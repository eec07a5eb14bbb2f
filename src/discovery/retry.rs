// Retry logic with exponential backoff
//
// Transient backend failures (rate limits, 5xx, transport) are retried a
// bounded number of times; auth and malformed-request errors fail
// immediately.

use std::time::Duration;
use tokio::time::sleep;

use super::BackendError;

const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 1000;

pub async fn with_retry<F, Fut>(f: F) -> Result<String, BackendError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<String, BackendError>>,
{
    let mut last_error = None;

    for attempt in 0..MAX_RETRIES {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.retryable {
                    return Err(e);
                }
                last_error = Some(e);

                if attempt < MAX_RETRIES - 1 {
                    let delay = Duration::from_millis(BASE_DELAY_MS * 2u64.pow(attempt));
                    tracing::warn!(
                        "backend request failed (attempt {}/{}), retrying in {:?}",
                        attempt + 1,
                        MAX_RETRIES,
                        delay
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    Err(last_error.unwrap())
}
