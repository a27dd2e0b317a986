pub mod validation;

pub fn sanitize_string(input: &str, max_length: usize) -> String {
    input
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || "-_.,!?".contains(*c))
        .take(max_length)
        .collect()
}

pub async fn retry_with_backoff<F, Fut, T, E>(
    mut operation: F,
    max_retries: usize,
    initial_delay: std::time::Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
{
    let mut delay = initial_delay;

    for attempt in 0..=max_retries {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt == max_retries {
                    return Err(e);
                }

                tracing::warn!(
                    "Operation failed (attempt {}), retrying in {:?}: {:?}",
                    attempt + 1,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                delay *= 2; // exponential backoff
            }
        }
    }

    unreachable!()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_sanitize_string() {
        let sanitized = sanitize_string("Hello, World! @#$%", 10);
        assert_eq!(sanitized, "Hello, Wor");
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let attempts = AtomicUsize::new(0);
        let result: Result<u32, &str> = retry_with_backoff(
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient")
                    } else {
                        Ok(99)
                    }
                }
            },
            5,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(result, Ok(99));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let attempts = AtomicUsize::new(0);
        let result: Result<u32, &str> = retry_with_backoff(
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err("down") }
            },
            3,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(result, Err("down"));
        // Initial attempt plus three retries.
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }
}
