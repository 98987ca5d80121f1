//! HTTP retry helpers for transient errors.
//!
//! Every fetcher goes through [`send_json`] or [`send_text`] rather than
//! calling `reqwest::RequestBuilder::send()` directly, so that connection
//! failures, timeouts, HTTP 429 and 5xx responses are retried with
//! exponential backoff according to the caller's [`RetryPolicy`].
//!
//! ```ignore
//! let rows = retry::send_json(&options.retry, || client.get(&url).query(&params)).await?;
//! let csv = retry::send_text(&options.retry, || client.get(&url)).await?;
//! ```

use crate::{RetryPolicy, SourceError};

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 300;

/// Sends an HTTP request and parses the response body as JSON.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`] (builders are consumed by `.send()`).
///
/// A body that arrives but cannot be decoded is treated like a transient
/// failure and the whole request is re-sent, sharing the same retry budget.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails after all retries, the
/// server returns a non-retryable status code, or the body never decodes.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(
    policy: &RetryPolicy,
    build_request: F,
) -> Result<serde_json::Value, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let text = send_text(policy, &build_request).await?;
    match serde_json::from_str(&text) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            log::warn!(
                "JSON parse failed ({first_err}), re-fetching once. Body preview: {}",
                preview(&text)
            );
            tokio::time::sleep(policy.base_delay).await;
            let text = send_text(policy, &build_request).await?;
            serde_json::from_str(&text).map_err(|e| {
                log::error!("JSON parse failed again: {e}. Body preview: {}", preview(&text));
                SourceError::Json(e)
            })
        }
    }
}

/// Sends an HTTP request and returns the response body as a `String`.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails after all retries or the
/// body cannot be read.
#[allow(clippy::future_not_send)]
pub async fn send_text<F>(policy: &RetryPolicy, build_request: F) -> Result<String, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let response = send_inner(policy, &build_request, attempt).await?;
        let url = response.url().to_string();
        match response.text().await {
            Ok(text) => return Ok(text),
            Err(e) if attempt < policy.max_retries => {
                attempt += 1;
                log::warn!(
                    "Body read from {url} failed ({e}), retry {attempt}/{}",
                    policy.max_retries
                );
                tokio::time::sleep(policy.delay_for(attempt)).await;
            }
            Err(e) => {
                log::error!("Body read from {url} failed after {attempt} retries: {e}");
                return Err(SourceError::Http(e));
            }
        }
    }
}

/// Core retry loop shared by [`send_json`] and [`send_text`].
///
/// Starts counting at `first_attempt` so that body-level retries consume
/// the same budget as connection-level ones. Returns the successful
/// response (status 2xx or 3xx).
#[allow(clippy::future_not_send)]
async fn send_inner<F>(
    policy: &RetryPolicy,
    build_request: &F,
    first_attempt: u32,
) -> Result<reqwest::Response, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let max_retries = policy.max_retries;
    let mut attempt = first_attempt;

    loop {
        if attempt > first_attempt {
            let delay = policy.delay_for(attempt);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && attempt < max_retries {
                    log::warn!("  transient error: {e}");
                    attempt += 1;
                    continue;
                }
                return Err(SourceError::Http(e));
            }
            Ok(response) => {
                let status = response.status();

                if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    if attempt < max_retries {
                        log::warn!("  HTTP {status} from {}", response.url());
                        attempt += 1;
                        continue;
                    }
                    return Err(SourceError::Upstream {
                        message: format!("HTTP {status} after {max_retries} retries"),
                    });
                }

                // 4xx other than 429 is permanent
                if status.is_client_error() {
                    return Err(SourceError::Upstream {
                        message: format!("HTTP {status} from {}", response.url()),
                    });
                }

                return Ok(response);
            }
        }
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}

fn preview(text: &str) -> &str {
    let end = text
        .char_indices()
        .map(|(i, _)| i)
        .nth(BODY_PREVIEW_LEN)
        .unwrap_or(text.len());
    &text[..end]
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::FetchOptions;

    const FAST: RetryPolicy = RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
    };

    /// Local HTTP server answering each request with the status line
    /// `respond(n)` for the n-th request (0-based). Returns the base URL and
    /// the request counter.
    async fn serve(respond: fn(usize) -> &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let status = respond(counter.fetch_add(1, Ordering::SeqCst));
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok"
                );
                socket.write_all(response.as_bytes()).await.ok();
                socket.shutdown().await.ok();
            }
        });

        (url, hits)
    }

    #[tokio::test]
    async fn server_errors_retry_until_budget_is_spent() {
        let (url, hits) = serve(|_| "503 Service Unavailable").await;
        let client = FetchOptions::default().client().unwrap();

        let err = send_text(&FAST, || client.get(&url)).await.unwrap_err();
        assert!(matches!(&err, SourceError::Upstream { message } if message.contains("503")));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rate_limiting_is_retried() {
        let (url, hits) = serve(|_| "429 Too Many Requests").await;
        let client = FetchOptions::default().client().unwrap();

        let err = send_text(&FAST, || client.get(&url)).await.unwrap_err();
        assert!(matches!(&err, SourceError::Upstream { message } if message.contains("429")));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (url, hits) = serve(|_| "404 Not Found").await;
        let client = FetchOptions::default().client().unwrap();

        let err = send_text(&FAST, || client.get(&url)).await.unwrap_err();
        assert!(matches!(&err, SourceError::Upstream { message } if message.contains("404")));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_after_transient_failure() {
        let (url, hits) = serve(|n| {
            if n == 0 {
                "502 Bad Gateway"
            } else {
                "200 OK"
            }
        })
        .await;
        let client = FetchOptions::default().client().unwrap();

        let body = send_text(&FAST, || client.get(&url)).await.unwrap();
        assert_eq!(body, "ok");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let text = "é".repeat(BODY_PREVIEW_LEN + 10);
        assert_eq!(preview(&text).chars().count(), BODY_PREVIEW_LEN);
        assert_eq!(preview("short"), "short");
    }
}
