//! Socrata SODA API fetcher.
//!
//! Pages through `{portal}/resource/{dataset_id}.json` with `$limit`,
//! `$offset` and a stable `$order` column, sending each page through the
//! channel as soon as it arrives.

use std::sync::Arc;

use efficiency_index_source_models::RawRecord;
use tokio::sync::mpsc;

use crate::progress::ProgressCallback;
use crate::{FetchOptions, SourceError, retry};

/// Configuration for a Socrata fetch operation.
pub struct SocrataConfig<'a> {
    /// Resource URL (e.g., `"https://data.energystar.gov/resource/p5st-her9.json"`).
    pub api_url: &'a str,
    /// Column used for `$order` so that paging is stable.
    pub order_column: &'a str,
    /// Label for log messages.
    pub label: &'a str,
    /// Records per page.
    pub page_size: u64,
}

/// Fetches every page of a SODA dataset and sends it through `tx`.
///
/// Returns the total number of records sent.
///
/// # Errors
///
/// Returns [`SourceError`] if an HTTP request fails after all retries or a
/// page is not a JSON array.
pub async fn fetch_socrata(
    config: &SocrataConfig<'_>,
    options: &FetchOptions,
    tx: &mpsc::Sender<Vec<RawRecord>>,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<u64, SourceError> {
    let client = options.client()?;
    let fetch_limit = options.limit.unwrap_or(u64::MAX);
    let mut offset: u64 = 0;

    loop {
        let remaining = fetch_limit.saturating_sub(offset);
        if remaining == 0 {
            break;
        }
        let page_limit = remaining.min(config.page_size);

        log::info!(
            "[{}] Fetching SODA page: offset={offset}, limit={page_limit}",
            config.label
        );
        let params = [
            ("$limit", page_limit.to_string()),
            ("$offset", offset.to_string()),
            ("$order", config.order_column.to_string()),
        ];
        let body = retry::send_json(&options.retry, || {
            client.get(config.api_url).query(&params)
        })
        .await?;

        let serde_json::Value::Array(rows) = body else {
            return Err(SourceError::Upstream {
                message: format!("{}: SODA response is not a JSON array", config.label),
            });
        };

        let count = rows.len() as u64;
        if count == 0 {
            break;
        }
        offset += count;
        progress.inc(count);

        let page: Vec<RawRecord> = rows.into_iter().map(RawRecord::new).collect();
        if tx.send(page).await.is_err() {
            log::warn!("[{}] Receiver dropped, stopping fetch", config.label);
            break;
        }

        if count < page_limit {
            break;
        }
    }

    log::info!("[{}] Downloaded {offset} records", config.label);
    Ok(offset)
}
