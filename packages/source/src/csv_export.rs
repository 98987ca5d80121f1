//! Full-dataset CSV export fetcher.
//!
//! The ENERGY STAR portal serves each dataset as a single CSV file
//! (`/api/views/{dataset_id}/rows.csv?accessType=DOWNLOAD`). The file is
//! downloaded in one request, parsed with headers in the first row, and
//! sent through the channel in fixed-size pages so that downstream stages
//! see the same shape as a paginated fetch.

use std::sync::Arc;

use efficiency_index_source_models::RawRecord;
use tokio::sync::mpsc;

use crate::progress::ProgressCallback;
use crate::{FetchOptions, SourceError, retry};

/// Rows per page sent through the channel.
const CSV_PAGE_SIZE: usize = 5_000;

/// Configuration for the CSV export fetcher.
pub struct CsvExportConfig<'a> {
    /// Export URL.
    pub url: &'a str,
    /// Human-readable label for log messages.
    pub label: &'a str,
    /// Field delimiter (default: comma).
    pub delimiter: Option<&'a str>,
}

/// Downloads a CSV export and sends its rows through `tx`.
///
/// Returns the total number of records sent.
///
/// # Errors
///
/// Returns [`SourceError`] if the download fails after all retries or the
/// CSV cannot be parsed.
pub async fn fetch_csv_export(
    config: &CsvExportConfig<'_>,
    options: &FetchOptions,
    tx: &mpsc::Sender<Vec<RawRecord>>,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<u64, SourceError> {
    log::info!("[{}] Downloading CSV export: {}", config.label, config.url);

    let client = options.client()?;
    let body = retry::send_text(&options.retry, || client.get(config.url)).await?;
    log::debug!("[{}] Downloaded {} bytes", config.label, body.len());

    let delimiter = config
        .delimiter
        .and_then(|d| d.as_bytes().first().copied())
        .unwrap_or(b',');
    let records = parse_csv(&body, delimiter, options.limit)?;
    let total = records.len() as u64;
    progress.set_total(total);

    let mut rows = records.into_iter().peekable();
    while rows.peek().is_some() {
        let page: Vec<RawRecord> = rows.by_ref().take(CSV_PAGE_SIZE).collect();
        progress.inc(page.len() as u64);
        if tx.send(page).await.is_err() {
            log::warn!("[{}] Receiver dropped, stopping fetch", config.label);
            break;
        }
    }

    log::info!("[{}] Parsed {total} records from CSV", config.label);
    Ok(total)
}

/// Parses CSV text into raw records keyed by the (trimmed) header row.
///
/// # Errors
///
/// Returns [`SourceError`] if the CSV is malformed or has no header row.
pub fn parse_csv(
    text: &str,
    delimiter: u8,
    limit: Option<u64>,
) -> Result<Vec<RawRecord>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_owned())
        .collect();

    if headers.iter().all(String::is_empty) {
        return Err(SourceError::Upstream {
            message: "CSV file contains no header row".to_owned(),
        });
    }

    let mut records = Vec::new();
    for result in reader.records() {
        if limit.is_some_and(|max| records.len() as u64 >= max) {
            break;
        }
        let row = result?;
        let map: serde_json::Map<String, serde_json::Value> = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let value = row.get(i).unwrap_or("").trim().to_owned();
                (header.clone(), serde_json::Value::String(value))
            })
            .collect();
        records.push(RawRecord::new(serde_json::Value::Object(map)));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Brand Name,Model Number,Annual Energy Use (kWh/yr)\n\
                          WHIRLPOOL,WRF555,\"1,012\"\n\
                          LG,LRMVS3006S,647\n";

    #[test]
    fn parses_rows_keyed_by_header() {
        let records = parse_csv(SAMPLE, b',', None).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].get("Annual Energy Use (kWh/yr)"),
            Some(&serde_json::json!("1,012"))
        );
        assert_eq!(records[1].get("Brand Name"), Some(&serde_json::json!("LG")));
    }

    #[test]
    fn respects_limit() {
        let records = parse_csv(SAMPLE, b',', Some(1)).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn strips_byte_order_mark() {
        let text = "\u{feff}Brand Name,Model Number\nGE,GTE18\n";
        let records = parse_csv(text, b',', None).unwrap();
        assert_eq!(records[0].get("Brand Name"), Some(&serde_json::json!("GE")));
    }

    #[test]
    fn empty_header_is_rejected() {
        assert!(parse_csv("\n", b',', None).is_err());
    }
}
