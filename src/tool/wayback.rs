use super::base::{parse_params, Tool, ToolContext, ToolError, ToolResult};
use crate::fetch::normalize_url;
use crate::transport::ConnectionPool;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const DEFAULT_BASE_URL: &str = "https://archive.org/wayback/available";
const FIRST_ARCHIVE_YEAR: i32 = 1995;

/// Wayback Machine lookup tool
pub struct WaybackTool {
    pool: Arc<ConnectionPool>,
    base_url: String,
}

impl WaybackTool {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self::with_base_url(pool, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(pool: Arc<ConnectionPool>, base_url: impl Into<String>) -> Self {
        Self {
            pool,
            base_url: base_url.into(),
        }
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(31, |last| last.day())
}

/// `YYYYMMDD` for the requested date, clamped into the archive's range
///
/// Returns `None` unless all three parts are given.
pub(crate) fn archive_timestamp(year: i32, month: u32, day: u32, current_year: i32) -> Option<String> {
    if year <= 0 || month == 0 || day == 0 {
        return None;
    }
    let year = year.clamp(FIRST_ARCHIVE_YEAR, current_year.max(FIRST_ARCHIVE_YEAR));
    let month = month.clamp(1, 12);
    let day = day.clamp(1, days_in_month(year, month));
    Some(format!("{year:04}{month:02}{day:02}"))
}

/// `20240102030405` -> `2024-01-02 03:04:05 UTC`; unparsable input is kept
pub(crate) fn format_snapshot_time(raw: &str) -> String {
    NaiveDateTime::parse_from_str(raw, "%Y%m%d%H%M%S")
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

#[derive(Debug, Deserialize)]
struct WaybackParams {
    url: String,
    #[serde(default)]
    year: i32,
    #[serde(default)]
    month: u32,
    #[serde(default)]
    day: u32,
}

#[async_trait::async_trait]
impl Tool for WaybackTool {
    fn id(&self) -> &str {
        "search_archived_webpage"
    }

    fn description(&self) -> &str {
        "Find an archived copy of a web page on the Wayback Machine. \
         Give year, month and day to get the snapshot closest to that date \
         (dates are clamped to the archive's range); omit them for the latest."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "Page URL"},
                "year": {"type": "integer", "description": "Year of the wanted snapshot (optional)"},
                "month": {"type": "integer", "description": "Month 1-12 (optional)"},
                "day": {"type": "integer", "description": "Day of month (optional)"}
            },
            "required": ["url"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let params: WaybackParams = parse_params(params)?;
        let url = normalize_url(&params.url)?;
        let timestamp = archive_timestamp(params.year, params.month, params.day, Utc::now().year());

        tracing::debug!(
            request_id = %ctx.request_id,
            url = %url,
            timestamp = ?timestamp,
            "wayback lookup"
        );

        let upstream = |message: String| ToolError::Upstream {
            service: "wayback",
            message,
        };

        let mut query = vec![("url", url.clone())];
        if let Some(ts) = &timestamp {
            query.push(("timestamp", ts.clone()));
        }

        let client = self.pool.client().map_err(|e| upstream(e.to_string()))?;
        let response = self
            .pool
            .execute(client.get(&self.base_url).query(&query))
            .await
            .map_err(|e| upstream(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(upstream(format!("HTTP {status}")));
        }
        let text = response.text().await.map_err(|e| upstream(e.to_string()))?;
        if text.trim().is_empty() {
            return Err(upstream("archive.org returned an empty response".to_string()));
        }
        let data: Value = serde_json::from_str(&text)
            .map_err(|e| upstream(format!("invalid JSON from archive.org: {e}")))?;

        let closest = &data["archived_snapshots"]["closest"];
        if closest.is_null() {
            let body = json!({
                "original_url": url,
                "status": "not_found",
                "content": format!("No archived versions found for '{url}'"),
            });
            return Ok(ToolResult::json(format!("No snapshot for {url}"), &body)
                .with_metadata("status", json!("not_found")));
        }

        if !closest["available"].as_bool().unwrap_or(true) {
            let body = json!({
                "original_url": url,
                "status": "unavailable",
                "content": "Snapshot exists but is not available",
            });
            return Ok(ToolResult::json(format!("Snapshot of {url} unavailable"), &body)
                .with_metadata("status", json!("unavailable")));
        }

        let archived_url = closest["url"].as_str().unwrap_or_default();
        let archived_at = format_snapshot_time(closest["timestamp"].as_str().unwrap_or_default());

        let body = json!({
            "original_url": url,
            "archived_url": archived_url,
            "archived_timestamp": archived_at,
            "requested_timestamp": timestamp,
            "status": "found",
        });

        Ok(ToolResult::json(format!("Snapshot of {url} from {archived_at}"), &body)
            .with_metadata("status", json!("found"))
            .with_metadata("archived_url", json!(archived_url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_is_clamped() {
        assert_eq!(archive_timestamp(1990, 5, 10, 2026).as_deref(), Some("19950510"));
        assert_eq!(archive_timestamp(2099, 13, 40, 2026).as_deref(), Some("20261231"));
        assert_eq!(archive_timestamp(2023, 2, 30, 2026).as_deref(), Some("20230228"));
        assert_eq!(archive_timestamp(2024, 2, 30, 2026).as_deref(), Some("20240229"));
    }

    #[test]
    fn partial_dates_mean_latest() {
        assert_eq!(archive_timestamp(2020, 0, 1, 2026), None);
        assert_eq!(archive_timestamp(0, 1, 1, 2026), None);
    }

    #[test]
    fn snapshot_time_formatting() {
        assert_eq!(format_snapshot_time("20240102030405"), "2024-01-02 03:04:05 UTC");
        assert_eq!(format_snapshot_time("garbage"), "garbage");
    }
}
