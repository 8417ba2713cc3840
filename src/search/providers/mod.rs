//! Thin HTTP clients for each supported search backend.
//!
//! Providers only translate a query into the backend's wire format and
//! classify failures; they never track health or retry.

pub mod bing;
pub mod brave;
pub mod duckduckgo;
pub mod exa;
pub mod google;
pub mod jina;
pub mod serper;

pub use bing::BingSearchProvider;
pub use brave::BraveSearchProvider;
pub use duckduckgo::DuckDuckGoSearchProvider;
pub use exa::ExaSearchProvider;
pub use google::GoogleSearchProvider;
pub use jina::JinaSearchProvider;
pub use serper::SerperSearchProvider;

use crate::config::EnginesConfig;
use crate::search::{SearchError, SearchProvider};
use crate::transport::{ConnectionPool, PooledResponse};
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;

/// Every enabled provider, in registration order
pub fn build_all(pool: &Arc<ConnectionPool>, engines: &EnginesConfig) -> Vec<Arc<dyn SearchProvider>> {
    let mut providers: Vec<Arc<dyn SearchProvider>> = Vec::new();

    if engines.google.enabled {
        providers.push(Arc::new(GoogleSearchProvider::new(Arc::clone(pool), &engines.google)));
    }
    if engines.serper.enabled {
        providers.push(Arc::new(SerperSearchProvider::new(Arc::clone(pool), &engines.serper)));
    }
    if engines.jina.enabled {
        providers.push(Arc::new(JinaSearchProvider::new(Arc::clone(pool), &engines.jina)));
    }
    if engines.exa.enabled {
        providers.push(Arc::new(ExaSearchProvider::new(Arc::clone(pool), &engines.exa)));
    }
    if engines.duckduckgo.enabled {
        providers.push(Arc::new(DuckDuckGoSearchProvider::new(
            Arc::clone(pool),
            &engines.duckduckgo,
        )));
    }
    if engines.brave.enabled {
        providers.push(Arc::new(BraveSearchProvider::new(Arc::clone(pool), &engines.brave)));
    }
    if engines.bing.enabled {
        providers.push(Arc::new(BingSearchProvider::new(Arc::clone(pool), &engines.bing)));
    }

    providers
}

/// Map a non-2xx status to a provider error
///
/// Some APIs answer 403 for an exhausted quota, so the body decides
/// between an auth failure and a rate limit.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> SearchError {
    let lower = body.to_lowercase();
    let mentions_limit = ["quota", "rate limit", "ratelimit", "rate_limit", "too many requests"]
        .iter()
        .any(|needle| lower.contains(needle));

    match status.as_u16() {
        429 => SearchError::RateLimitExceeded,
        401 | 403 if mentions_limit => SearchError::RateLimitExceeded,
        401 | 403 => SearchError::InvalidApiKey,
        _ => SearchError::ApiError(format!("HTTP {}: {}", status, truncate(body, 200))),
    }
}

/// Check the status and decode a JSON body
pub(crate) async fn read_json(provider: &str, response: PooledResponse) -> Result<Value, SearchError> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();

        tracing::warn!(
            provider = %provider,
            status = %status,
            error = %truncate(&error_text, 200),
            "search api error"
        );

        return Err(classify_status(status, &error_text));
    }

    Ok(response.json::<Value>().await?)
}

pub(crate) fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value[key].as_str().unwrap_or("")
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
