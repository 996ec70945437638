// src/ingest/providers/shopify.rs
//! Shopify Admin REST client for cursor-paginated collections.
//!
//! Auth goes in an `Authorization: Basic` header. Transport errors, 429 and
//! 5xx are retried per page with exponential backoff; anything else fails the
//! page immediately.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use reqwest::header::{self, HeaderMap};
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;

use crate::config::SyncConfig;
use crate::entity::Record;
use crate::error::FetchError;
use crate::ingest::types::{Page, PageRequest, PageSource, PAGE_SIZE};
use crate::window::format_ts;

const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct ShopifyClient {
    http: Client,
    base: Url,
    api_key: String,
    api_secret: String,
    max_retries: u8,
    retry_base: Duration,
}

impl ShopifyClient {
    /// `base` is the versioned admin root, e.g. `https://shop.myshopify.com/admin/api/2021-07/`.
    pub fn new(base: Url, api_key: String, api_secret: String, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("order-sync/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()
            .context("build reqwest client")?;
        Ok(Self {
            http,
            base: with_trailing_slash(base),
            api_key,
            api_secret,
            max_retries: 3,
            retry_base: Duration::from_millis(500),
        })
    }

    pub fn from_config(cfg: &SyncConfig) -> Result<Self> {
        Ok(Self::new(
            cfg.shop_base_url.clone(),
            cfg.api_key.clone(),
            cfg.api_secret.clone(),
            cfg.http_timeout,
        )?
        .with_retries(cfg.max_retries, cfg.retry_base))
    }

    pub fn with_retries(mut self, retries: u8, base: Duration) -> Self {
        self.max_retries = retries;
        self.retry_base = base;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn first_page_url(
        &self,
        resource: &str,
        window: &crate::window::TimeWindow,
        fields: &[String],
    ) -> Result<Url, FetchError> {
        let mut url = self
            .base
            .join(&format!("{resource}.json"))
            .map_err(|e| FetchError::MalformedBody(format!("bad collection url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("limit", &PAGE_SIZE.to_string())
            .append_pair("status", "any")
            .append_pair("updated_at_min", &format_ts(window.start()))
            .append_pair("updated_at_max", &format_ts(window.end()))
            .append_pair("fields", &fields.join(","));
        Ok(url)
    }

    /// The cursor URL with `limit` reset to the page size; everything else the
    /// server put in it (the cursor itself) stays.
    fn next_page_url(&self, cursor: &str) -> Result<Url, FetchError> {
        let mut url =
            Url::parse(cursor).map_err(|_| FetchError::ForeignCursor(cursor.to_string()))?;
        if url.origin() != self.base.origin() {
            return Err(FetchError::ForeignCursor(cursor.to_string()));
        }
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != "limit")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair("limit", &PAGE_SIZE.to_string());
        Ok(url)
    }

    fn backoff(&self, attempt: u8) -> Duration {
        let shift = u32::from(attempt.saturating_sub(1)).min(10);
        self.retry_base.saturating_mul(1u32 << shift)
    }

    async fn get_with_retry(&self, url: &Url) -> Result<reqwest::Response, FetchError> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .http
                .get(url.clone())
                .basic_auth(&self.api_key, Some(&self.api_secret))
                .header(header::ACCEPT, "application/json")
                .send()
                .await;

            let wait = match res {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if !retryable || attempt > self.max_retries {
                        return Err(FetchError::Status {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }
                    tracing::warn!(
                        target: "sync",
                        status = status.as_u16(),
                        attempt,
                        "source API error, retrying"
                    );
                    retry_after(status, resp.headers()).unwrap_or_else(|| self.backoff(attempt))
                }
                Err(e) => {
                    if attempt > self.max_retries {
                        return Err(FetchError::Transport(e));
                    }
                    tracing::warn!(target: "sync", error = %e, attempt, "source API request failed, retrying");
                    self.backoff(attempt)
                }
            };

            counter!("sync_fetch_retries_total").increment(1);
            tokio::time::sleep(wait).await;
        }
    }
}

#[async_trait]
impl PageSource for ShopifyClient {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError> {
        let url = match request {
            PageRequest::First {
                resource,
                window,
                fields,
            } => self.first_page_url(resource, window, fields)?,
            PageRequest::Next { cursor, .. } => self.next_page_url(cursor)?,
        };
        tracing::debug!(target: "sync", url = %url, "GET page");

        let resp = self.get_with_retry(&url).await?;
        let next = match resp.headers().get(header::LINK) {
            Some(v) => {
                let raw = v.to_str().map_err(|_| {
                    FetchError::MalformedBody("Link header is not visible ASCII".to_string())
                })?;
                next_link(raw)?
            }
            None => None,
        };
        let body = resp.bytes().await?;
        let records = parse_page_body(&body, request.resource())?;

        Ok(Page { records, next })
    }

    fn name(&self) -> &'static str {
        "shopify"
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn retry_after(status: StatusCode, headers: &HeaderMap) -> Option<Duration> {
    if status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    let secs: f64 = headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(secs.min(MAX_RETRY_AFTER.as_secs_f64())))
}

/// Split a `Link` header into its link-values. Commas inside `<...>` belong
/// to the target URI and do not separate entries.
fn link_values(header: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_target = false;
    let mut start = 0;
    for (i, c) in header.char_indices() {
        match c {
            '<' => in_target = true,
            '>' => in_target = false,
            ',' if !in_target => {
                out.push(&header[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&header[start..]);
    out
}

fn is_rel_next(params: &str) -> bool {
    params.split(';').any(|p| match p.split_once('=') {
        Some((k, v)) if k.trim().eq_ignore_ascii_case("rel") => v
            .trim()
            .trim_matches('"')
            .split_whitespace()
            .any(|r| r.eq_ignore_ascii_case("next")),
        _ => false,
    })
}

/// The `rel="next"` target of a `Link` header, if any.
/// Format: `<url>; rel="previous", <url>; rel="next"`
///
/// A `rel="next"` entry without a usable `<url>` is an error, never "no more pages".
pub fn next_link(link: &str) -> Result<Option<String>, FetchError> {
    for value in link_values(link) {
        let value = value.trim();
        let (target, params) = match value.strip_prefix('<').and_then(|r| r.split_once('>')) {
            Some((t, p)) => (Some(t.trim()), p),
            None => (None, value.split_once(';').map_or("", |(_, p)| p)),
        };
        if !is_rel_next(params) {
            continue;
        }
        return match target {
            Some(url) if !url.is_empty() => Ok(Some(url.to_string())),
            _ => Err(FetchError::MalformedBody(format!(
                "unparseable next link `{value}`"
            ))),
        };
    }
    Ok(None)
}

/// `{"<resource>": [ {...}, ... ]}` into records.
pub fn parse_page_body(body: &[u8], resource: &str) -> Result<Vec<Record>, FetchError> {
    let v: Value = serde_json::from_slice(body)
        .map_err(|e| FetchError::MalformedBody(format!("invalid JSON: {e}")))?;
    let items = v
        .get(resource)
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::MalformedBody(format!("missing `{resource}` array")))?;
    items
        .iter()
        .map(|item| {
            item.as_object()
                .cloned()
                .ok_or_else(|| FetchError::MalformedBody(format!("`{resource}` item is not an object")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::TimeWindow;
    use chrono::{TimeZone, Utc};

    fn client() -> ShopifyClient {
        ShopifyClient::new(
            Url::parse("https://shop.example.com/admin/api/2021-07").unwrap(),
            "key".into(),
            "secret".into(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn link_header_next_is_extracted() {
        let h = r#"<https://s.example.com/a.json?page_info=p1&limit=250>; rel="previous", <https://s.example.com/a.json?page_info=n2&limit=250>; rel="next""#;
        assert_eq!(
            next_link(h).unwrap().as_deref(),
            Some("https://s.example.com/a.json?page_info=n2&limit=250")
        );
        assert_eq!(
            next_link(r#"<https://s.example.com/a.json?page_info=p1>; rel="previous""#).unwrap(),
            None
        );
    }

    #[test]
    fn comma_inside_next_url_is_kept() {
        let next = "https://s.example.com/admin/api/2021-07/orders.json?limit=250&fields=id,updated_at&page_info=n2";
        let h = format!(
            r#"<https://s.example.com/admin/api/2021-07/orders.json?fields=id,updated_at&page_info=p1>; rel="previous", <{next}>; rel="next""#
        );
        assert_eq!(next_link(&h).unwrap().as_deref(), Some(next));
        assert_eq!(
            next_link(&format!(r#"<{next}>; rel="next""#)).unwrap().as_deref(),
            Some(next)
        );
    }

    #[test]
    fn unparseable_next_entry_is_an_error() {
        assert!(matches!(
            next_link(r#"https://s.example.com/a.json?page_info=n2; rel="next""#),
            Err(FetchError::MalformedBody(_))
        ));
        assert!(matches!(
            next_link(r#"<>; rel="next""#),
            Err(FetchError::MalformedBody(_))
        ));
    }

    #[test]
    fn retry_after_applies_to_429_only_and_is_capped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::RETRY_AFTER, "120".parse().unwrap());
        assert_eq!(
            retry_after(StatusCode::TOO_MANY_REQUESTS, &headers),
            Some(Duration::from_secs(60))
        );
        assert_eq!(retry_after(StatusCode::SERVICE_UNAVAILABLE, &headers), None);

        headers.insert(header::RETRY_AFTER, "2".parse().unwrap());
        assert_eq!(
            retry_after(StatusCode::TOO_MANY_REQUESTS, &headers),
            Some(Duration::from_secs(2))
        );

        headers.insert(header::RETRY_AFTER, "soon".parse().unwrap());
        assert_eq!(retry_after(StatusCode::TOO_MANY_REQUESTS, &headers), None);
    }

    #[test]
    fn first_page_url_carries_filters() {
        let c = client();
        let window = TimeWindow::new(
            Utc.with_ymd_and_hms(2021, 9, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2021, 9, 2, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let url = c
            .first_page_url("orders", &window, &["id".into(), "updated_at".into()])
            .unwrap();
        assert_eq!(url.path(), "/admin/api/2021-07/orders.json");
        let q: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(q.contains(&("limit".into(), "250".into())));
        assert!(q.contains(&("status".into(), "any".into())));
        assert!(q.contains(&("updated_at_min".into(), "2021-09-01T00:00:00+00:00".into())));
        assert!(q.contains(&("updated_at_max".into(), "2021-09-02T00:00:00+00:00".into())));
        assert!(q.contains(&("fields".into(), "id,updated_at".into())));
    }

    #[test]
    fn next_page_url_keeps_cursor_and_resets_limit() {
        let c = client();
        let url = c
            .next_page_url("https://shop.example.com/admin/api/2021-07/orders.json?limit=50&page_info=abc")
            .unwrap();
        let q: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            q,
            vec![
                ("page_info".to_string(), "abc".to_string()),
                ("limit".to_string(), "250".to_string())
            ]
        );
    }

    #[test]
    fn cursor_on_another_host_is_refused() {
        let c = client();
        let err = c
            .next_page_url("https://evil.example.net/admin/api/2021-07/orders.json?page_info=abc")
            .unwrap_err();
        assert!(matches!(err, FetchError::ForeignCursor(_)));
    }

    #[test]
    fn body_without_collection_is_malformed() {
        assert!(matches!(
            parse_page_body(br#"{"errors": "Not Found"}"#, "orders"),
            Err(FetchError::MalformedBody(_))
        ));
        assert!(matches!(
            parse_page_body(b"<html>", "orders"),
            Err(FetchError::MalformedBody(_))
        ));
        let ok = parse_page_body(br#"{"orders": [{"id": 1}, {"id": 2}]}"#, "orders").unwrap();
        assert_eq!(ok.len(), 2);
    }

    #[test]
    fn backoff_doubles() {
        let c = client().with_retries(3, Duration::from_millis(100));
        assert_eq!(c.backoff(1), Duration::from_millis(100));
        assert_eq!(c.backoff(2), Duration::from_millis(200));
        assert_eq!(c.backoff(3), Duration::from_millis(400));
    }
}
