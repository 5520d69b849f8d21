use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{AiringItem, CatalogPage, PageSource};
use crate::config::CatalogConfig;
use crate::error::CatalogFetchError;

pub const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3";

#[derive(Debug, Deserialize)]
struct AiringTodayResponse {
    #[serde(default)]
    page: u32,
    #[serde(default)]
    total_pages: u32,
    #[serde(default)]
    results: Vec<TvResult>,
}

#[derive(Debug, Deserialize)]
struct TvResult {
    id: u64,
    #[serde(default)]
    name: String,
}

/// `GET {base}/tv/airing_today` against The Movie Database.
#[derive(Clone)]
pub struct TmdbPageSource {
    client: Client,
    base_url: String,
    api_key: String,
    language: String,
    timeout: Duration,
}

impl TmdbPageSource {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            language: "en-US".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(cfg: &CatalogConfig) -> Self {
        Self::new(cfg.base_url.clone(), cfg.api_key.clone())
            .with_language(cfg.language.clone())
            .with_timeout(cfg.timeout_secs)
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/tv/airing_today", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl PageSource for TmdbPageSource {
    async fn fetch_page(&self, page: u32) -> Result<CatalogPage, CatalogFetchError> {
        let page_param = page.to_string();
        // reqwest errors embed the URL; strip it so the api key never reaches logs.
        let rsp = self
            .client
            .get(self.endpoint())
            .timeout(self.timeout)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("language", self.language.as_str()),
                ("page", page_param.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CatalogFetchError::request(page, e.without_url()))?;

        let status = rsp.status();
        if !status.is_success() {
            return Err(CatalogFetchError::Status {
                page,
                status: status.as_u16(),
            });
        }

        let body: AiringTodayResponse = rsp
            .json()
            .await
            .map_err(|e| CatalogFetchError::decode(page, e.without_url()))?;

        tracing::debug!(
            page = body.page,
            total_pages = body.total_pages,
            results = body.results.len(),
            "tmdb page fetched"
        );

        Ok(CatalogPage {
            page,
            total_pages: body.total_pages,
            items: body
                .results
                .into_iter()
                .map(|r| AiringItem::new(r.id, r.name))
                .collect(),
        })
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}
