// src/catalog/mod.rs
pub mod tmdb;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::error::CatalogFetchError;

/// A show airing today, as reported by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiringItem {
    pub id: u64,
    pub name: String,
}

impl AiringItem {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// One page of the airing-today query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPage {
    pub page: u32,
    pub total_pages: u32,
    pub items: Vec<AiringItem>,
}

/// Low-level paginated source. `fetch_page(1)` must report `total_pages`.
#[async_trait]
pub trait PageSource: Send + Sync + 'static {
    async fn fetch_page(&self, page: u32) -> Result<CatalogPage, CatalogFetchError>;
    fn name(&self) -> &'static str;
}

/// Everything airing today, pagination fully drained.
#[async_trait]
pub trait CatalogFetcher: Send + Sync {
    async fn fetch_airing_today(&self) -> Result<Vec<AiringItem>, CatalogFetchError>;
}

/// Drains a [`PageSource`]: page 1 first, then pages `2..=total_pages`
/// concurrently. Any failing page fails the whole fetch.
pub struct PagedCatalog<P> {
    source: Arc<P>,
}

impl<P: PageSource> PagedCatalog<P> {
    pub fn new(source: P) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    pub fn from_arc(source: Arc<P>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<P: PageSource> CatalogFetcher for PagedCatalog<P> {
    async fn fetch_airing_today(&self) -> Result<Vec<AiringItem>, CatalogFetchError> {
        let t0 = std::time::Instant::now();
        let provider = self.source.name();

        let first = self.source.fetch_page(1).await?;
        counter!("catalog_pages_fetched_total").increment(1);
        let total_pages = first.total_pages;
        tracing::info!(provider, total_pages, "catalog: total pages airing today");

        let mut items = first.items;
        let mut set = JoinSet::new();
        for page in 2..=total_pages {
            let source = Arc::clone(&self.source);
            set.spawn(async move { source.fetch_page(page).await });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(page)) => {
                    counter!("catalog_pages_fetched_total").increment(1);
                    items.extend(page.items);
                }
                Ok(Err(e)) => {
                    tracing::warn!(provider, error = %e, "catalog page failed; aborting fetch");
                    set.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    set.abort_all();
                    return Err(CatalogFetchError::Join(e.to_string()));
                }
            }
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("catalog_fetch_ms").record(ms);
        tracing::debug!(provider, items = items.len(), ms, "catalog fetch complete");
        Ok(items)
    }
}

// --- Test helper ---

/// In-memory page source. Pages are 1-based; `fail_page` makes that page error.
pub struct FixturePages {
    pages: Vec<Vec<AiringItem>>,
    fail_page: Option<u32>,
    pub requested: Mutex<Vec<u32>>,
}

impl FixturePages {
    pub fn new(pages: Vec<Vec<AiringItem>>) -> Self {
        Self {
            pages,
            fail_page: None,
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, page: u32) -> Self {
        self.fail_page = Some(page);
        self
    }
}

#[async_trait]
impl PageSource for FixturePages {
    async fn fetch_page(&self, page: u32) -> Result<CatalogPage, CatalogFetchError> {
        if let Ok(mut seen) = self.requested.lock() {
            seen.push(page);
        }
        if self.fail_page == Some(page) {
            return Err(CatalogFetchError::Status { page, status: 500 });
        }
        let items = self
            .pages
            .get(page.saturating_sub(1) as usize)
            .cloned()
            .unwrap_or_default();
        Ok(CatalogPage {
            page,
            total_pages: self.pages.len() as u32,
            items,
        })
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
