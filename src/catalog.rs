//! OData catalog search and result parsing.
use crate::error::CatalogError;
use crate::query::CatalogQuery;
use crate::settings::Settings;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// One catalog record, in the order the server returned it.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ProductDescriptor {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ContentLength", default)]
    pub content_length: Option<u64>,
}

impl ProductDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content_length: None,
        }
    }
}

#[derive(Deserialize)]
struct CatalogPage {
    value: Vec<ProductDescriptor>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

/// Keeps the descriptors whose name contains `level`, case-sensitive.
pub fn filter_by_level(products: Vec<ProductDescriptor>, level: &str) -> Vec<ProductDescriptor> {
    products
        .into_iter()
        .filter(|p| p.name.contains(level))
        .collect()
}

pub struct CatalogClient {
    client: Client,
    url: Url,
    top: Option<u32>,
    timeout: Duration,
}

impl CatalogClient {
    pub fn new(client: Client, settings: &Settings) -> Self {
        Self {
            client,
            url: settings.catalog_url.clone(),
            top: settings.max_results,
            timeout: settings.request_timeout(),
        }
    }

    pub fn page_size(&self) -> Option<u32> {
        self.top
    }

    /// Search URL with the query appended. Spaces are sent as `%20` rather
    /// than the form-encoded `+`.
    pub fn search_url(&self, query: &CatalogQuery) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().extend_pairs(query.params());
        // A literal '+' is encoded as %2B, so every '+' left is a space.
        let encoded = url.query().map(|q| q.replace('+', "%20"));
        url.set_query(encoded.as_deref());
        url
    }

    /// Only the first page of results is consumed.
    pub async fn search(
        &self,
        query: &CatalogQuery,
    ) -> Result<Vec<ProductDescriptor>, CatalogError> {
        debug!(filter = %query.filter, "Searching catalog");
        let response = self
            .client
            .get(self.search_url(query))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|source| CatalogError::Request {
                url: self.url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
            return Err(CatalogError::Status {
                url: self.url.to_string(),
                status,
                body,
            });
        }

        let text = response.text().await.map_err(|source| CatalogError::Request {
            url: self.url.to_string(),
            source,
        })?;
        self.parse(&text)
    }

    fn parse(&self, text: &str) -> Result<Vec<ProductDescriptor>, CatalogError> {
        let page: CatalogPage = serde_json::from_str(text).map_err(|e| CatalogError::Parse {
            url: self.url.to_string(),
            reason: e.to_string(),
        })?;
        if let Some(next) = page.next_link {
            warn!(
                next = %next,
                "Catalog has more results than one page; only the first {} are used",
                page.value.len()
            );
        }
        Ok(page.value)
    }
}
