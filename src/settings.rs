//! Endpoint and timeout configuration, read from an optional TOML file.
use crate::error::SettingsError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

const IDENTITY_URL: &str =
    "https://identity.dataspace.copernicus.eu/auth/realms/CDSE/protocol/openid-connect/token";
const CATALOG_URL: &str = "https://catalogue.dataspace.copernicus.eu/odata/v1/Products";
const DOWNLOAD_URL: &str = "https://zipper.dataspace.copernicus.eu/odata/v1";
const CLIENT_ID: &str = "cdse-public";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// OpenID Connect token endpoint.
    pub identity_url: Url,
    /// OData `Products` collection used for searching.
    pub catalog_url: Url,
    /// OData root of the product-retrieval service; `Products({id})/$value` is appended.
    pub download_url: Url,
    pub client_id: String,
    pub connect_timeout_secs: u64,
    /// Whole-request limit for the token and catalog calls.
    pub request_timeout_secs: u64,
    /// Longest wait for the next chunk of a product body.
    pub stall_timeout_secs: u64,
    /// Sent as `$top` when set; the server default page size applies otherwise.
    pub max_results: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            identity_url: Url::parse(IDENTITY_URL).expect("Default identity url should parse"),
            catalog_url: Url::parse(CATALOG_URL).expect("Default catalog url should parse"),
            download_url: Url::parse(DOWNLOAD_URL).expect("Default download url should parse"),
            client_id: CLIENT_ID.to_string(),
            connect_timeout_secs: 30,
            request_timeout_secs: 120,
            stall_timeout_secs: 300,
            max_results: None,
        }
    }
}

impl Settings {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }

    /// Client shared by every call of a run. No overall timeout is set here
    /// because product archives can take a long time to stream.
    pub fn http_client(&self) -> Result<reqwest::Client, SettingsError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;
        Ok(client)
    }

    /// `GET` target for one product archive.
    pub fn product_url(&self, id: &str) -> String {
        format!(
            "{}/Products({id})/$value",
            self.download_url.as_str().trim_end_matches('/')
        )
    }
}
