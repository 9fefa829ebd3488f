use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthenticationError {
    #[error("token request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("token request to {endpoint} was rejected with status {status}: {body}")]
    Rejected {
        endpoint: String,
        status: StatusCode,
        body: String,
    },
    #[error("token response from {endpoint} has no access_token: {reason}")]
    MalformedResponse { endpoint: String, reason: String },
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("catalog request to {url} returned status {status}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("unable to parse catalog response from {url}: {reason}")]
    Parse { url: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("no access token for product {id}: {source}")]
    Authentication {
        id: String,
        #[source]
        source: AuthenticationError,
    },
    #[error("request for product {id} at {url} failed: {source}")]
    Request {
        id: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("product {id} at {url} sent no response within {secs}s")]
    Timeout { id: String, url: String, secs: u64 },
    #[error("product {id} at {url} returned status {status}")]
    Status {
        id: String,
        url: String,
        status: StatusCode,
    },
    #[error("unable to create {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("streaming product {id} into {} failed: {source}", path.display())]
    Stream {
        id: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that end a run before any download is attempted.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("unable to prepare target directory {}: {source}", path.display())]
    TargetDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("unable to write report to {}: {reason}", path.display())]
    Report { path: PathBuf, reason: String },
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("unable to read settings from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("unable to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
