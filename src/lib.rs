#![allow(async_fn_in_trait)]
pub mod auth;
pub mod batch;
pub mod catalog;
pub mod download;
pub mod error;
pub mod query;
pub mod settings;

pub use auth::{BearerToken, Credentials, TokenProvider, TokenSource};
pub use batch::{BatchOrchestrator, BatchReport, BatchRequest};
pub use catalog::{CatalogClient, ProductDescriptor};
pub use download::{DownloadOutcome, ProductDownloader};
pub use query::{AreaOfInterest, CatalogQuery, DateRange};
pub use settings::Settings;
