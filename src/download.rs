//! Streams one product archive to disk using a freshly issued token.
use crate::auth::{Credentials, TokenSource};
use crate::catalog::ProductDescriptor;
use crate::error::DownloadError;
use crate::settings::Settings;
use futures_util::{Stream, StreamExt, TryStreamExt};
use reqwest::Client;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info};

/// Largest single write that reaches the destination file.
pub const CHUNK_SIZE: usize = 8192;

#[derive(Debug)]
pub enum DownloadOutcome {
    Succeeded { path: PathBuf, bytes: u64 },
    Skipped { reason: String },
    Failed(DownloadError),
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Copies `stream` into `writer` in pieces of at most `CHUNK_SIZE` bytes,
/// dropping empty chunks. The buffer is flushed whether or not the copy
/// succeeds. Returns the number of bytes written.
pub async fn write_chunks<S, B, W>(stream: S, writer: W, stall: Duration) -> io::Result<u64>
where
    S: Stream<Item = io::Result<B>>,
    B: AsRef<[u8]>,
    W: AsyncWrite + Unpin,
{
    let mut out = BufWriter::with_capacity(CHUNK_SIZE, writer);
    let copied = copy_chunks(stream, &mut out, stall).await;
    let flushed = out.flush().await;
    let bytes = copied?;
    flushed?;
    Ok(bytes)
}

async fn copy_chunks<S, B, W>(stream: S, out: &mut W, stall: Duration) -> io::Result<u64>
where
    S: Stream<Item = io::Result<B>>,
    B: AsRef<[u8]>,
    W: AsyncWrite + Unpin,
{
    let mut stream = std::pin::pin!(stream);
    let mut byte_count = 0_u64;
    loop {
        let next = tokio::time::timeout(stall, stream.next())
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no data received for {}s", stall.as_secs()),
                )
            })?;
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk?;
        let bytes = chunk.as_ref();
        if bytes.is_empty() {
            continue;
        }
        for piece in bytes.chunks(CHUNK_SIZE) {
            out.write_all(piece).await?;
        }
        byte_count += bytes.len() as u64;
    }
    Ok(byte_count)
}

/// Returns why `name` cannot be used as a file name inside the target directory.
fn unusable_name(name: &str) -> Option<&'static str> {
    if name.trim().is_empty() {
        Some("product name is empty")
    } else if name.contains('/') || name.contains('\\') {
        Some("product name contains a path separator")
    } else if name == "." || name == ".." {
        Some("product name is a relative path component")
    } else {
        None
    }
}

pub struct ProductDownloader<T> {
    client: Client,
    tokens: T,
    settings: Settings,
}

impl<T: TokenSource> ProductDownloader<T> {
    pub fn new(client: Client, tokens: T, settings: Settings) -> Self {
        Self {
            client,
            tokens,
            settings,
        }
    }

    pub fn destination(target_dir: &Path, product: &ProductDescriptor) -> PathBuf {
        target_dir.join(format!("{}.zip", product.name))
    }

    /// Never returns an error: every failure is folded into the outcome so the
    /// caller can move on to the next product.
    pub async fn download(
        &self,
        product: &ProductDescriptor,
        credentials: &Credentials,
        target_dir: &Path,
    ) -> DownloadOutcome {
        if let Some(reason) = unusable_name(&product.name) {
            return DownloadOutcome::Skipped {
                reason: reason.to_string(),
            };
        }
        let path = Self::destination(target_dir, product);
        match self.try_download(product, credentials, &path).await {
            Ok(bytes) => DownloadOutcome::Succeeded { path, bytes },
            Err(e) => DownloadOutcome::Failed(e),
        }
    }

    async fn try_download(
        &self,
        product: &ProductDescriptor,
        credentials: &Credentials,
        path: &Path,
    ) -> Result<u64, DownloadError> {
        let token = self
            .tokens
            .acquire_token(credentials)
            .await
            .map_err(|source| DownloadError::Authentication {
                id: product.id.clone(),
                source,
            })?;

        let url = self.settings.product_url(&product.id);
        let wait = self.settings.stall_timeout();
        let request = self.client.get(&url).bearer_auth(token.secret()).send();
        let response = tokio::time::timeout(wait, request)
            .await
            .map_err(|_| DownloadError::Timeout {
                id: product.id.clone(),
                url: url.clone(),
                secs: wait.as_secs(),
            })?
            .map_err(|source| DownloadError::Request {
                id: product.id.clone(),
                url: url.clone(),
                source,
            })?;
        drop(token);

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                id: product.id.clone(),
                url,
                status,
            });
        }

        match product.content_length.or(response.content_length()) {
            Some(size) => info!("Downloading {} ({} bytes)", product.name, size),
            None => info!("Downloading {}", product.name),
        }

        let file = File::create(path)
            .await
            .map_err(|source| DownloadError::Create {
                path: path.to_path_buf(),
                source,
            })?;

        let body = response.bytes_stream().map_err(io::Error::other);
        let bytes = write_chunks(body, file, self.settings.stall_timeout())
            .await
            .map_err(|source| DownloadError::Stream {
                id: product.id.clone(),
                path: path.to_path_buf(),
                source,
            })?;
        debug!(bytes, path = %path.display(), "Download complete");
        Ok(bytes)
    }
}
