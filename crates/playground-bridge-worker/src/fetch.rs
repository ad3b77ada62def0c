//! Fetching the runtime module.
//!
//! A module comes from a file, an HTTP(S) URL (streamed, with a size cap) or
//! memory. Fetching sits behind the [`ModuleFetcher`] trait so embedders can
//! supply their own source, e.g. an asset bundle.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, instrument};
use url::Url;

use playground_bridge_common::BridgeError;

/// Where the runtime module comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSource {
    /// A `.wasm` (or `.wat`) file on disk.
    File(PathBuf),
    /// An `http` or `https` URL.
    Url(Url),
    /// A binary module already in memory.
    Bytes(Vec<u8>),
    /// A module in WebAssembly text format.
    Wat(String),
}

impl ModuleSource {
    /// Parse a path or URL as given on the command line or in a config file.
    ///
    /// # Errors
    ///
    /// Returns an error for an unparseable `http(s)://` URL or an empty value.
    pub fn parse(value: &str) -> Result<Self, BridgeError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(BridgeError::invalid_config("Module source is empty"));
        }

        if value.starts_with("http://") || value.starts_with("https://") {
            let url = Url::parse(value).map_err(|e| {
                BridgeError::invalid_config(format!("Invalid module URL '{value}': {e}"))
            })?;
            return Ok(Self::Url(url));
        }

        Ok(Self::File(PathBuf::from(value)))
    }

    /// Returns `true` if the fetched bytes are WebAssembly text.
    pub fn is_text(&self) -> bool {
        match self {
            ModuleSource::Wat(_) => true,
            ModuleSource::File(path) => path.extension().is_some_and(|ext| ext == "wat"),
            ModuleSource::Url(url) => url.path().ends_with(".wat"),
            ModuleSource::Bytes(_) => false,
        }
    }
}

impl std::fmt::Display for ModuleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleSource::File(path) => write!(f, "{}", path.display()),
            ModuleSource::Url(url) => write!(f, "{url}"),
            ModuleSource::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
            ModuleSource::Wat(_) => write!(f, "<inline wat>"),
        }
    }
}

/// Retrieves module bytes.
#[async_trait]
pub trait ModuleFetcher: Send + Sync {
    /// Fetch the bytes of `source`.
    async fn fetch(&self, source: &ModuleSource) -> Result<Vec<u8>, BridgeError>;
}

/// Fetcher for files and HTTP(S) URLs.
pub struct DefaultFetcher {
    client: Client,
    max_bytes: usize,
}

impl DefaultFetcher {
    /// Create a fetcher rejecting modules larger than `max_bytes`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(max_bytes: usize) -> Result<Self, BridgeError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("playground-bridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                BridgeError::invalid_config(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self::with_client(client, max_bytes))
    }

    /// Create with a custom HTTP client.
    pub fn with_client(client: Client, max_bytes: usize) -> Self {
        Self { client, max_bytes }
    }

    fn check_size(&self, source: &ModuleSource, len: usize) -> Result<(), BridgeError> {
        if len > self.max_bytes {
            return Err(BridgeError::fetch_failed(
                source.to_string(),
                format!("module exceeds {} bytes", self.max_bytes),
            ));
        }
        Ok(())
    }

    async fn fetch_file(
        &self,
        source: &ModuleSource,
        path: &Path,
    ) -> Result<Vec<u8>, BridgeError> {
        let fail =
            |e: std::io::Error| BridgeError::fetch_failed(source.to_string(), e.to_string());

        let metadata = tokio::fs::metadata(path).await.map_err(fail)?;
        self.check_size(source, usize::try_from(metadata.len()).unwrap_or(usize::MAX))?;

        tokio::fs::read(path).await.map_err(fail)
    }

    async fn fetch_url(&self, source: &ModuleSource, url: &Url) -> Result<Vec<u8>, BridgeError> {
        let fail =
            |e: reqwest::Error| BridgeError::fetch_failed(source.to_string(), e.to_string());

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(fail)?;

        if let Some(len) = response.content_length() {
            self.check_size(source, usize::try_from(len).unwrap_or(usize::MAX))?;
        }

        // Stream so an unannounced oversized body is cut off early
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(fail)? {
            self.check_size(source, bytes.len() + chunk.len())?;
            bytes.extend_from_slice(&chunk);
        }

        Ok(bytes)
    }
}

#[async_trait]
impl ModuleFetcher for DefaultFetcher {
    #[instrument(skip(self), fields(source = %source))]
    async fn fetch(&self, source: &ModuleSource) -> Result<Vec<u8>, BridgeError> {
        debug!("Fetching runtime module");

        let bytes = match source {
            ModuleSource::File(path) => self.fetch_file(source, path).await?,
            ModuleSource::Url(url) => self.fetch_url(source, url).await?,
            ModuleSource::Bytes(bytes) => bytes.clone(),
            ModuleSource::Wat(text) => text.clone().into_bytes(),
        };
        self.check_size(source, bytes.len())?;

        info!(bytes = bytes.len(), "Runtime module fetched");
        Ok(bytes)
    }
}
