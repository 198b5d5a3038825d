//! Retrieval of repository documents from `file` and `http(s)` URLs.

use std::io::Read;

use tracing::debug;
use url::Url;

use crate::error::{ObrError, Result};

pub struct Fetcher {
    http: reqwest::blocking::Client,
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| ObrError::Fetch(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Raw bytes behind a URL.
    pub fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        debug!(url = %url, "fetching");
        match url.scheme() {
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| ObrError::InvalidPath(url.to_string()))?;
                Ok(std::fs::read(path)?)
            }
            "http" | "https" => {
                let response = self
                    .http
                    .get(url.clone())
                    .send()
                    .map_err(|e| ObrError::Fetch(format!("HTTP request failed: {e}")))?
                    .error_for_status()
                    .map_err(|e| ObrError::Fetch(format!("HTTP status error: {e}")))?;
                let bytes = response
                    .bytes()
                    .map_err(|e| ObrError::Fetch(format!("Failed to read response: {e}")))?;
                Ok(bytes.to_vec())
            }
            other => Err(ObrError::Fetch(format!("unsupported URL scheme: {other}"))),
        }
    }

    /// Fetches a repository document, unpacking `.zip` and `.gz` wrappers.
    /// Detection is by URL path extension; a zip document must contain a
    /// member literally named `repository.xml`.
    pub fn fetch_document(&self, url: &Url) -> Result<Vec<u8>> {
        let bytes = self.fetch(url)?;
        match extension(url) {
            Some("zip") => extract_repository_entry(&bytes),
            Some("gz") => decompress_gz(&bytes),
            _ => Ok(bytes),
        }
    }
}

fn extension(url: &Url) -> Option<&str> {
    url.path().rsplit_once('.').map(|(_, extension)| extension)
}

fn extract_repository_entry(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.name() == "repository.xml" {
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents)?;
            return Ok(contents);
        }
    }
    Err(ObrError::Fetch(
        "no repository.xml entry in zip document".into(),
    ))
}

fn decompress_gz(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::read::GzDecoder;
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}
