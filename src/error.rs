use thiserror::Error;

#[derive(Error, Debug)]
pub enum ObrError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Invalid version range: {0}")]
    InvalidVersionRange(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ObrError>;
