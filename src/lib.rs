pub mod bundle;
pub mod config;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod manifest;
pub mod model;
pub mod repoxml;
pub mod version;
