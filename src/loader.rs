//! Catalog and values loading.
//!
//! Handles loading JSON from files, strings, and HTTP URLs.

use std::path::Path;

use serde_json::{Map, Value};

use crate::catalog::Catalog;
use crate::error::LoadError;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Load JSON from a file path.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist,
/// or `LoadError::InvalidJson` if the file isn't valid JSON.
pub fn load_json(path: &Path) -> Result<Value, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    load_json_str(&content)
}

/// Load JSON from a string.
///
/// # Errors
///
/// Returns `LoadError::InvalidJson` if the string isn't valid JSON.
pub fn load_json_str(content: &str) -> Result<Value, LoadError> {
    serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })
}

/// Load JSON from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `LoadError::NetworkError` if the request fails, the server
/// answers with an error status, or the body isn't valid JSON.
#[cfg(feature = "remote")]
pub fn load_json_url(url: &str) -> Result<Value, LoadError> {
    let network = |source| LoadError::NetworkError {
        url: url.to_string(),
        source,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(network)?;

    tracing::debug!(%url, "fetching remote document");
    client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.json())
        .map_err(network)
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load JSON from a file path or URL.
///
/// URL loading requires the `remote` feature.
pub fn load_json_auto(source: &str) -> Result<Value, LoadError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_json_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(LoadError::FileNotFound {
                path: std::path::PathBuf::from(source),
            })
        }
    } else {
        load_json(Path::new(source))
    }
}

/// Build a catalog from an already-parsed JSON document.
///
/// # Errors
///
/// Returns `LoadError::InvalidCatalog` if the document doesn't have the
/// catalog shape (unknown permission names, scalar kinds, or keys).
pub fn parse_catalog(value: Value) -> Result<Catalog, LoadError> {
    serde_json::from_value(value).map_err(|source| LoadError::InvalidCatalog { source })
}

/// Load a catalog from a file path or URL.
pub fn load_catalog(source: &str) -> Result<Catalog, LoadError> {
    let catalog = parse_catalog(load_json_auto(source)?)?;
    tracing::debug!(%source, entities = catalog.entity_ids().count(), "loaded catalog");
    Ok(catalog)
}

/// Load a values bag given inline (`{...}`), or as a file path or URL.
///
/// # Errors
///
/// Returns `LoadError::InvalidJson` if the document isn't a JSON object.
pub fn load_values(source: &str) -> Result<Map<String, Value>, LoadError> {
    let value = if source.trim_start().starts_with('{') {
        load_json_str(source)?
    } else {
        load_json_auto(source)?
    };
    serde_json::from_value(value).map_err(|source| LoadError::InvalidJson { source })
}
