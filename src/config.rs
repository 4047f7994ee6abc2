// Secrets file loading and token resolution. The config file is a single
// JSON object with a `token` field and nothing else; the command line
// always wins over it.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("opening config file {path:?}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("config file {0:?} is empty")]
    Empty(PathBuf),
    #[error("decoding config {path:?}: {source}")]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("config file {0:?} contains multiple JSON values")]
    MultipleValues(PathBuf),
    #[error("no API token provided: specify it via --token flag or in the config file")]
    MissingToken,
    #[error("the base URL must not be empty")]
    EmptyBaseUrl,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub token: Option<String>,
}

/// Load the config file at `path`. A missing (`None`) or blank path
/// yields an empty config.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(path) if !path.as_os_str().is_empty() => path,
        _ => return Ok(Config::default()),
    };

    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut values = serde_json::Deserializer::from_str(&data).into_iter::<Config>();
    let config = match values.next() {
        None => return Err(ConfigError::Empty(path.to_path_buf())),
        Some(Err(source)) => {
            return Err(ConfigError::Decode {
                path: path.to_path_buf(),
                source,
            })
        }
        Some(Ok(config)) => config,
    };

    match values.next() {
        None => Ok(config),
        Some(Ok(_)) => Err(ConfigError::MultipleValues(path.to_path_buf())),
        Some(Err(source)) => Err(ConfigError::Decode {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Pick the token to send: the command line value if it is not blank,
/// otherwise the config file's.
pub fn resolve_token(cli: Option<&str>, config: &Config) -> Result<String, ConfigError> {
    [cli, config.token.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or(ConfigError::MissingToken)
}

/// Trim the base URL and drop trailing slashes.
pub fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let url = raw.trim().trim_end_matches('/');
    if url.is_empty() {
        return Err(ConfigError::EmptyBaseUrl);
    }
    Ok(url.to_string())
}

/// Turn a raw credential into an `Authorization` header value.
///
/// Values that already carry a scheme (`Bearer x`, `Token x`, any
/// `Scheme credentials` pair) pass through untouched. A glued
/// `Bearer<token>` gets its missing space back and a bare token is
/// prefixed with `Bearer `. A lone `Bearer` has no credentials to wrap
/// and is returned as is.
pub fn normalize_authorization(raw: &str) -> String {
    let value = raw.trim();
    if value.is_empty() {
        return String::new();
    }
    if value.contains(char::is_whitespace) || value.eq_ignore_ascii_case("bearer") {
        return value.to_string();
    }
    let glued = value
        .get(..6)
        .filter(|prefix| prefix.eq_ignore_ascii_case("bearer"))
        .map(|_| &value[6..])
        .filter(|rest| !rest.is_empty());
    match glued {
        Some(rest) => format!("Bearer {}", rest),
        None => format!("Bearer {}", value),
    }
}
