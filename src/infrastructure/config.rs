use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use std::net::SocketAddr;
use std::path::PathBuf;
use url::Url;

const DEFAULT_DATA_DIR: &str = ".data";
const DEFAULT_LISTEN: &str = "127.0.0.1:3000";
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_STATE_DIR_NAME: &str = "pomosync";

const REST_URL_KEYS: &[&str] = &[
    "POMOSYNC_KV_REST_URL",
    "KV_REST_API_URL",
    "UPSTASH_REDIS_REST_URL",
];
const REST_TOKEN_KEYS: &[&str] = &[
    "POMOSYNC_KV_REST_TOKEN",
    "KV_REST_API_TOKEN",
    "UPSTASH_REDIS_REST_TOKEN",
];
const STORE_KIND_KEYS: &[&str] = &["POMOSYNC_STORE"];
const DATA_DIR_KEYS: &[&str] = &["POMOSYNC_DATA_DIR"];
const TIMEZONE_KEYS: &[&str] = &["POMOSYNC_TIMEZONE"];
const LISTEN_KEYS: &[&str] = &["POMOSYNC_LISTEN"];
const BASE_URL_KEYS: &[&str] = &["POMOSYNC_BASE_URL"];
const STATE_DIR_KEYS: &[&str] = &["POMOSYNC_STATE_DIR"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Rest { url: Url, token: String },
    File { root: PathBuf },
    Memory,
}

impl StoreConfig {
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Rest { .. } => "rest",
            Self::File { .. } => "file",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub store: StoreConfig,
    pub timezone: Tz,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: Url,
    pub state_dir: PathBuf,
}

pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

pub fn load_server_config_from_env() -> Result<ServerConfig, InfraError> {
    load_server_config_from_lookup(env_lookup)
}

pub fn load_server_config_from_lookup<F>(lookup: F) -> Result<ServerConfig, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let listen_raw =
        optional_lookup_value(&lookup, LISTEN_KEYS).unwrap_or_else(|| DEFAULT_LISTEN.to_string());
    let listen = parse_listen_addr(&listen_raw)?;
    let timezone = optional_lookup_value(&lookup, TIMEZONE_KEYS)
        .map(|raw| parse_timezone(&raw))
        .transpose()?
        .unwrap_or(Tz::UTC);

    Ok(ServerConfig {
        listen,
        store: load_store_config_from_lookup(&lookup)?,
        timezone,
    })
}

pub fn load_store_config_from_lookup<F>(lookup: &F) -> Result<StoreConfig, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let url = optional_lookup_value(lookup, REST_URL_KEYS);
    let token = optional_lookup_value(lookup, REST_TOKEN_KEYS);
    let data_dir = optional_lookup_value(lookup, DATA_DIR_KEYS)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

    let credentials = match (url, token) {
        (Some(url), Some(token)) => Some((parse_rest_url(&url)?, token)),
        (None, None) => None,
        (Some(_), None) => {
            return Err(InfraError::InvalidConfig(format!(
                "store url is set but the token is missing (set one of: {})",
                REST_TOKEN_KEYS.join(", ")
            )));
        }
        (None, Some(_)) => {
            return Err(InfraError::InvalidConfig(format!(
                "store token is set but the url is missing (set one of: {})",
                REST_URL_KEYS.join(", ")
            )));
        }
    };

    let forced = optional_lookup_value(lookup, STORE_KIND_KEYS).map(|raw| raw.to_ascii_lowercase());
    match (forced.as_deref(), credentials) {
        (None | Some("rest"), Some((url, token))) => Ok(StoreConfig::Rest { url, token }),
        (Some("rest"), None) => Err(InfraError::InvalidConfig(format!(
            "POMOSYNC_STORE=rest requires credentials (set one of: {})",
            REST_URL_KEYS.join(", ")
        ))),
        (None | Some("file"), _) => Ok(StoreConfig::File { root: data_dir }),
        (Some("memory"), _) => Ok(StoreConfig::Memory),
        (Some(other), _) => Err(InfraError::InvalidConfig(format!(
            "unsupported POMOSYNC_STORE '{other}' (expected rest, file or memory)"
        ))),
    }
}

pub fn load_client_config_from_env() -> Result<ClientConfig, InfraError> {
    load_client_config_from_lookup(env_lookup)
}

pub fn load_client_config_from_lookup<F>(lookup: F) -> Result<ClientConfig, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let base_url = optional_lookup_value(&lookup, BASE_URL_KEYS)
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let state_dir = optional_lookup_value(&lookup, STATE_DIR_KEYS)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_STATE_DIR_NAME));

    Ok(ClientConfig {
        base_url: parse_base_url(&base_url)?,
        state_dir,
    })
}

/// Normalizes to a trailing slash so `Url::join` keeps any path prefix.
pub fn parse_base_url(raw: &str) -> Result<Url, InfraError> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&with_slash)
        .map_err(|error| InfraError::InvalidConfig(format!("invalid base url '{raw}': {error}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(InfraError::InvalidConfig(format!(
            "base url '{raw}' must use http or https"
        )));
    }
    Ok(url)
}

pub fn parse_listen_addr(raw: &str) -> Result<SocketAddr, InfraError> {
    raw.trim().parse().map_err(|error| {
        InfraError::InvalidConfig(format!("invalid listen address '{raw}': {error}"))
    })
}

pub fn parse_timezone(raw: &str) -> Result<Tz, InfraError> {
    raw.trim()
        .parse::<Tz>()
        .map_err(|error| InfraError::InvalidConfig(format!("invalid timezone '{raw}': {error}")))
}

fn parse_rest_url(raw: &str) -> Result<Url, InfraError> {
    let url = Url::parse(raw.trim_end_matches('/'))
        .map_err(|error| InfraError::InvalidConfig(format!("invalid store url '{raw}': {error}")))?;
    if url.cannot_be_a_base() {
        return Err(InfraError::InvalidConfig(format!(
            "store url '{raw}' cannot be a base"
        )));
    }
    Ok(url)
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(value) = lookup(key) {
            let normalized = value.trim();
            if !normalized.is_empty() {
                return Some(normalized.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(
        pairs: &'static [(&'static str, &'static str)],
    ) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(candidate, _)| *candidate == key)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn defaults_select_file_store_and_utc() {
        let config = load_server_config_from_lookup(|_| None).expect("load defaults");
        assert_eq!(config.listen, "127.0.0.1:3000".parse::<SocketAddr>().expect("addr"));
        assert_eq!(
            config.store,
            StoreConfig::File {
                root: PathBuf::from(".data")
            }
        );
        assert_eq!(config.timezone, Tz::UTC);
    }

    #[test]
    fn credentials_select_rest_store_with_alias_keys() {
        let config = load_server_config_from_lookup(lookup_from(&[
            ("KV_REST_API_URL", "https://kv.example.com/"),
            ("UPSTASH_REDIS_REST_TOKEN", " secret "),
        ]))
        .expect("load rest config");
        match config.store {
            StoreConfig::Rest { url, token } => {
                assert_eq!(url.as_str(), "https://kv.example.com/");
                assert_eq!(token, "secret");
            }
            other => panic!("expected rest store, got {other:?}"),
        }
    }

    #[test]
    fn half_configured_credentials_are_rejected() {
        let result = load_server_config_from_lookup(lookup_from(&[(
            "POMOSYNC_KV_REST_URL",
            "https://kv.example.com",
        )]));
        match result {
            Err(InfraError::InvalidConfig(message)) => assert!(message.contains("token")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn forced_backend_overrides_credentials() {
        let config = load_server_config_from_lookup(lookup_from(&[
            ("POMOSYNC_KV_REST_URL", "https://kv.example.com"),
            ("POMOSYNC_KV_REST_TOKEN", "secret"),
            ("POMOSYNC_STORE", "memory"),
        ]))
        .expect("load forced memory config");
        assert_eq!(config.store, StoreConfig::Memory);

        let result = load_server_config_from_lookup(lookup_from(&[("POMOSYNC_STORE", "rest")]));
        assert!(matches!(result, Err(InfraError::InvalidConfig(_))));
    }

    #[test]
    fn invalid_timezone_is_reported() {
        let result =
            load_server_config_from_lookup(lookup_from(&[("POMOSYNC_TIMEZONE", "Mars/Base")]));
        match result {
            Err(InfraError::InvalidConfig(message)) => assert!(message.contains("Mars/Base")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn client_config_keeps_base_path_prefix() {
        let config = load_client_config_from_lookup(lookup_from(&[
            ("POMOSYNC_BASE_URL", "https://focus.example.com/api"),
            ("POMOSYNC_STATE_DIR", "/var/lib/pomosync"),
        ]))
        .expect("load client config");
        assert_eq!(
            config.base_url.join("sync-state").expect("join").as_str(),
            "https://focus.example.com/api/sync-state"
        );
        assert_eq!(config.state_dir, PathBuf::from("/var/lib/pomosync"));
    }

    #[test]
    fn base_url_requires_http_scheme() {
        assert!(parse_base_url("ftp://example.com").is_err());
        assert!(parse_base_url("not a url").is_err());
    }
}
