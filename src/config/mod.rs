//! Hub configuration
//!
//! Resolved in layers: defaults, then the TOML file, then environment
//! variables (after loading `.env`), then command-line flags applied by the
//! binary.

mod file;

use std::path::PathBuf;

pub use file::{HubConfigFile, config_file_path, load_config_file, load_from};

use crate::peers::Peers;
use crate::{Error, Result};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8000;

/// Resolved hub configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Edge server base addresses, validated and deduplicated
    pub peers: Vec<String>,
    pub server: ServerConfig,
    /// Snapshot file, `None` when persistence is disabled
    pub snapshot: Option<PathBuf>,
    /// Scan all peers at startup
    pub reconcile_on_start: bool,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Bearer key required on peer routes; open access when unset
    pub api_key: Option<String>,
}

impl Config {
    /// Load configuration from the config file and the process environment
    ///
    /// # Errors
    ///
    /// Returns error if a configured peer address is invalid
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }

        let fc = load_config_file();
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a configured peer address is invalid
    pub fn resolve(fc: HubConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // Peers (env > toml > none)
        let peers = match env("HUB_PEERS").or_else(|| env("SERVERS")) {
            Some(raw) => parse_peers(raw.split(','))?,
            None => parse_peers(fc.peers.unwrap_or_default())?,
        };
        if peers.is_empty() {
            tracing::warn!("no peers configured");
        }

        // API server config (env > toml > default)
        let server = ServerConfig {
            port: env("HUB_PORT")
                .or_else(|| env("PORT"))
                .and_then(|s| s.trim().parse().ok())
                .or(fc.server.port)
                .unwrap_or(DEFAULT_PORT),
            api_key: env("HUB_API_KEY")
                .or(fc.server.api_key)
                .filter(|k| !k.is_empty()),
        };

        let snapshot_disabled = env("HUB_SNAPSHOT_DISABLED").is_some_and(|v| is_truthy(&v))
            || fc.snapshot.enabled == Some(false);
        let snapshot = if snapshot_disabled {
            None
        } else {
            Some(
                env("HUB_SNAPSHOT_PATH")
                    .map(PathBuf::from)
                    .or(fc.snapshot.path)
                    .unwrap_or_else(default_snapshot_path),
            )
        };

        let reconcile_on_start = env("HUB_RECONCILE_ON_START")
            .map(|v| is_truthy(&v))
            .or(fc.reconcile.on_start)
            .unwrap_or(true);

        Ok(Self {
            peers,
            server,
            snapshot,
            reconcile_on_start,
        })
    }

    /// Replace the peer list
    ///
    /// # Errors
    ///
    /// Returns error if an address is invalid
    pub fn set_peers<I, S>(&mut self, peers: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.peers = parse_peers(peers)?;
        Ok(())
    }

    /// The peer set used at runtime
    #[must_use]
    pub fn peer_set(&self) -> Peers {
        Peers::new(&self.peers)
    }
}

/// Validate and normalize peer addresses, dropping blanks and duplicates
///
/// # Errors
///
/// Returns [`Error::Config`] if an address is not an http(s) URL
pub fn parse_peers<I, S>(raw: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut peers: Vec<String> = Vec::new();
    for address in raw {
        let address = address.as_ref().trim().trim_end_matches('/');
        if address.is_empty() {
            continue;
        }

        let url = url::Url::parse(address)
            .map_err(|e| Error::Config(format!("invalid peer address {address}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "peer address {address} must use http or https"
            )));
        }

        if !peers.iter().any(|p| p == address) {
            peers.push(address.to_string());
        }
    }
    Ok(peers)
}

/// Default snapshot location: `~/.local/share/machine-hub/machines.json`
#[must_use]
pub fn default_snapshot_path() -> PathBuf {
    directories::BaseDirs::new()
        .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("machine-hub"))
        .join("machines.json")
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::resolve(HubConfigFile::default(), env_of(&[])).unwrap();
        assert!(config.peers.is_empty());
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert!(config.server.api_key.is_none());
        assert!(config.snapshot.is_some());
        assert!(config.reconcile_on_start);
    }

    #[test]
    fn env_overrides_file() {
        let fc: HubConfigFile = toml::from_str(
            r#"
            peers = ["http://file:8000"]
            [server]
            port = 9000
            "#,
        )
        .unwrap();

        let config = Config::resolve(
            fc,
            env_of(&[
                ("HUB_PEERS", "http://a:8000/, http://b:8000"),
                ("PORT", "7000"),
                ("HUB_API_KEY", "k"),
            ]),
        )
        .unwrap();

        assert_eq!(config.peers, vec!["http://a:8000", "http://b:8000"]);
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.api_key.as_deref(), Some("k"));
    }

    #[test]
    fn legacy_servers_variable() {
        let config =
            Config::resolve(HubConfigFile::default(), env_of(&[("SERVERS", "http://x:1")])).unwrap();
        assert_eq!(config.peers, vec!["http://x:1"]);
    }

    #[test]
    fn snapshot_can_be_disabled() {
        let config = Config::resolve(
            HubConfigFile::default(),
            env_of(&[("HUB_SNAPSHOT_DISABLED", "true")]),
        )
        .unwrap();
        assert!(config.snapshot.is_none());

        let config = Config::resolve(
            HubConfigFile::default(),
            env_of(&[("HUB_SNAPSHOT_PATH", "/var/lib/hub/m.json")]),
        )
        .unwrap();
        assert_eq!(config.snapshot, Some(PathBuf::from("/var/lib/hub/m.json")));
    }

    #[test]
    fn rejects_bad_peers() {
        assert!(matches!(parse_peers(["not a url"]), Err(Error::Config(_))));
        assert!(matches!(parse_peers(["ftp://a"]), Err(Error::Config(_))));
    }

    #[test]
    fn dedupes_peers_in_order() {
        let peers = parse_peers(["http://b", " http://a/", "", "http://b/"]).unwrap();
        assert_eq!(peers, vec!["http://b", "http://a"]);
    }

    #[test]
    fn set_peers_validates() {
        let mut config = Config::resolve(HubConfigFile::default(), env_of(&[])).unwrap();
        config.set_peers(["http://a:8000"]).unwrap();
        assert_eq!(config.peer_set().len(), 1);
        assert!(config.set_peers(["nope"]).is_err());
    }
}
