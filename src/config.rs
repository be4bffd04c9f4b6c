use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(name = "iscogram", about = "A server-rendered photo sharing application")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, env = "ISUCONP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, env = "ISUCONP_HOST")]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long, env = "ISUCONP_PORT")]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long, env = "ISUCONP_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Path to the SQLite database
    #[arg(long, env = "ISUCONP_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Directory served for unmatched paths; images are mirrored under `image/`
    #[arg(long, env = "ISUCONP_PUBLIC_DIR")]
    pub public_dir: Option<PathBuf>,

    /// Redis URL for the shared cache (in-process cache when unset)
    #[arg(long, env = "ISUCONP_CACHE_URL")]
    pub cache_url: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub auth: AuthConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub public_dir: Option<PathBuf>,
    /// Request body cap for uploads. Kept above the image size limit so an
    /// oversized image is answered with a notice instead of a 413.
    pub body_limit_bytes: usize,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub url: Option<String>,
    pub ttl_secs: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub cookie_name: String,
    pub session_hours: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            public_dir: None,
            body_limit_bytes: 32 * 1024 * 1024,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: None,
            ttl_secs: 10,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: "iscogram_session".to_string(),
            session_hours: 720,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI / environment overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(ref path) = cli.db_path {
            config.database.path = Some(path.clone());
        }
        if let Some(ref dir) = cli.public_dir {
            config.storage.public_dir = Some(dir.clone());
        }
        if let Some(ref url) = cli.cache_url {
            config.cache.url = Some(url.clone());
        }

        // Resolve paths relative to data dir
        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("iscogram.db"));
        }
        if config.storage.public_dir.is_none() {
            config.storage.public_dir = Some(data_dir.join("public"));
        }

        Ok(config)
    }

    /// Config rooted at `dir`, with every path resolved. Used by tests and tooling.
    pub fn rooted_at(dir: &std::path::Path) -> Self {
        let mut config = Config::default();
        config.database.path = Some(dir.join("iscogram.db"));
        config.storage.public_dir = Some(dir.join("public"));
        config
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".iscogram")
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("iscogram.db"))
    }

    pub fn public_dir(&self) -> PathBuf {
        self.storage
            .public_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("public"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_for(dir: &std::path::Path) -> Cli {
        Cli {
            data_dir: Some(dir.to_path_buf()),
            ..Cli::default()
        }
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.cookie_name, "iscogram_session");
        assert_eq!(config.auth.session_hours, 720);
        assert_eq!(config.cache.ttl_secs, 10);
        assert!(config.cache.url.is_none());
        assert!(config.storage.body_limit_bytes > 10 * 1024 * 1024);
        assert!(config.database.path.is_none());
        assert!(config.storage.public_dir.is_none());
    }

    #[test]
    fn data_dir_uses_cli_override() {
        let cli = cli_for(std::path::Path::new("/tmp/test-iscogram"));
        assert_eq!(Config::data_dir(&cli), PathBuf::from("/tmp/test-iscogram"));
    }

    #[test]
    fn data_dir_defaults_to_home_dot_iscogram() {
        let dir = Config::data_dir(&Cli::default());
        assert!(dir.ends_with(".iscogram"));
    }

    #[test]
    fn load_with_no_config_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load(&cli_for(tmp.path())).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.db_path(), tmp.path().join("iscogram.db"));
        assert_eq!(config.public_dir(), tmp.path().join("public"));
    }

    #[test]
    fn load_applies_cli_overrides() {
        let tmp = tempfile::tempdir().unwrap();
        let cli = Cli {
            host: Some("127.0.0.1".to_string()),
            port: Some(9090),
            db_path: Some(PathBuf::from("/var/lib/iscogram/app.db")),
            cache_url: Some("redis://127.0.0.1:6379".to_string()),
            ..cli_for(tmp.path())
        };
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/iscogram/app.db"));
        assert_eq!(config.cache.url.as_deref(), Some("redis://127.0.0.1:6379"));
    }

    #[test]
    fn load_reads_toml_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[server]
port = 9000

[cache]
ttl_secs = 30

[auth]
cookie_name = "my_cookie"
"#,
        )
        .unwrap();

        let cli = Cli {
            config: Some(config_path),
            ..cli_for(tmp.path())
        };
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.cache.ttl_secs, 30);
        assert_eq!(config.auth.cookie_name, "my_cookie");
        assert_eq!(config.auth.session_hours, 720);
    }

    #[test]
    fn cli_overrides_beat_toml_values() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(&config_path, "[server]\nhost = \"192.168.1.1\"\nport = 9000\n").unwrap();

        let cli = Cli {
            config: Some(config_path),
            host: Some("10.0.0.1".to_string()),
            port: Some(4000),
            ..cli_for(tmp.path())
        };
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.server.host, "10.0.0.1");
        assert_eq!(config.server.port, 4000);
    }
}
