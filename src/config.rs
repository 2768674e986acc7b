//! Configuration for ticketdesk paths and tuning.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (TICKETDESK_HOME, TICKETDESK_DATABASE)
//! 2. Config file (.ticketdesk/config.yaml)
//! 3. Defaults (~/.ticketdesk)
//!
//! Config file discovery:
//! - Searches current directory and parents for .ticketdesk/config.yaml
//! - `home` is relative to the .ticketdesk/ directory; `database` and
//!   `mailbox` are relative to the project root (its parent)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::mailbox::DEFAULT_FETCH_LIMIT;
use crate::core::ContentionRetry;
use crate::ingest::IngestDefaults;
use crate::store::StoreSettings;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const CONFIG_DIR: &str = ".ticketdesk";
const CONFIG_NAME: &str = "config.yaml";
const DATABASE_NAME: &str = "ticketdesk.db";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub audit: ContentionRetry,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .ticketdesk/)
    pub home: Option<String>,
    /// SQLite database file (relative to project root)
    pub database: Option<String>,
    /// JSONL mailbox export (relative to project root)
    pub mailbox: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_priority")]
    pub default_priority: Option<String>,
    #[serde(default)]
    pub default_status_id: Option<i64>,
    #[serde(default = "default_category_id")]
    pub default_category_id: Option<i64>,
    #[serde(default)]
    pub default_assignee_id: Option<i64>,
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,
}

fn default_priority() -> Option<String> {
    IngestDefaults::default().priority
}

fn default_category_id() -> Option<i64> {
    IngestDefaults::default().category_id
}

fn default_fetch_limit() -> usize {
    DEFAULT_FETCH_LIMIT
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            default_priority: default_priority(),
            default_status_id: None,
            default_category_id: default_category_id(),
            default_assignee_id: None,
            fetch_limit: default_fetch_limit(),
        }
    }
}

impl IngestConfig {
    /// Ticket defaults applied by the ingestor
    pub fn defaults(&self) -> IngestDefaults {
        IngestDefaults {
            priority: self.default_priority.clone(),
            status_id: self.default_status_id,
            category_id: self.default_category_id,
            assignee_id: self.default_assignee_id,
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// State directory (sessions live under it)
    pub home: PathBuf,
    /// SQLite database file
    pub database: PathBuf,
    /// Default mailbox export for `ingest`
    pub mailbox: Option<PathBuf>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub store: StoreSettings,
    pub audit: ContentionRetry,
    pub ingest: IngestConfig,
}

impl ResolvedConfig {
    /// Directory holding persisted deletion sessions
    pub fn sessions_dir(&self) -> PathBuf {
        self.home.join("sessions")
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_NAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);

    load_config_from(&cwd, default_home, |key| std::env::var(key).ok())
}

/// Resolve configuration starting the file search at `start`.
fn load_config_from(
    start: &Path,
    default_home: PathBuf,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let config_file = find_config_file(start);

    let config = match config_file {
        Some(ref path) => Some(load_config_file(path)?),
        None => None,
    };

    // .ticketdesk/ and the project root it sits in
    let config_dir = config_file.as_deref().and_then(Path::parent);
    let base_dir = config_dir.and_then(Path::parent);

    let home = if let Some(env_home) = env("TICKETDESK_HOME") {
        PathBuf::from(env_home)
    } else if let (Some(dir), Some(home)) = (
        config_dir,
        config.as_ref().and_then(|c| c.paths.home.as_deref()),
    ) {
        resolve_path(dir, home)
    } else {
        default_home
    };

    let database = if let Some(env_db) = env("TICKETDESK_DATABASE") {
        PathBuf::from(env_db)
    } else if let (Some(dir), Some(db)) = (
        base_dir,
        config.as_ref().and_then(|c| c.paths.database.as_deref()),
    ) {
        resolve_path(dir, db)
    } else {
        home.join(DATABASE_NAME)
    };

    let mailbox = match (base_dir, config.as_ref().and_then(|c| c.paths.mailbox.as_deref())) {
        (Some(dir), Some(mailbox)) => Some(resolve_path(dir, mailbox)),
        _ => None,
    };

    let (store, audit, ingest) = match config {
        Some(c) => (c.store, c.audit, c.ingest),
        None => Default::default(),
    };

    Ok(ResolvedConfig {
        home,
        database,
        mailbox,
        config_file,
        store,
        audit,
        ingest,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write_config(root: &Path, body: &str) -> PathBuf {
        let dir = root.join(CONFIG_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_NAME);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{body}").unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let temp = TempDir::new().unwrap();
        let home = temp.path().join("default-home");

        let config = load_config_from(temp.path(), home.clone(), no_env).unwrap();

        assert_eq!(config.home, home);
        assert_eq!(config.database, home.join(DATABASE_NAME));
        assert_eq!(config.sessions_dir(), home.join("sessions"));
        assert!(config.config_file.is_none());
        assert!(config.mailbox.is_none());
        assert_eq!(config.audit, ContentionRetry::default());
        assert_eq!(config.store.busy_timeout_ms, 5000);
        assert_eq!(config.ingest.fetch_limit, DEFAULT_FETCH_LIMIT);
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            temp.path(),
            r#"
version: "1"
paths:
  home: ./state
  database: data/desk.db
  mailbox: inbox.jsonl
store:
  busy_timeout_ms: 250
audit:
  max_attempts: 5
ingest:
  default_status_id: 1
  fetch_limit: 25
"#,
        );

        let parsed = load_config_file(&path).unwrap();
        assert_eq!(parsed.version.as_deref(), Some("1"));
        assert_eq!(parsed.audit.max_attempts, 5);
        // Unset fields keep their defaults
        assert_eq!(parsed.audit.backoff_ms, 500);
        assert_eq!(parsed.ingest.default_priority.as_deref(), Some("normal"));

        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        let config = load_config_from(&nested, PathBuf::from("/unused"), no_env).unwrap();

        assert_eq!(config.config_file.as_deref(), Some(path.as_path()));
        assert!(config.home.ends_with("state"));
        assert!(config.database.ends_with("data/desk.db"));
        assert!(config.mailbox.as_ref().unwrap().ends_with("inbox.jsonl"));
        assert_eq!(config.store.busy_timeout_ms, 250);
        assert_eq!(config.ingest.defaults().status_id, Some(1));
        assert_eq!(config.ingest.fetch_limit, 25);
    }

    #[test]
    fn test_env_overrides_file() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "paths:\n  home: ./state\n  database: desk.db\n");

        let config = load_config_from(temp.path(), PathBuf::from("/unused"), |key| match key {
            "TICKETDESK_HOME" => Some("/srv/desk".to_string()),
            "TICKETDESK_DATABASE" => Some("/srv/desk/prod.db".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.home, PathBuf::from("/srv/desk"));
        assert_eq!(config.database, PathBuf::from("/srv/desk/prod.db"));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
