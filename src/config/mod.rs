use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::models::{SortSpec, Table};

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "Lifeboard";
const APP_NAME: &str = "lifeboard";

pub const CONFIG_ENV: &str = "LIFEBOARD_CONFIG";
pub const DATA_ENV: &str = "LIFEBOARD_DATA";
pub const ANON_KEY_ENV: &str = "LIFEBOARD_ANON_KEY";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn with_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            self.write_default_config(&default_cfg)?;
            default_cfg.post_load(&self.paths)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load(&self.paths)?;
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub state_dir: PathBuf,
    pub session_file: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let override_data = env::var(DATA_ENV).ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let data_root = override_data.unwrap_or_else(|| project_dirs.data_dir().to_path_buf());
        let state_dir = project_dirs
            .state_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| data_root.join("state"));

        Ok(Self::from_roots(config_dir, config_file, data_root, state_dir))
    }

    /// Lays out every path under explicit roots.
    pub fn from_roots(
        config_dir: PathBuf,
        config_file: PathBuf,
        data_dir: PathBuf,
        state_dir: PathBuf,
    ) -> Self {
        Self {
            config_dir,
            config_file,
            database_path: data_dir.join("lifeboard.db"),
            session_file: state_dir.join("session.json"),
            data_dir,
            state_dir,
        }
    }

    /// Everything under a single directory; used by tests and portable installs.
    pub fn under(root: &Path) -> Self {
        let config_dir = root.join("config");
        Self::from_roots(
            config_dir.clone(),
            config_dir.join("config.toml"),
            root.join("data"),
            root.join("state"),
        )
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.data_dir, &self.state_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendOptions,
    pub storage: StorageOptions,
    pub views: ViewOptions,
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) -> Result<()> {
        self.storage
            .resolve(paths)
            .context("resolving storage paths")?;
        if let Ok(key) = env::var(ANON_KEY_ENV) {
            if !key.trim().is_empty() {
                self.backend.anon_key = Some(key.trim().to_string());
            }
        }
        self.views.prune_unknown_tables();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Embedded SQLite emulation of the hosted service.
    #[default]
    Local,
    /// Hosted PostgREST/GoTrue project.
    Remote,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendOptions {
    pub kind: BackendKind,
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            kind: BackendKind::Local,
            url: None,
            anon_key: None,
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    #[serde(skip)]
    pub database_path: PathBuf,
    pub wal_autocheckpoint: u32,
    pub busy_timeout_ms: u64,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            wal_autocheckpoint: 1000,
            busy_timeout_ms: 5000,
        }
    }
}

impl StorageOptions {
    fn resolve(&mut self, paths: &ConfigPaths) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewOptions {
    /// Maximum rows printed by list commands (0 = no limit).
    pub list_limit: usize,
    /// Per-table default sort, keyed by table name.
    pub sort: BTreeMap<String, SortSpec>,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            list_limit: 100,
            sort: BTreeMap::new(),
        }
    }
}

impl ViewOptions {
    pub fn sort_for(&self, table: Table) -> Option<SortSpec> {
        self.sort.get(table.name()).copied()
    }

    fn prune_unknown_tables(&mut self) {
        self.sort.retain(|name, _| {
            let known = Table::from_str(name).is_ok();
            if !known {
                tracing::warn!(table = %name, "unknown table in views.sort, ignoring");
            }
            known
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SortDirection, SortField};
    use tempfile::TempDir;

    #[test]
    fn first_run_writes_default_config() -> Result<()> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::under(temp.path());
        let loader = ConfigLoader::with_paths(paths.clone());
        let config = loader.load_or_init()?;
        assert!(paths.config_file.exists());
        assert_eq!(config.backend.kind, BackendKind::Local);
        assert_eq!(config.storage.database_path, paths.database_path);

        let reloaded = loader.load()?;
        assert_eq!(reloaded.views.list_limit, config.views.list_limit);
        Ok(())
    }

    #[test]
    fn parses_remote_backend_and_sort_overrides() -> Result<()> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::under(temp.path());
        paths.ensure_directories()?;
        fs::write(
            &paths.config_file,
            r#"
[backend]
kind = "remote"
url = "https://project.example.co"
timeout_secs = 5

[views.sort]
notes = { field = "title", direction = "ascending" }
gadgets = { field = "title" }
"#,
        )?;
        let config = ConfigLoader::with_paths(paths).load()?;
        assert_eq!(config.backend.kind, BackendKind::Remote);
        assert_eq!(config.backend.url.as_deref(), Some("https://project.example.co"));
        assert_eq!(
            config.views.sort_for(Table::Notes),
            Some(SortSpec::new(SortField::Title, SortDirection::Ascending))
        );
        assert!(!config.views.sort.contains_key("gadgets"));
        Ok(())
    }
}
