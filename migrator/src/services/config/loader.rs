use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{Config, ConfigError};

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

impl Config {
    /// Load from `path`, or from `./config.yaml` then `~/.matrixmigrate/config.yaml`.
    /// Falls back to defaults when no file is found and no path was given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let candidate = match path {
            Some(path) => Some(path.to_path_buf()),
            None => default_locations().into_iter().find(|p| p.is_file()),
        };

        let Some(path) = candidate else {
            info!("[Config] No config file found, using defaults");
            let mut config = Config::default();
            config.expand_paths();
            return Ok(config);
        };

        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        config.validate()?;

        debug!("[Config] Loaded {}", path.display());
        Ok(config)
    }

    /// Parse YAML and expand `~` and `$VAR` in path fields
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        let mut config: Config = serde_yaml::from_str(raw)?;
        config.expand_paths();
        Ok(config)
    }

    fn expand_paths(&mut self) {
        self.mattermost.ssh.key_path = expand_path(&self.mattermost.ssh.key_path);
        self.matrix.ssh.key_path = expand_path(&self.matrix.ssh.key_path);
        for path in [
            &mut self.data.assets_dir,
            &mut self.data.mappings_dir,
            &mut self.data.state_file,
        ] {
            *path = PathBuf::from(expand_path(&path.to_string_lossy()));
        }
    }
}

fn default_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from(DEFAULT_CONFIG_FILE)];
    if let Some(home) = home_dir() {
        locations.push(home.join(".matrixmigrate").join(DEFAULT_CONFIG_FILE));
    }
    locations
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
}

/// Expand a leading `~/` and `$VAR` / `${VAR}` references. Unset variables expand to nothing.
pub fn expand_path(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }

    let path = match (path.strip_prefix("~/"), home_dir()) {
        (Some(rest), Some(home)) => home.join(rest).to_string_lossy().into_owned(),
        _ => path.to_string(),
    };

    let mut expanded = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            expanded.push(c);
            continue;
        }

        let name: String = if chars.peek() == Some(&'{') {
            chars.next();
            chars.by_ref().take_while(|c| *c != '}').collect()
        } else {
            let mut name = String::new();
            while let Some(c) = chars.peek() {
                if c.is_ascii_alphanumeric() || *c == '_' {
                    name.push(*c);
                    chars.next();
                } else {
                    break;
                }
            }
            name
        };

        if name.is_empty() {
            expanded.push('$');
        } else if let Ok(value) = std::env::var(&name) {
            expanded.push_str(&value);
        }
    }
    expanded
}
