//! Loads the project file, `grove.yaml`. Every key is optional:
//!
//! ```yaml
//! content_directory: content   # relative to grove.yaml
//! cache:
//!   ttl_seconds: 300
//!   capacity: 256
//! pagination:
//!   page_size: 10
//!   max_page_size: 100
//! links:
//!   markdown: true
//!   wiki: true
//!   bare_paths: false
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::links::LinkConventions;

pub const PROJECT_FILE: &str = "grove.yaml";

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the content tree lives. Relative paths are resolved against the
    /// project file's directory on load.
    pub content_directory: PathBuf,
    pub cache: CacheConfig,
    pub pagination: PaginationConfig,
    pub links: LinkConventions,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            content_directory: PathBuf::from("content"),
            cache: CacheConfig::default(),
            pagination: PaginationConfig::default(),
            links: LinkConventions::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_seconds: u64,

    /// Entries held per cache before the least recently used are evicted.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl_seconds: 300,
            capacity: 256,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Used when a caller doesn't ask for a page size.
    pub page_size: usize,

    /// Requested page sizes above this are clamped down to it.
    pub max_page_size: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        PaginationConfig {
            page_size: 10,
            max_page_size: 100,
        }
    }
}

impl Config {
    /// Looks for [`PROJECT_FILE`] in `dir` and then in each of its ancestors,
    /// loading the first one found.
    pub fn from_directory(dir: &Path) -> Result<Config> {
        for ancestor in dir.ancestors() {
            let path = ancestor.join(PROJECT_FILE);
            if path.is_file() {
                return Config::from_project_file(&path);
            }
        }
        Err(Error::NotFound(dir.to_owned()))
    }

    /// Loads a project file. An empty file yields the defaults.
    pub fn from_project_file(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path).map_err(|err| Error::Io {
            path: path.to_owned(),
            err,
        })?;
        let mut config: Config = if text.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&text).map_err(|err| Error::Yaml {
                path: path.to_owned(),
                err,
            })?
        };
        if let Some(project_root) = path.parent() {
            config.content_directory = project_root.join(&config.content_directory);
        }
        Ok(config)
    }
}

/// Represents the result of loading a [`Config`].
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading a [`Config`].
#[derive(Debug)]
pub enum Error {
    /// Returned when no project file exists in the directory or any of its
    /// ancestors.
    NotFound(PathBuf),

    /// Returned for I/O problems reading the project file.
    Io { path: PathBuf, err: std::io::Error },

    /// Returned when the project file isn't valid YAML or has a value of the
    /// wrong shape.
    Yaml { path: PathBuf, err: serde_yaml::Error },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NotFound(dir) => write!(
                f,
                "Could not find `{}` in `{}` or any parent directory",
                PROJECT_FILE,
                dir.display()
            ),
            Error::Io { path, err } => {
                write!(f, "Reading project file '{}': {}", path.display(), err)
            }
            Error::Yaml { path, err } => {
                write!(f, "Parsing project file '{}': {}", path.display(), err)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NotFound(_) => None,
            Error::Io { path: _, err } => Some(err),
            Error::Yaml { path: _, err } => Some(err),
        }
    }
}
