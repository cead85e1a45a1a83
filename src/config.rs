//! Project configuration: which resolver and plugins a project uses.
//!
//! A project names its virtual-module setup in `vmc.config.json` or
//! `vmc.config.toml` at its root:
//!
//! ```text
//! {
//!   "plugins": [
//!     "@acme/routes",
//!     { "specifier": "./plugins/api", "options": { "prefix": "/api" } }
//!   ]
//! }
//! ```
//!
//! Plugins are resolved through a [`PluginRegistry`]; a `resolver` entry
//! instead selects a resolver registered on the loader by name.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plugin::{LoaderError, PluginError, PluginManager, PluginRegistry, VirtualModuleResolver};

/// File names searched for, in order.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["vmc.config.json", "vmc.config.toml"];

// =============================================================================
// Config Model
// =============================================================================

/// Contents of a config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VmcConfig {
    /// Name of a registered resolver. Takes precedence over `plugins`.
    pub resolver: Option<String>,
    /// Plugins, in resolution order.
    pub plugins: Vec<PluginEntry>,
}

/// One `plugins` entry: a bare specifier or a specifier with options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PluginEntry {
    /// `"@acme/routes"`
    Specifier(String),
    /// `{ "specifier": "./plugins/api", "options": { ... } }`
    Detailed {
        /// Plugin specifier.
        specifier: String,
        /// Options handed to the plugin factory.
        #[serde(default)]
        options: serde_json::Value,
    },
}

impl PluginEntry {
    /// The specifier.
    pub fn specifier(&self) -> &str {
        match self {
            Self::Specifier(specifier) | Self::Detailed { specifier, .. } => specifier,
        }
    }

    /// The options (`null` for bare specifiers).
    pub fn options(&self) -> serde_json::Value {
        match self {
            Self::Specifier(_) => serde_json::Value::Null,
            Self::Detailed { options, .. } => options.clone(),
        }
    }
}

/// A parsed config and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig {
    /// Config file path.
    pub path: PathBuf,
    /// Parsed contents.
    pub config: VmcConfig,
}

impl LoadedConfig {
    /// Directory relative plugin specifiers resolve against.
    pub fn config_dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new(""))
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Why configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read `{}`: {source}", .path.display())]
    Io {
        /// Config file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Invalid JSON.
    #[error("invalid config `{}`: {source}", .path.display())]
    Json {
        /// Config file.
        path: PathBuf,
        /// Parse error.
        source: serde_json::Error,
    },

    /// Invalid TOML.
    #[error("invalid config `{}`: {source}", .path.display())]
    Toml {
        /// Config file.
        path: PathBuf,
        /// Parse error.
        source: toml::de::Error,
    },

    /// Neither `.json` nor `.toml`.
    #[error("unsupported config format `{}`", .0.display())]
    UnsupportedFormat(PathBuf),

    /// `resolver` names nothing registered.
    #[error("no resolver registered as `{0}`")]
    UnknownResolver(String),

    /// A registered resolver failed to construct.
    #[error("resolver `{name}` failed to initialize: {source}")]
    Resolver {
        /// Resolver name.
        name: String,
        /// Factory error.
        source: PluginError,
    },

    /// A plugin failed to load.
    #[error(transparent)]
    Plugin(#[from] LoaderError),
}

// =============================================================================
// Loader
// =============================================================================

/// Constructs a named resolver. Receives the config directory.
pub type ResolverFactory =
    Arc<dyn Fn(&Path) -> Result<Arc<dyn VirtualModuleResolver>, PluginError> + Send + Sync>;

/// Finds, parses and instantiates project configuration.
///
/// # Example
///
/// ```ignore
/// let registry = PluginRegistry::new().with("@acme/routes", routes_plugin);
/// let loader = VmcConfigLoader::new(registry);
/// let resolver = loader.resolve_project(Path::new("/app"))?;
/// ```
#[derive(Clone, Default)]
pub struct VmcConfigLoader {
    plugins: PluginRegistry,
    resolvers: FxHashMap<String, ResolverFactory>,
}

impl fmt::Debug for VmcConfigLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut resolvers: Vec<_> = self.resolvers.keys().collect();
        resolvers.sort();
        f.debug_struct("VmcConfigLoader")
            .field("plugins", &self.plugins)
            .field("resolvers", &resolvers)
            .finish()
    }
}

impl VmcConfigLoader {
    /// Create a loader resolving plugins through `plugins`.
    pub fn new(plugins: PluginRegistry) -> Self {
        Self {
            plugins,
            resolvers: FxHashMap::default(),
        }
    }

    /// Register a resolver selectable through the `resolver` field.
    pub fn with_resolver(
        mut self,
        name: impl Into<String>,
        factory: impl Fn(&Path) -> Result<Arc<dyn VirtualModuleResolver>, PluginError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.resolvers.insert(name.into(), Arc::new(factory));
        self
    }

    /// The first config file present in `project_root`.
    pub fn find(project_root: &Path) -> Option<PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| project_root.join(name))
            .find(|path| path.is_file())
    }

    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<LoadedConfig, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&text).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?,
            Some("toml") => toml::from_str(&text).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?,
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(LoadedConfig {
            path: path.to_path_buf(),
            config,
        })
    }

    /// Build the resolver a config describes.
    pub fn load_resolver(&self, loaded: &LoadedConfig) -> Result<Arc<dyn VirtualModuleResolver>, ConfigError> {
        let config_dir = loaded.config_dir();

        if let Some(name) = &loaded.config.resolver {
            if !loaded.config.plugins.is_empty() {
                tracing::warn!(
                    resolver = %name,
                    config = %loaded.path.display(),
                    "config names a resolver; its plugins list is ignored"
                );
            }
            let factory = self
                .resolvers
                .get(name)
                .ok_or_else(|| ConfigError::UnknownResolver(name.clone()))?;
            return factory(config_dir).map_err(|source| ConfigError::Resolver {
                name: name.clone(),
                source,
            });
        }

        let mut manager = PluginManager::new();
        for entry in &loaded.config.plugins {
            let plugin = self.plugins.load(entry.specifier(), config_dir, entry.options())?;
            manager.register(plugin);
        }
        Ok(Arc::new(manager))
    }

    /// Find, load and instantiate the config in `project_root`.
    /// `Ok(None)` when the project has none.
    pub fn resolve_project(
        &self,
        project_root: &Path,
    ) -> Result<Option<Arc<dyn VirtualModuleResolver>>, ConfigError> {
        let Some(path) = Self::find(project_root) else {
            return Ok(None);
        };
        let loaded = Self::load(&path)?;
        self.load_resolver(&loaded).map(Some)
    }
}
