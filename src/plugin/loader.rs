//! Loading plugins named in configuration.
//!
//! Plugins are compiled into the host binary and registered under the
//! specifier a config file uses to name them: a bare package-style name
//! (`"@acme/routes"`) or a path relative to the config file
//! (`"./plugins/routes"`). Loading validates in a fixed order, each step
//! guarding a different kind of misconfiguration:
//!
//! ```text
//! 1. non-empty specifier and config dir     EmptySpecifier / InvalidConfigDir
//! 2. resolve relative specifiers            (against the config dir)
//! 3. containment                            EscapesConfigDir
//! 4. lookup + construct                     NotFound / Factory
//! 5. shape                                  InvalidShape
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use thiserror::Error;

use super::{PluginError, VirtualModulePlugin};
use crate::path::{is_within, normalize_path, resolve_relative_specifier};

/// Everything a plugin factory gets to configure a plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginContext {
    /// Directory of the config file that named the plugin.
    pub config_dir: PathBuf,
    /// Specifier as written in the config.
    pub specifier: String,
    /// Plugin options from the config (`null` when absent).
    pub options: serde_json::Value,
}

/// Constructs a plugin from its configuration.
pub type PluginFactory =
    Arc<dyn Fn(&PluginContext) -> Result<Arc<dyn VirtualModulePlugin>, PluginError> + Send + Sync>;

/// Why a plugin could not be loaded.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The specifier is empty.
    #[error("plugin specifier is empty")]
    EmptySpecifier,

    /// The config directory is empty or not absolute.
    #[error("invalid config directory `{}`", .0.display())]
    InvalidConfigDir(PathBuf),

    /// A relative specifier points outside the config directory.
    #[error("plugin `{specifier}` resolves outside `{}`", .config_dir.display())]
    EscapesConfigDir {
        /// Specifier as written.
        specifier: String,
        /// Directory it had to stay within.
        config_dir: PathBuf,
    },

    /// Nothing is registered under the specifier.
    #[error("no plugin registered for `{specifier}`")]
    NotFound {
        /// Specifier as written.
        specifier: String,
    },

    /// The factory failed.
    #[error("plugin `{specifier}` failed to initialize: {source}")]
    Factory {
        /// Specifier as written.
        specifier: String,
        /// Factory error.
        source: PluginError,
    },

    /// The constructed value is not a usable plugin.
    #[error("plugin `{specifier}` is invalid: {reason}")]
    InvalidShape {
        /// Specifier as written.
        specifier: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Plugin factories by specifier.
///
/// Relative specifiers are registered by the absolute path they resolve to
/// (without extension), so `"./plugins/routes"` in `/app/vmc.config.json`
/// loads the factory registered as `"/app/plugins/routes"`.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    factories: FxHashMap<String, PluginFactory>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("PluginRegistry")
            .field("factories", &names)
            .finish()
    }
}

impl PluginRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a bare specifier or an absolute path.
    pub fn register(
        &mut self,
        specifier: impl Into<String>,
        factory: impl Fn(&PluginContext) -> Result<Arc<dyn VirtualModulePlugin>, PluginError>
        + Send
        + Sync
        + 'static,
    ) -> &mut Self {
        self.factories.insert(specifier.into(), Arc::new(factory));
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(
        mut self,
        specifier: impl Into<String>,
        factory: impl Fn(&PluginContext) -> Result<Arc<dyn VirtualModulePlugin>, PluginError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.register(specifier, factory);
        self
    }

    /// Whether anything is registered under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    /// Load the plugin a config file names.
    pub fn load(
        &self,
        specifier: &str,
        config_dir: &Path,
        options: serde_json::Value,
    ) -> Result<Arc<dyn VirtualModulePlugin>, LoaderError> {
        if specifier.trim().is_empty() {
            return Err(LoaderError::EmptySpecifier);
        }
        if config_dir.as_os_str().is_empty() {
            return Err(LoaderError::InvalidConfigDir(config_dir.to_path_buf()));
        }
        let config_dir = normalize_path(config_dir);

        let key = match resolve_relative_specifier(&config_dir, specifier) {
            Some(resolved) => {
                if !is_within(&config_dir, &resolved) {
                    return Err(LoaderError::EscapesConfigDir {
                        specifier: specifier.to_string(),
                        config_dir,
                    });
                }
                strip_script_extension(&resolved)
            }
            None => specifier.to_string(),
        };

        let factory = self.factories.get(&key).ok_or_else(|| LoaderError::NotFound {
            specifier: specifier.to_string(),
        })?;

        let context = PluginContext {
            config_dir,
            specifier: specifier.to_string(),
            options,
        };
        let plugin = factory(&context).map_err(|source| LoaderError::Factory {
            specifier: specifier.to_string(),
            source,
        })?;

        if plugin.name().trim().is_empty() {
            return Err(LoaderError::InvalidShape {
                specifier: specifier.to_string(),
                reason: "plugin name is empty".to_string(),
            });
        }
        tracing::debug!(specifier, plugin = plugin.name(), "loaded plugin");
        Ok(plugin)
    }
}

/// `/app/plugins/routes.ts` and `/app/plugins/routes` name the same plugin.
fn strip_script_extension(path: &Path) -> String {
    let text = path.to_string_lossy();
    for extension in [".ts", ".mts", ".js", ".mjs"] {
        if let Some(stem) = text.strip_suffix(extension) {
            return stem.to_string();
        }
    }
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::FnPlugin;

    fn named(name: &'static str) -> impl Fn(&PluginContext) -> Result<Arc<dyn VirtualModulePlugin>, PluginError> {
        move |_| {
            Ok(Arc::new(FnPlugin::new(name, |_, _| false, |_, _, _| Ok(String::new())))
                as Arc<dyn VirtualModulePlugin>)
        }
    }

    #[test]
    fn test_bare_and_relative_specifiers() {
        let registry = PluginRegistry::new()
            .with("@acme/routes", named("routes"))
            .with("/app/plugins/local", named("local"));

        let plugin = registry
            .load("@acme/routes", Path::new("/app"), serde_json::Value::Null)
            .unwrap();
        assert_eq!(plugin.name(), "routes");

        let plugin = registry
            .load("./plugins/local.ts", Path::new("/app"), serde_json::Value::Null)
            .unwrap();
        assert_eq!(plugin.name(), "local");
    }

    #[test]
    fn test_validation_order() {
        let registry = PluginRegistry::new().with("/plugins/evil", named("evil"));

        assert!(matches!(
            registry.load("", Path::new("/app"), serde_json::Value::Null),
            Err(LoaderError::EmptySpecifier)
        ));
        assert!(matches!(
            registry.load("x", Path::new(""), serde_json::Value::Null),
            Err(LoaderError::InvalidConfigDir(_))
        ));
        // Registered, but outside the config dir: containment fires first.
        assert!(matches!(
            registry.load("../plugins/evil", Path::new("/app"), serde_json::Value::Null),
            Err(LoaderError::EscapesConfigDir { .. })
        ));
        assert!(matches!(
            registry.load("./missing", Path::new("/app"), serde_json::Value::Null),
            Err(LoaderError::NotFound { .. })
        ));
    }

    #[test]
    fn test_factory_receives_options_and_shape_is_checked() {
        let registry = PluginRegistry::new()
            .with("opts", |ctx: &PluginContext| {
                let name = ctx.options["name"].as_str().unwrap_or("").to_string();
                Ok(Arc::new(FnPlugin::new(name, |_, _| false, |_, _, _| Ok(String::new())))
                    as Arc<dyn VirtualModulePlugin>)
            })
            .with("failing", |_: &PluginContext| Err("missing env".into()));

        let plugin = registry
            .load("opts", Path::new("/app"), serde_json::json!({ "name": "custom" }))
            .unwrap();
        assert_eq!(plugin.name(), "custom");

        assert!(matches!(
            registry.load("opts", Path::new("/app"), serde_json::Value::Null),
            Err(LoaderError::InvalidShape { .. })
        ));
        let Err(err) = registry.load("failing", Path::new("/app"), serde_json::Value::Null) else {
            panic!("constructor error should surface");
        };
        assert!(err.to_string().contains("missing env"));
    }
}
