//! [`PluginManager`]: first-match-wins dispatch over registered plugins.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use super::{
    PluginError, ResolveVirtualModuleOptions, VirtualModuleDiagnostic,
    VirtualModuleDiagnosticCode, VirtualModulePlugin, VirtualModuleResolution,
    VirtualModuleResolver,
};
use crate::type_info::TypeInfoApiSession;

/// Resolves virtual modules through an ordered list of plugins.
///
/// # Example
///
/// ```ignore
/// let manager = PluginManager::new()
///     .with_plugin(FnPlugin::new("virtual", |id, _| id == "virtual:foo", |_, _, _| {
///         Ok("export interface Foo { n: number }".to_string())
///     }));
/// let resolution = manager.resolve_module(&ResolveVirtualModuleOptions::new("virtual:foo", "/app/main.ts"));
/// ```
#[derive(Default, Clone)]
pub struct PluginManager {
    plugins: Vec<Arc<dyn VirtualModulePlugin>>,
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins", &self.plugin_names())
            .finish()
    }
}

impl PluginManager {
    /// Create a manager with no plugins.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager from shared plugins, keeping their order.
    pub fn from_plugins(plugins: Vec<Arc<dyn VirtualModulePlugin>>) -> Self {
        Self { plugins }
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_plugin(mut self, plugin: impl VirtualModulePlugin + 'static) -> Self {
        self.register(Arc::new(plugin));
        self
    }

    /// Append a plugin; earlier plugins take precedence.
    pub fn register(&mut self, plugin: Arc<dyn VirtualModulePlugin>) {
        self.plugins.push(plugin);
    }

    /// Registered plugin names, in order.
    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Number of plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether no plugin is registered.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    fn build_with(
        &self,
        plugin: &dyn VirtualModulePlugin,
        options: &ResolveVirtualModuleOptions<'_>,
    ) -> VirtualModuleResolution {
        let name = plugin.name();
        let error = |code, message: String| {
            VirtualModuleResolution::Error(VirtualModuleDiagnostic::new(code, Some(name), message))
        };

        let session = match options.create_type_info_api_session {
            Some(factory) => match guarded(|| factory.create(plugin.type_target_specs())) {
                Ok(session) => session,
                Err(message) => {
                    return error(
                        VirtualModuleDiagnosticCode::SessionCreationFailed,
                        format!("failed to create type info session: {message}"),
                    );
                }
            },
            None => TypeInfoApiSession::unavailable(),
        };

        let source_text =
            match guarded(|| plugin.build(options.id, options.importer, session.api())) {
                Ok(text) => text,
                Err(message) => {
                    tracing::debug!(plugin = name, id = options.id, %message, "plugin build failed");
                    return error(
                        VirtualModuleDiagnosticCode::PluginBuildThrew,
                        format!("build failed: {message}"),
                    );
                }
            };

        if source_text.contains('\0') {
            return error(
                VirtualModuleDiagnosticCode::InvalidBuildOutput,
                "build output contains a NUL byte".to_string(),
            );
        }

        let dependencies = session.consume_dependencies();
        let warnings = session.consume_warnings();
        tracing::debug!(
            plugin = name,
            id = options.id,
            importer = options.importer,
            dependencies = dependencies.len(),
            "virtual module built"
        );
        VirtualModuleResolution::Resolved {
            plugin_name: name.to_string(),
            source_text,
            dependencies,
            warnings,
        }
    }
}

impl VirtualModuleResolver for PluginManager {
    fn resolve_module(&self, options: &ResolveVirtualModuleOptions<'_>) -> VirtualModuleResolution {
        if options.id.is_empty() || options.importer.is_empty() {
            return VirtualModuleResolution::Error(VirtualModuleDiagnostic::new(
                VirtualModuleDiagnosticCode::InvalidOptions,
                None,
                "id and importer must be non-empty",
            ));
        }

        for plugin in &self.plugins {
            let name = plugin.name();
            if name.is_empty() {
                return VirtualModuleResolution::Error(VirtualModuleDiagnostic::new(
                    VirtualModuleDiagnosticCode::InvalidOptions,
                    None,
                    "plugin name must be non-empty",
                ));
            }

            match guarded(|| plugin.should_resolve(options.id, options.importer)) {
                Ok(false) => continue,
                Ok(true) => return self.build_with(plugin.as_ref(), options),
                Err(message) => {
                    return VirtualModuleResolution::Error(VirtualModuleDiagnostic::new(
                        VirtualModuleDiagnosticCode::PluginShouldResolveThrew,
                        Some(name),
                        format!("should_resolve failed: {message}"),
                    ));
                }
            }
        }

        VirtualModuleResolution::Unresolved
    }
}

impl<R: VirtualModuleResolver + ?Sized> VirtualModuleResolver for Arc<R> {
    fn resolve_module(&self, options: &ResolveVirtualModuleOptions<'_>) -> VirtualModuleResolution {
        (**self).resolve_module(options)
    }
}

/// Run a plugin callback, turning both `Err` and panics into a message.
fn guarded<T>(f: impl FnOnce() -> Result<T, PluginError>) -> Result<T, String> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::plugin::FnPlugin;
    use crate::type_info::{FileOptions, SessionFactory, TypeInfoErrorCode};
    use crate::types::DependencyDescriptor;

    fn options<'a>(id: &'a str) -> ResolveVirtualModuleOptions<'a> {
        ResolveVirtualModuleOptions::new(id, "/app/main.ts")
    }

    fn counting(
        name: &str,
        source: &'static str,
        builds: Arc<AtomicUsize>,
    ) -> FnPlugin {
        FnPlugin::new(name, |id, _| id.starts_with("virtual:"), move |_, _, _| {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok(source.to_string())
        })
    }

    #[test]
    fn test_first_match_wins() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let manager = PluginManager::new()
            .with_plugin(counting("first", "export const a = 1;", first.clone()))
            .with_plugin(counting("second", "export const b = 2;", second.clone()));

        let resolution = manager.resolve_module(&options("virtual:x"));
        let VirtualModuleResolution::Resolved {
            plugin_name,
            source_text,
            ..
        } = resolution
        else {
            panic!("expected resolved, got {resolution:?}");
        };
        assert_eq!(plugin_name, "first");
        assert_eq!(source_text, "export const a = 1;");
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unresolved_when_nothing_matches() {
        let manager = PluginManager::new().with_plugin(counting(
            "p",
            "",
            Arc::new(AtomicUsize::new(0)),
        ));
        assert_eq!(
            manager.resolve_module(&options("./real")),
            VirtualModuleResolution::Unresolved
        );
    }

    #[test]
    fn test_invalid_options() {
        let manager = PluginManager::new();
        let resolution = manager.resolve_module(&ResolveVirtualModuleOptions::new("", "/a.ts"));
        let VirtualModuleResolution::Error(diagnostic) = resolution else {
            panic!("expected error");
        };
        assert_eq!(diagnostic.code, VirtualModuleDiagnosticCode::InvalidOptions);
        assert_eq!(diagnostic.plugin_name, None);

        let manager = PluginManager::new().with_plugin(FnPlugin::new("", |_, _| true, |_, _, _| {
            Ok(String::new())
        }));
        let VirtualModuleResolution::Error(diagnostic) = manager.resolve_module(&options("x"))
        else {
            panic!("expected error");
        };
        assert_eq!(diagnostic.code, VirtualModuleDiagnosticCode::InvalidOptions);
    }

    #[test]
    fn test_build_error_and_panic_are_blamed() {
        let manager = PluginManager::new().with_plugin(FnPlugin::new(
            "broken",
            |_, _| true,
            |_, _, _| Err("no routes".into()),
        ));
        let VirtualModuleResolution::Error(diagnostic) = manager.resolve_module(&options("x"))
        else {
            panic!("expected error");
        };
        assert_eq!(diagnostic.code, VirtualModuleDiagnosticCode::PluginBuildThrew);
        assert_eq!(diagnostic.plugin_name.as_deref(), Some("broken"));
        assert!(diagnostic.message.contains("no routes"));

        let manager = PluginManager::new().with_plugin(FnPlugin::new(
            "panicky",
            |_, _| panic!("should_resolve exploded"),
            |_, _, _| Ok(String::new()),
        ));
        let VirtualModuleResolution::Error(diagnostic) = manager.resolve_module(&options("x"))
        else {
            panic!("expected error");
        };
        assert_eq!(
            diagnostic.code,
            VirtualModuleDiagnosticCode::PluginShouldResolveThrew
        );
        assert!(diagnostic.message.contains("exploded"));
    }

    #[test]
    fn test_invalid_build_output() {
        let manager = PluginManager::new().with_plugin(FnPlugin::new("nul", |_, _| true, |_, _, _| {
            Ok("export {}\0".to_string())
        }));
        let VirtualModuleResolution::Error(diagnostic) = manager.resolve_module(&options("x"))
        else {
            panic!("expected error");
        };
        assert_eq!(diagnostic.code, VirtualModuleDiagnosticCode::InvalidBuildOutput);
    }

    #[test]
    fn test_session_creation_failure() {
        let factory = SessionFactory::new(|_| Err("no program".into()));
        let manager = PluginManager::new().with_plugin(FnPlugin::new("p", |_, _| true, |_, _, _| {
            Ok(String::new())
        }));
        let resolution = manager
            .resolve_module(&options("x").with_session_factory(Some(&factory)));
        let VirtualModuleResolution::Error(diagnostic) = resolution else {
            panic!("expected error");
        };
        assert_eq!(diagnostic.code, VirtualModuleDiagnosticCode::SessionCreationFailed);
        assert_eq!(diagnostic.plugin_name.as_deref(), Some("p"));
    }

    #[test]
    fn test_without_factory_api_is_unavailable() {
        let manager = PluginManager::new().with_plugin(FnPlugin::new("p", |_, _| true, |_, _, api| {
            let err = api.file("a.ts", &FileOptions::new("/app")).unwrap_err();
            assert_eq!(err.code, TypeInfoErrorCode::Unavailable);
            Ok("export {};".to_string())
        }));
        assert_eq!(manager.resolve_module(&options("x")).status(), "resolved");
    }

    #[test]
    fn test_dependencies_are_drained_into_resolution() {
        let factory = SessionFactory::new(|_| {
            let tracker = Arc::new(crate::type_info::DependencyTracker::new());
            tracker.record(DependencyDescriptor::file("/app/routes.ts"));
            tracker.warn("heads up");
            Ok(TypeInfoApiSession::new(
                Arc::new(crate::type_info::ProgramTypeInfoApi::new(
                    Arc::new(crate::program::SourceProgram::build(
                        &crate::host::CompilerProgramHost(&crate::host::MemoryHost::new()),
                        &[],
                    )),
                    tracker.clone(),
                )),
                tracker,
            ))
        });
        let manager = PluginManager::new().with_plugin(FnPlugin::new("p", |_, _| true, |_, _, _| {
            Ok("export {};".to_string())
        }));
        let resolution = manager
            .resolve_module(&options("x").with_session_factory(Some(&factory)));
        let VirtualModuleResolution::Resolved {
            dependencies,
            warnings,
            ..
        } = resolution
        else {
            panic!("expected resolved");
        };
        assert_eq!(dependencies, vec![DependencyDescriptor::file("/app/routes.ts")]);
        assert_eq!(warnings, vec!["heads up".to_string()]);
    }
}
