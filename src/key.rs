//! Deterministic cache keys and synthetic file names for virtual modules.
//!
//! ```text
//! (id = "virtual:routes", importer = "/app/src/main.ts", plugin = "router")
//!        │
//!        ├─► key       = sha256(id ␀ importer)[..16]        "3f9a0c…"
//!        └─► file name = <importer dir>/__virtual_router_3f9a0c….ts
//! ```
//!
//! The synthetic file lives next to its importer so relative imports inside
//! generated source resolve the same way they would from the importer.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// File name prefix shared by every synthetic module.
pub const VIRTUAL_FILE_PREFIX: &str = "__virtual_";

/// Extension given to synthetic modules (always TypeScript source).
pub const VIRTUAL_FILE_EXTENSION: &str = "ts";

const KEY_LEN: usize = 16;

/// Cache key for an `(id, importer)` pair.
///
/// Stable across processes and rebuilds; distinct pairs collide only on a
/// 64-bit hash prefix collision.
pub fn virtual_key(id: &str, importer: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update([0u8]);
    hasher.update(importer.as_bytes());
    let digest = hasher.finalize();

    let mut key = String::with_capacity(KEY_LEN);
    for byte in digest.iter().take(KEY_LEN / 2) {
        key.push_str(&format!("{byte:02x}"));
    }
    key
}

/// Synthetic file name for a record.
pub fn virtual_file_name(plugin_name: &str, key: &str, importer: &str) -> PathBuf {
    let dir = Path::new(importer)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    dir.join(format!(
        "{VIRTUAL_FILE_PREFIX}{}_{key}.{VIRTUAL_FILE_EXTENSION}",
        sanitize_plugin_name(plugin_name)
    ))
}

/// Whether a path carries the synthetic-module naming convention.
///
/// This is a naming check only; whether a record backs the file is the
/// store's business.
pub fn looks_virtual(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| {
            name.starts_with(VIRTUAL_FILE_PREFIX) && name.ends_with(".ts")
        })
}

/// Keep plugin names readable in paths without letting them add components.
fn sanitize_plugin_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_deterministic() {
        let a = virtual_key("virtual:foo", "/app/main.ts");
        let b = virtual_key("virtual:foo", "/app/main.ts");
        assert_eq!(a, b);
        assert_eq!(a.len(), KEY_LEN);
    }

    #[test]
    fn test_key_separates_pairs() {
        // Concatenation ambiguity must not collide.
        let a = virtual_key("ab", "c");
        let b = virtual_key("a", "bc");
        assert_ne!(a, b);
        assert_ne!(
            virtual_key("virtual:foo", "/app/a.ts"),
            virtual_key("virtual:foo", "/app/b.ts")
        );
    }

    #[test]
    fn test_file_name_embeds_plugin_and_key() {
        let key = virtual_key("virtual:foo", "/app/src/main.ts");
        let name = virtual_file_name("my/plugin", &key, "/app/src/main.ts");
        assert_eq!(name.parent().unwrap(), Path::new("/app/src"));
        let file = name.file_name().unwrap().to_str().unwrap();
        assert!(file.starts_with("__virtual_my-plugin_"));
        assert!(file.contains(&key));
        assert!(looks_virtual(&name));
        assert!(!looks_virtual(Path::new("/app/src/main.ts")));
    }
}
