//! Read-only script resource sets
//!
//! A [`ScriptResources`] implementation is the backing store behind a
//! [`ScriptStore`](crate::store::ScriptStore): it answers "what is the source
//! text of the script called `name`?" and nothing more.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// File extension of scripts in a [`DirectoryResources`] set.
pub const SCRIPT_EXTENSION: &str = "js";

const BUNDLED: [(&str, &str); 3] = [
    ("business-rules", include_str!("../scripts/business-rules.js")),
    ("data-processing", include_str!("../scripts/data-processing.js")),
    ("math-utils", include_str!("../scripts/math-utils.js")),
];

/// A read-only set of named scripts.
pub trait ScriptResources: Send + Sync + fmt::Debug {
    /// Reads the script called `name`.
    ///
    /// Absence is `Ok(None)`; only real I/O failures are errors.
    fn read(&self, name: &str) -> io::Result<Option<String>>;

    /// Names of every script in the set, sorted.
    fn names(&self) -> io::Result<Vec<String>>;
}

/// Whether `name` can identify a resource: non-empty, no path separators, no
/// parent references.
pub fn is_resource_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains(['/', '\\', '\0'])
        && !name.contains("..")
}

/// The scripts compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedResources;

impl ScriptResources for EmbeddedResources {
    fn read(&self, name: &str) -> io::Result<Option<String>> {
        Ok(BUNDLED
            .iter()
            .find(|(bundled, _)| *bundled == name)
            .map(|(_, source)| source.to_string()))
    }

    fn names(&self) -> io::Result<Vec<String>> {
        let mut names: Vec<String> = BUNDLED.iter().map(|(name, _)| name.to_string()).collect();
        names.sort();
        Ok(names)
    }
}

/// Scripts read from `<root>/<name>.js`.
#[derive(Debug, Clone)]
pub struct DirectoryResources {
    root: PathBuf,
}

impl DirectoryResources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, SCRIPT_EXTENSION))
    }
}

impl ScriptResources for DirectoryResources {
    fn read(&self, name: &str) -> io::Result<Option<String>> {
        if !is_resource_name(name) {
            return Ok(None);
        }

        match std::fs::read_to_string(self.path_for(name)) {
            Ok(source) => Ok(Some(source)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn names(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(SCRIPT_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_resource_names() {
        assert!(is_resource_name("business-rules"));
        assert!(is_resource_name("v2.rules"));
        for bad in ["", "a/b", "a\\b", "..", "../etc/passwd", "nul\0"] {
            assert!(!is_resource_name(bad), "{bad:?}");
        }
    }

    #[test]
    fn test_embedded_set() {
        let resources = EmbeddedResources;
        assert_eq!(
            resources.names().unwrap(),
            vec!["business-rules", "data-processing", "math-utils"]
        );

        let source = resources.read("business-rules").unwrap().unwrap();
        assert!(source.contains("function calculateAdvancedDiscount"));
        assert!(resources.read("missing").unwrap().is_none());
    }

    #[test]
    fn test_directory_set() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("greet.js"), "function greet(p) { return 'hi ' + p.name; }").unwrap();
        fs::write(dir.path().join("notes.txt"), "not a script").unwrap();

        let resources = DirectoryResources::new(dir.path());
        assert_eq!(resources.names().unwrap(), vec!["greet"]);
        assert!(resources.read("greet").unwrap().unwrap().contains("function greet"));
        assert!(resources.read("notes").unwrap().is_none());
        assert!(resources.read("absent").unwrap().is_none());
    }

    #[test]
    fn test_directory_set_refuses_traversal() {
        let outer = tempfile::tempdir().unwrap();
        let inner = outer.path().join("scripts");
        fs::create_dir(&inner).unwrap();
        fs::write(outer.path().join("secret.js"), "var secret = 1;").unwrap();

        let resources = DirectoryResources::new(&inner);
        assert!(resources.read("../secret").unwrap().is_none());
    }

    #[test]
    fn test_directory_io_error_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where a file is expected is a real I/O failure, not absence
        fs::create_dir(dir.path().join("broken.js")).unwrap();

        let resources = DirectoryResources::new(dir.path());
        assert!(resources.read("broken").is_err());
    }
}
