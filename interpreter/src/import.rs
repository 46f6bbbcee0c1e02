use std::fs;
use std::path::{Path, PathBuf};

use ahash::AHashSet;

use crate::limits::SOURCE_EXTENSION;

/// What an import statement names: a source file and optionally one grimoire inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportTarget {
    pub path: PathBuf,
    pub grimoire: Option<String>,
}

/// Resolves import paths and remembers the files a session already imported. Importing one of
/// them again does nothing.
#[derive(Debug)]
pub struct ImportResolver {
    base_dir: PathBuf,
    imported: AHashSet<PathBuf>,
}

impl ImportResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        ImportResolver {
            base_dir: base_dir.into(),
            imported: AHashSet::new(),
        }
    }

    /// `"lib/shapes"` and `"lib/shapes.crl"` name a file, `"lib/shapes.Circle"` names the
    /// grimoire `Circle` inside `lib/shapes.crl`.
    pub fn resolve(&self, import_path: &str) -> ImportTarget {
        let (dir, last) = match import_path.rfind('/') {
            Some(split) => (&import_path[..split + 1], &import_path[split + 1..]),
            None => ("", import_path),
        };

        let (stem, grimoire) = match last.rsplit_once('.') {
            Some((stem, suffix)) if suffix != SOURCE_EXTENSION && !stem.is_empty() => {
                (stem, Some(String::from(suffix)))
            }
            Some((stem, _)) if !stem.is_empty() => (stem, None),
            _ => (last, None),
        };

        let relative = format!("{}{}.{}", dir, stem, SOURCE_EXTENSION);
        let path = Path::new(&relative);
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        };

        ImportTarget {
            path: canonical(&path),
            grimoire,
        }
    }

    // Registered before the module body runs so that import cycles terminate
    pub fn insert(&mut self, path: PathBuf) {
        self.imported.insert(path);
    }

    pub fn is_imported(&self, path: &Path) -> bool {
        self.imported.contains(path)
    }
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::import::{ImportResolver, ImportTarget};

    #[test]
    fn test_resolve() {
        let resolver = ImportResolver::new("/nonexistent/base");
        let tests = [
            ("shapes", "/nonexistent/base/shapes.crl", None),
            ("shapes.crl", "/nonexistent/base/shapes.crl", None),
            ("lib/shapes.Circle", "/nonexistent/base/lib/shapes.crl", Some("Circle")),
            ("/abs/util", "/abs/util.crl", None),
        ];

        for (import_path, path, grimoire) in tests {
            assert_eq!(
                resolver.resolve(import_path),
                ImportTarget {
                    path: PathBuf::from(path),
                    grimoire: grimoire.map(String::from),
                },
                "resolving {}",
                import_path
            );
        }
    }

    #[test]
    fn test_imports_are_remembered() {
        let mut resolver = ImportResolver::new("/nonexistent/base");
        let target = resolver.resolve("shapes");
        assert!(!resolver.is_imported(&target.path));

        resolver.insert(target.path.clone());

        assert!(resolver.is_imported(&resolver.resolve("shapes.crl").path));
        assert!(resolver.is_imported(&resolver.resolve("shapes.Circle").path));
        assert!(!resolver.is_imported(&resolver.resolve("colors").path));
    }
}
