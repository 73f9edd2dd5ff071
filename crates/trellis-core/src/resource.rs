//! Turning location strings into readable resources.
//!
//! Locations take three forms: `classpath:path` (searched across the class
//! path roots), `file:path`, and plain paths relative to the base directory.
//! Pattern resolution expands glob syntax (`**/*.properties`) with `globset`.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use globset::Glob;
use trellis_common::error::{Result, TrellisError};

/// Location prefix for class path resources.
pub const CLASSPATH_PREFIX: &str = "classpath:";
/// Location prefix for file system resources.
pub const FILE_PREFIX: &str = "file:";

/// A readable resource handle; the underlying resource may not exist.
pub trait Resource: fmt::Debug {
    /// Returns `true` if the resource can be read.
    fn exists(&self) -> bool;

    /// Human-readable description used in logs and property-source names.
    fn description(&self) -> String;

    /// Last path segment, if any.
    fn filename(&self) -> Option<String>;

    /// Reads the whole resource as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource does not exist or cannot be read.
    fn read_to_string(&self) -> Result<String>;
}

/// Resolves location strings to resources.
pub trait ResourceLoader {
    /// Returns a handle for the location without checking existence.
    fn get_resource(&self, location: &str) -> Box<dyn Resource>;

    /// Resolves a location pattern to every matching resource.
    ///
    /// The default implementation treats the pattern as a plain location.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is invalid or its root cannot be walked.
    fn get_resources(&self, pattern: &str) -> Result<Vec<Box<dyn Resource>>> {
        Ok(vec![self.get_resource(pattern)])
    }
}

/// A file-system resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileResource {
    path: PathBuf,
    description: String,
}

impl FileResource {
    /// Creates a resource for a path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let description = format!("file [{}]", path.display());
        Self { path, description }
    }

    fn class_path(path: PathBuf, relative: &str) -> Self {
        Self {
            path,
            description: format!("class path resource [{relative}]"),
        }
    }

    /// Path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Resource for FileResource {
    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn filename(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }

    fn read_to_string(&self) -> Result<String> {
        std::fs::read_to_string(&self.path).map_err(|source| TrellisError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// A resource held in memory; `content == None` models a missing resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemoryResource {
    location: String,
    content: Option<String>,
}

impl InMemoryResource {
    /// Creates an existing in-memory resource.
    #[must_use]
    pub fn new(location: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            content: Some(content.into()),
        }
    }

    /// Creates a handle for a resource that does not exist.
    #[must_use]
    pub fn missing(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            content: None,
        }
    }
}

impl Resource for InMemoryResource {
    fn exists(&self) -> bool {
        self.content.is_some()
    }

    fn description(&self) -> String {
        format!("resource [{}]", self.location)
    }

    fn filename(&self) -> Option<String> {
        self.location
            .rsplit(['/', ':'])
            .next()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    fn read_to_string(&self) -> Result<String> {
        self.content.clone().ok_or_else(|| TrellisError::NotFound {
            kind: "resource",
            id: self.location.clone(),
        })
    }
}

/// Loader over the file system with class path roots and glob patterns.
#[derive(Debug, Clone, Default)]
pub struct DefaultResourceLoader {
    base_dir: PathBuf,
    classpath_roots: Vec<PathBuf>,
}

impl DefaultResourceLoader {
    /// Creates a loader resolving plain paths against `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            classpath_roots: Vec::new(),
        }
    }

    /// Adds a class path root, returning the loader for chaining.
    #[must_use]
    pub fn with_classpath_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.classpath_roots.push(root.into());
        self
    }

    fn resolve_path(&self, location: &str) -> FileResource {
        if let Some(relative) = location.strip_prefix(CLASSPATH_PREFIX) {
            let relative = relative.trim_start_matches('/');
            let found = self
                .classpath_roots
                .iter()
                .map(|root| root.join(relative))
                .find(|candidate| candidate.is_file());
            let path = found.unwrap_or_else(|| {
                self.classpath_roots
                    .first()
                    .unwrap_or(&self.base_dir)
                    .join(relative)
            });
            return FileResource::class_path(path, relative);
        }
        let plain = location.strip_prefix(FILE_PREFIX).unwrap_or(location);
        let path = Path::new(plain);
        if path.is_absolute() {
            FileResource::new(path)
        } else {
            FileResource::new(self.base_dir.join(path))
        }
    }

    fn roots_for(&self, location: &str) -> (Vec<PathBuf>, String) {
        if let Some(relative) = location.strip_prefix(CLASSPATH_PREFIX) {
            let relative = relative.trim_start_matches('/').to_string();
            let roots = if self.classpath_roots.is_empty() {
                vec![self.base_dir.clone()]
            } else {
                self.classpath_roots.clone()
            };
            return (roots, relative);
        }
        let plain = location.strip_prefix(FILE_PREFIX).unwrap_or(location);
        if Path::new(plain).is_absolute() {
            (vec![PathBuf::from("/")], plain.trim_start_matches('/').to_string())
        } else {
            (vec![self.base_dir.clone()], plain.to_string())
        }
    }
}

fn has_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

fn static_prefix(pattern: &str) -> &str {
    let first_glob = pattern.find(['*', '?', '[', '{']).unwrap_or(pattern.len());
    pattern[..first_glob].rfind('/').map_or("", |idx| &pattern[..idx])
}

impl ResourceLoader for DefaultResourceLoader {
    fn get_resource(&self, location: &str) -> Box<dyn Resource> {
        Box::new(self.resolve_path(location))
    }

    fn get_resources(&self, pattern: &str) -> Result<Vec<Box<dyn Resource>>> {
        let (roots, relative) = self.roots_for(pattern);
        if !has_glob(&relative) {
            return Ok(vec![self.get_resource(pattern)]);
        }
        let matcher = Glob::new(&relative)
            .map_err(|e| TrellisError::config(format!("invalid resource pattern '{pattern}': {e}")))?
            .compile_matcher();
        let prefix = static_prefix(&relative);

        let mut found: Vec<FileResource> = Vec::new();
        for root in roots {
            let walk_root = root.join(prefix);
            if !walk_root.is_dir() {
                continue;
            }
            for entry in walkdir::WalkDir::new(&walk_root)
                .follow_links(false)
                .into_iter()
                .filter_map(std::result::Result::ok)
            {
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(rel) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                let rel = rel.to_string_lossy().replace('\\', "/");
                if matcher.is_match(&rel) {
                    found.push(if pattern.starts_with(CLASSPATH_PREFIX) {
                        FileResource::class_path(entry.path().to_path_buf(), &rel)
                    } else {
                        FileResource::new(entry.path())
                    });
                }
            }
        }
        found.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::debug!(pattern, matches = found.len(), "resolved resource pattern");
        Ok(found
            .into_iter()
            .map(|r| Box::new(r) as Box<dyn Resource>)
            .collect())
    }
}

/// Loader over a fixed set of in-memory resources keyed by location.
#[derive(Debug, Clone, Default)]
pub struct InMemoryResourceLoader {
    resources: HashMap<String, String>,
}

impl InMemoryResourceLoader {
    /// Creates an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource, returning the loader for chaining.
    #[must_use]
    pub fn with(mut self, location: impl Into<String>, content: impl Into<String>) -> Self {
        let _ = self.resources.insert(location.into(), content.into());
        self
    }
}

impl ResourceLoader for InMemoryResourceLoader {
    fn get_resource(&self, location: &str) -> Box<dyn Resource> {
        match self.resources.get(location) {
            Some(content) => Box::new(InMemoryResource::new(location, content.clone())),
            None => Box::new(InMemoryResource::missing(location)),
        }
    }

    fn get_resources(&self, pattern: &str) -> Result<Vec<Box<dyn Resource>>> {
        if !has_glob(pattern) {
            return Ok(vec![self.get_resource(pattern)]);
        }
        let matcher = Glob::new(pattern)
            .map_err(|e| TrellisError::config(format!("invalid resource pattern '{pattern}': {e}")))?
            .compile_matcher();
        let mut locations: Vec<&String> = self
            .resources
            .keys()
            .filter(|location| matcher.is_match(location.as_str()))
            .collect();
        locations.sort();
        Ok(locations
            .into_iter()
            .map(|location| self.get_resource(location))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn classpath_lookup_searches_all_roots() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(second.path().join("app.properties"), "a=1").unwrap();

        let loader = DefaultResourceLoader::new(first.path())
            .with_classpath_root(first.path())
            .with_classpath_root(second.path());
        let resource = loader.get_resource("classpath:app.properties");
        assert!(resource.exists());
        assert_eq!(resource.read_to_string().unwrap(), "a=1");
        assert_eq!(resource.description(), "class path resource [app.properties]");
    }

    #[test]
    fn missing_file_reads_as_not_found_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let loader = DefaultResourceLoader::new(dir.path());
        let resource = loader.get_resource("file:nope.properties");
        assert!(!resource.exists());
        let err = resource.read_to_string().unwrap_err();
        assert!(err.is_missing_resource());
    }

    #[test]
    fn glob_patterns_expand_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("conf/sub")).unwrap();
        fs::write(dir.path().join("conf/b.properties"), "").unwrap();
        fs::write(dir.path().join("conf/sub/a.properties"), "").unwrap();
        fs::write(dir.path().join("conf/c.yaml"), "").unwrap();

        let loader = DefaultResourceLoader::new(dir.path());
        let found = loader.get_resources("conf/**/*.properties").unwrap();
        let names: Vec<_> = found.iter().filter_map(|r| r.filename()).collect();
        assert_eq!(names, vec!["b.properties", "a.properties"]);
    }

    #[test]
    fn in_memory_loader_patterns_and_missing() {
        let loader = InMemoryResourceLoader::new()
            .with("conf/a.properties", "a=1")
            .with("conf/b.properties", "b=2");
        assert!(!loader.get_resource("conf/x").exists());
        assert_eq!(loader.get_resources("conf/*.properties").unwrap().len(), 2);
        let err = loader.get_resource("nope").read_to_string().unwrap_err();
        assert!(err.is_missing_resource());
    }

    #[test]
    fn static_prefix_stops_before_first_glob() {
        assert_eq!(static_prefix("conf/sub/*.yaml"), "conf/sub");
        assert_eq!(static_prefix("*.yaml"), "");
    }
}
