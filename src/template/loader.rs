//! Loading template sets from directories of `.html` files

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use super::registry::{TemplateError, TemplateSet};
use crate::functions::FunctionRegistry;
use crate::renderer::ExecConfig;

/// Extension of template files
pub const TEMPLATE_EXTENSION: &str = "html";

/// Errors that can occur while loading templates from disk
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("template root {path} is not usable: {source}")]
    InvalidRoot { path: PathBuf, source: io::Error },

    #[error("template root {path} is not a directory")]
    NotADirectory { path: PathBuf },

    #[error("cannot list {path}: {source}")]
    Walk { path: PathBuf, source: io::Error },

    #[error("cannot read template {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("template path {path} is not valid UTF-8")]
    NonUtf8Path { path: PathBuf },

    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl LoadError {
    /// Human readable report, with source context for parse errors
    pub fn report(&self) -> String {
        match self {
            LoadError::Template(err) => err.report(),
            other => other.to_string(),
        }
    }
}

/// Compiles every template file under one or more roots into a set
///
/// All roots feed a single [`TemplateSet`], so templates in one root can
/// call templates defined in another.
#[derive(Debug)]
pub struct TemplateLoader {
    functions: FunctionRegistry,
    config: ExecConfig,
}

impl TemplateLoader {
    pub fn new(functions: FunctionRegistry) -> Self {
        Self {
            functions,
            config: ExecConfig::default(),
        }
    }

    /// Set the execution configuration of the loaded set
    pub fn with_config(mut self, config: ExecConfig) -> Self {
        self.config = config;
        self
    }

    /// Load every `.html` file under `roots`
    ///
    /// Any unreadable file, parse error or duplicate definition aborts the
    /// whole load.
    pub fn load<P: AsRef<Path>>(self, roots: &[P]) -> Result<TemplateSet, LoadError> {
        let mut builder = TemplateSet::builder(self.functions).with_config(self.config);
        for root in roots {
            let root = resolve_root(root.as_ref())?;
            let mut files = Vec::new();
            collect(&root, &root, &mut files)?;
            files.sort();
            debug!(root = %root.display(), files = files.len(), "scanned template root");

            for (name, path) in files {
                let source = fs::read_to_string(&path).map_err(|source| LoadError::Read {
                    path: path.clone(),
                    source,
                })?;
                builder.add_source(&name, &path.display().to_string(), &source)?;
            }
        }
        Ok(builder.build()?)
    }
}

/// Load `roots` with `functions` and the default execution configuration
pub fn load<P: AsRef<Path>>(
    roots: &[P],
    functions: FunctionRegistry,
) -> Result<TemplateSet, LoadError> {
    TemplateLoader::new(functions).load(roots)
}

fn resolve_root(root: &Path) -> Result<PathBuf, LoadError> {
    let absolute = std::path::absolute(root).map_err(|source| LoadError::InvalidRoot {
        path: root.to_path_buf(),
        source,
    })?;
    let metadata = fs::metadata(&absolute).map_err(|source| LoadError::InvalidRoot {
        path: absolute.clone(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(LoadError::NotADirectory { path: absolute });
    }
    Ok(absolute)
}

/// Recursively gather `(name, path)` for every template file below `dir`
fn collect(root: &Path, dir: &Path, out: &mut Vec<(String, PathBuf)>) -> Result<(), LoadError> {
    let walk_error = |source| LoadError::Walk {
        path: dir.to_path_buf(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(walk_error)? {
        let path = entry.map_err(walk_error)?.path();
        // Symbolic links to directories are not descended into; links to
        // files are read like regular files
        let metadata = fs::symlink_metadata(&path).map_err(|source| LoadError::Walk {
            path: path.clone(),
            source,
        })?;
        if metadata.is_dir() {
            collect(root, &path, out)?;
        } else if let Some(name) = template_name(root, &path)? {
            out.push((name, path));
        }
    }
    Ok(())
}

/// Name of the template stored at `path`: its path relative to `root`,
/// joined with `/`, without the extension
///
/// Returns `None` for files that are not templates.
pub fn template_name(root: &Path, path: &Path) -> Result<Option<String>, LoadError> {
    if path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXTENSION) {
        return Ok(None);
    }
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut parts = Vec::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            let part = part.to_str().ok_or_else(|| LoadError::NonUtf8Path {
                path: path.to_path_buf(),
            })?;
            parts.push(part);
        }
    }
    let joined = parts.join("/");
    let name = joined
        .strip_suffix(TEMPLATE_EXTENSION)
        .and_then(|n| n.strip_suffix('.'))
        .unwrap_or(&joined);
    if name.is_empty() || name.ends_with('/') {
        return Ok(None);
    }
    Ok(Some(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_template_name_is_hierarchical() {
        let root = Path::new("/srv/templates");
        let name = |p: &str| template_name(root, &root.join(p)).unwrap();
        assert_eq!(name("home.html"), Some("home".to_string()));
        assert_eq!(name("forum/view.html"), Some("forum/view".to_string()));
        assert_eq!(name("a/b/c.d.html"), Some("a/b/c.d".to_string()));
        assert_eq!(name("notes.txt"), None);
        assert_eq!(name("page.htm"), None);
        assert_eq!(name(".html"), None);
    }

    #[test]
    fn test_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "home.html", "home");
        write(dir.path(), "forum/view.html", "view");
        write(dir.path(), "README.md", "{{ not a template");

        let set = load(&[dir.path()], FunctionRegistry::new()).unwrap();
        assert_eq!(set.names(), vec!["forum/view", "home"]);
        assert_eq!(set.execute("forum/view", &Value::Null).unwrap(), "view");
    }

    #[test]
    fn test_trailing_separator_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.html", "a");
        let with_slash = format!("{}/", dir.path().display());
        let set = load(&[with_slash], FunctionRegistry::new()).unwrap();
        assert_eq!(set.names(), vec!["a"]);
    }

    #[test]
    fn test_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        let err = load(&[missing], FunctionRegistry::new()).unwrap_err();
        assert!(matches!(err, LoadError::InvalidRoot { .. }));
    }

    #[test]
    fn test_root_must_be_directory() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "file.html", "x");
        let err = load(&[dir.path().join("file.html")], FunctionRegistry::new()).unwrap_err();
        assert!(matches!(err, LoadError::NotADirectory { .. }));
    }

    #[test]
    fn test_malformed_template_fails_whole_load() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.html", "fine");
        write(dir.path(), "bad.html", "{{if .x}}unterminated");
        let err = load(&[dir.path()], FunctionRegistry::new()).unwrap_err();
        match &err {
            LoadError::Template(TemplateError::Parse { name, .. }) => assert_eq!(name, "bad"),
            other => panic!("Expected parse error, got {:?}", other),
        }
        assert!(err.report().contains("bad.html"));
    }

    #[test]
    fn test_non_utf8_contents_fail() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("latin1.html"), [0x63, 0x61, 0x66, 0xe9]).unwrap();
        let err = load(&[dir.path()], FunctionRegistry::new()).unwrap_err();
        assert!(matches!(err, LoadError::Read { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_links_are_not_followed() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "pages/home.html", "home");
        symlink(dir.path(), dir.path().join("pages/loop")).unwrap();
        let outside = tempfile::tempdir().unwrap();
        write(outside.path(), "shared.html", "shared");
        symlink(outside.path().join("shared.html"), dir.path().join("linked.html")).unwrap();

        let set = load(&[dir.path()], FunctionRegistry::new()).unwrap();
        assert_eq!(set.names(), vec!["linked", "pages/home"]);
        assert_eq!(set.execute("linked", &Value::Null).unwrap(), "shared");
    }
}
