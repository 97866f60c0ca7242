use crate::directives::GrabDirective;
use crate::errors::{FilterError, Result};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Turns a grab coordinate into module source text.
///
/// Injected into compilation; a failure here fails startup.
pub trait DependencyResolver: Send + Sync {
    fn resolve(&self, coordinate: &str, extension: &str) -> Result<String>;
}

/// A grabbed module ready to be compiled by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub alias: String,
    pub coordinate: String,
    pub source: String,
}

/// Resolve every directive through `resolver`, stopping at the first failure.
pub fn resolve_all(
    directives: &[GrabDirective],
    resolver: &dyn DependencyResolver,
    extension: &str,
) -> Result<Vec<ResolvedModule>> {
    directives
        .iter()
        .map(|d| {
            let source = resolver.resolve(&d.coordinate, extension)?;
            tracing::info!(coordinate = %d.coordinate, alias = %d.alias, "module resolved");
            Ok(ResolvedModule { alias: d.alias.clone(), coordinate: d.coordinate.clone(), source })
        })
        .collect()
}

/// Rejects every directive. The default when no module path is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResolver;

impl DependencyResolver for NoResolver {
    fn resolve(&self, coordinate: &str, _extension: &str) -> Result<String> {
        Err(FilterError::ScriptCompile(format!(
            "cannot resolve module '{coordinate}': no module path configured"
        )))
    }
}

/// Looks `<root>/<coordinate>.<ext>` up in each root, first hit wins.
/// `:` in a coordinate is treated as a path separator.
#[derive(Debug, Clone, Default)]
pub struct DirectoryResolver {
    roots: Vec<PathBuf>,
}

impl DirectoryResolver {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self { roots: roots.into_iter().map(Into::into).collect() }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn relative_path(coordinate: &str, extension: &str) -> Result<PathBuf> {
        let rel = PathBuf::from(format!("{}.{extension}", coordinate.replace(':', "/")));
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(FilterError::ScriptCompile(format!(
                "module coordinate '{coordinate}' must be a relative path inside the module path"
            )));
        }
        Ok(rel)
    }
}

impl DependencyResolver for DirectoryResolver {
    fn resolve(&self, coordinate: &str, extension: &str) -> Result<String> {
        let rel = Self::relative_path(coordinate, extension)?;
        for root in &self.roots {
            let candidate = root.join(&rel);
            if !candidate.is_file() {
                tracing::trace!(candidate = %candidate.display(), "module not here");
                continue;
            }
            return read_module(&candidate, coordinate);
        }
        Err(FilterError::ScriptCompile(format!(
            "cannot resolve module '{coordinate}' in {} module root(s)",
            self.roots.len()
        )))
    }
}

fn read_module(path: &Path, coordinate: &str) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        FilterError::ScriptCompile(format!(
            "cannot read module '{coordinate}' from '{}': {e}",
            path.display()
        ))
    })
}

/// In-memory modules keyed by coordinate, whatever the extension.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    modules: HashMap<String, String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, coordinate: impl Into<String>, source: impl Into<String>) -> Self {
        self.modules.insert(coordinate.into(), source.into());
        self
    }
}

impl DependencyResolver for StaticResolver {
    fn resolve(&self, coordinate: &str, _extension: &str) -> Result<String> {
        self.modules
            .get(coordinate)
            .cloned()
            .ok_or_else(|| FilterError::ScriptCompile(format!("unknown module '{coordinate}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn directory_lookup_walks_roots_in_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(second.path().join("org")).unwrap();
        std::fs::write(second.path().join("org/bounds.rhai"), "fn below(x, b) { x < b }").unwrap();

        let resolver = DirectoryResolver::new([first.path(), second.path()]);
        let src = resolver.resolve("org:bounds", "rhai").unwrap();
        assert_eq!(src, "fn below(x, b) { x < b }");
        assert!(resolver.resolve("org:bounds", "expr").is_err());
    }

    #[test]
    fn escaping_coordinates_are_refused() {
        let resolver = DirectoryResolver::new(["."]);
        assert!(matches!(
            resolver.resolve("../secrets", "rhai"),
            Err(FilterError::ScriptCompile(_))
        ));
        assert!(resolver.resolve("/etc/passwd", "rhai").is_err());
    }

    #[test]
    fn no_resolver_fails_every_directive() {
        let d = GrabDirective { coordinate: "x".into(), alias: "x".into(), line: 1 };
        assert!(resolve_all(&[d], &NoResolver, "expr").is_err());
        assert!(resolve_all(&[], &NoResolver, "expr").unwrap().is_empty());
    }
}
