//! # Descriptor Resolver
//!
//! Turns a directory of `.proto` sources into a [`ProtoDescriptorSet`].
//!
//! Resolution happens in three steps:
//!
//! 1. **Discovery**: the root directory is walked recursively (sorted by file name, so the
//!    result is deterministic). Directories named after a vendor marker (`third_party` by
//!    default) are pruned.
//! 2. **Filename resolution**: every discovered file is mapped to its name relative to the
//!    first import root that contains it. That name is how other files import it.
//! 3. **Parsing**: the files are compiled by [`protox`] into a `prost_reflect::DescriptorPool`.
//!
//! Any failure aborts the whole call, a partially-resolved set is never returned.
use miette::Diagnostic;
use prost_reflect::{DescriptorError, DescriptorPool, FileDescriptor};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directory names skipped during discovery unless configured otherwise.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &["third_party"];

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("No .proto files found under '{}'", .0.display())]
    NoProtoFilesFound(PathBuf),
    #[error("Failed to read '{}': '{source}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to resolve '{name}': '{reason}'")]
    FilenameResolution { name: String, reason: String },
    #[error("Failed to parse '{file}'{}: '{message}'", at_line(.line))]
    Parse {
        file: String,
        line: Option<usize>,
        message: String,
    },
}

fn at_line(line: &Option<usize>) -> String {
    line.map(|line| format!(" at line {line}"))
        .unwrap_or_default()
}

/// Knobs for discovery and import resolution.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Roots that `import` statements are resolved against, in priority order.
    /// When empty, the parent directory of every input file is used instead.
    pub import_paths: Vec<PathBuf>,
    /// Directory names pruned from discovery.
    pub excluded_dirs: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            import_paths: Vec::new(),
            excluded_dirs: DEFAULT_EXCLUDED_DIRS
                .iter()
                .map(|dir| dir.to_string())
                .collect(),
        }
    }
}

/// An immutable, fully linked set of descriptors.
///
/// Besides the pool (which also holds every imported file) it remembers which files were
/// resolved explicitly, in discovery order.
#[derive(Debug, Clone)]
pub struct ProtoDescriptorSet {
    pool: DescriptorPool,
    files: Vec<String>,
}

impl ProtoDescriptorSet {
    /// Decodes a binary `FileDescriptorSet` (as produced by `protoc --descriptor_set_out`).
    ///
    /// Every file of the set counts as explicitly resolved.
    pub fn decode(bytes: &[u8]) -> Result<Self, DescriptorError> {
        let pool = DescriptorPool::decode(bytes)?;
        let files = pool.files().map(|f| f.name().to_string()).collect();
        Ok(Self { pool, files })
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Names of the explicitly resolved files, in discovery order.
    pub fn file_names(&self) -> &[String] {
        &self.files
    }

    /// Descriptors of the explicitly resolved files, in discovery order.
    pub fn files(&self) -> impl Iterator<Item = FileDescriptor> + '_ {
        self.files
            .iter()
            .filter_map(|name| self.pool.get_file_by_name(name))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Resolver {
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Discovers and parses every `.proto` file under `root`.
    pub fn resolve(&self, root: &Path) -> Result<ProtoDescriptorSet, ResolveError> {
        let files = self.discover(root)?;
        self.resolve_files(&files)
    }

    /// Recursively lists the `.proto` files under `root`, pruning excluded directories.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<PathBuf>)` - At least one file, sorted by path.
    /// * `Err(ResolveError::NoProtoFilesFound)` - If the tree holds no `.proto` file.
    /// * `Err(ResolveError::Io)` - If `root` itself cannot be read.
    pub fn discover(&self, root: &Path) -> Result<Vec<PathBuf>, ResolveError> {
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let excluded = entry.depth() > 0
                    && entry.file_type().is_dir()
                    && self
                        .config
                        .excluded_dirs
                        .iter()
                        .any(|dir| entry.file_name() == dir.as_str());
                if excluded {
                    tracing::debug!(path = %entry.path().display(), "Skipping vendor directory");
                }
                !excluded
            });

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => {
                    return Err(ResolveError::Io {
                        path: root.to_path_buf(),
                        source: err.into(),
                    });
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Skipping unreadable entry");
                    continue;
                }
            };

            let is_proto = entry.path().extension().is_some_and(|ext| ext == "proto");
            if entry.file_type().is_file() && is_proto {
                files.push(entry.into_path());
            }
        }

        if files.is_empty() {
            return Err(ResolveError::NoProtoFilesFound(root.to_path_buf()));
        }

        Ok(files)
    }

    /// Parses the given files into a descriptor set.
    ///
    /// Each file must live under one of the configured import roots (or, when none are
    /// configured, its own directory is used as a root).
    pub fn resolve_files(&self, files: &[PathBuf]) -> Result<ProtoDescriptorSet, ResolveError> {
        if files.is_empty() {
            return Err(ResolveError::NoProtoFilesFound(PathBuf::new()));
        }

        let files = files
            .iter()
            .map(|file| canonicalize(file))
            .collect::<Result<Vec<_>, _>>()?;

        let roots = if self.config.import_paths.is_empty() {
            infer_import_paths(&files)
        } else {
            self.config
                .import_paths
                .iter()
                .map(|root| canonicalize(root))
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut names = Vec::with_capacity(files.len());
        let mut sources = HashMap::with_capacity(files.len());
        for file in &files {
            let name = relative_name(file, &roots).ok_or_else(|| {
                ResolveError::FilenameResolution {
                    name: file.display().to_string(),
                    reason: "file does not reside in any import path".to_string(),
                }
            })?;
            if let Some(shadow) = shadowing_file(file, &name, &roots) {
                return Err(ResolveError::FilenameResolution {
                    reason: format!(
                        "'{}' is shadowed by '{}' in the import paths",
                        file.display(),
                        shadow.display()
                    ),
                    name,
                });
            }
            if sources.insert(name.clone(), file.clone()).is_none() {
                names.push(name);
            }
        }

        let mut compiler =
            protox::Compiler::new(&roots).map_err(|err| classify(err, &sources))?;
        compiler.include_imports(true);
        for name in &names {
            compiler
                .open_file(&sources[name])
                .map_err(|err| classify(err, &sources))?;
        }

        let pool = compiler.descriptor_pool();
        tracing::debug!(
            files = names.len(),
            total_files = pool.files().len(),
            "Resolved proto files"
        );

        Ok(ProtoDescriptorSet { pool, files: names })
    }
}

/// Resolves every `.proto` file under `root`.
///
/// `root` is always the first import root; `extra_import` (shared/common definitions) is
/// searched after it.
pub fn resolve(root: &Path, extra_import: Option<&Path>) -> Result<ProtoDescriptorSet, ResolveError> {
    let import_paths = std::iter::once(root)
        .chain(extra_import)
        .map(Path::to_path_buf)
        .collect();

    Resolver::new(ResolverConfig {
        import_paths,
        ..ResolverConfig::default()
    })
    .resolve(root)
}

fn canonicalize(path: &Path) -> Result<PathBuf, ResolveError> {
    std::fs::canonicalize(path).map_err(|source| ResolveError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn infer_import_paths(files: &[PathBuf]) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = Vec::new();
    for parent in files.iter().filter_map(|file| file.parent()) {
        if !roots.iter().any(|root| root == parent) {
            roots.push(parent.to_path_buf());
        }
    }
    roots
}

/// The `/`-separated path of `file` relative to the first root containing it.
fn relative_name(file: &Path, roots: &[PathBuf]) -> Option<String> {
    let relative = roots.iter().find_map(|root| file.strip_prefix(root).ok())?;
    let segments: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    Some(segments.join("/"))
}

fn classify(err: protox::Error, sources: &HashMap<String, PathBuf>) -> ResolveError {
    let file = err.file().map(str::to_owned);

    if is_unresolved_file(&err) {
        return ResolveError::FilenameResolution {
            name: file.unwrap_or_else(|| "<unknown>".to_string()),
            reason: err.to_string(),
        };
    }

    let line = file
        .as_deref()
        .and_then(|name| sources.get(name))
        .and_then(|path| {
            let offset = first_offset(&err)?;
            let source = std::fs::read_to_string(path).ok()?;
            Some(source.get(..offset)?.matches('\n').count() + 1)
        });

    ResolveError::Parse {
        file: file.unwrap_or_else(|| "<unknown>".to_string()),
        line,
        message: err.to_string(),
    }
}

/// A file with the same relative name under an earlier import root, which is what an
/// `import` of `name` would load instead of `file`.
fn shadowing_file(file: &Path, name: &str, roots: &[PathBuf]) -> Option<PathBuf> {
    roots
        .iter()
        .take_while(|root| !file.starts_with(root))
        .map(|root| root.join(name))
        .find(|candidate| candidate.is_file())
}

/// Files outside every import root and shadowed files are rejected before compiling, so
/// the only unresolved files left are missing imports.
fn is_unresolved_file(err: &protox::Error) -> bool {
    // A missing import reads "import '<name>' not found".
    err.is_file_not_found() || err.to_string().contains("not found")
}

fn first_offset(diagnostic: &dyn Diagnostic) -> Option<usize> {
    if let Some(mut labels) = diagnostic.labels()
        && let Some(label) = labels.next()
    {
        return Some(label.offset());
    }
    diagnostic.related()?.find_map(first_offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    const GREET: &str = r#"
syntax = "proto3";
package greet;
service Greeter { rpc Hello(HelloReq) returns (HelloResp); }
message HelloReq { string name = 1; }
message HelloResp { string greeting = 1; }
"#;

    #[test]
    fn test_discover_prunes_vendor_dirs() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b.proto", GREET);
        write(dir.path(), "a/a.proto", "syntax = \"proto3\";");
        write(dir.path(), "third_party/google/vendored.proto", "syntax = \"proto3\";");
        write(dir.path(), "notes.txt", "not a proto");

        let files = Resolver::default().discover(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();

        assert_eq!(
            names,
            vec![PathBuf::from("a/a.proto"), PathBuf::from("b.proto")]
        );
    }

    #[test]
    fn test_no_proto_files_found() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "third_party/only.proto", GREET);

        let result = resolve(dir.path(), None);

        assert!(matches!(result, Err(ResolveError::NoProtoFilesFound(_))));
    }

    #[test]
    fn test_missing_root_is_io_error() {
        let dir = TempDir::new().unwrap();

        let result = resolve(&dir.path().join("ghost"), None);

        assert!(matches!(result, Err(ResolveError::Io { .. })));
    }

    #[test]
    fn test_resolve_with_extra_import_root() {
        let root = TempDir::new().unwrap();
        let shared = TempDir::new().unwrap();
        write(
            shared.path(),
            "common/money.proto",
            "syntax = \"proto3\"; package common; message Money { int64 units = 1; }",
        );
        write(
            root.path(),
            "shop/shop.proto",
            r#"
syntax = "proto3";
package shop;
import "common/money.proto";
service Shop { rpc Price(PriceReq) returns (common.Money); }
message PriceReq { string sku = 1; }
"#,
        );

        let set = resolve(root.path(), Some(shared.path())).unwrap();

        assert_eq!(set.file_names(), ["shop/shop.proto"]);
        assert!(set.pool().get_message_by_name("common.Money").is_some());
    }

    #[test]
    fn test_unresolvable_import() {
        let root = TempDir::new().unwrap();
        write(
            root.path(),
            "shop.proto",
            "syntax = \"proto3\"; import \"common/missing.proto\";",
        );

        let result = resolve(root.path(), None);

        assert!(
            matches!(result, Err(ResolveError::FilenameResolution { .. })),
            "got {result:?}"
        );
    }

    #[test]
    fn test_file_outside_import_paths() {
        let root = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        write(root.path(), "greet.proto", GREET);

        let resolver = Resolver::new(ResolverConfig {
            import_paths: vec![elsewhere.path().to_path_buf()],
            ..ResolverConfig::default()
        });
        let result = resolver.resolve(root.path());

        assert!(matches!(
            result,
            Err(ResolveError::FilenameResolution { .. })
        ));
    }

    #[test]
    fn test_shadowed_file_is_a_resolution_error() {
        let root = TempDir::new().unwrap();
        write(root.path(), "a/api.proto", "syntax = \"proto3\"; package a;");
        write(root.path(), "b/api.proto", "syntax = \"proto3\"; package b;");

        match Resolver::default().resolve(root.path()) {
            Err(ResolveError::FilenameResolution { name, reason }) => {
                assert_eq!(name, "api.proto");
                assert!(reason.contains("shadowed"), "got {reason}");
            }
            other => panic!("Expected a filename resolution error, got {other:?}"),
        }
    }

    #[test]
    fn test_inferred_import_paths() {
        let root = TempDir::new().unwrap();
        write(root.path(), "nested/deep/greet.proto", GREET);

        let files = Resolver::default().discover(root.path()).unwrap();
        let set = Resolver::default().resolve_files(&files).unwrap();

        assert_eq!(set.file_names(), ["greet.proto"]);
    }

    #[test]
    fn test_parse_error_reports_file_and_line() {
        let root = TempDir::new().unwrap();
        write(
            root.path(),
            "broken.proto",
            "syntax = \"proto3\";\n\nmessage Broken {\n  string name = ;\n}\n",
        );

        match resolve(root.path(), None) {
            Err(ResolveError::Parse { file, line, .. }) => {
                assert_eq!(file, "broken.proto");
                assert_eq!(line, Some(4));
            }
            other => panic!("Expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_symbols_fail_the_whole_resolve() {
        let root = TempDir::new().unwrap();
        write(root.path(), "a.proto", GREET);
        write(root.path(), "b.proto", GREET);

        let result = resolve(root.path(), None);

        assert!(matches!(result, Err(ResolveError::Parse { .. })));
    }
}
