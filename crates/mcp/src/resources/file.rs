// Local filesystem resources (`file://` scheme) confined to configured roots

use super::{ensure_scheme, ResourceProvider};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use toolhost_core::{ResourceInfo, ToolhostError, ToolhostResult};
use walkdir::WalkDir;

pub const FILE_SCHEME: &str = "file";

const DEFAULT_MAX_ENTRIES: usize = 1_000;

#[derive(Debug, Clone)]
struct Root {
    /// Absolute, lexically normalised form as configured
    path: PathBuf,
    /// Symlink-resolved form
    canonical: PathBuf,
}

/// Serves files below one or more root directories.
///
/// `file://<path>` with a relative path is looked up under each root in
/// order; an absolute path is used as-is. Either way the resolved path must
/// stay inside a root, both before and after symlinks are followed.
/// Anything else is reported as "access denied".
#[derive(Debug, Clone)]
pub struct LocalFileProvider {
    roots: Vec<Root>,
    max_entries: usize,
}

impl LocalFileProvider {
    pub fn new<I, P>(roots: I) -> ToolhostResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let cwd = std::env::current_dir()
            .map_err(|e| ToolhostError::Configuration(format!("no working directory: {}", e)))?;

        let roots = roots
            .into_iter()
            .map(|root| {
                let path = normalize(&cwd.join(root.as_ref()));
                let canonical = path.canonicalize().map_err(|e| {
                    ToolhostError::Configuration(format!(
                        "resource path {} is not accessible: {}",
                        path.display(),
                        e
                    ))
                })?;
                if !canonical.is_dir() {
                    return Err(ToolhostError::Configuration(format!(
                        "resource path {} is not a directory",
                        path.display()
                    )));
                }
                Ok(Root { path, canonical })
            })
            .collect::<ToolhostResult<Vec<_>>>()?;

        Ok(Self {
            roots,
            max_entries: DEFAULT_MAX_ENTRIES,
        })
    }

    /// Cap on the number of files returned by `list_resources`
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn roots(&self) -> Vec<&Path> {
        self.roots.iter().map(|r| r.canonical.as_path()).collect()
    }

    fn lexically_contained(&self, path: &Path) -> bool {
        self.roots
            .iter()
            .any(|r| path.starts_with(&r.path) || path.starts_with(&r.canonical))
    }

    fn canonically_contained(&self, path: &Path) -> bool {
        self.roots.iter().any(|r| path.starts_with(&r.canonical))
    }

    /// Map a URI to a canonical path inside one of the roots
    async fn resolve(&self, uri: &str) -> ToolhostResult<PathBuf> {
        let parsed = ensure_scheme(uri, FILE_SCHEME)?;
        let requested = Path::new(parsed.identifier());
        if parsed.identifier().is_empty() {
            return Err(ToolhostError::not_found(uri));
        }

        let candidates: Vec<PathBuf> = if requested.is_absolute() {
            vec![normalize(requested)]
        } else {
            self.roots
                .iter()
                .map(|root| normalize(&root.path.join(requested)))
                .collect()
        };

        let mut denied = false;
        for candidate in candidates {
            if !self.lexically_contained(&candidate) {
                denied = true;
                continue;
            }

            let Ok(canonical) = tokio::fs::canonicalize(&candidate).await else {
                continue;
            };

            if self.canonically_contained(&canonical) {
                return Ok(canonical);
            }
            tracing::warn!(uri, resolved = %canonical.display(), "Symlink escapes resource root");
            denied = true;
        }

        if denied {
            Err(ToolhostError::access_denied(uri))
        } else {
            Err(ToolhostError::not_found(uri))
        }
    }

    fn display_name(&self, path: &Path) -> String {
        self.roots
            .iter()
            .find_map(|r| path.strip_prefix(&r.canonical).ok())
            .unwrap_or(path)
            .display()
            .to_string()
    }

    fn describe(&self, path: &Path, metadata: &std::fs::Metadata) -> ResourceInfo {
        let name = self.display_name(path);
        let mut info = ResourceInfo::new(
            name.clone(),
            format!("{}://{}", FILE_SCHEME, path.display()),
            format!("File {}", name),
        )
        .with_size(metadata.len())
        .with_metadata("path", path.display().to_string());

        if let Some(mime) = mime_guess::from_path(path).first() {
            info = info.with_mime_type(mime.essence_str());
        }
        if let Ok(modified) = metadata.modified() {
            info = info.with_metadata("modified", DateTime::<Utc>::from(modified).to_rfc3339());
        }

        info
    }
}

#[async_trait::async_trait]
impl ResourceProvider for LocalFileProvider {
    fn scheme(&self) -> &str {
        FILE_SCHEME
    }

    async fn list_resources(&self) -> ToolhostResult<Vec<ResourceInfo>> {
        let provider = self.clone();

        tokio::task::spawn_blocking(move || {
            let mut resources = Vec::new();

            'roots: for root in &provider.roots {
                let walker = WalkDir::new(&root.canonical)
                    .follow_links(false)
                    .sort_by_file_name();
                for entry in walker {
                    let entry = match entry {
                        Ok(entry) => entry,
                        Err(e) => {
                            tracing::warn!(
                                "Skipping unreadable entry under {}: {}",
                                root.canonical.display(),
                                e
                            );
                            continue;
                        }
                    };
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    if resources.len() >= provider.max_entries {
                        tracing::debug!(
                            "Resource listing truncated at {} entries",
                            provider.max_entries
                        );
                        break 'roots;
                    }
                    match entry.metadata() {
                        Ok(metadata) => resources.push(provider.describe(entry.path(), &metadata)),
                        Err(e) => tracing::warn!("Skipping {}: {}", entry.path().display(), e),
                    }
                }
            }

            resources
        })
        .await
        .map_err(|e| ToolhostError::ResourceNotFound(format!("failed to list files: {}", e)))
    }

    async fn get_resource_info(&self, uri: &str) -> ToolhostResult<ResourceInfo> {
        let path = self.resolve(uri).await?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| ToolhostError::ResourceNotFound(format!("{}: {}", uri, e)))?;
        if !metadata.is_file() {
            return Err(ToolhostError::ResourceNotFound(format!("{}: not a file", uri)));
        }
        Ok(self.describe(&path, &metadata))
    }

    async fn read_resource(&self, uri: &str) -> ToolhostResult<Bytes> {
        let path = self.resolve(uri).await?;
        if !tokio::fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
            return Err(ToolhostError::ResourceNotFound(format!("{}: not a file", uri)));
        }

        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| ToolhostError::ResourceNotFound(format!("{}: {}", uri, e)))?;
        Ok(Bytes::from(data))
    }
}

/// Resolve `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}
