// NodeSleuth - platform/source.rs
//
// Directory-backed log source.
//
// Layout: one subdirectory per node, one `<unit>.log` journal dump per unit:
//
//   <root>/master-0/kubelet.log
//   <root>/master-0/crio.log
//   <root>/worker-a/kubelet.log
//
// A unit with no dump file reads as an empty journal. Only genuine read
// failures are reported as errors.

use crate::app::collect::LogSource;
use crate::util::constants;
use crate::util::error::SourceError;
use std::io;
use std::path::PathBuf;

/// Journal dumps laid out as `<root>/<node>/<unit>.log`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of `unit`'s dump for `node`.
    pub fn unit_path(&self, node: &str, unit: &str) -> PathBuf {
        self.root
            .join(node)
            .join(format!("{unit}.{}", constants::UNIT_LOG_EXTENSION))
    }

    /// Node directory, or `None` when `node` does not name a direct child
    /// directory of the root.
    fn node_dir(&self, node: &str) -> Option<PathBuf> {
        if node.is_empty() || node.starts_with('.') || node.contains(['/', '\\']) {
            return None;
        }
        let dir = self.root.join(node);
        dir.is_dir().then_some(dir)
    }
}

impl LogSource for DirectorySource {
    /// Child directories of the root, sorted by name. Hidden directories are
    /// skipped.
    fn nodes(&self) -> Result<Vec<String>, SourceError> {
        if !self.root.is_dir() {
            return Err(SourceError::NodeListing {
                root: self.root.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "not a directory"),
            });
        }

        let mut nodes = Vec::new();
        let walker = walkdir::WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name();
        for entry in walker {
            let entry = entry.map_err(|source| SourceError::Traversal {
                path: self.root.clone(),
                source,
            })?;
            if !entry.file_type().is_dir() {
                continue;
            }
            match entry.file_name().to_str() {
                Some(name) if !name.starts_with('.') => nodes.push(name.to_string()),
                Some(_) => {}
                None => {
                    tracing::warn!(
                        path = %entry.path().display(),
                        "Skipping node directory with non-UTF-8 name"
                    );
                }
            }
        }

        tracing::debug!(root = %self.root.display(), nodes = nodes.len(), "Nodes listed");
        Ok(nodes)
    }

    fn fetch(&self, node: &str, unit: &str) -> Result<Vec<u8>, SourceError> {
        if self.node_dir(node).is_none() {
            return Err(SourceError::UnknownNode {
                node: node.to_string(),
            });
        }

        let path = self.unit_path(node, unit);
        match std::fs::read(&path) {
            Ok(bytes) => {
                tracing::debug!(
                    node,
                    unit,
                    bytes = bytes.len(),
                    path = %path.display(),
                    "Journal read"
                );
                Ok(bytes)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(
                    node,
                    unit,
                    path = %path.display(),
                    "No journal dump; treating as empty"
                );
                Ok(Vec::new())
            }
            Err(source) => Err(SourceError::Io {
                node: node.to_string(),
                unit: unit.to_string(),
                path,
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn layout() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for node in ["master-1", "master-0", ".cache"] {
            fs::create_dir(dir.path().join(node)).unwrap();
        }
        fs::write(dir.path().join("README.txt"), "not a node").unwrap();
        fs::write(dir.path().join("master-0").join("kubelet.log"), "line one\n").unwrap();
        dir
    }

    #[test]
    fn test_nodes_are_sorted_directories() {
        let dir = layout();
        let source = DirectorySource::new(dir.path());
        assert_eq!(source.nodes().unwrap(), vec!["master-0", "master-1"]);
    }

    #[test]
    fn test_missing_root_is_listing_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectorySource::new(dir.path().join("absent"));
        assert!(matches!(
            source.nodes(),
            Err(SourceError::NodeListing { .. })
        ));
    }

    #[test]
    fn test_fetch_reads_unit_dump() {
        let dir = layout();
        let source = DirectorySource::new(dir.path());
        assert_eq!(source.fetch("master-0", "kubelet").unwrap(), b"line one\n");
    }

    #[test]
    fn test_missing_unit_dump_is_empty() {
        let dir = layout();
        let source = DirectorySource::new(dir.path());
        assert!(source.fetch("master-1", "crio").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_or_escaping_node_rejected() {
        let dir = layout();
        let source = DirectorySource::new(dir.path());
        for node in ["worker-9", "../master-0", ".cache", ""] {
            assert!(
                matches!(source.fetch(node, "kubelet"), Err(SourceError::UnknownNode { .. })),
                "node {node:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_unreadable_dump_is_io_error() {
        let dir = layout();
        // A directory where the dump should be fails to read as a file.
        fs::create_dir(dir.path().join("master-1").join("crio.log")).unwrap();
        let source = DirectorySource::new(dir.path());
        assert!(matches!(
            source.fetch("master-1", "crio"),
            Err(SourceError::Io { .. })
        ));
    }
}
