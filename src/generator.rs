//! Run pipeline: validate, inspect each item in order, render, write
//!
//! Items are processed strictly one after another so progress output and
//! failures line up with config order. Nothing is written to disk until every
//! item has resolved; any failure before that leaves the output untouched.
//! The write itself replaces the file in one rename.

use crate::config::{Config, ItemConfig};
use crate::error::GenerateError;
use crate::inspect::{extract_endpoints, ContainerInspector, ExtractError, ResolvedEndpoint};
use crate::render::{render_document, UpstreamBlock};
use std::fs::{File, Permissions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, info_span, Instrument};

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateReport {
    /// File the document was written to
    pub output: PathBuf,
    /// Number of upstream blocks written
    pub blocks: usize,
    /// Total server lines across all blocks
    pub endpoints: usize,
}

/// Drives a run against an injected inspector
pub struct Generator<I> {
    inspector: I,
}

impl<I: ContainerInspector> Generator<I> {
    pub fn new(inspector: I) -> Self {
        Self { inspector }
    }

    pub fn inspector(&self) -> &I {
        &self.inspector
    }

    /// Inspect one container and extract its endpoints
    pub async fn resolve_item(
        &self,
        index: usize,
        item: &ItemConfig,
    ) -> Result<Vec<ResolvedEndpoint>, GenerateError> {
        let container = &item.container_name;

        let output = self
            .inspector
            .inspect(container)
            .await
            .map_err(|source| GenerateError::Spawn {
                index,
                container: container.clone(),
                program: self.inspector.program().to_string(),
                source,
            })?;

        if !output.success() {
            return Err(GenerateError::InspectionFailed {
                index,
                container: container.clone(),
                code: output.code,
                stderr: output.stderr,
            });
        }

        extract_endpoints(&output.stdout).map_err(|e| match e {
            ExtractError::Empty => GenerateError::NoInspectionResult {
                index,
                container: container.clone(),
            },
            ExtractError::Malformed(source) => GenerateError::MalformedInspection {
                index,
                container: container.clone(),
                source,
            },
        })
    }

    /// Validate the config and render every item into blocks, in order
    pub async fn render(&self, config: &Config) -> Result<Vec<UpstreamBlock>, GenerateError> {
        config.validate()?;

        let mut blocks = Vec::with_capacity(config.items.len());

        for (index, item) in config.items.iter().enumerate() {
            let span = info_span!("item", index, container = %item.container_name);
            let endpoints = self.resolve_item(index, item).instrument(span).await?;

            debug!(
                index,
                container = %item.container_name,
                networks = endpoints.len(),
                "Container resolved"
            );

            let block = UpstreamBlock::render(item, &endpoints);
            for endpoint in &endpoints {
                info!(
                    "{:<30} -> {}:{} ({})",
                    item.container_name, endpoint.address, item.port, item.upstream_name
                );
            }
            blocks.push(block);
        }

        Ok(blocks)
    }

    /// Full run: render everything, then write the document to `outputLocation`
    pub async fn run(&self, config: &Config) -> Result<GenerateReport, GenerateError> {
        let blocks = self.render(config).await?;
        let document = render_document(&blocks);

        write_output(&config.output_location, &document).await?;

        let report = GenerateReport {
            output: config.output_location.clone(),
            blocks: blocks.len(),
            endpoints: blocks.iter().map(|b| b.servers.len()).sum(),
        };

        info!(
            path = %report.output.display(),
            blocks = report.blocks,
            endpoints = report.endpoints,
            "Wrote config to {}",
            report.output.display()
        );

        Ok(report)
    }
}

/// Write `document` to `path`, creating the parent directory when missing.
///
/// The document goes to a temporary file next to `path` which then replaces
/// it, so a failed write never leaves a truncated config behind.
pub async fn write_output(path: &Path, document: &str) -> Result<(), GenerateError> {
    let io_err = |source| GenerateError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            if !tokio::fs::try_exists(parent).await.map_err(io_err)? {
                debug!(dir = %parent.display(), "Creating output directory");
                tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
            }
            parent.to_path_buf()
        }
        None => PathBuf::from("."),
    };

    let target = path.to_path_buf();
    let document = document.to_owned();
    tokio::task::spawn_blocking(move || {
        replace_file(&target, &dir, |file| file.write_all(document.as_bytes()))
    })
    .await
    .map_err(io::Error::other)
    .and_then(|result| result)
    .map_err(io_err)
}

/// Replace `path` with whatever `write` puts into a temp file in `dir`
fn replace_file<F>(path: &Path, dir: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let mut tmp = NamedTempFile::new_in(dir)?;
    write(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;

    // Temp files are created 0600; keep what the old file had instead
    let permissions = match std::fs::metadata(path) {
        Ok(meta) => Some(meta.permissions()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => new_file_permissions(),
        Err(e) => return Err(e),
    };
    if let Some(permissions) = permissions {
        tmp.as_file().set_permissions(permissions)?;
    }

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(unix)]
fn new_file_permissions() -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<Permissions> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::InspectOutput;
    use std::collections::HashMap;

    /// Inspector returning canned output keyed by container name
    struct StaticInspector {
        outputs: HashMap<String, InspectOutput>,
    }

    impl StaticInspector {
        fn new(entries: &[(&str, i32, &str)]) -> Self {
            let outputs = entries
                .iter()
                .map(|(name, code, stdout)| {
                    (
                        name.to_string(),
                        InspectOutput {
                            code: Some(*code),
                            stdout: stdout.to_string(),
                            stderr: if *code == 0 {
                                String::new()
                            } else {
                                format!("Error: No such object: {}", name)
                            },
                        },
                    )
                })
                .collect();
            Self { outputs }
        }
    }

    impl ContainerInspector for StaticInspector {
        async fn inspect(&self, container: &str) -> std::io::Result<InspectOutput> {
            self.outputs.get(container).cloned().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "runtime not installed")
            })
        }

        fn program(&self) -> &str {
            "static"
        }
    }

    const BRIDGE: &str = r#"[{"NetworkSettings":{"Networks":{"bridge":{"IPAddress":"172.17.0.2"}}}}]"#;

    #[tokio::test]
    async fn test_resolve_item_success() {
        let generator = Generator::new(StaticInspector::new(&[("web", 0, BRIDGE)]));

        let endpoints = generator
            .resolve_item(0, &ItemConfig::new("web", "web", 80))
            .await
            .unwrap();
        assert_eq!(endpoints, vec![ResolvedEndpoint::new("bridge", "172.17.0.2")]);
    }

    #[tokio::test]
    async fn test_resolve_item_failed_exit() {
        let generator = Generator::new(StaticInspector::new(&[("web", 1, "")]));

        let err = generator
            .resolve_item(4, &ItemConfig::new("web", "web", 80))
            .await
            .unwrap_err();
        match err {
            GenerateError::InspectionFailed {
                index,
                container,
                code,
                stderr,
            } => {
                assert_eq!(index, 4);
                assert_eq!(container, "web");
                assert_eq!(code, Some(1));
                assert!(stderr.contains("No such object: web"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_item_empty_result() {
        let generator = Generator::new(StaticInspector::new(&[("web", 0, "[]")]));

        let err = generator
            .resolve_item(0, &ItemConfig::new("web", "web", 80))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::NoInspectionResult { index: 0, .. }));
    }

    #[tokio::test]
    async fn test_resolve_item_malformed_output() {
        let generator = Generator::new(StaticInspector::new(&[("web", 0, "not json")]));

        let err = generator
            .resolve_item(2, &ItemConfig::new("web", "web", 80))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::MalformedInspection { index: 2, .. }));
    }

    #[tokio::test]
    async fn test_resolve_item_spawn_failure() {
        let generator = Generator::new(StaticInspector::new(&[]));

        let err = generator
            .resolve_item(1, &ItemConfig::new("web", "web", 80))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::Spawn { index: 1, .. }));
        assert!(err.to_string().contains("failed to run 'static'"));
    }

    #[tokio::test]
    async fn test_render_rejects_invalid_config() {
        let generator = Generator::new(StaticInspector::new(&[("web", 0, BRIDGE)]));
        let config = Config::new("out.conf", vec![]);

        let err = generator.render(&config).await.unwrap_err();
        assert!(matches!(err, GenerateError::ConfigInvalid(_)));
    }

    #[tokio::test]
    async fn test_write_output_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/upstreams.conf");

        write_output(&path, "upstream a {\n}\n\n").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "upstream a {\n}\n\n"
        );
    }

    #[tokio::test]
    async fn test_write_output_into_file_parent_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let err = write_output(&blocker.join("upstreams.conf"), "")
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::Io { .. }));
        assert_eq!(err.exit_code(), 4);
    }

    #[tokio::test]
    async fn test_write_output_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upstreams.conf");
        std::fs::write(&path, "upstream old {\n}\n\n").unwrap();

        write_output(&path, "upstream new {\n}\n\n").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "upstream new {\n}\n\n"
        );

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_failed_write_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upstreams.conf");
        std::fs::write(&path, "upstream old {\n}\n\n").unwrap();

        let err = replace_file(&path, dir.path(), |file| {
            file.write_all(b"upstream new {\n    ser")?;
            Err(io::Error::other("disk full"))
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "disk full");

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "upstream old {\n}\n\n"
        );
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("upstreams.conf")]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_output_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upstreams.conf");
        std::fs::write(&path, "").unwrap();
        std::fs::set_permissions(&path, Permissions::from_mode(0o640)).unwrap();

        write_output(&path, "upstream a {\n}\n\n").await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);

        let fresh = dir.path().join("fresh.conf");
        write_output(&fresh, "").await.unwrap();
        let mode = std::fs::metadata(&fresh).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
