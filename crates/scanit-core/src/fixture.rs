use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{HarnessError, Result};
use crate::report::model::{FixtureDigest, FixtureInfo};

/// A project directory copied into a private temporary location.
///
/// Builds mutate their input tree, so every scenario works on its own copy.
/// The copy is removed when the fixture is dropped.
#[derive(Debug)]
pub struct ProjectFixture {
    name: String,
    dir: TempDir,
    files: usize,
    digest: String,
}

impl ProjectFixture {
    /// Copies `<root>/<name>` and fingerprints its contents.
    ///
    /// The fingerprint covers relative paths and file bytes in sorted order,
    /// so it is independent of timestamps and of where the copy lives.
    pub fn stage(root: &Path, name: &str) -> Result<Self> {
        stage_inner(root, name).map_err(HarnessError::Io)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn files(&self) -> usize {
        self.files
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn info(&self) -> FixtureInfo {
        FixtureInfo {
            name: self.name.clone(),
            files: self.files,
            digest: FixtureDigest {
                algorithm: "sha256".to_string(),
                value: self.digest.clone(),
            },
        }
    }
}

fn stage_inner(root: &Path, name: &str) -> anyhow::Result<ProjectFixture> {
    let source: PathBuf = root.join(name);
    if !source.is_dir() {
        bail!("fixture directory not found: {}", source.display());
    }

    let dir = tempfile::Builder::new()
        .prefix(&format!("scanit-{name}-"))
        .tempdir()
        .context("failed to create staging directory")?;

    let mut hasher = Sha256::new();
    let mut files = 0;
    for entry in WalkDir::new(&source).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", source.display()))?;
        let relative = entry.path().strip_prefix(&source)?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dir.path().join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("failed to create {}", target.display()))?;
            continue;
        }

        let bytes = fs::read(entry.path())
            .with_context(|| format!("failed to read {}", entry.path().display()))?;
        fs::write(&target, &bytes)
            .with_context(|| format!("failed to write {}", target.display()))?;

        let components: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect();
        hasher.update(components.join("/").as_bytes());
        hasher.update([0u8]);
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
        files += 1;
    }

    let digest = hex::encode(hasher.finalize());
    debug!(fixture = name, files, %digest, staged = %dir.path().display(), "fixture staged");
    Ok(ProjectFixture {
        name: name.to_string(),
        dir,
        files,
        digest,
    })
}
