use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tokio::fs;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct StagedFile {
    path: PathBuf,
    mode: u32,
    contents: Vec<u8>,
}

/// Stages several files and writes them as one unit.
///
/// `save` first writes every file to a hidden temp sibling. Only when all
/// temp writes succeeded are they renamed into place; otherwise the temp
/// files are removed and the targets are left untouched.
#[derive(Debug, Default)]
pub struct StagedWriter {
    files: Vec<StagedFile>,
}

impl StagedWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bytes(&mut self, path: impl Into<PathBuf>, mode: u32, contents: Vec<u8>) -> Result<()> {
        let path = path.into();
        if path.file_name().is_none() {
            return Err(anyhow!("invalid token file path '{}'", path.display()));
        }
        self.files.push(StagedFile { path, mode, contents });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub async fn save(self) -> Result<()> {
        let mut staged: Vec<(PathBuf, &Path)> = Vec::with_capacity(self.files.len());
        for file in &self.files {
            match write_temp(file).await {
                Ok(tmp) => staged.push((tmp, file.path.as_path())),
                Err(e) => {
                    remove_temps(staged.iter().map(|(tmp, _)| tmp.as_path())).await;
                    return Err(e);
                }
            }
        }

        for (i, (tmp, target)) in staged.iter().enumerate() {
            if let Err(e) = fs::rename(tmp, target).await {
                remove_temps(staged[i..].iter().map(|(tmp, _)| tmp.as_path())).await;
                return Err(anyhow!("failed to move token file into {}: {}", target.display(), e));
            }
            debug!("saved {}", target.display());
        }
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

async fn write_temp(file: &StagedFile) -> Result<PathBuf> {
    if let Some(parent) = file.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let tmp = temp_path(&file.path);
    let written = async {
        fs::write(&tmp, &file.contents).await?;
        fs::set_permissions(&tmp, Permissions::from_mode(file.mode)).await
    }
    .await;

    if let Err(e) = written {
        remove_temps(std::iter::once(tmp.as_path())).await;
        return Err(anyhow!("failed to write {}: {}", tmp.display(), e));
    }
    Ok(tmp)
}

async fn remove_temps<'a>(paths: impl Iterator<Item = &'a Path>) {
    for path in paths {
        if let Err(e) = fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove temp file {}: {}", path.display(), e);
            }
        }
    }
}
