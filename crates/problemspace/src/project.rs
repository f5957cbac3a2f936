use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tempfile::TempDir;
use walkdir::WalkDir;

use crate::error::{ProblemSpaceError, Result};

/// Arena of document snapshots for one attack. Every snapshot lives in a
/// generation-numbered directory under one temp root; dropping the arena
/// releases all of them at once, so no snapshot outlives the attack.
pub struct ProjectArena {
    root: TempDir,
    generation: AtomicU64,
}

impl ProjectArena {
    pub fn new() -> Result<Self> {
        Ok(Self {
            root: TempDir::new()?,
            generation: AtomicU64::new(0),
        })
    }

    pub fn root_path(&self) -> &Path {
        self.root.path()
    }

    fn next_dir(&self) -> Result<PathBuf> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let dir = self.root.path().join(format!("gen-{generation:06}"));
        fs::create_dir(&dir)?;
        Ok(dir)
    }

    /// Copies an external document project into the arena.
    pub fn import(&self, source_dir: &Path, main_file: &str) -> Result<LatexProject> {
        if !source_dir.is_dir() {
            return Err(ProblemSpaceError::InvalidProject(format!(
                "source dir does not exist: {}",
                source_dir.display()
            )));
        }
        if !source_dir.join(main_file).is_file() {
            return Err(ProblemSpaceError::InvalidProject(format!(
                "main file '{main_file}' not found in {}",
                source_dir.display()
            )));
        }
        let dir = self.next_dir()?;
        copy_tree(source_dir, &dir)?;
        Ok(LatexProject {
            dir,
            main_file: main_file.to_owned(),
        })
    }

    /// Deep-copies a project into a fresh snapshot. This is the only
    /// concurrency boundary of the problem space: two snapshots never alias
    /// the same files.
    pub fn snapshot(&self, project: &LatexProject) -> Result<LatexProject> {
        let dir = self.next_dir()?;
        copy_tree(&project.dir, &dir)?;
        Ok(LatexProject {
            dir,
            main_file: project.main_file.clone(),
        })
    }
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|e| {
            ProblemSpaceError::InvalidProject(format!("walk failed: {e}"))
        })?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .expect("walkdir yields children of the root");
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Handle to one on-disk document project inside the arena. All source
/// modifications go through `main_document` / `save_main_document`.
#[derive(Debug, Clone)]
pub struct LatexProject {
    dir: PathBuf,
    main_file: String,
}

impl LatexProject {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn main_file(&self) -> &str {
        &self.main_file
    }

    pub fn main_document(&self) -> Result<String> {
        Ok(fs::read_to_string(self.dir.join(&self.main_file))?)
    }

    pub fn save_main_document(&self, content: &str) -> Result<()> {
        fs::write(self.dir.join(&self.main_file), content)?;
        Ok(())
    }

    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Path of a compile artifact sharing the main document's stem.
    pub fn artifact_path(&self, suffix: &str) -> PathBuf {
        let stem = Path::new(&self.main_file)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.main_file.clone());
        self.dir.join(format!("{stem}.{suffix}"))
    }

    pub fn pdf_path(&self) -> PathBuf {
        self.artifact_path("pdf")
    }

    /// Copies the project out of the arena, e.g. into an error directory or
    /// the final artifact directory.
    pub fn export_to(&self, target: &Path) -> Result<()> {
        fs::create_dir_all(target)?;
        copy_tree(&self.dir, target)
    }
}
