//! Per-project directory layout.
//!
//! Everything a project touches on the local machine lives under its
//! workspace root: the SQLite store, staged plan artifacts, logs, collected
//! results and generated reports.
use std::path::{Path, PathBuf};

use crate::error::AppResult;

const PROJECT_DIRS: [&str; 8] = [
    "db", "app", "log", "tmp", "reports", "config", "vendor", "script",
];

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: &Path, project_code: &str) -> Self {
        Workspace {
            root: root.join(project_code),
        }
    }

    pub fn create(&self) -> AppResult<()> {
        for dir in PROJECT_DIRS {
            std::fs::create_dir_all(self.root.join(dir))?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join("db").join("hailstorm.db")
    }

    pub fn app_dir(&self) -> PathBuf {
        self.root.join("app")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("log")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join("reports")
    }

    /// Collected results for one cycle: `tmp/SEQUENCE-<id>/`.
    pub fn cycle_dir(&self, cycle_id: i64) -> PathBuf {
        self.tmp_dir().join(format!("SEQUENCE-{cycle_id}"))
    }

    pub fn create_cycle_dir(&self, cycle_id: i64) -> AppResult<PathBuf> {
        let dir = self.cycle_dir(cycle_id);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// SSH identity files are staged under `config/`.
    pub fn identity_path(&self, file_name: &str) -> PathBuf {
        self.config_dir().join(file_name)
    }

    /// Removes all per-cycle artifacts, keeping the project skeleton.
    pub fn purge_cycle_artifacts(&self) -> AppResult<()> {
        let tmp = self.tmp_dir();
        if !tmp.exists() {
            return Ok(());
        }
        for entry in std::fs::read_dir(&tmp)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with("SEQUENCE-") {
                std::fs::remove_dir_all(entry.path())?;
            }
        }
        Ok(())
    }

    pub fn remove(&self) -> AppResult<()> {
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }
}
