//! Mutation hooks
//!
//! # hooks
//!
//! Every executable in the configured hook directory is run before and after
//! each mutation as `<script> <phase> <action> <entry-path>`, in
//! lexicographic order of file name.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::debug;
use walkdir::WalkDir;

use crate::error::KpassError;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pre,
    Post,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Pre => "pre",
            Phase::Post => "post",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Insert,
    Move,
    Remove,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Insert => "insert",
            Action::Move => "move",
            Action::Remove => "remove",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Hook {
    scripts: Vec<PathBuf>,
    path: String,
    action: Action,
}

impl Hook {
    /// Discovers the scripts in `hook_dir`. Without a hook directory the
    /// hook does nothing.
    pub fn new<S>(path: S, action: Action, hook_dir: Option<&Path>) -> Result<Hook>
    where
        S: AsRef<str>,
    {
        let path = path.as_ref().trim();
        if path.is_empty() {
            return Err(KpassError::EmptyPath);
        }

        let scripts = match hook_dir {
            Some(dir) => discover(dir)?,
            None => Vec::new(),
        };

        Ok(Hook {
            scripts,
            path: path.to_owned(),
            action,
        })
    }

    pub fn scripts(&self) -> &[PathBuf] {
        &self.scripts
    }

    /// Runs every script for `phase`, stopping at the first failure.
    pub fn run(&self, phase: Phase) -> Result<()> {
        for script in &self.scripts {
            debug!("running {} hook {} for {}", phase, script.display(), self.action);

            let status = Command::new(script)
                .arg(phase.to_string())
                .arg(self.action.to_string())
                .arg(&self.path)
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .map_err(|e| KpassError::HookFailed(script.clone(), e.to_string()))?;

            if !status.success() {
                return Err(KpassError::HookFailed(script.clone(), status.to_string()));
            }
        }

        Ok(())
    }
}

fn discover(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(KpassError::HookDirMissing(dir.to_path_buf()));
    }

    let mut scripts = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(io::Error::from)?;

        if entry.file_type().is_dir() {
            return Err(KpassError::HookDirNotFlat(entry.into_path()));
        }
        scripts.push(entry.into_path());
    }
    scripts.sort();

    debug!("found {} hook(s) in {}", scripts.len(), dir.display());

    Ok(scripts)
}
