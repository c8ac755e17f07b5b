//! Corpus revision markers and change sets.
//!
//! When the corpus lives in a git work tree, the revision marker is the
//! `HEAD` commit and the change set since a stored marker comes from
//! `git diff --name-status`. Outside git, the marker is the run timestamp
//! and no change set can be computed, so callers fall back to a full
//! fingerprint scan.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;

/// Paths (relative to the corpus root) changed since a revision marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl ChangeSet {
    /// Paths that must be (re)indexed.
    pub fn changed(&self) -> impl Iterator<Item = &String> {
        self.added.iter().chain(self.modified.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// The current revision marker for `root`.
pub fn current_marker(root: &Path) -> String {
    git_head_sha(root).unwrap_or_else(|_| chrono::Utc::now().to_rfc3339())
}

/// Whether `root` is inside a git work tree.
pub fn is_git_worktree(root: &Path) -> bool {
    run_git(root, &["rev-parse", "--is-inside-work-tree"])
        .map(|out| out.trim() == "true")
        .unwrap_or(false)
}

/// The `HEAD` commit SHA of the repository containing `root`.
pub fn git_head_sha(root: &Path) -> Result<String> {
    Ok(run_git(root, &["rev-parse", "HEAD"])?.trim().to_string())
}

/// Compute the change set between `marker` and the working tree of `root`.
///
/// Covers committed changes since `marker`, uncommitted edits to tracked
/// files, and untracked files. Renames are reported as delete + add.
/// Output is read NUL-separated (`-z`) so paths git would otherwise quote,
/// such as non-ASCII names, come through verbatim.
pub fn diff_since(root: &Path, marker: &str) -> Result<ChangeSet> {
    let diff = run_git(
        root,
        &[
            "diff",
            "--name-status",
            "--no-renames",
            "--relative",
            "-z",
            marker,
        ],
    )
    .with_context(|| format!("Failed to diff corpus against revision {}", marker))?;
    let untracked = run_git(root, &["ls-files", "--others", "--exclude-standard", "-z"])?;

    let mut changes = parse_name_status(&diff);
    for path in untracked.split('\0').filter(|p| !p.is_empty()) {
        if !changes.added.iter().any(|p| p == path) {
            changes.added.push(path.to_string());
        }
    }

    changes.added.sort();
    changes.modified.sort();
    changes.deleted.sort();
    Ok(changes)
}

/// Parse `git diff --name-status -z` output: a status field followed by one
/// path, or two for renames and copies, all NUL-terminated.
fn parse_name_status(output: &str) -> ChangeSet {
    let mut changes = ChangeSet::default();
    let mut fields = output.split('\0');
    while let Some(status) = fields.next() {
        let Some(kind) = status.chars().next() else {
            continue;
        };
        let Some(path) = fields.next() else {
            break;
        };
        let path = path.to_string();
        match kind {
            'A' => changes.added.push(path),
            'D' => changes.deleted.push(path),
            'M' | 'T' => changes.modified.push(path),
            'R' | 'C' => {
                let Some(new_path) = fields.next() else {
                    break;
                };
                if kind == 'R' {
                    changes.deleted.push(path);
                }
                changes.added.push(new_path.to_string());
            }
            _ => {}
        }
    }
    changes
}

fn run_git(root: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .with_context(|| format!("Failed to run git {}", args.join(" ")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git {} failed: {}", args.join(" "), stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
