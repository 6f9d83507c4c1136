//! Per-commit tree changes
//!
//! Diffs a commit's tree against its first parent (or against nothing for
//! a root commit, which lists every file as an insertion) and reduces the
//! deltas to the three actions the burndown appliers understand. Rename
//! detection runs on the diff so a moved file arrives as a modification
//! with differing names instead of a delete/insert pair.

use anyhow::Result;
use git2::{Commit, Delta, DiffFindOptions, DiffOptions, FileMode, Oid, Repository};
use tracing::debug;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ChangeAction {
    Insert,
    Delete,
    Modify,
}

/// One side of a change; absent sides carry an empty name and a zero hash.
#[derive(Clone, Debug)]
pub struct ChangeEntry {
    pub name: String,
    pub hash: Oid,
}

impl ChangeEntry {
    fn none() -> Self {
        ChangeEntry {
            name: String::new(),
            hash: Oid::zero(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TreeChange {
    pub action: ChangeAction,
    pub from: ChangeEntry,
    pub to: ChangeEntry,
}

fn is_blob_mode(mode: FileMode) -> bool {
    matches!(
        mode,
        FileMode::Blob | FileMode::BlobGroupWritable | FileMode::BlobExecutable | FileMode::Link
    )
}

/// The changes one commit makes relative to its first parent.
pub fn tree_changes(repo: &Repository, commit: &Commit<'_>) -> Result<Vec<TreeChange>> {
    let tree = commit.tree()?;
    let parent_tree = if commit.parent_count() > 0 {
        Some(commit.parent(0)?.tree()?)
    } else {
        None
    };

    let mut opts = DiffOptions::new();
    let mut diff =
        repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))?;
    let mut find = DiffFindOptions::new();
    find.renames(true);
    diff.find_similar(Some(&mut find))?;

    let mut changes = Vec::new();
    for delta in diff.deltas() {
        let old = delta.old_file();
        let new = delta.new_file();
        let entry = |file: git2::DiffFile<'_>| ChangeEntry {
            name: file
                .path()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            hash: file.id(),
        };
        let action = match delta.status() {
            Delta::Added => {
                if !is_blob_mode(new.mode()) {
                    debug!(path = ?new.path(), "skipping non-blob tree entry");
                    continue;
                }
                changes.push(TreeChange {
                    action: ChangeAction::Insert,
                    from: ChangeEntry::none(),
                    to: entry(new),
                });
                continue;
            }
            Delta::Deleted => {
                if !is_blob_mode(old.mode()) {
                    debug!(path = ?old.path(), "skipping non-blob tree entry");
                    continue;
                }
                changes.push(TreeChange {
                    action: ChangeAction::Delete,
                    from: entry(old),
                    to: ChangeEntry::none(),
                });
                continue;
            }
            Delta::Modified | Delta::Renamed | Delta::Typechange => ChangeAction::Modify,
            other => {
                debug!(status = ?other, path = ?new.path(), "skipping unsupported delta");
                continue;
            }
        };
        if !is_blob_mode(new.mode()) || !is_blob_mode(old.mode()) {
            debug!(path = ?new.path(), "skipping non-blob tree entry");
            continue;
        }
        changes.push(TreeChange {
            action,
            from: entry(old),
            to: entry(new),
        });
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{Signature, Time};
    use tempfile::tempdir;

    fn commit_tree(
        repo: &Repository,
        files: &[(&str, &str)],
        parents: &[Oid],
    ) -> Oid {
        let mut builder = repo.treebuilder(None).unwrap();
        for (name, content) in files {
            let blob = repo.blob(content.as_bytes()).unwrap();
            builder.insert(*name, blob, 0o100644).unwrap();
        }
        let tree = repo.find_tree(builder.write().unwrap()).unwrap();
        let sig = Signature::new("t", "t@example.com", &Time::new(0, 0)).unwrap();
        let parents: Vec<_> = parents.iter().map(|&p| repo.find_commit(p).unwrap()).collect();
        let refs: Vec<_> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, "c", &tree, &refs).unwrap()
    }

    #[test]
    fn root_commit_lists_insertions() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let c0 = commit_tree(&repo, &[("a.txt", "a\n"), ("b.txt", "b\n")], &[]);
        let commit = repo.find_commit(c0).unwrap();
        let changes = tree_changes(&repo, &commit).unwrap();
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.action == ChangeAction::Insert));
        assert!(changes.iter().all(|c| c.from.name.is_empty()));
    }

    #[test]
    fn modify_delete_and_rename() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let body = "line 1\nline 2\nline 3\nline 4\nline 5\nline 6\nline 7\nline 8\n";
        let c0 = commit_tree(&repo, &[("a.txt", body), ("gone.txt", "bye\n")], &[]);
        let changed = "line 1\nline 2\nline 3\nline 4\nline 5\nline 6\nline 7\nCHANGED\n";
        let c1 = commit_tree(&repo, &[("b.txt", changed)], &[c0]);
        let commit = repo.find_commit(c1).unwrap();
        let changes = tree_changes(&repo, &commit).unwrap();

        let delete = changes
            .iter()
            .find(|c| c.action == ChangeAction::Delete)
            .expect("gone.txt should be deleted");
        assert_eq!(delete.from.name, "gone.txt");

        let rename = changes
            .iter()
            .find(|c| c.action == ChangeAction::Modify)
            .expect("a.txt -> b.txt should be a rename-modify");
        assert_eq!(rename.from.name, "a.txt");
        assert_eq!(rename.to.name, "b.txt");
    }
}
