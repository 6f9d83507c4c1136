//! Change application for two-parent merge commits
//!
//! The diff arrives computed between the first parent and the merge
//! commit, but the lines it inserts were usually written on the other
//! branch. The merger therefore replays the script in merge mode: no
//! counter is touched (regular commits already accounted these lines),
//! and inserted lines borrow their provenance from the side parent's copy
//! of the file at the same position, so that deleting them later charges
//! the right author and day.

use rustc_hash::FxHashMap;
use tracing::debug;

use super::applier::Pending;
use super::{BurndownError, Snapshot};
use crate::git::{BlobCache, ChangeAction, ChangeEntry, DiffOp, FileDiffData, TreeChange};

pub(super) struct ChangeMerger<'a> {
    pub debug: bool,
    pub files: &'a mut Snapshot,
    pub side_files: &'a mut Snapshot,
    pub cache: &'a BlobCache,
    pub diffs: &'a FxHashMap<String, FileDiffData>,
}

impl ChangeMerger<'_> {
    pub fn process(&mut self, changes: &[TreeChange]) -> Result<(), BurndownError> {
        for change in changes {
            self.process_change(change)?;
        }
        Ok(())
    }

    fn process_change(&mut self, change: &TreeChange) -> Result<(), BurndownError> {
        match change.action {
            ChangeAction::Insert => {
                if self.is_binary(&change.to)? {
                    return Ok(());
                }
                // The side parent's applier already created this file;
                // adopt it instead of inventing new provenance.
                let name = &change.to.name;
                let side = self
                    .side_files
                    .remove(name)
                    .ok_or_else(|| BurndownError::SideFileMissing(name.clone()))?;
                self.files.insert(name.clone(), side);
                Ok(())
            }
            ChangeAction::Delete => {
                if self.is_binary(&change.from)? {
                    return Ok(());
                }
                let name = &change.from.name;
                if self.files.remove(name).is_none() {
                    return Err(BurndownError::FileMissing(name.clone()));
                }
                Ok(())
            }
            ChangeAction::Modify => {
                if self.is_binary(&change.to)? {
                    return Ok(());
                }
                self.handle_modification(&change.from.name, &change.to.name)
            }
        }
    }

    fn is_binary(&self, entry: &ChangeEntry) -> Result<bool, BurndownError> {
        let blob = self
            .cache
            .get(entry.hash)
            .ok_or_else(|| BurndownError::BlobMissing(entry.name.clone(), entry.hash))?;
        Ok(blob.is_binary())
    }

    fn handle_modification(&mut self, from: &str, to: &str) -> Result<(), BurndownError> {
        if from.is_empty() {
            // The data means an insertion; adopt the side file.
            let side = self
                .side_files
                .remove(to)
                .ok_or_else(|| BurndownError::SideFileMissing(to.to_string()))?;
            self.files.insert(to.to_string(), side);
            return Ok(());
        }

        if from != to {
            if !self.side_files.contains_key(to) {
                return Err(BurndownError::SideFileMissing(to.to_string()));
            }
            let file = self
                .files
                .remove(from)
                .ok_or_else(|| BurndownError::FileMissing(from.to_string()))?;
            self.files.insert(to.to_string(), file);
        }

        let diff = self
            .diffs
            .get(to)
            .ok_or_else(|| BurndownError::DiffMissing(to.to_string()))?;
        let side = self
            .side_files
            .get(to)
            .ok_or_else(|| BurndownError::SideFileMissing(to.to_string()))?;
        let file = self
            .files
            .get_mut(to)
            .ok_or_else(|| BurndownError::FileMissing(to.to_string()))?;
        if file.len() as usize != diff.old_lines {
            debug!(path = to, dump = %file.dump(), "merge source integrity failure");
            return Err(BurndownError::SourceIntegrity {
                path: to.to_string(),
                declared: diff.old_lines,
                actual: file.len() as usize,
            });
        }

        let debug_mode = self.debug;
        let mut position: u32 = 0;
        let mut pending = Pending::None;

        for edit in &diff.edits {
            let length = edit.lines as u32;
            match edit.op {
                DiffOp::Equal => {
                    match pending {
                        Pending::Insert(ins) => {
                            let tag = side.tag_at(position).ok_or_else(|| {
                                BurndownError::NoSideProvenance {
                                    path: to.to_string(),
                                    line: position,
                                }
                            })?;
                            file.update(tag, position, ins, 0, true);
                            position += ins;
                        }
                        Pending::Delete(del) => {
                            file.update(0, position, 0, del, true);
                        }
                        Pending::None => {}
                    }
                    if debug_mode && !matches!(pending, Pending::None) {
                        file.validate();
                    }
                    pending = Pending::None;
                    position += length;
                }
                DiffOp::Insert => match pending {
                    Pending::Delete(del) => {
                        let tag = side.tag_at(position).ok_or_else(|| {
                            BurndownError::NoSideProvenance {
                                path: to.to_string(),
                                line: position,
                            }
                        })?;
                        file.update(tag, position, length, del, true);
                        if debug_mode {
                            file.validate();
                        }
                        position += length;
                        pending = Pending::None;
                    }
                    Pending::Insert(_) => {
                        return Err(BurndownError::InsertAfterInsert(to.to_string()));
                    }
                    Pending::None => pending = Pending::Insert(length),
                },
                DiffOp::Delete => match pending {
                    Pending::None => pending = Pending::Delete(length),
                    _ => {
                        return Err(BurndownError::DeleteAfterPending(to.to_string()));
                    }
                },
            }
        }
        match pending {
            Pending::Insert(ins) => {
                let tag = side
                    .tag_at(position)
                    .ok_or_else(|| BurndownError::NoSideProvenance {
                        path: to.to_string(),
                        line: position,
                    })?;
                file.update(tag, position, ins, 0, true);
                if debug_mode {
                    file.validate();
                }
            }
            Pending::Delete(del) => {
                file.update(0, position, 0, del, true);
                if debug_mode {
                    file.validate();
                }
            }
            Pending::None => {}
        }

        if file.len() as usize != diff.new_lines {
            debug!(path = to, dump = %file.dump(), "merge result integrity failure");
            return Err(BurndownError::ResultIntegrity {
                path: to.to_string(),
                declared: diff.new_lines,
                actual: file.len() as usize,
            });
        }
        Ok(())
    }
}
