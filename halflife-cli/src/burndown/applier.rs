//! Change application for single-parent commits
//!
//! Replays one commit's tree changes against a snapshot: insertions create
//! files, deletions account every remaining line before dropping the file,
//! and modifications walk the diff edit script through `File::update` with
//! a one-slot pending edit so a delete immediately followed by an insert
//! becomes a single replacement.

use halflife_core::file::{File, Status};
use halflife_core::provenance::pack;
use rustc_hash::FxHashMap;
use tracing::debug;

use super::{BurndownError, Snapshot};
use crate::git::{BlobCache, ChangeAction, ChangeEntry, DiffOp, FileDiffData, TreeChange};

/// The deferred edit between diff tokens.
#[derive(Clone, Copy)]
pub(super) enum Pending {
    None,
    Insert(u32),
    Delete(u32),
}

pub(super) struct ChangeApplier<'a> {
    pub day: u32,
    pub author: u32,
    pub debug: bool,
    pub files: &'a mut Snapshot,
    pub cache: &'a BlobCache,
    pub diffs: &'a FxHashMap<String, FileDiffData>,
    pub make_statuses: &'a dyn Fn() -> Vec<Status>,
}

impl ChangeApplier<'_> {
    pub fn process(&mut self, changes: &[TreeChange]) -> Result<(), BurndownError> {
        for change in changes {
            self.process_change(change)?;
        }
        Ok(())
    }

    fn process_change(&mut self, change: &TreeChange) -> Result<(), BurndownError> {
        match change.action {
            ChangeAction::Insert => {
                let Some(lines) = self.count_lines(&change.to)? else {
                    return Ok(());
                };
                self.handle_insertion(&change.to.name, lines)
            }
            ChangeAction::Delete => {
                let Some(lines) = self.count_lines(&change.from)? else {
                    return Ok(());
                };
                self.handle_delete(&change.from.name, lines)
            }
            ChangeAction::Modify => {
                let Some(lines) = self.count_lines(&change.to)? else {
                    return Ok(());
                };
                self.handle_modification(&change.from.name, &change.to.name, lines)
            }
        }
    }

    /// Line count of the blob, or `None` for binary content (skipped).
    fn count_lines(&self, entry: &ChangeEntry) -> Result<Option<usize>, BurndownError> {
        let blob = self
            .cache
            .get(entry.hash)
            .ok_or_else(|| BurndownError::BlobMissing(entry.name.clone(), entry.hash))?;
        match blob.count_lines() {
            Some(lines) => Ok(Some(lines)),
            None => {
                debug!(path = %entry.name, "skipping binary blob");
                Ok(None)
            }
        }
    }

    fn handle_insertion(&mut self, name: &str, lines: usize) -> Result<(), BurndownError> {
        if self.files.contains_key(name) {
            return Err(BurndownError::FileExists(name.to_string()));
        }
        let tag = pack(self.author, self.day);
        self.files.insert(
            name.to_string(),
            File::new(tag, lines as u32, (self.make_statuses)()),
        );
        Ok(())
    }

    fn handle_delete(&mut self, name: &str, lines: usize) -> Result<(), BurndownError> {
        let file = self
            .files
            .get_mut(name)
            .ok_or_else(|| BurndownError::FileMissing(name.to_string()))?;
        if lines > 0 {
            file.update(pack(self.author, self.day), 0, 0, lines as u32, false);
            if self.debug {
                file.validate();
            }
        }
        self.files.remove(name);
        Ok(())
    }

    fn handle_rename(&mut self, from: &str, to: &str) -> Result<(), BurndownError> {
        let file = self
            .files
            .remove(from)
            .ok_or_else(|| BurndownError::FileMissing(from.to_string()))?;
        self.files.insert(to.to_string(), file);
        Ok(())
    }

    fn handle_modification(
        &mut self,
        from: &str,
        to: &str,
        lines: usize,
    ) -> Result<(), BurndownError> {
        if from.is_empty() {
            return self.handle_insertion(to, lines);
        }
        if from != to {
            self.handle_rename(from, to)?;
        }

        let diff = self
            .diffs
            .get(to)
            .ok_or_else(|| BurndownError::DiffMissing(to.to_string()))?;
        let file = self
            .files
            .get_mut(to)
            .ok_or_else(|| BurndownError::FileMissing(to.to_string()))?;
        if file.len() as usize != diff.old_lines {
            debug!(path = to, dump = %file.dump(), "source integrity failure");
            return Err(BurndownError::SourceIntegrity {
                path: to.to_string(),
                declared: diff.old_lines,
                actual: file.len() as usize,
            });
        }

        let tag = pack(self.author, self.day);
        let debug_mode = self.debug;
        let mut position: u32 = 0;
        let mut pending = Pending::None;

        let flush = |file: &mut File, position: &mut u32, pending: &mut Pending| {
            match *pending {
                Pending::Insert(ins) => {
                    file.update(tag, *position, ins, 0, false);
                    if debug_mode {
                        file.validate();
                    }
                    *position += ins;
                }
                Pending::Delete(del) => {
                    file.update(tag, *position, 0, del, false);
                    if debug_mode {
                        file.validate();
                    }
                }
                Pending::None => {}
            }
            *pending = Pending::None;
        };

        for edit in &diff.edits {
            let length = edit.lines as u32;
            match edit.op {
                DiffOp::Equal => {
                    flush(file, &mut position, &mut pending);
                    position += length;
                }
                DiffOp::Insert => match pending {
                    Pending::Delete(del) => {
                        // A delete directly followed by an insert is one
                        // replacement.
                        file.update(tag, position, length, del, false);
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
        flush(file, &mut position, &mut pending);

        if file.len() as usize != diff.new_lines {
            debug!(path = to, dump = %file.dump(), "result integrity failure");
            return Err(BurndownError::ResultIntegrity {
                path: to.to_string(),
                declared: diff.new_lines,
                actual: file.len() as usize,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::file_diff::diff_lines;
    use crate::git::CachedBlob;
    use git2::Oid;
    use halflife_core::counters::GlobalCounter;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Fixture {
        files: Snapshot,
        cache: BlobCache,
        diffs: FxHashMap<String, FileDiffData>,
        counter: Rc<RefCell<GlobalCounter>>,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                files: Snapshot::default(),
                cache: BlobCache::default(),
                diffs: FxHashMap::default(),
                counter: Rc::new(RefCell::new(GlobalCounter::new())),
            }
        }

        fn blob(&mut self, content: &str) -> Oid {
            let oid = Oid::hash_object(git2::ObjectType::Blob, content.as_bytes()).unwrap();
            self.cache.insert(oid, CachedBlob::new(content.as_bytes().to_vec()));
            oid
        }

        fn apply(
            &mut self,
            day: u32,
            author: u32,
            changes: &[TreeChange],
        ) -> Result<(), BurndownError> {
            let counter = Rc::clone(&self.counter);
            let make_statuses = move || vec![Status::Global(Rc::clone(&counter))];
            let mut applier = ChangeApplier {
                day,
                author,
                debug: true,
                files: &mut self.files,
                cache: &self.cache,
                diffs: &self.diffs,
                make_statuses: &make_statuses,
            };
            applier.process(changes)
        }

        fn alive_lines(&self) -> i64 {
            self.counter
                .borrow()
                .diffs()
                .values()
                .flat_map(|row| row.values())
                .sum()
        }
    }

    fn insert_change(name: &str, hash: Oid) -> TreeChange {
        TreeChange {
            action: ChangeAction::Insert,
            from: ChangeEntry {
                name: String::new(),
                hash: Oid::zero(),
            },
            to: ChangeEntry {
                name: name.to_string(),
                hash,
            },
        }
    }

    fn modify_change(from: &str, to: &str, old: Oid, new: Oid) -> TreeChange {
        TreeChange {
            action: ChangeAction::Modify,
            from: ChangeEntry {
                name: from.to_string(),
                hash: old,
            },
            to: ChangeEntry {
                name: to.to_string(),
                hash: new,
            },
        }
    }

    fn delete_change(name: &str, hash: Oid) -> TreeChange {
        TreeChange {
            action: ChangeAction::Delete,
            from: ChangeEntry {
                name: name.to_string(),
                hash,
            },
            to: ChangeEntry {
                name: String::new(),
                hash: Oid::zero(),
            },
        }
    }

    #[test]
    fn insert_then_modify_then_delete() {
        let mut fx = Fixture::new();
        let v1 = fx.blob("a\nb\nc\n");
        fx.apply(0, 0, &[insert_change("f.txt", v1)]).unwrap();
        assert_eq!(fx.files["f.txt"].len(), 3);
        assert_eq!(fx.alive_lines(), 3);

        let v2 = fx.blob("a\nx\ny\nc\n");
        fx.diffs
            .insert("f.txt".to_string(), diff_lines("a\nb\nc\n", "a\nx\ny\nc\n"));
        fx.apply(1, 0, &[modify_change("f.txt", "f.txt", v1, v2)])
            .unwrap();
        assert_eq!(fx.files["f.txt"].len(), 4);
        assert_eq!(fx.alive_lines(), 4);

        fx.apply(2, 0, &[delete_change("f.txt", v2)]).unwrap();
        assert!(fx.files.is_empty());
        assert_eq!(fx.alive_lines(), 0);
    }

    #[test]
    fn rename_with_modification_moves_the_file() {
        let mut fx = Fixture::new();
        let v1 = fx.blob("a\nb\nc\nd\n");
        fx.apply(0, 0, &[insert_change("old.txt", v1)]).unwrap();

        let v2 = fx.blob("a\nb\nc\nz\n");
        fx.diffs
            .insert("new.txt".to_string(), diff_lines("a\nb\nc\nd\n", "a\nb\nc\nz\n"));
        fx.apply(1, 1, &[modify_change("old.txt", "new.txt", v1, v2)])
            .unwrap();
        assert!(!fx.files.contains_key("old.txt"));
        assert_eq!(fx.files["new.txt"].len(), 4);
    }

    #[test]
    fn duplicate_insertion_is_an_error() {
        let mut fx = Fixture::new();
        let v1 = fx.blob("a\n");
        fx.apply(0, 0, &[insert_change("f.txt", v1)]).unwrap();
        let err = fx.apply(1, 0, &[insert_change("f.txt", v1)]).unwrap_err();
        assert!(matches!(err, BurndownError::FileExists(_)));
    }

    #[test]
    fn binary_blobs_are_skipped() {
        let mut fx = Fixture::new();
        let oid = Oid::hash_object(git2::ObjectType::Blob, &[0u8, 1, 2]).unwrap();
        fx.cache.insert(oid, CachedBlob::new(vec![0u8, 1, 2]));
        fx.apply(0, 0, &[insert_change("blob.bin", oid)]).unwrap();
        assert!(fx.files.is_empty());
    }

    #[test]
    fn length_mismatch_is_an_integrity_error() {
        let mut fx = Fixture::new();
        let v1 = fx.blob("a\nb\nc\n");
        fx.apply(0, 0, &[insert_change("f.txt", v1)]).unwrap();

        // Declared old line count disagrees with the tracked file.
        let v2 = fx.blob("a\n");
        fx.diffs
            .insert("f.txt".to_string(), diff_lines("a\nb\n", "a\n"));
        let err = fx
            .apply(1, 0, &[modify_change("f.txt", "f.txt", v1, v2)])
            .unwrap_err();
        assert!(matches!(err, BurndownError::SourceIntegrity { .. }));
    }

    #[test]
    fn modification_of_untracked_file_fails() {
        let mut fx = Fixture::new();
        let v1 = fx.blob("a\n");
        let v2 = fx.blob("b\n");
        fx.diffs
            .insert("ghost.txt".to_string(), diff_lines("a\n", "b\n"));
        let err = fx
            .apply(0, 0, &[modify_change("ghost.txt", "ghost.txt", v1, v2)])
            .unwrap_err();
        assert!(matches!(err, BurndownError::FileMissing(_)));
    }
}
