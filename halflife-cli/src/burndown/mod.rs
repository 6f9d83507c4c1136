//! Burndown analysis driver
//!
//! Owns the per-commit snapshot store (`commit hash -> {path -> File}`),
//! dispatches each commit to the change applier (one parent) or change
//! merger (two parents) over deep copies of the parent snapshots, and
//! aggregates every line event into the counters that `finalize` folds
//! into the result matrices.

mod applier;
pub mod combine;
mod merger;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use halflife_core::counters::{GlobalCounter, InteractionMatrix, PeopleCounter};
use halflife_core::file::{File, Status};
use halflife_core::matrix::TimeRange;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::git::{BlobCache, CommitMeta, FileDiffData, TreeChange};
use applier::ChangeApplier;
use merger::ChangeMerger;

pub const DEFAULT_GRANULARITY: u32 = 30;

/// All files tracked at one point of history.
pub type Snapshot = FxHashMap<String, File>;

/// Everything that can go wrong while replaying history.
#[derive(Error, Debug)]
pub enum BurndownError {
    #[error("{path}: integrity error before patch: declared {declared} lines, tracked {actual}")]
    SourceIntegrity {
        path: String,
        declared: usize,
        actual: usize,
    },
    #[error("{path}: integrity error after patch: declared {declared} lines, tracked {actual}")]
    ResultIntegrity {
        path: String,
        declared: usize,
        actual: usize,
    },
    #[error("file {0} already exists")]
    FileExists(String),
    #[error("file {0} does not exist")]
    FileMissing(String),
    #[error("file {0} not found in the side snapshot")]
    SideFileMissing(String),
    #[error("{0}: modified file has no diff data")]
    DiffMissing(String),
    #[error("{0}: blob {1} is not in the cache")]
    BlobMissing(String, git2::Oid),
    #[error("{0}: an insertion may not follow an insertion")]
    InsertAfterInsert(String),
    #[error("{0}: a deletion may not follow a pending edit")]
    DeleteAfterPending(String),
    #[error("{path}: no side provenance available at line {line}")]
    NoSideProvenance { path: String, line: u32 },
    #[error("commit {parent} was not processed (required by {commit})")]
    MissingParent { parent: String, commit: String },
    #[error("commit {0} has more than two parents")]
    TooManyParents(String),
}

/// Knobs of the analysis; see the CLI flags of the same names.
#[derive(Clone, Debug)]
pub struct BurndownConfig {
    /// Width of one output column band, in days.
    pub granularity: u32,
    /// Days between output rows; may not exceed the granularity.
    pub sampling: u32,
    /// Produce per-file history matrices.
    pub track_files: bool,
    /// Produce per-author history matrices and the interaction matrix.
    pub track_people: bool,
    /// Validate every file after every mutation. Slow.
    pub debug: bool,
}

impl Default for BurndownConfig {
    fn default() -> Self {
        BurndownConfig {
            granularity: DEFAULT_GRANULARITY,
            sampling: DEFAULT_GRANULARITY,
            track_files: false,
            track_people: false,
            debug: false,
        }
    }
}

impl BurndownConfig {
    /// Repairs out-of-range values, warning about each adjustment.
    pub fn normalized(mut self) -> Self {
        if self.granularity == 0 {
            warn!("adjusted the granularity to {} days", DEFAULT_GRANULARITY);
            self.granularity = DEFAULT_GRANULARITY;
        }
        if self.sampling == 0 {
            warn!("adjusted the sampling to {} days", DEFAULT_GRANULARITY);
            self.sampling = DEFAULT_GRANULARITY;
        }
        if self.sampling > self.granularity {
            warn!(
                "sampling may not exceed the granularity, clamped to {}",
                self.granularity
            );
            self.sampling = self.granularity;
        }
        self
    }
}

/// The finished analysis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BurndownResult {
    pub granularity: u32,
    pub sampling: u32,
    /// Author timestamp of the first analyzed commit, unix seconds.
    pub begin_time: i64,
    /// Author timestamp of the last analyzed commit, unix seconds.
    pub end_time: i64,
    pub commits_number: usize,
    /// Project-wide burndown: rows are samples, columns introduction bands.
    pub global_history: Vec<Vec<i64>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub file_histories: BTreeMap<String, Vec<Vec<i64>>>,
    /// Reversed author dictionary: display name per dense id.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub people: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub people_histories: Vec<Vec<Vec<i64>>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub people_matrix: Vec<Vec<i64>>,
}

/// Snapshot store plus counters; one instance per analysis run.
pub struct BurndownAnalysis {
    granularity: u32,
    sampling: u32,
    track_files: bool,
    people_number: usize,
    debug: bool,

    global: Rc<RefCell<GlobalCounter>>,
    people: Rc<RefCell<PeopleCounter>>,
    interactions: Rc<RefCell<InteractionMatrix>>,
    snapshots: FxHashMap<String, Snapshot>,
    last_commit: Option<String>,
    reversed_people: Vec<String>,
}

impl BurndownAnalysis {
    pub fn new(config: &BurndownConfig, reversed_people: Vec<String>) -> Self {
        let config = config.clone().normalized();
        let people_number = if config.track_people {
            reversed_people.len()
        } else {
            0
        };
        BurndownAnalysis {
            granularity: config.granularity,
            sampling: config.sampling,
            track_files: config.track_files,
            people_number,
            debug: config.debug,
            global: Rc::new(RefCell::new(GlobalCounter::new())),
            people: Rc::new(RefCell::new(PeopleCounter::new(people_number))),
            interactions: Rc::new(RefCell::new(InteractionMatrix::new(people_number))),
            snapshots: FxHashMap::default(),
            last_commit: None,
            reversed_people: if config.track_people {
                reversed_people
            } else {
                Vec::new()
            },
        }
    }

    /// The statuses a newly created file gets attached.
    fn make_statuses(&self) -> Vec<Status> {
        let mut statuses = vec![Status::Global(Rc::clone(&self.global))];
        if self.people_number > 0 {
            statuses.push(Status::People(Rc::clone(&self.people)));
            statuses.push(Status::Interaction(Rc::clone(&self.interactions)));
        }
        if self.track_files {
            statuses.push(Status::PerFile(Rc::new(RefCell::new(GlobalCounter::new()))));
        }
        statuses
    }

    /// Replays one commit. `children` carries the remaining-children count
    /// per commit hash; parents that drop to zero lose their snapshot.
    pub fn process_commit(
        &mut self,
        meta: &CommitMeta,
        changes: &[TreeChange],
        cache: &BlobCache,
        diffs: &FxHashMap<String, FileDiffData>,
        children: &mut FxHashMap<String, usize>,
    ) -> Result<(), BurndownError> {
        let snapshot = match meta.parents.len() {
            0 => {
                let mut files = Snapshot::default();
                self.apply(meta, &mut files, changes, cache, diffs)?;
                files
            }
            1 => {
                let mut files = self.parent_snapshot(&meta.parents[0], &meta.hash)?;
                self.apply(meta, &mut files, changes, cache, diffs)?;
                files
            }
            2 => {
                let mut files = self.parent_snapshot(&meta.parents[0], &meta.hash)?;
                let mut side_files = self.parent_snapshot(&meta.parents[1], &meta.hash)?;
                let mut merger = ChangeMerger {
                    debug: self.debug,
                    files: &mut files,
                    side_files: &mut side_files,
                    cache,
                    diffs,
                };
                merger.process(changes)?;
                files
            }
            _ => return Err(BurndownError::TooManyParents(meta.hash.clone())),
        };

        self.snapshots.insert(meta.hash.clone(), snapshot);
        self.last_commit = Some(meta.hash.clone());
        self.evict(meta, children);
        Ok(())
    }

    fn apply(
        &self,
        meta: &CommitMeta,
        files: &mut Snapshot,
        changes: &[TreeChange],
        cache: &BlobCache,
        diffs: &FxHashMap<String, FileDiffData>,
    ) -> Result<(), BurndownError> {
        let make_statuses = || self.make_statuses();
        let mut applier = ChangeApplier {
            day: meta.day,
            author: meta.author,
            debug: self.debug,
            files,
            cache,
            diffs,
            make_statuses: &make_statuses,
        };
        applier.process(changes)
    }

    /// A deep copy of the parent's snapshot: every file's run map is
    /// cloned, so partial mutations of an aborted commit never leak back.
    fn parent_snapshot(
        &self,
        parent: &str,
        commit: &str,
    ) -> Result<Snapshot, BurndownError> {
        let files = self
            .snapshots
            .get(parent)
            .ok_or_else(|| BurndownError::MissingParent {
                parent: parent.to_string(),
                commit: commit.to_string(),
            })?;
        Ok(files
            .iter()
            .map(|(name, file)| (name.clone(), file.copy()))
            .collect())
    }

    /// Drops snapshots no remaining child will ever ask for.
    fn evict(&mut self, meta: &CommitMeta, children: &mut FxHashMap<String, usize>) {
        for parent in &meta.parents {
            if let Some(count) = children.get_mut(parent) {
                *count -= 1;
                if *count == 0 {
                    children.remove(parent);
                    self.snapshots.remove(parent);
                }
            }
        }
    }

    /// How many snapshots are currently alive; eviction telemetry.
    pub fn live_snapshots(&self) -> usize {
        self.snapshots.len()
    }

    /// Folds the counters into the result matrices.
    pub fn finalize(self, range: TimeRange, commits_number: usize) -> BurndownResult {
        let global_history = self.global.borrow().matrix(self.sampling, self.granularity);
        let people_histories = if self.people_number > 0 {
            self.people.borrow().matrix(self.sampling, self.granularity)
        } else {
            Vec::new()
        };
        let people_matrix = if self.interactions.borrow().is_empty() {
            Vec::new()
        } else {
            self.interactions.borrow().matrix()
        };

        let mut file_histories = BTreeMap::new();
        if self.track_files {
            if let Some(snapshot) = self
                .last_commit
                .as_ref()
                .and_then(|hash| self.snapshots.get(hash))
            {
                for (path, file) in snapshot {
                    if let Some(counter) = file.per_file_counter() {
                        file_histories.insert(
                            path.clone(),
                            counter.borrow().matrix(self.sampling, self.granularity),
                        );
                    }
                }
            }
        }

        BurndownResult {
            granularity: self.granularity,
            sampling: self.sampling,
            begin_time: range.begin,
            end_time: range.end,
            commits_number,
            global_history,
            file_histories,
            people: self.reversed_people,
            people_histories,
            people_matrix,
        }
    }
}
