//! Analysis orchestration
//!
//! Wires the git plumbing to the burndown driver: linearize the history,
//! then for each commit compute its tree changes, load the touched blobs,
//! diff the modified ones, and hand everything to the driver. The loop is
//! strictly sequential; all the state a commit mutates is its own deep
//! copy of the parent snapshot.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rustc_hash::FxHashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::burndown::{BurndownAnalysis, BurndownConfig, BurndownResult};
use crate::git::file_diff::diff_lines;
use crate::git::{self, BlobCache, ChangeAction, FileDiffData, PeopleRegistry, TreeChange};
use halflife_core::matrix::TimeRange;

/// Runs the full burndown analysis over the repository at `path`.
pub fn run(path: &Path, config: &BurndownConfig) -> Result<BurndownResult> {
    let repo = git::history::open_repository(path)?;
    let mut people = PeopleRegistry::default();
    let history = git::history::linearize(&repo, &mut people)?;
    info!(
        commits = history.commits.len(),
        authors = people.len(),
        begin = %git::history::format_time(history.begin_time),
        end = %git::history::format_time(history.end_time),
        "linearized history"
    );

    let mut analysis = BurndownAnalysis::new(config, people.into_names());
    let mut children = history.children.clone();

    let bar = ProgressBar::new(history.commits.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} commits {msg}")
            .expect("static progress template"),
    );
    for meta in &history.commits {
        let commit = repo.find_commit(meta.oid)?;
        let changes = git::tree_diff::tree_changes(&repo, &commit)?;
        let cache = BlobCache::load(&repo, &changes)?;
        let diffs = modified_file_diffs(&changes, &cache);
        analysis
            .process_commit(meta, &changes, &cache, &diffs, &mut children)
            .with_context(|| format!("while processing commit {}", meta.hash))?;
        bar.inc(1);
    }
    bar.finish_and_clear();
    debug!(live_snapshots = analysis.live_snapshots(), "history replayed");

    Ok(analysis.finalize(
        TimeRange::new(history.begin_time, history.end_time),
        history.commits.len(),
    ))
}

/// Edit scripts for every modified text file of the commit. Binary and
/// unloadable sides produce no entry; the appliers skip or report those.
fn modified_file_diffs(
    changes: &[TreeChange],
    cache: &BlobCache,
) -> FxHashMap<String, FileDiffData> {
    let mut diffs = FxHashMap::default();
    for change in changes {
        if change.action != ChangeAction::Modify {
            continue;
        }
        let (Some(old), Some(new)) = (cache.get(change.from.hash), cache.get(change.to.hash))
        else {
            continue;
        };
        if old.is_binary() || new.is_binary() {
            continue;
        }
        diffs.insert(
            change.to.name.clone(),
            diff_lines(&old.text(), &new.text()),
        );
    }
    diffs
}
