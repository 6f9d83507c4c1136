//! History linearization using libgit2
//!
//! Walks the commit graph reachable from HEAD in topological order, oldest
//! first, so that every parent is processed before any of its children.
//! Along the way each commit's author is interned to a dense id and its
//! author timestamp is mapped to a day number counted from the UTC
//! midnight preceding the first commit.

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use git2::{Oid, Repository, Sort};
use halflife_core::provenance::DAY_MASK;
use rustc_hash::FxHashMap;
use std::path::Path;
use tracing::debug;

use super::identity::PeopleRegistry;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Per-commit facts the burndown driver needs.
#[derive(Debug, Clone)]
pub struct CommitMeta {
    /// Full commit hash.
    pub hash: String,
    pub oid: Oid,
    /// Parent hashes, in parent order.
    pub parents: Vec<String>,
    /// Dense author id from the [`PeopleRegistry`].
    pub author: u32,
    /// Days since the start of the analyzed history.
    pub day: u32,
    /// Author timestamp, unix seconds.
    pub when: i64,
}

/// The linearized history of one repository.
pub struct History {
    /// Commits in processing order: parents always precede children.
    pub commits: Vec<CommitMeta>,
    /// How many children of each commit are still waiting to be processed;
    /// the driver decrements these to know when a snapshot can be dropped.
    pub children: FxHashMap<String, usize>,
    /// Author timestamp of the first commit, unix seconds.
    pub begin_time: i64,
    /// Author timestamp of the last commit, unix seconds.
    pub end_time: i64,
}

/// Opens the repository containing `path`.
pub fn open_repository(path: &Path) -> Result<Repository> {
    Repository::discover(path)
        .with_context(|| format!("failed to open git repository at {:?}", path))
}

/// Formats a unix timestamp as ISO 8601.
pub fn format_time(seconds: i64) -> String {
    match Utc.timestamp_opt(seconds, 0).single() {
        Some(when) => when.to_rfc3339(),
        None => "1970-01-01T00:00:00Z".to_string(),
    }
}

/// Walks HEAD's history into processing order and resolves authors.
pub fn linearize(repo: &Repository, people: &mut PeopleRegistry) -> Result<History> {
    let mut revwalk = repo.revwalk()?;
    revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
    revwalk.push_head().context("repository has no HEAD to walk")?;

    let mut commits = Vec::new();
    let mut children: FxHashMap<String, usize> = FxHashMap::default();
    let mut day_start: Option<i64> = None;
    let mut begin_time = 0;
    let mut end_time = 0;

    for oid in revwalk {
        let oid = oid?;
        let commit = repo.find_commit(oid)?;
        let when = commit.author().when().seconds();
        let start = *day_start.get_or_insert_with(|| {
            begin_time = when;
            when - when.rem_euclid(SECONDS_PER_DAY)
        });
        end_time = when;

        // Commits with skewed clocks may predate the first commit's day;
        // they are clamped to day 0 rather than wrapping the packed tag.
        let day = ((when - start) / SECONDS_PER_DAY)
            .clamp(0, i64::from(DAY_MASK) - 1) as u32;
        let author = people.resolve(&commit.author());

        let parents: Vec<String> = commit.parent_ids().map(|p| p.to_string()).collect();
        for parent in &parents {
            *children.entry(parent.clone()).or_insert(0) += 1;
        }
        commits.push(CommitMeta {
            hash: oid.to_string(),
            oid,
            parents,
            author,
            day,
            when,
        });
    }
    debug!(
        commits = commits.len(),
        span_days = commits.last().map(|c| c.day).unwrap_or(0),
        "linearized history"
    );

    Ok(History {
        commits,
        children,
        begin_time,
        end_time,
    })
}
