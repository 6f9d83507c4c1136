//! Halflife - line burndown analysis for git repositories
//!
//! Walks a repository's history commit by commit, tracking for every line
//! when it was introduced and by whom, and folds the results into
//! time-by-age matrices: the "half-life" of the code base, per project,
//! per file and per author.

pub mod analyze;
pub mod burndown;
pub mod cli;
pub mod git;
pub mod reporters;
