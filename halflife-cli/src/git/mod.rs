//! Git plumbing for the burndown analysis
//!
//! Everything that touches libgit2 lives here: history linearization and
//! day computation, author identity interning, per-commit tree diffing
//! with rename detection, blob caching with line counting, and line-level
//! diffing of changed blobs. The analysis core consumes only the plain
//! data types these modules produce.

pub mod blob;
pub mod file_diff;
pub mod history;
pub mod identity;
pub mod tree_diff;

pub use blob::{BlobCache, CachedBlob};
pub use file_diff::{DiffEdit, DiffOp, FileDiffData};
pub use history::{CommitMeta, History};
pub use identity::PeopleRegistry;
pub use tree_diff::{ChangeAction, ChangeEntry, TreeChange};
