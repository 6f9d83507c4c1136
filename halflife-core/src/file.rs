//! A source file as a set of provenance runs.
//!
//! The map stores *run starts*: an entry at key `k` means the line at
//! zero-based position `k` opens a run of lines that all share the packed
//! `(author, day)` tag stored as the value; the run extends up to the next
//! key. One distinguished entry at key = line count always carries
//! [`TOMBSTONE`] and marks the end of the file, so `len()` is just the
//! largest key.
//!
//! Invariants, preserved by every [`File::update`]:
//! - the smallest key is 0;
//! - exactly one tombstone entry, at the largest key, equal to the line
//!   count;
//! - no two adjacent entries carry the same tag (run-length canonical form).
//!
//! The last one is enforced unconditionally: `update` finishes with a
//! compaction pass over the edited neighborhood, so callers never see
//! mergeable neighbors no matter which edit produced them.

use std::cell::RefCell;
use std::rc::Rc;

use crate::counters::{GlobalCounter, InteractionMatrix, PeopleCounter};
use crate::provenance::{day_of, unpack, AUTHOR_MISSING, DAY_MASK, TOMBSTONE};
use crate::tree::{Cursor, IntervalMap, Item};

/// Observer attached to a [`File`]. Every line-accounting event emitted by
/// [`File::update`] is dispatched to each attached status; copies of a file
/// share their statuses, so all counting funnels into one set of counters.
#[derive(Clone)]
pub enum Status {
    /// Project-wide day-by-day accounting.
    Global(Rc<RefCell<GlobalCounter>>),
    /// Same accounting, but private to one file (per-file histories).
    PerFile(Rc<RefCell<GlobalCounter>>),
    /// Per-author accounting; events without author information are dropped.
    People(Rc<RefCell<PeopleCounter>>),
    /// Author-vs-author line displacement.
    Interaction(Rc<RefCell<InteractionMatrix>>),
}

impl Status {
    fn record(&self, current: u32, previous: u32, delta: i64) {
        match self {
            Status::Global(counter) | Status::PerFile(counter) => {
                counter
                    .borrow_mut()
                    .update(day_of(current), day_of(previous), delta);
            }
            Status::People(counter) => {
                let (author, day) = unpack(previous);
                if author != AUTHOR_MISSING {
                    counter.borrow_mut().update(day_of(current), author, day, delta);
                }
            }
            Status::Interaction(matrix) => {
                matrix.borrow_mut().update(current, previous, delta);
            }
        }
    }
}

/// One tracked source file: run-start map plus attached observers.
pub struct File {
    tree: IntervalMap,
    statuses: Vec<Status>,
}

impl File {
    /// Creates a file of `length` lines all introduced with tag `tag`.
    /// The creation itself is an accounting event (delta = `length`).
    pub fn new(tag: u32, length: u32, statuses: Vec<Status>) -> File {
        let mut file = File {
            tree: IntervalMap::new(),
            statuses,
        };
        file.record(tag, tag, i64::from(length));
        if length > 0 {
            file.tree.insert(Item { key: 0, value: tag });
        }
        file.tree.insert(Item {
            key: length,
            value: TOMBSTONE,
        });
        file
    }

    /// Current number of lines: the key of the tombstone entry.
    pub fn len(&self) -> u32 {
        self.tree.item(self.tree.max()).key
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deep copy of the run map; the statuses are shared, not cloned, so
    /// the copy keeps feeding the same counters.
    pub fn copy(&self) -> File {
        File {
            tree: self.tree.clone(),
            statuses: self.statuses.clone(),
        }
    }

    fn record(&self, current: u32, previous: u32, delta: i64) {
        for status in &self.statuses {
            status.record(current, previous, delta);
        }
    }

    /// The per-file counter, when one is attached.
    pub fn per_file_counter(&self) -> Option<Rc<RefCell<GlobalCounter>>> {
        self.statuses.iter().find_map(|status| match status {
            Status::PerFile(counter) => Some(Rc::clone(counter)),
            _ => None,
        })
    }

    /// Tag of the run covering line `pos`: the run starting at or just
    /// before it, stepping once backwards when the lookup lands on the
    /// tombstone. `None` when the file has no run there at all.
    pub fn tag_at(&self, pos: u32) -> Option<u32> {
        let cursor = self.tree.find_le(pos);
        if cursor.is_limit() || cursor.is_negative_limit() {
            return None;
        }
        let tag = self.tree.item(cursor).value;
        if tag != TOMBSTONE {
            return Some(tag);
        }
        let prev = self.tree.prev(cursor);
        if prev.is_negative_limit() {
            return None;
        }
        Some(self.tree.item(prev).value)
    }

    /// Applies one edit: delete `del` lines at `pos`, then insert `ins`
    /// lines there, all tagged `tag`. Exactly one of the three legal shapes
    /// per call: pure insertion, pure deletion, or replacement; a call with
    /// neither is a caller bug and panics.
    ///
    /// Every deleted line produces an accounting event against the tag of
    /// the run it belonged to, and every inserted line one against `tag`.
    /// With `merge` set the edit applies silently: merge commits re-shape
    /// files without touching any counter, and the inserted lines carry
    /// borrowed provenance that later deletions account against.
    pub fn update(&mut self, tag: u32, pos: u32, ins: u32, del: u32, merge: bool) {
        assert!(
            ins > 0 || del > 0,
            "degenerate update: nothing inserted, nothing deleted"
        );
        assert!(
            day_of(tag) != DAY_MASK,
            "the tombstone day pattern may not be assigned to lines"
        );
        let len = self.len();
        assert!(
            pos <= len,
            "attempt to edit past the end of the file: {} > {}",
            pos,
            len
        );
        assert!(
            pos + del <= len,
            "attempt to delete past the end of the file: {}+{} > {}",
            pos,
            del,
            len
        );

        let mut iter = self.tree.find_le(pos);
        let mut origin = self.tree.item(iter);
        if ins > 0 && !merge {
            self.record(tag, tag, i64::from(ins));
        }

        if del == 0 {
            // Insertions only: split the covering run (unless the new lines
            // extend a neighboring run of the same tag) and shift the tail.
            if origin.key < pos || (origin.value == tag && (pos == 0 || origin.key == pos)) {
                iter = self.tree.next(iter);
            }
            let mut c = iter;
            while let Cursor::At(_) = c {
                self.tree.item_mut(c).key += ins;
                c = self.tree.next(c);
            }
            if origin.value != tag {
                self.tree.insert(Item {
                    key: pos,
                    value: tag,
                });
                if origin.key < pos {
                    self.tree.insert(Item {
                        key: pos + ins,
                        value: origin.value,
                    });
                }
            }
            self.compact_around(pos, ins);
            return;
        }

        // Walk the runs overlapping [pos, pos+del): account the overlap,
        // drop the runs that start inside the range. `origin` ends up as
        // the last dropped run (or the straddler), whose tail may have to
        // be re-opened after the shift.
        loop {
            let node = self.tree.item(iter);
            let next_iter = self.tree.next(iter);
            if next_iter.is_limit() {
                break;
            }
            let next_key = self.tree.item(next_iter).key;
            let overlap =
                i64::from(next_key.min(pos + del)) - i64::from(node.key.max(pos));
            if overlap <= 0 {
                break;
            }
            if !merge {
                self.record(tag, node.value, -overlap);
            }
            if node.key >= pos {
                origin = node;
                self.tree.delete_at(iter);
            }
            iter = next_iter;
        }

        // Place the inserted run, or step back so the shift loop below
        // starts at the first surviving node.
        let mut previous: Option<Item> = None;
        if ins > 0 && (origin.value != tag || origin.key == pos) {
            let break_item = self.tree.item(iter);
            if break_item.value == tag {
                // The run after the deleted range already carries `tag`;
                // pull it back to `pos`, or drop it when the run before the
                // range carries `tag` too.
                let prev = self.tree.prev(iter);
                let prev_same =
                    !prev.is_negative_limit() && self.tree.item(prev).value == tag;
                if !prev_same {
                    self.tree.item_mut(iter).key = pos;
                } else {
                    self.tree.delete_at(iter);
                    iter = prev;
                }
                origin.value = tag; // cancels the tail re-opening below
            } else {
                let (_, cursor) = self.tree.insert(Item {
                    key: pos,
                    value: tag,
                });
                iter = cursor;
            }
        } else {
            iter = self.tree.prev(iter);
            if !iter.is_negative_limit() {
                previous = Some(self.tree.item(iter));
            }
        }

        // Shift every key after the edit point. No rebalancing: the order
        // of the survivors is unchanged.
        let delta = i64::from(ins) - i64::from(del);
        if delta != 0 {
            let mut c = self.tree.next(iter);
            while let Cursor::At(_) = c {
                let item = self.tree.item_mut(c);
                item.key = (i64::from(item.key) + delta) as u32;
                c = self.tree.next(c);
            }
            if origin.key > pos {
                origin.key = (i64::from(origin.key) + delta) as u32;
            }
        }

        if ins > 0 {
            if origin.value != tag {
                self.tree.insert(Item {
                    key: pos + ins,
                    value: origin.value,
                });
            } else if pos == 0 {
                // Recover the run start at the beginning of the file.
                self.tree.insert(Item {
                    key: 0,
                    value: tag,
                });
            }
        } else if (pos > origin.key && previous.is_some_and(|p| p.value != origin.value))
            || pos == origin.key
            || pos == 0
        {
            // Re-open the tail of the interrupted run. The insert silently
            // loses to whichever run already claimed the slot.
            self.tree.insert(Item {
                key: pos,
                value: origin.value,
            });
        }
        self.compact_around(pos, ins);
    }

    /// Collapses adjacent equal-tag entries around the edited range
    /// `[pos, pos+ins]`. Only the later entry of a mergeable pair is ever
    /// removed, so the entry at key 0 and the tombstone are untouchable.
    fn compact_around(&mut self, pos: u32, ins: u32) {
        let end = pos + ins;
        let start = self.tree.find_le(pos);
        if start.is_limit() || start.is_negative_limit() {
            return;
        }
        let before = self.tree.prev(start);
        let mut prev_c = if before.is_negative_limit() { start } else { before };
        let mut cur_c = self.tree.next(prev_c);
        loop {
            if cur_c.is_limit() {
                break;
            }
            let prev_item = self.tree.item(prev_c);
            let cur_item = self.tree.item(cur_c);
            if cur_item.value == prev_item.value {
                self.tree.delete_at(cur_c);
                cur_c = self.tree.next(prev_c);
                continue;
            }
            if cur_item.key > end {
                break;
            }
            prev_c = cur_c;
            cur_c = self.tree.next(cur_c);
        }
    }

    /// All `(run start, tag)` entries in order, tombstone included.
    pub fn runs(&self) -> Vec<(u32, u32)> {
        self.tree
            .items()
            .iter()
            .map(|item| (item.key, item.value))
            .collect()
    }

    /// One `key value` line per entry; what the integrity-error logs show.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for item in self.tree.items() {
            out.push_str(&format!("{} {}\n", item.key, item.value));
        }
        out
    }

    /// Asserts every structural invariant; run after each update in debug
    /// mode and freely from tests.
    pub fn validate(&self) {
        self.tree.validate();
        let items = self.tree.items();
        assert!(!items.is_empty(), "file run map may not be empty");
        assert_eq!(items[0].key, 0, "first run must start at line 0");
        let last = items[items.len() - 1];
        assert_eq!(last.value, TOMBSTONE, "last entry must be the tombstone");
        for item in &items[..items.len() - 1] {
            assert_ne!(item.value, TOMBSTONE, "tombstone before the last entry");
        }
        for pair in items.windows(2) {
            assert_ne!(
                pair[0].value, pair[1].value,
                "adjacent runs with equal tags at keys {} and {}",
                pair[0].key, pair[1].key
            );
        }
    }
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File")
            .field("len", &self.len())
            .field("runs", &self.runs())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provenance::pack;

    fn counted() -> (Rc<RefCell<GlobalCounter>>, Vec<Status>) {
        let counter = Rc::new(RefCell::new(GlobalCounter::new()));
        let statuses = vec![Status::Global(Rc::clone(&counter))];
        (counter, statuses)
    }

    #[test]
    fn new_file_layout() {
        let file = File::new(pack(0, 0), 100, Vec::new());
        assert_eq!(file.len(), 100);
        assert_eq!(file.runs(), vec![(0, pack(0, 0)), (100, TOMBSTONE)]);
        file.validate();
    }

    #[test]
    fn new_empty_file() {
        let file = File::new(pack(0, 0), 0, Vec::new());
        assert_eq!(file.len(), 0);
        assert_eq!(file.runs(), vec![(0, TOMBSTONE)]);
        file.validate();
    }

    #[test]
    fn insert_into_middle_splits_the_run() {
        let v0 = pack(0, 0);
        let v1 = pack(0, 1);
        let mut file = File::new(v0, 10, Vec::new());
        file.update(v1, 3, 2, 0, false);
        assert_eq!(file.len(), 12);
        assert_eq!(
            file.runs(),
            vec![(0, v0), (3, v1), (5, v0), (12, TOMBSTONE)]
        );
        file.validate();
    }

    #[test]
    fn insert_at_start_and_end() {
        let v0 = pack(0, 0);
        let v1 = pack(1, 1);
        let mut file = File::new(v0, 4, Vec::new());
        file.update(v1, 0, 2, 0, false);
        assert_eq!(file.runs(), vec![(0, v1), (2, v0), (6, TOMBSTONE)]);
        file.update(v1, 6, 3, 0, false);
        assert_eq!(
            file.runs(),
            vec![(0, v1), (2, v0), (6, v1), (9, TOMBSTONE)]
        );
        file.validate();
    }

    #[test]
    fn insert_same_tag_extends_instead_of_splitting() {
        let v0 = pack(0, 0);
        let mut file = File::new(v0, 10, Vec::new());
        file.update(v0, 5, 3, 0, false);
        assert_eq!(file.runs(), vec![(0, v0), (13, TOMBSTONE)]);
        // Appending with the same tag at the end must also stay canonical.
        file.update(v0, 13, 2, 0, false);
        assert_eq!(file.runs(), vec![(0, v0), (15, TOMBSTONE)]);
        file.validate();
    }

    #[test]
    fn delete_inside_one_run() {
        let v0 = pack(0, 0);
        let mut file = File::new(v0, 10, Vec::new());
        file.update(pack(0, 1), 2, 0, 5, false);
        assert_eq!(file.len(), 5);
        assert_eq!(file.runs(), vec![(0, v0), (5, TOMBSTONE)]);
        file.validate();
    }

    #[test]
    fn delete_across_runs_keeps_tails() {
        let v0 = pack(0, 0);
        let v1 = pack(0, 1);
        let mut file = File::new(v0, 10, Vec::new());
        file.update(v1, 4, 4, 0, false); // 0..4 v0, 4..8 v1, 8..14 v0
        file.update(pack(0, 2), 2, 0, 4, false); // cut v0 tail + v1 head
        assert_eq!(file.len(), 10);
        assert_eq!(
            file.runs(),
            vec![(0, v0), (2, v1), (4, v0), (10, TOMBSTONE)]
        );
        file.validate();
    }

    #[test]
    fn delete_that_joins_equal_runs_compacts() {
        let v0 = pack(0, 0);
        let v1 = pack(0, 1);
        let mut file = File::new(v0, 15, Vec::new());
        file.update(v1, 5, 5, 5, false); // 0..5 v0, 5..10 v1, 10..15 v0
        assert_eq!(
            file.runs(),
            vec![(0, v0), (5, v1), (10, v0), (15, TOMBSTONE)]
        );
        file.update(pack(0, 2), 5, 0, 5, false); // remove the v1 run entirely
        assert_eq!(file.runs(), vec![(0, v0), (10, TOMBSTONE)]);
        file.validate();
    }

    #[test]
    fn replacement_in_place() {
        let v0 = pack(0, 0);
        let v1 = pack(0, 1);
        let mut file = File::new(v0, 10, Vec::new());
        file.update(v1, 2, 3, 3, false);
        assert_eq!(file.len(), 10);
        assert_eq!(
            file.runs(),
            vec![(0, v0), (2, v1), (5, v0), (10, TOMBSTONE)]
        );
        file.validate();
    }

    #[test]
    fn replace_whole_file() {
        let v0 = pack(0, 0);
        let v1 = pack(0, 1);
        let mut file = File::new(v0, 10, Vec::new());
        file.update(v1, 0, 7, 10, false);
        assert_eq!(file.len(), 7);
        assert_eq!(file.runs(), vec![(0, v1), (7, TOMBSTONE)]);
        file.validate();
    }

    #[test]
    fn delete_everything() {
        let v0 = pack(0, 0);
        let mut file = File::new(v0, 10, Vec::new());
        file.update(pack(0, 3), 0, 0, 10, false);
        assert_eq!(file.len(), 0);
        assert_eq!(file.runs(), vec![(0, TOMBSTONE)]);
        file.validate();
    }

    #[test]
    fn length_bookkeeping_over_a_sequence() {
        let mut file = File::new(pack(0, 0), 30, Vec::new());
        let edits: &[(u32, u32, u32, u32)] = &[
            // (day, pos, ins, del)
            (1, 10, 5, 0),
            (2, 0, 0, 4),
            (3, 15, 3, 6),
            (4, 25, 4, 2),
            (5, 0, 1, 1),
        ];
        let mut expected = 30i64;
        for &(day, pos, ins, del) in edits {
            file.update(pack(0, day), pos, ins, del, false);
            expected += i64::from(ins) - i64::from(del);
            assert_eq!(i64::from(file.len()), expected);
            file.validate();
        }
    }

    #[test]
    fn observer_accounting_balances() {
        let (counter, statuses) = counted();
        let mut file = File::new(pack(0, 0), 20, statuses);
        file.update(pack(0, 1), 5, 7, 0, false);
        file.update(pack(0, 2), 0, 0, 9, false);
        file.update(pack(0, 3), 3, 4, 6, false);
        let total: i64 = counter
            .borrow()
            .diffs()
            .values()
            .flat_map(|row| row.values())
            .sum();
        assert_eq!(total, i64::from(file.len()));
        assert_eq!(file.len(), 20 + 7 - 9 + 4 - 6);
    }

    #[test]
    fn merge_mode_is_silent() {
        let (counter, statuses) = counted();
        let mut file = File::new(pack(0, 0), 10, statuses);
        let before: i64 = counter
            .borrow()
            .diffs()
            .values()
            .flat_map(|row| row.values())
            .sum();
        file.update(pack(1, 2), 4, 2, 2, true);
        file.update(0, 0, 0, 1, true);
        let after: i64 = counter
            .borrow()
            .diffs()
            .values()
            .flat_map(|row| row.values())
            .sum();
        assert_eq!(before, after);
        assert_eq!(file.len(), 9);
        file.validate();
    }

    #[test]
    fn copy_is_independent_but_shares_statuses() {
        let (counter, statuses) = counted();
        let mut a = File::new(pack(0, 0), 10, statuses);
        let mut b = a.copy();
        a.update(pack(0, 1), 0, 5, 0, false);
        assert_eq!(a.len(), 15);
        assert_eq!(b.len(), 10);
        // Both copies still feed the same counter.
        b.update(pack(0, 2), 0, 2, 0, false);
        let total: i64 = counter
            .borrow()
            .diffs()
            .values()
            .flat_map(|row| row.values())
            .sum();
        assert_eq!(total, 10 + 5 + 2);
    }

    #[test]
    fn tag_at_resolves_runs_and_tombstone() {
        let v0 = pack(0, 0);
        let v1 = pack(1, 1);
        let mut file = File::new(v0, 10, Vec::new());
        file.update(v1, 4, 3, 0, false); // 0..4 v0, 4..7 v1, 7..13 v0
        assert_eq!(file.tag_at(0), Some(v0));
        assert_eq!(file.tag_at(5), Some(v1));
        assert_eq!(file.tag_at(12), Some(v0));
        // At and past the end the tombstone defers to the last real run.
        assert_eq!(file.tag_at(13), Some(v0));
        assert_eq!(file.tag_at(100), Some(v0));
        let empty = File::new(v0, 0, Vec::new());
        assert_eq!(empty.tag_at(0), None);
    }

    #[test]
    #[should_panic(expected = "degenerate update")]
    fn zero_update_panics() {
        let mut file = File::new(pack(0, 0), 1, Vec::new());
        file.update(pack(0, 0), 0, 0, 0, false);
    }

    #[test]
    #[should_panic(expected = "past the end")]
    fn delete_past_end_panics() {
        let mut file = File::new(pack(0, 0), 5, Vec::new());
        file.update(pack(0, 1), 3, 0, 4, false);
    }
}
