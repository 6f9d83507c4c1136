//! Burndown accumulators.
//!
//! Line events arrive as `(commit day, introduction day, delta)` triples
//! and are folded on demand into dense matrices: one row per sampling step,
//! one column per granularity band of introduction days. A cell holds the
//! number of still-alive lines that were introduced inside that band, seen
//! at that sample.

use rustc_hash::FxHashMap;

use crate::provenance::{unpack, AUTHOR_MISSING};

/// Project-wide (or per-file) accumulator: `diffs[commit_day][intro_day]`.
#[derive(Clone, Default)]
pub struct GlobalCounter {
    diffs: FxHashMap<u32, FxHashMap<u32, i64>>,
    last_day: u32,
}

impl GlobalCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, commit_day: u32, update_day: u32, delta: i64) {
        *self
            .diffs
            .entry(commit_day)
            .or_default()
            .entry(update_day)
            .or_insert(0) += delta;
        if commit_day > self.last_day {
            self.last_day = commit_day;
        }
    }

    pub fn last_day(&self) -> u32 {
        self.last_day
    }

    pub fn diffs(&self) -> &FxHashMap<u32, FxHashMap<u32, i64>> {
        &self.diffs
    }

    /// Folds the accumulated deltas into the output matrix. One row is
    /// emitted every time the day crosses into a new sampling bucket
    /// (repeated when several buckets are skipped at once), and one final
    /// row snapshots the state just past the last accounted day.
    pub fn matrix(&self, sampling: u32, granularity: u32) -> Vec<Vec<i64>> {
        let mut result = Vec::new();
        let mut previous_day = 0;
        for day in 0..=self.last_day {
            let delta = day / sampling - previous_day / sampling;
            if delta > 0 {
                let status = self.group_by_day(granularity, day);
                for _ in 0..delta {
                    result.push(status.clone());
                }
                previous_day = day;
            }
        }
        result.push(self.group_by_day(granularity, self.last_day + 1));
        result
    }

    /// Alive line counts on `day`, grouped into granularity bands of the
    /// introduction day: band j sums the deltas applied by every commit
    /// before `day` to lines introduced in `[j*g, (j+1)*g)`.
    fn group_by_day(&self, granularity: u32, day: u32) -> Vec<i64> {
        let granularity = granularity.max(1);
        let adjust = u32::from(day % granularity != 0);
        let mut status = vec![0i64; (day / granularity + adjust) as usize];
        let mut group = 0i64;
        for intro in 0..day {
            for commit in 0..day {
                if let Some(row) = self.diffs.get(&commit) {
                    group += row.get(&intro).copied().unwrap_or(0);
                }
            }
            if intro % granularity == granularity - 1 {
                status[(intro / granularity) as usize] = group;
                group = 0;
            }
        }
        if day % granularity != 0 {
            let last = status.len() - 1;
            status[last] = group;
        }
        status
    }
}

/// Per-author accumulator: one [`GlobalCounter`]-shaped plane per author.
#[derive(Clone, Default)]
pub struct PeopleCounter {
    diffs: Vec<FxHashMap<u32, FxHashMap<u32, i64>>>,
    last_day: u32,
}

impl PeopleCounter {
    pub fn new(people: usize) -> Self {
        PeopleCounter {
            diffs: vec![FxHashMap::default(); people],
            last_day: 0,
        }
    }

    pub fn update(&mut self, commit_day: u32, author: u32, update_day: u32, delta: i64) {
        *self.diffs[author as usize]
            .entry(commit_day)
            .or_default()
            .entry(update_day)
            .or_insert(0) += delta;
        if commit_day > self.last_day {
            self.last_day = commit_day;
        }
    }

    pub fn matrix(&self, sampling: u32, granularity: u32) -> Vec<Vec<Vec<i64>>> {
        let mut result = vec![Vec::new(); self.diffs.len()];
        let mut previous_day = 0;
        for day in 0..=self.last_day {
            let delta = day / sampling - previous_day / sampling;
            if delta > 0 {
                let status = self.group_by_day(granularity, day);
                for (author, row) in status.into_iter().enumerate() {
                    for _ in 0..delta {
                        result[author].push(row.clone());
                    }
                }
                previous_day = day;
            }
        }
        let status = self.group_by_day(granularity, self.last_day + 1);
        for (author, row) in status.into_iter().enumerate() {
            result[author].push(row);
        }
        result
    }

    fn group_by_day(&self, granularity: u32, day: u32) -> Vec<Vec<i64>> {
        let granularity = granularity.max(1);
        let adjust = u32::from(day % granularity != 0);
        let width = (day / granularity + adjust) as usize;
        self.diffs
            .iter()
            .map(|person| {
                let mut status = vec![0i64; width];
                let mut group = 0i64;
                for intro in 0..day {
                    for commit in 0..day {
                        if let Some(row) = person.get(&commit) {
                            group += row.get(&intro).copied().unwrap_or(0);
                        }
                    }
                    if intro % granularity == granularity - 1 {
                        status[(intro / granularity) as usize] = group;
                        group = 0;
                    }
                }
                if day % granularity != 0 {
                    status[width - 1] = group;
                }
                status
            })
            .collect()
    }
}

/// Author-vs-author line displacement. Row = author whose lines were
/// touched; column 0 collects events whose new side has no author, column 1
/// self-insertions, column `2 + j` events caused by author `j` (a negative
/// cell means author `j` removed that many of the row author's lines).
#[derive(Clone, Default)]
pub struct InteractionMatrix {
    rows: Vec<FxHashMap<usize, i64>>,
}

impl InteractionMatrix {
    pub fn new(people: usize) -> Self {
        InteractionMatrix {
            rows: vec![FxHashMap::default(); people],
        }
    }

    pub fn update(&mut self, current: u32, previous: u32, delta: i64) {
        let (new_author, _) = unpack(current);
        let (old_author, _) = unpack(previous);
        if old_author == AUTHOR_MISSING {
            return;
        }
        let column = if new_author == AUTHOR_MISSING {
            0
        } else if new_author == old_author && delta > 0 {
            1
        } else {
            2 + new_author as usize
        };
        *self.rows[old_author as usize].entry(column).or_insert(0) += delta;
    }

    /// Dense rows of width `people + 2`.
    pub fn matrix(&self) -> Vec<Vec<i64>> {
        let width = self.rows.len() + 2;
        self.rows
            .iter()
            .map(|row| {
                let mut dense = vec![0i64; width];
                for (&column, &value) in row {
                    dense[column] = value;
                }
                dense
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|row| row.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provenance::pack;

    #[test]
    fn one_line_a_day_is_lower_triangular() {
        let mut counter = GlobalCounter::new();
        for day in 0..10 {
            counter.update(day, day, 1);
        }
        let matrix = counter.matrix(1, 1);
        // Rows for days 1..=9 plus the final snapshot at day 10.
        assert_eq!(matrix.len(), 10);
        for (i, row) in matrix.iter().enumerate() {
            let day = if i == 9 { 10 } else { i as u32 + 1 };
            assert_eq!(row.len(), day as usize);
            assert!(row.iter().all(|&v| v == 1), "row {} = {:?}", i, row);
        }
    }

    #[test]
    fn single_day_history_has_one_row() {
        let mut counter = GlobalCounter::new();
        counter.update(0, 0, 10);
        assert_eq!(counter.matrix(1, 1), vec![vec![10]]);
        assert_eq!(counter.matrix(30, 30), vec![vec![10]]);
    }

    #[test]
    fn deletions_age_out_of_their_band() {
        let mut counter = GlobalCounter::new();
        counter.update(0, 0, 10);
        counter.update(3, 0, -4); // day-3 commit removes 4 day-0 lines
        counter.update(3, 3, 2);
        let matrix = counter.matrix(1, 1);
        // day1..day3 rows then the final day-4 snapshot.
        assert_eq!(matrix.len(), 4);
        assert_eq!(matrix[0], vec![10]);
        assert_eq!(matrix[1], vec![10, 0]);
        assert_eq!(matrix[2], vec![10, 0, 0]);
        assert_eq!(matrix[3], vec![6, 0, 0, 2]);
    }

    #[test]
    fn coarse_granularity_bands_sum_days() {
        let mut counter = GlobalCounter::new();
        for day in 0..10 {
            counter.update(day, day, 1);
        }
        let matrix = counter.matrix(5, 5);
        // Rows at day 5 and the final snapshot at day 10.
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix[0], vec![5]);
        assert_eq!(matrix[1], vec![5, 5]);
    }

    #[test]
    fn sparse_history_still_emits_every_sample_row() {
        let mut counter = GlobalCounter::new();
        counter.update(0, 0, 4);
        counter.update(9, 9, 1);
        let matrix = counter.matrix(3, 3);
        // Samples at days 3, 6 and 9, then the final day-10 snapshot.
        assert_eq!(
            matrix,
            vec![
                vec![4],
                vec![4, 0],
                vec![4, 0, 0],
                vec![4, 0, 0, 1],
            ]
        );
    }

    #[test]
    fn people_planes_sum_to_global() {
        let mut people = PeopleCounter::new(2);
        let mut global = GlobalCounter::new();
        for day in 0..10 {
            people.update(day, day % 2, day, 1);
            global.update(day, day, 1);
        }
        let planes = people.matrix(1, 1);
        let total = global.matrix(1, 1);
        assert_eq!(planes.len(), 2);
        for (i, row) in total.iter().enumerate() {
            let summed: Vec<i64> = row
                .iter()
                .enumerate()
                .map(|(j, _)| planes[0][i][j] + planes[1][i][j])
                .collect();
            assert_eq!(&summed, row);
        }
        // Author 0 owns the even introduction days only.
        let last = &planes[0][9];
        for (day, &v) in last.iter().enumerate() {
            assert_eq!(v, i64::from(day % 2 == 0), "day {}", day);
        }
    }

    #[test]
    fn interaction_matrix_buckets() {
        let mut matrix = InteractionMatrix::new(2);
        // Author 0 writes 10 lines.
        matrix.update(pack(0, 0), pack(0, 0), 10);
        // Author 1 deletes 3 of author 0's lines.
        matrix.update(pack(1, 5), pack(0, 0), -3);
        // Author 0 deletes 2 of their own lines: not a self-insertion.
        matrix.update(pack(0, 6), pack(0, 0), -2);
        // An authorless event against author 1's lines.
        matrix.update(pack(crate::provenance::AUTHOR_MISSING, 7), pack(1, 5), -1);
        let dense = matrix.matrix();
        assert_eq!(dense[0], vec![0, 10, -2, -3]);
        assert_eq!(dense[1], vec![-1, 0, 0, 0]);
    }

    #[test]
    fn unknown_previous_author_is_dropped() {
        let mut matrix = InteractionMatrix::new(1);
        matrix.update(pack(0, 1), pack(AUTHOR_MISSING, 0), -5);
        assert!(matrix.is_empty());
    }
}
