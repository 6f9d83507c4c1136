//! Combining two finished analyses
//!
//! Folds two `BurndownResult`s, typically produced on disjoint slices of
//! an organization's repositories or the same repository at different
//! times, into one. The smaller sampling and granularity win; matrices
//! are resampled through a daily plane and summed. Per-file and per-author
//! planes touch disjoint keys, so they merge on parallel workers.

use std::collections::BTreeMap;

use halflife_core::matrix::{merge_matrices, TimeRange};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use super::BurndownResult;
use crate::git::identity::merge_reversed_dicts;

pub fn merge_results(r1: BurndownResult, r2: BurndownResult) -> BurndownResult {
    let range1 = TimeRange::new(r1.begin_time, r1.end_time);
    let range2 = TimeRange::new(r2.begin_time, r2.end_time);
    let (people, merged_dict) = merge_reversed_dicts(&r1.people, &r2.people);

    let remix = |m1: &[Vec<i64>], m2: &[Vec<i64>]| {
        merge_matrices(
            m1,
            m2,
            r1.granularity,
            r1.sampling,
            r2.granularity,
            r2.sampling,
            range1,
            range2,
        )
    };

    let global_history = if r1.global_history.is_empty() && r2.global_history.is_empty() {
        Vec::new()
    } else {
        remix(&r1.global_history, &r2.global_history)
    };

    let mut file_histories: BTreeMap<String, Vec<Vec<i64>>> = BTreeMap::new();
    let shared: Vec<&String> = r1
        .file_histories
        .keys()
        .filter(|key| r2.file_histories.contains_key(*key))
        .collect();
    let merged_shared: Vec<(String, Vec<Vec<i64>>)> = shared
        .par_iter()
        .map(|key| {
            (
                (*key).clone(),
                remix(&r1.file_histories[*key], &r2.file_histories[*key]),
            )
        })
        .collect();
    file_histories.extend(merged_shared);
    for (key, history) in &r1.file_histories {
        if !r2.file_histories.contains_key(key) {
            file_histories.insert(key.clone(), history.clone());
        }
    }
    for (key, history) in &r2.file_histories {
        if !r1.file_histories.contains_key(key) {
            file_histories.insert(key.clone(), history.clone());
        }
    }

    let people_histories: Vec<Vec<Vec<i64>>> = merged_dict
        .par_iter()
        .map(|name| {
            let ptrs = people[name];
            if ptrs[1] < 0 {
                r2.people_histories
                    .get(ptrs[2] as usize)
                    .cloned()
                    .unwrap_or_default()
            } else if ptrs[2] < 0 {
                r1.people_histories
                    .get(ptrs[1] as usize)
                    .cloned()
                    .unwrap_or_default()
            } else {
                let empty: &[Vec<i64>] = &[];
                let m1 = r1
                    .people_histories
                    .get(ptrs[1] as usize)
                    .map(|m| m.as_slice())
                    .unwrap_or(empty);
                let m2 = r2
                    .people_histories
                    .get(ptrs[2] as usize)
                    .map(|m| m.as_slice())
                    .unwrap_or(empty);
                if m1.is_empty() && m2.is_empty() {
                    Vec::new()
                } else {
                    remix(m1, m2)
                }
            }
        })
        .collect();

    let people_matrix = merge_people_matrices(&r1, &r2, &people, &merged_dict);

    BurndownResult {
        granularity: r1.granularity.min(r2.granularity),
        sampling: r1.sampling.min(r2.sampling),
        begin_time: range1.union(range2).begin,
        end_time: range1.union(range2).end,
        commits_number: r1.commits_number + r2.commits_number,
        global_history,
        file_histories,
        people: merged_dict,
        people_histories,
        people_matrix,
    }
}

/// Reindexes both interaction matrices into the merged dictionary and
/// sums them. Columns 0 and 1 (unknown author, self) add positionally;
/// author columns follow their owner's merged index.
fn merge_people_matrices(
    r1: &BurndownResult,
    r2: &BurndownResult,
    people: &FxHashMap<String, [i32; 3]>,
    merged_dict: &[String],
) -> Vec<Vec<i64>> {
    if r1.people_matrix.is_empty() && r2.people_matrix.is_empty() {
        return Vec::new();
    }
    let width = merged_dict.len() + 2;
    let mut out = vec![vec![0i64; width]; merged_dict.len()];
    for result in [r1, r2] {
        for (i, name) in result.people.iter().enumerate() {
            let Some(row) = result.people_matrix.get(i) else {
                continue;
            };
            let mi = people[name][0] as usize;
            out[mi][0] += row.first().copied().unwrap_or(0);
            out[mi][1] += row.get(1).copied().unwrap_or(0);
            for (j, &value) in row.iter().skip(2).enumerate() {
                if let Some(peer) = result.people.get(j) {
                    out[mi][2 + people[peer][0] as usize] += value;
                }
            }
        }
    }
    out
}
