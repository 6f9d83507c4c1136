//! Resampling math for combining two finished burndown matrices.
//!
//! Two analyses may have been produced with different sampling and
//! granularity, over different (possibly overlapping) time spans. To sum
//! them, each matrix is exploded to daily resolution (interpolating
//! between samples, decaying inside bands), shifted by its offset from the
//! common start, accumulated into one daily plane, and folded back under
//! the smaller of the two samplings and granularities.

/// Unix-second span of one analysis; the resampling offset source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeRange {
    pub begin: i64,
    pub end: i64,
}

const SECONDS_PER_DAY: i64 = 3600 * 24;

impl TimeRange {
    pub fn new(begin: i64, end: i64) -> Self {
        TimeRange { begin, end }
    }

    pub fn union(self, other: TimeRange) -> TimeRange {
        TimeRange {
            begin: self.begin.min(other.begin),
            end: self.end.max(other.end),
        }
    }

    fn days_from(self, begin: i64) -> usize {
        ((self.begin - begin) / SECONDS_PER_DAY) as usize
    }
}

/// Reads a cell of a possibly sparse matrix: rows may truncate their
/// trailing zero columns.
fn cell(matrix: &[Vec<i64>], y: usize, x: usize) -> f32 {
    matrix
        .get(y)
        .and_then(|row| row.get(x))
        .map(|&v| v as f32)
        .unwrap_or(0.0)
}

/// Sums two sample×band matrices, resampling through a daily plane. The
/// result uses the smaller sampling and the smaller granularity of the two.
pub fn merge_matrices(
    m1: &[Vec<i64>],
    m2: &[Vec<i64>],
    granularity1: u32,
    sampling1: u32,
    granularity2: u32,
    sampling2: u32,
    range1: TimeRange,
    range2: TimeRange,
) -> Vec<Vec<i64>> {
    let merged = range1.union(range2);
    let sampling = sampling1.min(sampling2) as usize;
    let granularity = granularity1.min(granularity2) as usize;

    let size = ((merged.end - merged.begin) / SECONDS_PER_DAY) as usize;
    let mut daily = vec![vec![0f32; size + sampling]; size + granularity];
    if !m1.is_empty() {
        add_burndown_matrix(
            m1,
            granularity1 as usize,
            sampling1 as usize,
            &mut daily,
            range1.days_from(merged.begin),
        );
    }
    if !m2.is_empty() {
        add_burndown_matrix(
            m2,
            granularity2 as usize,
            sampling2 as usize,
            &mut daily,
            range2.days_from(merged.begin),
        );
    }

    let rows = (size + sampling - 1) / sampling;
    let cols = (size + granularity - 1) / granularity;
    let mut result = Vec::with_capacity(rows);
    for i in 0..rows {
        let sampled_index = if i == rows - 1 { size - 1 } else { i * sampling };
        let mut row = vec![0i64; cols];
        for (j, out) in row.iter_mut().enumerate() {
            let mut accum = 0f32;
            for k in (j * granularity)..((j + 1) * granularity).min(size) {
                accum += daily[sampled_index][k];
            }
            *out = accum as i64;
        }
        result.push(row);
    }
    result
}

/// Explodes `matrix` to daily sampling and daily bands, shifts it by
/// `offset` days and adds it to the accumulator. `daily` must already be
/// large enough: at least `len(matrix) * sampling + offset` rows.
pub fn add_burndown_matrix(
    matrix: &[Vec<i64>],
    granularity: usize,
    sampling: usize,
    daily: &mut [Vec<f32>],
    offset: usize,
) {
    let max_cols = matrix.iter().map(|row| row.len()).max().unwrap_or(0);
    let needed_rows = matrix.len() * sampling + offset;
    assert!(
        daily.len() >= needed_rows,
        "merge bug: too few daily rows: required {}, have {}",
        needed_rows,
        daily.len()
    );
    assert!(
        daily.first().map_or(0, |row| row.len()) >= max_cols,
        "merge bug: too few daily columns"
    );

    for x in 0..max_cols {
        for y in 0..matrix.len() {
            if x * granularity > (y + 1) * sampling {
                // The band lies in this sample's future.
                continue;
            }

            // Interpolate the band linearly down from `start_val` at
            // `start_index - 1` towards its value at the end of sample y.
            let decay = |daily: &mut [Vec<f32>], start_index: usize, start_val: f32| {
                if start_val == 0.0 {
                    return;
                }
                let k = cell(matrix, y, x) / start_val; // <= 1
                let scale = ((y + 1) * sampling - start_index) as f32;
                for i in (x * granularity)..((x + 1) * granularity) {
                    let initial = daily[start_index - 1 + offset][i + offset];
                    for j in start_index..((y + 1) * sampling) {
                        daily[j + offset][i + offset] =
                            initial * (1.0 + (k - 1.0) * (j - start_index + 1) as f32 / scale);
                    }
                }
            };
            // Ramp the band up from the previous sample's value towards
            // `finish_val` at `finish_index`.
            let raise = |daily: &mut [Vec<f32>], finish_index: usize, finish_val: f32| {
                let initial = if y > 0 { cell(matrix, y - 1, x) } else { 0.0 };
                let start_index = (y * sampling).max(x * granularity);
                if start_index == finish_index {
                    return;
                }
                let avg = (finish_val - initial) / (finish_index - start_index) as f32;
                for j in (y * sampling)..finish_index {
                    for i in start_index..=j {
                        daily[j + offset][i + offset] = avg;
                    }
                }
                for j in (y * sampling)..finish_index {
                    for i in (x * granularity)..(y * sampling) {
                        daily[j + offset][i + offset] = daily[j - 1 + offset][i + offset];
                    }
                }
            };

            if (x + 1) * granularity >= (y + 1) * sampling {
                // The band closes at or after this sample: pure ramp-up.
                if x * granularity <= y * sampling {
                    raise(daily, (y + 1) * sampling, cell(matrix, y, x));
                } else if (y + 1) * sampling > x * granularity {
                    raise(daily, (y + 1) * sampling, cell(matrix, y, x));
                    let avg = cell(matrix, y, x)
                        / ((y + 1) * sampling - x * granularity) as f32;
                    for j in (x * granularity)..((y + 1) * sampling) {
                        for i in (x * granularity)..=j {
                            daily[j + offset][i + offset] = avg;
                        }
                    }
                }
            } else if (x + 1) * granularity >= y * sampling {
                // The band closes inside this sample: ramp to a peak, then
                // decay for the rest of the sample.
                let v1 = cell(matrix, y - 1, x);
                let v2 = cell(matrix, y, x);
                let delta = ((x + 1) * granularity - y * sampling) as f32;
                let mut previous = 0f32;
                let scale;
                if y > 0 && (y - 1) * sampling >= x * granularity {
                    if y > 1 {
                        previous = cell(matrix, y - 2, x);
                    }
                    scale = sampling as f32;
                } else if y == 0 {
                    scale = sampling as f32;
                } else {
                    scale = (y * sampling - x * granularity) as f32;
                }
                let mut peak = v1 + (v1 - previous) / scale * delta;
                if v2 > peak {
                    // The peak may not undershoot the decayed value.
                    if y < matrix.len() - 1 {
                        let k = (v2 - cell(matrix, y + 1, x)) / sampling as f32;
                        peak = v2 + k * ((y + 1) * sampling - (x + 1) * granularity) as f32;
                    } else {
                        peak = v2;
                    }
                }
                raise(daily, (x + 1) * granularity, peak);
                decay(daily, (x + 1) * granularity, peak);
            } else {
                // The band closed before this sample: pure decay.
                decay(daily, y * sampling, cell(matrix, y - 1, x));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: i64 = SECONDS_PER_DAY;

    #[test]
    fn merging_with_empty_reproduces_the_matrix() {
        let m = vec![vec![10]];
        let range = TimeRange::new(0, DAY);
        let out = merge_matrices(&m, &[], 1, 1, 1, 1, range, range);
        assert_eq!(out, vec![vec![10]]);
    }

    #[test]
    fn merging_equal_ranges_sums_cells() {
        let m1 = vec![vec![10]];
        let m2 = vec![vec![5]];
        let range = TimeRange::new(0, DAY);
        let out = merge_matrices(&m1, &m2, 1, 1, 1, 1, range, range);
        assert_eq!(out, vec![vec![15]]);
    }

    #[test]
    fn disjoint_ranges_land_in_their_own_rows() {
        let m1 = vec![vec![10]];
        let m2 = vec![vec![5]];
        let r1 = TimeRange::new(0, DAY);
        let r2 = TimeRange::new(DAY, 2 * DAY);
        let out = merge_matrices(&m1, &m2, 1, 1, 1, 1, r1, r2);
        assert_eq!(out, vec![vec![10, 0], vec![0, 5]]);
    }

    #[test]
    fn triangular_matrix_survives_a_self_shaped_merge() {
        // One line introduced each day for four days, g = s = 1.
        let m = vec![
            vec![1],
            vec![1, 1],
            vec![1, 1, 1],
            vec![1, 1, 1, 1],
        ];
        let range = TimeRange::new(0, 4 * DAY);
        let out = merge_matrices(&m, &[], 1, 1, 1, 1, range, range);
        assert_eq!(out.len(), 4);
        assert_eq!(out[3], vec![1, 1, 1, 1]);
    }

    #[test]
    fn union_of_ranges() {
        let a = TimeRange::new(100, 200);
        let b = TimeRange::new(50, 150);
        assert_eq!(a.union(b), TimeRange::new(50, 200));
    }
}
