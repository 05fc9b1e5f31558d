//! Title similarity and positional signals
//!
//! The title ratio is the classic sequence-matching definition:
//!
//! ```text
//! ratio = 2 * M / (len(a) + len(b))
//! ```
//!
//! where `M` is the total length of the matching blocks found by repeatedly
//! taking the longest common run and recursing on both sides of it.
//!
//! The match thresholds are calibrated against this ratio. Indel/LCS based
//! ratios such as `rapidfuzz::fuzz::ratio` score differently and are not a
//! drop-in replacement.

use crate::catalog::{GuideEpisode, LibraryEpisode};

/// Similarity between two titles, in `[0, 1]`.
///
/// Symmetric, case-sensitive, compared per Unicode scalar value.
/// An empty title on either side scores 0.0.
pub fn score(title_a: &str, title_b: &str) -> f64 {
    if title_a.is_empty() || title_b.is_empty() {
        return 0.0;
    }

    // Tie-breaking between equally long runs depends on argument order
    let (first, second) = if title_a <= title_b {
        (title_a, title_b)
    } else {
        (title_b, title_a)
    };

    let a: Vec<char> = first.chars().collect();
    let b: Vec<char> = second.chars().collect();
    let matched = matching_characters(&a, &b);

    (2 * matched) as f64 / (a.len() + b.len()) as f64
}

/// True when both episodes carry numeric season and episode indices and they agree
pub fn same_position(guide: &GuideEpisode, library: &LibraryEpisode) -> bool {
    match (
        guide.season_index,
        guide.episode_index,
        library.season_index,
        library.episode_index,
    ) {
        (Some(gs), Some(ge), Some(ls), Some(le)) => gs == ls && ge == le,
        _ => false,
    }
}

/// Sum of the lengths of all matching blocks between `a` and `b`
fn matching_characters(a: &[char], b: &[char]) -> usize {
    let mut total = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, size) = longest_match(a, b, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        total += size;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            pending.push((i + size, ahi, j + size, bhi));
        }
    }

    total
}

/// Longest common run of `a[alo..ahi]` and `b[blo..bhi]`.
///
/// Among equally long runs, returns the one starting earliest in `a`, then
/// earliest in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);

    // run_len[j + 1] = length of the common run ending at a[i - 1], b[j]
    let width = bhi - blo + 1;
    let mut prev_row = vec![0usize; width];
    let mut curr_row = vec![0usize; width];

    for i in alo..ahi {
        for j in blo..bhi {
            let col = j - blo + 1;
            curr_row[col] = if a[i] == b[j] { prev_row[col - 1] + 1 } else { 0 };
            let k = curr_row[col];
            if k > best_size {
                best_i = i + 1 - k;
                best_j = j + 1 - k;
                best_size = k;
            }
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    (best_i, best_j, best_size)
}
