//! Core search result types.

use crate::config::constants::SENTINEL_LABEL;

/// Result of a k-NN search over `num_queries` queries.
///
/// Results for query `i` occupy `[i * k, (i + 1) * k)` of both arrays.
/// Every query has exactly `k` slots; unfilled slots hold the sentinel
/// label `-1` and distance `+inf`. The `query_results*` accessors skip them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchResult {
    /// Labels for all queries (flattened, k per query).
    pub labels: Vec<i64>,
    /// Squared L2 distances (flattened, k per query).
    pub distances: Vec<f32>,
    /// Neighbors requested per query.
    pub k: usize,
    /// Number of queries.
    pub num_queries: usize,
}

impl SearchResult {
    /// Wrap raw search output.
    ///
    /// # Panics (debug only)
    ///
    /// Debug assertions verify both arrays hold `k * num_queries` entries.
    #[inline]
    pub fn new(labels: Vec<i64>, distances: Vec<f32>, k: usize, num_queries: usize) -> Self {
        debug_assert_eq!(labels.len(), k * num_queries);
        debug_assert_eq!(distances.len(), k * num_queries);
        Self {
            labels,
            distances,
            k,
            num_queries,
        }
    }

    /// Number of queries.
    #[inline]
    pub fn len(&self) -> usize {
        self.num_queries
    }

    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Whether slot `label` is a real match.
    #[inline]
    pub(crate) fn is_match(label: i64) -> bool {
        label != SENTINEL_LABEL
    }
}

/// One matched neighbor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchHit {
    /// Rank within the query's results (0 = nearest).
    pub rank: usize,
    pub label: i64,
    /// Squared L2 distance.
    pub distance: f32,
}
