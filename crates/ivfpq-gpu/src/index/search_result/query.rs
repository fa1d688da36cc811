//! Per-query access with sentinel filtering.

use super::types::{SearchHit, SearchResult};

impl SearchResult {
    /// Matches for one query as `(label, distance)` pairs, sentinels skipped.
    ///
    /// # Panics
    ///
    /// Panics if `query_idx >= num_queries`.
    ///
    /// # Example
    ///
    /// ```
    /// use ivfpq_gpu::index::SearchResult;
    ///
    /// let result = SearchResult::new(
    ///     vec![1, 2, -1, 4, 5, 6],
    ///     vec![0.1, 0.2, f32::INFINITY, 0.4, 0.5, 0.6],
    ///     3, 2,
    /// );
    ///
    /// let q0: Vec<_> = result.query_results(0).collect();
    /// assert_eq!(q0, vec![(1, 0.1), (2, 0.2)]);
    /// assert_eq!(result.num_valid_results(1), 3);
    /// ```
    pub fn query_results(&self, query_idx: usize) -> impl Iterator<Item = (i64, f32)> + '_ {
        assert!(
            query_idx < self.num_queries,
            "query_idx ({}) >= num_queries ({})",
            query_idx,
            self.num_queries
        );
        let start = query_idx * self.k;
        let end = start + self.k;
        self.labels[start..end]
            .iter()
            .zip(&self.distances[start..end])
            .filter(|(&label, _)| Self::is_match(label))
            .map(|(&label, &distance)| (label, distance))
    }

    #[inline]
    pub fn query_results_vec(&self, query_idx: usize) -> Vec<(i64, f32)> {
        self.query_results(query_idx).collect()
    }

    /// Matches for one query (excluding sentinels).
    #[inline]
    pub fn num_valid_results(&self, query_idx: usize) -> usize {
        self.query_results(query_idx).count()
    }

    #[inline]
    pub fn has_results(&self, query_idx: usize) -> bool {
        self.query_results(query_idx).next().is_some()
    }

    /// Nearest match for a query, if any.
    #[inline]
    pub fn top_result(&self, query_idx: usize) -> Option<(i64, f32)> {
        self.query_results(query_idx).next()
    }

    /// Every match as `(query_idx, label, distance)`.
    pub fn all_results(&self) -> impl Iterator<Item = (usize, i64, f32)> + '_ {
        (0..self.num_queries)
            .flat_map(move |q| self.query_results(q).map(move |(label, d)| (q, label, d)))
    }

    /// Ranked hits for one query.
    pub fn hits(&self, query_idx: usize) -> Vec<SearchHit> {
        self.query_results(query_idx)
            .enumerate()
            .map(|(rank, (label, distance))| SearchHit {
                rank,
                label,
                distance,
            })
            .collect()
    }
}
