//! Aggregate statistics over search results.

use super::types::SearchResult;

impl SearchResult {
    /// Matches across all queries.
    #[inline]
    pub fn total_valid_results(&self) -> usize {
        self.labels.iter().filter(|&&l| Self::is_match(l)).count()
    }

    /// True when no query found any match.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total_valid_results() == 0
    }

    fn matched_distances(&self) -> impl Iterator<Item = f32> + '_ {
        self.labels
            .iter()
            .zip(&self.distances)
            .filter(|(&l, _)| Self::is_match(l))
            .map(|(_, &d)| d)
    }

    /// Smallest matched distance.
    pub fn min_distance(&self) -> Option<f32> {
        self.matched_distances().min_by(f32::total_cmp)
    }

    /// Largest matched distance.
    pub fn max_distance(&self) -> Option<f32> {
        self.matched_distances().max_by(f32::total_cmp)
    }
}
