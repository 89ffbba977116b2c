//! Running-mean review rating
//!
//! The legacy platform folded each new review into the stored score as
//! `ceil((old + new) / 2)`, which weights the newest review as much as
//! the entire history combined. This keeps the full sum and count so the
//! displayed score is a true mean.

use serde::{Deserialize, Serialize};

/// Accumulated review score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    /// Sum of all recorded scores
    pub sum: u64,
    /// Number of recorded scores
    pub count: u64,
}

impl Rating {
    /// Record one review score (typically 1..=5)
    pub fn record(&mut self, score: u8) {
        self.sum += u64::from(score);
        self.count += 1;
    }

    /// Current mean, or None before any review
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum as f64 / self.count as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_rating_has_no_mean() {
        assert_eq!(Rating::default().mean(), None);
    }

    #[test]
    fn test_running_mean_not_legacy_fold() {
        let mut rating = Rating::default();
        rating.record(4);
        rating.record(2);
        rating.record(3);

        assert_eq!(rating.mean(), Some(3.0));

        // The legacy fold would give ceil((ceil((4+2)/2) + 3) / 2) = 3 here
        // too, but diverges as history grows:
        rating.record(5);
        rating.record(5);
        assert_eq!(rating.mean(), Some(3.8));
    }
}
