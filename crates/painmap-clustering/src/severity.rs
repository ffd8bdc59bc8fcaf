//! Theme severity from the sentiment mix of its documents.
//!
//! Each document contributes its most recent sentiment: negative `+1`,
//! neutral `0`, positive `-1`. The mean maps onto 1..=5:
//!
//! | mean score      | severity |
//! |-----------------|----------|
//! | `>= 0.5`        | 5        |
//! | `[0.25, 0.5)`   | 4        |
//! | `[0, 0.25)`     | 3        |
//! | `[-0.25, 0)`    | 2        |
//! | `< -0.25`       | 1        |

use painmap_core::Sentiment;

use crate::error::StoreError;
use crate::store::ClusteringStore;

/// Severity of a theme with no documents or no sentiment data.
pub const DEFAULT_SEVERITY: u8 = 3;

/// Maps sentiments onto a severity. The mean is only taken over documents
/// that have a sentiment; an empty input yields [`DEFAULT_SEVERITY`].
#[must_use]
pub fn severity_from_sentiments<I>(sentiments: I) -> u8
where
    I: IntoIterator<Item = Sentiment>,
{
    let (sum, count) = sentiments
        .into_iter()
        .fold((0_i64, 0_i64), |(sum, count), s| {
            (sum + i64::from(s.pain_weight()), count + 1)
        });
    if count == 0 {
        return DEFAULT_SEVERITY;
    }

    // Thresholds compared as integers: sum / count >= k/4  <=>  4 * sum >= k * count.
    let scaled = 4 * sum;
    if scaled >= 2 * count {
        5
    } else if scaled >= count {
        4
    } else if scaled >= 0 {
        3
    } else if scaled >= -count {
        2
    } else {
        1
    }
}

/// Reads a theme's documents and their latest sentiments and computes its
/// severity. Has no side effects.
///
/// # Errors
///
/// Returns [`StoreError`] if the store lookups fail.
pub async fn compute_theme_severity(
    store: &dyn ClusteringStore,
    theme_id: i64,
) -> Result<u8, StoreError> {
    let post_ids = store.theme_post_ids(theme_id).await?;
    if post_ids.is_empty() {
        return Ok(DEFAULT_SEVERITY);
    }
    let sentiments = store.latest_sentiments(&post_ids).await?;
    Ok(severity_from_sentiments(sentiments.into_values()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use Sentiment::{Negative, Neutral, Positive};

    #[test]
    fn all_negative_is_five() {
        assert_eq!(severity_from_sentiments([Negative, Negative, Negative]), 5);
    }

    #[test]
    fn all_positive_is_one() {
        assert_eq!(severity_from_sentiments([Positive, Positive]), 1);
    }

    #[test]
    fn empty_is_default() {
        assert_eq!(severity_from_sentiments([]), DEFAULT_SEVERITY);
    }

    #[test]
    fn all_neutral_is_three() {
        assert_eq!(severity_from_sentiments([Neutral, Neutral]), 3);
    }

    #[test]
    fn mixed_example_is_four() {
        // (1 + 1 - 1 + 0) / 4 = 0.25
        assert_eq!(
            severity_from_sentiments([Negative, Negative, Positive, Neutral]),
            4
        );
    }

    #[test]
    fn boundaries_are_inclusive_from_above() {
        // exactly 0.5
        assert_eq!(severity_from_sentiments([Negative, Neutral]), 5);
        // just under 0.5: 2/5 = 0.4
        assert_eq!(
            severity_from_sentiments([Negative, Negative, Neutral, Neutral, Neutral]),
            4
        );
        // exactly 0
        assert_eq!(severity_from_sentiments([Negative, Positive]), 3);
        // exactly -0.25
        assert_eq!(
            severity_from_sentiments([Positive, Neutral, Neutral, Neutral]),
            2
        );
        // -1/3 < -0.25
        assert_eq!(severity_from_sentiments([Positive, Neutral, Neutral]), 1);
        // 1/5 = 0.2
        assert_eq!(
            severity_from_sentiments([Negative, Neutral, Neutral, Neutral, Neutral]),
            3
        );
    }
}
