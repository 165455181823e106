//! Augmentation parameter set
//!
//! Two ordered lists define the variant space of one document: transpose
//! offsets (semitones) and time-stretch factors (fractional change applied to
//! every delta-time). Variants are enumerated transpose-major, stretch-minor.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default transpose offsets: -5..=+6 semitones, zero excluded
pub const DEFAULT_TRANSPOSE: [i32; 11] = [1, 2, 3, 4, 5, 6, -1, -2, -3, -4, -5];

/// Default uniform time-stretch factors
pub const DEFAULT_TIME_STRETCH: [f64; 6] = [0.025, 0.05, 0.1, -0.025, -0.05, -0.1];

/// Transpose offsets × stretch factors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentParams {
    pub transpose: Vec<i32>,
    pub time_stretch: Vec<f64>,
}

impl Default for AugmentParams {
    fn default() -> Self {
        Self {
            transpose: DEFAULT_TRANSPOSE.to_vec(),
            time_stretch: DEFAULT_TIME_STRETCH.to_vec(),
        }
    }
}

impl AugmentParams {
    /// Build a parameter set, substituting the identity for an empty list
    ///
    /// An empty transpose list means `[0]` and an empty stretch list means
    /// `[0.0]`, so every document yields at least one variant.
    pub fn new(transpose: Vec<i32>, time_stretch: Vec<f64>) -> Result<Self> {
        let transpose = if transpose.is_empty() { vec![0] } else { transpose };
        let time_stretch = if time_stretch.is_empty() {
            vec![0.0]
        } else {
            time_stretch
        };

        if let Some(bad) = time_stretch.iter().find(|s| !s.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "time stretch factor must be finite, got {}",
                bad
            )));
        }

        Ok(Self {
            transpose,
            time_stretch,
        })
    }

    /// Parse comma-separated transpose and stretch lists (`"1,-2"`, `"0.05,-0.1"`)
    pub fn parse(transpose: &str, time_stretch: &str) -> Result<Self> {
        Self::new(parse_list(transpose, "transpose")?, parse_list(time_stretch, "time stretch")?)
    }

    /// Number of variants produced per document
    pub fn variant_count(&self) -> usize {
        self.transpose.len() * self.time_stretch.len()
    }

    /// (index, transpose, stretch) in enumeration order
    pub fn pairs(&self) -> impl Iterator<Item = (usize, i32, f64)> + '_ {
        self.transpose
            .iter()
            .flat_map(move |&t| self.time_stretch.iter().map(move |&s| (t, s)))
            .enumerate()
            .map(|(index, (t, s))| (index, t, s))
    }
}

/// Parse one comma-separated list; blank input is an empty list
///
/// `what` names the list in error messages.
pub fn parse_list<T>(raw: &str, what: &str) -> Result<Vec<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    raw.split(',')
        .map(|item| {
            let item = item.trim();
            item.parse::<T>().map_err(|e| {
                Error::InvalidInput(format!("invalid {} value '{}': {}", what, item, e))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = AugmentParams::default();
        assert_eq!(params.transpose.len(), 11);
        assert!(!params.transpose.contains(&0));
        assert_eq!(params.transpose.iter().min(), Some(&-5));
        assert_eq!(params.transpose.iter().max(), Some(&6));
        assert_eq!(params.time_stretch.len(), 6);
        assert_eq!(params.variant_count(), 66);
    }

    #[test]
    fn test_parse_lists() {
        let params = AugmentParams::parse("1, -2,3", "0.5,-0.25").unwrap();
        assert_eq!(params.transpose, vec![1, -2, 3]);
        assert_eq!(params.time_stretch, vec![0.5, -0.25]);
    }

    #[test]
    fn test_empty_lists_become_identity() {
        let params = AugmentParams::parse("", " ").unwrap();
        assert_eq!(params.transpose, vec![0]);
        assert_eq!(params.time_stretch, vec![0.0]);
        assert_eq!(params.variant_count(), 1);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            AugmentParams::parse("1,x", "0.1"),
            Err(Error::InvalidInput(_))
        ));
        assert!(AugmentParams::parse("1", "0.1,,0.2").is_err());
        assert!(AugmentParams::parse("1", "NaN").is_err());
    }

    #[test]
    fn test_pairs_transpose_major() {
        let params = AugmentParams::new(vec![1, 2], vec![0.0, 0.5, -0.5]).unwrap();
        let pairs: Vec<_> = params.pairs().collect();
        assert_eq!(
            pairs,
            vec![
                (0, 1, 0.0),
                (1, 1, 0.5),
                (2, 1, -0.5),
                (3, 2, 0.0),
                (4, 2, 0.5),
                (5, 2, -0.5),
            ]
        );
    }
}
