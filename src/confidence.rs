//! Confidence values attached to relationships.
//!
//! A confidence is a validated number in `[0.0, 1.0]`. Derived confidences are
//! combined by product, capped at 1.0, so a chain of premises can only be as
//! certain as its weakest links together.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Validated confidence in `[0.0, 1.0]`.
///
/// # Examples
///
/// ```
/// use fair_kg::Confidence;
///
/// let a = Confidence::new(0.9).unwrap();
/// let b = Confidence::new(0.5).unwrap();
/// assert!((a.combine(b).value() - 0.45).abs() < 1e-12);
/// assert!(Confidence::new(1.2).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    /// Minimum valid confidence value.
    pub const MIN_VALUE: f64 = 0.0;

    /// Maximum valid confidence value.
    pub const MAX_VALUE: f64 = 1.0;

    /// Creates a new confidence with validation.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::ConfidenceOutOfRange` if the value is NaN or
    /// outside `[0.0, 1.0]`.
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if value.is_nan() || !(Self::MIN_VALUE..=Self::MAX_VALUE).contains(&value) {
            return Err(ValidationError::ConfidenceOutOfRange { value });
        }
        Ok(Self(value))
    }

    /// Full certainty.
    #[must_use]
    pub const fn one() -> Self {
        Self(1.0)
    }

    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }

    /// Product of two confidences, capped at 1.0.
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        Self((self.0 * other.0).clamp(Self::MIN_VALUE, Self::MAX_VALUE))
    }

    /// Product over an arbitrary premise chain. An empty chain is certain.
    #[must_use]
    pub fn product<I: IntoIterator<Item = Self>>(items: I) -> Self {
        items.into_iter().fold(Self::one(), Self::combine)
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self::one()
    }
}

impl TryFrom<f64> for Confidence {
    type Error = ValidationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(c: Confidence) -> Self {
        c.0
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}
