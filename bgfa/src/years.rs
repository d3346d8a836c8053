//! Séquence d'années analysées

use crate::BgfaError;

/// Années strictement croissantes, sans doublon, jamais vide
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearRange {
    years: Vec<i32>,
}

impl YearRange {
    /// Construit une séquence depuis une liste explicite
    pub fn new(years: Vec<i32>) -> Result<Self, BgfaError> {
        if years.is_empty() {
            return Err(BgfaError::MalformedYearRange("empty year list".into()));
        }
        if let Some(pair) = years.windows(2).find(|w| w[0] >= w[1]) {
            return Err(BgfaError::MalformedYearRange(format!(
                "years must be strictly increasing, found {} then {}",
                pair[0], pair[1]
            )));
        }
        Ok(Self { years })
    }

    /// Construit `first..=last`
    pub fn inclusive(first: i32, last: i32) -> Result<Self, BgfaError> {
        if first > last {
            return Err(BgfaError::MalformedYearRange(format!(
                "first year {} is after last year {}",
                first, last
            )));
        }
        Self::new((first..=last).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        self.years.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.years.len()
    }

    /// Toujours faux: une séquence n'est jamais vide
    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    pub fn first(&self) -> i32 {
        self.years[0]
    }

    pub fn last(&self) -> i32 {
        self.years[self.years.len() - 1]
    }

    /// Index d'une année dans la séquence
    pub fn position(&self, year: i32) -> Option<usize> {
        self.years.binary_search(&year).ok()
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.years
    }
}
