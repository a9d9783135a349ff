//! Year/quarter time ranges
//!
//! A [`TimeRange`] maps years to sets of quarters. It accepts the compact CLI
//! form `2023:1,4;2024:2` and JSON maps whose keys and quarters may be either
//! strings or integers (`{"2023": ["1", "4"]}` or `{"2023": [1, 4]}`).

use crate::error::{ResearchError, Result};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Fiscal quarter, always in `1..=4`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Quarter(u8);

impl Quarter {
    pub fn new(value: u8) -> Result<Self> {
        if (1..=4).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ResearchError::Config(format!(
                "quarter must be between 1 and 4, got {value}"
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Quarter {
    type Err = ResearchError;

    /// Accepts `3`, `Q3` and `q3`
    fn from_str(s: &str) -> Result<Self> {
        let digits = s.trim().trim_start_matches(['Q', 'q']);
        let value = digits
            .parse::<u8>()
            .map_err(|_| ResearchError::Config(format!("invalid quarter '{s}'")))?;
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for Quarter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct QuarterVisitor;

        impl Visitor<'_> for QuarterVisitor {
            type Value = Quarter;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a quarter between 1 and 4, as a number or string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Quarter, E> {
                u8::try_from(v)
                    .map_err(|_| E::custom(format!("quarter out of range: {v}")))
                    .and_then(|q| Quarter::new(q).map_err(E::custom))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Quarter, E> {
                u64::try_from(v)
                    .map_err(|_| E::custom(format!("quarter out of range: {v}")))
                    .and_then(|q| self.visit_u64(q))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Quarter, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(QuarterVisitor)
    }
}

/// One `(year, quarter)` cell of a [`TimeRange`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Partition {
    pub year: i32,
    pub quarter: Quarter,
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-Q{}", self.year, self.quarter)
    }
}

/// Ordered map of year to quarters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeRange(BTreeMap<i32, BTreeSet<Quarter>>);

impl TimeRange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add quarters for a year; an empty iterator records the year with no
    /// partitions
    pub fn with_year(mut self, year: i32, quarters: impl IntoIterator<Item = Quarter>) -> Self {
        self.0.entry(year).or_default().extend(quarters);
        self
    }

    /// Build from raw `(year, quarter)` pairs, rejecting invalid quarters
    pub fn from_pairs(pairs: impl IntoIterator<Item = (i32, u8)>) -> Result<Self> {
        let mut range = Self::new();
        for (year, quarter) in pairs {
            range.0.entry(year).or_default().insert(Quarter::new(quarter)?);
        }
        Ok(range)
    }

    /// Flatten into partitions, ascending by year then quarter
    pub fn partitions(&self) -> Vec<Partition> {
        self.0
            .iter()
            .flat_map(|(&year, quarters)| {
                quarters.iter().map(move |&quarter| Partition { year, quarter })
            })
            .collect()
    }

    /// Number of partitions
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeSet::len).sum()
    }

    /// True when the range contributes no partitions
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn years(&self) -> impl Iterator<Item = (i32, &BTreeSet<Quarter>)> {
        self.0.iter().map(|(y, q)| (*y, q))
    }

    /// String-keyed form handed to prompts, e.g. `{"2023": ["1", "4"]}`
    pub fn to_prompt_map(&self) -> BTreeMap<String, Vec<String>> {
        self.0
            .iter()
            .map(|(year, quarters)| {
                (
                    year.to_string(),
                    quarters.iter().map(ToString::to_string).collect(),
                )
            })
            .collect()
    }
}

impl FromStr for TimeRange {
    type Err = ResearchError;

    /// Parses `2023:1,4;2024:2`; `2025:` records a year without quarters
    fn from_str(s: &str) -> Result<Self> {
        let mut range = Self::new();
        for group in s.split(';').map(str::trim).filter(|g| !g.is_empty()) {
            let (year, quarters) = group.split_once(':').ok_or_else(|| {
                ResearchError::Config(format!("expected YEAR:Q[,Q...], got '{group}'"))
            })?;
            let year: i32 = year
                .trim()
                .parse()
                .map_err(|_| ResearchError::Config(format!("invalid year '{year}'")))?;
            let quarters = quarters
                .split(',')
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(str::parse)
                .collect::<Result<Vec<Quarter>>>()?;
            range = range.with_year(year, quarters);
        }
        Ok(range)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups: Vec<String> = self
            .0
            .iter()
            .map(|(year, quarters)| {
                let qs: Vec<String> = quarters.iter().map(ToString::to_string).collect();
                format!("{year}:{}", qs.join(","))
            })
            .collect();
        f.write_str(&groups.join(";"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(n: u8) -> Quarter {
        Quarter::new(n).unwrap()
    }

    #[test]
    fn test_quarter_bounds() {
        assert!(Quarter::new(0).is_err());
        assert!(Quarter::new(5).is_err());
        assert_eq!("Q3".parse::<Quarter>().unwrap().get(), 3);
        assert_eq!(" 2 ".parse::<Quarter>().unwrap().get(), 2);
    }

    #[test]
    fn test_partitions_are_ordered() {
        let range = TimeRange::new()
            .with_year(2024, [q(2)])
            .with_year(2023, [q(4), q(1)]);
        let flat: Vec<String> = range
            .partitions()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(flat, vec!["2023-Q1", "2023-Q4", "2024-Q2"]);
        assert_eq!(range.len(), 3);
    }

    #[test]
    fn test_year_without_quarters_contributes_nothing() {
        let range = TimeRange::new().with_year(2025, []);
        assert!(range.is_empty());
        assert!(range.partitions().is_empty());
        assert_eq!(range.years().count(), 1);
    }

    #[test]
    fn test_parse_cli_form() {
        let range: TimeRange = "2023:1,4; 2024:q2".parse().unwrap();
        assert_eq!(range.to_string(), "2023:1,4;2024:2");

        assert!("2023".parse::<TimeRange>().is_err());
        assert!("20x3:1".parse::<TimeRange>().is_err());
        assert!("2023:7".parse::<TimeRange>().is_err());
        assert!("".parse::<TimeRange>().unwrap().is_empty());
    }

    #[test]
    fn test_deserialize_string_and_integer_forms() {
        let a: TimeRange = serde_json::from_str(r#"{"2023": ["1", "4"]}"#).unwrap();
        let b: TimeRange = serde_json::from_str(r#"{"2023": [1, 4]}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);

        let bad: std::result::Result<TimeRange, _> = serde_json::from_str(r#"{"2023": [5]}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_serialize_and_prompt_map() {
        let range = TimeRange::from_pairs([(2023, 1), (2023, 4)]).unwrap();
        assert_eq!(serde_json::to_string(&range).unwrap(), r#"{"2023":[1,4]}"#);

        let map = range.to_prompt_map();
        assert_eq!(map["2023"], vec!["1".to_string(), "4".to_string()]);
    }
}
