//! Grant agreements and their amendment history.
//!
//! A grant row carries its latest agreement values inline and every prior
//! version in `amendments_history`. The history as stored may or may not
//! already contain the latest version; [`amendment_timeline`] produces the
//! complete, deduplicated list.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One version of a grant agreement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amendment {
    /// Sequential revision number; `0` is the original agreement.
    #[serde(deserialize_with = "deserialize_amendment_number")]
    pub amendment_number: i32,
    #[serde(default)]
    pub amendment_date: Option<NaiveDate>,
    #[serde(default)]
    pub agreement_value: Option<f64>,
    #[serde(default)]
    pub agreement_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub agreement_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub additional_information_en: Option<String>,
}

/// Published datasets carry the amendment number both as a JSON number and
/// as a string.
fn deserialize_amendment_number<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid amendment number: {s}"))),
    }
}

/// Full amendment list for a grant, newest first.
///
/// `current` is the version described by the grant row itself. It is added
/// unless the history already holds an entry with the same number. When the
/// history contains duplicates of a number, the first occurrence wins.
pub fn amendment_timeline(history: &[Amendment], current: Amendment) -> Vec<Amendment> {
    let mut timeline: Vec<Amendment> = Vec::with_capacity(history.len() + 1);
    for entry in history {
        if !timeline
            .iter()
            .any(|a| a.amendment_number == entry.amendment_number)
        {
            timeline.push(entry.clone());
        }
    }
    if !timeline
        .iter()
        .any(|a| a.amendment_number == current.amendment_number)
    {
        timeline.push(current);
    }
    timeline.sort_by(|a, b| b.amendment_number.cmp(&a.amendment_number));
    timeline
}

/// Change in agreement value from the original agreement to the latest
/// amendment, when both values are known.
pub fn value_change(timeline: &[Amendment]) -> Option<f64> {
    let latest = timeline.first()?.agreement_value?;
    let original = timeline.last()?.agreement_value?;
    Some(latest - original)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amendment(number: i32, value: f64) -> Amendment {
        Amendment {
            amendment_number: number,
            amendment_date: NaiveDate::from_ymd_opt(2020 + number, 1, 1),
            agreement_value: Some(value),
            agreement_start_date: NaiveDate::from_ymd_opt(2020, 4, 1),
            agreement_end_date: NaiveDate::from_ymd_opt(2025, 3, 31),
            additional_information_en: None,
        }
    }

    #[test]
    fn test_current_version_is_appended() {
        let history = vec![amendment(0, 100.0), amendment(1, 150.0)];
        let timeline = amendment_timeline(&history, amendment(2, 200.0));

        let numbers: Vec<i32> = timeline.iter().map(|a| a.amendment_number).collect();
        assert_eq!(numbers, vec![2, 1, 0]);
        assert_eq!(timeline[0].agreement_value, Some(200.0));
    }

    #[test]
    fn test_current_version_is_not_duplicated() {
        let history = vec![amendment(1, 150.0), amendment(0, 100.0)];
        let timeline = amendment_timeline(&history, amendment(1, 999.0));

        assert_eq!(timeline.len(), 2);
        // the stored history entry is kept as-is
        assert_eq!(timeline[0].agreement_value, Some(150.0));
        assert!(
            timeline
                .windows(2)
                .all(|w| w[0].amendment_number > w[1].amendment_number)
        );
    }

    #[test]
    fn test_duplicates_within_history_collapse() {
        let history = vec![amendment(0, 100.0), amendment(0, 100.0), amendment(3, 90.0)];
        let timeline = amendment_timeline(&history, amendment(3, 90.0));
        let numbers: Vec<i32> = timeline.iter().map(|a| a.amendment_number).collect();
        assert_eq!(numbers, vec![3, 0]);
    }

    #[test]
    fn test_empty_history_yields_current_only() {
        let timeline = amendment_timeline(&[], amendment(0, 50_000.0));
        assert_eq!(timeline.len(), 1);
        assert_eq!(value_change(&timeline), Some(0.0));
    }

    #[test]
    fn test_value_change_spans_original_to_latest() {
        let history = vec![amendment(0, 100.0)];
        let timeline = amendment_timeline(&history, amendment(2, 175.0));
        assert_eq!(value_change(&timeline), Some(75.0));
    }

    #[test]
    fn test_amendment_number_accepts_strings() {
        let parsed: Vec<Amendment> = serde_json::from_str(
            r#"[
                {"amendment_number": "2", "agreement_value": 10.5, "amendment_date": "2021-05-01"},
                {"amendment_number": 1}
            ]"#,
        )
        .unwrap();
        assert_eq!(parsed[0].amendment_number, 2);
        assert_eq!(parsed[1].amendment_number, 1);
        assert_eq!(parsed[1].agreement_value, None);
    }
}
