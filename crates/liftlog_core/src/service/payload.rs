//! Structural validation of untyped exercise payloads.
//!
//! # Responsibility
//! - Split a create payload into batch items (single object or array).
//! - Check presence/shape of exercise fields without a typed wire schema.
//! - Classify set entries into insert, skip, or malformed.
//!
//! # Invariants
//! - A set entry lacking `weight` or `reps` is skipped, never rejected.
//! - `0` is a value: zero weight/reps are inserted as-is.
//! - Validation has no side effects.

use crate::model::exercise::{NewExercise, NewSet};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};

static CALENDAR_DAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("valid calendar day regex"));

/// Accepted keys for the exercise name, in lookup order.
const NAME_KEYS: [&str; 2] = ["exerciseName", "name"];

/// Text fields are stored trimmed, so whitespace-only input is empty.
const BLANK_TEXT_REASON: &str = "must not be blank once surrounding whitespace is trimmed";

/// One structural problem found in a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: &'static str,
    pub reason: &'static str,
}

impl FieldIssue {
    fn new(field: &'static str, reason: &'static str) -> Self {
        Self { field, reason }
    }
}

impl Display for FieldIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{}` {}", self.field, self.reason)
    }
}

/// Exercise payload that passed structural validation.
///
/// Set entries stay raw; they are classified one by one while writing so
/// that per-set outcomes can be recorded in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseDraft<'a> {
    pub exercise: NewExercise,
    pub sets: &'a [Value],
}

/// Outcome of inspecting one set entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetEntry {
    /// Both values are present and valid.
    Insert(NewSet),
    /// `weight` or `reps` is absent.
    Skip,
    /// Entry is present but cannot be stored.
    Malformed(String),
}

/// Splits a create payload into batch items.
///
/// An object is a batch of one. Anything other than an object or an array
/// of items is rejected, as is an empty array.
pub fn batch_items(payload: &Value) -> Result<&[Value], FieldIssue> {
    match payload {
        Value::Array(items) if items.is_empty() => {
            Err(FieldIssue::new("exercises", "must not be empty"))
        }
        Value::Array(items) => Ok(items.as_slice()),
        Value::Object(_) => Ok(std::slice::from_ref(payload)),
        _ => Err(FieldIssue::new(
            "exercises",
            "must be an exercise object or an array of them",
        )),
    }
}

/// Validates exercise header fields and the shape of `sets`.
///
/// Returns every issue found rather than stopping at the first one.
pub fn parse_exercise(value: &Value) -> Result<ExerciseDraft<'_>, Vec<FieldIssue>> {
    let Some(fields) = value.as_object() else {
        return Err(vec![FieldIssue::new("exercise", "must be an object")]);
    };

    let mut issues = Vec::new();
    let date = required_text(fields, &["date"], "date", &mut issues);
    let category = required_text(fields, &["category"], "category", &mut issues);
    let name = required_text(fields, &NAME_KEYS, "exerciseName", &mut issues);

    if let Some(date) = date.as_deref() {
        if !CALENDAR_DAY_RE.is_match(date) {
            issues.push(FieldIssue::new("date", "must be formatted as YYYY-MM-DD"));
        }
    }

    let sets = match fields.get("sets") {
        Some(Value::Array(sets)) => Some(sets.as_slice()),
        Some(_) => {
            issues.push(FieldIssue::new("sets", "must be an array"));
            None
        }
        None => {
            issues.push(FieldIssue::new("sets", "is required"));
            None
        }
    };

    match (date, category, name, sets) {
        (Some(date), Some(category), Some(name), Some(sets)) if issues.is_empty() => {
            Ok(ExerciseDraft {
                exercise: NewExercise {
                    date,
                    category,
                    name,
                },
                sets,
            })
        }
        _ => Err(issues),
    }
}

/// Classifies one raw set entry.
pub fn classify_set(entry: &Value) -> SetEntry {
    let Some(fields) = entry.as_object() else {
        return SetEntry::Malformed("set entry must be an object".to_string());
    };

    let (Some(weight), Some(reps)) = (fields.get("weight"), fields.get("reps")) else {
        return SetEntry::Skip;
    };

    match (count_value(weight), count_value(reps)) {
        (Some(weight), Some(reps)) => SetEntry::Insert(NewSet { weight, reps }),
        (None, _) => SetEntry::Malformed(format!(
            "`weight` must be a non-negative integer, got {weight}"
        )),
        (_, None) => SetEntry::Malformed(format!(
            "`reps` must be a non-negative integer, got {reps}"
        )),
    }
}

fn count_value(value: &Value) -> Option<i64> {
    value.as_i64().filter(|count| *count >= 0)
}

fn required_text(
    fields: &Map<String, Value>,
    keys: &[&str],
    field: &'static str,
    issues: &mut Vec<FieldIssue>,
) -> Option<String> {
    let Some(value) = keys.iter().find_map(|key| fields.get(*key)) else {
        issues.push(FieldIssue::new(field, "is required"));
        return None;
    };

    match value.as_str().map(str::trim) {
        Some(text) if !text.is_empty() => Some(text.to_string()),
        Some(_) => {
            issues.push(FieldIssue::new(field, BLANK_TEXT_REASON));
            None
        }
        None => {
            issues.push(FieldIssue::new(field, "must be a string"));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        batch_items, classify_set, parse_exercise, FieldIssue, SetEntry, BLANK_TEXT_REASON,
    };
    use crate::model::exercise::NewSet;
    use serde_json::json;

    #[test]
    fn batch_items_wraps_single_object() {
        let payload = json!({"date": "2024-01-01"});
        assert_eq!(batch_items(&payload).unwrap().len(), 1);
    }

    #[test]
    fn batch_items_rejects_empty_array_and_scalars() {
        assert!(batch_items(&json!([])).is_err());
        assert!(batch_items(&json!("bench")).is_err());
        assert!(batch_items(&json!(null)).is_err());
    }

    #[test]
    fn parse_exercise_accepts_name_alias_and_trims() {
        let payload = json!({
            "date": "2024-01-01",
            "category": " Chest ",
            "name": "Bench",
            "sets": []
        });
        let draft = parse_exercise(&payload).unwrap();
        assert_eq!(draft.exercise.category, "Chest");
        assert_eq!(draft.exercise.name, "Bench");
        assert!(draft.sets.is_empty());
    }

    #[test]
    fn parse_exercise_reports_every_issue() {
        let payload = json!({
            "date": "01/02/2024",
            "category": "",
            "sets": {"weight": 10}
        });
        let issues = parse_exercise(&payload).unwrap_err();
        assert_eq!(
            issues,
            vec![
                FieldIssue::new("category", BLANK_TEXT_REASON),
                FieldIssue::new("exerciseName", "is required"),
                FieldIssue::new("date", "must be formatted as YYYY-MM-DD"),
                FieldIssue::new("sets", "must be an array"),
            ]
        );
    }

    #[test]
    fn parse_exercise_rejects_non_ascii_digits_in_date() {
        let payload = json!({
            "date": "\u{ff12}\u{ff10}\u{ff12}\u{ff10}-\u{ff10}\u{ff11}-\u{ff10}\u{ff11}",
            "category": "Chest",
            "exerciseName": "Bench",
            "sets": []
        });
        let issues = parse_exercise(&payload).unwrap_err();
        assert_eq!(
            issues,
            vec![FieldIssue::new("date", "must be formatted as YYYY-MM-DD")]
        );
    }

    #[test]
    fn classify_set_keeps_zero_and_skips_missing_values() {
        assert_eq!(
            classify_set(&json!({"weight": 0, "reps": 8})),
            SetEntry::Insert(NewSet { weight: 0, reps: 8 })
        );
        assert_eq!(classify_set(&json!({"reps": 8})), SetEntry::Skip);
        assert_eq!(classify_set(&json!({})), SetEntry::Skip);
    }

    #[test]
    fn classify_set_flags_present_but_invalid_values() {
        assert!(matches!(
            classify_set(&json!({"weight": null, "reps": 8})),
            SetEntry::Malformed(_)
        ));
        assert!(matches!(
            classify_set(&json!({"weight": 10, "reps": -1})),
            SetEntry::Malformed(_)
        ));
        assert!(matches!(
            classify_set(&json!({"weight": 82.5, "reps": 5})),
            SetEntry::Malformed(_)
        ));
        assert!(matches!(classify_set(&json!(5)), SetEntry::Malformed(_)));
    }
}
