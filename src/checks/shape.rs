//! Shape checks over the raw JSON value: required fields, primitive types,
//! numeric ranges, enum values and array lengths.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::config::ThresholdConfig;
use crate::constants::{FINDING_SEVERITIES, SCORE_MAX, SCORE_MIN};
use crate::model::{CheckCode, CheckResult, Severity};

/// Primitive JSON type expected for a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Number,
    Integer,
    Text,
    Object,
    Array,
}

impl Kind {
    const fn name(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Text => "string",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    fn matches(self, v: &Value) -> bool {
        match self {
            Self::Number => v.is_number(),
            Self::Integer => v.is_u64() || v.is_i64(),
            Self::Text => v.is_string(),
            Self::Object => v.is_object(),
            Self::Array => v.is_array(),
        }
    }
}

/// Required top-level fields.
const TOP_LEVEL: &[(&str, Kind)] = &[
    ("score", Kind::Number),
    ("subscores", Kind::Object),
    ("summary", Kind::Text),
    ("top_fixes", Kind::Array),
    ("findings", Kind::Array),
];

/// Required fields of each `top_fixes[]` item.
const TOP_FIX_FIELDS: &[(&str, Kind)] = &[
    ("title", Kind::Text),
    ("detail", Kind::Text),
    ("priority", Kind::Integer),
];

/// Required fields of each `findings[]` item.
const FINDING_FIELDS: &[(&str, Kind)] = &[
    ("category", Kind::Text),
    ("severity", Kind::Text),
    ("evidence", Kind::Text),
    ("issue", Kind::Text),
    ("suggestion", Kind::Text),
];

/// Required fields of each `rewrites[]` item.
const REWRITE_FIELDS: &[(&str, Kind)] = &[
    ("kind", Kind::Text),
    ("original", Kind::Text),
    ("rewritten", Kind::Text),
];

/// Collects failures per check family and emits a pass for clean families.
struct Collector {
    out: Vec<CheckResult>,
}

impl Collector {
    fn family(&mut self, code: CheckCode, severity: Severity, ok_msg: &str, failures: Vec<CheckResult>) {
        if failures.is_empty() {
            self.out.push(CheckResult::pass(code, severity, ok_msg));
        } else {
            self.out.extend(failures);
        }
    }
}

/// Run every shape check. Returns `(results, object_ok)`; `object_ok` is
/// `false` when the value is not an object and nothing else could run.
#[must_use]
pub fn check_shape(value: &Value, thresholds: &ThresholdConfig) -> (Vec<CheckResult>, bool) {
    let Some(obj) = value.as_object() else {
        return (
            vec![
                CheckResult::fail(
                    CheckCode::ShapeObject,
                    Severity::Error,
                    format!("output must be a JSON object, got {}", type_name(value)),
                )
                .at("$"),
            ],
            false,
        );
    };

    let mut c = Collector {
        out: vec![CheckResult::pass(
            CheckCode::ShapeObject,
            Severity::Error,
            "output is a JSON object",
        )],
    };

    c.family(
        CheckCode::ShapeRequiredField,
        Severity::Error,
        "all required fields present with correct types",
        required_fields(obj),
    );
    c.family(
        CheckCode::ShapeEmptyText,
        Severity::Error,
        "required text fields are non-empty",
        empty_text(obj),
    );
    c.family(
        CheckCode::ShapeScoreRange,
        Severity::Error,
        "scores within 0-100",
        score_ranges(obj),
    );
    c.family(
        CheckCode::ShapeArrayLength,
        Severity::Error,
        "array lengths within limits",
        array_lengths(obj, thresholds),
    );
    c.family(
        CheckCode::ShapeEnumValue,
        Severity::Error,
        "finding severities valid",
        severities(obj),
    );
    c.family(
        CheckCode::ShapePriorityUnique,
        Severity::Warning,
        "fix priorities unique",
        unique_priorities(obj),
    );

    (c.out, true)
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn field_failures(obj: &Map<String, Value>, fields: &[(&str, Kind)], prefix: &str) -> Vec<CheckResult> {
    let mut out = Vec::new();
    for &(name, kind) in fields {
        let path = format!("{prefix}{name}");
        match obj.get(name) {
            None | Some(Value::Null) => out.push(
                CheckResult::fail(
                    CheckCode::ShapeRequiredField,
                    Severity::Error,
                    format!("missing required field '{path}' ({})", kind.name()),
                )
                .at(path),
            ),
            Some(v) if !kind.matches(v) => out.push(
                CheckResult::fail(
                    CheckCode::ShapeRequiredField,
                    Severity::Error,
                    format!(
                        "field '{path}' must be {}, got {}",
                        kind.name(),
                        type_name(v)
                    ),
                )
                .at(path),
            ),
            Some(_) => {}
        }
    }
    out
}

fn items<'a>(obj: &'a Map<String, Value>, key: &str) -> impl Iterator<Item = (usize, &'a Value)> {
    obj.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flat_map(|a| a.iter().enumerate())
}

fn array_items(
    obj: &Map<String, Value>,
    key: &str,
    fields: &[(&str, Kind)],
    out: &mut Vec<CheckResult>,
) {
    for (i, item) in items(obj, key) {
        let path = format!("{key}[{i}]");
        match item.as_object() {
            Some(o) => out.extend(field_failures(o, fields, &format!("{path}."))),
            None => out.push(
                CheckResult::fail(
                    CheckCode::ShapeRequiredField,
                    Severity::Error,
                    format!("'{path}' must be an object, got {}", type_name(item)),
                )
                .at(path),
            ),
        }
    }
}

fn required_fields(obj: &Map<String, Value>) -> Vec<CheckResult> {
    let mut out = field_failures(obj, TOP_LEVEL, "");

    if let Some(subs) = obj.get("subscores").and_then(Value::as_object) {
        for (name, v) in subs {
            if !v.is_number() {
                let path = format!("subscores.{name}");
                out.push(
                    CheckResult::fail(
                        CheckCode::ShapeRequiredField,
                        Severity::Error,
                        format!("subscore '{name}' must be number, got {}", type_name(v)),
                    )
                    .at(path),
                );
            }
        }
    }

    array_items(obj, "top_fixes", TOP_FIX_FIELDS, &mut out);
    array_items(obj, "findings", FINDING_FIELDS, &mut out);

    match obj.get("rewrites") {
        None | Some(Value::Null) => {}
        Some(Value::Array(_)) => array_items(obj, "rewrites", REWRITE_FIELDS, &mut out),
        Some(other) => out.push(
            CheckResult::fail(
                CheckCode::ShapeRequiredField,
                Severity::Error,
                format!("field 'rewrites' must be array, got {}", type_name(other)),
            )
            .at("rewrites"),
        ),
    }
    for (i, item) in items(obj, "rewrites") {
        if let Some(r) = item.get("rationale")
            && !(r.is_string() || r.is_null())
        {
            out.push(
                CheckResult::fail(
                    CheckCode::ShapeRequiredField,
                    Severity::Error,
                    format!("field 'rewrites[{i}].rationale' must be string, got {}", type_name(r)),
                )
                .at(format!("rewrites[{i}].rationale")),
            );
        }
    }
    out
}

fn empty_text(obj: &Map<String, Value>) -> Vec<CheckResult> {
    let mut out = Vec::new();
    let mut check = |path: String, v: Option<&Value>| {
        if let Some(s) = v.and_then(Value::as_str)
            && s.trim().is_empty()
        {
            out.push(
                CheckResult::fail(
                    CheckCode::ShapeEmptyText,
                    Severity::Error,
                    format!("'{path}' is empty"),
                )
                .at(path),
            );
        }
    };

    check("summary".to_owned(), obj.get("summary"));
    for (key, fields) in [
        ("top_fixes", TOP_FIX_FIELDS),
        ("findings", FINDING_FIELDS),
        ("rewrites", REWRITE_FIELDS),
    ] {
        for (i, item) in items(obj, key) {
            for &(name, kind) in fields {
                if kind == Kind::Text {
                    check(format!("{key}[{i}].{name}"), item.get(name));
                }
            }
        }
    }
    out
}

fn score_ranges(obj: &Map<String, Value>) -> Vec<CheckResult> {
    let mut out = Vec::new();
    let mut check = |path: String, v: Option<&Value>| {
        if let Some(n) = v.and_then(Value::as_f64)
            && !(SCORE_MIN..=SCORE_MAX).contains(&n)
        {
            out.push(
                CheckResult::fail(
                    CheckCode::ShapeScoreRange,
                    Severity::Error,
                    format!("'{path}' = {n} is outside {SCORE_MIN}-{SCORE_MAX}"),
                )
                .at(path),
            );
        }
    };

    check("score".to_owned(), obj.get("score"));
    if let Some(subs) = obj.get("subscores").and_then(Value::as_object) {
        for (name, v) in subs {
            check(format!("subscores.{name}"), Some(v));
        }
    }
    drop(check);

    if obj
        .get("subscores")
        .and_then(Value::as_object)
        .is_some_and(Map::is_empty)
    {
        out.push(
            CheckResult::fail(
                CheckCode::ShapeScoreRange,
                Severity::Error,
                "'subscores' must contain at least one entry",
            )
            .at("subscores"),
        );
    }
    out
}

fn array_lengths(obj: &Map<String, Value>, t: &ThresholdConfig) -> Vec<CheckResult> {
    let len = |key: &str| obj.get(key).and_then(Value::as_array).map(Vec::len);
    let mut out = Vec::new();

    let mut bounds = |key: &str, min: Option<usize>, max: usize| {
        let Some(n) = len(key) else { return };
        if let Some(min) = min
            && n < min
        {
            out.push(
                CheckResult::fail(
                    CheckCode::ShapeArrayLength,
                    Severity::Error,
                    format!("'{key}' has {n} item(s), at least {min} required"),
                )
                .at(key),
            );
        }
        if n > max {
            out.push(
                CheckResult::fail(
                    CheckCode::ShapeArrayLength,
                    Severity::Warning,
                    format!("'{key}' has {n} item(s), at most {max} expected"),
                )
                .at(key),
            );
        }
    };

    bounds("top_fixes", Some(t.min_top_fixes), t.max_top_fixes);
    bounds("findings", Some(t.min_findings), t.max_findings);
    bounds("rewrites", None, t.max_rewrites);
    out
}

fn severities(obj: &Map<String, Value>) -> Vec<CheckResult> {
    items(obj, "findings")
        .filter_map(|(i, item)| {
            let sev = item.get("severity")?.as_str()?;
            if FINDING_SEVERITIES.contains(&sev) {
                return None;
            }
            Some(
                CheckResult::fail(
                    CheckCode::ShapeEnumValue,
                    Severity::Error,
                    format!(
                        "'findings[{i}].severity' = '{sev}' is not one of {}",
                        FINDING_SEVERITIES.join(", ")
                    ),
                )
                .at(format!("findings[{i}].severity"))
                .with_value(sev),
            )
        })
        .collect()
}

fn unique_priorities(obj: &Map<String, Value>) -> Vec<CheckResult> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for (i, item) in items(obj, "top_fixes") {
        let Some(p) = item.get("priority").and_then(Value::as_u64) else {
            continue;
        };
        if p == 0 {
            out.push(
                CheckResult::fail(
                    CheckCode::ShapePriorityUnique,
                    Severity::Warning,
                    format!("'top_fixes[{i}].priority' must start at 1"),
                )
                .at(format!("top_fixes[{i}].priority")),
            );
        }
        if !seen.insert(p) {
            out.push(
                CheckResult::fail(
                    CheckCode::ShapePriorityUnique,
                    Severity::Warning,
                    format!("priority {p} is used by more than one fix"),
                )
                .at(format!("top_fixes[{i}].priority")),
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::output::sample_output_json;
    use serde_json::json;

    fn failures(v: &Value) -> Vec<CheckResult> {
        check_shape(v, &ThresholdConfig::default())
            .0
            .into_iter()
            .filter(|c| !c.passed)
            .collect()
    }

    #[test]
    fn sample_output_is_clean() {
        let (results, object_ok) = check_shape(&sample_output_json(), &ThresholdConfig::default());
        assert!(object_ok);
        assert!(results.iter().all(|c| c.passed), "{results:#?}");
        // One pass result per family, including the object check.
        assert_eq!(results.len(), 7);
    }

    #[test]
    fn non_object_stops_early() {
        let (results, object_ok) = check_shape(&json!([1, 2]), &ThresholdConfig::default());
        assert!(!object_ok);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].check_name, CheckCode::ShapeObject);
        assert!(results[0].is_error());
    }

    #[test]
    fn missing_and_mistyped_fields_are_errors() {
        let mut v = sample_output_json();
        let o = v.as_object_mut().unwrap();
        o.remove("summary");
        o.insert("score".into(), json!("seventy"));
        let f = failures(&v);
        let paths: Vec<_> = f.iter().filter_map(|c| c.path.as_deref()).collect();
        assert!(paths.contains(&"summary"));
        assert!(paths.contains(&"score"));
        assert!(f.iter().all(|c| c.severity == Severity::Error));
    }

    #[test]
    fn nested_item_fields_are_checked() {
        let mut v = sample_output_json();
        v["findings"][0].as_object_mut().unwrap().remove("evidence");
        v["top_fixes"][1]["priority"] = json!("2");
        let f = failures(&v);
        let paths: Vec<_> = f.iter().filter_map(|c| c.path.as_deref()).collect();
        assert!(paths.contains(&"findings[0].evidence"), "{paths:?}");
        assert!(paths.contains(&"top_fixes[1].priority"), "{paths:?}");
    }

    #[test]
    fn too_few_fixes_is_error_too_many_is_warning() {
        let mut v = sample_output_json();
        v["top_fixes"].as_array_mut().unwrap().truncate(2);
        let f = failures(&v);
        assert!(f.iter().any(|c| c.check_name == CheckCode::ShapeArrayLength && c.is_error()));

        let mut v = sample_output_json();
        let fix = v["top_fixes"][0].clone();
        let arr = v["top_fixes"].as_array_mut().unwrap();
        for p in 4..=7 {
            let mut extra = fix.clone();
            extra["priority"] = json!(p);
            arr.push(extra);
        }
        let f = failures(&v);
        assert_eq!(f.len(), 1, "{f:#?}");
        assert!(f[0].is_warning());
    }

    #[test]
    fn out_of_range_scores_are_errors() {
        let mut v = sample_output_json();
        v["score"] = json!(140);
        v["subscores"]["clarity"] = json!(-3);
        let f = failures(&v);
        let range: Vec<_> = f
            .iter()
            .filter(|c| c.check_name == CheckCode::ShapeScoreRange)
            .collect();
        assert_eq!(range.len(), 2);
    }

    #[test]
    fn empty_subscores_is_error() {
        let mut v = sample_output_json();
        v["subscores"] = json!({});
        assert!(failures(&v).iter().any(|c| c.path.as_deref() == Some("subscores")));
    }

    #[test]
    fn unknown_severity_is_error() {
        let mut v = sample_output_json();
        v["findings"][0]["severity"] = json!("critical");
        let f = failures(&v);
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].check_name, CheckCode::ShapeEnumValue);
        assert_eq!(f[0].value.as_deref(), Some("critical"));
    }

    #[test]
    fn duplicate_priorities_warn() {
        let mut v = sample_output_json();
        v["top_fixes"][2]["priority"] = json!(1);
        let f = failures(&v);
        assert_eq!(f.len(), 1);
        assert!(f[0].is_warning());
    }

    #[test]
    fn blank_text_is_error() {
        let mut v = sample_output_json();
        v["rewrites"][0]["rewritten"] = json!("   ");
        let f = failures(&v);
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].check_name, CheckCode::ShapeEmptyText);
        assert_eq!(f[0].path.as_deref(), Some("rewrites[0].rewritten"));
    }

    #[test]
    fn rewrites_may_be_absent_but_not_mistyped() {
        let mut v = sample_output_json();
        v.as_object_mut().unwrap().remove("rewrites");
        assert!(failures(&v).is_empty());
        v["rewrites"] = json!("none");
        assert_eq!(failures(&v).len(), 1);
    }
}
