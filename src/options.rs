use serde::{Deserialize, Serialize};

use crate::error::ReportError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportOptions {
    /// Upper bound of the normalized grade scale.
    pub grade_scale: f64,
    /// Reject (student, subject) groups whose weights do not sum to 100.
    pub strict_weights: bool,
    pub weight_tolerance: f64,
    /// Grades closer than this are tied for ranking.
    pub tie_epsilon: f64,
    pub pass_mark: f64,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            grade_scale: 20.0,
            strict_weights: false,
            weight_tolerance: 1e-6,
            tie_epsilon: 1e-9,
            pass_mark: 10.0,
        }
    }
}

impl ReportOptions {
    pub fn validate(&self) -> Result<(), ReportError> {
        if !self.grade_scale.is_finite() || self.grade_scale <= 0.0 {
            return Err(ReportError::validation("gradeScale must be a positive number"));
        }
        if !self.weight_tolerance.is_finite() || self.weight_tolerance < 0.0 {
            return Err(ReportError::validation("weightTolerance must be >= 0"));
        }
        if !self.tie_epsilon.is_finite() || self.tie_epsilon < 0.0 {
            return Err(ReportError::validation("tieEpsilon must be >= 0"));
        }
        if !self.pass_mark.is_finite() || self.pass_mark < 0.0 || self.pass_mark > self.grade_scale
        {
            return Err(ReportError::validation(
                "passMark must be between 0 and gradeScale",
            ));
        }
        Ok(())
    }
}

fn number_field(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<Option<f64>, ReportError> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| ReportError::validation(format!("options.{} must be a number", key))),
    }
}

/// Reads options from a loosely-typed JSON object. Absent or `null` fields
/// keep their defaults; unknown keys are ignored.
pub fn parse_report_options(raw: Option<&serde_json::Value>) -> Result<ReportOptions, ReportError> {
    let mut opts = ReportOptions::default();
    let Some(raw) = raw else {
        return Ok(opts);
    };
    if raw.is_null() {
        return Ok(opts);
    }
    let Some(obj) = raw.as_object() else {
        return Err(ReportError::validation("options must be an object"));
    };

    if let Some(v) = number_field(obj, "gradeScale")? {
        opts.grade_scale = v;
    }
    if let Some(v) = number_field(obj, "weightTolerance")? {
        opts.weight_tolerance = v;
    }
    if let Some(v) = number_field(obj, "tieEpsilon")? {
        opts.tie_epsilon = v;
    }
    if let Some(v) = number_field(obj, "passMark")? {
        opts.pass_mark = v;
    }
    match obj.get("strictWeights") {
        None => {}
        Some(v) if v.is_null() => {}
        Some(v) => {
            let Some(b) = v.as_bool() else {
                return Err(ReportError::validation(
                    "options.strictWeights must be a boolean",
                ));
            };
            opts.strict_weights = b;
        }
    }

    opts.validate()?;
    Ok(opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_and_null_keep_defaults() {
        assert_eq!(parse_report_options(None).expect("none"), ReportOptions::default());
        let raw = json!({ "gradeScale": null, "strictWeights": null, "unknown": 1 });
        assert_eq!(
            parse_report_options(Some(&raw)).expect("nulls"),
            ReportOptions::default()
        );
    }

    #[test]
    fn overrides_are_applied() {
        let raw = json!({ "strictWeights": true, "passMark": 12, "gradeScale": 100 });
        let opts = parse_report_options(Some(&raw)).expect("parse");
        assert!(opts.strict_weights);
        assert_eq!(opts.pass_mark, 12.0);
        assert_eq!(opts.grade_scale, 100.0);
    }

    #[test]
    fn wrong_types_are_rejected() {
        let raw = json!({ "strictWeights": "yes" });
        let e = parse_report_options(Some(&raw)).unwrap_err();
        assert_eq!(e.code(), "validation_error");

        let raw = json!([1, 2]);
        assert!(parse_report_options(Some(&raw)).is_err());
    }

    #[test]
    fn pass_mark_above_scale_is_rejected() {
        let raw = json!({ "passMark": 25 });
        assert!(parse_report_options(Some(&raw)).is_err());
    }
}
