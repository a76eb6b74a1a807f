use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use crate::aggregate::normalize;
use crate::error::{RecordRef, ReportError};
use crate::model::GradeRecord;
use crate::options::ReportOptions;

/// Validated input, partitioned by (student, subject).
#[derive(Debug, Clone)]
pub struct GradeGroups<'a> {
    /// Records keep their input order inside each group.
    pub by_student_subject: BTreeMap<(String, String), Vec<&'a GradeRecord>>,
    pub coefficients: BTreeMap<String, f64>,
    pub students: BTreeSet<String>,
}

impl GradeGroups<'_> {
    pub fn record_count(&self) -> usize {
        self.by_student_subject.values().map(|g| g.len()).sum()
    }
}

fn validate_record(index: usize, r: &GradeRecord, grade_scale: f64) -> Result<(), ReportError> {
    if r.student_id.trim().is_empty() {
        return Err(ReportError::invalid_record(index, r, "missing studentId"));
    }
    if r.subject_id.trim().is_empty() {
        return Err(ReportError::invalid_record(index, r, "missing subjectId"));
    }
    if !r.assessment_scale.is_finite() || r.assessment_scale <= 0.0 {
        return Err(ReportError::invalid_record(
            index,
            r,
            format!("assessmentScale must be > 0, got {}", r.assessment_scale),
        ));
    }
    if !r.raw_grade.is_finite() || r.raw_grade < 0.0 {
        return Err(ReportError::invalid_record(
            index,
            r,
            format!("rawGrade must be >= 0, got {}", r.raw_grade),
        ));
    }
    if !r.assessment_weight.is_finite() || !(0.0..=100.0).contains(&r.assessment_weight) {
        return Err(ReportError::invalid_record(
            index,
            r,
            format!(
                "assessmentWeight must be within 0..=100, got {}",
                r.assessment_weight
            ),
        ));
    }
    if !r.subject_coefficient.is_finite() || r.subject_coefficient <= 0.0 {
        return Err(ReportError::invalid_record(
            index,
            r,
            format!("subjectCoefficient must be > 0, got {}", r.subject_coefficient),
        ));
    }
    let normalized = normalize(r.raw_grade, r.assessment_scale, grade_scale);
    if !normalized.is_finite() || !(normalized * (r.assessment_weight / 100.0)).is_finite() {
        return Err(ReportError::invalid_record(
            index,
            r,
            format!(
                "rawGrade {} over assessmentScale {} does not normalize to a finite grade",
                r.raw_grade, r.assessment_scale
            ),
        ));
    }
    if !r.is_absent && r.raw_grade > r.assessment_scale {
        warn!(
            record = index,
            student_id = %r.student_id,
            subject_id = %r.subject_id,
            raw_grade = r.raw_grade,
            scale = r.assessment_scale,
            "raw grade above assessment scale"
        );
    }
    Ok(())
}

/// Validates every record and builds the (student, subject) index. Nothing is
/// aggregated here, so a bad record anywhere aborts before any arithmetic.
pub fn group_records<'a>(
    records: &'a [GradeRecord],
    roster: &[String],
    grade_scale: f64,
) -> Result<GradeGroups<'a>, ReportError> {
    let mut by_student_subject: BTreeMap<(String, String), Vec<&'a GradeRecord>> =
        BTreeMap::new();
    let mut coefficients: BTreeMap<String, f64> = BTreeMap::new();
    let mut students: BTreeSet<String> = BTreeSet::new();

    for (pos, id) in roster.iter().enumerate() {
        if id.trim().is_empty() {
            return Err(ReportError::validation(format!(
                "roster entry #{} has an empty student id",
                pos
            )));
        }
        students.insert(id.clone());
    }

    for (index, r) in records.iter().enumerate() {
        validate_record(index, r, grade_scale)?;

        match coefficients.get(&r.subject_id) {
            Some(&expected) if expected != r.subject_coefficient => {
                return Err(ReportError::InconsistentSubjectCoefficient {
                    subject_id: r.subject_id.clone(),
                    expected,
                    found: r.subject_coefficient,
                    record: Some(RecordRef::of(index, r)),
                });
            }
            Some(_) => {}
            None => {
                coefficients.insert(r.subject_id.clone(), r.subject_coefficient);
            }
        }

        students.insert(r.student_id.clone());
        by_student_subject
            .entry((r.student_id.clone(), r.subject_id.clone()))
            .or_default()
            .push(r);
    }

    Ok(GradeGroups {
        by_student_subject,
        coefficients,
        students,
    })
}

/// Strict mode: each (student, subject) group must carry weights summing to 100.
pub fn check_weight_sums(groups: &GradeGroups<'_>, options: &ReportOptions) -> Result<(), ReportError> {
    if !options.strict_weights {
        return Ok(());
    }
    for ((student_id, subject_id), group) in &groups.by_student_subject {
        let sum: f64 = group.iter().map(|r| r.assessment_weight).sum();
        if (sum - 100.0).abs() > options.weight_tolerance {
            return Err(ReportError::validation(format!(
                "assessment weights for student {:?} in subject {:?} sum to {} instead of 100",
                student_id, subject_id, sum
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_keep_insertion_order_and_every_record() {
        let records = vec![
            GradeRecord::new("s1", "math", 2.0, 60.0, 20.0, 12.0),
            GradeRecord::new("s2", "math", 2.0, 60.0, 20.0, 9.0),
            GradeRecord::new("s1", "math", 2.0, 40.0, 100.0, 80.0),
            GradeRecord::new("s1", "bio", 1.0, 100.0, 20.0, 15.0),
        ];
        let groups = group_records(&records, &[], 20.0).expect("group");
        assert_eq!(groups.record_count(), records.len());
        let s1_math = &groups.by_student_subject[&("s1".to_string(), "math".to_string())];
        assert_eq!(s1_math.len(), 2);
        assert_eq!(s1_math[0].raw_grade, 12.0);
        assert_eq!(s1_math[1].raw_grade, 80.0);
        assert_eq!(groups.coefficients["bio"], 1.0);
        assert_eq!(groups.students.len(), 2);
    }

    #[test]
    fn blank_ids_are_rejected_not_skipped() {
        let records = vec![
            GradeRecord::new("s1", "math", 2.0, 100.0, 20.0, 12.0),
            GradeRecord::new("  ", "math", 2.0, 100.0, 20.0, 12.0),
        ];
        let e = group_records(&records, &[], 20.0).unwrap_err();
        assert_eq!(e.code(), "validation_error");
        assert_eq!(e.record().map(|r| r.index), Some(1));
    }

    #[test]
    fn coefficient_divergence_is_rejected() {
        let records = vec![
            GradeRecord::new("s1", "math", 2.0, 50.0, 20.0, 12.0),
            GradeRecord::new("s2", "math", 3.0, 50.0, 20.0, 12.0),
        ];
        match group_records(&records, &[], 20.0).unwrap_err() {
            ReportError::InconsistentSubjectCoefficient {
                subject_id,
                expected,
                found,
                record,
            } => {
                assert_eq!(subject_id, "math");
                assert_eq!(expected, 2.0);
                assert_eq!(found, 3.0);
                assert_eq!(record.map(|r| r.index), Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn subnormal_scale_that_overflows_is_rejected() {
        let records = vec![
            GradeRecord::new("s1", "math", 1.0, 100.0, 20.0, 12.0),
            GradeRecord::new("s1", "math", 1.0, 0.0, 1e-320, 1.0),
        ];
        let e = group_records(&records, &[], 20.0).unwrap_err();
        assert_eq!(e.code(), "validation_error");
        assert_eq!(e.record().map(|r| r.index), Some(1));
        assert!(e.to_string().contains("finite"));
    }

    #[test]
    fn roster_students_are_registered() {
        let groups = group_records(&[], &["s9".to_string()], 20.0).expect("group");
        assert!(groups.students.contains("s9"));
        assert!(group_records(&[], &[String::new()], 20.0).is_err());
    }

    #[test]
    fn strict_mode_checks_weight_sums() {
        let records = vec![
            GradeRecord::new("s1", "math", 2.0, 60.0, 20.0, 12.0),
            GradeRecord::new("s1", "math", 2.0, 30.0, 20.0, 12.0),
        ];
        let groups = group_records(&records, &[], 20.0).expect("group");
        let lenient = ReportOptions::default();
        assert!(check_weight_sums(&groups, &lenient).is_ok());
        let strict = ReportOptions {
            strict_weights: true,
            ..ReportOptions::default()
        };
        let e = check_weight_sums(&groups, &strict).unwrap_err();
        assert!(e.to_string().contains("sum to 90"));
    }
}
