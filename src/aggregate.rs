use std::collections::BTreeMap;

use crate::error::ReportError;
use crate::group::GradeGroups;
use crate::model::{GradeRecord, StudentAggregate, StudentSubjectAggregate};

/// `raw / scale` brought onto the `grade_scale` range. The scale is validated
/// to be positive before this is ever called.
pub fn normalize(raw_grade: f64, assessment_scale: f64, grade_scale: f64) -> f64 {
    (raw_grade / assessment_scale) * grade_scale
}

/// Weighted sum of one student's entries in one subject.
///
/// Weights are summed as given, never renormalized to 100. The single
/// exception is an absence: present contributions are scaled by
/// `all weights / present weights`, which is exactly 1 when nobody was absent.
pub fn aggregate_subject(
    subject_id: &str,
    coefficient: f64,
    entries: &[&GradeRecord],
    grade_scale: f64,
) -> StudentSubjectAggregate {
    let mut sum = 0.0_f64;
    let mut all_weight = 0.0_f64;
    let mut present_weight = 0.0_f64;
    let mut absent_count = 0_usize;

    for r in entries {
        all_weight += r.assessment_weight;
        if r.is_absent {
            absent_count += 1;
            continue;
        }
        present_weight += r.assessment_weight;
        let normalized = normalize(r.raw_grade, r.assessment_scale, grade_scale);
        sum += normalized * (r.assessment_weight / 100.0);
    }

    let absent = !entries.is_empty() && absent_count == entries.len();
    let final_grade = if absent {
        0.0
    } else if absent_count > 0 && present_weight > 0.0 {
        sum * (all_weight / present_weight)
    } else {
        sum
    };

    StudentSubjectAggregate {
        subject_id: subject_id.to_string(),
        coefficient,
        final_grade,
        weighted_total: final_grade * coefficient,
        assessment_count: entries.len(),
        absent_count,
        absent,
        subject_rank: None,
    }
}

/// Per-student accumulation. Ranks are left at zero for the ranker to fill.
///
/// Fails when a sum leaves the finite range, so no NaN or infinity ever
/// reaches the ranker.
pub fn aggregate_students(
    groups: &GradeGroups<'_>,
    grade_scale: f64,
) -> Result<Vec<StudentAggregate>, ReportError> {
    let mut per_student: BTreeMap<&str, BTreeMap<String, StudentSubjectAggregate>> = groups
        .students
        .iter()
        .map(|s| (s.as_str(), BTreeMap::new()))
        .collect();

    for ((student_id, subject_id), entries) in &groups.by_student_subject {
        let coefficient = groups.coefficients.get(subject_id).copied().unwrap_or(0.0);
        let agg = aggregate_subject(subject_id, coefficient, entries, grade_scale);
        if !agg.final_grade.is_finite() || !agg.weighted_total.is_finite() {
            return Err(ReportError::validation(format!(
                "subject grade for student {:?} in subject {:?} is not finite",
                student_id, subject_id
            )));
        }
        per_student
            .entry(student_id.as_str())
            .or_default()
            .insert(subject_id.clone(), agg);
    }

    per_student
        .into_iter()
        .map(|(student_id, subjects)| {
            let mut total_points = 0.0_f64;
            let mut total_coefficient = 0.0_f64;
            for s in subjects.values().filter(|s| !s.absent) {
                total_points += s.weighted_total;
                total_coefficient += s.coefficient;
            }
            let has_no_grades = total_coefficient <= 0.0;
            let average_grade = if has_no_grades {
                0.0
            } else {
                total_points / total_coefficient
            };
            if !total_points.is_finite() || !average_grade.is_finite() {
                return Err(ReportError::validation(format!(
                    "average grade for student {:?} is not finite",
                    student_id
                )));
            }
            Ok(StudentAggregate {
                student_id: student_id.to_string(),
                subjects,
                total_points,
                total_coefficient,
                average_grade,
                has_no_grades,
                overall_rank: 0,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::group_records;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn mixed_scales_are_normalized_then_weighted() {
        let a = GradeRecord::new("s1", "math", 2.0, 60.0, 20.0, 12.0);
        let b = GradeRecord::new("s1", "math", 2.0, 40.0, 100.0, 80.0);
        assert!(close(normalize(a.raw_grade, a.assessment_scale, 20.0), 12.0));
        assert!(close(normalize(b.raw_grade, b.assessment_scale, 20.0), 16.0));

        let agg = aggregate_subject("math", 2.0, &[&a, &b], 20.0);
        assert!(close(agg.final_grade, 13.6));
        assert!(close(agg.weighted_total, 27.2));
        assert_eq!(agg.assessment_count, 2);
        assert!(!agg.absent);
    }

    #[test]
    fn weights_are_not_renormalized() {
        let a = GradeRecord::new("s1", "math", 1.0, 50.0, 20.0, 20.0);
        let agg = aggregate_subject("math", 1.0, &[&a], 20.0);
        assert!(close(agg.final_grade, 10.0));
    }

    #[test]
    fn partial_absence_rescales_present_entries() {
        let a = GradeRecord::new("s1", "math", 1.0, 50.0, 20.0, 14.0);
        let b = GradeRecord::new("s1", "math", 1.0, 50.0, 20.0, 0.0).absent();
        let agg = aggregate_subject("math", 1.0, &[&a, &b], 20.0);
        assert!(close(agg.final_grade, 14.0));
        assert_eq!(agg.absent_count, 1);
        assert!(!agg.absent);
    }

    #[test]
    fn all_absent_subject_adds_nothing_to_totals() {
        let records = vec![
            GradeRecord::new("s1", "math", 3.0, 100.0, 20.0, 0.0).absent(),
            GradeRecord::new("s1", "bio", 1.0, 100.0, 20.0, 12.0),
        ];
        let groups = group_records(&records, &[], 20.0).expect("group");
        let students = aggregate_students(&groups, 20.0).expect("aggregate");
        assert_eq!(students.len(), 1);
        let s1 = &students[0];
        assert!(s1.subjects["math"].absent);
        assert!(close(s1.total_coefficient, 1.0));
        assert!(close(s1.average_grade, 12.0));
        assert!(!s1.has_no_grades);
    }

    #[test]
    fn student_without_records_is_flagged_not_divided() {
        let groups = group_records(&[], &["s1".to_string()], 20.0).expect("group");
        let students = aggregate_students(&groups, 20.0).expect("aggregate");
        assert_eq!(students.len(), 1);
        assert!(students[0].has_no_grades);
        assert_eq!(students[0].average_grade, 0.0);
        assert!(students[0].subjects.is_empty());
    }

    #[test]
    fn overflowing_subject_sum_is_rejected() {
        // Each entry normalizes to a finite grade; their sum does not.
        let records = vec![
            GradeRecord::new("s1", "math", 1.0, 100.0, 1.0, 5e306),
            GradeRecord::new("s1", "math", 1.0, 100.0, 1.0, 5e306),
        ];
        let groups = group_records(&records, &[], 20.0).expect("group");
        let e = aggregate_students(&groups, 20.0).unwrap_err();
        assert_eq!(e.code(), "validation_error");
        assert!(e.to_string().contains("not finite"));
    }
}
