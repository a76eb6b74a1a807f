use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::model::{
    ClassSummary, ReportCardResult, StudentAggregate, SubjectAggregate, SubjectStudentGrade,
};
use crate::options::ReportOptions;

/// Two-decimal rounding used on report cards: `Int(100*x + 0.5) / 100`.
pub fn round_to_two(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

/// Standard competition ranking ("1224"): a value's rank is one plus the
/// number of values strictly above it. Values within `epsilon` of each other
/// are treated as equal.
pub fn competition_ranks(values: &[f64], epsilon: f64) -> Vec<u32> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
    values
        .iter()
        .map(|&v| 1 + sorted.partition_point(|&x| x > v + epsilon) as u32)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spread {
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

/// Mean, min and max; all zero for an empty slice.
pub fn spread(values: &[f64]) -> Spread {
    if values.is_empty() {
        return Spread {
            average: 0.0,
            min: 0.0,
            max: 0.0,
        };
    }
    let sum: f64 = values.iter().sum();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Spread {
        average: sum / values.len() as f64,
        min,
        max,
    }
}

/// Ranks graded entries among themselves; ungraded ones share the slot right
/// after the last graded rank, whatever their nominal average.
pub fn overall_ranks(averages: &[(f64, bool)], epsilon: f64) -> Vec<u32> {
    let graded: Vec<f64> = averages
        .iter()
        .filter(|(_, no_grades)| !no_grades)
        .map(|(avg, _)| *avg)
        .collect();
    let last = graded.len() as u32 + 1;
    let mut graded_ranks = competition_ranks(&graded, epsilon).into_iter();
    averages
        .iter()
        .map(|(_, no_grades)| {
            if *no_grades {
                last
            } else {
                graded_ranks.next().unwrap_or(last)
            }
        })
        .collect()
}

pub fn class_summary(averages: &[(f64, bool)], pass_mark: f64) -> ClassSummary {
    let graded: Vec<f64> = averages
        .iter()
        .filter(|(_, no_grades)| !no_grades)
        .map(|(avg, _)| *avg)
        .collect();
    let s = spread(&graded);
    let passed = graded.iter().filter(|&&avg| avg >= pass_mark).count();
    ClassSummary {
        graded_count: graded.len(),
        ungraded_count: averages.len() - graded.len(),
        class_average: s.average,
        min_average: s.min,
        max_average: s.max,
        success_rate: if graded.is_empty() {
            0.0
        } else {
            passed as f64 / graded.len() as f64
        },
    }
}

fn rank_subjects(students: &mut [StudentAggregate], epsilon: f64) -> Vec<SubjectAggregate> {
    let mut coefficients: BTreeMap<String, f64> = BTreeMap::new();
    for s in students.iter() {
        for (subject_id, agg) in &s.subjects {
            coefficients.entry(subject_id.clone()).or_insert(agg.coefficient);
        }
    }

    let mut out = Vec::with_capacity(coefficients.len());
    for (subject_id, coefficient) in coefficients {
        let mut graded: Vec<(usize, f64, f64)> = Vec::new();
        let mut absent_students: Vec<String> = Vec::new();
        for (i, s) in students.iter().enumerate() {
            let Some(agg) = s.subjects.get(&subject_id) else {
                continue;
            };
            if agg.absent {
                absent_students.push(s.student_id.clone());
            } else {
                graded.push((i, agg.final_grade, agg.weighted_total));
            }
        }

        let grades: Vec<f64> = graded.iter().map(|(_, g, _)| *g).collect();
        let ranks = competition_ranks(&grades, epsilon);
        let stats = spread(&grades);

        let mut student_grades: Vec<SubjectStudentGrade> = Vec::with_capacity(graded.len());
        for ((i, final_grade, weighted_total), rank) in graded.into_iter().zip(ranks) {
            let student = &mut students[i];
            if let Some(agg) = student.subjects.get_mut(&subject_id) {
                agg.subject_rank = Some(rank);
            }
            student_grades.push(SubjectStudentGrade {
                student_id: student.student_id.clone(),
                final_grade,
                weighted_total,
                subject_rank: rank,
            });
        }
        student_grades.sort_by(|a, b| {
            a.subject_rank
                .cmp(&b.subject_rank)
                .then_with(|| a.student_id.cmp(&b.student_id))
        });

        out.push(SubjectAggregate {
            subject_id,
            coefficient,
            graded_count: student_grades.len(),
            student_grades,
            absent_students,
            class_average: stats.average,
            min_grade: stats.min,
            max_grade: stats.max,
        });
    }
    out
}

/// Final pass: subject statistics and ranks, then overall ranks.
pub fn rank_report(mut students: Vec<StudentAggregate>, options: &ReportOptions) -> ReportCardResult {
    let subjects = rank_subjects(&mut students, options.tie_epsilon);

    let averages: Vec<(f64, bool)> = students
        .iter()
        .map(|s| (s.average_grade, s.has_no_grades))
        .collect();
    let ranks = overall_ranks(&averages, options.tie_epsilon);
    for (s, rank) in students.iter_mut().zip(ranks) {
        s.overall_rank = rank;
    }
    students.sort_by(|a, b| {
        a.overall_rank
            .cmp(&b.overall_rank)
            .then_with(|| a.student_id.cmp(&b.student_id))
    });

    let summary = class_summary(&averages, options.pass_mark);
    ReportCardResult {
        students,
        subjects,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_share_rank_and_skip_the_next() {
        assert_eq!(competition_ranks(&[15.0, 10.0, 15.0], 1e-9), vec![1, 3, 1]);
        assert_eq!(competition_ranks(&[], 1e-9), Vec::<u32>::new());
        assert_eq!(competition_ranks(&[7.0, 7.0, 7.0], 1e-9), vec![1, 1, 1]);
    }

    #[test]
    fn summation_noise_does_not_break_ties() {
        let a = 0.1 + 0.2;
        let b = 0.3;
        assert_ne!(a, b);
        assert_eq!(competition_ranks(&[a, b], 1e-9), vec![1, 1]);
        assert_eq!(competition_ranks(&[a, b], 0.0), vec![1, 2]);
    }

    #[test]
    fn ungraded_students_rank_last() {
        let averages = vec![(12.0, false), (0.0, true), (0.5, false), (15.0, false)];
        assert_eq!(overall_ranks(&averages, 1e-9), vec![2, 4, 3, 1]);
    }

    #[test]
    fn spread_of_empty_is_zero() {
        let s = spread(&[]);
        assert_eq!((s.average, s.min, s.max), (0.0, 0.0, 0.0));
        let s = spread(&[8.0, 12.0, 16.0]);
        assert_eq!((s.average, s.min, s.max), (12.0, 8.0, 16.0));
    }

    #[test]
    fn summary_counts_success_over_graded_only() {
        let averages = vec![(12.0, false), (0.0, true), (8.0, false), (10.0, false)];
        let s = class_summary(&averages, 10.0);
        assert_eq!(s.graded_count, 3);
        assert_eq!(s.ungraded_count, 1);
        assert!((s.success_rate - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(s.min_average, 8.0);
        assert_eq!(s.max_average, 12.0);
    }

    #[test]
    fn round_to_two_matches_report_rounding() {
        assert_eq!(round_to_two(13.604), 13.6);
        assert_eq!(round_to_two(13.606), 13.61);
        assert_eq!(round_to_two(0.0), 0.0);
    }
}
