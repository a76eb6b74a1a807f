//! Multi-term reports: a trimester folds two term reports together, a school
//! year folds six. Each term is computed on its own first, then subject grades
//! and student averages are averaged over the terms that have data.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, instrument};

use crate::error::ReportError;
use crate::model::{ClassSummary, ReportCardResult, StudentAggregate};
use crate::options::ReportOptions;
use crate::rank::{class_summary, competition_ranks, overall_ranks, round_to_two, spread};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedSubjectGrade {
    pub subject_id: String,
    pub coefficient: f64,
    /// One slot per term; `None` when absent or without data that term.
    pub term_grades: Vec<Option<f64>>,
    pub average: Option<f64>,
    pub total: Option<f64>,
    pub rank: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedStudent {
    pub student_id: String,
    pub subjects: BTreeMap<String, CombinedSubjectGrade>,
    pub term_averages: Vec<Option<f64>>,
    pub average_grade: f64,
    pub has_no_grades: bool,
    pub overall_rank: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedSubject {
    pub subject_id: String,
    pub coefficient: f64,
    pub class_average: f64,
    pub min_grade: f64,
    pub max_grade: f64,
    pub graded_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedReport {
    pub term_count: usize,
    pub students: Vec<CombinedStudent>,
    pub subjects: Vec<CombinedSubject>,
    pub summary: ClassSummary,
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn collect_coefficients(reports: &[ReportCardResult]) -> Result<BTreeMap<String, f64>, ReportError> {
    let mut coefficients: BTreeMap<String, f64> = BTreeMap::new();
    for report in reports {
        for subject in &report.subjects {
            match coefficients.get(&subject.subject_id) {
                Some(&expected) if expected != subject.coefficient => {
                    return Err(ReportError::InconsistentSubjectCoefficient {
                        subject_id: subject.subject_id.clone(),
                        expected,
                        found: subject.coefficient,
                        record: None,
                    });
                }
                Some(_) => {}
                None => {
                    coefficients.insert(subject.subject_id.clone(), subject.coefficient);
                }
            }
        }
    }
    Ok(coefficients)
}

/// Folds per-term reports, given in term order, into one report.
#[instrument(skip_all, fields(terms = reports.len()))]
pub fn combine_terms(
    reports: &[ReportCardResult],
    options: &ReportOptions,
) -> Result<CombinedReport, ReportError> {
    if reports.is_empty() {
        return Err(ReportError::validation("at least one term report is required"));
    }
    options.validate()?;
    let coefficients = collect_coefficients(reports)?;

    let by_term: Vec<BTreeMap<&str, &StudentAggregate>> = reports
        .iter()
        .map(|r| {
            r.students
                .iter()
                .map(|s| (s.student_id.as_str(), s))
                .collect()
        })
        .collect();
    let student_ids: BTreeSet<&str> = by_term.iter().flat_map(|m| m.keys().copied()).collect();

    let mut students: Vec<CombinedStudent> = Vec::with_capacity(student_ids.len());
    for student_id in student_ids {
        let terms: Vec<Option<&StudentAggregate>> =
            by_term.iter().map(|m| m.get(student_id).copied()).collect();

        let subject_ids: BTreeSet<&str> = terms
            .iter()
            .flatten()
            .flat_map(|s| s.subjects.keys().map(|k| k.as_str()))
            .collect();

        let mut subjects: BTreeMap<String, CombinedSubjectGrade> = BTreeMap::new();
        for subject_id in subject_ids {
            let coefficient = coefficients.get(subject_id).copied().unwrap_or(0.0);
            let term_grades: Vec<Option<f64>> = terms
                .iter()
                .map(|t| {
                    t.and_then(|s| s.subjects.get(subject_id))
                        .filter(|agg| !agg.absent)
                        .map(|agg| agg.final_grade)
                })
                .collect();
            let present: Vec<f64> = term_grades.iter().flatten().copied().collect();
            let average = mean(&present);
            subjects.insert(
                subject_id.to_string(),
                CombinedSubjectGrade {
                    subject_id: subject_id.to_string(),
                    coefficient,
                    term_grades,
                    average,
                    total: average.map(|a| a * coefficient),
                    rank: None,
                },
            );
        }

        let term_averages: Vec<Option<f64>> = terms
            .iter()
            .map(|t| t.filter(|s| !s.has_no_grades).map(|s| s.average_grade))
            .collect();
        let rounded: Vec<f64> = term_averages.iter().flatten().map(|a| round_to_two(*a)).collect();
        let overall = mean(&rounded);

        students.push(CombinedStudent {
            student_id: student_id.to_string(),
            subjects,
            term_averages,
            average_grade: overall.unwrap_or(0.0),
            has_no_grades: overall.is_none(),
            overall_rank: 0,
        });
    }

    let mut subjects_out: Vec<CombinedSubject> = Vec::with_capacity(coefficients.len());
    for (subject_id, coefficient) in &coefficients {
        let graded: Vec<(usize, f64)> = students
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.subjects.get(subject_id).and_then(|g| g.average).map(|a| (i, a)))
            .collect();
        let averages: Vec<f64> = graded.iter().map(|(_, a)| *a).collect();
        let ranks = competition_ranks(&averages, options.tie_epsilon);
        for ((i, _), rank) in graded.iter().zip(ranks) {
            if let Some(g) = students[*i].subjects.get_mut(subject_id) {
                g.rank = Some(rank);
            }
        }
        let stats = spread(&averages);
        subjects_out.push(CombinedSubject {
            subject_id: subject_id.clone(),
            coefficient: *coefficient,
            class_average: stats.average,
            min_grade: stats.min,
            max_grade: stats.max,
            graded_count: averages.len(),
        });
    }

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

    debug!(
        students = students.len(),
        subjects = subjects_out.len(),
        "combined term reports"
    );

    Ok(CombinedReport {
        term_count: reports.len(),
        students,
        subjects: subjects_out,
        summary: class_summary(&averages, options.pass_mark),
    })
}
