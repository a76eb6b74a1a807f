use anyhow::{anyhow, Context};
use rusqlite::Connection;
use std::collections::HashMap;
use tracing::debug;

use crate::combine::{combine_terms, CombinedReport};
use crate::model::{GradeRecord, ReportCardResult};
use crate::options::ReportOptions;
use crate::compute_report_card_with;

/// Source of the flat grade-record list for one classroom and term.
pub trait GradeLoader {
    fn load_grades(&self, classroom_id: &str, term_id: &str) -> anyhow::Result<Vec<GradeRecord>>;

    /// Enrolled students, including those without any grade.
    fn load_roster(&self, _classroom_id: &str) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryGradeLoader {
    grades: HashMap<(String, String), Vec<GradeRecord>>,
    rosters: HashMap<String, Vec<String>>,
}

impl MemoryGradeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grades(
        mut self,
        classroom_id: &str,
        term_id: &str,
        records: Vec<GradeRecord>,
    ) -> Self {
        self.grades
            .insert((classroom_id.to_string(), term_id.to_string()), records);
        self
    }

    pub fn with_roster(mut self, classroom_id: &str, student_ids: Vec<String>) -> Self {
        self.rosters.insert(classroom_id.to_string(), student_ids);
        self
    }
}

impl GradeLoader for MemoryGradeLoader {
    fn load_grades(&self, classroom_id: &str, term_id: &str) -> anyhow::Result<Vec<GradeRecord>> {
        Ok(self
            .grades
            .get(&(classroom_id.to_string(), term_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn load_roster(&self, classroom_id: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.rosters.get(classroom_id).cloned().unwrap_or_default())
    }
}

/// Read-only view over a school database holding `subjects`, `grade_sheets`,
/// `grades` and `enrollments`.
pub struct SqliteGradeLoader<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteGradeLoader<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl GradeLoader for SqliteGradeLoader<'_> {
    fn load_grades(&self, classroom_id: &str, term_id: &str) -> anyhow::Result<Vec<GradeRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT CAST(g.student_id AS TEXT), CAST(gs.subject_id AS TEXT), s.coefficient,
                    gs.weight, gs.scale, g.grade, COALESCE(g.is_absent, 0), CAST(g.id AS TEXT)
             FROM grades g
             JOIN grade_sheets gs ON gs.id = g.grade_sheet_id
             JOIN subjects s ON s.id = gs.subject_id
             WHERE gs.term_id = ? AND s.classroom_id = ?
             ORDER BY gs.id, g.id",
        )?;
        let rows = stmt
            .query_map((term_id, classroom_id), |r| {
                // Null ids become blanks that validation rejects, never dropped rows.
                let record = GradeRecord {
                    student_id: r.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    subject_id: r.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    subject_coefficient: r.get(2)?,
                    assessment_weight: r.get(3)?,
                    assessment_scale: r.get(4)?,
                    raw_grade: 0.0,
                    is_absent: r.get::<_, i64>(6)? != 0,
                };
                let grade: Option<f64> = r.get(5)?;
                let grade_id: Option<String> = r.get(7)?;
                Ok((record, grade, grade_id))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for (mut record, grade, grade_id) in rows {
            match grade {
                Some(v) => record.raw_grade = v,
                None if record.is_absent => {}
                None => {
                    return Err(anyhow!(
                        "grade row {} for student {:?} has no grade and is not marked absent",
                        grade_id.as_deref().unwrap_or("?"),
                        record.student_id
                    ));
                }
            }
            records.push(record);
        }
        Ok(records)
    }

    fn load_roster(&self, classroom_id: &str) -> anyhow::Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT CAST(student_id AS TEXT) FROM enrollments
             WHERE classroom_id = ?
             ORDER BY student_id",
        )?;
        let ids = stmt
            .query_map([classroom_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

fn load_term(
    loader: &dyn GradeLoader,
    classroom_id: &str,
    term_id: &str,
) -> anyhow::Result<Vec<GradeRecord>> {
    let records = loader.load_grades(classroom_id, term_id).with_context(|| {
        format!(
            "failed to load grades for classroom {} term {}",
            classroom_id, term_id
        )
    })?;
    debug!(classroom_id, term_id, records = records.len(), "loaded grades");
    Ok(records)
}

/// Loads one term and runs the report pipeline over it.
pub fn report_for_term(
    loader: &dyn GradeLoader,
    classroom_id: &str,
    term_id: &str,
    options: &ReportOptions,
) -> anyhow::Result<ReportCardResult> {
    let records = load_term(loader, classroom_id, term_id)?;
    let roster = loader
        .load_roster(classroom_id)
        .with_context(|| format!("failed to load roster for classroom {}", classroom_id))?;
    let report = compute_report_card_with(&records, &roster, options)
        .with_context(|| format!("report card for classroom {} term {}", classroom_id, term_id))?;
    Ok(report)
}

/// Trimester or year report: every term in order, then folded together.
pub fn report_for_terms(
    loader: &dyn GradeLoader,
    classroom_id: &str,
    term_ids: &[&str],
    options: &ReportOptions,
) -> anyhow::Result<CombinedReport> {
    let roster = loader
        .load_roster(classroom_id)
        .with_context(|| format!("failed to load roster for classroom {}", classroom_id))?;
    let mut reports = Vec::with_capacity(term_ids.len());
    for term_id in term_ids {
        let records = load_term(loader, classroom_id, term_id)?;
        let report = compute_report_card_with(&records, &roster, options).with_context(|| {
            format!("report card for classroom {} term {}", classroom_id, term_id)
        })?;
        reports.push(report);
    }
    let combined = combine_terms(&reports, options)
        .with_context(|| format!("combined report for classroom {}", classroom_id))?;
    Ok(combined)
}
