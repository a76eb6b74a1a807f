use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One assessment entry for one student, as handed over by the record loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRecord {
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub subject_id: String,
    pub subject_coefficient: f64,
    /// Percentage (0-100) of the subject's final grade.
    pub assessment_weight: f64,
    /// Maximum raw score for the assessment (20, 100, ...).
    pub assessment_scale: f64,
    pub raw_grade: f64,
    #[serde(default)]
    pub is_absent: bool,
}

impl GradeRecord {
    pub fn new(
        student_id: impl Into<String>,
        subject_id: impl Into<String>,
        subject_coefficient: f64,
        assessment_weight: f64,
        assessment_scale: f64,
        raw_grade: f64,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            subject_id: subject_id.into(),
            subject_coefficient,
            assessment_weight,
            assessment_scale,
            raw_grade,
            is_absent: false,
        }
    }

    pub fn absent(mut self) -> Self {
        self.is_absent = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSubjectAggregate {
    pub subject_id: String,
    pub coefficient: f64,
    pub final_grade: f64,
    pub weighted_total: f64,
    pub assessment_count: usize,
    pub absent_count: usize,
    /// Every entry in the group was an absence; the subject carries no grade.
    pub absent: bool,
    pub subject_rank: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAggregate {
    pub student_id: String,
    pub subjects: BTreeMap<String, StudentSubjectAggregate>,
    pub total_points: f64,
    pub total_coefficient: f64,
    pub average_grade: f64,
    pub has_no_grades: bool,
    pub overall_rank: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStudentGrade {
    pub student_id: String,
    pub final_grade: f64,
    pub weighted_total: f64,
    pub subject_rank: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAggregate {
    pub subject_id: String,
    pub coefficient: f64,
    pub student_grades: Vec<SubjectStudentGrade>,
    pub absent_students: Vec<String>,
    pub class_average: f64,
    pub min_grade: f64,
    pub max_grade: f64,
    pub graded_count: usize,
}

/// Class-wide view over the overall averages of graded students.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    pub graded_count: usize,
    pub ungraded_count: usize,
    pub class_average: f64,
    pub min_average: f64,
    pub max_average: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCardResult {
    pub students: Vec<StudentAggregate>,
    pub subjects: Vec<SubjectAggregate>,
    pub summary: ClassSummary,
}

impl ReportCardResult {
    pub fn student(&self, student_id: &str) -> Option<&StudentAggregate> {
        self.students.iter().find(|s| s.student_id == student_id)
    }

    pub fn subject(&self, subject_id: &str) -> Option<&SubjectAggregate> {
        self.subjects.iter().find(|s| s.subject_id == subject_id)
    }
}
