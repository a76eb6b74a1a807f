//! Report-card aggregation and ranking.
//!
//! Raw per-assessment grade records for one classroom and term go in; per
//! student subject grades, coefficient-weighted averages, per-subject and
//! overall ranks, and class statistics come out. The pipeline is a pure
//! function of its input: group, aggregate, rank.

mod aggregate;
mod combine;
mod error;
mod group;
mod loader;
mod model;
mod options;
mod rank;

use tracing::{debug, instrument, warn};

pub use aggregate::{aggregate_subject, normalize};
pub use combine::{
    combine_terms, CombinedReport, CombinedStudent, CombinedSubject, CombinedSubjectGrade,
};
pub use error::{ErrorPayload, RecordRef, ReportError};
pub use loader::{
    report_for_term, report_for_terms, GradeLoader, MemoryGradeLoader, SqliteGradeLoader,
};
pub use model::{
    ClassSummary, GradeRecord, ReportCardResult, StudentAggregate, StudentSubjectAggregate,
    SubjectAggregate, SubjectStudentGrade,
};
pub use options::{parse_report_options, ReportOptions};
pub use rank::{competition_ranks, round_to_two};

/// Computes the report card for one classroom and term with default options.
pub fn compute_report_card(records: &[GradeRecord]) -> Result<ReportCardResult, ReportError> {
    compute_report_card_with(records, &[], &ReportOptions::default())
}

/// Computes the report card, adding every roster student even when they have
/// no records. Either the whole result is returned or the first error found.
#[instrument(skip_all, fields(records = records.len(), roster = roster.len()))]
pub fn compute_report_card_with(
    records: &[GradeRecord],
    roster: &[String],
    options: &ReportOptions,
) -> Result<ReportCardResult, ReportError> {
    options.validate()?;

    let groups = group::group_records(records, roster, options.grade_scale)
        .and_then(|g| group::check_weight_sums(&g, options).map(|_| g))
        .inspect_err(|e| warn!(code = e.code(), "rejected grade records: {}", e))?;
    debug!(
        records = groups.record_count(),
        groups = groups.by_student_subject.len(),
        students = groups.students.len(),
        subjects = groups.coefficients.len(),
        "grouped grade records"
    );

    let students = aggregate::aggregate_students(&groups, options.grade_scale)
        .inspect_err(|e| warn!(code = e.code(), "rejected grade records: {}", e))?;
    let report = rank::rank_report(students, options);
    debug!(
        graded = report.summary.graded_count,
        ungraded = report.summary.ungraded_count,
        "ranked report card"
    );
    Ok(report)
}
