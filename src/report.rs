use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{
    format_percent, metric_label, round_to, RankedSummary, StudentReport, WeekRange, Zone,
};
use crate::rank::RankDirection;

#[derive(Debug, Default, PartialEq)]
pub struct ZoneCounts {
    pub red: usize,
    pub yellow: usize,
    pub green: usize,
}

pub fn count_zones(students: &[StudentReport]) -> ZoneCounts {
    let mut counts = ZoneCounts::default();
    for student in students {
        match student.score.zone {
            Zone::Red => counts.red += 1,
            Zone::Yellow => counts.yellow += 1,
            Zone::Green => counts.green += 1,
        }
    }
    counts
}

/// One-line summary used by the CLI and the markdown report.
pub fn student_line(student: &StudentReport) -> String {
    format!(
        "{} scored {} ({} zone), weakest metric {}",
        student.identifier,
        format_percent(student.score.total_score),
        student.score.zone,
        metric_label(&student.score.weakest_metric)
    )
}

/// Plain-text breakdown of a single analysis, one `label: value` per line.
pub fn render_student(student: &StudentReport) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Student: {}", student.identifier);
    for (metric, average) in student.score.averages.iter() {
        let _ = writeln!(output, "{} (avg): {}", metric_label(metric), round_to(average, 4));
    }
    for weighted in &student.score.weighted {
        let label = metric_label(&weighted.metric);
        let _ = writeln!(output, "{label} (weighted): {}", weighted.value);
    }
    let _ = writeln!(output, "Subtotal: {}", round_to(student.score.subtotal, 4));
    let _ = writeln!(output, "Total Score: {}", format_percent(student.score.total_score));
    let _ = writeln!(output, "Motivation Zone: {}", student.score.zone);
    let _ = writeln!(output, "Weakest Metric: {}", metric_label(&student.score.weakest_metric));
    let _ = writeln!(output, "Motivational Message: {}", student.coaching_message);
    output
}

pub fn build_report(
    direction: RankDirection,
    range: WeekRange,
    summary: &RankedSummary,
    generated_at: DateTime<Utc>,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Student Motivation Report");
    let _ = writeln!(
        output,
        "Generated {} for weeks {}",
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        range
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Zone Mix");

    if summary.students.is_empty() {
        let _ = writeln!(output, "No students with metrics in this window.");
    } else {
        let counts = count_zones(&summary.students);
        let _ = writeln!(output, "- Green: {}", counts.green);
        let _ = writeln!(output, "- Yellow: {}", counts.yellow);
        let _ = writeln!(output, "- Red: {}", counts.red);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## {}", direction.heading());

    if summary.students.is_empty() {
        let _ = writeln!(output, "No students ranked for this window.");
    } else {
        for (position, student) in summary.students.iter().enumerate() {
            let _ = writeln!(output, "{}. {}", position + 1, student_line(student));
            let _ = writeln!(output, "   > {}", student.coaching_message);
        }
    }

    if !summary.skipped.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Not Scored");
        for skipped in &summary.skipped {
            let _ = writeln!(output, "- {}: {}", skipped.identifier, skipped.reason);
        }
    }

    output
}
