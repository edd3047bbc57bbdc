use anyhow::Context;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

use crate::calc::{format_percentage, MarkField};
use crate::report::{compute_student_result, SHEET_PERCENT_PLACES};
use crate::student::{EntryError, Student, SubjectList};

pub const IDENTITY_COLUMNS: [&str; 6] = [
    "Roll No.",
    "Name",
    "Class",
    "Father's Name",
    "Mother's Name",
    "Address",
];

pub const OVERALL_COLUMNS: [&str; 4] = [
    "Overall Grand Total",
    "Overall Possible Marks",
    "Overall Percentage",
    "Overall Grade",
];

/// Quote-wraps a textual cell, doubling embedded quotes.
pub fn csv_text(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub fn export_header(subjects: &SubjectList) -> Vec<String> {
    let mut header: Vec<String> = IDENTITY_COLUMNS.iter().map(|s| s.to_string()).collect();
    for subject in subjects.names() {
        for field in MarkField::ALL {
            header.push(format!("{} ({})", subject, field.key()));
        }
        header.push(format!("{} (Total)", subject));
    }
    header.extend(OVERALL_COLUMNS.iter().map(|s| s.to_string()));
    header
}

pub fn column_count(subject_count: usize) -> usize {
    IDENTITY_COLUMNS.len() + subject_count * (MarkField::ALL.len() + 1) + OVERALL_COLUMNS.len()
}

fn export_row(student: &Student, subjects: &SubjectList) -> Vec<String> {
    let mut row: Vec<String> = vec![
        csv_text(&student.roll_no_text()),
        csv_text(&student.name),
        csv_text(&student.class_label),
        csv_text(&student.father_name),
        csv_text(&student.mother_name),
        csv_text(&student.address),
    ];
    let result = compute_student_result(student, subjects);
    for r in &result.subjects {
        for field in MarkField::ALL {
            row.push(r.marks.get(field).or_zero().to_string());
        }
        row.push(r.grand_total.to_string());
    }
    let o = &result.overall;
    row.push(o.overall_total.to_string());
    row.push(o.possible_max.to_string());
    row.push(format_percentage(o.percentage, SHEET_PERCENT_PLACES));
    row.push(csv_text(o.grade.as_str()));
    row
}

#[derive(Debug, Clone)]
pub struct CsvExport {
    pub content: String,
    pub row_count: usize,
    pub column_count: usize,
}

/// Builds the bulk export. Students are written in the order given; callers pass them
/// sorted by roll number.
pub fn export_csv(students: &[Student], subjects: &SubjectList) -> Result<CsvExport, EntryError> {
    if students.is_empty() {
        return Err(EntryError::new("no_students", "No student data to export."));
    }
    let header = export_header(subjects);
    let mut content = header
        .iter()
        .map(|h| csv_text(h))
        .collect::<Vec<_>>()
        .join(",");
    content.push('\n');
    for s in students {
        content.push_str(&export_row(s, subjects).join(","));
        content.push('\n');
    }
    Ok(CsvExport {
        content,
        row_count: students.len() + 1,
        column_count: column_count(subjects.len()),
    })
}

pub fn export_file_name(prefix: &str, date: NaiveDate) -> String {
    format!("{}{}.csv", prefix, date.format("%Y-%m-%d"))
}

/// Resolves where the export lands: an existing directory gets the dated file name,
/// anything else is treated as the full file path.
pub fn resolve_export_path(target: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
    if target.is_dir() {
        target.join(export_file_name(prefix, date))
    } else {
        target.to_path_buf()
    }
}

pub fn write_export(path: &Path, export: &CsvExport) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create directory {}", parent.to_string_lossy())
            })?;
        }
    }
    std::fs::write(path, export.content.as_bytes())
        .with_context(|| format!("failed to write {}", path.to_string_lossy()))?;
    Ok(())
}
