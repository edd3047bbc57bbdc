use chrono::NaiveDate;
use serde::Serialize;

use crate::calc::{
    compute_overall, compute_subject_totals, format_percentage, Grade, MarkField,
    MarkFieldLimits, MarkSet, OverallResult,
};
use crate::config::AppConfig;
use crate::student::{Student, SubjectList};

pub const SHEET_PERCENT_PLACES: usize = 2;
pub const TABLE_PERCENT_PLACES: usize = 1;

pub const SIGNATURES: [&str; 3] = [
    "Signature of Class Teacher",
    "Signature of Principal",
    "Signature of Parent",
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectResult {
    pub subject: String,
    pub marks: MarkSet,
    pub formative_subtotal: i64,
    pub grand_total: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentResult {
    pub subjects: Vec<SubjectResult>,
    pub overall: OverallResult,
}

/// The single computation pass every output surface is built from.
pub fn compute_student_result(student: &Student, subjects: &SubjectList) -> StudentResult {
    let rows: Vec<SubjectResult> = subjects
        .names()
        .iter()
        .map(|subject| {
            let marks = student.marks.marks_or_default(subject).materialized();
            let totals = compute_subject_totals(&marks);
            SubjectResult {
                subject: subject.clone(),
                marks,
                formative_subtotal: totals.formative_subtotal,
                grand_total: totals.grand_total,
            }
        })
        .collect();
    let overall = compute_overall(rows.iter().map(|r| r.grand_total), rows.len());
    StudentResult {
        subjects: rows,
        overall,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnHeader {
    pub key: String,
    pub label: String,
    pub max: i64,
}

fn header(key: &str, label: &str, max: i64) -> ColumnHeader {
    ColumnHeader {
        key: key.to_string(),
        label: format!("{} (Max {})", label, max),
        max,
    }
}

/// Numeric columns of the marks table, in display order.
pub fn result_sheet_columns(limits: &MarkFieldLimits) -> Vec<ColumnHeader> {
    let mut out: Vec<ColumnHeader> = MarkField::FORMATIVE
        .iter()
        .map(|f| header(f.key(), f.key(), limits.max_for(*f)))
        .collect();
    out.push(header("totalF", "Total F", limits.formative_max()));
    out.push(header("CC", "CC", limits.cc));
    out.push(header("SA", "SA", limits.sa));
    out.push(header("grandTotal", "Grand Total", limits.subject_max()));
    out
}

fn row_cells(r: &SubjectResult) -> Vec<i64> {
    let mut cells: Vec<i64> = MarkField::FORMATIVE
        .iter()
        .map(|f| r.marks.get(*f).or_zero())
        .collect();
    cells.push(r.formative_subtotal);
    cells.push(r.marks.cc.or_zero());
    cells.push(r.marks.sa.or_zero());
    cells.push(r.grand_total);
    cells
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInfo {
    pub id: String,
    pub roll_no: String,
    pub name: String,
    pub father_name: String,
    pub mother_name: String,
    pub address: String,
    pub class: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallBlock {
    pub overall_total: i64,
    pub possible_max: i64,
    pub percentage: String,
    pub percentage_value: f64,
    pub grade: Grade,
}

impl OverallBlock {
    fn from_result(o: &OverallResult, places: usize) -> Self {
        Self {
            overall_total: o.overall_total,
            possible_max: o.possible_max,
            percentage: format_percentage(o.percentage, places),
            percentage_value: o.percentage,
            grade: o.grade,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSheet {
    pub school_name: String,
    pub title: String,
    pub generated_on: String,
    pub student: StudentInfo,
    pub columns: Vec<ColumnHeader>,
    pub rows: Vec<SubjectResult>,
    pub overall: OverallBlock,
    pub signatures: Vec<String>,
}

pub fn format_report_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

pub fn build_result_sheet(
    student: &Student,
    subjects: &SubjectList,
    cfg: &AppConfig,
    date: NaiveDate,
) -> ResultSheet {
    let result = compute_student_result(student, subjects);
    ResultSheet {
        school_name: cfg.school_name.clone(),
        title: format!("Annual Result Sheet - Class {}", student.class_label),
        generated_on: format_report_date(date),
        student: StudentInfo {
            id: student.id.clone(),
            roll_no: student.roll_no_text(),
            name: student.name.clone(),
            father_name: student.father_name.clone(),
            mother_name: student.mother_name.clone(),
            address: student.address.clone(),
            class: student.class_label.clone(),
        },
        columns: result_sheet_columns(&cfg.limits),
        overall: OverallBlock::from_result(&result.overall, SHEET_PERCENT_PLACES),
        rows: result.subjects,
        signatures: SIGNATURES.iter().map(|s| s.to_string()).collect(),
    }
}

/// Plain-text page for the print surface. Rendered only from the sheet model so the
/// printed page cannot disagree with what the caller displayed.
pub fn render_text(sheet: &ResultSheet) -> String {
    let mut header_row: Vec<String> = vec!["Subject".to_string()];
    header_row.extend(sheet.columns.iter().map(|c| c.label.clone()));
    let body: Vec<Vec<String>> = sheet
        .rows
        .iter()
        .map(|r| {
            let mut cells = vec![r.subject.clone()];
            cells.extend(row_cells(r).into_iter().map(|v| v.to_string()));
            cells
        })
        .collect();

    let mut widths: Vec<usize> = header_row.iter().map(|h| h.chars().count()).collect();
    for row in &body {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }
    let line_of = |cells: &[String]| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, c)| {
                if i == 0 {
                    format!("{:<w$}", c, w = widths[i])
                } else {
                    format!("{:>w$}", c, w = widths[i])
                }
            })
            .collect::<Vec<_>>()
            .join(" | ")
    };
    let table_width = widths.iter().sum::<usize>() + 3 * widths.len().saturating_sub(1);
    let page_width = table_width.max(60);

    let mut out = String::new();
    out.push_str(&format!("{:^w$}\n", sheet.school_name, w = page_width));
    out.push_str(&format!("{:^w$}\n", sheet.title, w = page_width));
    out.push_str(&format!(
        "{:^w$}\n",
        format!("Date Generated: {}", sheet.generated_on),
        w = page_width
    ));
    out.push_str(&"=".repeat(page_width));
    out.push('\n');

    let s = &sheet.student;
    let half = page_width / 2;
    let pair = |l: String, r: String| format!("{:<w$}{}\n", l, r, w = half);
    out.push_str(&pair(
        format!("Student Name: {}", s.name),
        format!("Father's Name: {}", s.father_name),
    ));
    out.push_str(&pair(
        format!("Roll No.: {}", s.roll_no),
        format!("Mother's Name: {}", s.mother_name),
    ));
    out.push_str(&format!("Class: {}\n", s.class));
    out.push_str(&format!("Address: {}\n\n", s.address));

    out.push_str("Scholastic Area Performance\n");
    out.push_str(&line_of(&header_row));
    out.push('\n');
    out.push_str(&"-".repeat(table_width));
    out.push('\n');
    for row in &body {
        out.push_str(&line_of(row));
        out.push('\n');
    }
    out.push('\n');

    let o = &sheet.overall;
    out.push_str(&format!(
        "Overall Total: {} / {}\n",
        o.overall_total, o.possible_max
    ));
    out.push_str(&format!("Percentage: {}%\n", o.percentage));
    out.push_str(&format!("Grade: {}\n\n", o.grade.as_str()));
    out.push_str(&sheet.signatures.join("    "));
    out.push('\n');
    out
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassTableRow {
    pub student_id: String,
    pub roll_no: Option<i64>,
    pub name: String,
    pub class: String,
    pub subject_totals: Vec<i64>,
    pub overall_total: i64,
    pub percentage: String,
    pub grade: Grade,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassTable {
    pub subjects: Vec<String>,
    pub rows: Vec<ClassTableRow>,
}

pub fn build_class_table(students: &[Student], subjects: &SubjectList) -> ClassTable {
    let rows = students
        .iter()
        .map(|s| {
            let result = compute_student_result(s, subjects);
            ClassTableRow {
                student_id: s.id.clone(),
                roll_no: s.roll_no,
                name: s.name.clone(),
                class: s.class_label.clone(),
                subject_totals: result.subjects.iter().map(|r| r.grand_total).collect(),
                overall_total: result.overall.overall_total,
                percentage: format_percentage(result.overall.percentage, TABLE_PERCENT_PLACES),
                grade: result.overall.grade,
            }
        })
        .collect();
    ClassTable {
        subjects: subjects.names().to_vec(),
        rows,
    }
}
