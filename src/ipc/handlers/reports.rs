use serde_json::json;
use std::path::PathBuf;

use crate::export::{export_csv, resolve_export_path, write_export};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{entry_err, failure, report_date, required_str, session};
use crate::ipc::types::{AppState, Request};
use crate::report::{build_class_table, build_result_sheet, render_text};

fn handle_reports_result_sheet(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let date = match report_date(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let s = match session(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(student) = s.find_student(&student_id) else {
        return err(
            &req.id,
            "not_found",
            "student not found",
            Some(json!({ "studentId": student_id })),
        );
    };

    let sheet = build_result_sheet(&student, &s.subjects(), &s.config, date);
    let text = render_text(&sheet);
    ok(&req.id, json!({ "sheet": sheet, "text": text }))
}

fn handle_reports_class_table(state: &mut AppState, req: &Request) -> serde_json::Value {
    let s = match session(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let table = build_class_table(&s.students(), &s.subjects());
    ok(&req.id, json!(table))
}

fn handle_export_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out_path = match required_str(req, "outPath") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let date = match report_date(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let s = match session(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let export = match export_csv(&s.students(), &s.subjects()) {
        Ok(v) => v,
        Err(e) => return entry_err(req, e),
    };
    let path = resolve_export_path(
        &PathBuf::from(&out_path),
        &s.config.export_file_prefix,
        date,
    );
    if let Err(e) = write_export(&path, &export) {
        return failure(req, "io_failed", e);
    }
    tracing::info!(
        path = %path.display(),
        rows = export.row_count,
        columns = export.column_count,
        "csv export written"
    );
    ok(
        &req.id,
        json!({
            "path": path.to_string_lossy(),
            "rowCount": export.row_count,
            "columnCount": export.column_count,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.resultSheet" => Some(handle_reports_result_sheet(state, req)),
        "reports.classTable" => Some(handle_reports_class_table(state, req)),
        "export.csv" => Some(handle_export_csv(state, req)),
        _ => None,
    }
}
