use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{entry_err, failure, required_str, session, session_mut};
use crate::ipc::types::{AppState, Request};
use crate::student::{draft_student, prepare_for_save, Student};

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let s = match session(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let students = s.students();
    ok(
        &req.id,
        json!({ "students": students, "count": students.len() }),
    )
}

fn handle_students_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let s = match session(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match s.find_student(&student_id) {
        Some(student) => ok(&req.id, json!({ "student": student })),
        None => err(
            &req.id,
            "not_found",
            "student not found",
            Some(json!({ "studentId": student_id })),
        ),
    }
}

fn handle_students_draft(state: &mut AppState, req: &Request) -> serde_json::Value {
    let s = match session(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({
            "student": draft_student(&s.subjects()),
            "classes": s.config.classes,
        }),
    )
}

fn handle_students_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("student") else {
        return err(&req.id, "bad_params", "missing student", None);
    };
    let student: Student = match serde_json::from_value(raw.clone()) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "bad_params",
                format!("invalid student record: {}", e),
                None,
            )
        }
    };
    let s = match session_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let record = match prepare_for_save(&student, &s.config.classes, &s.config.limits) {
        Ok(v) => v,
        Err(e) => return entry_err(req, e),
    };
    let created = s.find_student(&record.id).is_none();
    let blanks_zeroed = student.marks.has_unset();
    if let Err(e) = s.save_student(&record) {
        return failure(req, "db_insert_failed", e);
    }
    tracing::debug!(student_id = %record.id, created, "student saved");
    ok(
        &req.id,
        json!({
            "studentId": record.id,
            "created": created,
            "blankMarksZeroed": blanks_zeroed,
        }),
    )
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let s = match session_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match s.delete_student(&student_id) {
        Ok(true) => ok(&req.id, json!({ "ok": true })),
        Ok(false) => err(
            &req.id,
            "not_found",
            "student not found",
            Some(json!({ "studentId": student_id })),
        ),
        Err(e) => failure(req, "db_delete_failed", e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.draft" => Some(handle_students_draft(state, req)),
        "students.save" => Some(handle_students_save(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
