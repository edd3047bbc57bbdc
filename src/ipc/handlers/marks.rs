use serde_json::json;

use crate::calc::{compute_overall, compute_subject_totals, format_percentage, MarkField, MarkSet};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{entry_err, required_str, session};
use crate::ipc::types::{AppState, Request};
use crate::report::{SHEET_PERCENT_PLACES, TABLE_PERCENT_PLACES};
use crate::student::{apply_mark_edit, SubjectRecord};

/// The entry form sends whatever is in the input box: text, a number, or nothing.
fn raw_input(req: &Request) -> Result<String, serde_json::Value> {
    match req.params.get("value") {
        None | Some(serde_json::Value::Null) => Ok(String::new()),
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(err(
            &req.id,
            "bad_params",
            "value must be a string, a number or null",
            Some(json!({ "value": other })),
        )),
    }
}

fn handle_marks_apply_edit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let s = match session(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject = match required_str(req, "subject") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let field_key = match required_str(req, "field") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(field) = MarkField::from_key(&field_key) else {
        return err(
            &req.id,
            "bad_params",
            "unknown mark field",
            Some(json!({ "field": field_key })),
        );
    };
    let raw = match raw_input(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let current: SubjectRecord = match req.params.get("marks") {
        None | Some(serde_json::Value::Null) => SubjectRecord::default(),
        Some(v) => match serde_json::from_value(v.clone()) {
            Ok(m) => m,
            Err(e) => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("invalid marks: {}", e),
                    None,
                )
            }
        },
    };

    match apply_mark_edit(&current, &subject, field, &raw, &s.config.limits) {
        Ok(next) => {
            let value = next.marks_or_default(&subject).get(field);
            ok(
                &req.id,
                json!({ "marks": next, "field": field.key(), "value": value }),
            )
        }
        Err(e) => entry_err(req, e),
    }
}

fn handle_calc_subject_totals(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let marks: MarkSet = match req.params.get("marks") {
        None => return err(&req.id, "bad_params", "missing marks", None),
        Some(v) => match serde_json::from_value(v.clone()) {
            Ok(m) => m,
            Err(e) => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("invalid marks: {}", e),
                    None,
                )
            }
        },
    };
    ok(&req.id, json!(compute_subject_totals(&marks)))
}

fn handle_calc_overall(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(items) = req.params.get("grandTotals").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing grandTotals", None);
    };
    let mut totals = Vec::with_capacity(items.len());
    for item in items {
        match item.as_i64() {
            Some(v) => totals.push(v),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "grandTotals must be integers",
                    Some(json!({ "value": item })),
                )
            }
        }
    }
    let subject_count = match req.params.get("subjectCount") {
        None | Some(serde_json::Value::Null) => totals.len(),
        Some(v) => match v.as_u64() {
            Some(n) => n as usize,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "subjectCount must be a non-negative integer",
                    None,
                )
            }
        },
    };

    let overall = compute_overall(totals, subject_count);
    ok(
        &req.id,
        json!({
            "overallTotal": overall.overall_total,
            "possibleMax": overall.possible_max,
            "percentage": format_percentage(overall.percentage, SHEET_PERCENT_PLACES),
            "percentageShort": format_percentage(overall.percentage, TABLE_PERCENT_PLACES),
            "percentageValue": overall.percentage,
            "grade": overall.grade,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.applyEdit" => Some(handle_marks_apply_edit(state, req)),
        "calc.subjectTotals" => Some(handle_calc_subject_totals(state, req)),
        "calc.overall" => Some(handle_calc_overall(state, req)),
        _ => None,
    }
}
