use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_markregd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn markregd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    loop {
        let mut line = String::new();
        reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for {}", method);
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("parse response json");
        if value.get("event").is_some() {
            continue;
        }
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
        return value;
    }
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(json!({}))
}

fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().unwrap_or(json!({}))
}

#[test]
fn mark_edits_are_clamped_per_field() {
    let workspace = temp_dir("markreg-marks");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let edited = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "marks.applyEdit",
        json!({ "marks": {}, "subject": "Math", "field": "CC", "value": "-5" }),
    );
    assert_eq!(edited["value"], 0);

    let edited = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "marks.applyEdit",
        json!({ "marks": edited["marks"], "subject": "Math", "field": "SA", "value": 999 }),
    );
    assert_eq!(edited["value"], 50);
    assert_eq!(edited["marks"]["Math"]["CC"], 0);

    let edited = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "marks.applyEdit",
        json!({ "marks": edited["marks"], "subject": "Math", "field": "F3", "value": "99999999999999999999999" }),
    );
    assert_eq!(edited["value"], 5);

    // Blank input stays distinct from zero until the record is saved.
    let edited = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "marks.applyEdit",
        json!({ "marks": edited["marks"], "subject": "Math", "field": "SA", "value": "" }),
    );
    assert!(edited["value"].is_null());
    assert!(edited["marks"]["Math"]["SA"].is_null());

    let e = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "marks.applyEdit",
        json!({ "marks": {}, "subject": "Math", "field": "F1", "value": "four" }),
    );
    assert_eq!(e["code"], "bad_params");
    let e = request_err(
        &mut stdin,
        &mut reader,
        "7",
        "marks.applyEdit",
        json!({ "marks": {}, "subject": "Math", "field": "F9", "value": "1" }),
    );
    assert_eq!(e["code"], "bad_params");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn engine_calls_expose_totals_and_grade_boundaries() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let totals = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "calc.subjectTotals",
        json!({ "marks": { "F1": 5, "F2": 4, "F3": "", "F4": 3, "F5": 5, "F6": 2, "CC": 18, "SA": 41 } }),
    );
    assert_eq!(totals["formativeSubtotal"], 19);
    assert_eq!(totals["grandTotal"], 78);

    let cases = [
        (vec![7999], 100, "79.99", "A"),
        (vec![80], 1, "80.00", "A+"),
        (vec![3999], 100, "39.99", "C"),
        (vec![40], 1, "40.00", "B"),
        (vec![120], 2, "60.00", "A"),
    ];
    for (i, (totals, count, pct, grade)) in cases.iter().enumerate() {
        let overall = request_ok(
            &mut stdin,
            &mut reader,
            &format!("o-{}", i),
            "calc.overall",
            json!({ "grandTotals": totals, "subjectCount": count }),
        );
        assert_eq!(overall["percentage"], *pct, "case {}", i);
        assert_eq!(overall["grade"], *grade, "case {}", i);
    }

    let overall = request_ok(
        &mut stdin,
        &mut reader,
        "z",
        "calc.overall",
        json!({ "grandTotals": [] }),
    );
    assert_eq!(overall["possibleMax"], 0);
    assert_eq!(overall["percentage"], "0.00");
    assert_eq!(overall["grade"], "C");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn oversized_marks_do_not_take_the_sidecar_down() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let totals = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "calc.subjectTotals",
        json!({ "marks": { "F1": 9223372036854775807_i64, "F2": 1 } }),
    );
    assert_eq!(totals["formativeSubtotal"], i64::MAX);
    assert_eq!(totals["grandTotal"], i64::MAX);

    let overall = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "calc.overall",
        json!({ "grandTotals": [9223372036854775807_i64, 9223372036854775807_i64] }),
    );
    assert_eq!(overall["overallTotal"], i64::MAX);
    assert_eq!(overall["possibleMax"], 200);

    // Later requests are still answered.
    request_ok(&mut stdin, &mut reader, "3", "health", json!({}));

    drop(stdin);
    let _ = child.wait();
}
