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
fn students_save_list_update_and_delete() {
    let workspace = temp_dir("markreg-students");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(opened["identitySource"], "generated");
    let user_id = opened["userId"].as_str().expect("userId").to_string();

    let draft = request_ok(&mut stdin, &mut reader, "2", "students.draft", json!({}));
    let mut student = draft["student"].clone();
    assert!(!student["id"].as_str().unwrap_or("").is_empty());
    assert_eq!(student["marks"].as_object().map(|m| m.len()), Some(7));
    assert_eq!(student["marks"]["Math"]["SA"], 0);
    assert_eq!(draft["classes"].as_array().map(|c| c.len()), Some(13));

    // Missing name is rejected and nothing is written.
    student["rollNo"] = json!(2);
    student["class"] = json!("5th");
    let e = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "students.save",
        json!({ "student": student.clone() }),
    );
    assert_eq!(e["code"], "validation_failed");
    assert_eq!(e["details"]["missing"], json!(["name"]));

    student["name"] = json!("Amir Dar");
    student["class"] = json!("13th");
    let e = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "students.save",
        json!({ "student": student.clone() }),
    );
    assert_eq!(e["code"], "validation_failed");
    let listed = request_ok(&mut stdin, &mut reader, "5", "students.list", json!({}));
    assert_eq!(listed["count"], 0);

    student["class"] = json!("5th");
    student["marks"]["English"] = json!({ "F1": "", "F2": "4", "CC": 15, "SA": null });
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.save",
        json!({ "student": student.clone() }),
    );
    assert_eq!(saved["created"], true);
    let amir_id = saved["studentId"].as_str().expect("studentId").to_string();

    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.get",
        json!({ "studentId": amir_id }),
    );
    let english = &fetched["student"]["marks"]["English"];
    assert_eq!(english["F1"], 0);
    assert_eq!(english["F2"], 4);
    assert_eq!(english["CC"], 15);
    assert_eq!(english["SA"], 0);

    request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "students.save",
        json!({ "student": { "rollNo": "1", "name": "Bilal", "class": "5th" } }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "9", "students.list", json!({}));
    let names: Vec<&str> = listed["students"]
        .as_array()
        .expect("students")
        .iter()
        .filter_map(|s| s["name"].as_str())
        .collect();
    assert_eq!(names, ["Bilal", "Amir Dar"]);

    student["name"] = json!("Amir Ahmad Dar");
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "students.save",
        json!({ "student": student.clone() }),
    );
    assert_eq!(updated["created"], false);
    assert_eq!(updated["studentId"], amir_id.as_str());

    request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "students.delete",
        json!({ "studentId": amir_id }),
    );
    let e = request_err(
        &mut stdin,
        &mut reader,
        "12",
        "students.delete",
        json!({ "studentId": amir_id }),
    );
    assert_eq!(e["code"], "not_found");
    let e = request_err(
        &mut stdin,
        &mut reader,
        "13",
        "students.get",
        json!({ "studentId": amir_id }),
    );
    assert_eq!(e["code"], "not_found");

    drop(stdin);
    let _ = child.wait();

    // Reopening the workspace restores the same user and its records.
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let reopened = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(reopened["identitySource"], "persisted");
    assert_eq!(reopened["userId"], user_id.as_str());
    let listed = request_ok(&mut stdin, &mut reader, "2", "students.list", json!({}));
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["students"][0]["name"], "Bilal");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn provided_user_id_scopes_the_records() {
    let workspace = temp_dir("markreg-students-scope");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy(), "userId": "teacher-a" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.save",
        json!({ "student": { "rollNo": 4, "name": "Sana", "class": "UKG" } }),
    );
    let info = request_ok(&mut stdin, &mut reader, "3", "session.info", json!({}));
    assert_eq!(info["collections"]["students"], "users/teacher-a/students");
    assert_eq!(info["studentCount"], 1);

    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy(), "userId": "teacher-b" }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "5", "students.list", json!({}));
    assert_eq!(listed["count"], 0);

    let e = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy(), "userId": "a/b" }),
    );
    assert_eq!(e["code"], "identity_failed");
    let e = request_err(&mut stdin, &mut reader, "7", "students.list", json!({}));
    assert_eq!(e["code"], "no_workspace");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn saved_marks_are_clamped_to_field_limits() {
    let workspace = temp_dir("markreg-students-clamp");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.save",
        json!({ "student": {
            "rollNo": 9,
            "name": "Irfan",
            "class": "6th",
            "marks": {
                "English": { "F1": -40, "SA": 999 },
                "Math": { "F2": 9223372036854775807_i64, "CC": "75" }
            }
        } }),
    );
    let student_id = saved["studentId"].as_str().expect("studentId").to_string();

    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.get",
        json!({ "studentId": student_id }),
    );
    let marks = &fetched["student"]["marks"];
    assert_eq!(marks["English"]["F1"], 0);
    assert_eq!(marks["English"]["SA"], 50);
    assert_eq!(marks["Math"]["F2"], 5);
    assert_eq!(marks["Math"]["CC"], 20);

    let sheet = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "reports.resultSheet",
        json!({ "studentId": student_id }),
    );
    let rows = sheet["sheet"]["rows"].as_array().expect("rows");
    for row in rows {
        let total = row["grandTotal"].as_i64().expect("grandTotal");
        assert!((0..=100).contains(&total), "{}", row);
    }
    let overall = &sheet["sheet"]["overall"];
    assert_eq!(overall["overallTotal"], 75);
    assert_eq!(overall["possibleMax"], 700);
    assert_eq!(overall["grade"], "C");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
