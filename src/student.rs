use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::num::IntErrorKind;
use uuid::Uuid;

use crate::calc::{MarkField, MarkFieldLimits, MarkSet, MarkValue};

#[derive(Debug, Clone, Serialize)]
pub struct EntryError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl EntryError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Subject name -> marks for one student. Lookups for subjects with no entry yield an
/// all-zero mark set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectRecord(BTreeMap<String, MarkSet>);

impl SubjectRecord {
    pub fn get(&self, subject: &str) -> Option<&MarkSet> {
        self.0.get(subject)
    }

    pub fn marks_or_default(&self, subject: &str) -> MarkSet {
        self.get(subject).copied().unwrap_or_else(MarkSet::zeroed)
    }

    pub fn insert(&mut self, subject: impl Into<String>, marks: MarkSet) {
        self.0.insert(subject.into(), marks);
    }

    pub fn entry_mut(&mut self, subject: &str) -> &mut MarkSet {
        self.0.entry(subject.to_string()).or_default()
    }

    pub fn has_unset(&self) -> bool {
        self.0.values().any(|m| m.has_unset())
    }

    /// Unset becomes 0 and every value is clamped to its field's range.
    fn materialize_within(&mut self, limits: &MarkFieldLimits) {
        for marks in self.0.values_mut() {
            let mut next = marks.materialized();
            for field in MarkField::ALL {
                let v = next.get(field).or_zero();
                next.set(field, MarkValue::Value(limits.clamp(field, v)));
            }
            *marks = next;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "de_roll_no")]
    pub roll_no: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub father_name: String,
    #[serde(default)]
    pub mother_name: String,
    #[serde(default)]
    pub address: String,
    #[serde(rename = "class", default)]
    pub class_label: String,
    #[serde(default)]
    pub marks: SubjectRecord,
}

fn de_roll_no<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(match MarkValue::from_json(&raw) {
        MarkValue::Unset => None,
        MarkValue::Value(v) => Some(v),
    })
}

impl Student {
    pub fn roll_no_text(&self) -> String {
        self.roll_no.map(|r| r.to_string()).unwrap_or_default()
    }
}

/// Template for the "add student" form: fresh id, zeroed marks for every subject.
pub fn draft_student(subjects: &SubjectList) -> Student {
    let mut marks = SubjectRecord::default();
    for subject in subjects.names() {
        marks.insert(subject.clone(), MarkSet::zeroed());
    }
    Student {
        id: Uuid::new_v4().to_string(),
        roll_no: None,
        name: String::new(),
        father_name: String::new(),
        mother_name: String::new(),
        address: String::new(),
        class_label: String::new(),
        marks,
    }
}

/// Parses one field edit. Blank input is `Unset`; integers beyond the `i64` range
/// saturate so the clamp still applies.
pub fn parse_mark_input(raw: &str) -> Result<MarkValue, EntryError> {
    let t = raw.trim();
    if t.is_empty() {
        return Ok(MarkValue::Unset);
    }
    match t.parse::<i64>() {
        Ok(v) => Ok(MarkValue::Value(v)),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Ok(MarkValue::Value(i64::MAX)),
            IntErrorKind::NegOverflow => Ok(MarkValue::Value(i64::MIN)),
            _ => Err(EntryError::new("bad_params", "mark must be a whole number")
                .with_details(json!({ "input": raw }))),
        },
    }
}

pub fn apply_mark_edit(
    current: &SubjectRecord,
    subject: &str,
    field: MarkField,
    raw: &str,
    limits: &MarkFieldLimits,
) -> Result<SubjectRecord, EntryError> {
    let value = match parse_mark_input(raw)? {
        MarkValue::Unset => MarkValue::Unset,
        MarkValue::Value(v) => MarkValue::Value(limits.clamp(field, v)),
    };
    let mut next = current.clone();
    next.entry_mut(subject).set(field, value);
    Ok(next)
}

pub fn validate_for_save(student: &Student, classes: &[String]) -> Result<(), EntryError> {
    let mut missing: Vec<&str> = Vec::new();
    if student.name.trim().is_empty() {
        missing.push("name");
    }
    match student.roll_no {
        None => missing.push("rollNo"),
        Some(r) if r <= 0 => {
            return Err(
                EntryError::new("validation_failed", "rollNo must be a positive integer")
                    .with_details(json!({ "rollNo": r })),
            );
        }
        Some(_) => {}
    }
    if student.class_label.trim().is_empty() {
        missing.push("class");
    }
    if !missing.is_empty() {
        return Err(EntryError::new(
            "validation_failed",
            "please fill in Name, Roll No. and Class",
        )
        .with_details(json!({ "missing": missing })));
    }
    if !classes.iter().any(|c| c == &student.class_label) {
        return Err(EntryError::new("validation_failed", "unknown class")
            .with_details(json!({ "class": student.class_label, "classes": classes })));
    }
    Ok(())
}

/// Validates and returns the record exactly as it should be written: every unset mark
/// becomes 0, out-of-range marks are clamped and a missing id is assigned.
pub fn prepare_for_save(
    student: &Student,
    classes: &[String],
    limits: &MarkFieldLimits,
) -> Result<Student, EntryError> {
    validate_for_save(student, classes)?;
    let mut out = student.clone();
    if out.id.trim().is_empty() {
        out.id = Uuid::new_v4().to_string();
    }
    out.marks.materialize_within(limits);
    Ok(out)
}

/// Roll number ascending; records without a roll number sort last.
pub fn sort_by_roll_no(students: &mut [Student]) {
    students.sort_by(|a, b| {
        let ka = (a.roll_no.is_none(), a.roll_no.unwrap_or(0));
        let kb = (b.roll_no.is_none(), b.roll_no.unwrap_or(0));
        ka.cmp(&kb).then_with(|| a.id.cmp(&b.id))
    });
}

/// Ordered subject names shared by every student.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct SubjectList(Vec<String>);

impl SubjectList {
    /// Keeps the first occurrence of each name.
    pub fn from_names<I, S>(names: I) -> SubjectList
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = SubjectList::default();
        for name in names {
            let name = name.into();
            if !out.contains(&name) {
                out.0.push(name);
            }
        }
        out
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|s| s == name)
    }

    /// Returns false when the trimmed name is empty or already present.
    pub fn add(&mut self, raw: &str) -> bool {
        let trimmed = raw.trim();
        if trimmed.is_empty() || self.contains(trimmed) {
            return false;
        }
        self.0.push(trimmed.to_string());
        true
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|s| s != name);
        self.0.len() != before
    }
}

/// Stored shape of the `subjects` config document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectsDocument {
    pub subject_names: Vec<String>,
}

impl SubjectsDocument {
    pub fn from_list(list: &SubjectList) -> Self {
        Self {
            subject_names: list.names().to_vec(),
        }
    }

    pub fn into_list(self) -> SubjectList {
        SubjectList::from_names(self.subject_names)
    }
}
