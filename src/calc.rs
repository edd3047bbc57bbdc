use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Ceiling assumed per subject when computing the overall percentage.
///
/// This is intentionally independent of `MarkFieldLimits`: the result sheet and the
/// export have always divided by `subjects * 100`, even if the field limits sum to
/// something else.
pub const PER_SUBJECT_CEILING: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MarkField {
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    Cc,
    Sa,
}

impl MarkField {
    pub const ALL: [MarkField; 8] = [
        MarkField::F1,
        MarkField::F2,
        MarkField::F3,
        MarkField::F4,
        MarkField::F5,
        MarkField::F6,
        MarkField::Cc,
        MarkField::Sa,
    ];

    pub const FORMATIVE: [MarkField; 6] = [
        MarkField::F1,
        MarkField::F2,
        MarkField::F3,
        MarkField::F4,
        MarkField::F5,
        MarkField::F6,
    ];

    pub fn key(self) -> &'static str {
        match self {
            MarkField::F1 => "F1",
            MarkField::F2 => "F2",
            MarkField::F3 => "F3",
            MarkField::F4 => "F4",
            MarkField::F5 => "F5",
            MarkField::F6 => "F6",
            MarkField::Cc => "CC",
            MarkField::Sa => "SA",
        }
    }

    pub fn from_key(key: &str) -> Option<MarkField> {
        MarkField::ALL
            .iter()
            .copied()
            .find(|f| f.key().eq_ignore_ascii_case(key.trim()))
    }
}

/// A single mark as entered. `Unset` is the blank-input state of the entry form and
/// counts as zero everywhere a total is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkValue {
    #[default]
    Unset,
    Value(i64),
}

impl MarkValue {
    pub fn or_zero(self) -> i64 {
        match self {
            MarkValue::Unset => 0,
            MarkValue::Value(v) => v,
        }
    }

    pub fn is_unset(self) -> bool {
        matches!(self, MarkValue::Unset)
    }

    /// Lenient decoding used for stored documents and request payloads. Anything that
    /// is not a number (or a numeric string) decodes as `Unset`, so a corrupt field
    /// degrades to zero instead of failing the whole record.
    pub fn from_json(v: &serde_json::Value) -> MarkValue {
        match v {
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    MarkValue::Value(i)
                } else if let Some(f) = n.as_f64() {
                    MarkValue::Value(f.trunc() as i64)
                } else {
                    MarkValue::Unset
                }
            }
            serde_json::Value::String(s) => {
                let t = s.trim();
                if t.is_empty() {
                    return MarkValue::Unset;
                }
                if let Ok(i) = t.parse::<i64>() {
                    return MarkValue::Value(i);
                }
                match t.parse::<f64>() {
                    Ok(f) if f.is_finite() => MarkValue::Value(f.trunc() as i64),
                    _ => MarkValue::Unset,
                }
            }
            _ => MarkValue::Unset,
        }
    }
}

impl Serialize for MarkValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MarkValue::Unset => serializer.serialize_none(),
            MarkValue::Value(v) => serializer.serialize_i64(*v),
        }
    }
}

impl<'de> Deserialize<'de> for MarkValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(MarkValue::from_json(&raw))
    }
}

/// One subject's marks for one student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MarkSet {
    #[serde(rename = "F1", default)]
    pub f1: MarkValue,
    #[serde(rename = "F2", default)]
    pub f2: MarkValue,
    #[serde(rename = "F3", default)]
    pub f3: MarkValue,
    #[serde(rename = "F4", default)]
    pub f4: MarkValue,
    #[serde(rename = "F5", default)]
    pub f5: MarkValue,
    #[serde(rename = "F6", default)]
    pub f6: MarkValue,
    #[serde(rename = "CC", default)]
    pub cc: MarkValue,
    #[serde(rename = "SA", default)]
    pub sa: MarkValue,
}

impl MarkSet {
    pub fn zeroed() -> MarkSet {
        let mut out = MarkSet::default();
        for field in MarkField::ALL {
            out.set(field, MarkValue::Value(0));
        }
        out
    }

    pub fn get(&self, field: MarkField) -> MarkValue {
        match field {
            MarkField::F1 => self.f1,
            MarkField::F2 => self.f2,
            MarkField::F3 => self.f3,
            MarkField::F4 => self.f4,
            MarkField::F5 => self.f5,
            MarkField::F6 => self.f6,
            MarkField::Cc => self.cc,
            MarkField::Sa => self.sa,
        }
    }

    pub fn set(&mut self, field: MarkField, value: MarkValue) {
        let slot = match field {
            MarkField::F1 => &mut self.f1,
            MarkField::F2 => &mut self.f2,
            MarkField::F3 => &mut self.f3,
            MarkField::F4 => &mut self.f4,
            MarkField::F5 => &mut self.f5,
            MarkField::F6 => &mut self.f6,
            MarkField::Cc => &mut self.cc,
            MarkField::Sa => &mut self.sa,
        };
        *slot = value;
    }

    /// Copy with every `Unset` replaced by zero.
    pub fn materialized(&self) -> MarkSet {
        let mut out = *self;
        for field in MarkField::ALL {
            out.set(field, MarkValue::Value(self.get(field).or_zero()));
        }
        out
    }

    pub fn has_unset(&self) -> bool {
        MarkField::ALL.iter().any(|f| self.get(*f).is_unset())
    }
}

/// Maximum legal value per mark field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkFieldLimits {
    #[serde(rename = "F1", default = "default_formative_max")]
    pub f1: i64,
    #[serde(rename = "F2", default = "default_formative_max")]
    pub f2: i64,
    #[serde(rename = "F3", default = "default_formative_max")]
    pub f3: i64,
    #[serde(rename = "F4", default = "default_formative_max")]
    pub f4: i64,
    #[serde(rename = "F5", default = "default_formative_max")]
    pub f5: i64,
    #[serde(rename = "F6", default = "default_formative_max")]
    pub f6: i64,
    #[serde(rename = "CC", default = "default_cc_max")]
    pub cc: i64,
    #[serde(rename = "SA", default = "default_sa_max")]
    pub sa: i64,
}

fn default_formative_max() -> i64 {
    5
}

fn default_cc_max() -> i64 {
    20
}

fn default_sa_max() -> i64 {
    50
}

impl Default for MarkFieldLimits {
    fn default() -> Self {
        Self {
            f1: default_formative_max(),
            f2: default_formative_max(),
            f3: default_formative_max(),
            f4: default_formative_max(),
            f5: default_formative_max(),
            f6: default_formative_max(),
            cc: default_cc_max(),
            sa: default_sa_max(),
        }
    }
}

impl MarkFieldLimits {
    pub fn max_for(&self, field: MarkField) -> i64 {
        match field {
            MarkField::F1 => self.f1,
            MarkField::F2 => self.f2,
            MarkField::F3 => self.f3,
            MarkField::F4 => self.f4,
            MarkField::F5 => self.f5,
            MarkField::F6 => self.f6,
            MarkField::Cc => self.cc,
            MarkField::Sa => self.sa,
        }
    }

    pub fn formative_max(&self) -> i64 {
        MarkField::FORMATIVE.iter().map(|f| self.max_for(*f)).sum()
    }

    pub fn subject_max(&self) -> i64 {
        MarkField::ALL.iter().map(|f| self.max_for(*f)).sum()
    }

    pub fn clamp(&self, field: MarkField, value: i64) -> i64 {
        value.clamp(0, self.max_for(field).max(0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectTotals {
    pub formative_subtotal: i64,
    pub grand_total: i64,
}

pub fn compute_subject_totals(marks: &MarkSet) -> SubjectTotals {
    // Saturating sums: decoded marks are not range-checked before they get here.
    let formative_subtotal = MarkField::FORMATIVE
        .iter()
        .map(|f| marks.get(*f).or_zero())
        .fold(0i64, i64::saturating_add);
    let grand_total = formative_subtotal
        .saturating_add(marks.cc.or_zero())
        .saturating_add(marks.sa.or_zero());
    SubjectTotals {
        formative_subtotal,
        grand_total,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "C")]
    C,
}

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
        }
    }
}

/// Inclusive lower bounds, checked against the unrounded percentage.
pub fn grade_for_percentage(percentage: f64) -> Grade {
    if percentage >= 80.0 {
        Grade::APlus
    } else if percentage >= 60.0 {
        Grade::A
    } else if percentage >= 40.0 {
        Grade::B
    } else {
        Grade::C
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallResult {
    pub overall_total: i64,
    pub possible_max: i64,
    pub percentage: f64,
    pub grade: Grade,
}

pub fn compute_overall<I>(grand_totals: I, subject_count: usize) -> OverallResult
where
    I: IntoIterator<Item = i64>,
{
    let overall_total = grand_totals.into_iter().fold(0i64, i64::saturating_add);
    let possible_max = i64::try_from(subject_count)
        .unwrap_or(i64::MAX)
        .saturating_mul(PER_SUBJECT_CEILING);
    // Multiply before dividing so exact boundaries (80/60/40) stay exact.
    let percentage = if possible_max > 0 {
        (overall_total as f64) * 100.0 / (possible_max as f64)
    } else {
        0.0
    };
    OverallResult {
        overall_total,
        possible_max,
        percentage,
        grade: grade_for_percentage(percentage),
    }
}

pub fn format_percentage(percentage: f64, places: usize) -> String {
    format!("{:.*}", places, percentage)
}
