use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One row of a remote sheet.
///
/// Records are values: the cache never edits one in place, it swaps in a
/// new copy built with [`Record::with_patch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Position of the row in the remote store. Assigned by the service.
    pub row_index: u64,
    /// Grouping key (column F). Blank keys never take part in lookup.
    #[serde(rename = "valueF", default, deserialize_with = "lenient_string")]
    pub key_value: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_verified: bool,
    /// Batch label (column A); the service may rewrite it on update.
    #[serde(
        rename = "valueA",
        alias = "batchLabel",
        default,
        deserialize_with = "lenient_string"
    )]
    pub batch_label: String,
}

impl Record {
    pub fn new(row_index: u64, key_value: impl Into<String>, batch_label: impl Into<String>) -> Self {
        Self {
            row_index,
            key_value: key_value.into(),
            is_verified: false,
            batch_label: batch_label.into(),
        }
    }

    pub fn verified(mut self) -> Self {
        self.is_verified = true;
        self
    }

    /// Key with surrounding whitespace removed, as used for matching.
    pub fn key(&self) -> &str {
        self.key_value.trim()
    }

    pub fn with_patch(&self, patch: &RecordPatch) -> Self {
        Self {
            row_index: self.row_index,
            key_value: self.key_value.clone(),
            is_verified: patch.is_verified,
            batch_label: patch.batch_label.clone(),
        }
    }
}

/// Fields a confirmed update is allowed to change on a cached row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPatch {
    pub is_verified: bool,
    pub batch_label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetNames {
    #[serde(default)]
    pub sheet_names: Vec<String>,
}

/// Payload of the bulk fetch issued once at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialData {
    #[serde(default)]
    pub sheet_names: Vec<String>,
    /// A null map or a null sheet entry decodes as empty.
    #[serde(default, deserialize_with = "lenient_sheets")]
    pub sheets_data: HashMap<String, Vec<Record>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRowRequest {
    pub sheet_name: String,
    pub row_index: u64,
    pub is_verified: bool,
    /// Sent as a bare number, or as `""` when the operator left it blank.
    #[serde(serialize_with = "number_or_blank")]
    pub number_value: Option<f64>,
}

/// Answer to `updateRow`.
///
/// `row_index` and `batch_label` identify the row the service actually
/// wrote, which differs from the requested one when another client claimed
/// it first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRowResponse {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub updated: bool,
    #[serde(default)]
    pub row_index: Option<u64>,
    #[serde(
        rename = "valueA",
        alias = "batchLabel",
        default,
        deserialize_with = "lenient_opt_string"
    )]
    pub batch_label: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub was_reassigned: bool,
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(match n.as_f64() {
            // Sheets hands back integral cells as floats; print them without ".0".
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        }),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_string(value).unwrap_or_default())
}

fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_string(value))
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(b),
        Value::Number(n) => Ok(n.as_f64().is_some_and(|f| f != 0.0)),
        Value::String(s) => Ok(s.trim().eq_ignore_ascii_case("true")),
        other => Err(de::Error::custom(format!("expected a boolean, got {other}"))),
    }
}

fn lenient_sheets<'de, D>(deserializer: D) -> Result<HashMap<String, Vec<Record>>, D::Error>
where
    D: Deserializer<'de>,
{
    let sheets: Option<HashMap<String, Option<Vec<Record>>>> = Option::deserialize(deserializer)?;
    Ok(sheets
        .unwrap_or_default()
        .into_iter()
        .map(|(name, rows)| (name, rows.unwrap_or_default()))
        .collect())
}

fn number_or_blank<S>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => serializer.serialize_i64(*n as i64),
        Some(n) => serializer.serialize_f64(*n),
        None => serializer.serialize_str(""),
    }
}
