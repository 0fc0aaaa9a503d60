use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use strum_macros::Display;
use thiserror::Error;

const STRING_META: &str = "malcolm:core/StringMeta:1.0";
const NUMBER_META: &str = "malcolm:core/NumberMeta:1.0";
const BOOLEAN_META: &str = "malcolm:core/BooleanMeta:1.0";
const CHOICE_META: &str = "malcolm:core/ChoiceMeta:1.0";
const STRING_ARRAY_META: &str = "malcolm:core/StringArrayMeta:1.0";
const TABLE_META: &str = "malcolm:core/TableMeta:1.0";

/// Discriminant of an [`AttributeValue`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub enum AttributeKind {
    #[strum(to_string = "string")]
    String,
    #[strum(to_string = "number")]
    Number,
    #[strum(to_string = "boolean")]
    Boolean,
    #[strum(to_string = "choice")]
    Choice,
    #[strum(to_string = "string array")]
    StringArray,
    #[strum(to_string = "table")]
    Table,
}

/// Errors returned while decoding attribute payloads.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AttributeError {
    #[error("reply for `{name}` carried no value")]
    MissingValue { name: String },
    #[error("attribute `{name}` has an unrecognised shape: {reason}")]
    Malformed { name: String, reason: String },
    #[error("attribute `{name}` value does not match its {kind} meta")]
    ValueMismatch { name: String, kind: AttributeKind },
    #[error("expected `{name}` to be a {expected} attribute but it was a {actual}")]
    UnexpectedKind {
        name: String,
        expected: AttributeKind,
        actual: AttributeKind,
    },
    #[error("table `{name}` column `{heading}` is missing or not an array")]
    MissingColumn { name: String, heading: String },
}

/// Column-named two-dimensional data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    headings: Vec<String>,
    columns: Vec<Vec<Value>>,
}

impl Table {
    /// Creates a table from ordered `(heading, column)` pairs.
    #[must_use]
    pub fn from_columns(columns: impl IntoIterator<Item = (String, Vec<Value>)>) -> Self {
        let (headings, columns) = columns.into_iter().unzip();
        Self { headings, columns }
    }

    /// Ordered column headings.
    #[must_use]
    pub fn headings(&self) -> &[String] {
        &self.headings
    }

    /// Returns one column by heading.
    #[must_use]
    pub fn column(&self, heading: &str) -> Option<&[Value]> {
        self.headings
            .iter()
            .position(|candidate| candidate == heading)
            .and_then(|index| self.columns.get(index))
            .map(Vec::as_slice)
    }

    /// Number of rows, taken from the longest column.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.columns.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Row-major view of the table; short columns yield `Null` cells.
    #[must_use]
    pub fn rows(&self) -> Vec<Vec<Value>> {
        (0..self.row_count())
            .map(|row| {
                self.columns
                    .iter()
                    .map(|column| column.get(row).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect()
    }
}

/// Typed value held by an attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Choice { value: String, choices: Vec<String> },
    StringArray(Vec<String>),
    Table(Table),
}

impl AttributeValue {
    #[must_use]
    pub fn kind(&self) -> AttributeKind {
        match self {
            Self::String(_) => AttributeKind::String,
            Self::Number(_) => AttributeKind::Number,
            Self::Boolean(_) => AttributeKind::Boolean,
            Self::Choice { .. } => AttributeKind::Choice,
            Self::StringArray(_) => AttributeKind::StringArray,
            Self::Table(_) => AttributeKind::Table,
        }
    }
}

/// A named, point-in-time snapshot of one remote attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    name: String,
    value: AttributeValue,
    writeable: bool,
}

#[derive(Debug, Deserialize)]
struct WireAttribute {
    #[serde(default)]
    value: Value,
    meta: WireMeta,
}

#[derive(Debug, Deserialize)]
struct WireMeta {
    typeid: String,
    #[serde(default)]
    writeable: bool,
    #[serde(default)]
    choices: Vec<String>,
    #[serde(default)]
    headings: Vec<String>,
}

impl Attribute {
    #[must_use]
    pub fn new(name: impl Into<String>, value: AttributeValue, writeable: bool) -> Self {
        Self {
            name: name.into(),
            value,
            writeable,
        }
    }

    /// Decodes a GET/UPDATE payload of the form `{ "value": .., "meta": { "typeid": .. } }`.
    ///
    /// # Errors
    ///
    /// Returns an error when the payload shape is unknown or the value does not
    /// match the declared meta type.
    pub fn decode(name: &str, payload: &Value) -> Result<Self, AttributeError> {
        let wire =
            WireAttribute::deserialize(payload).map_err(|error| AttributeError::Malformed {
                name: name.to_string(),
                reason: error.to_string(),
            })?;
        let WireAttribute { value, meta } = wire;
        let mismatch = |kind| AttributeError::ValueMismatch {
            name: name.to_string(),
            kind,
        };

        let decoded = match meta.typeid.as_str() {
            STRING_META => AttributeValue::String(
                value
                    .as_str()
                    .ok_or_else(|| mismatch(AttributeKind::String))?
                    .to_string(),
            ),
            NUMBER_META => AttributeValue::Number(
                value
                    .as_f64()
                    .ok_or_else(|| mismatch(AttributeKind::Number))?,
            ),
            BOOLEAN_META => AttributeValue::Boolean(
                value
                    .as_bool()
                    .ok_or_else(|| mismatch(AttributeKind::Boolean))?,
            ),
            CHOICE_META => AttributeValue::Choice {
                value: value
                    .as_str()
                    .ok_or_else(|| mismatch(AttributeKind::Choice))?
                    .to_string(),
                choices: meta.choices,
            },
            STRING_ARRAY_META => AttributeValue::StringArray(
                string_array(&value).ok_or_else(|| mismatch(AttributeKind::StringArray))?,
            ),
            TABLE_META => AttributeValue::Table(decode_table(name, &value, meta.headings)?),
            _ => {
                return Err(AttributeError::Malformed {
                    name: name.to_string(),
                    reason: format!("unknown meta typeid `{}`", meta.typeid),
                });
            }
        };

        Ok(Self::new(name, decoded, meta.writeable))
    }

    /// Encodes this attribute in the payload shape accepted by [`Attribute::decode`].
    #[must_use]
    pub fn to_payload(&self) -> Value {
        let (typeid, value, extra) = match &self.value {
            AttributeValue::String(text) => (STRING_META, json!(text), None),
            AttributeValue::Number(number) => (NUMBER_META, json!(number), None),
            AttributeValue::Boolean(flag) => (BOOLEAN_META, json!(flag), None),
            AttributeValue::Choice { value, choices } => {
                (CHOICE_META, json!(value), Some(("choices", json!(choices))))
            }
            AttributeValue::StringArray(items) => (STRING_ARRAY_META, json!(items), None),
            AttributeValue::Table(table) => {
                let columns: Map<String, Value> = table
                    .headings
                    .iter()
                    .cloned()
                    .zip(table.columns.iter().map(|column| json!(column)))
                    .collect();
                (
                    TABLE_META,
                    Value::Object(columns),
                    Some(("headings", json!(table.headings))),
                )
            }
        };

        let mut meta = json!({ "typeid": typeid, "writeable": self.writeable });
        if let (Some((key, extra)), Some(object)) = (extra, meta.as_object_mut()) {
            object.insert(key.to_string(), extra);
        }
        json!({ "value": value, "meta": meta })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn value(&self) -> &AttributeValue {
        &self.value
    }

    #[must_use]
    pub fn into_value(self) -> AttributeValue {
        self.value
    }

    #[must_use]
    pub fn is_writeable(&self) -> bool {
        self.writeable
    }

    /// Fails unless the value is of the expected kind.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeError::UnexpectedKind`] on a mismatch.
    pub fn expect_kind(self, expected: AttributeKind) -> Result<Self, AttributeError> {
        let actual = self.value.kind();
        if actual == expected {
            Ok(self)
        } else {
            Err(AttributeError::UnexpectedKind {
                name: self.name,
                expected,
                actual,
            })
        }
    }

    /// Text of a string or choice attribute.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            AttributeValue::String(text) | AttributeValue::Choice { value: text, .. } => {
                Some(text)
            }
            _ => None,
        }
    }
}

fn string_array(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

fn decode_table(name: &str, value: &Value, headings: Vec<String>) -> Result<Table, AttributeError> {
    let Some(object) = value.as_object() else {
        return Err(AttributeError::ValueMismatch {
            name: name.to_string(),
            kind: AttributeKind::Table,
        });
    };

    let headings = if headings.is_empty() {
        object.keys().cloned().collect()
    } else {
        headings
    };

    let columns = headings
        .iter()
        .map(|heading| {
            object
                .get(heading)
                .and_then(Value::as_array)
                .cloned()
                .ok_or_else(|| AttributeError::MissingColumn {
                    name: name.to_string(),
                    heading: heading.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Table { headings, columns })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn decode_reads_choice_with_meta() {
        let payload = json!({
            "typeid": "epics:nt/NTScalar:1.0",
            "value": "Ready",
            "meta": {
                "typeid": "malcolm:core/ChoiceMeta:1.0",
                "choices": ["Ready", "Running"],
                "writeable": false
            }
        });

        let attribute = Attribute::decode("state", &payload).expect("choice should decode");

        assert_eq!("state", attribute.name());
        assert_eq!(Some("Ready"), attribute.as_text());
        assert_eq!(false, attribute.is_writeable());
        assert_matches!(
            attribute.value(),
            AttributeValue::Choice { choices, .. } if choices.len() == 2
        );
    }

    #[test]
    fn decode_orders_table_columns_by_headings() {
        let payload = json!({
            "value": { "rank": [2, 3], "name": ["det.data", "det.sum"] },
            "meta": { "typeid": TABLE_META, "headings": ["name", "rank"] }
        });

        let attribute = Attribute::decode("datasets", &payload).expect("table should decode");
        let AttributeValue::Table(table) = attribute.into_value() else {
            panic!("expected a table value");
        };

        assert_eq!(vec!["name".to_string(), "rank".to_string()], table.headings());
        assert_eq!(2, table.row_count());
        assert_eq!(vec![json!("det.sum"), json!(3)], table.rows()[1]);
    }

    #[test]
    fn decode_rejects_missing_table_column() {
        let payload = json!({
            "value": { "name": ["det.data"] },
            "meta": { "typeid": TABLE_META, "headings": ["name", "rank"] }
        });

        assert_matches!(
            Attribute::decode("datasets", &payload),
            Err(AttributeError::MissingColumn { heading, .. }) if heading == "rank"
        );
    }

    #[test]
    fn deserialised_table_with_fewer_columns_than_headings_has_no_column() {
        let table: Table = serde_json::from_value(json!({ "headings": ["a", "b"], "columns": [[1]] }))
            .expect("table shape should deserialise");

        assert_eq!(Some([json!(1)].as_slice()), table.column("a"));
        assert_eq!(None, table.column("b"));
        assert_eq!(None, table.column("missing"));
    }

    #[rstest]
    #[case(json!({ "value": 3, "meta": { "typeid": STRING_META } }), AttributeKind::String)]
    #[case(json!({ "value": "x", "meta": { "typeid": NUMBER_META } }), AttributeKind::Number)]
    #[case(json!({ "value": ["x", 1], "meta": { "typeid": STRING_ARRAY_META } }), AttributeKind::StringArray)]
    fn decode_rejects_value_meta_mismatch(#[case] payload: Value, #[case] expected: AttributeKind) {
        assert_matches!(
            Attribute::decode("attr", &payload),
            Err(AttributeError::ValueMismatch { kind, .. }) if kind == expected
        );
    }

    #[test]
    fn decode_rejects_unknown_meta() {
        let payload = json!({ "value": 1, "meta": { "typeid": "malcolm:core/Unknown:1.0" } });
        assert_matches!(
            Attribute::decode("attr", &payload),
            Err(AttributeError::Malformed { .. })
        );
    }

    #[test]
    fn payload_encoding_is_accepted_by_decode() {
        let table = Table::from_columns([
            ("name".to_string(), vec![json!("det.data")]),
            ("rank".to_string(), vec![json!(2)]),
        ]);
        let original = Attribute::new("datasets", AttributeValue::Table(table), false);

        let decoded = Attribute::decode("datasets", &original.to_payload())
            .expect("encoded table should decode");

        assert_eq!(original, decoded);
    }

    #[test]
    fn expect_kind_reports_actual_kind() {
        let attribute = Attribute::new("health", AttributeValue::Number(1.0), false);
        assert_matches!(
            attribute.expect_kind(AttributeKind::String),
            Err(AttributeError::UnexpectedKind {
                actual: AttributeKind::Number,
                ..
            })
        );
    }
}
