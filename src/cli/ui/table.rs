use std::fmt::{self, Display, Formatter};

use serde_json::Value;
use tabled::{builder::Builder, settings::Style as TableStyle};

use super::painter::Painter;
use crate::protocol;

/// A structured table that renders via `Display`.
#[derive(Debug)]
pub(crate) struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub(crate) fn grid(
        headers: impl IntoIterator<Item = impl Into<String>>,
        rows: Vec<Vec<String>>,
    ) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows,
        }
    }

    /// Two-column attribute/value table with muted attribute names.
    pub(crate) fn key_value(painter: &Painter, rows: Vec<(&str, String)>) -> Self {
        let records = rows
            .into_iter()
            .map(|(field, value)| vec![painter.muted(field), value])
            .collect();
        Self::grid(["attribute", "value"], records)
    }

    /// Renders a device table attribute, one row per table row.
    pub(crate) fn from_attribute(table: &protocol::Table) -> Self {
        let rows = table
            .rows()
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        Self::grid(table.headings().iter().cloned(), rows)
    }
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut builder = Builder::default();
        builder.push_record(&self.headers);
        for row in &self.rows {
            builder.push_record(row);
        }
        let mut table = builder.build();
        table.with(TableStyle::rounded());
        write!(f, "{table}")
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use serde_json::json;

    use super::*;

    #[test]
    fn attribute_table_renders_rows() {
        let datasets = protocol::Table::from_columns([
            (
                "name".to_string(),
                vec![json!("det.data"), json!("stage_x.value_set")],
            ),
            ("rank".to_string(), vec![json!(4), json!(1)]),
        ]);

        assert_snapshot!(Table::from_attribute(&datasets).to_string(), @r"
        ╭───────────────────┬──────╮
        │ name              │ rank │
        ├───────────────────┼──────┤
        │ det.data          │ 4    │
        │ stage_x.value_set │ 1    │
        ╰───────────────────┴──────╯
        ");
    }

    #[test]
    fn key_value_table_renders_pairs() {
        let painter = Painter::new(false);
        let table = Table::key_value(&painter, vec![("state", "Armed".into())]);

        assert_snapshot!(table.to_string(), @r"
        ╭───────────┬───────╮
        │ attribute │ value │
        ├───────────┼───────┤
        │ state     │ Armed │
        ╰───────────┴───────╯
        ");
    }
}
