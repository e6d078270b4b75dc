use serde_json::{Map, Value};

/// Renders row objects as a pipe-delimited markdown table. Columns are the union of the row keys
/// in first-seen order.
pub fn render_rows(rows: &[Map<String, Value>]) -> String {
    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key.as_str());
            }
        }
    }

    if columns.is_empty() {
        return "(no data)".to_string();
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| row.get(*c).map(cell_text).unwrap_or_default())
                .collect()
        })
        .collect();

    render_table(&columns, &cells)
}

/// `header` and every row must have the same width.
pub fn render_table<S: AsRef<str>>(header: &[S], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    push_row(&mut out, header.iter().map(|h| h.as_ref()));
    out.push('|');
    out.push_str(&vec!["---"; header.len()].join("|"));
    out.push_str("|\n");
    for row in rows {
        push_row(&mut out, row.iter().map(String::as_str));
    }
    out.truncate(out.trim_end().len());
    out
}

fn push_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    out.push('|');
    for cell in cells {
        out.push(' ');
        out.push_str(&escape_cell(cell));
        out.push_str(" |");
    }
    out.push('\n');
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

// Pipes and newlines inside a cell would break the row structure downstream.
fn escape_cell(s: &str) -> String {
    s.replace('|', "/").replace(['\r', '\n'], " ")
}
