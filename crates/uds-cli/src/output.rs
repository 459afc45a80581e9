//! Rendering of command results as a table, JSON or CSV

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use tabled::{Table, Tabled};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned table
    #[default]
    Table,
    /// Pretty-printed JSON array
    Json,
    /// Header line plus one line per row
    Csv,
}

/// Where and how command results are printed
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    /// `no_color` turns colouring off for the whole process
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg.green());
        }
    }

    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Always shown, on stderr
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    pub fn print<T: Tabled + Serialize>(&self, rows: &[T]) {
        if let Some(text) = self.render(rows) {
            println!("{}", text);
        }
    }

    pub fn print_one<T: Tabled + Serialize>(&self, row: &T) {
        self.print(std::slice::from_ref(row));
    }

    /// Text for `rows`, `None` when there is nothing to print
    fn render<T: Tabled + Serialize>(&self, rows: &[T]) -> Option<String> {
        match self.format {
            OutputFormat::Table if rows.is_empty() => (!self.quiet).then(|| "No data".to_string()),
            OutputFormat::Table => Some(Table::new(rows).to_string()),
            OutputFormat::Json => {
                Some(serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string()))
            }
            OutputFormat::Csv => csv_lines(rows).map(|lines| lines.join("\n")),
        }
    }
}

/// Header and row lines; the columns are the keys of the first row
fn csv_lines<T: Serialize>(rows: &[T]) -> Option<Vec<String>> {
    let objects: Vec<_> = rows
        .iter()
        .filter_map(|row| match serde_json::to_value(row) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        })
        .collect();
    let columns: Vec<String> = objects.first()?.keys().cloned().collect();

    let mut lines = Vec::with_capacity(objects.len() + 1);
    lines.push(columns.join(","));
    for object in &objects {
        let fields: Vec<String> = columns
            .iter()
            .map(|column| match object.get(column) {
                Some(Value::String(s)) => csv_field(s),
                Some(other) => csv_field(&other.to_string()),
                None => String::new(),
            })
            .collect();
        lines.push(fields.join(","));
    }
    Some(lines)
}

/// Quote a field containing a separator, quote or newline
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// =============================================================================
// Display types for commands
// =============================================================================

/// Raw request/response for send command
#[derive(Debug, Tabled, Serialize)]
pub struct ResponseRow {
    #[tabled(rename = "Request")]
    pub request: String,
    #[tabled(rename = "Response")]
    pub response: String,
    #[tabled(rename = "NRC")]
    pub nrc: String,
}

/// Decoded DID parameter for read command
#[derive(Debug, Tabled, Serialize)]
pub struct DataRow {
    #[tabled(rename = "DID")]
    pub did: String,
    #[tabled(rename = "Parameter")]
    pub parameter: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

/// Download summary for transfer command
#[derive(Debug, Tabled, Serialize)]
pub struct TransferRow {
    #[tabled(rename = "File")]
    pub file: String,
    #[tabled(rename = "Address")]
    pub address: String,
    #[tabled(rename = "Length")]
    pub length: u32,
    #[tabled(rename = "Chunk")]
    pub chunk_size: usize,
    #[tabled(rename = "Exit record")]
    pub exit_record: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_csv_lines_use_first_row_columns() {
        let rows = [
            DataRow {
                did: "0xF190".to_string(),
                parameter: "vin".to_string(),
                value: "WVW".to_string(),
            },
            DataRow {
                did: "0x0101".to_string(),
                parameter: "rpm".to_string(),
                value: "750.0".to_string(),
            },
        ];

        let lines = csv_lines(&rows).unwrap();

        assert_eq!(
            lines,
            vec!["did,parameter,value", "0xF190,vin,WVW", "0x0101,rpm,750.0"]
        );
        assert!(csv_lines::<DataRow>(&[]).is_none());
    }

    #[test]
    fn test_quiet_table_hides_empty_notice() {
        let ctx = OutputContext {
            format: OutputFormat::Table,
            quiet: true,
        };
        assert_eq!(ctx.render::<DataRow>(&[]), None);

        let ctx = OutputContext {
            format: OutputFormat::Table,
            quiet: false,
        };
        assert_eq!(ctx.render::<DataRow>(&[]).as_deref(), Some("No data"));
    }
}
