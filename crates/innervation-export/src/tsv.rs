//! Tab-separated results file.
//!
//! Written layout:
//!
//! ```text
//! Filename<TAB>Index
//! slide-01.png<TAB>25.000000
//! slide-02.png<TAB>3.141593
//! ```
//!
//! One row per saved image, in save order, `\n` line endings. Tabs and
//! line breaks inside identifiers are replaced by spaces so every row
//! keeps exactly two columns.
//!
//! The parser is lenient: it accepts files written here as well as the
//! space-padded layout with a dashed separator line. Each line's value
//! is its last whitespace-separated field; lines without a numeric last
//! field (headers, separators, notes) are skipped and counted.

use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::ExportError;

/// Header line of the results file.
pub const HEADER: &str = "Filename\tIndex";

/// One saved measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Source identifier, usually the file name.
    pub identifier: String,
    /// Innervation index in percent.
    pub index_percent: f64,
    /// 1-based position in save order.
    pub sequence: u32,
}

/// Formatting options for [`to_tsv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TsvOptions {
    /// Decimal places for the index column.
    pub precision: usize,
    /// Emit the [`HEADER`] line.
    pub header: bool,
}

impl TsvOptions {
    /// Default decimal places.
    pub const DEFAULT_PRECISION: usize = 6;
}

impl Default for TsvOptions {
    fn default() -> Self {
        Self {
            precision: Self::DEFAULT_PRECISION,
            header: true,
        }
    }
}

/// Serialize rows into results-file text.
///
/// # Examples
///
/// ```
/// use innervation_export::tsv::{ResultRow, TsvOptions, to_tsv};
///
/// let rows = vec![ResultRow {
///     identifier: "a.png".to_owned(),
///     index_percent: 25.0,
///     sequence: 1,
/// }];
/// assert_eq!(to_tsv(&rows, &TsvOptions::default()), "Filename\tIndex\na.png\t25.000000\n");
/// ```
#[must_use]
pub fn to_tsv(rows: &[ResultRow], options: &TsvOptions) -> String {
    let mut out = String::new();
    if options.header {
        let _ = writeln!(out, "{HEADER}");
    }
    for row in rows {
        let _ = writeln!(
            out,
            "{}\t{:.*}",
            sanitize_identifier(&row.identifier),
            options.precision,
            row.index_percent,
        );
    }
    out
}

/// Replace characters that would break the column layout.
#[must_use]
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
        .collect()
}

/// A row read back from a results file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRow {
    /// 1-based line number in the source text.
    pub line: usize,
    /// Everything before the value column, trimmed. May be empty.
    pub identifier: String,
    /// Parsed index value.
    pub value: f64,
}

/// Rows read from one results file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParsedResults {
    /// Rows with a numeric value, in file order.
    pub rows: Vec<ParsedRow>,
    /// Non-blank lines without a numeric last field.
    pub skipped_lines: usize,
}

impl ParsedResults {
    /// Values in file order.
    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.value).collect()
    }
}

/// Parse results-file text.
///
/// # Errors
///
/// Returns [`ExportError::NonFiniteValue`] if a value column holds NaN
/// or infinity.
pub fn parse_results(text: &str) -> Result<ParsedResults, ExportError> {
    let mut parsed = ParsedResults::default();
    for (i, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let Some((identifier, last)) = split_last_field(line) else {
            parsed.skipped_lines += 1;
            continue;
        };
        let Ok(value) = last.parse::<f64>() else {
            parsed.skipped_lines += 1;
            continue;
        };
        if !value.is_finite() {
            return Err(ExportError::NonFiniteValue {
                line: i + 1,
                text: last.to_owned(),
            });
        }
        parsed.rows.push(ParsedRow {
            line: i + 1,
            identifier: identifier.to_owned(),
            value,
        });
    }
    Ok(parsed)
}

/// Split a trimmed line into (identifier, last field).
///
/// A tab separates the columns when present, so identifiers containing
/// spaces survive; otherwise the last whitespace run does.
fn split_last_field(line: &str) -> Option<(&str, &str)> {
    let split_at = line
        .rfind('\t')
        .or_else(|| line.rfind(char::is_whitespace));
    match split_at {
        Some(pos) => {
            let (head, tail) = line.split_at(pos);
            Some((head.trim(), tail.trim()))
        }
        None if !line.is_empty() => Some(("", line)),
        None => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row(identifier: &str, index_percent: f64, sequence: u32) -> ResultRow {
        ResultRow {
            identifier: identifier.to_owned(),
            index_percent,
            sequence,
        }
    }

    #[test]
    fn empty_batch_is_header_only() {
        assert_eq!(to_tsv(&[], &TsvOptions::default()), "Filename\tIndex\n");
    }

    #[test]
    fn rows_use_fixed_precision() {
        let rows = vec![row("a.png", 25.0, 1), row("b.tif", 100.0 / 3.0, 2)];
        let text = to_tsv(&rows, &TsvOptions::default());
        assert_eq!(text, "Filename\tIndex\na.png\t25.000000\nb.tif\t33.333333\n");
    }

    #[test]
    fn precision_and_header_are_configurable() {
        let options = TsvOptions {
            precision: 2,
            header: false,
        };
        assert_eq!(to_tsv(&[row("x", 12.3456, 1)], &options), "x\t12.35\n");
    }

    #[test]
    fn identifiers_are_sanitized() {
        let text = to_tsv(&[row("bad\tname\nhere.png", 1.0, 1)], &TsvOptions::default());
        assert_eq!(text.lines().nth(1), Some("bad name here.png\t1.000000"));
    }

    #[test]
    fn parses_own_output() {
        let rows = vec![row("slide 1.png", 12.5, 1), row("slide-2.png", 0.25, 2)];
        let parsed = parse_results(&to_tsv(&rows, &TsvOptions::default())).unwrap();
        assert_eq!(parsed.skipped_lines, 1);
        assert_eq!(parsed.values(), vec![12.5, 0.25]);
        assert_eq!(parsed.rows[0].identifier, "slide 1.png");
        assert_eq!(parsed.rows[0].line, 2);
    }

    #[test]
    fn parses_padded_layout_with_separator() {
        let text = format!(
            "{:<30}\tIndex\n{}\n{:<30}\t{:.6}\n\n{:<30}\t{:.6}\n",
            "Filename",
            "-".repeat(40),
            "m1_a.tif",
            40.5,
            "m1_b.tif",
            19.5,
        );
        let parsed = parse_results(&text).unwrap();
        assert_eq!(parsed.values(), vec![40.5, 19.5]);
        assert_eq!(parsed.rows[1].identifier, "m1_b.tif");
        assert_eq!(parsed.skipped_lines, 2);
    }

    #[test]
    fn bare_values_and_space_separated_lines() {
        let parsed = parse_results("7.5\nslide 3.0\n").unwrap();
        assert_eq!(parsed.values(), vec![7.5, 3.0]);
        assert_eq!(parsed.rows[0].identifier, "");
        assert_eq!(parsed.rows[1].identifier, "slide");
    }

    #[test]
    fn crlf_line_endings_accepted() {
        let parsed = parse_results("Filename\tIndex\r\na\t1.5\r\n").unwrap();
        assert_eq!(parsed.values(), vec![1.5]);
    }

    #[test]
    fn nan_value_rejected() {
        let err = parse_results("a\t1.0\nb\tNaN\n").unwrap_err();
        assert!(matches!(err, ExportError::NonFiniteValue { line: 2, .. }));
    }
}
