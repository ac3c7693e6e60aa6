//! Raw recognized text → typed values.
//!
//! ## Lossy defaults
//!
//! Every function here is pure and total. A numeric field the engine
//! misread becomes `0` (with a warning) instead of failing the table, so
//! one smudged digit costs one value, not forty-five rows.
//!
//! ## The two-decimal rule
//!
//! Every number in the rendered tables carries exactly two decimals, but the
//! engine frequently drops or misplaces the point ("7145", "714.5"). Numbers
//! are therefore rebuilt from their digits alone: the last two digits are
//! the fraction. Arithmetic runs on integer hundredths so that `"7145"`
//! yields exactly `71.45`.

use crate::job::{zero_timestamp, Timestamp};
use crate::output::{RawCell, ResultRow};
use crate::pipeline::schema::{ColumnSchema, ColumnTag};
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static RE_TWO_DECIMALS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\d\d$").unwrap());

static RE_TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+-\d+-\d+)\s+(\d+:\d+:\d+)").unwrap());

static RE_VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"v\s*(\d+\.\d+\.\d+)").unwrap());

/// A normalized field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

/// Normalize `raw` according to the column it was read from.
pub fn normalize(raw: &str, tag: ColumnTag) -> FieldValue {
    match tag {
        ColumnTag::Group | ColumnTag::Remarks | ColumnTag::UdpNatType => {
            FieldValue::Text(normalize_text(raw))
        }
        ColumnTag::Loss => FieldValue::Number(normalize_percent(raw)),
        ColumnTag::Ping | ColumnTag::GooglePing => FieldValue::Number(normalize_number(raw)),
        ColumnTag::AvgSpeed | ColumnTag::MaxSpeed => FieldValue::Number(normalize_speed(raw)),
    }
}

// ── Numbers ──────────────────────────────────────────────────────────────

/// The value of `raw` in hundredths, or `None` when fewer than three digits
/// survive.
fn hundredths(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    let digits: String = if RE_TWO_DECIMALS.is_match(trimmed) {
        trimmed.replace('.', "")
    } else {
        trimmed.chars().filter(char::is_ascii_digit).collect()
    };
    if digits.len() < 3 {
        return None;
    }
    digits.parse().ok()
}

/// Plain two-decimal number: `"7145"` and `"71.45"` both give `71.45`.
pub fn normalize_number(raw: &str) -> f64 {
    match hundredths(raw) {
        Some(h) => h as f64 / 100.0,
        None => {
            if !raw.trim().is_empty() {
                warn!("cannot read number from {:?}, using 0", raw);
            }
            0.0
        }
    }
}

/// Percentage without its sign: `"71.45%"` gives `71.45`.
pub fn normalize_percent(raw: &str) -> f64 {
    normalize_number(&raw.replace('%', ""))
}

/// Speed in bytes per second: `"21.48MB"` gives `21_480_000`.
///
/// The last two characters are the unit. `"NA"` and anything shorter than
/// three characters is `0`.
pub fn normalize_speed(raw: &str) -> f64 {
    let text = raw.trim();
    let chars: Vec<char> = text.chars().collect();
    if text == "NA" || chars.len() < 3 {
        return 0.0;
    }
    let split = chars.len() - 2;
    let unit: String = chars[split..].iter().collect::<String>().to_ascii_uppercase();
    let prefix: String = chars[..split].iter().collect();

    let scalar = match unit.as_str() {
        "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        _ => 1.0,
    };
    match hundredths(&prefix) {
        Some(h) => h as f64 * scalar / 100.0,
        None => {
            warn!("cannot read speed from {:?}, using 0", raw);
            0.0
        }
    }
}

// ── Text ─────────────────────────────────────────────────────────────────

pub fn normalize_text(raw: &str) -> String {
    raw.trim().to_string()
}

// ── Footer / title ───────────────────────────────────────────────────────

/// Find a `YYYY-MM-DD HH:MM:SS` pair anywhere in `raw`.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    let caps = RE_TIMESTAMP.captures(raw)?;
    let joined = format!("{} {}", &caps[1], &caps[2]);
    NaiveDateTime::parse_from_str(&joined, "%Y-%m-%d %H:%M:%S").ok()
}

/// Like [`parse_timestamp`], falling back to [`zero_timestamp`] with a
/// warning.
pub fn normalize_timestamp(raw: &str) -> Timestamp {
    parse_timestamp(raw).unwrap_or_else(|| {
        warn!("no timestamp in {:?}, using zero timestamp", raw.trim());
        zero_timestamp()
    })
}

/// `"... v2.7.1 ..."` → `Some("2.7.1")`.
pub fn extract_version(raw: &str) -> Option<String> {
    RE_VERSION.captures(raw).map(|c| c[1].to_string())
}

// ── Rows ─────────────────────────────────────────────────────────────────

/// Write one normalized value into its field.
fn assign(row: &mut ResultRow, tag: ColumnTag, raw: &str) {
    match (tag, normalize(raw, tag)) {
        (ColumnTag::Group, FieldValue::Text(t)) => row.group = t,
        (ColumnTag::Remarks, FieldValue::Text(t)) => row.remarks = t,
        (ColumnTag::UdpNatType, FieldValue::Text(t)) => row.udp_nat_type = t,
        (ColumnTag::Loss, FieldValue::Number(n)) => row.loss = n,
        (ColumnTag::Ping, FieldValue::Number(n)) => row.ping = n,
        (ColumnTag::GooglePing, FieldValue::Number(n)) => row.google_ping = n,
        (ColumnTag::AvgSpeed, FieldValue::Number(n)) => row.avg_speed = n,
        (ColumnTag::MaxSpeed, FieldValue::Number(n)) => row.max_speed = n,
        // normalize() never pairs a tag with the other variant
        _ => {}
    }
}

/// Assemble `row_count` typed rows from raw cells.
///
/// Cells outside the table or the schema are ignored; fields the schema does
/// not carry keep their defaults.
pub fn build_rows(cells: &[RawCell], schema: &ColumnSchema, row_count: usize) -> Vec<ResultRow> {
    let mut rows = vec![ResultRow::default(); row_count];
    for cell in cells {
        let Some(&tag) = schema.columns().get(cell.col_index) else {
            continue;
        };
        if let Some(row) = rows.get_mut(cell.row_index) {
            assign(row, tag, &cell.text);
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn number_inserts_decimal_point() {
        assert_eq!(normalize_number("7145"), 71.45);
        assert_eq!(normalize_number("714.5"), 71.45);
        assert_eq!(normalize_number("71.45"), 71.45);
        assert_eq!(normalize_number(" 123.45\n"), 123.45);
        assert_eq!(normalize_number("100"), 1.0);
    }

    #[test]
    fn short_or_garbage_numbers_are_zero() {
        assert_eq!(normalize_number("12"), 0.0);
        assert_eq!(normalize_number(""), 0.0);
        assert_eq!(normalize_number("abc"), 0.0);
    }

    #[test]
    fn percent_drops_sign() {
        assert_eq!(normalize_percent("71.45%"), 71.45);
        assert_eq!(normalize_percent("0.00%"), 0.0);
        assert_eq!(normalize_percent("100.00%"), 100.0);
    }

    #[test]
    fn speed_applies_unit() {
        assert_eq!(normalize_speed("21.48MB"), 21_480_000.0);
        assert_eq!(normalize_speed("512.00KB"), 512_000.0);
        assert_eq!(normalize_speed("1.25GB"), 1_250_000_000.0);
        assert_eq!(normalize_speed("2148MB"), 21_480_000.0);
    }

    #[test]
    fn speed_without_value_is_zero() {
        assert_eq!(normalize_speed("NA"), 0.0);
        assert_eq!(normalize_speed(" NA "), 0.0);
        assert_eq!(normalize_speed("MB"), 0.0);
        assert_eq!(normalize_speed(""), 0.0);
    }

    #[test]
    fn speed_with_unknown_unit_keeps_number() {
        assert_eq!(normalize_speed("12345"), 1.23);
    }

    #[test]
    fn text_is_trimmed() {
        assert_eq!(normalize_text("  Full Cone \n"), "Full Cone");
        assert_eq!(
            normalize(" 香港 01 ", ColumnTag::Remarks),
            FieldValue::Text("香港 01".into())
        );
    }

    #[test]
    fn timestamp_found_anywhere() {
        let expected = NaiveDate::from_ymd_opt(2020, 12, 11)
            .unwrap()
            .and_hms_opt(20, 30, 3)
            .unwrap();
        assert_eq!(
            normalize_timestamp("Generated at 2020-12-11 20:30:03"),
            expected
        );
        assert_eq!(
            parse_timestamp("noise 2020-12-11   20:30:03 by tool"),
            Some(expected)
        );
    }

    #[test]
    fn unreadable_timestamp_is_zero() {
        assert_eq!(normalize_timestamp("Generated at"), zero_timestamp());
        assert_eq!(normalize_timestamp("2020-13-45 99:00:00"), zero_timestamp());
    }

    #[test]
    fn version_extraction() {
        assert_eq!(
            extract_version("SSRSpeed Result Table ( v2.7.1 )").as_deref(),
            Some("2.7.1")
        );
        assert_eq!(extract_version("v 1.0.12").as_deref(), Some("1.0.12"));
        assert_eq!(extract_version("Result Table"), None);
    }

    #[test]
    fn rows_follow_schema() {
        let schema = ColumnSchema::resolve(7).unwrap();
        let texts = [
            "HK", "node-1", "0.00%", "7145", "120.30", "21.48MB", "Full Cone",
        ];
        let cells: Vec<RawCell> = texts
            .iter()
            .enumerate()
            .map(|(col, t)| RawCell {
                row_index: 1,
                col_index: col,
                text: t.to_string(),
            })
            .collect();
        let rows = build_rows(&cells, &schema, 2);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], ResultRow::default());
        let r = &rows[1];
        assert_eq!(r.group, "HK");
        assert_eq!(r.ping, 71.45);
        assert_eq!(r.google_ping, 120.3);
        assert_eq!(r.avg_speed, 21_480_000.0);
        assert_eq!(r.max_speed, 0.0);
        assert_eq!(r.udp_nat_type, "Full Cone");
    }

    #[test]
    fn eight_column_rows_carry_max_speed() {
        let schema = ColumnSchema::resolve(8).unwrap();
        let texts = [
            "JP", "tokyo-2", "1.50%", "3512", "48.00", "12.00MB", "1.25GB", "Symmetric NAT",
        ];
        let cells: Vec<RawCell> = texts
            .iter()
            .enumerate()
            .map(|(col, t)| RawCell {
                row_index: 0,
                col_index: col,
                text: t.to_string(),
            })
            .collect();
        let rows = build_rows(&cells, &schema, 1);
        let r = &rows[0];
        assert_eq!(r.group, "JP");
        assert_eq!(r.remarks, "tokyo-2");
        assert_eq!(r.loss, 1.5);
        assert_eq!(r.ping, 35.12);
        assert_eq!(r.google_ping, 48.0);
        assert_eq!(r.avg_speed, 12_000_000.0);
        assert_eq!(r.max_speed, 1_250_000_000.0);
        assert_eq!(r.udp_nat_type, "Symmetric NAT");
    }

    #[test]
    fn stray_cells_are_ignored() {
        let schema = ColumnSchema::resolve(6).unwrap();
        let cells = vec![
            RawCell {
                row_index: 5,
                col_index: 0,
                text: "X".into(),
            },
            RawCell {
                row_index: 0,
                col_index: 6,
                text: "Full Cone".into(),
            },
        ];
        let rows = build_rows(&cells, &schema, 1);
        assert_eq!(rows, vec![ResultRow::default()]);
    }
}
