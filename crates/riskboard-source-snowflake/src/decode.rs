//! Result set decoding
//!
//! The SQL API (`jsonv2` format) returns every cell as a string or `null`,
//! with the real type described by `resultSetMetaData.rowType`.

use chrono::{DateTime, NaiveDateTime, TimeDelta};
use riskboard_core::{Column, ColumnType, Value};
use serde::Deserialize;

/// One entry of `resultSetMetaData.rowType`
#[derive(Debug, Clone, Deserialize)]
pub struct RowType {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub scale: Option<i64>,
}

impl RowType {
    pub fn column_type(&self) -> ColumnType {
        match self.kind.to_ascii_lowercase().as_str() {
            "fixed" if self.scale.unwrap_or(0) == 0 => ColumnType::Integer,
            "fixed" | "real" => ColumnType::Float,
            "boolean" => ColumnType::Integer,
            "date" | "timestamp_ntz" | "timestamp_ltz" | "timestamp_tz" => ColumnType::Timestamp,
            _ => ColumnType::String,
        }
    }

    pub fn column(&self) -> Column {
        Column::new(self.name.clone(), self.column_type())
    }

    /// Decode one string-encoded cell; anything that does not parse is null
    pub fn decode(&self, cell: Option<&str>) -> Value {
        let Some(text) = cell else {
            return Value::Null;
        };

        let decoded = match self.kind.to_ascii_lowercase().as_str() {
            "fixed" if self.scale.unwrap_or(0) == 0 => text.parse().ok().map(Value::Integer),
            "fixed" | "real" => text.parse().ok().map(Value::Float),
            "boolean" => match text {
                "true" | "TRUE" | "1" => Some(Value::Integer(1)),
                "false" | "FALSE" | "0" => Some(Value::Integer(0)),
                _ => None,
            },
            "date" => text
                .parse::<i64>()
                .ok()
                .and_then(|days| days.checked_mul(86_400))
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .map(|dt| Value::Timestamp(dt.naive_utc())),
            "timestamp_ntz" | "timestamp_ltz" => epoch_timestamp(text).map(Value::Timestamp),
            "timestamp_tz" => tz_timestamp(text).map(Value::Timestamp),
            _ => Some(Value::String(text.to_string())),
        };

        decoded.unwrap_or(Value::Null)
    }
}

/// `"<seconds>.<fraction>"` since the epoch
fn epoch_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
    let mut secs: i64 = whole.parse().ok()?;

    if fraction.len() > 9 || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut nanos: u32 = if fraction.is_empty() {
        0
    } else {
        format!("{:0<9}", fraction).parse().ok()?
    };

    // "-1.5" is one and a half seconds before the epoch
    if whole.starts_with('-') && nanos > 0 {
        secs -= 1;
        nanos = 1_000_000_000 - nanos;
    }

    DateTime::from_timestamp(secs, nanos).map(|dt| dt.naive_utc())
}

/// `"<seconds>.<fraction> <offset>"` where offset is minutes + 1440
///
/// Returned as wall-clock time in the value's own offset.
fn tz_timestamp(text: &str) -> Option<NaiveDateTime> {
    let (instant, offset) = text.trim().split_once(' ')?;
    let offset_minutes = offset.trim().parse::<i64>().ok()? - 1440;
    let utc = epoch_timestamp(instant)?;
    utc.checked_add_signed(TimeDelta::minutes(offset_minutes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row_type(kind: &str, scale: Option<i64>) -> RowType {
        RowType {
            name: "C".to_string(),
            kind: kind.to_string(),
            scale,
        }
    }

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn test_column_types() {
        assert_eq!(row_type("fixed", Some(0)).column_type(), ColumnType::Integer);
        assert_eq!(row_type("FIXED", None).column_type(), ColumnType::Integer);
        assert_eq!(row_type("fixed", Some(2)).column_type(), ColumnType::Float);
        assert_eq!(row_type("real", None).column_type(), ColumnType::Float);
        assert_eq!(row_type("boolean", None).column_type(), ColumnType::Integer);
        assert_eq!(row_type("date", None).column_type(), ColumnType::Timestamp);
        assert_eq!(row_type("timestamp_tz", Some(9)).column_type(), ColumnType::Timestamp);
        assert_eq!(row_type("text", None).column_type(), ColumnType::String);
        assert_eq!(row_type("variant", None).column_type(), ColumnType::String);
    }

    #[test]
    fn test_numbers_and_text() {
        assert_eq!(row_type("fixed", Some(0)).decode(Some("1200")), Value::Integer(1200));
        assert_eq!(row_type("fixed", Some(2)).decode(Some("15234.75")), Value::Float(15234.75));
        assert_eq!(row_type("real", None).decode(Some("0.5")), Value::Float(0.5));
        assert_eq!(row_type("boolean", None).decode(Some("true")), Value::Integer(1));
        assert_eq!(row_type("text", None).decode(Some("Delhi")), Value::from("Delhi"));
        assert_eq!(row_type("text", None).decode(None), Value::Null);
        assert_eq!(row_type("fixed", Some(0)).decode(Some("n/a")), Value::Null);
    }

    #[test]
    fn test_dates_and_timestamps() {
        // 19727 days after 1970-01-01
        assert_eq!(
            row_type("date", None).decode(Some("19727")),
            Value::Timestamp(ts(2024, 1, 5, 0, 0, 0))
        );
        assert_eq!(
            row_type("timestamp_ntz", Some(9)).decode(Some("1704276000.000000000")),
            Value::Timestamp(ts(2024, 1, 3, 10, 0, 0))
        );

        let half = row_type("timestamp_ltz", Some(3)).decode(Some("1704276000.5"));
        let expected = ts(2024, 1, 3, 10, 0, 0) + TimeDelta::milliseconds(500);
        assert_eq!(half, Value::Timestamp(expected));

        // +05:30 is 330 minutes, encoded as 1770
        assert_eq!(
            row_type("timestamp_tz", Some(9)).decode(Some("1704276000.000000000 1770")),
            Value::Timestamp(ts(2024, 1, 3, 15, 30, 0))
        );

        assert_eq!(row_type("timestamp_ntz", None).decode(Some("yesterday")), Value::Null);
    }

    #[test]
    fn test_pre_epoch_fraction() {
        let expected = ts(1969, 12, 31, 23, 59, 58) + TimeDelta::milliseconds(500);
        assert_eq!(epoch_timestamp("-1.5"), Some(expected));
    }
}
