//! Cell normalizers: dates, BR money, percentages
//!
//! Every parser reports what happened through [`Parsed`] instead of quietly
//! returning `0` or `None`, so each flow decides per field whether a bad cell
//! is a warning, an error or nothing at all.

use chrono::{DateTime, NaiveDate};

use crate::defaults::{EXCEL_EPOCH_OFFSET_DAYS, MS_PER_DAY};
use crate::services::tabular::CellValue;

/// Outcome of parsing one cell
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    Value(T),
    /// Empty cell
    Missing,
    /// Non-empty cell that could not be interpreted
    Invalid { raw: String, reason: &'static str },
}

impl<T> Parsed<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Parsed::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Parsed::Invalid { .. })
    }

    fn invalid(raw: impl Into<String>, reason: &'static str) -> Self {
        Parsed::Invalid {
            raw: raw.into(),
            reason,
        }
    }
}

// =============================================================================
// DATES
// =============================================================================

/// Parse a date cell.
///
/// - native date → its date part
/// - number → Excel serial, `(serial - 25569)` days from the Unix epoch, UTC
/// - text with `/` → `DD/MM/YYYY`, positions taken literally
/// - text with `-` → ISO, date part before any `T`
pub fn parse_date(cell: &CellValue) -> Parsed<NaiveDate> {
    match cell {
        CellValue::Empty => Parsed::Missing,
        CellValue::Date(dt) => Parsed::Value(dt.date()),
        CellValue::Number(serial) => from_excel_serial(*serial)
            .map_or_else(|| Parsed::invalid(cell.to_string(), "serial fora do intervalo"), Parsed::Value),
        CellValue::Bool(_) => Parsed::invalid(cell.to_string(), "valor não é uma data"),
        CellValue::Text(s) => parse_date_str(s),
    }
}

pub fn parse_date_str(s: &str) -> Parsed<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return Parsed::Missing;
    }
    // "25/12/2024 10:30" → "25/12/2024"
    let head = s.split_whitespace().next().unwrap_or(s);

    if head.contains('/') {
        let parts: Vec<&str> = head.split('/').collect();
        if parts.len() != 3 {
            return Parsed::invalid(s, "esperado DD/MM/AAAA");
        }
        let (Ok(day), Ok(month), Ok(year)) = (
            parts[0].trim().parse::<u32>(),
            parts[1].trim().parse::<u32>(),
            parts[2].trim().parse::<i32>(),
        ) else {
            return Parsed::invalid(s, "esperado DD/MM/AAAA");
        };
        if year < 1000 {
            return Parsed::invalid(s, "ano com menos de 4 dígitos");
        }
        return NaiveDate::from_ymd_opt(year, month, day)
            .map_or_else(|| Parsed::invalid(s, "data inexistente"), Parsed::Value);
    }

    if head.contains('-') {
        let date_part = head.split('T').next().unwrap_or(head);
        return NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            .map_or_else(|_| Parsed::invalid(s, "esperado AAAA-MM-DD"), Parsed::Value);
    }

    Parsed::invalid(s, "formato de data não reconhecido")
}

pub fn from_excel_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() {
        return None;
    }
    let ms = ((serial - EXCEL_EPOCH_OFFSET_DAYS) * MS_PER_DAY).round();
    if ms.abs() > 8.64e15 {
        return None;
    }
    DateTime::from_timestamp_millis(ms as i64).map(|dt| dt.date_naive())
}

// =============================================================================
// MONEY AND PERCENTAGES
// =============================================================================

/// Parse a BR currency cell: "R$ 1.234,56" → 1234.56.
pub fn parse_money(cell: &CellValue) -> Parsed<f64> {
    match cell {
        CellValue::Empty => Parsed::Missing,
        CellValue::Number(n) => Parsed::Value(*n),
        CellValue::Text(s) => parse_money_str(s),
        other => Parsed::invalid(other.to_string(), "valor monetário inválido"),
    }
}

pub fn parse_money_str(s: &str) -> Parsed<f64> {
    let cleaned: String = s
        .replace("R$", "")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    if cleaned.is_empty() {
        return if s.trim().is_empty() {
            Parsed::Missing
        } else {
            Parsed::invalid(s.trim(), "valor monetário inválido")
        };
    }

    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => Parsed::Value(v),
        _ => Parsed::invalid(s.trim(), "valor monetário inválido"),
    }
}

/// Parse a percentage cell: "15,5%" → 15.5.
pub fn parse_percentage(cell: &CellValue) -> Parsed<f64> {
    match cell {
        CellValue::Empty => Parsed::Missing,
        CellValue::Number(n) => Parsed::Value(*n),
        CellValue::Text(s) => {
            let cleaned = s.trim().trim_end_matches('%').trim().replace(',', ".");
            if cleaned.is_empty() {
                return Parsed::Missing;
            }
            match cleaned.parse::<f64>() {
                Ok(v) if v.is_finite() => Parsed::Value(v),
                _ => Parsed::invalid(s.trim(), "percentual inválido"),
            }
        }
        other => Parsed::invalid(other.to_string(), "percentual inválido"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // ==========================================================================
    // Dates
    // ==========================================================================

    #[test]
    fn test_parse_br_date() {
        assert_eq!(parse_date(&text("25/12/2024")), Parsed::Value(ymd(2024, 12, 25)));
        assert_eq!(parse_date(&text("05/01/2025 08:00")), Parsed::Value(ymd(2025, 1, 5)));
    }

    #[test]
    fn test_parse_iso_datetime_keeps_calendar_date() {
        assert_eq!(parse_date(&text("2024-12-25T00:00:00Z")), Parsed::Value(ymd(2024, 12, 25)));
        assert_eq!(parse_date(&text("2024-12-25")), Parsed::Value(ymd(2024, 12, 25)));
    }

    #[test]
    fn test_slash_dates_are_positional() {
        // 03/04 is the 3rd of April, never March 4th
        assert_eq!(parse_date(&text("03/04/2025")), Parsed::Value(ymd(2025, 4, 3)));
        assert!(parse_date(&text("12/25/2024")).is_invalid());
    }

    #[test]
    fn test_parse_excel_serial() {
        assert_eq!(parse_date(&CellValue::Number(45651.0)), Parsed::Value(ymd(2024, 12, 25)));
        assert_eq!(parse_date(&CellValue::Number(25569.0)), Parsed::Value(ymd(1970, 1, 1)));
    }

    #[test]
    fn test_parse_native_date() {
        let dt = NaiveDateTime::parse_from_str("2024-12-25 13:45:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(parse_date(&CellValue::Date(dt)), Parsed::Value(ymd(2024, 12, 25)));
    }

    #[test]
    fn test_unparseable_dates() {
        assert_eq!(parse_date(&CellValue::Empty), Parsed::Missing);
        assert!(parse_date(&text("dezembro")).is_invalid());
        assert!(parse_date(&text("31/02/2024")).is_invalid());
        assert!(parse_date(&text("25/12/24")).is_invalid());
        assert!(parse_date(&CellValue::Number(f64::NAN)).is_invalid());
    }

    // ==========================================================================
    // Money
    // ==========================================================================

    #[test]
    fn test_parse_money_br_format() {
        assert_eq!(parse_money(&text("R$ 1.234,56")), Parsed::Value(1234.56));
        assert_eq!(parse_money(&text("R$1.000.000,00")), Parsed::Value(1_000_000.0));
        assert_eq!(parse_money(&text("89,9")), Parsed::Value(89.9));
        assert_eq!(parse_money(&text("-R$ 10,00")), Parsed::Value(-10.0));
    }

    #[test]
    fn test_parse_money_passes_numbers_through() {
        assert_eq!(parse_money(&CellValue::Number(1500.5)), Parsed::Value(1500.5));
    }

    #[test]
    fn test_parse_money_distinguishes_missing_from_invalid() {
        assert_eq!(parse_money(&text("   ")), Parsed::Missing);
        assert!(parse_money(&text("R$")).is_invalid());
        assert!(parse_money(&text("a combinar")).is_invalid());
    }

    // ==========================================================================
    // Percentages
    // ==========================================================================

    #[test]
    fn test_parse_percentage() {
        assert_eq!(parse_percentage(&text("15,5%")), Parsed::Value(15.5));
        assert_eq!(parse_percentage(&text("20.25")), Parsed::Value(20.25));
        assert_eq!(parse_percentage(&CellValue::Number(12.0)), Parsed::Value(12.0));
        assert!(parse_percentage(&text("n/a")).is_invalid());
        assert_eq!(parse_percentage(&CellValue::Empty), Parsed::Missing);
    }
}
