// Utility helpers for parsing and formatting.
//
// This module centralizes all the "dirty" CSV/number handling of the BAAC
// extracts so the rest of the code can assume clean, typed values.
use num_format::{Locale, ToFormattedString};

/// Coordinate value written when a latitude/longitude cannot be parsed.
pub const COORD_SENTINEL: f64 = -1.0;

/// Parse a categorical code such as `grav` or `surf`.
///
/// Blank or non-numeric values come back as `None`; the codebook lookup
/// treats them the same as an unmapped code.
pub fn parse_code(s: Option<&str>) -> Option<i32> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<i32>().ok()
}

/// Coerce the `dep` field to an integer. Blank and non-numeric values
/// (Corsica's `2A`/`2B` included) become `0`.
pub fn parse_department(s: Option<&str>) -> i32 {
    parse_code(s).unwrap_or(0)
}

/// Normalize a locale-formatted coordinate into `f64`.
///
/// - Replaces the decimal comma with a decimal point.
/// - Drops every whitespace character, including stray inner spaces.
/// - Returns [`COORD_SENTINEL`] for anything that is not a finite number.
///
/// Re-running this on its own output yields the same value.
pub fn parse_coordinate(s: &str) -> f64 {
    let cleaned: String = s
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => COORD_SENTINEL,
    }
}

/// Split the packed `hrmn` time into `(hour, minute)`.
///
/// Recent extracts use `HH:MM`; older ones pack the time as a bare integer
/// (`1435`, or `5` for 00:05).
pub fn split_hour_minute(s: &str) -> Option<(u32, u32)> {
    let s = s.trim();
    let (hour, minute) = match s.split_once(':') {
        Some((h, m)) => (h.trim().parse::<u32>().ok()?, m.trim().parse::<u32>().ok()?),
        None => {
            let packed = s.parse::<u32>().ok()?;
            (packed / 100, packed % 100)
        }
    };
    if hour < 24 && minute < 60 {
        Some((hour, minute))
    } else {
        None
    }
}

/// Expand a possibly two-digit year (`19` in pre-2019 extracts) to four
/// digits. Thousands separators are tolerated.
pub fn normalize_year(s: Option<&str>) -> Option<i32> {
    let s = s?.trim().replace(',', "");
    let year = s.parse::<i32>().ok()?;
    if (0..100).contains(&year) {
        Some(2000 + year)
    } else {
        Some(year)
    }
}

/// Decode raw file bytes. Files that are not valid UTF-8 are read as
/// Latin-1, where every byte maps to the code point of the same value.
pub fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

/// Fixed-decimal rendering with `en` thousands separators, used for the
/// percentage and rescaled columns of the previews (`1,234,567.89`).
pub fn format_number(n: f64, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, n.abs());
    let (whole, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let grouped = whole
        .parse::<u64>()
        .map(|w| w.to_formatted_string(&Locale::en))
        .unwrap_or_else(|_| whole.to_string());
    let sign = if n < 0.0 { "-" } else { "" };
    if frac.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{}", sign, grouped, frac)
    }
}

/// Counts in console messages (`9,855 rows read`).
pub fn format_int<T: ToFormattedString>(n: T) -> String {
    n.to_formatted_string(&Locale::en)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn department_coercion() {
        assert_eq!(parse_department(Some("75")), 75);
        assert_eq!(parse_department(Some(" 13 ")), 13);
        assert_eq!(parse_department(Some("")), 0);
        assert_eq!(parse_department(Some("2A")), 0);
        assert_eq!(parse_department(None), 0);
    }

    #[test]
    fn coordinate_uses_decimal_comma_and_strips_spaces() {
        assert_eq!(parse_coordinate("48,8566"), 48.8566);
        assert_eq!(parse_coordinate(" 2, 3522 "), 2.3522);
        assert_eq!(parse_coordinate("-0,5792"), -0.5792);
    }

    #[test]
    fn malformed_coordinate_maps_to_sentinel() {
        assert_eq!(parse_coordinate("abc"), COORD_SENTINEL);
        assert_eq!(parse_coordinate(""), COORD_SENTINEL);
        assert_eq!(parse_coordinate("48,85,66"), COORD_SENTINEL);
        assert_eq!(parse_coordinate("NaN"), COORD_SENTINEL);
    }

    #[test]
    fn coordinate_cleaning_is_idempotent() {
        for raw in ["48,8566", "-0,5792", "garbage", "43.7102", " 7 ,262"] {
            let once = parse_coordinate(raw);
            let twice = parse_coordinate(&once.to_string());
            assert_eq!(once, twice, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn time_split() {
        assert_eq!(split_hour_minute("14:35"), Some((14, 35)));
        assert_eq!(split_hour_minute("00:05"), Some((0, 5)));
        assert_eq!(split_hour_minute("1435"), Some((14, 35)));
        assert_eq!(split_hour_minute("5"), Some((0, 5)));
        assert_eq!(split_hour_minute("25:00"), None);
        assert_eq!(split_hour_minute("ab:cd"), None);
    }

    #[test]
    fn two_digit_years_are_expanded() {
        assert_eq!(normalize_year(Some("17")), Some(2017));
        assert_eq!(normalize_year(Some("2021")), Some(2021));
        assert_eq!(normalize_year(Some("2,019")), Some(2019));
        assert_eq!(normalize_year(Some("")), None);
    }

    #[test]
    fn latin1_fallback() {
        let bytes = vec![b'S', 0xE8, b'v', b'e'];
        assert_eq!(decode_text(bytes), "Sève");
        assert_eq!(decode_text("déjà".as_bytes().to_vec()), "déjà");
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_number(-0.5, 1), "-0.5");
        assert_eq!(format_number(0.0, 3), "0.000");
        assert_eq!(format_int(9855usize), "9,855");
    }
}
