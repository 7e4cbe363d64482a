use chrono::NaiveDateTime;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // 1-0:1.8.1(000123.456*kWh)
    static ref OBIS_CODE: Regex = Regex::new(r"(\d+-\d+:\d+\.\d+\.\d+)\(").unwrap();
    // First decimal group, closed by the unit star or the parenthesis
    static ref DECIMAL_VALUE: Regex = Regex::new(r"\((\d+\.\d+)[*)]").unwrap();
    // (201024220000S) with optional DST flag
    static ref TIMESTAMP_VALUE: Regex = Regex::new(r"\((\d{12})[SW]?\)").unwrap();
}

/// Returns the OBIS reference code found at the start of a data line, if any.
pub fn extract_obis_code(line: &str) -> Option<&str> {
    OBIS_CODE
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Returns the first decimal value of a line, ignoring groups without a decimal
/// point (serial numbers, timestamps).
pub fn extract_decimal(line: &str) -> Option<f64> {
    let caps = DECIMAL_VALUE.captures(line)?;
    caps.get(1)?.as_str().parse::<f64>().ok()
}

/// Returns the first `YYMMDDhhmmss` group of a line as meter local time.
pub fn extract_timestamp(line: &str) -> Option<NaiveDateTime> {
    let caps = TIMESTAMP_VALUE.captures(line)?;
    NaiveDateTime::parse_from_str(caps.get(1)?.as_str(), "%y%m%d%H%M%S").ok()
}

pub fn extract_unit(value_content: &str) -> Option<String> {
    if let Some(star_pos) = value_content.rfind('*') {
        let unit = value_content[star_pos + 1..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>();
        if !unit.is_empty() {
            return Some(unit);
        }
    }
    None
}
