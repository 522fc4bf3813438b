//! Number conversions and the rounding rules shared by `round()` and `substring()`.

/// Converts a string to a number. Surrounding whitespace is ignored; anything that is not a
/// decimal number (optionally with an exponent) gives NaN. `NaN`, `Infinity` and
/// `-Infinity` are accepted as written.
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim_matches(|c: char| c <= ' ');
    match trimmed {
        "NaN" => return f64::NAN,
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    let well_formed = !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
        && trimmed.chars().any(|c| c.is_ascii_digit());
    if !well_formed {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// Formats a number as XPath requires: no exponent, no trailing `.0`, `-0` printed as `0`,
/// and magnitudes of 2^53 and above printed as their exact integer expansion.
pub fn number_to_string(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }
    const EXACT_LIMIT: f64 = (1u64 << 53) as f64;
    if value.abs() >= EXACT_LIMIT {
        return format!("{:.0}", value);
    }
    format!("{}", value)
}

/// XPath `round()`: halves round towards positive infinity, and values in `(-0.5, 0)` round
/// to negative zero.
pub fn round(value: f64) -> f64 {
    if value.is_nan() || value.is_infinite() || value == 0.0 {
        return value;
    }
    if value > -0.5 && value < 0.0 {
        return -0.0;
    }
    (value + 0.5).floor()
}

pub fn boolean_to_number(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

pub fn number_to_boolean(value: f64) -> bool {
    value != 0.0 && !value.is_nan()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number(" 12.5 "), 12.5);
        assert_eq!(string_to_number("-3"), -3.0);
        assert_eq!(string_to_number(".5"), 0.5);
        assert_eq!(string_to_number("1e3"), 1000.0);
        assert!(string_to_number("abc").is_nan());
        assert!(string_to_number("").is_nan());
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("NaN").is_nan());
        assert_eq!(string_to_number("Infinity"), f64::INFINITY);
    }

    #[test]
    fn test_number_to_string() {
        assert_eq!(number_to_string(7.0), "7");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.5), "0.5");
        assert_eq!(number_to_string(1e-7), "0.0000001");
        assert_eq!(number_to_string(123456.789), "123456.789");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(number_to_string(1e20), "100000000000000000000");
        assert_eq!(number_to_string(9007199254740992.0), "9007199254740992");
    }

    #[test]
    fn test_round() {
        assert_eq!(round(2.5), 3.0);
        assert_eq!(round(-2.5), -2.0);
        assert_eq!(round(2.4), 2.0);
        let r = round(-0.2);
        assert_eq!(r, 0.0);
        assert!(r.is_sign_negative());
        assert!(round(f64::NAN).is_nan());
        assert_eq!(round(f64::INFINITY), f64::INFINITY);
    }
}
