//! Decimal format patterns for `format-number()`.
use crate::error::{Result, XPathError};
use serde::{Deserialize, Serialize};

/// The symbols a decimal format uses, as declared by `xsl:decimal-format`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecimalFormat {
    pub decimal_separator: char,
    pub grouping_separator: char,
    pub infinity: String,
    pub minus_sign: char,
    pub nan: String,
    pub percent: char,
    pub per_mille: char,
    pub zero_digit: char,
    pub digit: char,
    pub pattern_separator: char,
}

impl Default for DecimalFormat {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            grouping_separator: ',',
            infinity: "Infinity".to_string(),
            minus_sign: '-',
            nan: "NaN".to_string(),
            percent: '%',
            per_mille: '\u{2030}',
            zero_digit: '0',
            digit: '#',
            pattern_separator: ';',
        }
    }
}

#[derive(Debug, Default)]
struct SubPattern {
    prefix: String,
    suffix: String,
    min_integer: usize,
    min_fraction: usize,
    max_fraction: usize,
    grouping: Option<usize>,
    multiplier: f64,
}

impl DecimalFormat {
    fn is_body_char(&self, c: char) -> bool {
        c == self.digit
            || c == self.zero_digit
            || c == self.decimal_separator
            || c == self.grouping_separator
    }

    fn parse_sub_pattern(&self, pattern: &str, whole: &str) -> Result<SubPattern> {
        let invalid = |why: &str| {
            XPathError::evaluation(format!(
                "Unable to interpret format pattern {} ({})",
                whole, why
            ))
        };
        let chars: Vec<char> = pattern.chars().collect();
        let start = chars
            .iter()
            .position(|&c| self.is_body_char(c))
            .ok_or_else(|| invalid("no digits in pattern"))?;
        let end = chars[start..]
            .iter()
            .position(|&c| !self.is_body_char(c))
            .map_or(chars.len(), |p| start + p);
        let prefix: String = chars[..start].iter().collect();
        let suffix: String = chars[end..].iter().collect();
        let body = &chars[start..end];

        let mut sub = SubPattern {
            multiplier: 1.0,
            ..SubPattern::default()
        };
        for c in prefix.chars().chain(suffix.chars()) {
            if c == self.percent {
                sub.multiplier = 100.0;
            } else if c == self.per_mille {
                sub.multiplier = 1000.0;
            }
        }
        sub.prefix = prefix;
        sub.suffix = suffix;

        let decimal_at = body.iter().position(|&c| c == self.decimal_separator);
        if body.iter().filter(|&&c| c == self.decimal_separator).count() > 1 {
            return Err(invalid("more than one decimal separator"));
        }
        let (integer, fraction) = match decimal_at {
            Some(i) => (&body[..i], &body[i + 1..]),
            None => (body, &body[..0]),
        };
        if fraction.contains(&self.grouping_separator) {
            return Err(invalid("grouping separator in fraction"));
        }
        sub.min_integer = integer.iter().filter(|&&c| c == self.zero_digit).count();
        sub.min_fraction = fraction.iter().filter(|&&c| c == self.zero_digit).count();
        sub.max_fraction = fraction
            .iter()
            .filter(|&&c| c == self.zero_digit || c == self.digit)
            .count();
        if let Some(last) = integer.iter().rposition(|&c| c == self.grouping_separator) {
            let size = integer.len() - last - 1;
            if size > 0 {
                sub.grouping = Some(size);
            }
        }
        Ok(sub)
    }

    fn localise_digits(&self, digits: &str) -> String {
        let zero = self.zero_digit as u32;
        digits
            .chars()
            .map(|c| match c.to_digit(10) {
                Some(d) => char::from_u32(zero + d).unwrap_or(c),
                None => c,
            })
            .collect()
    }

    /// Formats `value` with `pattern`.
    pub fn format(&self, value: f64, pattern: &str) -> Result<String> {
        let mut parts = pattern.split(self.pattern_separator);
        let positive_text = parts.next().unwrap_or_default();
        let negative_text = parts.next();
        if parts.next().is_some() {
            return Err(XPathError::evaluation(format!(
                "Unable to interpret format pattern {} (too many sub-patterns)",
                pattern
            )));
        }
        let positive = self.parse_sub_pattern(positive_text, pattern)?;
        if value.is_nan() {
            return Ok(self.nan.clone());
        }
        let negative = value < 0.0;
        let (prefix, suffix) = match (negative, negative_text) {
            (true, Some(text)) => {
                let sub = self.parse_sub_pattern(text, pattern)?;
                (sub.prefix, sub.suffix)
            }
            (true, None) => (
                format!("{}{}", self.minus_sign, positive.prefix),
                positive.suffix.clone(),
            ),
            (false, _) => (positive.prefix.clone(), positive.suffix.clone()),
        };

        let magnitude = value.abs() * positive.multiplier;
        if magnitude.is_infinite() {
            return Ok(format!("{}{}{}", prefix, self.infinity, suffix));
        }

        let fixed = format!("{:.*}", positive.max_fraction, magnitude);
        let (integer, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
        let mut fraction = fraction.to_string();
        while fraction.len() > positive.min_fraction && fraction.ends_with('0') {
            fraction.pop();
        }
        let mut integer = integer.trim_start_matches('0').to_string();
        while integer.len() < positive.min_integer {
            integer.insert(0, '0');
        }
        if integer.is_empty() && fraction.is_empty() {
            integer.push('0');
        }

        let mut grouped = String::new();
        let digits: Vec<char> = self.localise_digits(&integer).chars().collect();
        for (i, c) in digits.iter().enumerate() {
            let remaining = digits.len() - i;
            if i > 0 && positive.grouping.is_some_and(|g| remaining % g == 0) {
                grouped.push(self.grouping_separator);
            }
            grouped.push(*c);
        }

        let mut out = prefix;
        out.push_str(&grouped);
        if !fraction.is_empty() {
            out.push(self.decimal_separator);
            out.push_str(&self.localise_digits(&fraction));
        }
        out.push_str(&suffix);
        Ok(out)
    }
}
