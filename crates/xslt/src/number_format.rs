//! `xsl:decimal-format` symbols and the picture-string formatting behind
//! `format-number()`.

/// The symbols of one decimal format.
#[derive(Debug, Clone, PartialEq)]
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
struct SubPicture {
    prefix: String,
    suffix: String,
    min_int: usize,
    grouping: Option<usize>,
    min_frac: usize,
    max_frac: usize,
    multiplier: f64,
}

impl DecimalFormat {
    fn is_active(&self, c: char) -> bool {
        c == self.digit || c == self.zero_digit || c == self.grouping_separator || c == self.decimal_separator
    }

    fn parse_sub_picture(&self, picture: &str) -> Result<SubPicture, String> {
        let chars: Vec<char> = picture.chars().collect();
        let start = chars.iter().position(|&c| self.is_active(c)).ok_or_else(|| {
            format!("Picture '{}' has no digit placeholder", picture)
        })?;
        let end = chars[start..]
            .iter()
            .position(|&c| !self.is_active(c))
            .map_or(chars.len(), |p| start + p);
        let prefix: String = chars[..start].iter().collect();
        let suffix: String = chars[end..].iter().collect();
        if suffix.chars().any(|c| self.is_active(c)) {
            return Err(format!("Picture '{}' has digits after its suffix", picture));
        }
        let body = &chars[start..end];

        let decimal_at = body.iter().position(|&c| c == self.decimal_separator);
        let (int_part, frac_part) = match decimal_at {
            Some(i) => (&body[..i], &body[i + 1..]),
            None => (body, &body[body.len()..]),
        };
        if frac_part.contains(&self.decimal_separator) {
            return Err(format!("Picture '{}' has more than one decimal separator", picture));
        }
        if frac_part.contains(&self.grouping_separator) {
            return Err(format!("Picture '{}' groups the fraction", picture));
        }
        if !body.iter().any(|&c| c == self.digit || c == self.zero_digit) {
            return Err(format!("Picture '{}' has no digit placeholder", picture));
        }

        let mut seen_zero = false;
        let mut min_int = 0;
        for &c in int_part {
            if c == self.zero_digit {
                seen_zero = true;
                min_int += 1;
            } else if c == self.digit && seen_zero {
                return Err(format!("Picture '{}' has '{}' after '{}'", picture, self.digit, self.zero_digit));
            }
        }
        let grouping = int_part
            .iter()
            .rposition(|&c| c == self.grouping_separator)
            .map(|g| int_part.len() - g - 1)
            .filter(|&size| size > 0);

        let mut seen_optional = false;
        let mut min_frac = 0;
        let mut max_frac = 0;
        for &c in frac_part {
            if c == self.zero_digit {
                if seen_optional {
                    return Err(format!("Picture '{}' has '{}' after '{}'", picture, self.zero_digit, self.digit));
                }
                min_frac += 1;
            } else {
                seen_optional = true;
            }
            max_frac += 1;
        }

        let affixes = format!("{}{}", prefix, suffix);
        let multiplier = if affixes.contains(self.percent) {
            100.0
        } else if affixes.contains(self.per_mille) {
            1000.0
        } else {
            1.0
        };
        Ok(SubPicture {
            prefix,
            suffix,
            min_int,
            grouping,
            min_frac,
            max_frac,
            multiplier,
        })
    }

    /// Formats `value` with `picture`. An error names what is wrong with the picture.
    pub fn format(&self, value: f64, picture: &str) -> Result<String, String> {
        let mut parts = picture.split(self.pattern_separator);
        let positive_text = parts.next().unwrap_or_default();
        let negative_text = parts.next();
        if parts.next().is_some() {
            return Err(format!("Picture '{}' has more than two sub-pictures", picture));
        }
        let positive = self.parse_sub_picture(positive_text)?;
        let negative = negative_text.map(|t| self.parse_sub_picture(t)).transpose()?;

        if value.is_nan() {
            return Ok(self.nan.clone());
        }
        let (prefix, suffix) = if value < 0.0 {
            match &negative {
                Some(neg) => (neg.prefix.clone(), neg.suffix.clone()),
                None => (format!("{}{}", self.minus_sign, positive.prefix), positive.suffix.clone()),
            }
        } else {
            (positive.prefix.clone(), positive.suffix.clone())
        };

        let scaled = value.abs() * positive.multiplier;
        if scaled.is_infinite() {
            return Ok(format!("{}{}{}", prefix, self.infinity, suffix));
        }
        Ok(format!("{}{}{}", prefix, self.digits(scaled, &positive), suffix))
    }

    fn digits(&self, value: f64, sub: &SubPicture) -> String {
        let fixed = format!("{:.*}", sub.max_frac, value);
        let (int_digits, frac_digits) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));

        let mut frac: String = frac_digits.to_string();
        while frac.len() > sub.min_frac && frac.ends_with('0') {
            frac.pop();
        }
        let mut int = int_digits.trim_start_matches('0').to_string();
        while int.len() < sub.min_int {
            int.insert(0, '0');
        }
        if int.is_empty() && frac.is_empty() {
            int.push('0');
        }

        let mut out = String::new();
        let count = int.chars().count();
        for (i, c) in int.chars().enumerate() {
            if let Some(size) = sub.grouping {
                if i > 0 && (count - i) % size == 0 {
                    out.push(self.grouping_separator);
                }
            }
            out.push(self.localize(c));
        }
        if !frac.is_empty() {
            out.push(self.decimal_separator);
            out.extend(frac.chars().map(|c| self.localize(c)));
        }
        out
    }

    fn localize(&self, digit: char) -> char {
        let offset = digit.to_digit(10).unwrap_or(0);
        char::from_u32(self.zero_digit as u32 + offset).unwrap_or(digit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(value: f64, picture: &str) -> String {
        DecimalFormat::default().format(value, picture).unwrap()
    }

    #[test]
    fn test_integer_and_fraction_digits() {
        assert_eq!(fmt(1234.5, "#,##0.00"), "1,234.50");
        assert_eq!(fmt(1234567.891, "#,###.##"), "1,234,567.89");
        assert_eq!(fmt(0.5, "#.##"), ".5");
        assert_eq!(fmt(0.0, "#"), "0");
        assert_eq!(fmt(7.0, "000"), "007");
        assert_eq!(fmt(2.0, "0.###"), "2");
    }

    #[test]
    fn test_affixes_and_multipliers() {
        assert_eq!(fmt(0.256, "#0.0%"), "25.6%");
        assert_eq!(fmt(0.5, "0\u{2030}"), "500\u{2030}");
        assert_eq!(fmt(12.0, "$#0.00 USD"), "$12.00 USD");
    }

    #[test]
    fn test_negative_numbers() {
        assert_eq!(fmt(-5.0, "#0"), "-5");
        assert_eq!(fmt(-5.0, "#0;(#0)"), "(5)");
        assert_eq!(fmt(5.0, "#0;(#0)"), "5");
    }

    #[test]
    fn test_special_values() {
        assert_eq!(fmt(f64::NAN, "#0.0"), "NaN");
        assert_eq!(fmt(f64::INFINITY, "#0"), "Infinity");
        assert_eq!(fmt(f64::NEG_INFINITY, "#0"), "-Infinity");
    }

    #[test]
    fn test_custom_symbols() {
        let european = DecimalFormat {
            decimal_separator: ',',
            grouping_separator: '.',
            ..DecimalFormat::default()
        };
        assert_eq!(european.format(1234.5, "#.##0,00").unwrap(), "1.234,50");
    }

    #[test]
    fn test_malformed_pictures() {
        let format = DecimalFormat::default();
        assert!(format.format(1.0, "abc").is_err());
        assert!(format.format(1.0, "0#").is_err());
        assert!(format.format(1.0, "#.#0").is_err());
        assert!(format.format(1.0, "#.0.0").is_err());
        assert!(format.format(1.0, "#;#;#").is_err());
    }
}
