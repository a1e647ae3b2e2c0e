// src/format.rs
//! Render-time number formatting. Animated values stay full precision until
//! they hit this module.

use num_format::{Locale, ToFormattedString};

/// Shown for values that cannot be rendered (NaN, infinities).
pub const PLACEHOLDER: &str = "--";

#[derive(Debug, Clone)]
pub struct NumberFormat {
    pub locale: Locale,
    pub fraction_digits: usize,
    pub prefix: String,
    pub suffix: String,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            locale: Locale::en,
            fraction_digits: 0,
            prefix: String::new(),
            suffix: String::new(),
        }
    }
}

impl NumberFormat {
    pub fn with_digits(fraction_digits: usize) -> Self {
        Self {
            fraction_digits,
            ..Self::default()
        }
    }

    pub fn locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// `1234567.891` with 2 digits -> `1,234,567.89` (en).
    pub fn render(&self, value: f64) -> String {
        if !value.is_finite() {
            return PLACEHOLDER.to_string();
        }
        let fixed = format!("{:.*}", self.fraction_digits, value.abs());
        let (int_part, frac_part) = match fixed.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (fixed.as_str(), None),
        };
        let grouped = int_part
            .parse::<u128>()
            .map(|n| n.to_formatted_string(&self.locale))
            .unwrap_or_else(|_| int_part.to_string());

        // Rounded to zero means no sign, never "-0.00".
        let is_zero = fixed.bytes().all(|b| b == b'0' || b == b'.');
        let sign = if value < 0.0 && !is_zero {
            self.locale.minus_sign()
        } else {
            ""
        };

        let extra = self.prefix.len() + self.suffix.len() + 8;
        let mut out = String::with_capacity(fixed.len() + extra);
        out.push_str(sign);
        out.push_str(&self.prefix);
        out.push_str(&grouped);
        if let Some(frac) = frac_part {
            out.push_str(self.locale.decimal());
            out.push_str(frac);
        }
        out.push_str(&self.suffix);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_and_rounds() {
        let f = NumberFormat::with_digits(2);
        assert_eq!(f.render(1_234_567.891), "1,234,567.89");
        assert_eq!(f.render(0.5), "0.50");
        assert_eq!(NumberFormat::default().render(2_876_179.4), "2,876,179");
    }

    #[test]
    fn price_precision() {
        let f = NumberFormat::with_digits(8).prefix("$");
        assert_eq!(f.render(0.801_234_57), "$0.80123457");
    }

    #[test]
    fn negative_and_negative_zero() {
        let f = NumberFormat::with_digits(1);
        assert_eq!(f.render(-1_500.26), "-1,500.3");
        assert_eq!(f.render(-0.01), "0.0");
    }

    #[test]
    fn other_locale_separators() {
        let f = NumberFormat::with_digits(2).locale(Locale::de);
        assert_eq!(f.render(1_234.5), "1.234,50");
    }

    #[test]
    fn suffix_and_non_finite() {
        let f = NumberFormat::default().suffix(" CL8Y");
        assert_eq!(f.render(42.0), "42 CL8Y");
        assert_eq!(f.render(f64::NAN), PLACEHOLDER);
        assert_eq!(f.render(f64::INFINITY), PLACEHOLDER);
    }
}
