//! Numeric output formatting.
//!
//! The default output style matches C's `%g` with 14 significant digits.
//! `--round=N` switches to fixed decimals, and `--format=FMT` accepts a
//! printf-style floating-point spec which is validated once at startup and
//! rendered natively (conversions `e f g a` and their uppercase variants).

use anyhow::{bail, Result};

use crate::config::NumericFormat;

/// Format a value with the configured numeric output style.
pub fn format_number(v: f64, format: &NumericFormat) -> String {
    match format {
        NumericFormat::General { precision } => format_general(v, *precision, true),
        NumericFormat::Fixed { decimals } => {
            if let Some(s) = nonfinite(v, false) {
                return s;
            }
            format!("{:.*}", decimals, v)
        }
        NumericFormat::Custom(fmt) => fmt.render(v),
    }
}

fn nonfinite(v: f64, upper: bool) -> Option<String> {
    if v.is_nan() {
        return Some(if upper { "NAN" } else { "nan" }.to_string());
    }
    if v.is_infinite() {
        let s = match (v > 0.0, upper) {
            (true, false) => "inf",
            (true, true) => "INF",
            (false, false) => "-inf",
            (false, true) => "-INF",
        };
        return Some(s.to_string());
    }
    None
}

/// `%g`-style formatting: `precision` significant digits, scientific
/// notation when the exponent falls outside `[-4, precision)`, trailing
/// zeros removed unless `trim` is disabled (printf's `#` flag).
pub fn format_general(v: f64, precision: usize, trim: bool) -> String {
    if let Some(s) = nonfinite(v, false) {
        return s;
    }
    let precision = precision.max(1);

    // Round to the requested significant digits first; the exponent of the
    // rounded value decides between fixed and scientific styles.
    let sci = format!("{:.*e}", precision - 1, v);
    let exp = exponent_of(&sci);

    if exp < -4 || exp >= precision as i64 {
        let mantissa = sci.split('e').next().unwrap_or("0");
        let mantissa = if trim {
            trim_fraction(mantissa)
        } else {
            mantissa.to_string()
        };
        format!("{}{}", mantissa, format_exponent(exp, false))
    } else {
        let decimals = (precision as i64 - 1 - exp).max(0) as usize;
        let fixed = format!("{:.*}", decimals, v);
        if trim {
            trim_fraction(&fixed)
        } else {
            fixed
        }
    }
}

fn exponent_of(sci: &str) -> i64 {
    sci.rsplit('e')
        .next()
        .and_then(|e| e.parse::<i64>().ok())
        .unwrap_or(0)
}

/// `e+05`-style exponent suffix with at least two digits.
fn format_exponent(exp: i64, upper: bool) -> String {
    let e = if upper { 'E' } else { 'e' };
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{}{}{:02}", e, sign, exp.abs())
}

fn trim_fraction(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

/// A validated printf-style floating-point format.
#[derive(Debug, Clone, Default)]
pub struct FloatFormat {
    prefix: String,
    suffix: String,
    left_align: bool,
    plus_sign: bool,
    space_sign: bool,
    zero_pad: bool,
    alt_form: bool,
    width: usize,
    precision: Option<usize>,
    conv: char,
}

impl FloatFormat {
    /// Parse and validate a user format string. Exactly one `%` directive
    /// of type `e f g a E F G A` is allowed; `%%` escapes are literal.
    pub fn parse(fmt: &str) -> Result<Self> {
        let bytes = fmt.as_bytes();
        let mut i = 0;
        let mut prefix = String::new();

        // literal prefix, un-escaping %%
        loop {
            match bytes.get(i) {
                None => bail!("format '{fmt}' has no % directive"),
                Some(b'%') => {
                    if bytes.get(i + 1) == Some(&b'%') {
                        prefix.push('%');
                        i += 2;
                    } else {
                        i += 1;
                        break;
                    }
                }
                Some(&b) => {
                    prefix.push(b as char);
                    i += 1;
                }
            }
        }

        let mut out = FloatFormat {
            prefix,
            ..Default::default()
        };

        while let Some(&b) = bytes.get(i) {
            match b {
                b'-' => out.left_align = true,
                b'+' => out.plus_sign = true,
                b' ' => out.space_sign = true,
                b'0' => out.zero_pad = true,
                b'#' => out.alt_form = true,
                // thousands grouping is a no-op in the C locale
                b'\'' => {}
                _ => break,
            }
            i += 1;
        }

        let width_start = i;
        while bytes.get(i).is_some_and(|b| b.is_ascii_digit()) {
            i += 1;
        }
        if i > width_start {
            out.width = fmt[width_start..i].parse().unwrap_or(0);
        }

        if bytes.get(i) == Some(&b'.') {
            i += 1;
            let prec_start = i;
            while bytes.get(i).is_some_and(|b| b.is_ascii_digit()) {
                i += 1;
            }
            out.precision = Some(fmt[prec_start..i].parse().unwrap_or(0));
        }

        let conv = match bytes.get(i) {
            None => bail!("format '{fmt}' missing valid type after '%'"),
            Some(&b) => b as char,
        };
        if !"efgaEFGA".contains(conv) {
            bail!("format '{fmt}' has unknown/invalid type %{conv} directive");
        }
        out.conv = conv;
        i += 1;

        // literal suffix; any further non-escaped % is an error
        while let Some(&b) = bytes.get(i) {
            if b == b'%' {
                if bytes.get(i + 1) == Some(&b'%') {
                    out.suffix.push('%');
                    i += 2;
                    continue;
                }
                bail!("format '{fmt}' has too many % directives");
            }
            out.suffix.push(b as char);
            i += 1;
        }

        Ok(out)
    }

    pub fn render(&self, v: f64) -> String {
        let upper = self.conv.is_ascii_uppercase();
        let body = match nonfinite(v, upper) {
            Some(s) => s,
            None => self.render_finite(v, upper),
        };
        let padded = self.pad(body);
        format!("{}{}{}", self.prefix, padded, self.suffix)
    }

    fn render_finite(&self, v: f64, upper: bool) -> String {
        let neg = v.is_sign_negative();
        let mag = v.abs();
        let digits = match self.conv.to_ascii_lowercase() {
            'f' => format!("{:.*}", self.precision.unwrap_or(6), mag),
            'e' => {
                let prec = self.precision.unwrap_or(6);
                let sci = format!("{:.*e}", prec, mag);
                let mantissa = sci.split('e').next().unwrap_or("0").to_string();
                format!("{}{}", mantissa, format_exponent(exponent_of(&sci), upper))
            }
            'g' => {
                let prec = self.precision.unwrap_or(6).max(1);
                let s = format_general(mag, prec, !self.alt_form);
                if upper {
                    s.to_ascii_uppercase()
                } else {
                    s
                }
            }
            'a' => format_hex_float(mag, self.precision),
            _ => unreachable!("validated conversion"),
        };
        let digits = if upper && self.conv != 'G' {
            digits.to_ascii_uppercase()
        } else {
            digits
        };

        let sign = if neg {
            "-"
        } else if self.plus_sign {
            "+"
        } else if self.space_sign {
            " "
        } else {
            ""
        };
        format!("{sign}{digits}")
    }

    fn pad(&self, body: String) -> String {
        if body.len() >= self.width {
            return body;
        }
        let fill = self.width - body.len();
        if self.left_align {
            format!("{}{}", body, " ".repeat(fill))
        } else if self.zero_pad {
            // zero padding goes between the sign and the digits
            let (sign, rest) = match body.strip_prefix(['-', '+', ' ']) {
                Some(rest) => (&body[..1], rest),
                None => ("", body.as_str()),
            };
            format!("{}{}{}", sign, "0".repeat(fill), rest)
        } else {
            format!("{}{}", " ".repeat(fill), body)
        }
    }
}

/// C `%a`-style hexadecimal float of a non-negative finite value.
fn format_hex_float(v: f64, precision: Option<usize>) -> String {
    if v == 0.0 {
        return match precision {
            None | Some(0) => "0x0p+0".to_string(),
            Some(p) => format!("0x0.{}p+0", "0".repeat(p)),
        };
    }

    let bits = v.to_bits();
    let raw_exp = ((bits >> 52) & 0x7ff) as i64;
    let mut mantissa = bits & 0x000f_ffff_ffff_ffff;
    let (lead, exp) = if raw_exp == 0 {
        (0u64, -1022i64)
    } else {
        (1u64, raw_exp - 1023)
    };

    let mut lead = lead;
    if let Some(p) = precision {
        // round the 52-bit fraction to p hex digits (13 max), ties to even
        if p < 13 {
            let drop_bits = 52 - 4 * p as u32;
            let keep = mantissa >> drop_bits;
            let rem = mantissa & ((1u64 << drop_bits) - 1);
            let half = 1u64 << (drop_bits - 1);
            let mut keep = keep;
            if rem > half || (rem == half && keep & 1 == 1) {
                keep += 1;
            }
            if p > 0 && keep >> (4 * p as u32) != 0 {
                // carry into the leading digit
                keep = 0;
                lead += 1;
            } else if p == 0 && keep != 0 {
                lead += 1;
                keep = 0;
            }
            mantissa = keep << drop_bits;
        }
    }

    let mut hex = String::new();
    let mut m = mantissa;
    for shift in (0..13).rev() {
        let digit = (m >> (shift * 4)) & 0xf;
        hex.push(char::from_digit(digit as u32, 16).unwrap_or('0'));
        m &= (1u64 << (shift * 4)) - 1;
    }
    let frac = match precision {
        Some(p) => {
            let mut f = hex;
            f.truncate(p.min(13));
            while f.len() < p {
                f.push('0');
            }
            f
        }
        None => hex.trim_end_matches('0').to_string(),
    };

    let sign = if exp < 0 { '-' } else { '+' };
    if frac.is_empty() {
        format!("0x{}p{}{}", lead, sign, exp.abs())
    } else {
        format!("0x{}.{}p{}{}", lead, frac, sign, exp.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn general_trims_trailing_zeros() {
        assert_eq!(format_general(55.0, 14, true), "55");
        assert_eq!(format_general(5.5, 14, true), "5.5");
        assert_eq!(format_general(8.200000000000001, 14, true), "8.2");
        assert_eq!(format_general(0.0, 14, true), "0");
    }

    #[test]
    fn general_switches_to_scientific() {
        assert_eq!(format_general(1e20, 14, true), "1e+20");
        assert_eq!(format_general(0.00001, 14, true), "1e-05");
        assert_eq!(format_general(1234567.0, 3, true), "1.23e+06");
    }

    #[test]
    fn general_handles_nonfinite() {
        assert_eq!(format_general(f64::NAN, 14, true), "nan");
        assert_eq!(format_general(f64::INFINITY, 14, true), "inf");
        assert_eq!(format_general(f64::NEG_INFINITY, 14, true), "-inf");
    }

    #[test]
    fn fixed_decimals() {
        let fmt = NumericFormat::Fixed { decimals: 2 };
        assert_eq!(format_number(1.5, &fmt), "1.50");
        assert_eq!(format_number(-0.125, &fmt), "-0.12");
    }

    #[test]
    fn custom_format_round_trip() {
        let fmt = FloatFormat::parse("%.3f").unwrap();
        assert_eq!(fmt.render(2.5), "2.500");

        let fmt = FloatFormat::parse("%10.2f").unwrap();
        assert_eq!(fmt.render(3.5), "      3.50");

        let fmt = FloatFormat::parse("%-8.1f|").unwrap();
        assert_eq!(fmt.render(3.5), "3.5     |");

        let fmt = FloatFormat::parse("%+07.2f").unwrap();
        assert_eq!(fmt.render(3.5), "+003.50");
    }

    #[test]
    fn custom_scientific() {
        let fmt = FloatFormat::parse("%.2e").unwrap();
        assert_eq!(fmt.render(1234.5), "1.23e+03");
        let fmt = FloatFormat::parse("%.2E").unwrap();
        assert_eq!(fmt.render(1234.5), "1.23E+03");
    }

    #[test]
    fn percent_escapes_pass_through() {
        let fmt = FloatFormat::parse("%%|%.1f|%%").unwrap();
        assert_eq!(fmt.render(2.0), "%|2.0|%");
    }

    #[test]
    fn rejects_bad_formats() {
        assert!(FloatFormat::parse("no directive").is_err());
        assert!(FloatFormat::parse("%d").is_err());
        assert!(FloatFormat::parse("%.2f %.3f").is_err());
        assert!(FloatFormat::parse("%").is_err());
    }

    #[test]
    fn hex_float_basics() {
        assert_eq!(format_hex_float(1.0, None), "0x1p+0");
        assert_eq!(format_hex_float(255.5, None), "0x1.ffp+7");
        assert_eq!(format_hex_float(0.0, None), "0x0p+0");
    }
}
