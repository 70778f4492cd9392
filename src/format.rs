//! Value formatting
//!
//! Turns a reading value into tile text, either with the default rule for its
//! [`ReadingType`] or with a user-supplied printf-style spec.
//!
//! # Default rule
//!
//! The value is rounded to an integer and a unit suffix is appended according
//! to the type's [`FormatPolicy`]:
//!
//! | policy        | types          | suffix                                  |
//! |---------------|----------------|-----------------------------------------|
//! | `Temperature` | temperature    | `" °C"` or `" °F"` (from the unit)       |
//! | `Attached`    | usage          | the unit with no space (`"42%"`)        |
//! | `Spaced`      | everything else| `" " + unit`, nothing for an empty unit |
//!
//! # Custom specs
//!
//! Every verb in the spec receives the same value. Supported verbs are
//! `%f %F %e %E %g %G %v %d` with the flags `- + space 0 ,`, a width and a
//! precision; `%%` is a literal percent sign. The `,` flag groups the integer
//! part in threes (`%,.1f` of `1234567.89` is `1,234,567.9`). Anything the
//! parser does not understand is copied through as written.
//!
//! If the unit does not occur in the spec text, the default suffix is appended.
//!
//! A width or precision above [`MAX_FORMAT_NUMBER`] ends the spec with
//! `%!(NOVERB)`, as Go's fmt does. A reading of an unknown type shows
//! [`BAD_FORMAT`] unless a custom spec is set.
//!
//! ```
//! use hwinfo_deck::format::format_value;
//! use hwinfo_deck::types::ReadingType;
//!
//! assert_eq!(format_value(61.6, ReadingType::Temperature, "°C", None), "62 °C");
//! assert_eq!(format_value(1234.5, ReadingType::Clock, "MHz", Some("%,.1f")), "1,234.5 MHz");
//! assert_eq!(format_value(3.3, ReadingType::Voltage, "V", Some("%.2fV")), "3.30V");
//! ```

use crate::types::ReadingType;

/// Default text for readings whose type has no formatting rule
pub const BAD_FORMAT: &str = "Bad Format";

/// Largest width or precision accepted in a spec
pub const MAX_FORMAT_NUMBER: usize = 1_000_000;

const NO_VERB: &str = "%!(NOVERB)";

/// How the unit is attached to a default-formatted value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitSuffix {
    /// `" °C"` / `" °F"` picked from the unit, Celsius when unclear
    Temperature,
    /// Unit appended directly
    Attached,
    /// Unit appended after a space, omitted when empty
    Spaced,
}

/// Formatting policy of a reading type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatPolicy {
    pub suffix: UnitSuffix,
}

impl FormatPolicy {
    /// The suffix this policy appends for `unit`
    pub fn suffix_for(&self, unit: &str) -> String {
        match self.suffix {
            UnitSuffix::Temperature => {
                if unit.contains('C') {
                    " °C".to_string()
                } else if unit.contains('F') {
                    " °F".to_string()
                } else {
                    " °C".to_string()
                }
            }
            UnitSuffix::Attached => unit.to_string(),
            UnitSuffix::Spaced if unit.is_empty() => String::new(),
            UnitSuffix::Spaced => format!(" {}", unit),
        }
    }
}

impl ReadingType {
    /// How values of this type are suffixed by default
    pub fn format_policy(&self) -> FormatPolicy {
        let suffix = match self {
            ReadingType::Temperature => UnitSuffix::Temperature,
            ReadingType::Usage => UnitSuffix::Attached,
            _ => UnitSuffix::Spaced,
        };
        FormatPolicy { suffix }
    }
}

/// Format a reading value for display
pub fn format_value(value: f64, reading_type: ReadingType, unit: &str, spec: Option<&str>) -> String {
    let policy = reading_type.format_policy();
    match spec.filter(|s| !s.is_empty()) {
        None if matches!(reading_type, ReadingType::Unknown(_)) => BAD_FORMAT.to_string(),
        None => {
            let mut text = format_float(value, 'f', Some(0));
            text.push_str(&policy.suffix_for(unit));
            text
        }
        Some(spec) => {
            let mut text = apply_spec(spec, value);
            // An empty unit is contained in every spec
            if !spec.contains(unit) {
                text.push_str(&policy.suffix_for(unit));
            }
            text
        }
    }
}

/// Insert `,` between groups of three integer digits
///
/// A leading `-` is kept in front and the fractional part (after the first
/// `.`) is left untouched.
pub fn group_thousands(number: &str) -> String {
    let (int_part, frac_part) = match number.split_once('.') {
        Some((int_part, frac)) => (int_part, Some(frac)),
        None => (number, None),
    };
    let (sign, digits) = match int_part.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", int_part),
    };

    let mut out = String::with_capacity(number.len() + digits.len() / 3);
    out.push_str(sign);
    let n = digits.chars().count();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (n - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

// ==================== Spec Parsing ====================

#[derive(Debug, Default, Clone, Copy)]
struct Directive {
    left: bool,
    plus: bool,
    space: bool,
    zero: bool,
    group: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

/// Substitute `value` into every verb of `spec`
fn apply_spec(spec: &str, value: f64) -> String {
    let mut out = String::with_capacity(spec.len() + 16);
    let mut chars = spec.char_indices().peekable();

    while let Some((start, ch)) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }

        if let Some(&(_, '%')) = chars.peek() {
            chars.next();
            out.push('%');
            continue;
        }

        let mut directive = Directive::default();
        while let Some(&(_, flag)) = chars.peek() {
            match flag {
                '-' => directive.left = true,
                '+' => directive.plus = true,
                ' ' => directive.space = true,
                '0' => directive.zero = true,
                ',' => directive.group = true,
                '#' => {}
                _ => break,
            }
            chars.next();
        }
        let Ok(width) = take_number(&mut chars) else {
            out.push_str(NO_VERB);
            return out;
        };
        directive.width = width;
        if let Some(&(_, '.')) = chars.peek() {
            chars.next();
            let Ok(precision) = take_number(&mut chars) else {
                out.push_str(NO_VERB);
                return out;
            };
            directive.precision = Some(precision.unwrap_or(0));
        }

        match chars.next() {
            Some((end, verb)) => match render_verb(verb, value, &directive) {
                Some(text) => out.push_str(&text),
                None => out.push_str(&spec[start..end + verb.len_utf8()]),
            },
            None => out.push_str(&spec[start..]),
        }
    }
    out
}

/// Width or precision digits; `Err` when the number exceeds [`MAX_FORMAT_NUMBER`]
fn take_number(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
) -> Result<Option<usize>, ()> {
    let mut number: Option<usize> = None;
    while let Some(&(_, ch)) = chars.peek() {
        let Some(digit) = ch.to_digit(10) else {
            break;
        };
        let next = number.unwrap_or(0) * 10 + digit as usize;
        if next > MAX_FORMAT_NUMBER {
            return Err(());
        }
        number = Some(next);
        chars.next();
    }
    Ok(number)
}

fn render_verb(verb: char, value: f64, directive: &Directive) -> Option<String> {
    if !matches!(verb, 'f' | 'F' | 'e' | 'E' | 'g' | 'G' | 'v' | 'd') {
        return None;
    }
    if !value.is_finite() {
        // Infinities keep their sign, NaN has none; neither is zero padded
        let body = format_float(value, 'f', None);
        let plain = Directive {
            zero: false,
            ..*directive
        };
        return Some(pad("", &body, &plain));
    }

    let body = match verb {
        'f' | 'F' => format_float(value.abs(), 'f', Some(directive.precision.unwrap_or(6))),
        'e' | 'E' => format_float(value.abs(), verb, Some(directive.precision.unwrap_or(6))),
        'g' | 'G' => format_float(value.abs(), verb, directive.precision),
        'v' => format_float(value.abs(), 'g', directive.precision),
        'd' => format_float(value.abs(), 'f', Some(0)),
        _ => return None,
    };
    let body = if directive.group {
        group_thousands(&body)
    } else {
        body
    };

    let sign = if value.is_sign_negative() {
        "-"
    } else if directive.plus {
        "+"
    } else if directive.space {
        " "
    } else {
        ""
    };

    Some(pad(sign, &body, directive))
}

fn pad(sign: &str, body: &str, directive: &Directive) -> String {
    let len = sign.chars().count() + body.chars().count();
    let width = directive.width.unwrap_or(0);
    if len >= width {
        return format!("{}{}", sign, body);
    }
    let fill = width - len;
    if directive.left {
        format!("{}{}{}", sign, body, " ".repeat(fill))
    } else if directive.zero {
        format!("{}{}{}", sign, "0".repeat(fill), body)
    } else {
        format!("{}{}{}", " ".repeat(fill), sign, body)
    }
}

// ==================== Float Rendering ====================

/// Render a non-negative value with `verb` in Go's float notation
fn format_float(value: f64, verb: char, precision: Option<usize>) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    match verb {
        'f' => format!("{:.*}", precision.unwrap_or(6), value),
        'e' | 'E' => {
            let text = go_exponent(&format!("{:.*e}", precision.unwrap_or(6), value));
            if verb == 'E' {
                text.to_uppercase()
            } else {
                text
            }
        }
        'g' | 'G' => {
            let text = format_general(value, precision);
            if verb == 'G' {
                text.to_uppercase()
            } else {
                text
            }
        }
        _ => format!("{}", value),
    }
}

/// Rewrite Rust's `1.5e6` exponent into Go's `1.5e+06`
fn go_exponent(rust: &str) -> String {
    match rust.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => rust.to_string(),
    }
}

/// `%g`: shortest (or `precision` significant digits), exponent form for
/// large and small magnitudes, trailing zeros dropped
fn format_general(value: f64, precision: Option<usize>) -> String {
    let scientific = match precision {
        None => format!("{:e}", value),
        Some(p) => format!("{:.*e}", p.max(1) - 1, value),
    };
    let Some((mantissa, exp)) = scientific.split_once('e') else {
        return scientific;
    };
    let exp: i64 = exp.parse().unwrap_or(0);
    let mut digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    while digits.len() > 1 && digits.ends_with('0') {
        digits.pop();
    }
    let nd = digits.len() as i64;
    let dp = exp + 1;

    let eprec = match precision {
        None => 6,
        Some(p) => {
            let p = p.max(1) as i64;
            if p > nd && nd >= dp {
                nd
            } else {
                p
            }
        }
    };

    if exp < -4 || exp >= eprec {
        let mut text = digits[..1].to_string();
        if digits.len() > 1 {
            text.push('.');
            text.push_str(&digits[1..]);
        }
        format!("{}e{}{:02}", text, if exp < 0 { '-' } else { '+' }, exp.abs())
    } else {
        let frac = (nd - dp).max(0) as usize;
        format!("{:.*}", frac, value)
    }
}
