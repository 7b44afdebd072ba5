//! The `printf`-style formatter shared by the standard library
//! (`printf`/`fmtstring`/`fprintf`) and by this crate's own diagnostics.
//!
//! spec.md §4.5 calls out that a single routine backs both call sites,
//! "parameterize[d] over an argument source (host variadic vs. script-value
//! array)". Expressed here as the [`Args`] trait: [`stdlib`](crate::stdlib)
//! implements it over a `&[Value]` slice; nothing else in this crate needs
//! a second implementation today, but the seam is where one would go
//! (e.g. a host-variadic adapter for an embedder calling `fmtstring` from
//! Rust without building a `Value` array first).

use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("format argument {0}: expected a value but the argument list was exhausted")]
    MissingArgument(usize),
    #[error("format argument {index}: expected {expected}, got '{got}'")]
    TypeMismatch { index: usize, expected: &'static str, got: String },
    #[error("invalid format specifier '%{0}'")]
    InvalidSpecifier(char),
    #[error("unterminated format specifier")]
    Unterminated,
}

/// A source of positional arguments to pull from while formatting. Each
/// directive (and each `*` width/precision) consumes the next one.
pub trait Args {
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn get(&self, index: usize) -> Option<&Value>;
}

impl Args for [Value] {
    fn len(&self) -> usize {
        <[Value]>::len(self)
    }
    fn get(&self, index: usize) -> Option<&Value> {
        <[Value]>::get(self, index)
    }
}

#[derive(Default, Clone, Copy)]
struct Flags {
    alt: bool,        // '#'
    zero_pad: bool,    // '0'
    plus_sign: bool,   // '+'
    space_sign: bool,  // ' '
}

struct Cursor<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a str) -> Self {
        Self { chars: s.chars().peekable() }
    }
}

/// Formats `fmt` against `args`, consuming positional arguments left to
/// right (including for `*`-parameterized width/precision). On any type
/// mismatch, exhausted argument list, or invalid specifier, returns a
/// [`FormatError`] naming the offending argument index.
pub fn format<A: Args + ?Sized>(fmt: &str, args: &A) -> Result<String, FormatError> {
    let mut out = String::with_capacity(fmt.len());
    let mut cursor = Cursor::new(fmt);
    let mut argi = 0usize;
    while let Some(c) = cursor.chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut flags = Flags::default();
        loop {
            match cursor.chars.peek() {
                Some('#') => flags.alt = true,
                Some('0') => flags.zero_pad = true,
                Some('+') => flags.plus_sign = true,
                Some(' ') => flags.space_sign = true,
                _ => break,
            }
            cursor.chars.next();
        }
        let width = read_amount(&mut cursor, args, &mut argi)?;
        let precision = if cursor.chars.peek() == Some(&'.') {
            cursor.chars.next();
            Some(read_amount(&mut cursor, args, &mut argi)?.unwrap_or(0))
        } else {
            None
        };
        let spec = cursor.chars.next().ok_or(FormatError::Unterminated)?;
        if spec == '%' {
            out.push('%');
            continue;
        }
        let rendered = render_one(spec, flags, width, precision, args, &mut argi)?;
        out.push_str(&rendered);
    }
    Ok(out)
}

/// Reads a `*`-parameterized or literal-digit width/precision amount.
fn read_amount<A: Args + ?Sized>(cursor: &mut Cursor, args: &A, argi: &mut usize) -> Result<Option<usize>, FormatError> {
    if cursor.chars.peek() == Some(&'*') {
        cursor.chars.next();
        let v = next_arg(args, argi)?;
        let n = as_int(v, *argi - 1)?;
        return Ok(Some(n.max(0) as usize));
    }
    let mut digits = String::new();
    while let Some(d) = cursor.chars.peek() {
        if d.is_ascii_digit() {
            digits.push(*d);
            cursor.chars.next();
        } else {
            break;
        }
    }
    if digits.is_empty() {
        Ok(None)
    } else {
        Ok(digits.parse().ok())
    }
}

fn next_arg<'a, A: Args + ?Sized>(args: &'a A, argi: &mut usize) -> Result<&'a Value, FormatError> {
    let v = args.get(*argi).ok_or(FormatError::MissingArgument(*argi))?;
    *argi += 1;
    Ok(v)
}

fn as_int(v: &Value, index: usize) -> Result<i64, FormatError> {
    match v {
        Value::Int(i) => Ok(*i),
        Value::Float(f) => Ok(*f as i64),
        other => Err(FormatError::TypeMismatch { index, expected: "number", got: other.type_name().to_string() }),
    }
}

fn as_float(v: &Value, index: usize) -> Result<f64, FormatError> {
    match v {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        other => Err(FormatError::TypeMismatch { index, expected: "number", got: other.type_name().to_string() }),
    }
}

fn pad(body: String, width: Option<usize>, zero_pad: bool, left_align_sign: bool) -> String {
    let Some(width) = width else { return body };
    if body.len() >= width {
        return body;
    }
    let fill = width - body.len();
    if zero_pad {
        // zero-padding goes after a leading sign, not before it
        if left_align_sign && (body.starts_with('-') || body.starts_with('+')) {
            let (sign, rest) = body.split_at(1);
            format!("{sign}{}{rest}", "0".repeat(fill))
        } else {
            format!("{}{body}", "0".repeat(fill))
        }
    } else {
        format!("{}{body}", " ".repeat(fill))
    }
}

fn render_one<A: Args + ?Sized>(
    spec: char,
    flags: Flags,
    width: Option<usize>,
    precision: Option<usize>,
    args: &A,
    argi: &mut usize,
) -> Result<String, FormatError> {
    let index = *argi;
    match spec {
        's' => {
            let v = next_arg(args, argi)?;
            let s = match v {
                Value::Str(s) => s.to_string_lossy().into_owned(),
                other => display_value(other),
            };
            let s = match precision {
                Some(p) => s.chars().take(p).collect(),
                None => s,
            };
            Ok(pad(s, width, false, false))
        }
        'i' | 'd' => {
            let n = as_int(next_arg(args, argi)?, index)?;
            let mut body = n.unsigned_abs().to_string();
            if let Some(p) = precision {
                while body.len() < p {
                    body.insert(0, '0');
                }
            }
            let sign = if n < 0 {
                "-"
            } else if flags.plus_sign {
                "+"
            } else if flags.space_sign {
                " "
            } else {
                ""
            };
            Ok(pad(format!("{sign}{body}"), width, flags.zero_pad, true))
        }
        'u' => {
            let n = as_int(next_arg(args, argi)?, index)? as u64;
            Ok(pad(n.to_string(), width, flags.zero_pad, false))
        }
        'o' => {
            let n = as_int(next_arg(args, argi)?, index)? as u64;
            let body = format!("{n:o}");
            let body = if flags.alt && n != 0 { format!("0{body}") } else { body };
            Ok(pad(body, width, flags.zero_pad, false))
        }
        'x' => {
            let n = as_int(next_arg(args, argi)?, index)? as u64;
            let body = format!("{n:x}");
            let body = if flags.alt && n != 0 { format!("0x{body}") } else { body };
            Ok(pad(body, width, flags.zero_pad, false))
        }
        'X' => {
            let n = as_int(next_arg(args, argi)?, index)? as u64;
            let body = format!("{n:X}");
            let body = if flags.alt && n != 0 { format!("0X{body}") } else { body };
            Ok(pad(body, width, flags.zero_pad, false))
        }
        'b' => {
            let n = as_int(next_arg(args, argi)?, index)? as u64;
            let body = format!("{n:b}");
            let body = if flags.alt && n != 0 { format!("0b{body}") } else { body };
            Ok(pad(body, width, flags.zero_pad, false))
        }
        'c' => {
            let n = as_int(next_arg(args, argi)?, index)?;
            let ch = char::from_u32(n as u32).unwrap_or('\u{FFFD}');
            Ok(pad(ch.to_string(), width, false, false))
        }
        'f' | 'F' => {
            let x = as_float(next_arg(args, argi)?, index)?;
            let prec = precision.unwrap_or(6);
            let body = render_float(x, prec, spec == 'F');
            let body = if x.is_sign_positive() && !x.is_nan() {
                if flags.plus_sign {
                    format!("+{body}")
                } else if flags.space_sign {
                    format!(" {body}")
                } else {
                    body
                }
            } else {
                body
            };
            Ok(pad(body, width, flags.zero_pad && x.is_finite(), true))
        }
        'B' => {
            let v = next_arg(args, argi)?;
            let b = match v {
                Value::Bool(b) => *b,
                other => return Err(FormatError::TypeMismatch { index, expected: "bool", got: other.type_name().to_string() }),
            };
            Ok(pad(if b { "true" } else { "false" }.to_string(), width, false, false))
        }
        other => Err(FormatError::InvalidSpecifier(other)),
    }
}

/// Renders a fixed-point float, handling NaN, infinities, and signed zero
/// explicitly (spec.md §4.5: "negative zero appears as `-0`").
fn render_float(x: f64, precision: usize, upper: bool) -> String {
    if x.is_nan() {
        return if upper { "NAN".to_string() } else { "nan".to_string() };
    }
    if x.is_infinite() {
        let sign = if x < 0.0 { "-" } else { "" };
        return format!("{sign}{}", if upper { "INF" } else { "inf" });
    }
    if x == 0.0 {
        let sign = if x.is_sign_negative() { "-" } else { "" };
        return if precision == 0 {
            format!("{sign}0")
        } else {
            format!("{sign}0.{}", "0".repeat(precision))
        };
    }
    format!("{x:.precision$}")
}

/// Non-string `%s` fallback: render a scalar value the way the compiler's
/// own diagnostics do.
fn display_value(v: &Value) -> String {
    match v {
        Value::Nil => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => render_float(*f, 6, false),
        Value::Array(_) => "<array>".to_string(),
        Value::HashMap(_) => "<hashmap>".to_string(),
        Value::Function(_) => "<function>".to_string(),
        Value::Str(_) => unreachable!("strings handled by caller"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(f: &str, args: &[Value]) -> String {
        format(f, args).unwrap()
    }

    #[test]
    fn formats_signed_decimal() {
        assert_eq!(fmt("%d", &[Value::Int(-42)]), "-42");
        assert_eq!(fmt("%+d", &[Value::Int(7)]), "+7");
    }

    #[test]
    fn formats_unsigned_bases() {
        assert_eq!(fmt("%x", &[Value::Int(255)]), "ff");
        assert_eq!(fmt("%#x", &[Value::Int(255)]), "0xff");
        assert_eq!(fmt("%o", &[Value::Int(8)]), "10");
        assert_eq!(fmt("%b", &[Value::Int(5)]), "101");
    }

    #[test]
    fn formats_strings_with_width_and_precision() {
        assert_eq!(fmt("%5s", &[Value::new_string(b"hi".to_vec())]), "   hi");
        assert_eq!(fmt("%.2s", &[Value::new_string(b"hello".to_vec())]), "he");
    }

    #[test]
    fn formats_float_edge_cases() {
        assert_eq!(fmt("%f", &[Value::Float(f64::NAN)]), "nan");
        assert_eq!(fmt("%f", &[Value::Float(f64::INFINITY)]), "inf");
        assert_eq!(fmt("%f", &[Value::Float(-f64::INFINITY)]), "-inf");
        assert_eq!(fmt("%.2f", &[Value::Float(-0.0)]), "-0.00");
        assert_eq!(fmt("%.0f", &[Value::Float(0.0)]), "0");
    }

    #[test]
    fn formats_bool_and_percent_literal() {
        assert_eq!(fmt("%B", &[Value::Bool(true)]), "true");
    }

    #[test]
    fn percent_literal_needs_no_args() {
        assert_eq!(fmt("100%%", &[]), "100%");
    }

    #[test]
    fn star_parameterized_width_consumes_an_argument() {
        assert_eq!(fmt("%*d", &[Value::Int(3), Value::Int(5)]), "  5");
    }

    #[test]
    fn missing_argument_names_its_index() {
        let err = format("%d %d", &[Value::Int(1)][..]).unwrap_err();
        assert_eq!(err, FormatError::MissingArgument(1));
    }

    #[test]
    fn type_mismatch_names_the_faulty_argument() {
        let err = format("%d", &[Value::new_string(b"x".to_vec())][..]).unwrap_err();
        assert!(matches!(err, FormatError::TypeMismatch { index: 0, .. }));
    }
}
