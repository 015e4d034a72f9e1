//! `std.format`: a subset of printf-style formatting.
//!
//! Supports `%d %i %o %x %X %e %E %f %F %g %G %s %c %%` with the flags
//! `- + # 0` and a space, width, precision, and `%(name)s` named access
//! into an object operand. An array operand supplies positional values,
//! an object supplies named values, and any other value formats as the
//! single positional operand.

use super::eval::{EvalResult, Evaluator};
use super::value::Value;
use crate::span::Span;

#[derive(Default)]
struct Flags {
    alt: bool,
    zero: bool,
    left: bool,
    blank: bool,
    plus: bool,
}

struct Conversion {
    mkey: Option<String>,
    flags: Flags,
    width: Option<usize>,
    precision: Option<usize>,
    ctype: char,
}

enum Part {
    Literal(String),
    Conv(Conversion),
}

impl Evaluator<'_> {
    pub(crate) fn std_format(
        &mut self,
        fmt: &str,
        vals: &Value,
        span: Span,
    ) -> EvalResult<Value> {
        let parts = self
            .parse_format(fmt)
            .map_err(|msg| self.error(span, msg))?;

        let mut out = String::new();
        let mut next_positional = 0usize;
        let positional: Option<&[super::value::Thunk]> = match vals {
            Value::Array(arr) => Some(arr),
            _ => None,
        };

        for part in &parts {
            match part {
                Part::Literal(s) => out.push_str(s),
                Part::Conv(conv) => {
                    if conv.ctype == '%' {
                        out.push('%');
                        continue;
                    }
                    let value = if let Some(key) = &conv.mkey {
                        let Value::Object(obj) = vals else {
                            return Err(self.error(
                                span,
                                format!(
                                    "format requires an object for %({key})..., got {}",
                                    vals.type_str()
                                ),
                            ));
                        };
                        let key: crate::Name = key.as_str().into();
                        self.object_field(obj, 0, &key, span)?
                    } else if let Some(items) = positional {
                        let Some(thunk) = items.get(next_positional) else {
                            return Err(
                                self.error(span, "not enough values to format".into())
                            );
                        };
                        next_positional += 1;
                        self.force(&thunk.clone(), span)?
                    } else {
                        if next_positional > 0 {
                            return Err(
                                self.error(span, "not enough values to format".into())
                            );
                        }
                        next_positional += 1;
                        vals.clone()
                    };
                    let rendered = self.render_conversion(conv, &value, span)?;
                    push_padded(&mut out, &rendered, conv);
                }
            }
        }

        if let Some(items) = positional {
            if next_positional < items.len() {
                return Err(self.error(span, "too many values to format".into()));
            }
        }

        Ok(Value::Str(out.into()))
    }

    fn parse_format(&self, fmt: &str) -> Result<Vec<Part>, String> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = fmt.chars().peekable();
        while let Some(chr) = chars.next() {
            if chr != '%' {
                literal.push(chr);
                continue;
            }
            if !literal.is_empty() {
                parts.push(Part::Literal(std::mem::take(&mut literal)));
            }

            let mut conv = Conversion {
                mkey: None,
                flags: Flags::default(),
                width: None,
                precision: None,
                ctype: ' ',
            };

            if chars.peek() == Some(&'(') {
                chars.next();
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some(')') => break,
                        Some(chr) => key.push(chr),
                        None => return Err("truncated format code".into()),
                    }
                }
                conv.mkey = Some(key);
            }

            while let Some(&chr) = chars.peek() {
                match chr {
                    '#' => conv.flags.alt = true,
                    '0' => conv.flags.zero = true,
                    '-' => conv.flags.left = true,
                    ' ' => conv.flags.blank = true,
                    '+' => conv.flags.plus = true,
                    _ => break,
                }
                chars.next();
            }

            if chars.peek() == Some(&'*') {
                return Err("cannot use * field width with format".into());
            }
            let mut width = None;
            while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
                width = Some(width.unwrap_or(0) * 10 + digit as usize);
                chars.next();
            }
            conv.width = width;

            if chars.peek() == Some(&'.') {
                chars.next();
                if chars.peek() == Some(&'*') {
                    return Err("cannot use * precision with format".into());
                }
                let mut precision = 0usize;
                while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
                    precision = precision * 10 + digit as usize;
                    chars.next();
                }
                conv.precision = Some(precision);
            }

            // Length modifiers are accepted and ignored.
            while matches!(chars.peek(), Some('h' | 'l' | 'L')) {
                chars.next();
            }

            match chars.next() {
                None => return Err("truncated format code".into()),
                Some(ctype) => match ctype {
                    'd' | 'i' | 'u' | 'o' | 'x' | 'X' | 'e' | 'E' | 'f' | 'F' | 'g' | 'G'
                    | 'c' | 's' | '%' => conv.ctype = ctype,
                    _ => {
                        return Err(format!("unrecognised conversion type: {ctype:?}"));
                    }
                },
            }
            parts.push(Part::Conv(conv));
        }
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }
        Ok(parts)
    }

    /// Renders one conversion without width padding (the sign and zero
    /// padding are part of the rendition).
    fn render_conversion(
        &mut self,
        conv: &Conversion,
        value: &Value,
        span: Span,
    ) -> EvalResult<String> {
        match conv.ctype {
            'd' | 'i' | 'u' => self.render_int(conv, value, 10, false, span),
            'o' => self.render_int(conv, value, 8, false, span),
            'x' => self.render_int(conv, value, 16, false, span),
            'X' => self.render_int(conv, value, 16, true, span),
            'e' => self.render_float_sci(conv, value, false, span),
            'E' => self.render_float_sci(conv, value, true, span),
            'f' | 'F' => self.render_float_dec(conv, value, span),
            'g' => self.render_float_general(conv, value, false, span),
            'G' => self.render_float_general(conv, value, true, span),
            'c' => match value {
                Value::Number(n) => {
                    let chr = u32::try_from(*n as i64)
                        .ok()
                        .filter(|_| n.trunc() == *n)
                        .and_then(char::from_u32);
                    match chr {
                        Some(chr) => Ok(chr.to_string()),
                        None => {
                            Err(self.error(span, format!("invalid code point for %c: {n}")))
                        }
                    }
                }
                Value::Str(s) => {
                    let mut chars = s.chars();
                    match (chars.next(), chars.next()) {
                        (Some(chr), None) => Ok(chr.to_string()),
                        _ => Err(self.error(
                            span,
                            "%c requires a string of length 1".into(),
                        )),
                    }
                }
                v => Err(self.error(
                    span,
                    format!("%c requires a number or a string, got {}", v.type_str()),
                )),
            },
            's' => {
                let s = self.coerce_to_string(value, span)?;
                match conv.precision {
                    Some(precision) => Ok(s.chars().take(precision).collect()),
                    None => Ok(s.to_string()),
                }
            }
            _ => unreachable!("unhandled conversion type"),
        }
    }

    fn format_number(&mut self, value: &Value, span: Span) -> EvalResult<f64> {
        match value {
            Value::Number(n) => Ok(*n),
            v => Err(self.error(
                span,
                format!("format required a number, got {}", v.type_str()),
            )),
        }
    }

    fn render_int(
        &mut self,
        conv: &Conversion,
        value: &Value,
        radix: u32,
        uppercase: bool,
        span: Span,
    ) -> EvalResult<String> {
        let n = self.format_number(value, span)?;
        if n.trunc() != n {
            return Err(self.error(
                span,
                format!("format required an integer, got {n}"),
            ));
        }
        let negative = n < 0.0;
        let magnitude = n.abs() as u64;
        let mut digits = match radix {
            8 => format!("{magnitude:o}"),
            16 => {
                if uppercase {
                    format!("{magnitude:X}")
                } else {
                    format!("{magnitude:x}")
                }
            }
            _ => format!("{magnitude}"),
        };
        if let Some(precision) = conv.precision {
            while digits.len() < precision {
                digits.insert(0, '0');
            }
        }
        if conv.flags.alt {
            match radix {
                8 => {
                    if !digits.starts_with('0') {
                        digits.insert(0, '0');
                    }
                }
                16 => digits.insert_str(0, if uppercase { "0X" } else { "0x" }),
                _ => {}
            }
        }
        Ok(add_sign(digits, negative, &conv.flags))
    }

    fn render_float_dec(
        &mut self,
        conv: &Conversion,
        value: &Value,
        span: Span,
    ) -> EvalResult<String> {
        let n = self.format_number(value, span)?;
        let precision = conv.precision.unwrap_or(6);
        let negative = n < 0.0;
        let mut body = format!("{:.*}", precision, n.abs());
        if precision == 0 && conv.flags.alt {
            body.push('.');
        }
        Ok(add_sign(body, negative, &conv.flags))
    }

    fn render_float_sci(
        &mut self,
        conv: &Conversion,
        value: &Value,
        uppercase: bool,
        span: Span,
    ) -> EvalResult<String> {
        let n = self.format_number(value, span)?;
        let precision = conv.precision.unwrap_or(6);
        let negative = n < 0.0;
        let mut body = render_sci(n.abs(), precision, uppercase, conv.flags.alt, false);
        if negative || conv.flags.plus || conv.flags.blank {
            body = add_sign(body, negative, &conv.flags);
        }
        Ok(body)
    }

    fn render_float_general(
        &mut self,
        conv: &Conversion,
        value: &Value,
        uppercase: bool,
        span: Span,
    ) -> EvalResult<String> {
        let n = self.format_number(value, span)?;
        let precision = conv.precision.unwrap_or(6).max(1);
        let negative = n < 0.0;
        let magnitude = n.abs();

        let exponent = if magnitude == 0.0 {
            0
        } else {
            magnitude.log10().floor() as i32
        };

        let body = if exponent < -4 || exponent >= precision as i32 {
            render_sci(
                magnitude,
                precision - 1,
                uppercase,
                conv.flags.alt,
                !conv.flags.alt,
            )
        } else {
            let dec_precision = (precision as i32 - 1 - exponent).max(0) as usize;
            let mut body = format!("{magnitude:.dec_precision$}");
            if !conv.flags.alt {
                strip_trailing_zeros(&mut body);
            }
            body
        };
        Ok(add_sign(body, negative, &conv.flags))
    }
}

/// Scientific notation `m.mmme±XX` with at least two exponent digits.
fn render_sci(
    magnitude: f64,
    precision: usize,
    uppercase: bool,
    alt: bool,
    strip_zeros: bool,
) -> String {
    let rendered = format!("{magnitude:.precision$e}");
    let (mantissa, exp) = rendered
        .split_once('e')
        .expect("float exponent notation always contains 'e'");
    let exp: i32 = exp.parse().unwrap();
    let mut mantissa = mantissa.to_owned();
    if strip_zeros {
        strip_trailing_zeros(&mut mantissa);
    }
    if alt && !mantissa.contains('.') {
        mantissa.push('.');
    }
    let e = if uppercase { 'E' } else { 'e' };
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}{e}{sign}{:02}", exp.abs())
}

fn strip_trailing_zeros(s: &mut String) {
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
}

fn add_sign(body: String, negative: bool, flags: &Flags) -> String {
    if negative {
        format!("-{body}")
    } else if flags.plus {
        format!("+{body}")
    } else if flags.blank {
        format!(" {body}")
    } else {
        body
    }
}

/// Applies field width: spaces by default, zeros for `0`-flagged numeric
/// conversions (inserted after any sign), left-justified with `-`.
fn push_padded(out: &mut String, rendered: &str, conv: &Conversion) {
    let width = conv.width.unwrap_or(0);
    let len = rendered.chars().count();
    if len >= width {
        out.push_str(rendered);
        return;
    }
    let pad = width - len;
    if conv.flags.left {
        out.push_str(rendered);
        for _ in 0..pad {
            out.push(' ');
        }
    } else if conv.flags.zero && conv.ctype != 's' && conv.ctype != 'c' {
        let sign_len = if rendered.starts_with(['-', '+', ' ']) {
            1
        } else {
            0
        };
        out.push_str(&rendered[..sign_len]);
        for _ in 0..pad {
            out.push('0');
        }
        out.push_str(&rendered[sign_len..]);
    } else {
        for _ in 0..pad {
            out.push(' ');
        }
        out.push_str(rendered);
    }
}
