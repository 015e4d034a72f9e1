//! Native builtins of the standard library.
//!
//! These are the `std` functions implemented in Rust; the rest of the
//! library is Jsonnet source (see `std.libsonnet`) layered under them.
//! Dispatch is a plain enum and match; every builtin forces exactly the
//! arguments it needs.

use std::rc::Rc;

use md5::Digest as _;

use super::eval::{EvalResult, Evaluator};
use super::value::{ArrayData, FuncData, ObjData, Thunk, Value};
use crate::span::Span;
use crate::Name;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Builtin {
    ExtVar,
    Native,
    Trace,
    Type,
    Length,
    Codepoint,
    Char,
    Substr,
    FindSubstr,
    StartsWith,
    EndsWith,
    AsciiUpper,
    AsciiLower,
    StringChars,
    Format,
    EscapeStringJson,
    EscapeStringPython,
    EscapeStringBash,
    EscapeStringDollars,
    Split,
    SplitLimit,
    SplitLimitR,
    StrReplace,
    ParseInt,
    ParseOctal,
    ParseHex,
    ParseJson,
    ParseYaml,
    EncodeUtf8,
    DecodeUtf8,
    Md5,
    Sha1,
    Sha256,
    Sha512,
    Base64,
    Base64Decode,
    Base64DecodeBytes,
    Pow,
    Exp,
    Log,
    Sqrt,
    Floor,
    Ceil,
    Modulo,
    Exponent,
    Mantissa,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Hypot,
    MakeArray,
    Filter,
    Map,
    FlatMap,
    Foldl,
    Foldr,
    Range,
    Join,
    Reverse,
    SortImpl,
    Slice,
    ObjectHasEx,
    ObjectFieldsEx,
    ObjectFlatMerge,
    PrimitiveEquals,
    Equals,
    ToString,
    ManifestJsonExImpl,
    ManifestYamlDocImpl,
    ManifestYamlStreamImpl,
}

impl Builtin {
    /// All builtins with the `std` field name they are exposed under.
    pub(crate) const ALL: &'static [(&'static str, Builtin)] = &[
        ("extVar", Self::ExtVar),
        ("native", Self::Native),
        ("trace", Self::Trace),
        ("type", Self::Type),
        ("length", Self::Length),
        ("codepoint", Self::Codepoint),
        ("char", Self::Char),
        ("substr", Self::Substr),
        ("findSubstr", Self::FindSubstr),
        ("startsWith", Self::StartsWith),
        ("endsWith", Self::EndsWith),
        ("asciiUpper", Self::AsciiUpper),
        ("asciiLower", Self::AsciiLower),
        ("stringChars", Self::StringChars),
        ("format", Self::Format),
        ("escapeStringJson", Self::EscapeStringJson),
        ("escapeStringPython", Self::EscapeStringPython),
        ("escapeStringBash", Self::EscapeStringBash),
        ("escapeStringDollars", Self::EscapeStringDollars),
        ("split", Self::Split),
        ("splitLimit", Self::SplitLimit),
        ("splitLimitR", Self::SplitLimitR),
        ("strReplace", Self::StrReplace),
        ("parseInt", Self::ParseInt),
        ("parseOctal", Self::ParseOctal),
        ("parseHex", Self::ParseHex),
        ("parseJson", Self::ParseJson),
        ("parseYaml", Self::ParseYaml),
        ("encodeUTF8", Self::EncodeUtf8),
        ("decodeUTF8", Self::DecodeUtf8),
        ("md5", Self::Md5),
        ("sha1", Self::Sha1),
        ("sha256", Self::Sha256),
        ("sha512", Self::Sha512),
        ("base64", Self::Base64),
        ("base64Decode", Self::Base64Decode),
        ("base64DecodeBytes", Self::Base64DecodeBytes),
        ("pow", Self::Pow),
        ("exp", Self::Exp),
        ("log", Self::Log),
        ("sqrt", Self::Sqrt),
        ("floor", Self::Floor),
        ("ceil", Self::Ceil),
        ("modulo", Self::Modulo),
        ("exponent", Self::Exponent),
        ("mantissa", Self::Mantissa),
        ("sin", Self::Sin),
        ("cos", Self::Cos),
        ("tan", Self::Tan),
        ("asin", Self::Asin),
        ("acos", Self::Acos),
        ("atan", Self::Atan),
        ("atan2", Self::Atan2),
        ("hypot", Self::Hypot),
        ("makeArray", Self::MakeArray),
        ("filter", Self::Filter),
        ("map", Self::Map),
        ("flatMap", Self::FlatMap),
        ("foldl", Self::Foldl),
        ("foldr", Self::Foldr),
        ("range", Self::Range),
        ("join", Self::Join),
        ("reverse", Self::Reverse),
        ("sortImpl", Self::SortImpl),
        ("slice", Self::Slice),
        ("objectHasEx", Self::ObjectHasEx),
        ("objectFieldsEx", Self::ObjectFieldsEx),
        ("objectFlatMerge", Self::ObjectFlatMerge),
        ("primitiveEquals", Self::PrimitiveEquals),
        ("equals", Self::Equals),
        ("toString", Self::ToString),
        ("manifestJsonExImpl", Self::ManifestJsonExImpl),
        ("manifestYamlDocImpl", Self::ManifestYamlDocImpl),
        ("manifestYamlStreamImpl", Self::ManifestYamlStreamImpl),
    ];

    pub(crate) fn name(self) -> &'static str {
        Self::ALL
            .iter()
            .find(|(_, b)| *b == self)
            .map(|(name, _)| *name)
            .unwrap()
    }

    pub(crate) fn params(self) -> &'static [&'static str] {
        match self {
            Self::ExtVar => &["x"],
            Self::Native => &["name"],
            Self::Trace => &["str", "rest"],
            Self::Type => &["x"],
            Self::Length => &["x"],
            Self::Codepoint => &["str"],
            Self::Char => &["n"],
            Self::Substr => &["str", "from", "len"],
            Self::FindSubstr => &["pat", "str"],
            Self::StartsWith => &["a", "b"],
            Self::EndsWith => &["a", "b"],
            Self::AsciiUpper | Self::AsciiLower | Self::StringChars => &["str"],
            Self::Format => &["str", "vals"],
            Self::EscapeStringJson
            | Self::EscapeStringPython
            | Self::EscapeStringBash
            | Self::EscapeStringDollars => &["str_"],
            Self::Split => &["str", "c"],
            Self::SplitLimit | Self::SplitLimitR => &["str", "c", "maxsplits"],
            Self::StrReplace => &["str", "from", "to"],
            Self::ParseInt | Self::ParseOctal | Self::ParseHex | Self::ParseJson
            | Self::ParseYaml | Self::EncodeUtf8 => &["str"],
            Self::DecodeUtf8 => &["arr"],
            Self::Md5 | Self::Sha1 | Self::Sha256 | Self::Sha512 => &["str"],
            Self::Base64 => &["input"],
            Self::Base64Decode | Self::Base64DecodeBytes => &["str"],
            Self::Pow => &["x", "n"],
            Self::Exp | Self::Log | Self::Sqrt | Self::Floor | Self::Ceil | Self::Exponent
            | Self::Mantissa | Self::Sin | Self::Cos | Self::Tan | Self::Asin | Self::Acos
            | Self::Atan => &["x"],
            Self::Modulo => &["x", "y"],
            Self::Atan2 => &["y", "x"],
            Self::Hypot => &["a", "b"],
            Self::MakeArray => &["sz", "func"],
            Self::Filter | Self::Map | Self::FlatMap => &["func", "arr"],
            Self::Foldl | Self::Foldr => &["func", "arr", "init"],
            Self::Range => &["from", "to"],
            Self::Join => &["sep", "arr"],
            Self::Reverse => &["arr"],
            Self::SortImpl => &["arr", "keyF"],
            Self::Slice => &["indexable", "index", "end", "step"],
            Self::ObjectHasEx => &["obj", "fname", "hidden"],
            Self::ObjectFieldsEx => &["obj", "hidden"],
            Self::ObjectFlatMerge => &["arr"],
            Self::PrimitiveEquals | Self::Equals => &["a", "b"],
            Self::ToString => &["a"],
            Self::ManifestJsonExImpl => &["value", "indent", "newline", "key_val_sep"],
            Self::ManifestYamlDocImpl => &["value", "indent_array_in_object", "quote_keys"],
            Self::ManifestYamlStreamImpl => {
                &["value", "indent_array_in_object", "c_document_end", "quote_keys"]
            }
        }
    }
}

impl Evaluator<'_> {
    fn arg_error(
        &self,
        builtin: Builtin,
        i: usize,
        want: &str,
        got: &Value,
        span: Span,
    ) -> crate::error::RuntimeError {
        self.error(
            span,
            format!(
                "std.{}: argument \"{}\" must be {}, got {}",
                builtin.name(),
                builtin.params()[i],
                want,
                got.type_str()
            ),
        )
    }

    fn arg(&mut self, args: &[Thunk], i: usize, span: Span) -> EvalResult<Value> {
        let thunk = args[i].clone();
        self.force(&thunk, span)
    }

    fn arg_str(
        &mut self,
        b: Builtin,
        args: &[Thunk],
        i: usize,
        span: Span,
    ) -> EvalResult<Rc<str>> {
        match self.arg(args, i, span)? {
            Value::Str(s) => Ok(s),
            v => Err(self.arg_error(b, i, "a string", &v, span)),
        }
    }

    fn arg_num(&mut self, b: Builtin, args: &[Thunk], i: usize, span: Span) -> EvalResult<f64> {
        match self.arg(args, i, span)? {
            Value::Number(n) => Ok(n),
            v => Err(self.arg_error(b, i, "a number", &v, span)),
        }
    }

    fn arg_int(&mut self, b: Builtin, args: &[Thunk], i: usize, span: Span) -> EvalResult<i64> {
        let n = self.arg_num(b, args, i, span)?;
        if n.trunc() != n {
            return Err(self.error(
                span,
                format!(
                    "std.{}: argument \"{}\" must be an integer, got {n}",
                    b.name(),
                    b.params()[i]
                ),
            ));
        }
        Ok(n as i64)
    }

    fn arg_bool(&mut self, b: Builtin, args: &[Thunk], i: usize, span: Span) -> EvalResult<bool> {
        match self.arg(args, i, span)? {
            Value::Bool(v) => Ok(v),
            v => Err(self.arg_error(b, i, "a boolean", &v, span)),
        }
    }

    fn arg_array(
        &mut self,
        b: Builtin,
        args: &[Thunk],
        i: usize,
        span: Span,
    ) -> EvalResult<Rc<ArrayData>> {
        match self.arg(args, i, span)? {
            Value::Array(a) => Ok(a),
            v => Err(self.arg_error(b, i, "an array", &v, span)),
        }
    }

    fn arg_object(
        &mut self,
        b: Builtin,
        args: &[Thunk],
        i: usize,
        span: Span,
    ) -> EvalResult<Rc<ObjData>> {
        match self.arg(args, i, span)? {
            Value::Object(o) => Ok(o),
            v => Err(self.arg_error(b, i, "an object", &v, span)),
        }
    }

    fn arg_func(
        &mut self,
        b: Builtin,
        args: &[Thunk],
        i: usize,
        span: Span,
    ) -> EvalResult<Rc<FuncData>> {
        match self.arg(args, i, span)? {
            Value::Func(f) => Ok(f),
            v => Err(self.arg_error(b, i, "a function", &v, span)),
        }
    }

    fn call1(&mut self, func: &Rc<FuncData>, arg: Thunk, span: Span) -> EvalResult<Value> {
        self.call_function(func, vec![arg], Vec::new(), span, false)
    }

    pub(crate) fn call_builtin(
        &mut self,
        b: Builtin,
        args: &[Thunk],
        span: Span,
    ) -> EvalResult<Value> {
        match b {
            Builtin::ExtVar => {
                let name = self.arg_str(b, args, 0, span)?;
                self.ext_var_value(&name, span)
            }
            Builtin::Native => {
                let name = self.arg_str(b, args, 0, span)?;
                match self.vm.native_funcs.get(&*name) {
                    Some(native) => Ok(Value::Func(Rc::new(FuncData {
                        kind: super::value::FuncKind::Native {
                            name: native.name.clone(),
                            params: native.params.clone(),
                        },
                    }))),
                    None => Ok(Value::Null),
                }
            }
            Builtin::Trace => {
                let msg = self.arg_str(b, args, 0, span)?;
                let (line, _) = self
                    .vm
                    .source_map
                    .position(span.src, span.begin);
                let file = self.vm.source_map.name(span.src).to_owned();
                self.vm.write_trace(&format!("TRACE: {file}:{line} {msg}\n"));
                self.arg(args, 1, span)
            }
            Builtin::Type => {
                let value = self.arg(args, 0, span)?;
                Ok(Value::Str(value.type_str().into()))
            }
            Builtin::Length => {
                let value = self.arg(args, 0, span)?;
                let len = match &value {
                    Value::Str(s) => s.chars().count(),
                    Value::Array(a) => a.len(),
                    Value::Object(o) => o.visible_fields().len(),
                    Value::Func(f) => f.param_count(),
                    _ => {
                        return Err(self.arg_error(
                            b,
                            0,
                            "a string, an array, an object or a function",
                            &value,
                            span,
                        ));
                    }
                };
                Ok(Value::Number(len as f64))
            }
            Builtin::Codepoint => {
                let s = self.arg_str(b, args, 0, span)?;
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(chr), None) => Ok(Value::Number(f64::from(u32::from(chr)))),
                    _ => Err(self.error(
                        span,
                        format!("std.codepoint requires a string of length 1, got {:?}", &*s),
                    )),
                }
            }
            Builtin::Char => {
                let n = self.arg_int(b, args, 0, span)?;
                let chr = u32::try_from(n).ok().and_then(char::from_u32);
                match chr {
                    Some(chr) => Ok(Value::from_char(chr)),
                    None => Err(self.error(span, format!("invalid unicode code point {n}"))),
                }
            }
            Builtin::Substr => {
                let s = self.arg_str(b, args, 0, span)?;
                let from = self.arg_int(b, args, 1, span)?;
                let len = self.arg_int(b, args, 2, span)?;
                if from < 0 {
                    return Err(self.error(span, "std.substr: \"from\" is negative".into()));
                }
                if len < 0 {
                    return Err(self.error(span, "std.substr: \"len\" is negative".into()));
                }
                let result: String =
                    s.chars().skip(from as usize).take(len as usize).collect();
                Ok(Value::Str(result.into()))
            }
            Builtin::FindSubstr => {
                let pat = self.arg_str(b, args, 0, span)?;
                let s = self.arg_str(b, args, 1, span)?;
                let mut found: ArrayData = Vec::new();
                if !pat.is_empty() {
                    let chars: Vec<char> = s.chars().collect();
                    let pat_chars: Vec<char> = pat.chars().collect();
                    if chars.len() >= pat_chars.len() {
                        for i in 0..=(chars.len() - pat_chars.len()) {
                            if chars[i..i + pat_chars.len()] == pat_chars[..] {
                                found.push(Thunk::done(Value::Number(i as f64)));
                            }
                        }
                    }
                }
                Ok(Value::Array(Rc::new(found)))
            }
            Builtin::StartsWith => {
                let a = self.arg_str(b, args, 0, span)?;
                let p = self.arg_str(b, args, 1, span)?;
                Ok(Value::Bool(a.starts_with(&*p)))
            }
            Builtin::EndsWith => {
                let a = self.arg_str(b, args, 0, span)?;
                let p = self.arg_str(b, args, 1, span)?;
                Ok(Value::Bool(a.ends_with(&*p)))
            }
            Builtin::AsciiUpper => {
                let s = self.arg_str(b, args, 0, span)?;
                Ok(Value::Str(s.to_ascii_uppercase().into()))
            }
            Builtin::AsciiLower => {
                let s = self.arg_str(b, args, 0, span)?;
                Ok(Value::Str(s.to_ascii_lowercase().into()))
            }
            Builtin::StringChars => {
                let s = self.arg_str(b, args, 0, span)?;
                let chars: ArrayData = s
                    .chars()
                    .map(|chr| Thunk::done(Value::from_char(chr)))
                    .collect();
                Ok(Value::Array(Rc::new(chars)))
            }
            Builtin::Format => {
                let fmt = self.arg_str(b, args, 0, span)?;
                let vals = self.arg(args, 1, span)?;
                self.std_format(&fmt, &vals, span)
            }
            Builtin::EscapeStringJson | Builtin::EscapeStringPython => {
                let s = self.arg_str(b, args, 0, span)?;
                let mut out = String::new();
                super::manifest::escape_string_json(&s, &mut out);
                Ok(Value::Str(out.into()))
            }
            Builtin::EscapeStringBash => {
                let s = self.arg_str(b, args, 0, span)?;
                let mut out = String::from("'");
                for chr in s.chars() {
                    if chr == '\'' {
                        out.push_str("'\"'\"'");
                    } else {
                        out.push(chr);
                    }
                }
                out.push('\'');
                Ok(Value::Str(out.into()))
            }
            Builtin::EscapeStringDollars => {
                let s = self.arg_str(b, args, 0, span)?;
                Ok(Value::Str(s.replace('$', "$$").into()))
            }
            Builtin::Split => {
                let s = self.arg_str(b, args, 0, span)?;
                let c = self.arg_str(b, args, 1, span)?;
                if c.is_empty() {
                    return Err(self.error(span, "std.split: delimiter is empty".into()));
                }
                let parts: ArrayData = s
                    .split(&*c)
                    .map(|part| Thunk::done(Value::Str(part.into())))
                    .collect();
                Ok(Value::Array(Rc::new(parts)))
            }
            Builtin::SplitLimit => {
                let s = self.arg_str(b, args, 0, span)?;
                let c = self.arg_str(b, args, 1, span)?;
                let max = self.arg_int(b, args, 2, span)?;
                if c.is_empty() {
                    return Err(self.error(span, "std.splitLimit: delimiter is empty".into()));
                }
                let parts: Vec<&str> = if max < 0 {
                    s.split(&*c).collect()
                } else {
                    s.splitn(max as usize + 1, &*c).collect()
                };
                let parts: ArrayData = parts
                    .into_iter()
                    .map(|part| Thunk::done(Value::Str(part.into())))
                    .collect();
                Ok(Value::Array(Rc::new(parts)))
            }
            Builtin::SplitLimitR => {
                let s = self.arg_str(b, args, 0, span)?;
                let c = self.arg_str(b, args, 1, span)?;
                let max = self.arg_int(b, args, 2, span)?;
                if c.is_empty() {
                    return Err(self.error(span, "std.splitLimitR: delimiter is empty".into()));
                }
                let mut parts: Vec<&str> = if max < 0 {
                    s.split(&*c).collect()
                } else {
                    s.rsplitn(max as usize + 1, &*c).collect()
                };
                if max >= 0 {
                    parts.reverse();
                }
                let parts: ArrayData = parts
                    .into_iter()
                    .map(|part| Thunk::done(Value::Str(part.into())))
                    .collect();
                Ok(Value::Array(Rc::new(parts)))
            }
            Builtin::StrReplace => {
                let s = self.arg_str(b, args, 0, span)?;
                let from = self.arg_str(b, args, 1, span)?;
                let to = self.arg_str(b, args, 2, span)?;
                if from.is_empty() {
                    return Err(
                        self.error(span, "std.strReplace: \"from\" string is empty".into())
                    );
                }
                Ok(Value::Str(s.replace(&*from, &to).into()))
            }
            Builtin::ParseInt => {
                let s = self.arg_str(b, args, 0, span)?;
                match s.parse::<i64>() {
                    Ok(n) => Ok(Value::Number(n as f64)),
                    Err(_) => Err(self.error(
                        span,
                        format!("{:?} is not a base 10 integer", &*s),
                    )),
                }
            }
            Builtin::ParseOctal => {
                let s = self.arg_str(b, args, 0, span)?;
                match u64::from_str_radix(&s, 8) {
                    Ok(n) => Ok(Value::Number(n as f64)),
                    Err(_) => Err(self.error(
                        span,
                        format!("{:?} is not a base 8 integer", &*s),
                    )),
                }
            }
            Builtin::ParseHex => {
                let s = self.arg_str(b, args, 0, span)?;
                match u64::from_str_radix(&s, 16) {
                    Ok(n) => Ok(Value::Number(n as f64)),
                    Err(_) => Err(self.error(
                        span,
                        format!("{:?} is not a base 16 integer", &*s),
                    )),
                }
            }
            Builtin::ParseJson => {
                let s = self.arg_str(b, args, 0, span)?;
                match serde_json::from_str::<serde_json::Value>(&s) {
                    Ok(json) => Ok(self.vm.json_to_value(&json)),
                    Err(e) => Err(self.error(span, format!("failed to parse JSON: {e}"))),
                }
            }
            Builtin::ParseYaml => {
                let s = self.arg_str(b, args, 0, span)?;
                match super::parse_yaml::parse_yaml(&s) {
                    Ok(json) => Ok(self.vm.json_to_value(&json)),
                    Err(e) => Err(self.error(span, format!("failed to parse YAML: {e}"))),
                }
            }
            Builtin::EncodeUtf8 => {
                let s = self.arg_str(b, args, 0, span)?;
                let bytes: ArrayData = s
                    .bytes()
                    .map(|byte| Thunk::done(Value::Number(f64::from(byte))))
                    .collect();
                Ok(Value::Array(Rc::new(bytes)))
            }
            Builtin::DecodeUtf8 => {
                let arr = self.arg_array(b, args, 0, span)?;
                let mut bytes = Vec::with_capacity(arr.len());
                for thunk in arr.iter() {
                    let value = self.force(&thunk.clone(), span)?;
                    let Value::Number(n) = value else {
                        return Err(self.error(
                            span,
                            format!(
                                "std.decodeUTF8: array must contain numbers, got {}",
                                value.type_str(),
                            ),
                        ));
                    };
                    if n.trunc() != n || !(0.0..=255.0).contains(&n) {
                        return Err(self.error(
                            span,
                            format!("std.decodeUTF8: {n} is not a byte value"),
                        ));
                    }
                    bytes.push(n as u8);
                }
                match String::from_utf8(bytes) {
                    Ok(s) => Ok(Value::Str(s.into())),
                    Err(_) => Err(self.error(span, "std.decodeUTF8: invalid UTF-8".into())),
                }
            }
            Builtin::Md5 => {
                let s = self.arg_str(b, args, 0, span)?;
                Ok(Value::Str(hex(&md5::Md5::digest(s.as_bytes())).into()))
            }
            Builtin::Sha1 => {
                let s = self.arg_str(b, args, 0, span)?;
                Ok(Value::Str(hex(&sha1::Sha1::digest(s.as_bytes())).into()))
            }
            Builtin::Sha256 => {
                let s = self.arg_str(b, args, 0, span)?;
                Ok(Value::Str(hex(&sha2::Sha256::digest(s.as_bytes())).into()))
            }
            Builtin::Sha512 => {
                let s = self.arg_str(b, args, 0, span)?;
                Ok(Value::Str(hex(&sha2::Sha512::digest(s.as_bytes())).into()))
            }
            Builtin::Base64 => {
                let input = self.arg(args, 0, span)?;
                let bytes = match &input {
                    Value::Str(s) => {
                        let mut bytes = Vec::with_capacity(s.len());
                        for chr in s.chars() {
                            let cp = u32::from(chr);
                            if cp > 255 {
                                return Err(self.error(
                                    span,
                                    "std.base64: only codepoints up to 255 can be encoded"
                                        .into(),
                                ));
                            }
                            bytes.push(cp as u8);
                        }
                        bytes
                    }
                    Value::Array(arr) => {
                        let mut bytes = Vec::with_capacity(arr.len());
                        for thunk in arr.iter() {
                            let value = self.force(&thunk.clone(), span)?;
                            let Value::Number(n) = value else {
                                return Err(self.error(
                                    span,
                                    "std.base64: array must contain numbers".into(),
                                ));
                            };
                            if n.trunc() != n || !(0.0..=255.0).contains(&n) {
                                return Err(self.error(
                                    span,
                                    format!("std.base64: {n} is not a byte value"),
                                ));
                            }
                            bytes.push(n as u8);
                        }
                        bytes
                    }
                    _ => {
                        return Err(
                            self.arg_error(b, 0, "a string or an array", &input, span)
                        );
                    }
                };
                Ok(Value::Str(base64_encode(&bytes).into()))
            }
            Builtin::Base64Decode => {
                let s = self.arg_str(b, args, 0, span)?;
                let bytes = base64_decode(&s).map_err(|e| self.error(span, e))?;
                let result: String = bytes.into_iter().map(char::from).collect();
                Ok(Value::Str(result.into()))
            }
            Builtin::Base64DecodeBytes => {
                let s = self.arg_str(b, args, 0, span)?;
                let bytes = base64_decode(&s).map_err(|e| self.error(span, e))?;
                let items: ArrayData = bytes
                    .into_iter()
                    .map(|byte| Thunk::done(Value::Number(f64::from(byte))))
                    .collect();
                Ok(Value::Array(Rc::new(items)))
            }
            Builtin::Pow => {
                let x = self.arg_num(b, args, 0, span)?;
                let n = self.arg_num(b, args, 1, span)?;
                self.check_number(x.powf(n), span)
            }
            Builtin::Exp => {
                let x = self.arg_num(b, args, 0, span)?;
                self.check_number(x.exp(), span)
            }
            Builtin::Log => {
                let x = self.arg_num(b, args, 0, span)?;
                self.check_number(x.ln(), span)
            }
            Builtin::Sqrt => {
                let x = self.arg_num(b, args, 0, span)?;
                self.check_number(x.sqrt(), span)
            }
            Builtin::Floor => {
                let x = self.arg_num(b, args, 0, span)?;
                Ok(Value::Number(x.floor()))
            }
            Builtin::Ceil => {
                let x = self.arg_num(b, args, 0, span)?;
                Ok(Value::Number(x.ceil()))
            }
            Builtin::Modulo => {
                let x = self.arg_num(b, args, 0, span)?;
                let y = self.arg_num(b, args, 1, span)?;
                if y == 0.0 {
                    return Err(self.error(span, "division by zero".into()));
                }
                self.check_number(x % y, span)
            }
            Builtin::Exponent => {
                let x = self.arg_num(b, args, 0, span)?;
                let (_, exp) = super::float::frexp(x);
                Ok(Value::Number(f64::from(exp)))
            }
            Builtin::Mantissa => {
                let x = self.arg_num(b, args, 0, span)?;
                let (mant, _) = super::float::frexp(x);
                Ok(Value::Number(mant))
            }
            Builtin::Sin => {
                let x = self.arg_num(b, args, 0, span)?;
                self.check_number(x.sin(), span)
            }
            Builtin::Cos => {
                let x = self.arg_num(b, args, 0, span)?;
                self.check_number(x.cos(), span)
            }
            Builtin::Tan => {
                let x = self.arg_num(b, args, 0, span)?;
                self.check_number(x.tan(), span)
            }
            Builtin::Asin => {
                let x = self.arg_num(b, args, 0, span)?;
                self.check_number(x.asin(), span)
            }
            Builtin::Acos => {
                let x = self.arg_num(b, args, 0, span)?;
                self.check_number(x.acos(), span)
            }
            Builtin::Atan => {
                let x = self.arg_num(b, args, 0, span)?;
                self.check_number(x.atan(), span)
            }
            Builtin::Atan2 => {
                let y = self.arg_num(b, args, 0, span)?;
                let x = self.arg_num(b, args, 1, span)?;
                self.check_number(y.atan2(x), span)
            }
            Builtin::Hypot => {
                let a = self.arg_num(b, args, 0, span)?;
                let c = self.arg_num(b, args, 1, span)?;
                self.check_number(a.hypot(c), span)
            }
            Builtin::MakeArray => {
                let sz = self.arg_int(b, args, 0, span)?;
                let func = self.arg_func(b, args, 1, span)?;
                if sz < 0 {
                    return Err(self.error(
                        span,
                        format!("std.makeArray requires a non-negative size, got {sz}"),
                    ));
                }
                let mut items: ArrayData = Vec::with_capacity(sz as usize);
                for i in 0..sz {
                    items.push(Thunk::call(
                        func.clone(),
                        vec![Thunk::done(Value::Number(i as f64))],
                        span,
                    ));
                }
                Ok(Value::Array(Rc::new(items)))
            }
            Builtin::Filter => {
                let func = self.arg_func(b, args, 0, span)?;
                let arr = self.arg_array(b, args, 1, span)?;
                let mut items: ArrayData = Vec::new();
                for thunk in arr.iter() {
                    let keep = self.call1(&func, thunk.clone(), span)?;
                    match keep {
                        Value::Bool(true) => items.push(thunk.clone()),
                        Value::Bool(false) => {}
                        v => {
                            return Err(self.error(
                                span,
                                format!(
                                    "std.filter: function must return a boolean, got {}",
                                    v.type_str()
                                ),
                            ));
                        }
                    }
                }
                Ok(Value::Array(Rc::new(items)))
            }
            Builtin::Map => {
                let func = self.arg_func(b, args, 0, span)?;
                let arr = self.arg_array(b, args, 1, span)?;
                let items: ArrayData = arr
                    .iter()
                    .map(|thunk| Thunk::call(func.clone(), vec![thunk.clone()], span))
                    .collect();
                Ok(Value::Array(Rc::new(items)))
            }
            Builtin::FlatMap => {
                let func = self.arg_func(b, args, 0, span)?;
                let target = self.arg(args, 1, span)?;
                match target {
                    Value::Array(arr) => {
                        let mut items: ArrayData = Vec::new();
                        for thunk in arr.iter() {
                            let mapped = self.call1(&func, thunk.clone(), span)?;
                            let Value::Array(ref part) = mapped else {
                                return Err(self.error(
                                    span,
                                    format!(
                                        "std.flatMap: function must return an array, got {}",
                                        mapped.type_str()
                                    ),
                                ));
                            };
                            items.extend(part.iter().cloned());
                        }
                        Ok(Value::Array(Rc::new(items)))
                    }
                    Value::Str(s) => {
                        let mut out = String::new();
                        for chr in s.chars() {
                            let mapped = self
                                .call1(&func, Thunk::done(Value::from_char(chr)), span)?;
                            let Value::Str(ref part) = mapped else {
                                return Err(self.error(
                                    span,
                                    format!(
                                        "std.flatMap: function must return a string, got {}",
                                        mapped.type_str()
                                    ),
                                ));
                            };
                            out.push_str(part);
                        }
                        Ok(Value::Str(out.into()))
                    }
                    v => Err(self.arg_error(b, 1, "an array or a string", &v, span)),
                }
            }
            Builtin::Foldl => {
                let func = self.arg_func(b, args, 0, span)?;
                let arr = self.arg_array(b, args, 1, span)?;
                let mut acc = args[2].clone();
                for thunk in arr.iter() {
                    let value = self.call_function(
                        &func,
                        vec![acc, thunk.clone()],
                        Vec::new(),
                        span,
                        false,
                    )?;
                    acc = Thunk::done(value);
                }
                self.force(&acc, span)
            }
            Builtin::Foldr => {
                let func = self.arg_func(b, args, 0, span)?;
                let arr = self.arg_array(b, args, 1, span)?;
                let mut acc = args[2].clone();
                for thunk in arr.iter().rev() {
                    let value = self.call_function(
                        &func,
                        vec![thunk.clone(), acc],
                        Vec::new(),
                        span,
                        false,
                    )?;
                    acc = Thunk::done(value);
                }
                self.force(&acc, span)
            }
            Builtin::Range => {
                let from = self.arg_int(b, args, 0, span)?;
                let to = self.arg_int(b, args, 1, span)?;
                let items: ArrayData = (from..=to)
                    .map(|i| Thunk::done(Value::Number(i as f64)))
                    .collect();
                Ok(Value::Array(Rc::new(items)))
            }
            Builtin::Join => {
                let sep = self.arg(args, 0, span)?;
                let arr = self.arg_array(b, args, 1, span)?;
                match sep {
                    Value::Str(sep) => {
                        let mut out = String::new();
                        let mut first = true;
                        for thunk in arr.iter() {
                            let item = self.force(&thunk.clone(), span)?;
                            match item {
                                Value::Null => {}
                                Value::Str(s) => {
                                    if !first {
                                        out.push_str(&sep);
                                    }
                                    first = false;
                                    out.push_str(&s);
                                }
                                v => {
                                    return Err(self.error(
                                        span,
                                        format!(
                                            "std.join: array must contain strings, got {}",
                                            v.type_str()
                                        ),
                                    ));
                                }
                            }
                        }
                        Ok(Value::Str(out.into()))
                    }
                    Value::Array(sep) => {
                        let mut out: ArrayData = Vec::new();
                        let mut first = true;
                        for thunk in arr.iter() {
                            let item = self.force(&thunk.clone(), span)?;
                            match item {
                                Value::Null => {}
                                Value::Array(part) => {
                                    if !first {
                                        out.extend(sep.iter().cloned());
                                    }
                                    first = false;
                                    out.extend(part.iter().cloned());
                                }
                                v => {
                                    return Err(self.error(
                                        span,
                                        format!(
                                            "std.join: array must contain arrays, got {}",
                                            v.type_str()
                                        ),
                                    ));
                                }
                            }
                        }
                        Ok(Value::Array(Rc::new(out)))
                    }
                    v => Err(self.arg_error(b, 0, "a string or an array", &v, span)),
                }
            }
            Builtin::Reverse => {
                let value = self.arg(args, 0, span)?;
                match value {
                    Value::Array(arr) => {
                        let items: ArrayData = arr.iter().rev().cloned().collect();
                        Ok(Value::Array(Rc::new(items)))
                    }
                    Value::Str(s) => {
                        Ok(Value::Str(s.chars().rev().collect::<String>().into()))
                    }
                    v => Err(self.arg_error(b, 0, "an array or a string", &v, span)),
                }
            }
            Builtin::SortImpl => {
                let arr = self.arg_array(b, args, 0, span)?;
                let key_func = self.arg_func(b, args, 1, span)?;
                let mut keys = Vec::with_capacity(arr.len());
                for thunk in arr.iter() {
                    keys.push(self.call1(&key_func, thunk.clone(), span)?);
                }
                let mut order: Vec<usize> = (0..arr.len()).collect();
                self.stable_sort_by_keys(&mut order, &keys, span)?;
                let items: ArrayData = order.into_iter().map(|i| arr[i].clone()).collect();
                Ok(Value::Array(Rc::new(items)))
            }
            Builtin::Slice => {
                let target = self.arg(args, 0, span)?;
                let start = self.slice_bound(b, args, 1, 0, span)?;
                let step = self.slice_bound(b, args, 3, 1, span)?;
                if step < 1 {
                    return Err(self.error(
                        span,
                        format!("std.slice: step must be at least 1, got {step}"),
                    ));
                }
                match target {
                    Value::Array(arr) => {
                        let end = self.slice_bound(b, args, 2, arr.len() as i64, span)?;
                        let end = (end.max(0) as usize).min(arr.len());
                        let start = (start.max(0) as usize).min(arr.len());
                        let items: ArrayData = if start >= end {
                            Vec::new()
                        } else {
                            arr[start..end]
                                .iter()
                                .step_by(step as usize)
                                .cloned()
                                .collect()
                        };
                        Ok(Value::Array(Rc::new(items)))
                    }
                    Value::Str(s) => {
                        let chars: Vec<char> = s.chars().collect();
                        let end = self.slice_bound(b, args, 2, chars.len() as i64, span)?;
                        let end = (end.max(0) as usize).min(chars.len());
                        let start = (start.max(0) as usize).min(chars.len());
                        let result: String = if start >= end {
                            String::new()
                        } else {
                            chars[start..end].iter().step_by(step as usize).collect()
                        };
                        Ok(Value::Str(result.into()))
                    }
                    v => Err(self.arg_error(b, 0, "an array or a string", &v, span)),
                }
            }
            Builtin::ObjectHasEx => {
                let obj = self.arg_object(b, args, 0, span)?;
                let name = self.arg_str(b, args, 1, span)?;
                let include_hidden = self.arg_bool(b, args, 2, span)?;
                let has = if include_hidden {
                    obj.has_field(0, &name)
                } else {
                    obj.field_visible(&name)
                };
                Ok(Value::Bool(has))
            }
            Builtin::ObjectFieldsEx => {
                let obj = self.arg_object(b, args, 0, span)?;
                let include_hidden = self.arg_bool(b, args, 1, span)?;
                let fields: ArrayData = obj
                    .field_order()
                    .iter()
                    .filter(|(_, visible)| include_hidden || *visible)
                    .map(|(name, _)| Thunk::done(Value::Str(name.clone())))
                    .collect();
                Ok(Value::Array(Rc::new(fields)))
            }
            Builtin::ObjectFlatMerge => {
                let arr = self.arg_array(b, args, 0, span)?;
                let mut result: Option<Rc<ObjData>> = None;
                let mut seen = std::collections::HashSet::<Name>::new();
                for thunk in arr.iter() {
                    let value = self.force(&thunk.clone(), span)?;
                    let Value::Object(ref obj) = value else {
                        return Err(self.error(
                            span,
                            format!(
                                "std.objectFlatMerge: array must contain objects, got {}",
                                value.type_str()
                            ),
                        ));
                    };
                    for (name, _) in obj.field_order().iter() {
                        if !seen.insert(name.clone()) {
                            return Err(self.error(
                                span,
                                format!("duplicate field name: \"{name}\""),
                            ));
                        }
                    }
                    result = Some(match result {
                        Some(acc) => super::value::extend_object(&acc, obj),
                        None => obj.clone(),
                    });
                }
                match result {
                    Some(obj) => Ok(Value::Object(obj)),
                    None => Ok(Value::Object(ObjData::simple(
                        self.vm.next_obj_id(),
                        Vec::new(),
                    ))),
                }
            }
            Builtin::PrimitiveEquals => {
                let a = self.arg(args, 0, span)?;
                let c = self.arg(args, 1, span)?;
                match (&a, &c) {
                    (Value::Null, Value::Null) => Ok(Value::Bool(true)),
                    (Value::Bool(x), Value::Bool(y)) => Ok(Value::Bool(x == y)),
                    (Value::Number(x), Value::Number(y)) => Ok(Value::Bool(x == y)),
                    (Value::Str(x), Value::Str(y)) => Ok(Value::Bool(x == y)),
                    (Value::Array(_) | Value::Object(_) | Value::Func(_), _) => {
                        Err(self.error(
                            span,
                            format!(
                                "std.primitiveEquals operates on primitives, got {}",
                                a.type_str()
                            ),
                        ))
                    }
                    (_, Value::Array(_) | Value::Object(_) | Value::Func(_)) => {
                        Err(self.error(
                            span,
                            format!(
                                "std.primitiveEquals operates on primitives, got {}",
                                c.type_str()
                            ),
                        ))
                    }
                    _ => Ok(Value::Bool(false)),
                }
            }
            Builtin::Equals => {
                let x = self.arg(args, 0, span)?;
                let y = self.arg(args, 1, span)?;
                Ok(Value::Bool(self.values_equal(&x, &y, span)?))
            }
            Builtin::ToString => {
                let value = self.arg(args, 0, span)?;
                Ok(Value::Str(self.coerce_to_string(&value, span)?))
            }
            Builtin::ManifestJsonExImpl => {
                let value = self.arg(args, 0, span)?;
                let indent = self.arg_str(b, args, 1, span)?;
                let newline = self.arg_str(b, args, 2, span)?;
                let key_val_sep = self.arg_str(b, args, 3, span)?;
                let format = super::manifest::JsonFormat::custom(&indent, &newline, &key_val_sep);
                let mut out = String::new();
                self.manifest_json(&value, &format, 0, span, &mut out)?;
                Ok(Value::Str(out.into()))
            }
            Builtin::ManifestYamlDocImpl => {
                let value = self.arg(args, 0, span)?;
                let indent_array_in_object = self.arg_bool(b, args, 1, span)?;
                let quote_keys = self.arg_bool(b, args, 2, span)?;
                let mut out = String::new();
                self.manifest_yaml_doc(&value, indent_array_in_object, quote_keys, span, &mut out)?;
                Ok(Value::Str(out.into()))
            }
            Builtin::ManifestYamlStreamImpl => {
                let arr = self.arg_array(b, args, 0, span)?;
                let indent_array_in_object = self.arg_bool(b, args, 1, span)?;
                let c_document_end = self.arg_bool(b, args, 2, span)?;
                let quote_keys = self.arg_bool(b, args, 3, span)?;
                let mut out = String::new();
                for thunk in arr.iter() {
                    let item = self.force(&thunk.clone(), span)?;
                    out.push_str("---\n");
                    self.manifest_yaml_doc(
                        &item,
                        indent_array_in_object,
                        quote_keys,
                        span,
                        &mut out,
                    )?;
                    out.push('\n');
                }
                if c_document_end {
                    out.push_str("...\n");
                }
                Ok(Value::Str(out.into()))
            }
        }
    }

    fn slice_bound(
        &mut self,
        b: Builtin,
        args: &[Thunk],
        i: usize,
        default: i64,
        span: Span,
    ) -> EvalResult<i64> {
        match self.arg(args, i, span)? {
            Value::Null => Ok(default),
            Value::Number(n) => {
                if n.trunc() != n {
                    return Err(self.error(
                        span,
                        format!("std.slice: {} must be an integer, got {n}", b.params()[i]),
                    ));
                }
                Ok(n as i64)
            }
            v => Err(self.arg_error(b, i, "a number or null", &v, span)),
        }
    }

    /// Stable merge sort of `order` by the precomputed `keys`, with the
    /// fallible jsonnet value ordering.
    fn stable_sort_by_keys(
        &mut self,
        order: &mut [usize],
        keys: &[Value],
        span: Span,
    ) -> EvalResult<()> {
        if order.len() < 2 {
            return Ok(());
        }
        let total_len = order.len();
        let mid = total_len / 2;
        let (left, right) = order.split_at_mut(mid);
        self.stable_sort_by_keys(left, keys, span)?;
        self.stable_sort_by_keys(right, keys, span)?;

        let mut merged = Vec::with_capacity(total_len);
        let (mut i, mut j) = (0, 0);
        while i < left.len() && j < right.len() {
            let ord = self.cmp_values(&keys[left[i]], &keys[right[j]], span)?;
            if ord.is_le() {
                merged.push(left[i]);
                i += 1;
            } else {
                merged.push(right[j]);
                j += 1;
            }
        }
        merged.extend_from_slice(&left[i..]);
        merged.extend_from_slice(&right[j..]);
        order.copy_from_slice(&merged);
        Ok(())
    }
}

fn hex(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn base64_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0];
        let b1 = chunk.get(1).copied();
        let b2 = chunk.get(2).copied();
        out.push(char::from(BASE64_ALPHABET[usize::from(b0 >> 2)]));
        out.push(char::from(
            BASE64_ALPHABET[usize::from((b0 & 0x03) << 4 | b1.unwrap_or(0) >> 4)],
        ));
        match b1 {
            Some(b1) => {
                out.push(char::from(
                    BASE64_ALPHABET[usize::from((b1 & 0x0f) << 2 | b2.unwrap_or(0) >> 6)],
                ));
            }
            None => out.push('='),
        }
        match b2 {
            Some(b2) => out.push(char::from(BASE64_ALPHABET[usize::from(b2 & 0x3f)])),
            None => out.push('='),
        }
    }
    out
}

fn base64_decode(s: &str) -> Result<Vec<u8>, String> {
    fn value_of(chr: char) -> Result<Option<u32>, String> {
        match chr {
            'A'..='Z' => Ok(Some(u32::from(chr) - u32::from('A'))),
            'a'..='z' => Ok(Some(u32::from(chr) - u32::from('a') + 26)),
            '0'..='9' => Ok(Some(u32::from(chr) - u32::from('0') + 52)),
            '+' => Ok(Some(62)),
            '/' => Ok(Some(63)),
            '=' => Ok(None),
            _ => Err(format!("invalid base64 character {chr:?}")),
        }
    }

    let mut out = Vec::with_capacity(s.len() / 4 * 3);
    let mut acc = 0u32;
    let mut acc_bits = 0u32;
    for chr in s.chars() {
        if chr.is_whitespace() {
            continue;
        }
        let Some(v) = value_of(chr)? else {
            break;
        };
        acc = (acc << 6) | v;
        acc_bits += 6;
        if acc_bits >= 8 {
            acc_bits -= 8;
            out.push((acc >> acc_bits) as u8);
        }
    }
    Ok(out)
}
