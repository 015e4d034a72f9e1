//! Manifestation: fully evaluating a value into its external form.
//!
//! JSON output is parameterized over a format (compact for `toString`
//! coercions, indented for document output, custom for
//! `std.manifestJsonEx`). YAML documents back `std.manifestYamlDoc` and
//! the stream output mode. Object assertions fire before any composite is
//! emitted; hidden fields are omitted; keys are emitted in code-point
//! order. This module also converts values to `serde_json` trees for the
//! native-function interface, with the notifier's access-path tracking.

use std::fmt::Write as _;
use std::rc::Rc;

use super::eval::{EvalResult, Evaluator};
use super::value::Value;
use crate::notify::PathStep;
use crate::span::Span;

pub(crate) struct JsonFormat {
    indent: String,
    newline: String,
    key_val_sep: String,
    item_sep: String,
    empty_array: Option<String>,
    empty_object: Option<String>,
}

impl JsonFormat {
    /// Single-line form used by `std.toString` and string coercion.
    pub(crate) fn compact() -> Self {
        Self {
            indent: String::new(),
            newline: String::new(),
            key_val_sep: ": ".into(),
            item_sep: ", ".into(),
            empty_array: Some("[ ]".into()),
            empty_object: Some("{ }".into()),
        }
    }

    /// The default document form: three-space indent, one item per line.
    pub(crate) fn indented() -> Self {
        Self {
            indent: "   ".into(),
            newline: "\n".into(),
            key_val_sep: ": ".into(),
            item_sep: ",".into(),
            empty_array: Some("[ ]".into()),
            empty_object: Some("{ }".into()),
        }
    }

    /// `std.manifestJsonEx` form: caller-chosen whitespace, and empty
    /// containers spelled out over two lines like everything else.
    pub(crate) fn custom(indent: &str, newline: &str, key_val_sep: &str) -> Self {
        Self {
            indent: indent.into(),
            newline: newline.into(),
            key_val_sep: key_val_sep.into(),
            item_sep: ",".into(),
            empty_array: None,
            empty_object: None,
        }
    }

    fn push_indent(&self, depth: usize, out: &mut String) {
        for _ in 0..depth {
            out.push_str(&self.indent);
        }
    }
}

impl Evaluator<'_> {
    pub(crate) fn manifest_json(
        &mut self,
        value: &Value,
        format: &JsonFormat,
        depth: usize,
        span: Span,
        out: &mut String,
    ) -> EvalResult<()> {
        match value {
            Value::Null => out.push_str("null"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Number(n) => {
                self.check_number(*n, span)?;
                write!(out, "{n}").unwrap();
            }
            Value::Str(s) => escape_string_json(s, out),
            Value::Array(arr) => {
                if arr.is_empty() {
                    match &format.empty_array {
                        Some(s) => out.push_str(s),
                        None => {
                            out.push('[');
                            out.push_str(&format.newline);
                            out.push_str(&format.newline);
                            format.push_indent(depth, out);
                            out.push(']');
                        }
                    }
                } else {
                    out.push('[');
                    for (i, thunk) in arr.iter().enumerate() {
                        if i > 0 {
                            out.push_str(&format.item_sep);
                        }
                        out.push_str(&format.newline);
                        format.push_indent(depth + 1, out);
                        let item = self.force(&thunk.clone(), span)?;
                        self.manifest_json(&item, format, depth + 1, span, out)?;
                    }
                    out.push_str(&format.newline);
                    format.push_indent(depth, out);
                    out.push(']');
                }
            }
            Value::Object(obj) => {
                self.check_object_asserts(obj)?;
                let fields = obj.visible_fields();
                if fields.is_empty() {
                    match &format.empty_object {
                        Some(s) => out.push_str(s),
                        None => {
                            out.push('{');
                            out.push_str(&format.newline);
                            out.push_str(&format.newline);
                            format.push_indent(depth, out);
                            out.push('}');
                        }
                    }
                } else {
                    out.push('{');
                    for (i, name) in fields.iter().enumerate() {
                        if i > 0 {
                            out.push_str(&format.item_sep);
                        }
                        out.push_str(&format.newline);
                        format.push_indent(depth + 1, out);
                        escape_string_json(name, out);
                        out.push_str(&format.key_val_sep);
                        let field_value = self.object_field(obj, 0, name, span)?;
                        self.manifest_json(&field_value, format, depth + 1, span, out)?;
                    }
                    out.push_str(&format.newline);
                    format.push_indent(depth, out);
                    out.push('}');
                }
            }
            Value::Func(_) => {
                return Err(self.error(span, "couldn't manifest function".into()));
            }
        }
        Ok(())
    }

    pub(crate) fn manifest_yaml_doc(
        &mut self,
        value: &Value,
        indent_array_in_object: bool,
        quote_keys: bool,
        span: Span,
        out: &mut String,
    ) -> EvalResult<()> {
        if self.yaml_is_block(value) {
            self.yaml_block(value, "", indent_array_in_object, quote_keys, span, out)
        } else {
            self.yaml_scalar(value, "", span, out)
        }
    }

    /// Whether a value renders as an indented multi-line block.
    fn yaml_is_block(&self, value: &Value) -> bool {
        match value {
            Value::Array(arr) => !arr.is_empty(),
            Value::Object(obj) => !obj.visible_fields().is_empty(),
            _ => false,
        }
    }

    /// Renders a scalar (or empty container) inline. Multi-line strings
    /// become block scalars with lines indented past `indent`.
    fn yaml_scalar(
        &mut self,
        value: &Value,
        indent: &str,
        span: Span,
        out: &mut String,
    ) -> EvalResult<()> {
        match value {
            Value::Null => out.push_str("null"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Number(n) => {
                self.check_number(*n, span)?;
                write!(out, "{n}").unwrap();
            }
            Value::Str(s) => {
                if let Some(body) = s.strip_suffix('\n').filter(|_| s.contains('\n')) {
                    out.push('|');
                    for line in body.split('\n') {
                        out.push('\n');
                        out.push_str(indent);
                        out.push_str("  ");
                        out.push_str(line);
                    }
                } else if s.contains('\n') {
                    out.push_str("|-");
                    for line in s.split('\n') {
                        out.push('\n');
                        out.push_str(indent);
                        out.push_str("  ");
                        out.push_str(line);
                    }
                } else {
                    escape_string_json(s, out);
                }
            }
            Value::Array(_) => out.push_str("[]"),
            Value::Object(obj) => {
                self.check_object_asserts(obj)?;
                out.push_str("{}");
            }
            Value::Func(_) => {
                return Err(self.error(span, "couldn't manifest function".into()));
            }
        }
        Ok(())
    }

    /// Renders a non-empty array or object as lines starting at `indent`,
    /// without a trailing newline.
    fn yaml_block(
        &mut self,
        value: &Value,
        indent: &str,
        indent_array_in_object: bool,
        quote_keys: bool,
        span: Span,
        out: &mut String,
    ) -> EvalResult<()> {
        let child_indent = format!("{indent}  ");
        match value {
            Value::Array(arr) => {
                for (i, thunk) in arr.iter().enumerate() {
                    if i > 0 {
                        out.push('\n');
                    }
                    out.push_str(indent);
                    out.push('-');
                    let item = self.force(&thunk.clone(), span)?;
                    if self.yaml_is_block(&item) {
                        out.push('\n');
                        self.yaml_block(
                            &item,
                            &child_indent,
                            indent_array_in_object,
                            quote_keys,
                            span,
                            out,
                        )?;
                    } else {
                        out.push(' ');
                        self.yaml_scalar(&item, indent, span, out)?;
                    }
                }
            }
            Value::Object(obj) => {
                self.check_object_asserts(obj)?;
                let fields = obj.visible_fields();
                for (i, name) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push('\n');
                    }
                    out.push_str(indent);
                    if quote_keys || !is_plain_yaml_key(name) {
                        escape_string_json(name, out);
                    } else {
                        out.push_str(name);
                    }
                    out.push(':');
                    let field_value = self.object_field(obj, 0, name, span)?;
                    if self.yaml_is_block(&field_value) {
                        let nested_indent =
                            if matches!(field_value, Value::Array(_)) && !indent_array_in_object {
                                indent.to_owned()
                            } else {
                                child_indent.clone()
                            };
                        out.push('\n');
                        self.yaml_block(
                            &field_value,
                            &nested_indent,
                            indent_array_in_object,
                            quote_keys,
                            span,
                            out,
                        )?;
                    } else {
                        out.push(' ');
                        self.yaml_scalar(&field_value, indent, span, out)?;
                    }
                }
            }
            _ => unreachable!("yaml_block called on a scalar"),
        }
        Ok(())
    }

    /// Deeply evaluates a value into a JSON tree, firing assertions along
    /// the way; the interchange form for native functions.
    pub(crate) fn value_to_json(
        &mut self,
        value: &Value,
        span: Span,
    ) -> EvalResult<serde_json::Value> {
        match value {
            Value::Null => Ok(serde_json::Value::Null),
            Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            Value::Number(n) => {
                self.check_number(*n, span)?;
                Ok(serde_json::Number::from_f64(*n)
                    .map(serde_json::Value::Number)
                    .unwrap())
            }
            Value::Str(s) => Ok(serde_json::Value::String(s.to_string())),
            Value::Array(arr) => {
                let mut items = Vec::with_capacity(arr.len());
                for thunk in arr.iter() {
                    let item = self.force(&thunk.clone(), span)?;
                    items.push(self.value_to_json(&item, span)?);
                }
                Ok(serde_json::Value::Array(items))
            }
            Value::Object(obj) => {
                self.check_object_asserts(obj)?;
                let mut map = serde_json::Map::new();
                for name in obj.visible_fields() {
                    let field_value = self.object_field(obj, 0, &name, span)?;
                    map.insert(name.to_string(), self.value_to_json(&field_value, span)?);
                }
                Ok(serde_json::Value::Object(map))
            }
            Value::Func(_) => Err(self.error(span, "couldn't manifest function".into())),
        }
    }

    /// Like [`Self::value_to_json`], but tracks the access path and fires
    /// notifier callbacks post-order, so deeper paths are reported before
    /// their ancestors.
    pub(crate) fn value_to_json_notify(
        &mut self,
        value: &Value,
        span: Span,
        path: &mut Vec<PathStep>,
    ) -> EvalResult<serde_json::Value> {
        let node = match value {
            Value::Array(arr) => {
                let mut items = Vec::with_capacity(arr.len());
                for (i, thunk) in arr.iter().enumerate() {
                    let item = self.force(&thunk.clone(), span)?;
                    path.push(PathStep::Index(i));
                    let result = self.value_to_json_notify(&item, span, path);
                    path.pop();
                    items.push(result?);
                }
                serde_json::Value::Array(items)
            }
            Value::Object(obj) => {
                self.check_object_asserts(obj)?;
                let mut map = serde_json::Map::new();
                for name in obj.visible_fields() {
                    let field_value = self.object_field(obj, 0, &name, span)?;
                    path.push(PathStep::Field(name.to_string()));
                    let result = self.value_to_json_notify(&field_value, span, path);
                    path.pop();
                    map.insert(name.to_string(), result?);
                }
                serde_json::Value::Object(map)
            }
            _ => self.value_to_json(value, span)?,
        };
        self.notify_matches(value, &node, path);
        Ok(node)
    }

    fn notify_matches(&mut self, value: &Value, node: &serde_json::Value, path: &[PathStep]) {
        let Some(mut notifier) = self.vm.notifier.take() else {
            return;
        };
        for record in self.vm.native_records.iter() {
            if record.notified.get() {
                continue;
            }
            let partial = match (&record.value, value) {
                (Value::Str(a), Value::Str(b)) if Rc::ptr_eq(a, b) => Some(false),
                (Value::Array(a), Value::Array(b)) if Rc::ptr_eq(a, b) => Some(false),
                (Value::Object(a), Value::Object(b)) => {
                    if Rc::ptr_eq(a, b) {
                        Some(false)
                    } else if b.contains_layers_of(a) {
                        Some(true)
                    } else {
                        None
                    }
                }
                _ => None,
            };
            if let Some(partial) = partial {
                record.notified.set(true);
                notifier.on_generated_value(
                    &record.name,
                    &record.args,
                    partial,
                    &record.json,
                    node,
                    path,
                );
            }
        }
        self.vm.notifier = Some(notifier);
    }

    /// Notifies native results that never reached the manifested
    /// document, preserving the one-notification-per-call guarantee, and
    /// resets the record list for the next evaluation.
    pub(crate) fn flush_notifications(&mut self) {
        if let Some(mut notifier) = self.vm.notifier.take() {
            for record in self.vm.native_records.iter() {
                if !record.notified.get() {
                    record.notified.set(true);
                    notifier.on_generated_value(
                        &record.name,
                        &record.args,
                        false,
                        &record.json,
                        &record.json,
                        &[],
                    );
                }
            }
            self.vm.notifier = Some(notifier);
        }
        self.vm.native_records.clear();
    }
}

/// Whether a key can appear unquoted in YAML output.
fn is_plain_yaml_key(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|chr| chr.is_ascii_alphanumeric() || chr == '_' || chr == '-')
        && !matches!(name, "true" | "false" | "null" | "yes" | "no" | "on" | "off")
}

/// JSON string escaping: standard short escapes, `\u00XX` for the
/// remaining control characters.
pub(crate) fn escape_string_json(s: &str, out: &mut String) {
    out.push('"');
    for chr in s.chars() {
        match chr {
            '\u{8}' => out.push_str("\\b"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\u{c}' => out.push_str("\\f"),
            '\r' => out.push_str("\\r"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{0}'..='\u{1f}' | '\u{7f}'..='\u{9f}' => {
                write!(out, "\\u{:04x}", u32::from(chr)).unwrap();
            }
            _ => out.push(chr),
        }
    }
    out.push('"');
}
