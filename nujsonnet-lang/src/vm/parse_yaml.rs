//! A reader for the JSON-compatible YAML subset, backing `std.parseYaml`.
//!
//! Covers what configuration files actually feed it: block mappings and
//! sequences with indentation nesting, flow (JSON-style) collections,
//! plain/single-quoted/double-quoted scalars, comments, and an optional
//! leading `---` / trailing `...`. Anchors, tags and multi-document
//! streams are out of scope.

use serde_json::Value as Json;

pub(crate) fn parse_yaml(input: &str) -> Result<Json, String> {
    let mut items = Vec::new();
    for raw in input.lines() {
        let stripped = strip_comment(raw);
        let text = stripped.trim_end();
        if text.trim().is_empty() {
            continue;
        }
        let indent = text.len() - text.trim_start().len();
        let content = text.trim_start().to_owned();
        if content == "---" && items.is_empty() {
            continue;
        }
        if content == "..." {
            break;
        }
        items.push((indent, content));
    }
    if items.is_empty() {
        return Ok(Json::Null);
    }
    let mut lines = Lines { items, pos: 0 };
    let value = parse_block(&mut lines)?;
    if lines.pos != lines.items.len() {
        return Err(format!(
            "unexpected content: {:?}",
            lines.items[lines.pos].1
        ));
    }
    Ok(value)
}

/// Removes a ` #` comment that is not inside quotes.
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut in_single = false;
    let mut in_double = false;
    let mut prev_ws = true;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'\'' if !in_double => in_single = !in_single,
            b'"' if !in_single => in_double = !in_double,
            b'#' if !in_single && !in_double && prev_ws => return &line[..i],
            _ => {}
        }
        prev_ws = b == b' ' || b == b'\t';
    }
    line
}

struct Lines {
    items: Vec<(usize, String)>,
    pos: usize,
}

impl Lines {
    fn peek(&self) -> Option<&(usize, String)> {
        self.items.get(self.pos)
    }

    fn take(&mut self) -> (usize, String) {
        let item = self.items[self.pos].clone();
        self.pos += 1;
        item
    }

    /// Re-queues inline content as a synthetic deeper line, used for
    /// `- key: value` sequence items.
    fn push_back(&mut self, indent: usize, content: String) {
        self.items.insert(self.pos, (indent, content));
    }
}

fn is_seq_item(content: &str) -> bool {
    content == "-" || content.starts_with("- ")
}

fn parse_block(lines: &mut Lines) -> Result<Json, String> {
    let (indent, content) = lines.peek().cloned().ok_or("unexpected end of input")?;
    if is_seq_item(&content) {
        parse_sequence(lines, indent)
    } else if split_mapping_key(&content)?.is_some() {
        parse_mapping(lines, indent)
    } else {
        let (_, content) = lines.take();
        parse_inline(&content)
    }
}

fn parse_sequence(lines: &mut Lines, indent: usize) -> Result<Json, String> {
    let mut items = Vec::new();
    while let Some((line_indent, content)) = lines.peek().cloned() {
        if line_indent != indent || !is_seq_item(&content) {
            break;
        }
        lines.take();
        let rest = content[1..].trim_start().to_owned();
        if rest.is_empty() {
            match lines.peek() {
                Some(&(child_indent, _)) if child_indent > indent => {
                    items.push(parse_block(lines)?);
                }
                _ => items.push(Json::Null),
            }
        } else if split_mapping_key(&rest)?.is_some() || is_seq_item(&rest) {
            lines.push_back(indent + 2, rest);
            items.push(parse_block(lines)?);
        } else {
            items.push(parse_inline(&rest)?);
        }
    }
    Ok(Json::Array(items))
}

fn parse_mapping(lines: &mut Lines, indent: usize) -> Result<Json, String> {
    let mut map = serde_json::Map::new();
    while let Some((line_indent, content)) = lines.peek().cloned() {
        if line_indent != indent {
            break;
        }
        let Some((key, rest)) = split_mapping_key(&content)? else {
            break;
        };
        lines.take();
        let value = if rest.is_empty() {
            match lines.peek() {
                Some(&(child_indent, _)) if child_indent > indent => parse_block(lines)?,
                Some(&(child_indent, ref child))
                    if child_indent == indent && is_seq_item(child) =>
                {
                    parse_sequence(lines, indent)?
                }
                _ => Json::Null,
            }
        } else {
            parse_inline(&rest)?
        };
        map.insert(key, value);
    }
    Ok(Json::Object(map))
}

/// Splits `key: rest` (or `key:`), honoring quoted keys and flow
/// brackets. Returns `None` for lines that are not mapping entries.
fn split_mapping_key(content: &str) -> Result<Option<(String, String)>, String> {
    let bytes = content.as_bytes();
    if bytes.first() == Some(&b'"') || bytes.first() == Some(&b'\'') {
        let quote = bytes[0];
        let mut i = 1;
        while i < bytes.len() {
            if bytes[i] == quote {
                if quote == b'\'' && bytes.get(i + 1) == Some(&b'\'') {
                    i += 2;
                    continue;
                }
                break;
            }
            if quote == b'"' && bytes[i] == b'\\' {
                i += 1;
            }
            i += 1;
        }
        if i >= bytes.len() {
            return Err(format!("unterminated quoted key: {content:?}"));
        }
        let after = &content[i + 1..];
        let Some(rest) = after.strip_prefix(':') else {
            return Ok(None);
        };
        let key = match parse_inline(&content[..=i])? {
            Json::String(s) => s,
            other => other.to_string(),
        };
        return Ok(Some((key, rest.trim_start().to_owned())));
    }

    let mut depth = 0usize;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'[' | b'{' => depth += 1,
            b']' | b'}' => depth = depth.saturating_sub(1),
            b':' if depth == 0 => {
                let rest = &content[i + 1..];
                if rest.is_empty() || rest.starts_with(' ') {
                    return Ok(Some((
                        content[..i].trim_end().to_owned(),
                        rest.trim_start().to_owned(),
                    )));
                }
            }
            _ => {}
        }
    }
    Ok(None)
}

/// A scalar or flow collection occupying the rest of a line.
fn parse_inline(content: &str) -> Result<Json, String> {
    let mut parser = FlowParser {
        bytes: content.as_bytes(),
        text: content,
        pos: 0,
        depth: 0,
    };
    let value = parser.parse_value()?;
    parser.skip_ws();
    if parser.pos != parser.bytes.len() {
        return Err(format!("unexpected trailing content in {content:?}"));
    }
    Ok(value)
}

struct FlowParser<'a> {
    bytes: &'a [u8],
    text: &'a str,
    pos: usize,
    /// Nesting depth of flow collections; plain scalars are terminated by
    /// flow punctuation only inside them.
    depth: usize,
}

impl FlowParser<'_> {
    fn skip_ws(&mut self) {
        while self.bytes.get(self.pos) == Some(&b' ') {
            self.pos += 1;
        }
    }

    fn parse_value(&mut self) -> Result<Json, String> {
        self.skip_ws();
        match self.bytes.get(self.pos) {
            None => Ok(Json::Null),
            Some(b'[') => self.parse_flow_seq(),
            Some(b'{') => self.parse_flow_map(),
            Some(b'"') => self.parse_double_quoted(),
            Some(b'\'') => self.parse_single_quoted(),
            Some(_) => self.parse_plain(),
        }
    }

    fn parse_flow_seq(&mut self) -> Result<Json, String> {
        self.pos += 1;
        self.depth += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.bytes.get(self.pos) {
                Some(b']') => {
                    self.pos += 1;
                    self.depth -= 1;
                    return Ok(Json::Array(items));
                }
                None => return Err("unterminated flow sequence".into()),
                _ => {}
            }
            items.push(self.parse_value()?);
            self.skip_ws();
            match self.bytes.get(self.pos) {
                Some(b',') => self.pos += 1,
                Some(b']') => {}
                _ => return Err("expected \",\" or \"]\" in flow sequence".into()),
            }
        }
    }

    fn parse_flow_map(&mut self) -> Result<Json, String> {
        self.pos += 1;
        self.depth += 1;
        let mut map = serde_json::Map::new();
        loop {
            self.skip_ws();
            match self.bytes.get(self.pos) {
                Some(b'}') => {
                    self.pos += 1;
                    self.depth -= 1;
                    return Ok(Json::Object(map));
                }
                None => return Err("unterminated flow mapping".into()),
                _ => {}
            }
            let key = match self.parse_value()? {
                Json::String(s) => s,
                other => other.to_string(),
            };
            self.skip_ws();
            if self.bytes.get(self.pos) != Some(&b':') {
                return Err("expected \":\" in flow mapping".into());
            }
            self.pos += 1;
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_ws();
            match self.bytes.get(self.pos) {
                Some(b',') => self.pos += 1,
                Some(b'}') => {}
                _ => return Err("expected \",\" or \"}\" in flow mapping".into()),
            }
        }
    }

    fn parse_double_quoted(&mut self) -> Result<Json, String> {
        let start = self.pos;
        self.pos += 1;
        while let Some(&b) = self.bytes.get(self.pos) {
            match b {
                b'"' => {
                    self.pos += 1;
                    let literal = &self.text[start..self.pos];
                    return serde_json::from_str::<Json>(literal)
                        .map_err(|e| format!("invalid string {literal:?}: {e}"));
                }
                b'\\' => self.pos += 2,
                _ => self.pos += 1,
            }
        }
        Err("unterminated double-quoted string".into())
    }

    fn parse_single_quoted(&mut self) -> Result<Json, String> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.bytes.get(self.pos) {
                None => return Err("unterminated single-quoted string".into()),
                Some(b'\'') => {
                    if self.bytes.get(self.pos + 1) == Some(&b'\'') {
                        out.push('\'');
                        self.pos += 2;
                    } else {
                        self.pos += 1;
                        return Ok(Json::String(out));
                    }
                }
                Some(_) => {
                    let chr = self.text[self.pos..].chars().next().unwrap();
                    out.push(chr);
                    self.pos += chr.len_utf8();
                }
            }
        }
    }

    fn parse_plain(&mut self) -> Result<Json, String> {
        let start = self.pos;
        while let Some(&b) = self.bytes.get(self.pos) {
            if self.depth > 0 && matches!(b, b',' | b']' | b'}' | b':') {
                break;
            }
            self.pos += 1;
        }
        let scalar = self.text[start..self.pos].trim();
        Ok(plain_scalar(scalar))
    }
}

fn plain_scalar(s: &str) -> Json {
    match s {
        "" | "null" | "~" | "Null" | "NULL" => return Json::Null,
        "true" | "True" | "TRUE" => return Json::Bool(true),
        "false" | "False" | "FALSE" => return Json::Bool(false),
        _ => {}
    }
    if s.bytes().next().is_some_and(|b| b.is_ascii_digit() || b == b'-' || b == b'+' || b == b'.')
    {
        if let Ok(n) = s.parse::<f64>() {
            if n.is_finite() {
                if let Some(n) = serde_json::Number::from_f64(n) {
                    return Json::Number(n);
                }
            }
        }
    }
    Json::String(s.to_owned())
}

#[cfg(test)]
mod tests {
    use super::parse_yaml;
    use serde_json::json;

    #[test]
    fn test_scalars() {
        assert_eq!(parse_yaml("null").unwrap(), json!(null));
        assert_eq!(parse_yaml("true").unwrap(), json!(true));
        assert_eq!(parse_yaml("1.5").unwrap(), json!(1.5));
        assert_eq!(parse_yaml("hello there").unwrap(), json!("hello there"));
        assert_eq!(parse_yaml("\"a: b\"").unwrap(), json!("a: b"));
        assert_eq!(parse_yaml("'it''s'").unwrap(), json!("it's"));
    }

    #[test]
    fn test_block_mapping() {
        let input = "---\n# config\na: 1\nb: two\nc:\n  d: true\n";
        assert_eq!(
            parse_yaml(input).unwrap(),
            json!({"a": 1.0, "b": "two", "c": {"d": true}}),
        );
    }

    #[test]
    fn test_sequences() {
        let input = "- 1\n- - 2\n- x: 7\n";
        assert_eq!(
            parse_yaml(input).unwrap(),
            json!([1.0, [2.0], {"x": 7.0}]),
        );

        let input = "items:\n- a\n- b\nother:\n  - c\n";
        assert_eq!(
            parse_yaml(input).unwrap(),
            json!({"items": ["a", "b"], "other": ["c"]}),
        );
    }

    #[test]
    fn test_flow() {
        let input = "a: [1, 2, {b: ok}]\n";
        assert_eq!(
            parse_yaml(input).unwrap(),
            json!({"a": [1.0, 2.0, {"b": "ok"}]}),
        );
    }

    #[test]
    fn test_errors() {
        assert!(parse_yaml("a: [1").is_err());
        assert!(parse_yaml("\"unterminated").is_err());
    }
}
