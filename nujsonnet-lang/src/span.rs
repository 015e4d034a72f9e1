//! Source files and byte spans.

/// Identifies a source file registered in a [`SourceMap`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(u32);

/// A half-open byte range within one source file.
///
/// Every AST and core-AST node carries one; it is the sole input to error
/// locations and stack frames.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Span {
    pub src: SourceId,
    pub begin: u32,
    pub end: u32,
}

impl Span {
    #[must_use]
    pub fn new(src: SourceId, begin: usize, end: usize) -> Self {
        Self {
            src,
            begin: u32::try_from(begin).unwrap(),
            end: u32::try_from(end).unwrap(),
        }
    }

    /// The smallest span covering both `self` and `other`.
    #[must_use]
    pub fn surrounding(self, other: Span) -> Span {
        assert_eq!(self.src, other.src);
        Span {
            src: self.src,
            begin: self.begin.min(other.begin),
            end: self.end.max(other.end),
        }
    }
}

struct SourceFile {
    name: String,
    data: String,
    line_starts: Vec<u32>,
}

/// Registry of all source files known to a VM: the top-level snippet or
/// file, every import, the embedded standard library, ext-code fragments.
#[derive(Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    #[must_use]
    pub fn new() -> Self {
        Self { files: Vec::new() }
    }

    pub fn add_file(&mut self, name: &str, data: String) -> SourceId {
        let mut line_starts = vec![0u32];
        for (i, b) in data.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        let id = SourceId(u32::try_from(self.files.len()).unwrap());
        self.files.push(SourceFile {
            name: name.into(),
            data,
            line_starts,
        });
        id
    }

    #[must_use]
    pub fn name(&self, src: SourceId) -> &str {
        &self.files[src.0 as usize].name
    }

    #[must_use]
    pub fn data(&self, src: SourceId) -> &str {
        &self.files[src.0 as usize].data
    }

    /// 1-based line and column of a byte offset. Columns count code points.
    #[must_use]
    pub fn position(&self, src: SourceId, offset: u32) -> (usize, usize) {
        let file = &self.files[src.0 as usize];
        let line = file.line_starts.partition_point(|&s| s <= offset) - 1;
        let line_start = file.line_starts[line] as usize;
        let col = file.data[line_start..offset as usize].chars().count() + 1;
        (line + 1, col)
    }

    /// Renders a span the way error messages and stack frames expect it:
    /// `file:l:c` for a point, `file:l:c1-c2` within one line (end column
    /// exclusive), `file:(l1:c1)-(l2:c2)` across lines.
    #[must_use]
    pub fn describe(&self, span: Span) -> String {
        let name = self.name(span.src);
        let (bl, bc) = self.position(span.src, span.begin);
        let (el, ec) = self.position(span.src, span.end);
        if bl == el {
            if ec > bc + 1 || ec == bc {
                format!("{name}:{bl}:{bc}-{ec}")
            } else {
                format!("{name}:{bl}:{bc}")
            }
        } else {
            format!("{name}:({bl}:{bc})-({el}:{ec})")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SourceMap;
    use super::Span;

    #[test]
    fn test_positions() {
        let mut map = SourceMap::new();
        let src = map.add_file("t.jsonnet", "ab\ncd\n".into());
        assert_eq!(map.position(src, 0), (1, 1));
        assert_eq!(map.position(src, 1), (1, 2));
        assert_eq!(map.position(src, 2), (1, 3));
        assert_eq!(map.position(src, 3), (2, 1));
        assert_eq!(map.position(src, 5), (2, 3));
        assert_eq!(map.position(src, 6), (3, 1));
    }

    #[test]
    fn test_describe() {
        let mut map = SourceMap::new();
        let src = map.add_file("t.jsonnet", "error \"x\"\nrest\n".into());
        assert_eq!(map.describe(Span::new(src, 0, 9)), "t.jsonnet:1:1-10");
        assert_eq!(map.describe(Span::new(src, 6, 7)), "t.jsonnet:1:7");
        assert_eq!(
            map.describe(Span::new(src, 0, 12)),
            "t.jsonnet:(1:1)-(2:3)"
        );
    }

    #[test]
    fn test_multibyte_columns() {
        let mut map = SourceMap::new();
        let src = map.add_file("t.jsonnet", "\u{3b1}\u{3b2} x".into());
        // Two 2-byte characters, then a space, then `x` at byte 5.
        assert_eq!(map.position(src, 5), (1, 4));
    }
}
