//! Output rendering
//!
//! Streams rows into the response body in one of the wire formats. CSV is
//! the native format with four configurable one-byte separators; JSON and
//! Python render nested values properly. `wrapped_json` prepends the column
//! names so clients do not have to repeat them.

use std::borrow::Cow;
use std::io::Write;

use crate::column::ColumnData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
    Python,
    WrappedJson,
}

impl OutputFormat {
    pub fn parse(token: &str) -> Option<OutputFormat> {
        Some(match token {
            "csv" => OutputFormat::Csv,
            "json" => OutputFormat::Json,
            "python" | "python3" => OutputFormat::Python,
            "wrapped_json" => OutputFormat::WrappedJson,
            _ => return None,
        })
    }
}

/// Byte codes for dataset / field / list / host-service separation in CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Separators {
    pub dataset: u8,
    pub field: u8,
    pub list: u8,
    pub host_service: u8,
}

impl Default for Separators {
    fn default() -> Self {
        Separators {
            dataset: b'\n',
            field: b';',
            list: b',',
            host_service: b'|',
        }
    }
}

impl Separators {
    /// Parse the four decimal byte codes of a `Separators:` header.
    pub fn parse(line: &str) -> Option<Separators> {
        let mut codes = line.split_whitespace().map(|t| t.parse::<u8>().ok());
        let mut next = || codes.next().flatten();
        let parsed = Separators {
            dataset: next()?,
            field: next()?,
            list: next()?,
            host_service: next()?,
        };
        Some(parsed)
    }
}

/// Assumed encoding of blob payloads when they are lifted into JSON or
/// Python strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Latin1,
    Mixed,
}

impl Encoding {
    pub fn parse(token: &str) -> Option<Encoding> {
        Some(match token {
            "utf8" => Encoding::Utf8,
            "latin1" => Encoding::Latin1,
            "mixed" => Encoding::Mixed,
            _ => return None,
        })
    }

    fn lift<'a>(self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self {
            Encoding::Latin1 => bytes.iter().map(|&b| b as char).collect::<String>().into(),
            Encoding::Utf8 | Encoding::Mixed => String::from_utf8_lossy(bytes),
        }
    }
}

/// Streaming row renderer. The caller drives it strictly as
/// `begin_query (begin_row field* end_row)* end_query`.
pub struct Renderer {
    format: OutputFormat,
    separators: Separators,
    encoding: Encoding,
    rows_emitted: usize,
}

impl Renderer {
    pub fn new(format: OutputFormat, separators: Separators, encoding: Encoding) -> Renderer {
        Renderer {
            format,
            separators,
            encoding,
            rows_emitted: 0,
        }
    }

    pub fn begin_query(&mut self, out: &mut Vec<u8>, column_names: Option<&[String]>) {
        match self.format {
            OutputFormat::Csv => {}
            OutputFormat::Json | OutputFormat::Python => out.push(b'['),
            OutputFormat::WrappedJson => {
                out.extend_from_slice(b"{\"columns\":");
                write_json(out, &column_names.unwrap_or(&[]));
                out.extend_from_slice(b",\"rows\":[");
            }
        }
    }

    pub fn begin_row(&mut self, out: &mut Vec<u8>) {
        match self.format {
            OutputFormat::Csv => {
                if self.rows_emitted > 0 {
                    out.push(self.separators.dataset);
                }
            }
            OutputFormat::Json | OutputFormat::WrappedJson | OutputFormat::Python => {
                if self.rows_emitted > 0 {
                    out.push(b',');
                }
                out.push(b'[');
            }
        }
    }

    pub fn field(&mut self, out: &mut Vec<u8>, index: usize, value: &ColumnData<'_>) {
        if index > 0 {
            out.push(match self.format {
                OutputFormat::Csv => self.separators.field,
                _ => b',',
            });
        }
        match self.format {
            OutputFormat::Csv => self.csv_value(out, value),
            OutputFormat::Json | OutputFormat::WrappedJson => self.json_value(out, value),
            OutputFormat::Python => self.python_value(out, value),
        }
    }

    pub fn end_row(&mut self, out: &mut Vec<u8>) {
        match self.format {
            OutputFormat::Csv => {}
            _ => out.push(b']'),
        }
        self.rows_emitted += 1;
    }

    pub fn end_query(&mut self, out: &mut Vec<u8>) {
        match self.format {
            OutputFormat::Csv => {
                if self.rows_emitted > 0 {
                    out.push(self.separators.dataset);
                }
            }
            OutputFormat::Json | OutputFormat::Python => out.extend_from_slice(b"]\n"),
            OutputFormat::WrappedJson => out.extend_from_slice(b"]}\n"),
        }
    }

    fn csv_value(&self, out: &mut Vec<u8>, value: &ColumnData<'_>) {
        match value {
            ColumnData::Int(v) => push_fmt(out, format_args!("{}", v)),
            ColumnData::Time(v) => push_fmt(out, format_args!("{}", v)),
            ColumnData::Double(v) => push_fmt(out, format_args!("{}", v)),
            ColumnData::Str(s) => out.extend_from_slice(s.as_bytes()),
            ColumnData::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(self.separators.list);
                    }
                    out.extend_from_slice(item.as_bytes());
                }
            }
            ColumnData::HostServiceList(items) => {
                for (i, (host, service)) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(self.separators.list);
                    }
                    out.extend_from_slice(host.as_bytes());
                    out.push(self.separators.host_service);
                    out.extend_from_slice(service.as_bytes());
                }
            }
            ColumnData::Dict(pairs) => {
                for (i, (key, val)) in pairs.iter().enumerate() {
                    if i > 0 {
                        out.push(self.separators.list);
                    }
                    out.extend_from_slice(key.as_bytes());
                    out.push(self.separators.host_service);
                    out.extend_from_slice(val.as_bytes());
                }
            }
            ColumnData::Blob(bytes) => out.extend_from_slice(bytes),
            ColumnData::Null => {}
        }
    }

    fn json_value(&self, out: &mut Vec<u8>, value: &ColumnData<'_>) {
        match value {
            ColumnData::Int(v) => push_fmt(out, format_args!("{}", v)),
            ColumnData::Time(v) => push_fmt(out, format_args!("{}", v)),
            ColumnData::Double(v) => write_json(out, v),
            ColumnData::Str(s) => write_json(out, s.as_ref()),
            ColumnData::List(items) => {
                out.push(b'[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(b',');
                    }
                    write_json(out, item.as_ref());
                }
                out.push(b']');
            }
            ColumnData::HostServiceList(items) => {
                out.push(b'[');
                for (i, (host, service)) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(b',');
                    }
                    out.push(b'[');
                    write_json(out, host.as_ref());
                    out.push(b',');
                    write_json(out, service.as_ref());
                    out.push(b']');
                }
                out.push(b']');
            }
            ColumnData::Dict(pairs) => {
                out.push(b'{');
                for (i, (key, val)) in pairs.iter().enumerate() {
                    if i > 0 {
                        out.push(b',');
                    }
                    write_json(out, key.as_ref());
                    out.push(b':');
                    write_json(out, val.as_ref());
                }
                out.push(b'}');
            }
            ColumnData::Blob(bytes) => write_json(out, self.encoding.lift(bytes).as_ref()),
            ColumnData::Null => out.extend_from_slice(b"null"),
        }
    }

    fn python_value(&self, out: &mut Vec<u8>, value: &ColumnData<'_>) {
        match value {
            ColumnData::Int(v) => push_fmt(out, format_args!("{}", v)),
            ColumnData::Time(v) => push_fmt(out, format_args!("{}", v)),
            ColumnData::Double(v) => push_fmt(out, format_args!("{}", v)),
            ColumnData::Str(s) => python_repr(out, s),
            ColumnData::List(items) => {
                out.push(b'[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.extend_from_slice(b", ");
                    }
                    python_repr(out, item);
                }
                out.push(b']');
            }
            ColumnData::HostServiceList(items) => {
                out.push(b'[');
                for (i, (host, service)) in items.iter().enumerate() {
                    if i > 0 {
                        out.extend_from_slice(b", ");
                    }
                    out.push(b'[');
                    python_repr(out, host);
                    out.extend_from_slice(b", ");
                    python_repr(out, service);
                    out.push(b']');
                }
                out.push(b']');
            }
            ColumnData::Dict(pairs) => {
                out.push(b'{');
                for (i, (key, val)) in pairs.iter().enumerate() {
                    if i > 0 {
                        out.extend_from_slice(b", ");
                    }
                    python_repr(out, key);
                    out.extend_from_slice(b": ");
                    python_repr(out, val);
                }
                out.push(b'}');
            }
            ColumnData::Blob(bytes) => python_repr(out, &self.encoding.lift(bytes)),
            ColumnData::Null => out.extend_from_slice(b"None"),
        }
    }
}

fn push_fmt(out: &mut Vec<u8>, args: std::fmt::Arguments<'_>) {
    // Writing into a Vec cannot fail.
    let _ = out.write_fmt(args);
}

fn write_json<T: serde::Serialize + ?Sized>(out: &mut Vec<u8>, value: &T) {
    if let Err(err) = serde_json::to_writer(&mut *out, value) {
        tracing::error!("JSON encoding failed: {}", err);
    }
}

/// Single-quoted Python string literal.
fn python_repr(out: &mut Vec<u8>, s: &str) {
    out.push(b'\'');
    for c in s.chars() {
        match c {
            '\\' => out.extend_from_slice(b"\\\\"),
            '\'' => out.extend_from_slice(b"\\'"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            c if (c as u32) < 0x20 => push_fmt(out, format_args!("\\x{:02x}", c as u32)),
            c => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out.push(b'\'');
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    fn render_rows(format: OutputFormat, rows: &[Vec<ColumnData<'_>>]) -> String {
        let mut renderer = Renderer::new(format, Separators::default(), Encoding::Utf8);
        let mut out = Vec::new();
        let names = vec!["a".to_string(), "b".to_string()];
        renderer.begin_query(&mut out, Some(&names));
        for row in rows {
            renderer.begin_row(&mut out);
            for (i, value) in row.iter().enumerate() {
                renderer.field(&mut out, i, value);
            }
            renderer.end_row(&mut out);
        }
        renderer.end_query(&mut out);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_csv_rows() {
        let rows = vec![
            vec![ColumnData::Str(Cow::Borrowed("h1")), ColumnData::Int(0)],
            vec![ColumnData::Str(Cow::Borrowed("h2")), ColumnData::Int(1)],
        ];
        assert_eq!(render_rows(OutputFormat::Csv, &rows), "h1;0\nh2;1\n");
    }

    #[test]
    fn test_csv_list_and_pairs() {
        let rows = vec![vec![
            ColumnData::List(vec![Cow::Borrowed("a"), Cow::Borrowed("b")]),
            ColumnData::HostServiceList(vec![(Cow::Borrowed("h"), Cow::Borrowed("svc"))]),
        ]];
        assert_eq!(render_rows(OutputFormat::Csv, &rows), "a,b;h|svc\n");
    }

    #[test]
    fn test_json_escaping() {
        let rows = vec![vec![
            ColumnData::Str(Cow::Borrowed("say \"hi\"\n")),
            ColumnData::Double(1.5),
        ]];
        assert_eq!(
            render_rows(OutputFormat::Json, &rows),
            "[[\"say \\\"hi\\\"\\n\",1.5]]\n"
        );
    }

    #[test]
    fn test_wrapped_json_carries_columns() {
        let rows = vec![vec![ColumnData::Str(Cow::Borrowed("x")), ColumnData::Int(3)]];
        assert_eq!(
            render_rows(OutputFormat::WrappedJson, &rows),
            "{\"columns\":[\"a\",\"b\"],\"rows\":[[\"x\",3]]}\n"
        );
    }

    #[test]
    fn test_python_repr() {
        let rows = vec![vec![
            ColumnData::Str(Cow::Borrowed("it's\n")),
            ColumnData::Dict(vec![(Cow::Borrowed("k"), Cow::Borrowed("v"))]),
        ]];
        assert_eq!(
            render_rows(OutputFormat::Python, &rows),
            "[['it\\'s\\n', {'k': 'v'}]]\n"
        );
    }

    #[test]
    fn test_custom_separators() {
        let mut renderer = Renderer::new(
            OutputFormat::Csv,
            Separators::parse("10 9 32 47").unwrap(),
            Encoding::Utf8,
        );
        let mut out = Vec::new();
        renderer.begin_query(&mut out, None);
        renderer.begin_row(&mut out);
        renderer.field(&mut out, 0, &ColumnData::Str(Cow::Borrowed("x")));
        renderer.field(
            &mut out,
            1,
            &ColumnData::List(vec![Cow::Borrowed("a"), Cow::Borrowed("b")]),
        );
        renderer.end_row(&mut out);
        renderer.end_query(&mut out);
        assert_eq!(String::from_utf8(out).unwrap(), "x\ta b\n");
    }

    #[test]
    fn test_latin1_blob_lift() {
        let mut renderer = Renderer::new(
            OutputFormat::Json,
            Separators::default(),
            Encoding::Latin1,
        );
        let mut out = Vec::new();
        renderer.begin_query(&mut out, None);
        renderer.begin_row(&mut out);
        renderer.field(&mut out, 0, &ColumnData::Blob(Cow::Borrowed(&[0xe4u8])));
        renderer.end_row(&mut out);
        renderer.end_query(&mut out);
        assert_eq!(String::from_utf8(out).unwrap(), "[[\"\u{e4}\"]]\n");
    }
}
