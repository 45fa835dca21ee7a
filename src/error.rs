use ariadne::{Color, Config, Fmt, Label, Report, ReportKind, Source};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Half-open range of char offsets into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn single(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos + 1,
        }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// 1-based line and column of the span start.
    pub fn line_col(&self, source: &str) -> (usize, usize) {
        let mut line = 1;
        let mut col = 1;
        for c in source.chars().take(self.start) {
            if c == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        (line, col)
    }
}

/// 1-based line and column, as printed by the JSON dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// Line starts of a source text, so that many offsets can be turned into
/// positions without rescanning from the beginning each time.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .chars()
                .enumerate()
                .filter(|(_, c)| *c == '\n')
                .map(|(offset, _)| offset + 1),
        );
        Self { line_starts }
    }

    /// Position of a char offset; agrees with [`Span::line_col`].
    pub fn position(&self, offset: usize) -> Position {
        let line = self.line_starts.partition_point(|start| *start <= offset);
        let line_start = self.line_starts.get(line.wrapping_sub(1)).copied().unwrap_or(0);
        Position {
            line: line.max(1),
            column: offset - line_start + 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    LexError,
    ParseError,
    ReferenceError,
    TypeError,
    ConstReassignment,
    SuperMisuse,
    Redeclaration,
    RangeError,
    IoError,
}

impl ErrorKind {
    fn color(self) -> Color {
        match self {
            ErrorKind::LexError => Color::Red,
            ErrorKind::ParseError => Color::Yellow,
            ErrorKind::IoError => Color::Blue,
            _ => Color::Magenta,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ErrorKind::LexError => "LexError",
            ErrorKind::ParseError => "ParseError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ConstReassignment => "ConstReassignmentError",
            ErrorKind::SuperMisuse => "SuperMisuseError",
            ErrorKind::Redeclaration => "SyntaxError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::IoError => "IoError",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct JsError {
    pub kind: ErrorKind,
    pub span: Span,
    pub message: String,
    pub help: Option<String>,
}

pub type JsResult<T> = Result<T, JsError>;

impl JsError {
    pub fn new(kind: ErrorKind, span: Span, message: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            message: message.into(),
            help: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn lex_error(span: Span, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LexError, span, message)
    }

    pub fn parse_error(span: Span, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseError, span, message)
    }

    pub fn reference_error(span: Span, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ReferenceError, span, message)
    }

    pub fn type_error(span: Span, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, span, message)
    }

    pub fn const_reassignment(span: Span, name: &str) -> Self {
        Self::new(
            ErrorKind::ConstReassignment,
            span,
            format!("Assignment to constant variable '{}'", name),
        )
        .with_help(format!("Declare '{}' with 'let' if it needs to change.", name))
    }

    pub fn super_misuse(span: Span, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SuperMisuse, span, message)
    }

    pub fn redeclaration(span: Span, name: &str) -> Self {
        Self::new(
            ErrorKind::Redeclaration,
            span,
            format!("Identifier '{}' has already been declared", name),
        )
    }

    pub fn range_error(span: Span, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RangeError, span, message)
    }

    pub fn io_error(span: Span, error: std::io::Error) -> Self {
        Self::new(ErrorKind::IoError, span, format!("Failed to write output: {}", error))
    }

    /// Whether this error came from the front end rather than evaluation.
    pub fn is_syntax(&self) -> bool {
        matches!(self.kind, ErrorKind::LexError | ErrorKind::ParseError)
    }

    fn build_report<'a>(&self, filename: &'a str, color: bool) -> Report<'a, (&'a str, std::ops::Range<usize>)> {
        let kind_color = self.kind.color();
        let end = self.span.end.max(self.span.start + 1);

        let mut report_builder = Report::build(ReportKind::Error, filename, self.span.start)
            .with_config(Config::default().with_color(color))
            .with_message(format!("{}: {}", self.kind.fg(kind_color), self.message))
            .with_label(
                Label::new((filename, self.span.start..end))
                    .with_message(&self.message)
                    .with_color(kind_color),
            );

        if let Some(ref help_text) = self.help {
            report_builder = report_builder.with_note(format!("{}: {}", "help".fg(Color::Cyan), help_text));
        }

        report_builder.finish()
    }

    /// Print a diagnostic for this error to stderr.
    pub fn report(&self, source: &str, filename: Option<&str>) {
        let filename = filename.unwrap_or("<repl>");
        if let Err(io) = self
            .build_report(filename, true)
            .eprint((filename, Source::from(source)))
        {
            eprintln!("{} (while reporting: {})", self, io);
        }
    }

    /// Render the diagnostic without colour, for embedders and tests.
    pub fn render(&self, source: &str, filename: Option<&str>) -> String {
        let filename = filename.unwrap_or("<repl>");
        let mut buffer = Vec::new();
        match self
            .build_report(filename, false)
            .write((filename, Source::from(source)), &mut buffer)
        {
            Ok(()) => String::from_utf8_lossy(&buffer).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_counts_newlines() {
        let source = "let a = 1;\nlet b = c;";
        let span = Span::new(19, 20);
        assert_eq!(span.line_col(source), (2, 9));
    }

    #[test]
    fn line_index_agrees_with_line_col() {
        let source = "a\n\nbc\nd";
        let index = LineIndex::new(source);
        for offset in 0..=source.chars().count() {
            let (line, column) = Span::single(offset).line_col(source);
            assert_eq!(index.position(offset), Position { line, column });
        }
    }

    #[test]
    fn display_prefixes_kind() {
        let error = JsError::reference_error(Span::single(0), "x is not defined");
        assert_eq!(error.to_string(), "ReferenceError: x is not defined");
    }

    #[test]
    fn render_mentions_message() {
        let source = "x + 1";
        let error = JsError::reference_error(Span::new(0, 1), "x is not defined");
        let rendered = error.render(source, Some("test.js"));
        assert!(rendered.contains("x is not defined"));
        assert!(rendered.contains("test.js"));
    }
}
