use crate::error::{JsError, JsResult, Span};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Colon,
    Semicolon,
    Dot,
    Question,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    PlusEqual,
    MinusEqual,
    StarEqual,
    SlashEqual,
    PercentEqual,
    Bang,
    BangEqual,
    BangEqualEqual,
    Equal,
    EqualEqual,
    EqualEqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    AmpAmp,
    PipePipe,
    Arrow,
    Ellipsis,

    // Literals
    Identifier,
    String,
    Number,
    Template,

    // Keywords
    Await,
    Break,
    Class,
    Const,
    Continue,
    Default,
    Do,
    Else,
    Extends,
    False,
    For,
    Function,
    If,
    In,
    Let,
    New,
    Null,
    Return,
    Super,
    This,
    True,
    Typeof,
    Var,
    While,

    // Special
    Eof,
}

impl TokenType {
    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            TokenType::Await
                | TokenType::Break
                | TokenType::Class
                | TokenType::Const
                | TokenType::Continue
                | TokenType::Default
                | TokenType::Do
                | TokenType::Else
                | TokenType::Extends
                | TokenType::False
                | TokenType::For
                | TokenType::Function
                | TokenType::If
                | TokenType::In
                | TokenType::Let
                | TokenType::New
                | TokenType::Null
                | TokenType::Return
                | TokenType::Super
                | TokenType::This
                | TokenType::True
                | TokenType::Typeof
                | TokenType::Var
                | TokenType::While
        )
    }
}

/// One segment of a template literal: raw text (escapes already decoded) or
/// the tokens of an embedded `${...}` expression, terminated by `Eof`.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Expr(Vec<Token>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    /// Source text for most tokens; the decoded value for string literals.
    pub lexeme: String,
    pub span: Span,
    /// True when a line terminator separates this token from the previous one.
    pub newline_before: bool,
    pub template: Vec<TemplatePart>,
}

impl Token {
    pub fn new(token_type: TokenType, lexeme: String, span: Span) -> Self {
        Self {
            token_type,
            lexeme,
            span,
            newline_before: false,
            template: Vec::new(),
        }
    }

    /// Lexeme as shown in diagnostics.
    pub fn describe(&self) -> String {
        match self.token_type {
            TokenType::Eof => "end of input".to_string(),
            TokenType::String => format!("\"{}\"", self.lexeme),
            TokenType::Template => "template literal".to_string(),
            _ => self.lexeme.clone(),
        }
    }
}

fn keywords() -> HashMap<&'static str, TokenType> {
    let mut keywords = HashMap::new();
    keywords.insert("await", TokenType::Await);
    keywords.insert("break", TokenType::Break);
    keywords.insert("class", TokenType::Class);
    keywords.insert("const", TokenType::Const);
    keywords.insert("continue", TokenType::Continue);
    keywords.insert("default", TokenType::Default);
    keywords.insert("do", TokenType::Do);
    keywords.insert("else", TokenType::Else);
    keywords.insert("extends", TokenType::Extends);
    keywords.insert("false", TokenType::False);
    keywords.insert("for", TokenType::For);
    keywords.insert("function", TokenType::Function);
    keywords.insert("if", TokenType::If);
    keywords.insert("in", TokenType::In);
    keywords.insert("let", TokenType::Let);
    keywords.insert("new", TokenType::New);
    keywords.insert("null", TokenType::Null);
    keywords.insert("return", TokenType::Return);
    keywords.insert("super", TokenType::Super);
    keywords.insert("this", TokenType::This);
    keywords.insert("true", TokenType::True);
    keywords.insert("typeof", TokenType::Typeof);
    keywords.insert("var", TokenType::Var);
    keywords.insert("while", TokenType::While);
    keywords
}

/// Scanner over a source string. Spans are char offsets.
///
/// Tokens can be pulled one at a time through the `Iterator` impl or all at
/// once through [`Lexer::scan_tokens`]. The iterator ends after yielding
/// `Eof` or the first error.
pub struct Lexer {
    source: Vec<char>,
    pending: Vec<Token>,
    start: usize,
    current: usize,
    saw_newline: bool,
    finished: bool,
    keywords: HashMap<&'static str, TokenType>,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.chars().collect(),
            pending: Vec::new(),
            start: 0,
            current: 0,
            saw_newline: false,
            finished: false,
            keywords: keywords(),
        }
    }

    pub fn scan_tokens(&mut self) -> JsResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let at_end = token.token_type == TokenType::Eof;
            tokens.push(token);
            if at_end {
                break;
            }
        }
        tracing::trace!(count = tokens.len(), "scanned tokens");
        Ok(tokens)
    }

    /// Produce the next token, `Eof` once the input is exhausted.
    pub fn next_token(&mut self) -> JsResult<Token> {
        while self.pending.is_empty() {
            self.skip_trivia()?;
            if self.is_at_end() {
                let mut eof = Token::new(TokenType::Eof, String::new(), Span::single(self.current));
                eof.newline_before = std::mem::take(&mut self.saw_newline);
                return Ok(eof);
            }
            self.start = self.current;
            self.scan_token()?;
        }
        Ok(self.pending.remove(0))
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn skip_trivia(&mut self) -> JsResult<()> {
        loop {
            match self.peek() {
                ' ' | '\r' | '\t' => {
                    self.advance();
                }
                '\n' => {
                    self.saw_newline = true;
                    self.advance();
                }
                '/' if self.peek_next() == '/' => {
                    // Comment goes until end of line
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                }
                '/' if self.peek_next() == '*' => {
                    let start = self.current;
                    self.advance();
                    self.advance();
                    loop {
                        if self.is_at_end() {
                            return Err(JsError::lex_error(
                                Span::new(start, self.current),
                                "Unterminated block comment",
                            ));
                        }
                        if self.peek() == '*' && self.peek_next() == '/' {
                            self.advance();
                            self.advance();
                            break;
                        }
                        if self.advance() == '\n' {
                            self.saw_newline = true;
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn scan_token(&mut self) -> JsResult<()> {
        let c = self.advance();

        match c {
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            '{' => self.add_token(TokenType::LeftBrace),
            '}' => self.add_token(TokenType::RightBrace),
            '[' => self.add_token(TokenType::LeftBracket),
            ']' => self.add_token(TokenType::RightBracket),
            ',' => self.add_token(TokenType::Comma),
            ':' => self.add_token(TokenType::Colon),
            ';' => self.add_token(TokenType::Semicolon),
            '?' => self.add_token(TokenType::Question),
            '.' => {
                if self.peek().is_ascii_digit() {
                    self.number()?;
                } else if self.peek() == '.' && self.peek_next() == '.' {
                    self.advance();
                    self.advance();
                    self.add_token(TokenType::Ellipsis);
                } else {
                    self.add_token(TokenType::Dot);
                }
            }
            '+' => {
                let token_type = if self.match_char('+') {
                    TokenType::PlusPlus
                } else if self.match_char('=') {
                    TokenType::PlusEqual
                } else {
                    TokenType::Plus
                };
                self.add_token(token_type);
            }
            '-' => {
                let token_type = if self.match_char('-') {
                    TokenType::MinusMinus
                } else if self.match_char('=') {
                    TokenType::MinusEqual
                } else {
                    TokenType::Minus
                };
                self.add_token(token_type);
            }
            '*' => {
                let token_type = if self.match_char('=') {
                    TokenType::StarEqual
                } else {
                    TokenType::Star
                };
                self.add_token(token_type);
            }
            '/' => {
                let token_type = if self.match_char('=') {
                    TokenType::SlashEqual
                } else {
                    TokenType::Slash
                };
                self.add_token(token_type);
            }
            '%' => {
                let token_type = if self.match_char('=') {
                    TokenType::PercentEqual
                } else {
                    TokenType::Percent
                };
                self.add_token(token_type);
            }
            '!' => {
                let token_type = if self.match_char('=') {
                    if self.match_char('=') {
                        TokenType::BangEqualEqual
                    } else {
                        TokenType::BangEqual
                    }
                } else {
                    TokenType::Bang
                };
                self.add_token(token_type);
            }
            '=' => {
                let token_type = if self.match_char('=') {
                    if self.match_char('=') {
                        TokenType::EqualEqualEqual
                    } else {
                        TokenType::EqualEqual
                    }
                } else if self.match_char('>') {
                    TokenType::Arrow
                } else {
                    TokenType::Equal
                };
                self.add_token(token_type);
            }
            '<' => {
                let token_type = if self.match_char('=') {
                    TokenType::LessEqual
                } else {
                    TokenType::Less
                };
                self.add_token(token_type);
            }
            '>' => {
                let token_type = if self.match_char('=') {
                    TokenType::GreaterEqual
                } else {
                    TokenType::Greater
                };
                self.add_token(token_type);
            }
            '&' if self.match_char('&') => self.add_token(TokenType::AmpAmp),
            '|' if self.match_char('|') => self.add_token(TokenType::PipePipe),
            '"' | '\'' => self.string(c)?,
            '`' => self.template()?,
            c if c.is_ascii_digit() => self.number()?,
            c if c.is_alphabetic() || c == '_' || c == '$' => self.identifier(),
            _ => {
                return Err(JsError::lex_error(
                    Span::single(self.current - 1),
                    format!("Unexpected character: '{}'", c),
                ));
            }
        }

        Ok(())
    }

    fn advance(&mut self) -> char {
        match self.source.get(self.current) {
            Some(&c) => {
                self.current += 1;
                c
            }
            None => '\0',
        }
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.peek() != expected {
            false
        } else {
            self.current += 1;
            true
        }
    }

    fn peek(&self) -> char {
        self.source.get(self.current).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.source.get(self.current + 1).copied().unwrap_or('\0')
    }

    fn text(&self, start: usize, end: usize) -> String {
        self.source[start..end].iter().collect()
    }

    /// Decode the escape sequence after a backslash.
    fn escape(&mut self, literal_start: usize) -> JsResult<char> {
        let c = self.advance();
        let decoded = match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            '0' => '\0',
            'u' => {
                let digits_start = self.current;
                for _ in 0..4 {
                    if !self.peek().is_ascii_hexdigit() {
                        return Err(JsError::lex_error(
                            Span::new(digits_start - 2, self.current),
                            "Invalid unicode escape sequence",
                        ));
                    }
                    self.advance();
                }
                let digits = self.text(digits_start, self.current);
                u32::from_str_radix(&digits, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| {
                        JsError::lex_error(
                            Span::new(digits_start - 2, self.current),
                            "Invalid unicode escape sequence",
                        )
                    })?
            }
            '\0' if self.is_at_end() => {
                return Err(JsError::lex_error(
                    Span::new(literal_start, self.current),
                    "Unterminated string",
                ));
            }
            other => other,
        };
        Ok(decoded)
    }

    fn string(&mut self, quote: char) -> JsResult<()> {
        let mut value = String::new();
        loop {
            if self.is_at_end() || self.peek() == '\n' {
                return Err(JsError::lex_error(
                    Span::new(self.start, self.current),
                    "Unterminated string",
                )
                .with_help(format!("Close the string with a matching {} on the same line.", quote)));
            }
            let c = self.advance();
            if c == quote {
                break;
            }
            if c == '\\' {
                let start = self.start;
                value.push(self.escape(start)?);
            } else {
                value.push(c);
            }
        }

        self.add_token_with_content(TokenType::String, value);
        Ok(())
    }

    fn template(&mut self) -> JsResult<()> {
        let template_start = self.start;
        let mut parts = Vec::new();
        let mut text = String::new();

        loop {
            if self.is_at_end() {
                return Err(JsError::lex_error(
                    Span::new(template_start, self.current),
                    "Unterminated template literal",
                )
                .with_help("Template literals must be closed with a backtick '`'."));
            }
            let c = self.advance();
            match c {
                '`' => break,
                '\\' => text.push(self.escape(template_start)?),
                '$' if self.peek() == '{' => {
                    self.advance();
                    parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                    let tokens = self.interpolation(template_start)?;
                    parts.push(TemplatePart::Expr(tokens));
                }
                other => text.push(other),
            }
        }
        parts.push(TemplatePart::Text(text));

        let mut token = Token::new(
            TokenType::Template,
            self.text(template_start, self.current),
            Span::new(template_start, self.current),
        );
        token.newline_before = std::mem::take(&mut self.saw_newline);
        token.template = parts;
        self.pending.push(token);
        Ok(())
    }

    /// Tokenize an embedded `${...}` expression up to its closing brace.
    fn interpolation(&mut self, template_start: usize) -> JsResult<Vec<Token>> {
        let outer = std::mem::take(&mut self.pending);
        let outer_newline = std::mem::take(&mut self.saw_newline);
        let mut tokens = Vec::new();
        let mut depth = 0usize;

        let result = loop {
            if let Err(error) = self.skip_trivia() {
                break Err(error);
            }
            if self.is_at_end() {
                break Err(JsError::lex_error(
                    Span::new(template_start, self.current),
                    "Unterminated template expression",
                )
                .with_help("Close the embedded expression with '}'."));
            }
            if self.peek() == '}' && depth == 0 {
                self.advance();
                tokens.push(Token::new(TokenType::Eof, String::new(), Span::single(self.current - 1)));
                break Ok(());
            }
            self.start = self.current;
            if let Err(error) = self.scan_token() {
                break Err(error);
            }
            for token in self.pending.drain(..) {
                match token.token_type {
                    TokenType::LeftBrace => depth += 1,
                    TokenType::RightBrace => depth = depth.saturating_sub(1),
                    _ => {}
                }
                tokens.push(token);
            }
        };

        self.pending = outer;
        self.saw_newline = outer_newline;
        result.map(|()| tokens)
    }

    fn number(&mut self) -> JsResult<()> {
        let first = self.source[self.start];
        if first == '0' && matches!(self.peek(), 'x' | 'X') {
            self.advance();
            let digits_start = self.current;
            while self.peek().is_ascii_hexdigit() {
                self.advance();
            }
            let digits = self.text(digits_start, self.current);
            let value = u64::from_str_radix(&digits, 16).map_err(|_| {
                JsError::lex_error(
                    Span::new(self.start, self.current),
                    format!("Invalid hexadecimal literal: {}", self.text(self.start, self.current)),
                )
            })?;
            self.add_token_with_content(TokenType::Number, (value as f64).to_string());
            return Ok(());
        }

        while self.peek().is_ascii_digit() {
            self.advance();
        }

        // Look for fractional part
        if first != '.' && self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();
        }
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if matches!(self.peek(), 'e' | 'E') {
            let next = self.peek_next();
            let after_sign = self.source.get(self.current + 2).copied().unwrap_or('\0');
            if next.is_ascii_digit() || (matches!(next, '+' | '-') && after_sign.is_ascii_digit()) {
                self.advance();
                if matches!(self.peek(), '+' | '-') {
                    self.advance();
                }
                while self.peek().is_ascii_digit() {
                    self.advance();
                }
            }
        }

        if self.peek().is_alphabetic() || self.peek() == '_' || self.peek() == '$' {
            return Err(JsError::lex_error(
                Span::new(self.start, self.current + 1),
                "Identifier starts immediately after numeric literal",
            ));
        }

        let number_slice = self.text(self.start, self.current);
        if parse_number(&number_slice).is_none() {
            return Err(JsError::lex_error(
                Span::new(self.start, self.current),
                format!("Invalid number: {}", number_slice),
            ));
        }
        self.add_token(TokenType::Number);
        Ok(())
    }

    fn identifier(&mut self) {
        while self.peek().is_alphanumeric() || self.peek() == '_' || self.peek() == '$' {
            self.advance();
        }

        let text = self.text(self.start, self.current);
        let token_type = self
            .keywords
            .get(text.as_str())
            .copied()
            .unwrap_or(TokenType::Identifier);

        self.add_token_with_content(token_type, text);
    }

    fn add_token(&mut self, token_type: TokenType) {
        let text = self.text(self.start, self.current);
        self.add_token_with_content(token_type, text);
    }

    fn add_token_with_content(&mut self, token_type: TokenType, lexeme: String) {
        let mut token = Token::new(token_type, lexeme, Span::new(self.start, self.current));
        token.newline_before = std::mem::take(&mut self.saw_newline);
        self.pending.push(token);
    }
}

impl Iterator for Lexer {
    type Item = JsResult<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let result = self.next_token();
        if !matches!(&result, Ok(token) if token.token_type != TokenType::Eof) {
            self.finished = true;
        }
        Some(result)
    }
}

/// Numeric value of a `Number` token's lexeme.
pub fn parse_number(lexeme: &str) -> Option<f64> {
    if lexeme.starts_with('.') {
        format!("0{}", lexeme).parse().ok()
    } else {
        lexeme.parse().ok()
    }
}

/// Tokenize a complete source text.
pub fn tokenize(source: &str) -> JsResult<Vec<Token>> {
    Lexer::new(source).scan_tokens()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    fn types(source: &str) -> Vec<TokenType> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|token| token.token_type)
            .collect()
    }

    #[test]
    fn scans_operators_longest_first() {
        assert_eq!(
            types("a === b !== c => ...d"),
            vec![
                TokenType::Identifier,
                TokenType::EqualEqualEqual,
                TokenType::Identifier,
                TokenType::BangEqualEqual,
                TokenType::Identifier,
                TokenType::Arrow,
                TokenType::Ellipsis,
                TokenType::Identifier,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            types("class Dog extends Animal { }"),
            vec![
                TokenType::Class,
                TokenType::Identifier,
                TokenType::Extends,
                TokenType::Identifier,
                TokenType::LeftBrace,
                TokenType::RightBrace,
                TokenType::Eof,
            ]
        );
        assert_eq!(types("$el _x"), vec![TokenType::Identifier, TokenType::Identifier, TokenType::Eof]);
    }

    #[test]
    fn contextual_words_are_identifiers() {
        assert_eq!(
            types("async of await"),
            vec![TokenType::Identifier, TokenType::Identifier, TokenType::Await, TokenType::Eof]
        );
    }

    #[test]
    fn comments_are_discarded() {
        let tokens = tokenize("// line\n/* block\n comment */ x").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].lexeme, "x");
        assert!(tokens[0].newline_before);
    }

    #[test]
    fn string_escapes_are_decoded() {
        let tokens = tokenize(r#"'it\'s' "a\tbA""#).unwrap();
        assert_eq!(tokens[0].lexeme, "it's");
        assert_eq!(tokens[1].lexeme, "a\tbA");
    }

    #[test]
    fn numbers() {
        let tokens = tokenize("42 3.14 .5 1e3 0xff").unwrap();
        let lexemes: Vec<&str> = tokens.iter().map(|token| token.lexeme.as_str()).collect();
        assert_eq!(lexemes, vec!["42", "3.14", ".5", "1e3", "255", ""]);
    }

    #[test]
    fn template_with_nested_interpolation() {
        let tokens = tokenize("`a${ {x: `in${1}`}.x }b`").unwrap();
        assert_eq!(tokens[0].token_type, TokenType::Template);
        let parts = &tokens[0].template;
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], TemplatePart::Text("a".to_string()));
        assert_eq!(parts[2], TemplatePart::Text("b".to_string()));
        match &parts[1] {
            TemplatePart::Expr(inner) => {
                assert_eq!(inner.first().map(|t| t.token_type), Some(TokenType::LeftBrace));
                assert_eq!(inner.last().map(|t| t.token_type), Some(TokenType::Eof));
                assert!(inner.iter().any(|t| t.token_type == TokenType::Template));
            }
            other => panic!("expected expression part, got {:?}", other),
        }
    }

    #[test]
    fn unterminated_string_reports_position() {
        let error = tokenize("let s = \"abc").unwrap_err();
        assert_eq!(error.kind, ErrorKind::LexError);
        assert_eq!(error.span.start, 8);
    }

    #[test]
    fn unterminated_template() {
        let error = tokenize("`abc ${x").unwrap_err();
        assert_eq!(error.kind, ErrorKind::LexError);
    }

    #[test]
    fn invalid_character() {
        let error = tokenize("a # b").unwrap_err();
        assert_eq!(error.kind, ErrorKind::LexError);
        assert_eq!(error.span, Span::new(2, 3));
    }

    #[test]
    fn iterator_is_lazy_and_stops_after_eof() {
        let mut lexer = Lexer::new("a b");
        assert_eq!(lexer.next().unwrap().unwrap().lexeme, "a");
        assert_eq!(lexer.next().unwrap().unwrap().lexeme, "b");
        assert_eq!(lexer.next().unwrap().unwrap().token_type, TokenType::Eof);
        assert!(lexer.next().is_none());
    }
}
