use crate::ast::{
    AssignOp, BinaryOp, ClassDef, Element, Expr, ForBinding, ForInit, FunctionBody, FunctionDef,
    FunctionKind, Literal, LogicalOp, MemberProperty, MethodDefinition, Pattern, PatternElement,
    PatternProperty, Program, Property, Stmt, SuperContext, TemplateElement, UnaryOp, UpdateOp,
    VarKind, VariableDeclarator, PREC_LOGICAL_OR,
};
use crate::error::{JsError, JsResult, Span};
use crate::lexer::{parse_number, TemplatePart, Token, TokenType};
use crate::stack::ensure_sufficient_stack;
use std::rc::Rc;

/// Operator produced by the precedence-climbing loop.
enum InfixOp {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

impl InfixOp {
    fn precedence(&self) -> u8 {
        match self {
            InfixOp::Binary(op) => op.precedence(),
            InfixOp::Logical(op) => op.precedence(),
        }
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    /// Set while parsing a `for` head, where `in` ends the expression.
    no_in: bool,
    super_context: SuperContext,
    loop_depth: usize,
    function_depth: usize,
    /// `{ a = 1 }` shorthand defaults not yet claimed by a destructuring
    /// target; any left at the end are syntax errors.
    cover_initializers: Vec<Span>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            no_in: false,
            super_context: SuperContext::Outside,
            loop_depth: 0,
            function_depth: 0,
            cover_initializers: Vec::new(),
        }
    }

    pub fn parse(&mut self) -> JsResult<Program> {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            statements.push(self.declaration()?);
        }
        if let Some(span) = self.cover_initializers.first() {
            return Err(JsError::parse_error(*span, "Invalid shorthand property initializer")
                .with_help("'{ a = 1 }' is only valid as a destructuring target: ({ a = 1 } = object)"));
        }

        tracing::debug!(statements = statements.len(), "parsed program");
        Ok(Program { statements })
    }

    fn declaration(&mut self) -> JsResult<Stmt> {
        match self.peek().token_type {
            TokenType::Function => {
                let start = self.advance().span.start;
                self.function_declaration(start, false)
            }
            TokenType::Identifier if self.at_async_function() => {
                let start = self.advance().span.start;
                self.advance();
                self.function_declaration(start, true)
            }
            TokenType::Class => {
                let start = self.advance().span.start;
                let class = self.class_tail(start, true)?;
                let span = class.span;
                Ok(Stmt::ClassDeclaration {
                    class: Rc::new(class),
                    span,
                })
            }
            TokenType::Var | TokenType::Let | TokenType::Const => {
                let start = self.peek().span.start;
                let kind = self.var_kind();
                let declarations = self.declarators(kind, true)?;
                self.consume_semicolon("Expected ';' after variable declaration")?;
                Ok(Stmt::VariableDeclaration {
                    kind,
                    declarations,
                    span: Span::new(start, self.previous().span.end),
                })
            }
            _ => self.statement(),
        }
    }

    fn statement(&mut self) -> JsResult<Stmt> {
        ensure_sufficient_stack(|| self.statement_inner())
    }

    fn statement_inner(&mut self) -> JsResult<Stmt> {
        match self.peek().token_type {
            TokenType::LeftBrace => {
                let start = self.advance().span.start;
                let statements = self.block()?;
                Ok(Stmt::Block {
                    statements,
                    span: Span::new(start, self.previous().span.end),
                })
            }
            TokenType::Semicolon => {
                let span = self.advance().span;
                Ok(Stmt::Empty { span })
            }
            TokenType::If => {
                self.advance();
                self.if_statement()
            }
            TokenType::While => {
                self.advance();
                self.while_statement()
            }
            TokenType::Do => {
                self.advance();
                self.do_while_statement()
            }
            TokenType::For => {
                self.advance();
                self.for_statement()
            }
            TokenType::Return => {
                self.advance();
                self.return_statement()
            }
            TokenType::Break | TokenType::Continue => {
                let token = self.advance().clone();
                if self.loop_depth == 0 {
                    return Err(JsError::parse_error(
                        token.span,
                        format!("Illegal {} statement", token.lexeme),
                    )
                    .with_help(format!("'{}' is only valid inside a loop body.", token.lexeme)));
                }
                self.consume_semicolon(&format!("Expected ';' after '{}'", token.lexeme))?;
                let span = Span::new(token.span.start, self.previous().span.end);
                if token.token_type == TokenType::Break {
                    Ok(Stmt::Break { span })
                } else {
                    Ok(Stmt::Continue { span })
                }
            }
            TokenType::Var | TokenType::Let | TokenType::Const | TokenType::Function | TokenType::Class => {
                self.declaration()
            }
            _ => self.expression_statement(),
        }
    }

    fn block(&mut self) -> JsResult<Vec<Stmt>> {
        let mut statements = Vec::new();

        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            statements.push(self.declaration()?);
        }

        self.consume_with_help(
            TokenType::RightBrace,
            "Expected '}' after block",
            "Block statements must be closed with '}' after the opening '{'.",
        )?;
        Ok(statements)
    }

    fn if_statement(&mut self) -> JsResult<Stmt> {
        let start_span = self.previous().span.start;

        self.consume_with_help(
            TokenType::LeftParen,
            "Expected '(' after 'if'",
            "If statements require parentheses around the condition: if (condition) { ... }",
        )?;
        let condition = self.expression()?;
        self.consume_with_help(
            TokenType::RightParen,
            "Expected ')' after if condition",
            "If conditions must be enclosed in parentheses: if (condition) { ... }",
        )?;

        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_types(&[TokenType::Else]) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        let end_span = match &else_branch {
            Some(else_stmt) => else_stmt.span().end,
            None => then_branch.span().end,
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
            span: Span::new(start_span, end_span),
        })
    }

    fn loop_body(&mut self) -> JsResult<Box<Stmt>> {
        self.loop_depth += 1;
        let body = self.statement();
        self.loop_depth -= 1;
        body.map(Box::new)
    }

    fn while_statement(&mut self) -> JsResult<Stmt> {
        let start_span = self.previous().span.start;

        self.consume(TokenType::LeftParen, "Expected '(' after 'while'")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expected ')' after while condition")?;

        let body = self.loop_body()?;
        let end_span = body.span().end;

        Ok(Stmt::While {
            condition,
            body,
            span: Span::new(start_span, end_span),
        })
    }

    fn do_while_statement(&mut self) -> JsResult<Stmt> {
        let start_span = self.previous().span.start;
        let body = self.loop_body()?;

        self.consume(TokenType::While, "Expected 'while' after do body")?;
        self.consume(TokenType::LeftParen, "Expected '(' after 'while'")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expected ')' after do-while condition")?;
        self.match_types(&[TokenType::Semicolon]);

        Ok(Stmt::DoWhile {
            body,
            condition,
            span: Span::new(start_span, self.previous().span.end),
        })
    }

    fn for_statement(&mut self) -> JsResult<Stmt> {
        let start_span = self.previous().span.start;

        self.consume_with_help(
            TokenType::LeftParen,
            "Expected '(' after 'for'",
            "Loops take the form for (init; condition; update), for (x of iterable) or for (key in object).",
        )?;

        let init = if self.check(TokenType::Semicolon) {
            None
        } else if matches!(
            self.peek().token_type,
            TokenType::Var | TokenType::Let | TokenType::Const
        ) {
            let kind = self.var_kind();
            let target = self.binding_pattern()?;

            if self.check_word("of") || self.check(TokenType::In) {
                let left = ForBinding::Declaration { kind, target };
                return self.for_each_tail(start_span, left);
            }

            let declarations = self.with_no_in(|parser| parser.declarators_after(kind, target, false))?;
            Some(ForInit::Declaration { kind, declarations })
        } else {
            let expr = self.with_no_in(|parser| parser.expression())?;
            if self.check_word("of") || self.check(TokenType::In) {
                let target = self.cover_to_pattern(expr)?;
                return self.for_each_tail(start_span, ForBinding::Target(target));
            }
            Some(ForInit::Expression(expr))
        };
        self.consume(TokenType::Semicolon, "Expected ';' after loop initializer")?;

        let condition = if !self.check(TokenType::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::Semicolon, "Expected ';' after loop condition")?;

        let update = if !self.check(TokenType::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::RightParen, "Expected ')' after for clauses")?;

        let body = self.loop_body()?;
        let end_span = body.span().end;

        Ok(Stmt::For {
            init,
            condition,
            update,
            body,
            span: Span::new(start_span, end_span),
        })
    }

    /// Remainder of `for (<left> of|in <right>) body`.
    fn for_each_tail(&mut self, start_span: usize, left: ForBinding) -> JsResult<Stmt> {
        let is_of = self.advance().token_type != TokenType::In;
        let right = self.expression()?;
        self.consume(TokenType::RightParen, "Expected ')' after for-each clause")?;

        let body = self.loop_body()?;
        let span = Span::new(start_span, body.span().end);

        if is_of {
            Ok(Stmt::ForOf { left, right, body, span })
        } else {
            Ok(Stmt::ForIn { left, right, body, span })
        }
    }

    fn return_statement(&mut self) -> JsResult<Stmt> {
        let keyword = self.previous().span;
        if self.function_depth == 0 {
            return Err(JsError::parse_error(keyword, "Illegal return statement")
                .with_help("'return' is only valid inside a function body."));
        }

        let value = if self.check(TokenType::Semicolon)
            || self.check(TokenType::RightBrace)
            || self.is_at_end()
            || self.peek().newline_before
        {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume_semicolon("Expected ';' after return value")?;

        Ok(Stmt::Return {
            value,
            span: Span::new(keyword.start, self.previous().span.end),
        })
    }

    fn expression_statement(&mut self) -> JsResult<Stmt> {
        let start_span = self.peek().span.start;
        let expr = self.expression()?;
        self.consume_semicolon("Expected ';' after expression")?;
        let end_span = self.previous().span.end;

        Ok(Stmt::Expression {
            expr,
            span: Span::new(start_span, end_span),
        })
    }

    /// Accept an explicit `;`, or an implied one before `}`, end of input, or
    /// a line break.
    fn consume_semicolon(&mut self, message: &str) -> JsResult<()> {
        if self.match_types(&[TokenType::Semicolon]) {
            return Ok(());
        }
        if self.check(TokenType::RightBrace) || self.is_at_end() || self.peek().newline_before {
            return Ok(());
        }
        Err(self.unexpected(message))
    }

    fn var_kind(&mut self) -> VarKind {
        match self.advance().token_type {
            TokenType::Let => VarKind::Let,
            TokenType::Const => VarKind::Const,
            _ => VarKind::Var,
        }
    }

    fn declarators(&mut self, kind: VarKind, require_const_init: bool) -> JsResult<Vec<VariableDeclarator>> {
        let target = self.binding_pattern()?;
        self.declarators_after(kind, target, require_const_init)
    }

    fn declarators_after(
        &mut self,
        kind: VarKind,
        first: Pattern,
        require_const_init: bool,
    ) -> JsResult<Vec<VariableDeclarator>> {
        let mut declarations = Vec::new();
        let mut target = first;
        loop {
            let init = if self.match_types(&[TokenType::Equal]) {
                Some(self.assignment()?)
            } else {
                None
            };

            if init.is_none() {
                let needs_init = !matches!(target, Pattern::Identifier { .. })
                    || (kind == VarKind::Const && require_const_init);
                if needs_init {
                    return Err(JsError::parse_error(
                        target.span(),
                        if kind == VarKind::Const {
                            "Missing initializer in const declaration"
                        } else {
                            "Missing initializer in destructuring declaration"
                        },
                    ));
                }
            }

            let end = init.as_ref().map_or(target.span().end, |expr| expr.span().end);
            let span = Span::new(target.span().start, end);
            declarations.push(VariableDeclarator { target, init, span });

            if !self.match_types(&[TokenType::Comma]) {
                break;
            }
            target = self.binding_pattern()?;
        }
        Ok(declarations)
    }

    fn with_no_in<T>(&mut self, parse: impl FnOnce(&mut Self) -> JsResult<T>) -> JsResult<T> {
        let saved = std::mem::replace(&mut self.no_in, true);
        let result = parse(self);
        self.no_in = saved;
        result
    }

    // ------------------------------------------------------------------
    // Functions and classes
    // ------------------------------------------------------------------

    fn function_declaration(&mut self, start: usize, is_async: bool) -> JsResult<Stmt> {
        let name = self
            .consume_with_help(
                TokenType::Identifier,
                "Expected function name",
                "Function declarations need a name: function name(params) { ... }",
            )?
            .lexeme
            .clone();
        let function = self.function_rest(Some(name), FunctionKind::Normal, is_async, start)?;
        let span = function.span;
        Ok(Stmt::FunctionDeclaration {
            function: Rc::new(function),
            span,
        })
    }

    /// Parameter list and block body of a non-arrow function.
    fn function_rest(
        &mut self,
        name: Option<String>,
        kind: FunctionKind,
        is_async: bool,
        start: usize,
    ) -> JsResult<FunctionDef> {
        let context = match kind {
            FunctionKind::Method => SuperContext::Method,
            FunctionKind::Constructor => SuperContext::Constructor,
            FunctionKind::Normal | FunctionKind::Arrow => SuperContext::Outside,
        };
        let saved_context = std::mem::replace(&mut self.super_context, context);
        let result = self.function_parts().map(|(params, rest, body)| FunctionDef {
            name,
            params,
            rest,
            body: FunctionBody::Block(body),
            kind,
            is_async,
            span: Span::new(start, self.previous().span.end),
        });
        self.super_context = saved_context;
        result
    }

    fn function_parts(&mut self) -> JsResult<(Vec<PatternElement>, Option<Pattern>, Vec<Stmt>)> {
        self.consume_with_help(
            TokenType::LeftParen,
            "Expected '(' before parameters",
            "Functions take a parenthesized parameter list: name(a, b) { ... }",
        )?;
        let (params, rest) = self.parameters()?;
        self.consume(TokenType::LeftBrace, "Expected '{' before function body")?;
        let body = self.function_body()?;
        Ok((params, rest, body))
    }

    fn function_body(&mut self) -> JsResult<Vec<Stmt>> {
        let saved_loop_depth = std::mem::replace(&mut self.loop_depth, 0);
        let saved_no_in = std::mem::replace(&mut self.no_in, false);
        self.function_depth += 1;
        let body = self.block();
        self.function_depth -= 1;
        self.no_in = saved_no_in;
        self.loop_depth = saved_loop_depth;
        body
    }

    /// Parameters after the opening '(' through the closing ')'.
    fn parameters(&mut self) -> JsResult<(Vec<PatternElement>, Option<Pattern>)> {
        let mut params = Vec::new();
        let mut rest = None;

        while !self.check(TokenType::RightParen) {
            if self.match_types(&[TokenType::Ellipsis]) {
                rest = Some(self.binding_pattern()?);
                if !self.check(TokenType::RightParen) {
                    return Err(JsError::parse_error(
                        self.peek().span,
                        "Rest parameter must be last formal parameter",
                    )
                    .with_help("Move '...name' to the end of the parameter list."));
                }
                break;
            }
            params.push(self.binding_element()?);
            if !self.match_types(&[TokenType::Comma]) {
                break;
            }
        }

        self.consume_with_help(
            TokenType::RightParen,
            "Expected ')' after parameters",
            "Parameter lists are comma-separated names or patterns: (a, b = 1, ...rest)",
        )?;
        Ok((params, rest))
    }

    fn binding_element(&mut self) -> JsResult<PatternElement> {
        let target = self.binding_pattern()?;
        let default = if self.match_types(&[TokenType::Equal]) {
            Some(self.assignment()?)
        } else {
            None
        };
        Ok(PatternElement { target, default })
    }

    fn binding_pattern(&mut self) -> JsResult<Pattern> {
        ensure_sufficient_stack(|| self.binding_pattern_inner())
    }

    fn binding_pattern_inner(&mut self) -> JsResult<Pattern> {
        if self.is_at_end() {
            return Err(self.unexpected("Expected binding name or pattern"));
        }
        let token = self.advance().clone();
        match token.token_type {
            TokenType::Identifier => Ok(Pattern::Identifier {
                name: token.lexeme,
                span: token.span,
            }),
            TokenType::LeftBracket => self.array_binding_pattern(token.span.start),
            TokenType::LeftBrace => self.object_binding_pattern(token.span.start),
            _ => Err(JsError::parse_error(
                token.span,
                format!("Expected binding name or pattern, found '{}'", token.describe()),
            )
            .with_help("Bindings are identifiers or destructuring patterns like [a, b] or {x, y}.")),
        }
    }

    fn array_binding_pattern(&mut self, start: usize) -> JsResult<Pattern> {
        let mut elements = Vec::new();
        let mut rest = None;

        while !self.check(TokenType::RightBracket) {
            if self.match_types(&[TokenType::Comma]) {
                elements.push(None);
                continue;
            }
            if self.match_types(&[TokenType::Ellipsis]) {
                rest = Some(Box::new(self.binding_pattern()?));
                if !self.check(TokenType::RightBracket) {
                    return Err(JsError::parse_error(
                        self.peek().span,
                        "Rest element must be last element",
                    ));
                }
                break;
            }
            elements.push(Some(self.binding_element()?));
            if !self.match_types(&[TokenType::Comma]) {
                break;
            }
        }

        let end = self.consume(TokenType::RightBracket, "Expected ']' after array pattern")?.span.end;
        Ok(Pattern::Array {
            elements,
            rest,
            span: Span::new(start, end),
        })
    }

    fn object_binding_pattern(&mut self, start: usize) -> JsResult<Pattern> {
        let mut properties = Vec::new();
        let mut rest = None;

        while !self.check(TokenType::RightBrace) {
            if self.match_types(&[TokenType::Ellipsis]) {
                let name = self.consume(TokenType::Identifier, "Expected name after '...'")?.clone();
                rest = Some(Box::new(Pattern::Identifier {
                    name: name.lexeme,
                    span: name.span,
                }));
                if !self.check(TokenType::RightBrace) {
                    return Err(JsError::parse_error(
                        self.peek().span,
                        "Rest element must be last element",
                    ));
                }
                break;
            }

            let key_token = self.peek().clone();
            let key = self.property_key()?;
            let (value, shorthand) = if self.match_types(&[TokenType::Colon]) {
                (self.binding_element()?, false)
            } else {
                if key_token.token_type != TokenType::Identifier {
                    return Err(JsError::parse_error(
                        key_token.span,
                        format!("Expected ':' after property '{}'", key),
                    ));
                }
                let target = Pattern::Identifier {
                    name: key.clone(),
                    span: key_token.span,
                };
                let default = if self.match_types(&[TokenType::Equal]) {
                    Some(self.assignment()?)
                } else {
                    None
                };
                (PatternElement { target, default }, true)
            };
            properties.push(PatternProperty {
                key,
                value,
                shorthand,
                span: Span::new(key_token.span.start, self.previous().span.end),
            });

            if !self.match_types(&[TokenType::Comma]) {
                break;
            }
        }

        let end = self.consume(TokenType::RightBrace, "Expected '}' after object pattern")?.span.end;
        Ok(Pattern::Object {
            properties,
            rest,
            span: Span::new(start, end),
        })
    }

    /// Property name in an object literal, pattern, or class body.
    fn property_key(&mut self) -> JsResult<String> {
        if self.is_at_end() {
            return Err(self.unexpected("Expected property name"));
        }
        let token = self.advance().clone();
        match token.token_type {
            TokenType::Identifier | TokenType::String => Ok(token.lexeme),
            TokenType::Number => {
                let value = parse_number(&token.lexeme).unwrap_or(f64::NAN);
                Ok(crate::value::number_to_string(value))
            }
            t if t.is_keyword() => Ok(token.lexeme),
            _ => Err(JsError::parse_error(
                token.span,
                format!("Expected property name, found '{}'", token.describe()),
            )),
        }
    }

    fn class_tail(&mut self, start: usize, is_declaration: bool) -> JsResult<ClassDef> {
        let name = if self.check(TokenType::Identifier) {
            Some(self.advance().lexeme.clone())
        } else if is_declaration {
            return Err(self.unexpected("Expected class name"));
        } else {
            None
        };

        let superclass = if self.match_types(&[TokenType::Extends]) {
            Some(Box::new(self.call()?))
        } else {
            None
        };

        self.consume_with_help(
            TokenType::LeftBrace,
            "Expected '{' before class body",
            "Class bodies hold methods: class Name { constructor() { ... } method() { ... } }",
        )?;

        let mut constructor = None;
        let mut methods = Vec::new();
        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            if self.match_types(&[TokenType::Semicolon]) {
                continue;
            }
            let method_start = self.peek().span.start;
            let is_async = self.check_word("async") && self.peek_at(1).token_type != TokenType::LeftParen;
            if is_async {
                self.advance();
            }
            let key_token = self.peek().clone();
            let method_name = self.property_key()?;

            if method_name == "constructor" && key_token.token_type == TokenType::Identifier {
                if constructor.is_some() {
                    return Err(JsError::parse_error(
                        key_token.span,
                        "A class may only have one constructor",
                    ));
                }
                let function = self.function_rest(
                    Some(method_name),
                    FunctionKind::Constructor,
                    is_async,
                    method_start,
                )?;
                constructor = Some(Rc::new(function));
            } else {
                let function = self.function_rest(
                    Some(method_name.clone()),
                    FunctionKind::Method,
                    is_async,
                    method_start,
                )?;
                let span = function.span;
                methods.push(MethodDefinition {
                    name: method_name,
                    function: Rc::new(function),
                    span,
                });
            }
        }

        let end = self
            .consume_with_help(
                TokenType::RightBrace,
                "Expected '}' after class body",
                "Class bodies must be closed with '}'.",
            )?
            .span
            .end;

        Ok(ClassDef {
            name,
            superclass,
            constructor,
            methods,
            span: Span::new(start, end),
        })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn expression(&mut self) -> JsResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> JsResult<Expr> {
        ensure_sufficient_stack(|| self.assignment_inner())
    }

    fn assignment_inner(&mut self) -> JsResult<Expr> {
        if self.is_arrow_ahead(0) {
            let start = self.peek().span.start;
            return self.arrow_function(start, false);
        }
        if self.check_word("async") && self.is_arrow_ahead(1) && !self.peek_at(1).newline_before {
            let start = self.advance().span.start;
            return self.arrow_function(start, true);
        }

        let expr = self.conditional()?;

        let operator = match self.peek().token_type {
            TokenType::Equal => AssignOp::Assign,
            TokenType::PlusEqual => AssignOp::Add,
            TokenType::MinusEqual => AssignOp::Subtract,
            TokenType::StarEqual => AssignOp::Multiply,
            TokenType::SlashEqual => AssignOp::Divide,
            TokenType::PercentEqual => AssignOp::Remainder,
            _ => return Ok(expr),
        };
        let equals = self.advance().clone();

        let target = if operator == AssignOp::Assign {
            self.cover_to_pattern(expr)?
        } else {
            match expr {
                Expr::Identifier { name, span } => Pattern::Identifier { name, span },
                member @ Expr::Member { .. } => {
                    let span = member.span();
                    Pattern::Member {
                        target: Box::new(member),
                        span,
                    }
                }
                other => {
                    return Err(JsError::parse_error(
                        other.span(),
                        format!("Invalid left-hand side in '{}' assignment", equals.lexeme),
                    ))
                }
            }
        };

        let value = self.assignment().map_err(|error| {
            if error.message.starts_with("Expected expression") {
                JsError::parse_error(equals.span, format!("Expected expression after '{}'", equals.lexeme))
                    .with_help("Assignments need a value on the right-hand side: x = value")
            } else {
                error
            }
        })?;
        let span = target.span().to(value.span());

        Ok(Expr::Assign {
            operator,
            target: Box::new(target),
            value: Box::new(value),
            span,
        })
    }

    /// [`expr_to_pattern`](Self::expr_to_pattern), releasing the shorthand
    /// defaults the pattern absorbs.
    fn cover_to_pattern(&mut self, expr: Expr) -> JsResult<Pattern> {
        let span = expr.span();
        let pattern = self.expr_to_pattern(expr)?;
        self.cover_initializers
            .retain(|cover| cover.start < span.start || cover.end > span.end);
        Ok(pattern)
    }

    /// Reinterpret an expression parsed on the left of `=` as a pattern.
    fn expr_to_pattern(&self, expr: Expr) -> JsResult<Pattern> {
        ensure_sufficient_stack(|| self.expr_to_pattern_inner(expr))
    }

    fn expr_to_pattern_inner(&self, expr: Expr) -> JsResult<Pattern> {
        match expr {
            Expr::Identifier { name, span } => Ok(Pattern::Identifier { name, span }),
            Expr::Member { .. } => {
                let span = expr.span();
                Ok(Pattern::Member {
                    target: Box::new(expr),
                    span,
                })
            }
            Expr::Array { elements, span } => {
                let count = elements.len();
                let mut pattern_elements = Vec::new();
                let mut rest = None;
                for (index, element) in elements.into_iter().enumerate() {
                    match element {
                        None => pattern_elements.push(None),
                        Some(Element::Expr(expr)) => pattern_elements.push(Some(self.expr_to_element(expr)?)),
                        Some(Element::Spread { argument, span }) => {
                            if index + 1 != count {
                                return Err(JsError::parse_error(span, "Rest element must be last element"));
                            }
                            rest = Some(Box::new(self.expr_to_pattern(argument)?));
                        }
                    }
                }
                Ok(Pattern::Array {
                    elements: pattern_elements,
                    rest,
                    span,
                })
            }
            Expr::Object { properties, span } => {
                let count = properties.len();
                let mut pattern_properties = Vec::new();
                let mut rest = None;
                for (index, property) in properties.into_iter().enumerate() {
                    match property {
                        Property::Init {
                            key,
                            value,
                            shorthand,
                            span,
                        } => pattern_properties.push(PatternProperty {
                            key,
                            value: self.expr_to_element(value)?,
                            shorthand,
                            span,
                        }),
                        Property::Spread { argument, span } => {
                            if index + 1 != count {
                                return Err(JsError::parse_error(span, "Rest element must be last element"));
                            }
                            rest = Some(Box::new(self.expr_to_pattern(argument)?));
                        }
                        Property::Method { span, .. } => {
                            return Err(JsError::parse_error(span, "Invalid destructuring assignment target"))
                        }
                    }
                }
                Ok(Pattern::Object {
                    properties: pattern_properties,
                    rest,
                    span,
                })
            }
            other => Err(JsError::parse_error(other.span(), "Invalid assignment target").with_help(
                "Only variables, member expressions, and array/object patterns can be assigned to.",
            )),
        }
    }

    fn expr_to_element(&self, expr: Expr) -> JsResult<PatternElement> {
        match expr {
            Expr::Assign {
                operator: AssignOp::Assign,
                target,
                value,
                ..
            } => Ok(PatternElement {
                target: *target,
                default: Some(*value),
            }),
            other => Ok(PatternElement {
                target: self.expr_to_pattern(other)?,
                default: None,
            }),
        }
    }

    /// Whether an arrow function starts `offset` tokens ahead: `x =>` or
    /// `( ... ) =>`.
    fn is_arrow_ahead(&self, offset: usize) -> bool {
        let first = self.peek_at(offset);
        match first.token_type {
            TokenType::Identifier => self.peek_at(offset + 1).token_type == TokenType::Arrow,
            TokenType::LeftParen => {
                let mut depth = 0usize;
                let mut position = self.current + offset;
                while position < self.tokens.len() {
                    match self.tokens[position].token_type {
                        TokenType::LeftParen | TokenType::LeftBracket | TokenType::LeftBrace => depth += 1,
                        TokenType::RightParen | TokenType::RightBracket | TokenType::RightBrace => {
                            depth = depth.saturating_sub(1);
                            if depth == 0 {
                                return self
                                    .tokens
                                    .get(position + 1)
                                    .is_some_and(|token| token.token_type == TokenType::Arrow);
                            }
                        }
                        TokenType::Eof => return false,
                        _ => {}
                    }
                    position += 1;
                }
                false
            }
            _ => false,
        }
    }

    fn arrow_function(&mut self, start: usize, is_async: bool) -> JsResult<Expr> {
        let (params, rest) = if self.check(TokenType::Identifier) {
            let token = self.advance().clone();
            let param = PatternElement {
                target: Pattern::Identifier {
                    name: token.lexeme,
                    span: token.span,
                },
                default: None,
            };
            (vec![param], None)
        } else {
            self.consume(TokenType::LeftParen, "Expected '(' before arrow parameters")?;
            self.parameters()?
        };

        self.consume(TokenType::Arrow, "Expected '=>' after arrow parameters")?;

        let body = if self.match_types(&[TokenType::LeftBrace]) {
            FunctionBody::Block(self.function_body()?)
        } else {
            let saved_no_in = std::mem::replace(&mut self.no_in, false);
            let body = self.assignment();
            self.no_in = saved_no_in;
            FunctionBody::Expression(Box::new(body?))
        };

        let span = Span::new(start, self.previous().span.end);
        Ok(Expr::Arrow {
            function: Rc::new(FunctionDef {
                name: None,
                params,
                rest,
                body,
                kind: FunctionKind::Arrow,
                is_async,
                span,
            }),
            span,
        })
    }

    fn conditional(&mut self) -> JsResult<Expr> {
        let condition = self.binary(PREC_LOGICAL_OR)?;

        if !self.match_types(&[TokenType::Question]) {
            return Ok(condition);
        }

        let saved_no_in = std::mem::replace(&mut self.no_in, false);
        let consequent = self.assignment();
        self.no_in = saved_no_in;
        let consequent = consequent?;
        self.consume(TokenType::Colon, "Expected ':' in conditional expression")?;
        let alternate = self.assignment()?;
        let span = condition.span().to(alternate.span());

        Ok(Expr::Conditional {
            condition: Box::new(condition),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
            span,
        })
    }

    fn infix_operator(&self) -> Option<InfixOp> {
        let op = match self.peek().token_type {
            TokenType::PipePipe => InfixOp::Logical(LogicalOp::Or),
            TokenType::AmpAmp => InfixOp::Logical(LogicalOp::And),
            TokenType::EqualEqual => InfixOp::Binary(BinaryOp::Equal),
            TokenType::BangEqual => InfixOp::Binary(BinaryOp::NotEqual),
            TokenType::EqualEqualEqual => InfixOp::Binary(BinaryOp::StrictEqual),
            TokenType::BangEqualEqual => InfixOp::Binary(BinaryOp::StrictNotEqual),
            TokenType::Less => InfixOp::Binary(BinaryOp::Less),
            TokenType::LessEqual => InfixOp::Binary(BinaryOp::LessEqual),
            TokenType::Greater => InfixOp::Binary(BinaryOp::Greater),
            TokenType::GreaterEqual => InfixOp::Binary(BinaryOp::GreaterEqual),
            TokenType::In if !self.no_in => InfixOp::Binary(BinaryOp::In),
            TokenType::Plus => InfixOp::Binary(BinaryOp::Add),
            TokenType::Minus => InfixOp::Binary(BinaryOp::Subtract),
            TokenType::Star => InfixOp::Binary(BinaryOp::Multiply),
            TokenType::Slash => InfixOp::Binary(BinaryOp::Divide),
            TokenType::Percent => InfixOp::Binary(BinaryOp::Remainder),
            _ => return None,
        };
        Some(op)
    }

    /// Precedence climbing over the binary and logical operators.
    fn binary(&mut self, min_precedence: u8) -> JsResult<Expr> {
        let mut left = self.unary()?;

        while let Some(operator) = self.infix_operator() {
            let precedence = operator.precedence();
            if precedence < min_precedence {
                break;
            }
            let operator_token = self.advance().clone();

            let right = self.binary(precedence + 1).map_err(|error| {
                if error.message.starts_with("Expected expression") {
                    JsError::parse_error(
                        operator_token.span,
                        format!("Expected expression after '{}'", operator_token.lexeme),
                    )
                    .with_help("Binary operators require expressions on both sides.")
                } else {
                    error
                }
            })?;
            let span = left.span().to(right.span());

            left = match operator {
                InfixOp::Binary(operator) => Expr::Binary {
                    left: Box::new(left),
                    operator,
                    right: Box::new(right),
                    span,
                },
                InfixOp::Logical(operator) => Expr::Logical {
                    left: Box::new(left),
                    operator,
                    right: Box::new(right),
                    span,
                },
            };
        }

        Ok(left)
    }

    fn unary(&mut self) -> JsResult<Expr> {
        ensure_sufficient_stack(|| self.unary_inner())
    }

    fn unary_inner(&mut self) -> JsResult<Expr> {
        let operator = match self.peek().token_type {
            TokenType::Bang => Some(UnaryOp::Not),
            TokenType::Minus => Some(UnaryOp::Negate),
            TokenType::Plus => Some(UnaryOp::Plus),
            TokenType::Typeof => Some(UnaryOp::Typeof),
            _ => None,
        };
        if let Some(operator) = operator {
            let start = self.advance().span.start;
            let operand = self.unary()?;
            let span = Span::new(start, operand.span().end);
            return Ok(Expr::Unary {
                operator,
                operand: Box::new(operand),
                span,
            });
        }

        if self.check(TokenType::PlusPlus) || self.check(TokenType::MinusMinus) {
            let token = self.advance().clone();
            let operator = if token.token_type == TokenType::PlusPlus {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            let target = self.unary()?;
            Self::check_update_target(&target, "prefix")?;
            let span = Span::new(token.span.start, target.span().end);
            return Ok(Expr::Update {
                operator,
                prefix: true,
                target: Box::new(target),
                span,
            });
        }

        if self.check(TokenType::Await) {
            let start = self.advance().span.start;
            let argument = self.unary()?;
            let span = Span::new(start, argument.span().end);
            return Ok(Expr::Await {
                argument: Box::new(argument),
                span,
            });
        }

        self.postfix()
    }

    fn postfix(&mut self) -> JsResult<Expr> {
        let expr = self.call()?;

        if (self.check(TokenType::PlusPlus) || self.check(TokenType::MinusMinus)) && !self.peek().newline_before {
            let token = self.advance().clone();
            Self::check_update_target(&expr, "postfix")?;
            let operator = if token.token_type == TokenType::PlusPlus {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            let span = Span::new(expr.span().start, token.span.end);
            return Ok(Expr::Update {
                operator,
                prefix: false,
                target: Box::new(expr),
                span,
            });
        }

        Ok(expr)
    }

    fn check_update_target(target: &Expr, position: &str) -> JsResult<()> {
        match target {
            Expr::Identifier { .. } | Expr::Member { .. } => Ok(()),
            other => Err(JsError::parse_error(
                other.span(),
                format!("Invalid left-hand side expression in {} operation", position),
            )),
        }
    }

    fn call(&mut self) -> JsResult<Expr> {
        let mut expr = if self.check(TokenType::New) {
            self.new_expression()?
        } else {
            self.primary()?
        };

        loop {
            if self.match_types(&[TokenType::LeftParen]) {
                let args = self.arguments()?;
                let span = Span::new(expr.span().start, self.previous().span.end);
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    span,
                };
            } else if let Some(property) = self.member_suffix()? {
                let span = Span::new(expr.span().start, self.previous().span.end);
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                    span,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    /// `.name` or `[expr]` following an object expression.
    fn member_suffix(&mut self) -> JsResult<Option<MemberProperty>> {
        if self.match_types(&[TokenType::Dot]) {
            let token = self.advance().clone();
            if token.token_type == TokenType::Identifier || token.token_type.is_keyword() {
                return Ok(Some(MemberProperty::Named(token.lexeme)));
            }
            return Err(JsError::parse_error(
                token.span,
                format!("Expected property name after '.', found '{}'", token.describe()),
            ));
        }
        if self.match_types(&[TokenType::LeftBracket]) {
            let saved_no_in = std::mem::replace(&mut self.no_in, false);
            let property = self.expression();
            self.no_in = saved_no_in;
            let property = property?;
            self.consume(TokenType::RightBracket, "Expected ']' after computed property")?;
            return Ok(Some(MemberProperty::Computed(Box::new(property))));
        }
        Ok(None)
    }

    fn new_expression(&mut self) -> JsResult<Expr> {
        let start = self.advance().span.start;

        let mut callee = if self.check(TokenType::New) {
            self.new_expression()?
        } else {
            self.primary()?
        };
        while let Some(property) = self.member_suffix()? {
            let span = Span::new(callee.span().start, self.previous().span.end);
            callee = Expr::Member {
                object: Box::new(callee),
                property,
                span,
            };
        }

        let args = if self.match_types(&[TokenType::LeftParen]) {
            self.arguments()?
        } else {
            Vec::new()
        };

        Ok(Expr::New {
            callee: Box::new(callee),
            args,
            span: Span::new(start, self.previous().span.end),
        })
    }

    /// Arguments after '(' through the closing ')'.
    fn arguments(&mut self) -> JsResult<Vec<Element>> {
        let saved_no_in = std::mem::replace(&mut self.no_in, false);
        let result = self.argument_list();
        self.no_in = saved_no_in;
        result
    }

    fn argument_list(&mut self) -> JsResult<Vec<Element>> {
        let mut args = Vec::new();

        while !self.check(TokenType::RightParen) {
            if self.is_at_end() {
                return Err(JsError::parse_error(
                    Span::single(self.peek().span.start),
                    "Unexpected end of input in function call",
                )
                .with_help("Function calls must be closed with ')' after the arguments. Example: func(arg1, arg2)"));
            }
            args.push(self.element()?);
            if !self.match_types(&[TokenType::Comma]) {
                break;
            }
        }

        self.consume_with_help(
            TokenType::RightParen,
            "Expected ')' after arguments",
            "Function calls must be closed with ')' after the arguments. Example: func(arg1, arg2)",
        )?;
        Ok(args)
    }

    fn element(&mut self) -> JsResult<Element> {
        if self.check(TokenType::Ellipsis) {
            let start = self.advance().span.start;
            let argument = self.assignment()?;
            let span = Span::new(start, argument.span().end);
            Ok(Element::Spread { argument, span })
        } else {
            Ok(Element::Expr(self.assignment()?))
        }
    }

    fn primary(&mut self) -> JsResult<Expr> {
        if self.is_at_end() {
            return Err(JsError::parse_error(self.peek().span, "Expected expression, found 'end of input'")
                .with_help(
                    "Expected an expression here. Check for unmatched parentheses, brackets, or incomplete statements.",
                ));
        }

        let token = self.advance().clone();

        match token.token_type {
            TokenType::False => Ok(Expr::Literal {
                value: Literal::Bool(false),
                span: token.span,
            }),
            TokenType::True => Ok(Expr::Literal {
                value: Literal::Bool(true),
                span: token.span,
            }),
            TokenType::Null => Ok(Expr::Literal {
                value: Literal::Null,
                span: token.span,
            }),
            TokenType::Number => {
                let value = parse_number(&token.lexeme)
                    .ok_or_else(|| JsError::parse_error(token.span, "Invalid number"))?;
                Ok(Expr::Literal {
                    value: Literal::Number(value),
                    span: token.span,
                })
            }
            TokenType::String => Ok(Expr::Literal {
                value: Literal::String(token.lexeme),
                span: token.span,
            }),
            TokenType::Template => self.template_literal(token),
            TokenType::Identifier => Ok(Expr::Identifier {
                name: token.lexeme,
                span: token.span,
            }),
            TokenType::This => Ok(Expr::This { span: token.span }),
            TokenType::Super => self.super_expression(token.span),
            TokenType::Function => {
                let name = if self.check(TokenType::Identifier) {
                    Some(self.advance().lexeme.clone())
                } else {
                    None
                };
                let function = self.function_rest(name, FunctionKind::Normal, false, token.span.start)?;
                let span = function.span;
                Ok(Expr::Function {
                    function: Rc::new(function),
                    span,
                })
            }
            TokenType::Identifier if token.lexeme == "async" && self.check(TokenType::Function) && !self.peek().newline_before => {
                self.advance();
                let name = if self.check(TokenType::Identifier) {
                    Some(self.advance().lexeme.clone())
                } else {
                    None
                };
                let function = self.function_rest(name, FunctionKind::Normal, true, token.span.start)?;
                let span = function.span;
                Ok(Expr::Function {
                    function: Rc::new(function),
                    span,
                })
            }
            TokenType::Class => {
                let class = self.class_tail(token.span.start, false)?;
                let span = class.span;
                Ok(Expr::Class {
                    class: Rc::new(class),
                    span,
                })
            }
            TokenType::LeftParen => {
                let start_span = token.span;

                if self.check(TokenType::RightParen) {
                    return Err(JsError::parse_error(
                        Span::new(start_span.start, self.peek().span.end),
                        "Empty parentheses are not allowed here",
                    )
                    .with_help("Parentheses must contain an expression unless they start an arrow function: () => value"));
                }

                let saved_no_in = std::mem::replace(&mut self.no_in, false);
                let expr = self.expression();
                self.no_in = saved_no_in;
                let expr = expr?;
                self.consume_with_help(
                    TokenType::RightParen,
                    "Expected ')' after expression",
                    "Every opening parenthesis '(' must have a matching closing parenthesis ')'.",
                )?;
                Ok(expr)
            }
            TokenType::LeftBracket => self.array_literal(token.span),
            TokenType::LeftBrace => self.object_literal(token.span),
            _ => {
                let help_msg = match token.token_type {
                    TokenType::RightParen => "Found ')' without matching '('. Check for unbalanced parentheses.",
                    TokenType::RightBrace => "Found '}' without matching '{'. Check for unbalanced braces.",
                    TokenType::RightBracket => "Found ']' without matching '['. Check for unbalanced brackets.",
                    _ => "Expected a literal value, variable, or parenthesized expression here.",
                };

                Err(JsError::parse_error(
                    token.span,
                    format!("Expected expression, found '{}'", token.describe()),
                )
                .with_help(help_msg))
            }
        }
    }

    fn super_expression(&mut self, keyword: Span) -> JsResult<Expr> {
        let context = self.super_context;
        if self.match_types(&[TokenType::LeftParen]) {
            let args = self.arguments()?;
            return Ok(Expr::SuperCall {
                args,
                context,
                span: Span::new(keyword.start, self.previous().span.end),
            });
        }
        if let Some(property) = self.member_suffix()? {
            return Ok(Expr::SuperMember {
                property,
                context,
                span: Span::new(keyword.start, self.previous().span.end),
            });
        }
        Err(JsError::parse_error(keyword, "'super' keyword unexpected here")
            .with_help("Use super(...) in a constructor or super.method() in a method."))
    }

    /// Split a template token into text and re-parsed `${...}` expressions.
    fn template_literal(&mut self, token: Token) -> JsResult<Expr> {
        let mut elements = Vec::new();
        for part in token.template {
            match part {
                TemplatePart::Text(text) => elements.push(TemplateElement::Text(text)),
                TemplatePart::Expr(tokens) => {
                    let mut inner = Parser::new(tokens);
                    inner.super_context = self.super_context;
                    inner.function_depth = self.function_depth;
                    if inner.is_at_end() {
                        return Err(JsError::parse_error(
                            inner.peek().span,
                            "Expected expression inside '${}'",
                        ));
                    }
                    let expr = inner.expression()?;
                    if !inner.is_at_end() {
                        return Err(inner.unexpected("Expected '}' after template expression"));
                    }
                    elements.push(TemplateElement::Expr(expr));
                }
            }
        }
        Ok(Expr::Template {
            elements,
            span: token.span,
        })
    }

    fn array_literal(&mut self, start_span: Span) -> JsResult<Expr> {
        let saved_no_in = std::mem::replace(&mut self.no_in, false);
        let mut elements = Vec::new();

        while !self.check(TokenType::RightBracket) && !self.is_at_end() {
            if self.match_types(&[TokenType::Comma]) {
                elements.push(None);
                continue;
            }
            match self.element() {
                Ok(element) => elements.push(Some(element)),
                Err(error) => {
                    self.no_in = saved_no_in;
                    return Err(error);
                }
            }
            if !self.match_types(&[TokenType::Comma]) {
                break;
            }
        }
        self.no_in = saved_no_in;

        let end_token = self.consume_with_help(
            TokenType::RightBracket,
            "Expected ']' after array elements",
            "Array literals must be closed with ']' after the opening '['. Example: [1, 2, 3]",
        )?;
        Ok(Expr::Array {
            elements,
            span: Span::new(start_span.start, end_token.span.end),
        })
    }

    fn object_literal(&mut self, start_span: Span) -> JsResult<Expr> {
        let saved_no_in = std::mem::replace(&mut self.no_in, false);
        let result = self.object_properties();
        self.no_in = saved_no_in;
        let properties = result?;

        let end_token = self.consume_with_help(
            TokenType::RightBrace,
            "Expected '}' after object properties",
            "Object literals must be closed with '}' after the opening '{'. Example: { key: value }",
        )?;
        Ok(Expr::Object {
            properties,
            span: Span::new(start_span.start, end_token.span.end),
        })
    }

    fn object_properties(&mut self) -> JsResult<Vec<Property>> {
        let mut properties = Vec::new();

        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            let start = self.peek().span.start;

            if self.match_types(&[TokenType::Ellipsis]) {
                let argument = self.assignment()?;
                let span = Span::new(start, argument.span().end);
                properties.push(Property::Spread { argument, span });
            } else {
                let is_async = self.check_word("async")
                    && !matches!(
                        self.peek_at(1).token_type,
                        TokenType::LeftParen
                            | TokenType::Colon
                            | TokenType::Comma
                            | TokenType::RightBrace
                            | TokenType::Equal
                    );
                if is_async {
                    self.advance();
                }
                let key_token = self.peek().clone();
                let key = self.property_key()?;

                if self.check(TokenType::LeftParen) {
                    let function = self.function_rest(Some(key.clone()), FunctionKind::Method, is_async, start)?;
                    let span = function.span;
                    properties.push(Property::Method {
                        key,
                        function: Rc::new(function),
                        span,
                    });
                } else if self.match_types(&[TokenType::Colon]) {
                    let value = self.assignment()?;
                    let span = Span::new(start, value.span().end);
                    properties.push(Property::Init {
                        key,
                        value,
                        shorthand: false,
                        span,
                    });
                } else if key_token.token_type == TokenType::Identifier && self.check(TokenType::Equal) {
                    let equals = self.advance().span;
                    let default = self.assignment()?;
                    let span = Span::new(start, default.span().end);
                    self.cover_initializers.push(equals);
                    properties.push(Property::Init {
                        key: key.clone(),
                        value: Expr::Assign {
                            operator: AssignOp::Assign,
                            target: Box::new(Pattern::Identifier {
                                name: key,
                                span: key_token.span,
                            }),
                            value: Box::new(default),
                            span,
                        },
                        shorthand: true,
                        span,
                    });
                } else if key_token.token_type == TokenType::Identifier {
                    properties.push(Property::Init {
                        key: key.clone(),
                        value: Expr::Identifier {
                            name: key,
                            span: key_token.span,
                        },
                        shorthand: true,
                        span: key_token.span,
                    });
                } else {
                    return Err(self.unexpected(&format!("Expected ':' after property '{}'", key)));
                }
            }

            if !self.match_types(&[TokenType::Comma]) {
                break;
            }
        }

        Ok(properties)
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn match_types(&mut self, types: &[TokenType]) -> bool {
        for &token_type in types {
            if self.check(token_type) {
                self.advance();
                return true;
            }
        }
        false
    }

    /// Identifier spelled `word`, for contextual keywords such as `of` and
    /// `async` that remain valid binding names.
    fn check_word(&self, word: &str) -> bool {
        self.check(TokenType::Identifier) && self.peek().lexeme == word
    }

    /// `async function`, with no line break between the two words.
    fn at_async_function(&self) -> bool {
        self.check_word("async")
            && self.peek_at(1).token_type == TokenType::Function
            && !self.peek_at(1).newline_before
    }

    fn check(&self, token_type: TokenType) -> bool {
        if self.is_at_end() {
            token_type == TokenType::Eof
        } else {
            self.peek().token_type == token_type
        }
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::Eof
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    /// Token `offset` positions ahead, clamped to the final `Eof`.
    fn peek_at(&self, offset: usize) -> &Token {
        let index = (self.current + offset).min(self.tokens.len().saturating_sub(1));
        &self.tokens[index]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn error_span(&self) -> Span {
        if self.is_at_end() && self.current > 0 {
            // If we're at EOF, point to the end of the last real token
            Span::single(self.tokens[self.current - 1].span.end)
        } else {
            self.peek().span
        }
    }

    fn unexpected(&self, message: &str) -> JsError {
        JsError::parse_error(
            self.error_span(),
            format!("{}, found '{}'", message, self.peek().describe()),
        )
    }

    fn consume(&mut self, token_type: TokenType, message: &str) -> JsResult<&Token> {
        if self.check(token_type) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(message))
        }
    }

    fn consume_with_help(&mut self, token_type: TokenType, message: &str, help: &str) -> JsResult<&Token> {
        if self.check(token_type) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(message).with_help(help))
        }
    }
}

/// Parse a token stream produced by the lexer.
pub fn parse(tokens: Vec<Token>) -> JsResult<Program> {
    Parser::new(tokens).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::lexer::tokenize;

    fn parse_source(source: &str) -> JsResult<Program> {
        parse(tokenize(source)?)
    }

    fn first_expr(source: &str) -> Expr {
        let program = parse_source(source).unwrap();
        match program.statements.into_iter().next() {
            Some(Stmt::Expression { expr, .. }) => expr,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        match first_expr("1 + 2 * 3") {
            Expr::Binary {
                operator: BinaryOp::Add,
                right,
                ..
            } => assert!(matches!(
                *right,
                Expr::Binary {
                    operator: BinaryOp::Multiply,
                    ..
                }
            )),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn subtraction_is_left_associative() {
        match first_expr("10 - 3 - 2") {
            Expr::Binary {
                operator: BinaryOp::Subtract,
                left,
                ..
            } => assert!(matches!(
                *left,
                Expr::Binary {
                    operator: BinaryOp::Subtract,
                    ..
                }
            )),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn assignment_is_right_associative() {
        match first_expr("a = b = 1") {
            Expr::Assign { value, .. } => assert!(matches!(*value, Expr::Assign { .. })),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn logical_or_below_and() {
        match first_expr("a || b && c") {
            Expr::Logical {
                operator: LogicalOp::Or,
                right,
                ..
            } => assert!(matches!(
                *right,
                Expr::Logical {
                    operator: LogicalOp::And,
                    ..
                }
            )),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn arrow_versus_parenthesized_expression() {
        assert!(matches!(first_expr("(a, b) => a + b"), Expr::Arrow { .. }));
        assert!(matches!(first_expr("x => x * x"), Expr::Arrow { .. }));
        assert!(matches!(first_expr("() => 1"), Expr::Arrow { .. }));
        assert!(matches!(first_expr("(a + b) * 2"), Expr::Binary { .. }));
    }

    #[test]
    fn arrow_with_pattern_and_default_params() {
        match first_expr("({x, y}, [a] = [], ...rest) => x") {
            Expr::Arrow { function, .. } => {
                assert_eq!(function.params.len(), 2);
                assert!(matches!(function.params[0].target, Pattern::Object { .. }));
                assert!(function.params[1].default.is_some());
                assert!(function.rest.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rest_must_be_last() {
        let error = parse_source("function f(...a, b) {}").unwrap_err();
        assert_eq!(error.kind, ErrorKind::ParseError);
        assert!(error.message.contains("Rest parameter must be last"));
    }

    #[test]
    fn spread_in_call_and_array() {
        match first_expr("f(...args, [...xs, 3])") {
            Expr::Call { args, .. } => {
                assert!(matches!(args[0], Element::Spread { .. }));
                match &args[1] {
                    Element::Expr(Expr::Array { elements, .. }) => {
                        assert!(matches!(elements[0], Some(Element::Spread { .. })))
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn for_statement_kinds() {
        let program = parse_source(
            "for (let i = 0; i < 3; i++) {}\nfor (const item of items) {}\nfor (const key in object) {}",
        )
        .unwrap();
        assert!(matches!(program.statements[0], Stmt::For { .. }));
        assert!(matches!(program.statements[1], Stmt::ForOf { .. }));
        assert!(matches!(program.statements[2], Stmt::ForIn { .. }));
    }

    #[test]
    fn class_with_constructor_and_super() {
        let program = parse_source(
            "class Dog extends Animal { constructor(n) { super(n); } speak() { return super.speak(); } }",
        )
        .unwrap();
        match &program.statements[0] {
            Stmt::ClassDeclaration { class, .. } => {
                assert_eq!(class.name.as_deref(), Some("Dog"));
                assert!(class.superclass.is_some());
                assert!(class.constructor.is_some());
                assert_eq!(class.methods.len(), 1);
                assert_eq!(class.methods[0].name, "speak");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn super_outside_class_is_tagged() {
        match first_expr("super.method()") {
            Expr::Call { callee, .. } => assert!(matches!(
                *callee,
                Expr::SuperMember {
                    context: SuperContext::Outside,
                    ..
                }
            )),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn object_shorthand_and_methods() {
        match first_expr("({ a, b: 2, add(x) { return x; }, ...rest })") {
            Expr::Object { properties, .. } => {
                assert!(matches!(properties[0], Property::Init { shorthand: true, .. }));
                assert!(matches!(properties[1], Property::Init { shorthand: false, .. }));
                assert!(matches!(properties[2], Property::Method { .. }));
                assert!(matches!(properties[3], Property::Spread { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn destructuring_declarations_and_assignment() {
        let program = parse_source("const {x, y: [a, b = 2]} = p; [a, b] = [b, a];").unwrap();
        match &program.statements[0] {
            Stmt::VariableDeclaration { declarations, .. } => {
                assert_eq!(declarations[0].target.bound_names(), vec!["x", "a", "b"]);
            }
            other => panic!("unexpected {:?}", other),
        }
        match &program.statements[1] {
            Stmt::Expression {
                expr: Expr::Assign { target, .. },
                ..
            } => assert!(matches!(**target, Pattern::Array { .. })),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn template_literal_parts() {
        match first_expr("`Hello, ${name}! ${a + b}`") {
            Expr::Template { elements, .. } => {
                assert_eq!(elements.len(), 5);
                assert!(matches!(&elements[0], TemplateElement::Text(text) if text == "Hello, "));
                assert!(matches!(&elements[1], TemplateElement::Expr(Expr::Identifier { .. })));
                assert!(matches!(&elements[3], TemplateElement::Expr(Expr::Binary { .. })));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn async_function_and_await() {
        let program = parse_source("async function f() { const r = await g(); return r; }").unwrap();
        match &program.statements[0] {
            Stmt::FunctionDeclaration { function, .. } => assert!(function.is_async),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn return_outside_function_is_rejected() {
        let error = parse_source("return 1").unwrap_err();
        assert!(error.message.contains("Illegal return"));
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let error = parse_source("break;").unwrap_err();
        assert!(error.message.contains("Illegal break"));
    }

    #[test]
    fn missing_paren_reports_found_token() {
        let error = parse_source("if (x { }").unwrap_err();
        assert_eq!(error.message, "Expected ')' after if condition, found '{'");
    }

    #[test]
    fn return_then_newline_returns_nothing() {
        let program = parse_source("function f() { return\n1 }").unwrap();
        match &program.statements[0] {
            Stmt::FunctionDeclaration { function, .. } => match &function.body {
                FunctionBody::Block(body) => {
                    assert!(matches!(body[0], Stmt::Return { value: None, .. }));
                    assert_eq!(body.len(), 2);
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn new_with_member_callee() {
        match first_expr("new a.B(1).c") {
            Expr::Member { object, .. } => match *object {
                Expr::New { callee, args, .. } => {
                    assert!(matches!(*callee, Expr::Member { .. }));
                    assert_eq!(args.len(), 1);
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn shorthand_default_in_assignment_pattern() {
        match first_expr("({ a = 5, b } = obj)") {
            Expr::Assign { target, .. } => match *target {
                Pattern::Object { properties, .. } => {
                    assert_eq!(properties.len(), 2);
                    assert!(properties[0].shorthand);
                    assert!(matches!(properties[0].value.target, Pattern::Identifier { ref name, .. } if name == "a"));
                    assert!(matches!(
                        properties[0].value.default,
                        Some(Expr::Literal { value: Literal::Number(n), .. }) if n == 5.0
                    ));
                    assert!(properties[1].value.default.is_none());
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn nested_shorthand_default_in_for_of_target() {
        assert!(parse_source("let a; for ([{ a = 1 }] of xs) {}").is_ok());
        assert!(parse_source("let a; [{ a = 1 }] = xs;").is_ok());
    }

    #[test]
    fn shorthand_default_outside_pattern_is_rejected() {
        for source in ["({ a = 5 });", "f({ a = 5 });", "x = { a = 5 };", "({ a = 5 }).a;"] {
            let error = parse_source(source).unwrap_err();
            assert_eq!(error.kind, ErrorKind::ParseError);
            assert_eq!(error.message, "Invalid shorthand property initializer");
        }
    }

    #[test]
    fn async_and_of_are_contextual() {
        let program = parse_source("const of = 1; const async = 2; async + of;").unwrap();
        assert_eq!(program.statements.len(), 3);
        assert!(parse_source("for (const of of list) {}").is_ok());
        assert!(parse_source("let async = x => x; async(1);").is_ok());
        assert!(parse_source("const o = { async: 1, of: 2, async m() {} };").is_ok());
        match first_expr("async x => x") {
            Expr::Arrow { function, .. } => assert!(function.is_async),
            other => panic!("unexpected {:?}", other),
        }
        match &parse_source("async function f() {}").unwrap().statements[0] {
            Stmt::FunctionDeclaration { function, .. } => assert!(function.is_async),
            other => panic!("unexpected {:?}", other),
        }
        match &parse_source("for (x of xs) {}").unwrap().statements[0] {
            Stmt::ForOf { .. } => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn deep_parenthesized_nesting_parses() {
        let source = format!("{}1{};", "(".repeat(3000), ")".repeat(3000));
        match &parse_source(&source).unwrap().statements[0] {
            Stmt::Expression { expr, .. } => assert!(matches!(expr, Expr::Literal { .. })),
            other => panic!("unexpected {:?}", other),
        }
        let nested_arrays = format!("x = {}{};", "[".repeat(3000), "]".repeat(3000));
        assert!(parse_source(&nested_arrays).is_ok());
    }
}
