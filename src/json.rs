//! JSON renderings of the token stream and the syntax tree.
//!
//! Tree nodes use ESTree names (`BinaryExpression` with `operator`, `left`
//! and `right`, and so on). Given the source text, every node that has a
//! span also carries 1-based `start` and `end` positions; without it the
//! output depends only on the shape of the tree, so two parses can be
//! compared for structural equality.

use crate::ast::{
    ClassDef, Element, Expr, ForBinding, ForInit, FunctionBody, FunctionDef, Literal, MemberProperty,
    Pattern, PatternElement, Program, Property, Stmt, TemplateElement, VarKind, VariableDeclarator,
};
use crate::error::{JsError, LineIndex, Position, Span};
use crate::lexer::{Lexer, TokenType};
use crate::printer::{is_identifier_name, quote};
use crate::stack::ensure_sufficient_stack;
use crate::value::number_to_string;
use serde::Serialize;
use serde_json::{json, Map, Value};

/// One line of `jsflow lex` output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenRecord<'a> {
    #[serde(rename = "type")]
    pub category: &'static str,
    pub start: Position,
    pub end: Position,
    /// 1 on the record describing a lexical error.
    pub error: u8,
    /// The error message when `error` is set.
    pub kind: Option<String>,
    /// Source text the token covers.
    pub lexeme: &'a str,
}

fn category(token_type: TokenType) -> &'static str {
    match token_type {
        TokenType::Eof => "EOF",
        TokenType::Number => "Number",
        TokenType::String => "String",
        TokenType::Template => "Template",
        TokenType::Identifier => "Identifier",
        keyword if keyword.is_keyword() => "Identifier",
        _ => "Punctuator",
    }
}

/// Scan `source` into one record per token, ending with `EOF`. A lexical
/// error ends the stream with an `Error` record and is returned as well.
pub fn token_records(source: &str) -> (Vec<TokenRecord<'_>>, Option<JsError>) {
    let index = LineIndex::new(source);
    let offsets: Vec<usize> = source
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(source.len()))
        .collect();

    let mut records = Vec::new();
    for token in Lexer::new(source) {
        match token {
            Ok(token) => records.push(TokenRecord {
                category: category(token.token_type),
                start: index.position(token.span.start),
                end: index.position(token.span.end),
                error: 0,
                kind: None,
                lexeme: source_text(source, &offsets, token.span),
            }),
            Err(error) => {
                records.push(TokenRecord {
                    category: "Error",
                    start: index.position(error.span.start),
                    end: index.position(error.span.end),
                    error: 1,
                    kind: Some(error.message.clone()),
                    lexeme: source_text(source, &offsets, error.span),
                });
                return (records, Some(error));
            }
        }
    }
    (records, None)
}

/// Slice of `source` covered by a char-offset span.
fn source_text<'a>(source: &'a str, offsets: &[usize], span: Span) -> &'a str {
    let start = offsets.get(span.start).copied().unwrap_or(source.len());
    let end = offsets.get(span.end).copied().unwrap_or(source.len()).max(start);
    source.get(start..end).unwrap_or("")
}

/// Render `program` as an ESTree-style tree. Positions are included only
/// when `source` is given.
pub fn program_to_json(program: &Program, source: Option<&str>) -> Value {
    let dumper = TreeDumper {
        index: source.map(LineIndex::new),
    };
    let span = source.map(|source| Span::new(0, source.chars().count()));
    dumper.node("Program", span, json!({ "body": dumper.statements(&program.statements) }))
}

struct TreeDumper {
    index: Option<LineIndex>,
}

impl TreeDumper {
    fn node(&self, kind: &str, span: Option<Span>, fields: Value) -> Value {
        let mut map = Map::new();
        map.insert("type".to_string(), Value::from(kind));
        if let (Some(index), Some(span)) = (&self.index, span) {
            map.insert("start".to_string(), position(index.position(span.start)));
            map.insert("end".to_string(), position(index.position(span.end)));
        }
        if let Value::Object(fields) = fields {
            map.extend(fields);
        }
        Value::Object(map)
    }

    fn identifier(&self, name: &str, span: Option<Span>) -> Value {
        self.node("Identifier", span, json!({ "name": name }))
    }

    fn statements(&self, statements: &[Stmt]) -> Vec<Value> {
        statements.iter().map(|stmt| self.statement(stmt)).collect()
    }

    fn statement(&self, stmt: &Stmt) -> Value {
        ensure_sufficient_stack(|| self.statement_inner(stmt))
    }

    fn statement_inner(&self, stmt: &Stmt) -> Value {
        match stmt {
            Stmt::Expression { expr, span } => {
                self.node("ExpressionStatement", Some(*span), json!({ "expression": self.expr(expr) }))
            }
            Stmt::VariableDeclaration {
                kind,
                declarations,
                span,
            } => self.declaration(*kind, declarations, Some(*span)),
            Stmt::FunctionDeclaration { function, span } => self.function("FunctionDeclaration", function, Some(*span)),
            Stmt::ClassDeclaration { class, span } => self.class("ClassDeclaration", class, *span),
            Stmt::Block { statements, span } => {
                self.node("BlockStatement", Some(*span), json!({ "body": self.statements(statements) }))
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                span,
            } => self.node(
                "IfStatement",
                Some(*span),
                json!({
                    "test": self.expr(condition),
                    "consequent": self.statement(then_branch),
                    "alternate": else_branch.as_ref().map_or(Value::Null, |stmt| self.statement(stmt)),
                }),
            ),
            Stmt::While { condition, body, span } => self.node(
                "WhileStatement",
                Some(*span),
                json!({ "test": self.expr(condition), "body": self.statement(body) }),
            ),
            Stmt::DoWhile { body, condition, span } => self.node(
                "DoWhileStatement",
                Some(*span),
                json!({ "body": self.statement(body), "test": self.expr(condition) }),
            ),
            Stmt::For {
                init,
                condition,
                update,
                body,
                span,
            } => {
                let init = match init {
                    Some(ForInit::Declaration { kind, declarations }) => self.declaration(*kind, declarations, None),
                    Some(ForInit::Expression(expr)) => self.expr(expr),
                    None => Value::Null,
                };
                self.node(
                    "ForStatement",
                    Some(*span),
                    json!({
                        "init": init,
                        "test": self.optional(condition.as_ref()),
                        "update": self.optional(update.as_ref()),
                        "body": self.statement(body),
                    }),
                )
            }
            Stmt::ForOf { left, right, body, span } => self.for_each("ForOfStatement", left, right, body, *span),
            Stmt::ForIn { left, right, body, span } => self.for_each("ForInStatement", left, right, body, *span),
            Stmt::Return { value, span } => {
                self.node("ReturnStatement", Some(*span), json!({ "argument": self.optional(value.as_ref()) }))
            }
            Stmt::Break { span } => self.node("BreakStatement", Some(*span), json!({ "label": null })),
            Stmt::Continue { span } => self.node("ContinueStatement", Some(*span), json!({ "label": null })),
            Stmt::Empty { span } => self.node("EmptyStatement", Some(*span), json!({})),
        }
    }

    fn optional(&self, expr: Option<&Expr>) -> Value {
        expr.map_or(Value::Null, |expr| self.expr(expr))
    }

    fn declaration(&self, kind: VarKind, declarations: &[VariableDeclarator], span: Option<Span>) -> Value {
        let declarations: Vec<Value> = declarations
            .iter()
            .map(|declarator| {
                self.node(
                    "VariableDeclarator",
                    Some(declarator.span),
                    json!({
                        "id": self.pattern(&declarator.target),
                        "init": self.optional(declarator.init.as_ref()),
                    }),
                )
            })
            .collect();
        self.node(
            "VariableDeclaration",
            span,
            json!({ "kind": kind.as_str(), "declarations": declarations }),
        )
    }

    fn for_each(&self, kind: &str, left: &ForBinding, right: &Expr, body: &Stmt, span: Span) -> Value {
        let left = match left {
            ForBinding::Declaration { kind, target } => {
                let declarator = self.node(
                    "VariableDeclarator",
                    Some(target.span()),
                    json!({ "id": self.pattern(target), "init": null }),
                );
                self.node(
                    "VariableDeclaration",
                    None,
                    json!({ "kind": kind.as_str(), "declarations": [declarator] }),
                )
            }
            ForBinding::Target(pattern) => self.pattern(pattern),
        };
        self.node(
            kind,
            Some(span),
            json!({ "left": left, "right": self.expr(right), "body": self.statement(body) }),
        )
    }

    fn function(&self, kind: &str, function: &FunctionDef, span: Option<Span>) -> Value {
        let id = function
            .name
            .as_deref()
            .map_or(Value::Null, |name| self.identifier(name, None));
        let mut params: Vec<Value> = function.params.iter().map(|param| self.pattern_element(param)).collect();
        if let Some(rest) = &function.rest {
            params.push(self.node("RestElement", Some(rest.span()), json!({ "argument": self.pattern(rest) })));
        }
        let (body, expression) = match &function.body {
            FunctionBody::Block(statements) => (
                self.node("BlockStatement", None, json!({ "body": self.statements(statements) })),
                false,
            ),
            FunctionBody::Expression(expr) => (self.expr(expr), true),
        };
        self.node(
            kind,
            span,
            json!({
                "id": id,
                "params": params,
                "body": body,
                "async": function.is_async,
                "expression": expression,
            }),
        )
    }

    fn class(&self, kind: &str, class: &ClassDef, span: Span) -> Value {
        let id = class.name.as_deref().map_or(Value::Null, |name| self.identifier(name, None));
        let mut members = Vec::new();
        if let Some(constructor) = &class.constructor {
            members.push(self.method_definition("constructor", "constructor", constructor, constructor.span));
        }
        for method in &class.methods {
            members.push(self.method_definition("method", &method.name, &method.function, method.span));
        }
        self.node(
            kind,
            Some(span),
            json!({
                "id": id,
                "superClass": self.optional(class.superclass.as_deref()),
                "body": self.node("ClassBody", None, json!({ "body": members })),
            }),
        )
    }

    fn method_definition(&self, kind: &str, name: &str, function: &FunctionDef, span: Span) -> Value {
        self.node(
            "MethodDefinition",
            Some(span),
            json!({
                "kind": kind,
                "key": self.key(name),
                "value": self.function("FunctionExpression", function, Some(function.span)),
            }),
        )
    }

    /// Property names that are not identifiers print as string literals.
    fn key(&self, name: &str) -> Value {
        if is_identifier_name(name) {
            self.identifier(name, None)
        } else {
            self.node("Literal", None, json!({ "value": name, "raw": quote(name) }))
        }
    }

    fn pattern(&self, pattern: &Pattern) -> Value {
        ensure_sufficient_stack(|| self.pattern_inner(pattern))
    }

    fn pattern_inner(&self, pattern: &Pattern) -> Value {
        match pattern {
            Pattern::Identifier { name, span } => self.identifier(name, Some(*span)),
            Pattern::Member { target, .. } => self.expr(target),
            Pattern::Array { elements, rest, span } => {
                let mut elements: Vec<Value> = elements
                    .iter()
                    .map(|element| element.as_ref().map_or(Value::Null, |element| self.pattern_element(element)))
                    .collect();
                if let Some(rest) = rest {
                    elements.push(self.node("RestElement", Some(rest.span()), json!({ "argument": self.pattern(rest) })));
                }
                self.node("ArrayPattern", Some(*span), json!({ "elements": elements }))
            }
            Pattern::Object { properties, rest, span } => {
                let mut properties: Vec<Value> = properties
                    .iter()
                    .map(|property| {
                        self.node(
                            "Property",
                            Some(property.span),
                            json!({
                                "key": self.key(&property.key),
                                "value": self.pattern_element(&property.value),
                                "shorthand": property.shorthand,
                                "computed": false,
                            }),
                        )
                    })
                    .collect();
                if let Some(rest) = rest {
                    properties.push(self.node("RestElement", Some(rest.span()), json!({ "argument": self.pattern(rest) })));
                }
                self.node("ObjectPattern", Some(*span), json!({ "properties": properties }))
            }
        }
    }

    fn pattern_element(&self, element: &PatternElement) -> Value {
        let target = self.pattern(&element.target);
        match &element.default {
            Some(default) => self.node(
                "AssignmentPattern",
                Some(element.target.span().to(default.span())),
                json!({ "left": target, "right": self.expr(default) }),
            ),
            None => target,
        }
    }

    fn element(&self, element: &Element) -> Value {
        match element {
            Element::Expr(expr) => self.expr(expr),
            Element::Spread { argument, span } => {
                self.node("SpreadElement", Some(*span), json!({ "argument": self.expr(argument) }))
            }
        }
    }

    fn elements(&self, elements: &[Element]) -> Vec<Value> {
        elements.iter().map(|element| self.element(element)).collect()
    }

    fn member(&self, object: Value, property: &MemberProperty, span: Span) -> Value {
        let (property, computed) = match property {
            MemberProperty::Named(name) => (self.identifier(name, None), false),
            MemberProperty::Computed(expr) => (self.expr(expr), true),
        };
        self.node(
            "MemberExpression",
            Some(span),
            json!({ "object": object, "property": property, "computed": computed }),
        )
    }

    fn expr(&self, expr: &Expr) -> Value {
        ensure_sufficient_stack(|| self.expr_inner(expr))
    }

    fn expr_inner(&self, expr: &Expr) -> Value {
        match expr {
            Expr::Literal { value, span } => {
                let (value, raw) = match value {
                    Literal::Number(n) => (json!(n), number_to_string(*n)),
                    Literal::String(s) => (json!(s), quote(s)),
                    Literal::Bool(b) => (json!(b), b.to_string()),
                    Literal::Null => (Value::Null, "null".to_string()),
                };
                self.node("Literal", Some(*span), json!({ "value": value, "raw": raw }))
            }
            Expr::Identifier { name, span } => self.identifier(name, Some(*span)),
            Expr::Template { elements, span } => {
                // Text runs between expressions, so there is always one more
                // quasi than expression.
                let mut quasis = Vec::new();
                let mut expressions = Vec::new();
                let mut text = String::new();
                for element in elements {
                    match element {
                        TemplateElement::Text(part) => text.push_str(part),
                        TemplateElement::Expr(expr) => {
                            quasis.push(self.template_element(&std::mem::take(&mut text)));
                            expressions.push(self.expr(expr));
                        }
                    }
                }
                quasis.push(self.template_element(&text));
                self.node(
                    "TemplateLiteral",
                    Some(*span),
                    json!({ "quasis": quasis, "expressions": expressions }),
                )
            }
            Expr::Array { elements, span } => {
                let elements: Vec<Value> = elements
                    .iter()
                    .map(|element| element.as_ref().map_or(Value::Null, |element| self.element(element)))
                    .collect();
                self.node("ArrayExpression", Some(*span), json!({ "elements": elements }))
            }
            Expr::Object { properties, span } => {
                let properties: Vec<Value> = properties
                    .iter()
                    .map(|property| match property {
                        Property::Init {
                            key,
                            value,
                            shorthand,
                            span,
                        } => self.node(
                            "Property",
                            Some(*span),
                            json!({
                                "key": self.key(key),
                                "value": self.expr(value),
                                "method": false,
                                "shorthand": shorthand,
                                "computed": false,
                            }),
                        ),
                        Property::Method { key, function, span } => self.node(
                            "Property",
                            Some(*span),
                            json!({
                                "key": self.key(key),
                                "value": self.function("FunctionExpression", function, Some(function.span)),
                                "method": true,
                                "shorthand": false,
                                "computed": false,
                            }),
                        ),
                        Property::Spread { argument, span } => {
                            self.node("SpreadElement", Some(*span), json!({ "argument": self.expr(argument) }))
                        }
                    })
                    .collect();
                self.node("ObjectExpression", Some(*span), json!({ "properties": properties }))
            }
            Expr::Function { function, span } => self.function("FunctionExpression", function, Some(*span)),
            Expr::Arrow { function, span } => self.function("ArrowFunctionExpression", function, Some(*span)),
            Expr::Class { class, span } => self.class("ClassExpression", class, *span),
            Expr::Unary { operator, operand, span } => self.node(
                "UnaryExpression",
                Some(*span),
                json!({ "operator": operator.as_str(), "prefix": true, "argument": self.expr(operand) }),
            ),
            Expr::Update {
                operator,
                prefix,
                target,
                span,
            } => self.node(
                "UpdateExpression",
                Some(*span),
                json!({ "operator": operator.as_str(), "prefix": prefix, "argument": self.expr(target) }),
            ),
            Expr::Binary {
                left,
                operator,
                right,
                span,
            } => self.node(
                "BinaryExpression",
                Some(*span),
                json!({ "operator": operator.as_str(), "left": self.expr(left), "right": self.expr(right) }),
            ),
            Expr::Logical {
                left,
                operator,
                right,
                span,
            } => self.node(
                "LogicalExpression",
                Some(*span),
                json!({ "operator": operator.as_str(), "left": self.expr(left), "right": self.expr(right) }),
            ),
            Expr::Conditional {
                condition,
                consequent,
                alternate,
                span,
            } => self.node(
                "ConditionalExpression",
                Some(*span),
                json!({
                    "test": self.expr(condition),
                    "consequent": self.expr(consequent),
                    "alternate": self.expr(alternate),
                }),
            ),
            Expr::Assign {
                operator,
                target,
                value,
                span,
            } => self.node(
                "AssignmentExpression",
                Some(*span),
                json!({ "operator": operator.as_str(), "left": self.pattern(target), "right": self.expr(value) }),
            ),
            Expr::Call { callee, args, span } => self.node(
                "CallExpression",
                Some(*span),
                json!({ "callee": self.expr(callee), "arguments": self.elements(args) }),
            ),
            Expr::New { callee, args, span } => self.node(
                "NewExpression",
                Some(*span),
                json!({ "callee": self.expr(callee), "arguments": self.elements(args) }),
            ),
            Expr::Member { object, property, span } => self.member(self.expr(object), property, *span),
            Expr::This { span } => self.node("ThisExpression", Some(*span), json!({})),
            Expr::SuperMember { property, span, .. } => {
                self.member(self.node("Super", None, json!({})), property, *span)
            }
            Expr::SuperCall { args, span, .. } => self.node(
                "CallExpression",
                Some(*span),
                json!({ "callee": self.node("Super", None, json!({})), "arguments": self.elements(args) }),
            ),
            Expr::Await { argument, span } => {
                self.node("AwaitExpression", Some(*span), json!({ "argument": self.expr(argument) }))
            }
        }
    }

    fn template_element(&self, text: &str) -> Value {
        self.node("TemplateElement", None, json!({ "value": { "cooked": text } }))
    }
}

fn position(position: Position) -> Value {
    json!({ "line": position.line, "column": position.column })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;
    use pretty_assertions::assert_eq;

    fn shape(source: &str) -> Value {
        program_to_json(&parse(source).unwrap(), None)
    }

    #[test]
    fn binary_expression_shape() {
        assert_eq!(
            shape("1 + x;"),
            json!({
                "type": "Program",
                "body": [{
                    "type": "ExpressionStatement",
                    "expression": {
                        "type": "BinaryExpression",
                        "operator": "+",
                        "left": { "type": "Literal", "value": 1.0, "raw": "1" },
                        "right": { "type": "Identifier", "name": "x" },
                    },
                }],
            })
        );
    }

    #[test]
    fn positions_are_one_based() {
        let source = "let a = 1;\nb = a;";
        let tree = program_to_json(&parse(source).unwrap(), Some(source));
        let assignment = &tree["body"][1]["expression"];
        assert_eq!(assignment["type"], "AssignmentExpression");
        assert_eq!(assignment["start"], json!({ "line": 2, "column": 1 }));
        assert_eq!(assignment["right"]["start"], json!({ "line": 2, "column": 5 }));
        assert_eq!(assignment["right"]["end"], json!({ "line": 2, "column": 6 }));
        assert_eq!(tree["body"][0]["declarations"][0]["id"]["name"], "a");
    }

    #[test]
    fn templates_alternate_quasis_and_expressions() {
        let tree = shape("`a${x}${y}b`;");
        let template = &tree["body"][0]["expression"];
        assert_eq!(template["expressions"].as_array().map(Vec::len), Some(2));
        let cooked: Vec<&str> = template["quasis"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|quasi| quasi["value"]["cooked"].as_str())
            .collect();
        assert_eq!(cooked, vec!["a", "", "b"]);
    }

    #[test]
    fn patterns_and_holes() {
        let tree = shape("const [a, , b = 2, ...rest] = xs;");
        let id = &tree["body"][0]["declarations"][0]["id"];
        assert_eq!(id["type"], "ArrayPattern");
        assert_eq!(id["elements"][1], Value::Null);
        assert_eq!(id["elements"][2]["type"], "AssignmentPattern");
        assert_eq!(id["elements"][3]["type"], "RestElement");
    }

    #[test]
    fn super_and_classes() {
        let tree = shape("class B extends A { constructor() { super(); } m() { return super.m(); } }");
        let class = &tree["body"][0];
        assert_eq!(class["superClass"]["name"], "A");
        let members = &class["body"]["body"];
        assert_eq!(members[0]["kind"], "constructor");
        assert_eq!(members[1]["key"]["name"], "m");
        let call = &members[0]["value"]["body"]["body"][0]["expression"];
        assert_eq!(call["callee"]["type"], "Super");
    }

    #[test]
    fn token_records_carry_source_text() {
        let (records, error) = token_records("let s = 'a';\nx");
        assert!(error.is_none());
        let summary: Vec<(&str, &str)> = records.iter().map(|record| (record.category, record.lexeme)).collect();
        assert_eq!(
            summary,
            vec![
                ("Identifier", "let"),
                ("Identifier", "s"),
                ("Punctuator", "="),
                ("String", "'a'"),
                ("Punctuator", ";"),
                ("Identifier", "x"),
                ("EOF", ""),
            ]
        );
        assert_eq!(records[5].start, Position { line: 2, column: 1 });
        assert_eq!(records[5].end, Position { line: 2, column: 2 });
    }

    #[test]
    fn token_record_serializes_in_field_order() {
        let (records, _) = token_records("0x1F");
        assert_eq!(
            serde_json::to_string(&records[0]).unwrap(),
            r#"{"type":"Number","start":{"line":1,"column":1},"end":{"line":1,"column":5},"error":0,"kind":null,"lexeme":"0x1F"}"#
        );
    }

    #[test]
    fn lexical_error_ends_the_stream() {
        let (records, error) = token_records("a @");
        let last = records.last().unwrap();
        assert_eq!(last.category, "Error");
        assert_eq!(last.error, 1);
        assert_eq!(last.lexeme, "@");
        assert_eq!(last.kind.as_deref(), error.as_ref().map(|error| error.message.as_str()));
    }
}
