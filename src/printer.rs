use crate::ast::{
    ClassDef, Element, Expr, ForBinding, ForInit, FunctionBody, FunctionDef, FunctionKind, Literal,
    MemberProperty, Pattern, PatternElement, Program, Property, Stmt, TemplateElement, UnaryOp,
    VarKind, VariableDeclarator, PREC_ASSIGNMENT, PREC_CALL, PREC_CONDITIONAL, PREC_LOGICAL_OR,
    PREC_POSTFIX, PREC_PRIMARY, PREC_UNARY,
};
use crate::stack::ensure_sufficient_stack;
use crate::value::number_to_string;

const INDENT: &str = "    ";

/// Turns a syntax tree back into normalized JavaScript source.
///
/// Parentheses are emitted only where the parser's precedence table needs
/// them, so printing a parsed program and parsing the result again yields
/// the same tree.
#[derive(Debug, Default)]
pub struct Printer {
    indent: usize,
}

impl Printer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print(&mut self, program: &Program) -> String {
        let mut out = String::new();
        for stmt in &program.statements {
            self.write_indent(&mut out);
            self.statement(stmt, &mut out);
            out.push('\n');
        }
        out
    }

    fn write_indent(&self, out: &mut String) {
        for _ in 0..self.indent {
            out.push_str(INDENT);
        }
    }

    fn block(&mut self, statements: &[Stmt], out: &mut String) {
        if statements.is_empty() {
            out.push_str("{}");
            return;
        }
        out.push_str("{\n");
        self.indent += 1;
        for stmt in statements {
            self.write_indent(out);
            self.statement(stmt, out);
            out.push('\n');
        }
        self.indent -= 1;
        self.write_indent(out);
        out.push('}');
    }

    /// Loop and branch bodies: blocks stay on the header line, anything else
    /// follows after a space.
    fn body(&mut self, stmt: &Stmt, out: &mut String) {
        out.push(' ');
        self.statement(stmt, out);
    }

    fn statement(&mut self, stmt: &Stmt, out: &mut String) {
        ensure_sufficient_stack(|| self.statement_inner(stmt, out))
    }

    fn statement_inner(&mut self, stmt: &Stmt, out: &mut String) {
        match stmt {
            Stmt::Expression { expr, .. } => {
                let text = self.expr(expr, PREC_ASSIGNMENT);
                if text.starts_with('{')
                    || text.starts_with("function")
                    || text.starts_with("async function")
                    || text.starts_with("class")
                {
                    out.push('(');
                    out.push_str(&text);
                    out.push(')');
                } else {
                    out.push_str(&text);
                }
                out.push(';');
            }
            Stmt::VariableDeclaration { kind, declarations, .. } => {
                self.declaration(*kind, declarations, out);
                out.push(';');
            }
            Stmt::FunctionDeclaration { function, .. } => self.function(function, out),
            Stmt::ClassDeclaration { class, .. } => self.class(class, out),
            Stmt::Block { statements, .. } => self.block(statements, out),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                out.push_str("if (");
                out.push_str(&self.expr(condition, PREC_ASSIGNMENT));
                out.push(')');
                match else_branch {
                    Some(else_stmt) => {
                        // An else-less inner `if` would capture our `else`.
                        if matches!(**then_branch, Stmt::If { else_branch: None, .. }) {
                            out.push(' ');
                            self.block(std::slice::from_ref(&**then_branch), out);
                        } else {
                            self.body(then_branch, out);
                        }
                        out.push_str(" else");
                        self.body(else_stmt, out);
                    }
                    None => self.body(then_branch, out),
                }
            }
            Stmt::While { condition, body, .. } => {
                out.push_str("while (");
                out.push_str(&self.expr(condition, PREC_ASSIGNMENT));
                out.push(')');
                self.body(body, out);
            }
            Stmt::DoWhile { body, condition, .. } => {
                out.push_str("do");
                self.body(body, out);
                out.push_str(" while (");
                out.push_str(&self.expr(condition, PREC_ASSIGNMENT));
                out.push_str(");");
            }
            Stmt::For {
                init,
                condition,
                update,
                body,
                ..
            } => {
                out.push_str("for (");
                match init {
                    Some(ForInit::Declaration { kind, declarations }) => self.declaration(*kind, declarations, out),
                    Some(ForInit::Expression(expr)) => out.push_str(&self.expr(expr, PREC_ASSIGNMENT)),
                    None => {}
                }
                out.push(';');
                if let Some(condition) = condition {
                    out.push(' ');
                    out.push_str(&self.expr(condition, PREC_ASSIGNMENT));
                }
                out.push(';');
                if let Some(update) = update {
                    out.push(' ');
                    out.push_str(&self.expr(update, PREC_ASSIGNMENT));
                }
                out.push(')');
                self.body(body, out);
            }
            Stmt::ForOf { left, right, body, .. } => self.for_each("of", left, right, body, out),
            Stmt::ForIn { left, right, body, .. } => self.for_each("in", left, right, body, out),
            Stmt::Return { value, .. } => {
                out.push_str("return");
                if let Some(value) = value {
                    out.push(' ');
                    out.push_str(&self.expr(value, PREC_ASSIGNMENT));
                }
                out.push(';');
            }
            Stmt::Break { .. } => out.push_str("break;"),
            Stmt::Continue { .. } => out.push_str("continue;"),
            Stmt::Empty { .. } => out.push(';'),
        }
    }

    fn for_each(&mut self, keyword: &str, left: &ForBinding, right: &Expr, body: &Stmt, out: &mut String) {
        out.push_str("for (");
        match left {
            ForBinding::Declaration { kind, target } => {
                out.push_str(kind.as_str());
                out.push(' ');
                out.push_str(&self.pattern(target));
            }
            ForBinding::Target(target) => out.push_str(&self.pattern(target)),
        }
        out.push(' ');
        out.push_str(keyword);
        out.push(' ');
        out.push_str(&self.expr(right, PREC_ASSIGNMENT));
        out.push(')');
        self.body(body, out);
    }

    fn declaration(&mut self, kind: VarKind, declarations: &[VariableDeclarator], out: &mut String) {
        out.push_str(kind.as_str());
        out.push(' ');
        for (index, declarator) in declarations.iter().enumerate() {
            if index > 0 {
                out.push_str(", ");
            }
            out.push_str(&self.pattern(&declarator.target));
            if let Some(init) = &declarator.init {
                out.push_str(" = ");
                out.push_str(&self.expr(init, PREC_ASSIGNMENT));
            }
        }
    }

    fn function(&mut self, function: &FunctionDef, out: &mut String) {
        if function.is_async {
            out.push_str("async ");
        }
        out.push_str("function");
        if let Some(name) = &function.name {
            out.push(' ');
            out.push_str(name);
        }
        self.signature_and_body(function, out);
    }

    /// `(params) { body }` shared by functions and methods.
    fn signature_and_body(&mut self, function: &FunctionDef, out: &mut String) {
        out.push('(');
        out.push_str(&self.parameters(function));
        out.push_str(") ");
        match &function.body {
            FunctionBody::Block(statements) => self.block(statements, out),
            FunctionBody::Expression(expr) => {
                let text = self.expr(expr, PREC_ASSIGNMENT);
                out.push_str("{ return ");
                out.push_str(&text);
                out.push_str("; }");
            }
        }
    }

    fn parameters(&mut self, function: &FunctionDef) -> String {
        let mut parts: Vec<String> = function.params.iter().map(|param| self.pattern_element(param)).collect();
        if let Some(rest) = &function.rest {
            parts.push(format!("...{}", self.pattern(rest)));
        }
        parts.join(", ")
    }

    fn class(&mut self, class: &ClassDef, out: &mut String) {
        out.push_str("class");
        if let Some(name) = &class.name {
            out.push(' ');
            out.push_str(name);
        }
        if let Some(superclass) = &class.superclass {
            out.push_str(" extends ");
            out.push_str(&self.expr(superclass, PREC_CALL));
        }
        out.push(' ');

        let members: Vec<&FunctionDef> = class
            .constructor
            .iter()
            .map(|function| &**function)
            .chain(class.methods.iter().map(|method| &*method.function))
            .collect();
        if members.is_empty() {
            out.push_str("{}");
            return;
        }

        out.push_str("{\n");
        self.indent += 1;
        for (index, function) in members.iter().enumerate() {
            if index > 0 {
                out.push('\n');
            }
            self.write_indent(out);
            self.method(function, out);
            out.push('\n');
        }
        self.indent -= 1;
        self.write_indent(out);
        out.push('}');
    }

    fn method(&mut self, function: &FunctionDef, out: &mut String) {
        if function.is_async {
            out.push_str("async ");
        }
        let name = match (&function.name, function.kind) {
            (_, FunctionKind::Constructor) => "constructor".to_string(),
            (Some(name), _) => property_key(name),
            (None, _) => String::new(),
        };
        out.push_str(&name);
        self.signature_and_body(function, out);
    }

    fn pattern(&mut self, pattern: &Pattern) -> String {
        match pattern {
            Pattern::Identifier { name, .. } => name.clone(),
            Pattern::Member { target, .. } => self.expr(target, PREC_CALL),
            Pattern::Array { elements, rest, .. } => {
                let mut parts: Vec<String> = elements
                    .iter()
                    .map(|element| match element {
                        Some(element) => self.pattern_element(element),
                        None => String::new(),
                    })
                    .collect();
                if let Some(rest) = rest {
                    parts.push(format!("...{}", self.pattern(rest)));
                } else if matches!(elements.last(), Some(None)) {
                    parts.push(String::new());
                }
                format!("[{}]", parts.join(", "))
            }
            Pattern::Object { properties, rest, .. } => {
                let mut parts: Vec<String> = properties
                    .iter()
                    .map(|property| {
                        if property.shorthand {
                            self.pattern_element(&property.value)
                        } else {
                            format!("{}: {}", property_key(&property.key), self.pattern_element(&property.value))
                        }
                    })
                    .collect();
                if let Some(rest) = rest {
                    parts.push(format!("...{}", self.pattern(rest)));
                }
                if parts.is_empty() {
                    "{}".to_string()
                } else {
                    format!("{{ {} }}", parts.join(", "))
                }
            }
        }
    }

    fn pattern_element(&mut self, element: &PatternElement) -> String {
        let target = self.pattern(&element.target);
        match &element.default {
            Some(default) => format!("{} = {}", target, self.expr(default, PREC_ASSIGNMENT)),
            None => target,
        }
    }

    fn elements(&mut self, elements: &[Element]) -> String {
        elements
            .iter()
            .map(|element| match element {
                Element::Expr(expr) => self.expr(expr, PREC_ASSIGNMENT),
                Element::Spread { argument, .. } => format!("...{}", self.expr(argument, PREC_ASSIGNMENT)),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn member_property(&mut self, property: &MemberProperty) -> String {
        match property {
            MemberProperty::Named(name) => format!(".{}", name),
            MemberProperty::Computed(expr) => format!("[{}]", self.expr(expr, PREC_ASSIGNMENT)),
        }
    }

    fn precedence(expr: &Expr) -> u8 {
        match expr {
            Expr::Assign { .. } | Expr::Arrow { .. } => PREC_ASSIGNMENT,
            Expr::Conditional { .. } => PREC_CONDITIONAL,
            Expr::Binary { operator, .. } => operator.precedence(),
            Expr::Logical { operator, .. } => operator.precedence(),
            Expr::Unary { .. } | Expr::Await { .. } => PREC_UNARY,
            Expr::Update { prefix: true, .. } => PREC_UNARY,
            Expr::Update { prefix: false, .. } => PREC_POSTFIX,
            Expr::Call { .. }
            | Expr::New { .. }
            | Expr::Member { .. }
            | Expr::SuperMember { .. }
            | Expr::SuperCall { .. } => PREC_CALL,
            _ => PREC_PRIMARY,
        }
    }

    /// Print `expr`, parenthesized when it binds looser than `min_precedence`.
    fn expr(&mut self, expr: &Expr, min_precedence: u8) -> String {
        let text = ensure_sufficient_stack(|| self.expr_inner(expr));
        if Self::precedence(expr) < min_precedence {
            format!("({})", text)
        } else {
            text
        }
    }

    fn expr_inner(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Literal { value, .. } => match value {
                Literal::Number(n) => number_to_string(*n),
                Literal::String(s) => quote(s),
                Literal::Bool(b) => b.to_string(),
                Literal::Null => "null".to_string(),
            },
            Expr::Identifier { name, .. } => name.clone(),
            Expr::This { .. } => "this".to_string(),
            Expr::Template { elements, .. } => {
                let mut text = String::from("`");
                for element in elements {
                    match element {
                        TemplateElement::Text(raw) => text.push_str(&escape_template(raw)),
                        TemplateElement::Expr(expr) => {
                            text.push_str("${");
                            text.push_str(&self.expr(expr, PREC_ASSIGNMENT));
                            text.push('}');
                        }
                    }
                }
                text.push('`');
                text
            }
            Expr::Array { elements, .. } => {
                let mut parts: Vec<String> = elements
                    .iter()
                    .map(|element| match element {
                        Some(element) => self.elements(std::slice::from_ref(element)),
                        None => String::new(),
                    })
                    .collect();
                if matches!(elements.last(), Some(None)) {
                    parts.push(String::new());
                }
                format!("[{}]", parts.join(", "))
            }
            Expr::Object { properties, .. } => {
                if properties.is_empty() {
                    return "{}".to_string();
                }
                let parts: Vec<String> = properties
                    .iter()
                    .map(|property| match property {
                        Property::Init {
                            key,
                            value,
                            shorthand: true,
                            ..
                        } if matches!(value, Expr::Identifier { name, .. } if name == key) => key.clone(),
                        Property::Init { key, value, .. } => {
                            format!("{}: {}", property_key(key), self.expr(value, PREC_ASSIGNMENT))
                        }
                        Property::Method { function, .. } => {
                            let mut text = String::new();
                            self.method(function, &mut text);
                            text
                        }
                        Property::Spread { argument, .. } => {
                            format!("...{}", self.expr(argument, PREC_ASSIGNMENT))
                        }
                    })
                    .collect();
                format!("{{ {} }}", parts.join(", "))
            }
            Expr::Function { function, .. } => {
                let mut text = String::new();
                self.function(function, &mut text);
                text
            }
            Expr::Arrow { function, .. } => self.arrow(function),
            Expr::Class { class, .. } => {
                let mut text = String::new();
                self.class(class, &mut text);
                text
            }
            Expr::Unary { operator, operand, .. } => {
                let inner = self.expr(operand, PREC_UNARY);
                match operator {
                    UnaryOp::Typeof => format!("typeof {}", inner),
                    UnaryOp::Negate | UnaryOp::Plus => {
                        let symbol = operator.as_str();
                        if inner.starts_with(symbol) {
                            format!("{} {}", symbol, inner)
                        } else {
                            format!("{}{}", symbol, inner)
                        }
                    }
                    UnaryOp::Not => format!("!{}", inner),
                }
            }
            Expr::Update {
                operator,
                prefix,
                target,
                ..
            } => {
                if *prefix {
                    let inner = self.expr(target, PREC_UNARY);
                    format!("{}{}", operator.as_str(), inner)
                } else {
                    let inner = self.expr(target, PREC_CALL);
                    format!("{}{}", inner, operator.as_str())
                }
            }
            Expr::Binary {
                left, operator, right, ..
            } => {
                let precedence = operator.precedence();
                format!(
                    "{} {} {}",
                    self.expr(left, precedence),
                    operator.as_str(),
                    self.expr(right, precedence + 1)
                )
            }
            Expr::Logical {
                left, operator, right, ..
            } => {
                let precedence = operator.precedence();
                format!(
                    "{} {} {}",
                    self.expr(left, precedence),
                    operator.as_str(),
                    self.expr(right, precedence + 1)
                )
            }
            Expr::Conditional {
                condition,
                consequent,
                alternate,
                ..
            } => format!(
                "{} ? {} : {}",
                self.expr(condition, PREC_LOGICAL_OR),
                self.expr(consequent, PREC_ASSIGNMENT),
                self.expr(alternate, PREC_ASSIGNMENT)
            ),
            Expr::Assign {
                operator, target, value, ..
            } => format!(
                "{} {} {}",
                self.pattern(target),
                operator.as_str(),
                self.expr(value, PREC_ASSIGNMENT)
            ),
            Expr::Call { callee, args, .. } => {
                format!("{}({})", self.expr(callee, PREC_CALL), self.elements(args))
            }
            Expr::New { callee, args, .. } => {
                let callee_text = match **callee {
                    Expr::Call { .. } => format!("({})", self.expr_inner(callee)),
                    _ => self.expr(callee, PREC_CALL),
                };
                format!("new {}({})", callee_text, self.elements(args))
            }
            Expr::Member { object, property, .. } => {
                let object_text = match (&**object, property) {
                    (
                        Expr::Literal {
                            value: Literal::Number(_),
                            ..
                        },
                        MemberProperty::Named(_),
                    ) => format!("({})", self.expr_inner(object)),
                    _ => self.expr(object, PREC_CALL),
                };
                format!("{}{}", object_text, self.member_property(property))
            }
            Expr::SuperMember { property, .. } => format!("super{}", self.member_property(property)),
            Expr::SuperCall { args, .. } => format!("super({})", self.elements(args)),
            Expr::Await { argument, .. } => format!("await {}", self.expr(argument, PREC_UNARY)),
        }
    }

    fn arrow(&mut self, function: &FunctionDef) -> String {
        let mut text = String::new();
        if function.is_async {
            text.push_str("async ");
        }
        let simple_param = function.rest.is_none()
            && function.params.len() == 1
            && function.params[0].default.is_none()
            && matches!(function.params[0].target, Pattern::Identifier { .. });
        let params = self.parameters(function);
        if simple_param {
            text.push_str(&params);
        } else {
            text.push('(');
            text.push_str(&params);
            text.push(')');
        }
        text.push_str(" => ");
        match &function.body {
            FunctionBody::Block(statements) => self.block(statements, &mut text),
            FunctionBody::Expression(expr) => {
                let body = self.expr(expr, PREC_ASSIGNMENT);
                if body.starts_with('{') {
                    text.push('(');
                    text.push_str(&body);
                    text.push(')');
                } else {
                    text.push_str(&body);
                }
            }
        }
        text
    }
}

pub(crate) fn is_identifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' || first == '$' => {
            chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    }
}

fn property_key(key: &str) -> String {
    if is_identifier_name(key) {
        key.to_string()
    } else {
        quote(key)
    }
}

pub(crate) fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c if (c as u32) < 0x20 => quoted.push_str(&format!("\\u{:04x}", c as u32)),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

fn escape_template(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '`' => escaped.push_str("\\`"),
            '\\' => escaped.push_str("\\\\"),
            '$' if chars.peek() == Some(&'{') => escaped.push_str("\\$"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Convenience wrapper around [`Printer::print`].
pub fn print(program: &Program) -> String {
    Printer::new().print(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::program_to_json;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    fn normalize(source: &str) -> String {
        print(&parse(tokenize(source).unwrap()).unwrap())
    }

    fn assert_idempotent(source: &str) {
        let once = normalize(source);
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn prints_declarations_and_blocks() {
        assert_eq!(
            normalize("let x=1;if(x){console.log(x)}else{x=2}"),
            "let x = 1;\nif (x) {\n    console.log(x);\n} else {\n    x = 2;\n}\n"
        );
    }

    #[test]
    fn keeps_only_needed_parentheses() {
        assert_eq!(normalize("(a + b) * c;"), "(a + b) * c;\n");
        assert_eq!(normalize("a + (b * c);"), "a + b * c;\n");
        assert_eq!(normalize("a - (b - c);"), "a - (b - c);\n");
        assert_eq!(normalize("(a || b) && c;"), "(a || b) && c;\n");
    }

    #[test]
    fn wraps_object_expression_statements() {
        assert_eq!(normalize("({a} = obj);"), "({ a } = obj);\n");
        assert_eq!(normalize("const f = () => ({ x: 1 });"), "const f = () => ({ x: 1 });\n");
    }

    #[test]
    fn prints_classes_and_functions() {
        let source = "class Dog extends Animal { constructor(n) { super(n); } speak() { return `${this.name} barks`; } }";
        assert_eq!(
            normalize(source),
            "class Dog extends Animal {\n    constructor(n) {\n        super(n);\n    }\n\n    speak() {\n        return `${this.name} barks`;\n    }\n}\n"
        );
    }

    #[test]
    fn strings_are_requoted() {
        assert_eq!(normalize("'it\\'s\\n';"), "\"it's\\n\";\n");
    }

    const SAMPLES: &[&str] = &[
        "function f(a, b = 2, ...rest) { return a + b + rest.length; }",
        "const {x, y: [p, , q = 3], ...others} = point;",
        "for (let i = 0; i < 10; i++) { if (i % 2 === 0) continue; else break; }",
        "for (const [k, v] of pairs) console.log(k, v);",
        "for (const key in obj) {}",
        "const r = a ? b : c ? d : e;",
        "x += -(-y); z = !(a && b); t = typeof x === 'string';",
        "const o = { a, 'b-c': 1, 2: 'two', async m() { await g(); }, ...rest };",
        "new Foo(1).bar(); new (getClass())();",
        "do { n--; } while (n > 0);",
        "if (a) if (b) x(); else y();",
        "const add = async (a, b) => { return a + b; };",
        "let s = `a ${`inner ${x}`} \\${literal}`;",
        "const arr = [, 1, ...xs, ,];",
        "({ a = 5, b: [c = 1] } = obj);",
        "const of = 1; const async = of + 1; for (const x of [async]) {}",
    ];

    #[test]
    fn printing_is_idempotent() {
        for sample in SAMPLES {
            assert_idempotent(sample);
        }
    }

    #[test]
    fn printed_code_parses_to_the_same_tree() {
        for sample in SAMPLES {
            let original = parse(tokenize(sample).unwrap()).unwrap();
            let reparsed = parse(tokenize(&print(&original)).unwrap()).unwrap();
            assert_eq!(
                program_to_json(&original, None),
                program_to_json(&reparsed, None),
                "{}",
                sample
            );
        }
    }

    #[test]
    fn deeply_nested_expression_prints() {
        let source = format!("x = {}1{};", "-(".repeat(2000), ")".repeat(2000));
        let printed = normalize(&source);
        assert!(printed.starts_with("x = - - -"));
        assert!(printed.ends_with("1;\n"));
    }
}
