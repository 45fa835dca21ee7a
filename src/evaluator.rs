use crate::ast::{
    AssignOp, BinaryOp, ClassDef, Element, Expr, ForBinding, ForInit, FunctionBody, FunctionDef,
    FunctionKind, Literal, LogicalOp, MemberProperty, Pattern, Program, Property, Stmt,
    SuperContext, TemplateElement, UnaryOp, UpdateOp, VarKind, VariableDeclarator, var_declared_names,
};
use crate::builtins::{self, array_method, function_method, own_entries, string_method};
use crate::environment::{function_scope, BindingKind, Env, Environment, Lookup};
use crate::error::{JsError, JsResult, Span};
use crate::stack::ensure_sufficient_stack;
use crate::value::{number_to_string, Class, Function, Instance, PlainObject, Value};
use std::cell::RefCell;
use std::io::{self, Write};
use std::ops::ControlFlow;
use std::rc::Rc;

/// Largest length an array may report (2^32 - 1).
const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;

/// Most slots a single array will allocate.
const MAX_DENSE_LENGTH: usize = 1 << 24;

/// How a statement finished. Runtime errors travel separately as `Err`.
#[derive(Debug, Clone)]
pub enum Completion {
    Normal(Value),
    Return(Value),
    Break,
    Continue,
}

/// Result of [`Evaluator::evaluate_program_with`].
#[derive(Debug, Clone)]
pub enum Outcome {
    Completed(Value),
    /// The checkpoint stopped evaluation before statement `next` ran.
    Halted { next: usize },
}

#[derive(Debug, Clone)]
pub struct EvaluatorOptions {
    /// Nested calls allowed before a `RangeError`.
    pub max_call_depth: usize,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        Self { max_call_depth: 512 }
    }
}

/// In-memory output sink that can be read back after evaluation.
#[derive(Debug, Clone, Default)]
pub struct SharedOutput(Rc<RefCell<Vec<u8>>>);

impl SharedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Per-call context needed to resolve `super`.
struct Frame {
    home: Option<Rc<Class>>,
    /// Instance under construction, present while a constructor runs.
    pending_this: Option<Value>,
}

/// How a pattern introduces its names.
#[derive(Debug, Clone, Copy)]
enum BindMode {
    Declare(BindingKind),
    Assign,
}

pub struct Evaluator {
    environment: Env,
    globals: Env,
    frames: Vec<Frame>,
    call_depth: usize,
    options: EvaluatorOptions,
    output: Box<dyn Write>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self::with_options(EvaluatorOptions::default(), Box::new(io::stdout()))
    }

    pub fn with_output(output: Box<dyn Write>) -> Self {
        Self::with_options(EvaluatorOptions::default(), output)
    }

    pub fn with_options(options: EvaluatorOptions, output: Box<dyn Write>) -> Self {
        let builtins = Environment::new_global();
        if let Err(error) = builtins::install_globals(&builtins) {
            tracing::error!(%error, "failed to install globals");
        }
        // Scripts get their own top-level scope so they may shadow builtins.
        let globals = Environment::new_function(&builtins);
        Self {
            environment: globals.clone(),
            globals,
            frames: Vec::new(),
            call_depth: 0,
            options,
            output,
        }
    }

    /// Top-level scope that script declarations land in.
    pub fn global_environment(&self) -> Env {
        self.globals.clone()
    }

    pub fn evaluate_program(&mut self, program: &Program) -> JsResult<Value> {
        match self.evaluate_program_with(program, |_| ControlFlow::Continue(()))? {
            Outcome::Completed(value) => Ok(value),
            Outcome::Halted { .. } => Ok(Value::Undefined),
        }
    }

    /// Evaluate `program`, consulting `checkpoint` before each top-level
    /// statement. The value of the last expression statement is returned.
    #[tracing::instrument(level = "debug", skip_all, fields(statements = program.statements.len()))]
    pub fn evaluate_program_with(
        &mut self,
        program: &Program,
        mut checkpoint: impl FnMut(usize) -> ControlFlow<()>,
    ) -> JsResult<Outcome> {
        self.environment = self.globals.clone();
        self.frames.clear();
        self.call_depth = 0;

        let globals = self.globals.clone();
        self.hoist_vars(&program.statements, &globals)?;
        self.hoist_functions(&program.statements)?;

        let mut last = Value::Undefined;
        for (index, stmt) in program.statements.iter().enumerate() {
            if checkpoint(index).is_break() {
                tracing::debug!(next = index, "halted at checkpoint");
                return Ok(Outcome::Halted { next: index });
            }
            if let Completion::Normal(value) = self.execute_statement(stmt)? {
                if matches!(stmt, Stmt::Expression { .. }) {
                    last = value;
                }
            }
        }
        Ok(Outcome::Completed(last))
    }

    /// Write one line to the configured output and flush it.
    pub fn write_line(&mut self, line: &str, span: Span) -> JsResult<()> {
        writeln!(self.output, "{}", line)
            .and_then(|()| self.output.flush())
            .map_err(|error| JsError::io_error(span, error))
    }

    fn with_environment<T>(&mut self, env: Env, body: impl FnOnce(&mut Self) -> JsResult<T>) -> JsResult<T> {
        let previous = std::mem::replace(&mut self.environment, env);
        let result = body(self);
        self.environment = previous;
        result
    }

    fn current_home(&self) -> Option<Rc<Class>> {
        self.frames.last().and_then(|frame| frame.home.clone())
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    /// Declare every `var` name in `statements` (outside nested functions)
    /// as undefined in `env`.
    fn hoist_vars(&mut self, statements: &[Stmt], env: &Env) -> JsResult<()> {
        let names = var_declared_names(statements);
        let owner = function_scope(env);
        let mut scope = owner.borrow_mut();
        for (name, span) in names {
            scope.declare(name, BindingKind::Var, Value::Undefined, span)?;
        }
        Ok(())
    }

    /// Bind the function declarations of a block before it runs.
    fn hoist_functions(&mut self, statements: &[Stmt]) -> JsResult<()> {
        for stmt in statements {
            if let Stmt::FunctionDeclaration { function, span } = stmt {
                let name = function.name.clone().unwrap_or_default();
                let value = self.make_function(function, None);
                self.environment
                    .borrow_mut()
                    .declare(&name, BindingKind::Function, value, *span)?;
            }
        }
        Ok(())
    }

    fn make_function(&self, def: &Rc<FunctionDef>, inferred_name: Option<&str>) -> Value {
        let name = def
            .name
            .clone()
            .or_else(|| inferred_name.map(str::to_string))
            .unwrap_or_default();
        let home = if def.kind == FunctionKind::Arrow {
            self.current_home()
        } else {
            None
        };
        Value::Function(Rc::new(Function {
            name,
            def: def.clone(),
            env: self.environment.clone(),
            home,
            bound_this: None,
        }))
    }

    fn create_class(&mut self, def: &Rc<ClassDef>, inferred_name: Option<&str>) -> JsResult<Rc<Class>> {
        let parent = match &def.superclass {
            Some(expr) => match self.evaluate_expression(expr)? {
                Value::Class(parent) => Some(parent),
                other => {
                    return Err(JsError::type_error(
                        expr.span(),
                        format!("Class extends value {} is not a constructor", other.repr()),
                    ))
                }
            },
            None => None,
        };
        let name = def
            .name
            .clone()
            .or_else(|| inferred_name.map(str::to_string))
            .unwrap_or_default();
        tracing::debug!(class = %name, derived = parent.is_some(), "define class");
        Ok(Rc::new(Class::new(name, def.clone(), parent, self.environment.clone())))
    }

    fn declare_variables(&mut self, kind: VarKind, declarations: &[VariableDeclarator]) -> JsResult<()> {
        for declarator in declarations {
            let value = match &declarator.init {
                Some(init) => self.evaluate_named(init, pattern_name(&declarator.target))?,
                // `var x;` leaves the hoisted binding alone.
                None if kind == VarKind::Var => continue,
                None => Value::Undefined,
            };
            self.bind_pattern(&declarator.target, value, declaration_mode(kind))?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn execute_statement(&mut self, stmt: &Stmt) -> JsResult<Completion> {
        ensure_sufficient_stack(|| self.execute_statement_inner(stmt))
    }

    fn execute_statement_inner(&mut self, stmt: &Stmt) -> JsResult<Completion> {
        match stmt {
            Stmt::Expression { expr, .. } => Ok(Completion::Normal(self.evaluate_expression(expr)?)),
            Stmt::VariableDeclaration { kind, declarations, .. } => {
                self.declare_variables(*kind, declarations)?;
                Ok(Completion::Normal(Value::Undefined))
            }
            Stmt::FunctionDeclaration { .. } => Ok(Completion::Normal(Value::Undefined)),
            Stmt::ClassDeclaration { class, span } => {
                let value = Value::Class(self.create_class(class, None)?);
                let name = class.name.clone().unwrap_or_default();
                self.environment
                    .borrow_mut()
                    .declare(&name, BindingKind::Class, value, *span)?;
                Ok(Completion::Normal(Value::Undefined))
            }
            Stmt::Block { statements, .. } => {
                let env = Environment::new_enclosed(&self.environment);
                self.with_environment(env, |evaluator| evaluator.execute_block(statements))
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                if self.evaluate_expression(condition)?.is_truthy() {
                    self.execute_statement(then_branch)
                } else if let Some(else_stmt) = else_branch {
                    self.execute_statement(else_stmt)
                } else {
                    Ok(Completion::Normal(Value::Undefined))
                }
            }
            Stmt::While { condition, body, .. } => {
                while self.evaluate_expression(condition)?.is_truthy() {
                    match self.execute_statement(body)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Continue | Completion::Normal(_) => {}
                    }
                }
                Ok(Completion::Normal(Value::Undefined))
            }
            Stmt::DoWhile { body, condition, .. } => {
                loop {
                    match self.execute_statement(body)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Continue | Completion::Normal(_) => {}
                    }
                    if !self.evaluate_expression(condition)?.is_truthy() {
                        break;
                    }
                }
                Ok(Completion::Normal(Value::Undefined))
            }
            Stmt::For {
                init,
                condition,
                update,
                body,
                ..
            } => self.execute_for(init.as_ref(), condition.as_ref(), update.as_ref(), body),
            Stmt::ForOf { left, right, body, .. } => {
                let iterable = self.evaluate_expression(right)?;
                let items = iterate(&iterable, right.span())?;
                self.execute_for_each(left, items, body)
            }
            Stmt::ForIn { left, right, body, .. } => {
                let object = self.evaluate_expression(right)?;
                let keys = if object.is_nullish() {
                    Vec::new()
                } else {
                    own_entries(&object, right.span())?
                        .into_iter()
                        .map(|(key, _)| Value::String(key))
                        .collect()
                };
                self.execute_for_each(left, LiveItems::Fixed(keys), body)
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate_expression(expr)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }
            Stmt::Break { .. } => Ok(Completion::Break),
            Stmt::Continue { .. } => Ok(Completion::Continue),
            Stmt::Empty { .. } => Ok(Completion::Normal(Value::Undefined)),
        }
    }

    /// Run statements in the current scope after hoisting their functions.
    fn execute_block(&mut self, statements: &[Stmt]) -> JsResult<Completion> {
        self.hoist_functions(statements)?;
        let mut last = Completion::Normal(Value::Undefined);
        for stmt in statements {
            match self.execute_statement(stmt)? {
                normal @ Completion::Normal(_) => last = normal,
                other => return Ok(other),
            }
        }
        Ok(last)
    }

    fn execute_for(
        &mut self,
        init: Option<&ForInit>,
        condition: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
    ) -> JsResult<Completion> {
        let outer = self.environment.clone();
        let loop_env = Environment::new_enclosed(&outer);

        // `let` and `const` loop variables get a fresh copy per iteration.
        let mut per_iteration: Vec<(String, BindingKind)> = Vec::new();
        if let Some(init) = init {
            self.with_environment(loop_env.clone(), |evaluator| match init {
                ForInit::Declaration { kind, declarations } => {
                    if *kind != VarKind::Var {
                        for declarator in declarations {
                            for name in declarator.target.bound_names() {
                                per_iteration.push((name.to_string(), declaration_kind(*kind)));
                            }
                        }
                    }
                    evaluator.declare_variables(*kind, declarations)
                }
                ForInit::Expression(expr) => evaluator.evaluate_expression(expr).map(|_| ()),
            })?;
        }

        let mut current = copy_bindings(&outer, &loop_env, &per_iteration)?;
        loop {
            let keep_going = self.with_environment(current.clone(), |evaluator| match condition {
                Some(condition) => Ok(evaluator.evaluate_expression(condition)?.is_truthy()),
                None => Ok(true),
            })?;
            if !keep_going {
                break;
            }

            match self.with_environment(current.clone(), |evaluator| evaluator.execute_statement(body))? {
                Completion::Break => break,
                Completion::Return(value) => return Ok(Completion::Return(value)),
                Completion::Continue | Completion::Normal(_) => {}
            }

            current = copy_bindings(&outer, &current, &per_iteration)?;
            if let Some(update) = update {
                self.with_environment(current.clone(), |evaluator| evaluator.evaluate_expression(update))?;
            }
        }
        Ok(Completion::Normal(Value::Undefined))
    }

    fn execute_for_each(&mut self, left: &ForBinding, items: LiveItems, body: &Stmt) -> JsResult<Completion> {
        let mut index = 0;
        while let Some(item) = items.get(index) {
            index += 1;
            let env = Environment::new_enclosed(&self.environment);
            let completion = self.with_environment(env, |evaluator| {
                match left {
                    ForBinding::Declaration { kind, target } => {
                        evaluator.bind_pattern(target, item, declaration_mode(*kind))?
                    }
                    ForBinding::Target(target) => evaluator.bind_pattern(target, item, BindMode::Assign)?,
                }
                evaluator.execute_statement(body)
            })?;
            match completion {
                Completion::Break => break,
                Completion::Return(value) => return Ok(Completion::Return(value)),
                Completion::Continue | Completion::Normal(_) => {}
            }
        }
        Ok(Completion::Normal(Value::Undefined))
    }

    // ------------------------------------------------------------------
    // Patterns
    // ------------------------------------------------------------------

    fn bind_pattern(&mut self, pattern: &Pattern, value: Value, mode: BindMode) -> JsResult<()> {
        ensure_sufficient_stack(|| self.bind_pattern_inner(pattern, value, mode))
    }

    fn bind_pattern_inner(&mut self, pattern: &Pattern, value: Value, mode: BindMode) -> JsResult<()> {
        match pattern {
            Pattern::Identifier { name, span } => match mode {
                BindMode::Declare(kind) => self.environment.borrow_mut().declare(name, kind, value, *span),
                BindMode::Assign => self.environment.borrow_mut().assign(name, value, *span),
            },
            Pattern::Member { target, span } => match &**target {
                Expr::Member { object, property, .. } => {
                    let object = self.evaluate_expression(object)?;
                    let key = self.member_key(property)?;
                    self.set_property(&object, &key, value, *span)
                }
                other => Err(JsError::type_error(other.span(), "Invalid assignment target")),
            },
            Pattern::Array { elements, rest, span } => {
                let items = iterate(&value, *span)?;
                for (index, element) in elements.iter().enumerate() {
                    let Some(element) = element else { continue };
                    let mut item = items.get(index).unwrap_or(Value::Undefined);
                    if let (Value::Undefined, Some(default)) = (&item, &element.default) {
                        item = self.evaluate_named(default, pattern_name(&element.target))?;
                    }
                    self.bind_pattern(&element.target, item, mode)?;
                }
                if let Some(rest) = rest {
                    let remaining = items.collect_from(elements.len());
                    self.bind_pattern(rest, Value::array(remaining), mode)?;
                }
                Ok(())
            }
            Pattern::Object { properties, rest, span } => {
                if value.is_nullish() {
                    return Err(JsError::type_error(
                        *span,
                        format!("Cannot destructure '{}' as it is {}.", value, value),
                    ));
                }
                for property in properties {
                    let mut item = self.get_property(&value, &property.key, property.span)?;
                    if let (Value::Undefined, Some(default)) = (&item, &property.value.default) {
                        item = self.evaluate_named(default, pattern_name(&property.value.target))?;
                    }
                    self.bind_pattern(&property.value.target, item, mode)?;
                }
                if let Some(rest) = rest {
                    let remaining: PlainObject = own_entries(&value, *span)?
                        .into_iter()
                        .filter(|(key, _)| !properties.iter().any(|property| &property.key == key))
                        .collect();
                    self.bind_pattern(rest, Value::object(remaining), mode)?;
                }
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Evaluate `expr`, naming anonymous functions and classes after the
    /// binding they initialize.
    fn evaluate_named(&mut self, expr: &Expr, name: Option<&str>) -> JsResult<Value> {
        match expr {
            Expr::Function { function, .. } | Expr::Arrow { function, .. } if function.name.is_none() => {
                Ok(self.make_function(function, name))
            }
            Expr::Class { class, .. } if class.name.is_none() => Ok(Value::Class(self.create_class(class, name)?)),
            _ => self.evaluate_expression(expr),
        }
    }

    pub fn evaluate_expression(&mut self, expr: &Expr) -> JsResult<Value> {
        ensure_sufficient_stack(|| self.evaluate_expression_inner(expr))
    }

    fn evaluate_expression_inner(&mut self, expr: &Expr) -> JsResult<Value> {
        match expr {
            Expr::Literal { value, .. } => Ok(match value {
                Literal::Number(n) => Value::Number(*n),
                Literal::String(s) => Value::String(s.clone()),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Null => Value::Null,
            }),
            Expr::Identifier { name, span } => self.environment.borrow().get(name, *span),
            Expr::Template { elements, .. } => {
                let mut text = String::new();
                for element in elements {
                    match element {
                        TemplateElement::Text(raw) => text.push_str(raw),
                        TemplateElement::Expr(expr) => text.push_str(&self.evaluate_expression(expr)?.to_string()),
                    }
                }
                Ok(Value::String(text))
            }
            Expr::Array { elements, .. } => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    match element {
                        None => items.push(Value::Undefined),
                        Some(element) => self.push_element(element, &mut items)?,
                    }
                }
                Ok(Value::array(items))
            }
            Expr::Object { properties, .. } => {
                let mut object = PlainObject::new();
                for property in properties {
                    match property {
                        Property::Init { key, value, .. } => {
                            let value = self.evaluate_named(value, Some(key.as_str()))?;
                            object.set(key.clone(), value);
                        }
                        Property::Method { key, function, .. } => {
                            object.set(key.clone(), self.make_function(function, Some(key.as_str())));
                        }
                        Property::Spread { argument, span } => {
                            let source = self.evaluate_expression(argument)?;
                            if !source.is_nullish() {
                                for (key, value) in own_entries(&source, *span)? {
                                    object.set(key, value);
                                }
                            }
                        }
                    }
                }
                Ok(Value::object(object))
            }
            Expr::Function { function, .. } => {
                let Some(name) = &function.name else {
                    return Ok(self.make_function(function, None));
                };
                // A named function expression can refer to itself.
                let env = Environment::new_enclosed(&self.environment);
                let value = self.with_environment(env.clone(), |evaluator| Ok(evaluator.make_function(function, None)))?;
                env.borrow_mut()
                    .declare(name, BindingKind::Function, value.clone(), function.span)?;
                Ok(value)
            }
            Expr::Arrow { function, .. } => Ok(self.make_function(function, None)),
            Expr::Class { class, .. } => Ok(Value::Class(self.create_class(class, None)?)),
            Expr::Unary { operator, operand, span } => self.evaluate_unary(*operator, operand, *span),
            Expr::Update {
                operator,
                prefix,
                target,
                span,
            } => self.evaluate_update(*operator, *prefix, target, *span),
            Expr::Binary {
                left,
                operator,
                right,
                span,
            } => {
                let left = self.evaluate_expression(left)?;
                let right = self.evaluate_expression(right)?;
                binary_op(*operator, &left, &right, *span)
            }
            Expr::Logical {
                left,
                operator,
                right,
                ..
            } => {
                let left = self.evaluate_expression(left)?;
                match operator {
                    LogicalOp::Or if left.is_truthy() => Ok(left),
                    LogicalOp::And if !left.is_truthy() => Ok(left),
                    _ => self.evaluate_expression(right),
                }
            }
            Expr::Conditional {
                condition,
                consequent,
                alternate,
                ..
            } => {
                if self.evaluate_expression(condition)?.is_truthy() {
                    self.evaluate_expression(consequent)
                } else {
                    self.evaluate_expression(alternate)
                }
            }
            Expr::Assign {
                operator,
                target,
                value,
                span,
            } => self.evaluate_assignment(*operator, target, value, *span),
            Expr::Call { callee, args, span } => self.evaluate_call(callee, args, *span),
            Expr::New { callee, args, span } => {
                let constructor = self.evaluate_expression(callee)?;
                if !is_constructor(&constructor) {
                    return Err(JsError::type_error(*span, format!("{} is not a constructor", describe(callee)))
                        .with_help(format!("The callee evaluated to {}.", constructor.repr())));
                }
                let args = self.evaluate_arguments(args)?;
                self.construct(&constructor, args, *span)
            }
            Expr::Member { object, property, span } => {
                let object_value = self.evaluate_expression(object)?;
                let key = self.member_key(property)?;
                if object_value.is_nullish() {
                    return Err(JsError::type_error(
                        *span,
                        format!("Cannot read properties of {} (reading '{}')", object_value, key),
                    )
                    .with_help(format!("'{}' is {}.", describe(object), object_value)));
                }
                self.get_property(&object_value, &key, *span)
            }
            Expr::This { span } => self.this_value(*span),
            Expr::SuperMember {
                property,
                context,
                span,
            } => {
                let parent = self.super_parent(*context, *span)?;
                let key = self.member_key(property)?;
                Ok(parent.method_value(&key).unwrap_or(Value::Undefined))
            }
            Expr::SuperCall { args, context, span } => self.evaluate_super_call(args, *context, *span),
            Expr::Await { argument, .. } => {
                let value = self.evaluate_expression(argument)?;
                tracing::debug!("await resolved synchronously");
                Ok(value)
            }
        }
    }

    fn push_element(&mut self, element: &Element, items: &mut Vec<Value>) -> JsResult<()> {
        match element {
            Element::Expr(expr) => items.push(self.evaluate_expression(expr)?),
            Element::Spread { argument, span } => {
                let value = self.evaluate_expression(argument)?;
                let spread = iterate(&value, *span)?;
                items.extend(spread.collect_from(0));
            }
        }
        Ok(())
    }

    fn evaluate_arguments(&mut self, args: &[Element]) -> JsResult<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            self.push_element(arg, &mut values)?;
        }
        Ok(values)
    }

    fn member_key(&mut self, property: &MemberProperty) -> JsResult<String> {
        match property {
            MemberProperty::Named(name) => Ok(name.clone()),
            MemberProperty::Computed(expr) => Ok(property_key(&self.evaluate_expression(expr)?)),
        }
    }

    fn this_value(&self, span: Span) -> JsResult<Value> {
        match self.environment.borrow().lookup("this") {
            Lookup::Found(value) => Ok(value),
            Lookup::Uninitialized => Err(JsError::super_misuse(
                span,
                "Must call super constructor in derived class before accessing 'this'",
            )
            .with_help("Call super(...) at the start of the constructor.")),
            Lookup::Missing => Ok(Value::Undefined),
        }
    }

    fn super_parent(&self, context: SuperContext, span: Span) -> JsResult<Rc<Class>> {
        if context == SuperContext::Outside {
            return Err(JsError::super_misuse(span, "'super' keyword unexpected here")
                .with_help("'super' is only valid inside class methods and constructors."));
        }
        let home = self
            .current_home()
            .ok_or_else(|| JsError::super_misuse(span, "'super' keyword unexpected here"))?;
        home.parent.clone().ok_or_else(|| {
            JsError::super_misuse(
                span,
                format!("'super' used in class '{}' which does not extend another class", home.name),
            )
        })
    }

    fn evaluate_super_call(&mut self, args: &[Element], context: SuperContext, span: Span) -> JsResult<Value> {
        if context != SuperContext::Constructor {
            return Err(JsError::super_misuse(span, "'super' keyword unexpected here")
                .with_help("super(...) may only be called inside a derived class constructor."));
        }
        let parent = self.super_parent(context, span)?;
        let instance = self
            .frames
            .last()
            .and_then(|frame| frame.pending_this.clone())
            .ok_or_else(|| JsError::super_misuse(span, "'super' keyword unexpected here"))?;
        if matches!(self.environment.borrow().lookup("this"), Lookup::Found(_)) {
            return Err(JsError::super_misuse(span, "Super constructor may only be called once"));
        }

        let args = self.evaluate_arguments(args)?;
        self.enter_call(span)?;
        let result = self.run_constructor(&parent, instance.clone(), args, span);
        self.call_depth -= 1;
        result?;

        self.environment.borrow_mut().initialize("this", instance);
        Ok(Value::Undefined)
    }

    fn evaluate_unary(&mut self, operator: UnaryOp, operand: &Expr, span: Span) -> JsResult<Value> {
        if operator == UnaryOp::Typeof {
            if let Expr::Identifier { name, .. } = operand {
                if let Lookup::Missing = self.environment.borrow().lookup(name) {
                    return Ok(Value::from("undefined"));
                }
            }
            let value = self.evaluate_expression(operand)?;
            return Ok(Value::from(value.type_name()));
        }

        let value = self.evaluate_expression(operand)?;
        match operator {
            UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
            UnaryOp::Negate => Ok(Value::Number(-to_numeric(&value, operator.as_str(), span)?)),
            UnaryOp::Plus => Ok(Value::Number(to_numeric(&value, operator.as_str(), span)?)),
            UnaryOp::Typeof => Ok(Value::from(value.type_name())),
        }
    }

    fn evaluate_update(&mut self, operator: UpdateOp, prefix: bool, target: &Expr, span: Span) -> JsResult<Value> {
        let delta = match operator {
            UpdateOp::Increment => 1.0,
            UpdateOp::Decrement => -1.0,
        };
        match target {
            Expr::Identifier { name, span: name_span } => {
                let old = self.environment.borrow().get(name, *name_span)?;
                let old = to_numeric(&old, operator.as_str(), span)?;
                let new = old + delta;
                self.environment
                    .borrow_mut()
                    .assign(name, Value::Number(new), *name_span)?;
                Ok(Value::Number(if prefix { new } else { old }))
            }
            Expr::Member { object, property, .. } => {
                let object = self.evaluate_expression(object)?;
                let key = self.member_key(property)?;
                let old = self.get_property(&object, &key, span)?;
                let old = to_numeric(&old, operator.as_str(), span)?;
                let new = old + delta;
                self.set_property(&object, &key, Value::Number(new), span)?;
                Ok(Value::Number(if prefix { new } else { old }))
            }
            other => Err(JsError::type_error(
                other.span(),
                "Invalid left-hand side expression in update operation",
            )),
        }
    }

    fn evaluate_assignment(&mut self, operator: AssignOp, target: &Pattern, value: &Expr, span: Span) -> JsResult<Value> {
        let Some(binary) = operator.binary() else {
            return match target {
                // Object and key are evaluated before the right-hand side.
                Pattern::Member { target: member, .. } => match &**member {
                    Expr::Member { object, property, .. } => {
                        let object = self.evaluate_expression(object)?;
                        let key = self.member_key(property)?;
                        let value = self.evaluate_expression(value)?;
                        self.set_property(&object, &key, value.clone(), span)?;
                        Ok(value)
                    }
                    other => Err(JsError::type_error(other.span(), "Invalid assignment target")),
                },
                _ => {
                    let value = self.evaluate_named(value, pattern_name(target))?;
                    self.bind_pattern(target, value.clone(), BindMode::Assign)?;
                    Ok(value)
                }
            };
        };

        match target {
            Pattern::Identifier { name, span: name_span } => {
                let current = self.environment.borrow().get(name, *name_span)?;
                let right = self.evaluate_expression(value)?;
                let result = binary_op(binary, &current, &right, span)?;
                self.environment
                    .borrow_mut()
                    .assign(name, result.clone(), *name_span)?;
                Ok(result)
            }
            Pattern::Member { target: member, .. } => match &**member {
                Expr::Member { object, property, .. } => {
                    let object = self.evaluate_expression(object)?;
                    let key = self.member_key(property)?;
                    let current = self.get_property(&object, &key, span)?;
                    let right = self.evaluate_expression(value)?;
                    let result = binary_op(binary, &current, &right, span)?;
                    self.set_property(&object, &key, result.clone(), span)?;
                    Ok(result)
                }
                other => Err(JsError::type_error(other.span(), "Invalid assignment target")),
            },
            other => Err(JsError::type_error(
                other.span(),
                format!("Invalid left-hand side in '{}' assignment", operator.as_str()),
            )),
        }
    }

    fn evaluate_call(&mut self, callee: &Expr, args: &[Element], span: Span) -> JsResult<Value> {
        let (function, this) = match callee {
            Expr::Member { object, property, span: member_span } => {
                let receiver = self.evaluate_expression(object)?;
                let key = self.member_key(property)?;
                if receiver.is_nullish() {
                    return Err(JsError::type_error(
                        *member_span,
                        format!("Cannot read properties of {} (reading '{}')", receiver, key),
                    )
                    .with_help(format!("'{}' is {}.", describe(object), receiver)));
                }
                let function = self.get_property(&receiver, &key, *member_span)?;
                (function, receiver)
            }
            Expr::SuperMember { span, .. } => {
                let function = self.evaluate_expression(callee)?;
                let this = self.this_value(*span)?;
                (function, this)
            }
            _ => (self.evaluate_expression(callee)?, Value::Undefined),
        };

        if !function.is_callable() {
            return Err(JsError::type_error(span, format!("{} is not a function", describe(callee)))
                .with_help(format!("The callee evaluated to {}.", function.repr())));
        }

        let args = self.evaluate_arguments(args)?;
        self.call_value(&function, this, args, span)
    }

    /// Call any callable value with an explicit receiver.
    pub fn call_value(&mut self, callee: &Value, this: Value, args: Vec<Value>, span: Span) -> JsResult<Value> {
        match callee {
            Value::Function(function) => {
                self.enter_call(span)?;
                let result = self.call_function(function, this, args);
                self.call_depth -= 1;
                result
            }
            Value::Native(native) => {
                let receiver = native.receiver.clone().unwrap_or(this);
                builtins::call_builtin(self, native.builtin, receiver, args, span)
            }
            Value::Class(class) => Err(JsError::type_error(
                span,
                format!("Class constructor {} cannot be invoked without 'new'", class.name),
            )),
            other => Err(JsError::type_error(span, format!("{} is not a function", other.repr()))),
        }
    }

    fn enter_call(&mut self, span: Span) -> JsResult<()> {
        if self.call_depth >= self.options.max_call_depth {
            return Err(JsError::range_error(span, "Maximum call stack size exceeded")
                .with_help(format!("Calls nest deeper than {} frames; check for unbounded recursion.", self.options.max_call_depth)));
        }
        self.call_depth += 1;
        Ok(())
    }

    fn call_function(&mut self, function: &Function, this: Value, args: Vec<Value>) -> JsResult<Value> {
        ensure_sufficient_stack(|| self.call_function_inner(function, this, args))
    }

    fn call_function_inner(&mut self, function: &Function, this: Value, args: Vec<Value>) -> JsResult<Value> {
        if function.def.is_async {
            tracing::debug!(function = function.name(), "async function runs synchronously");
        }
        let env = Environment::new_function(&function.env);
        let pending_this = if function.def.kind == FunctionKind::Arrow {
            self.frames.last().and_then(|frame| frame.pending_this.clone())
        } else {
            let this = function.bound_this.clone().unwrap_or(this);
            env.borrow_mut()
                .declare("this", BindingKind::This, this, function.def.span)?;
            None
        };
        self.run_function(function, env, args, pending_this)
    }

    /// Bind parameters in `env` and run the body with a fresh frame.
    fn run_function(&mut self, function: &Function, env: Env, args: Vec<Value>, pending_this: Option<Value>) -> JsResult<Value> {
        tracing::trace!(function = function.name(), args = args.len(), depth = self.call_depth, "call");
        self.frames.push(Frame {
            home: function.home.clone(),
            pending_this,
        });
        let def = function.def.clone();
        let result = self.with_environment(env.clone(), |evaluator| {
            let mut args = args.into_iter();
            for param in &def.params {
                let mut value = args.next().unwrap_or(Value::Undefined);
                if let (Value::Undefined, Some(default)) = (&value, &param.default) {
                    value = evaluator.evaluate_named(default, pattern_name(&param.target))?;
                }
                evaluator.bind_pattern(&param.target, value, BindMode::Declare(BindingKind::Param))?;
            }
            if let Some(rest) = &def.rest {
                evaluator.bind_pattern(rest, Value::array(args.collect()), BindMode::Declare(BindingKind::Param))?;
            }

            match &def.body {
                FunctionBody::Expression(expr) => evaluator.evaluate_expression(expr),
                FunctionBody::Block(statements) => {
                    evaluator.hoist_vars(statements, &env)?;
                    match evaluator.execute_block(statements)? {
                        Completion::Return(value) => Ok(value),
                        _ => Ok(Value::Undefined),
                    }
                }
            }
        });
        self.frames.pop();
        result
    }

    /// `new callee(...args)`
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn construct(&mut self, callee: &Value, args: Vec<Value>, span: Span) -> JsResult<Value> {
        match callee {
            Value::Class(class) => {
                let instance = Value::Instance(Rc::new(Instance::new(class.clone())));
                self.enter_call(span)?;
                let result = self.run_constructor(class, instance.clone(), args, span);
                self.call_depth -= 1;
                result?;
                Ok(instance)
            }
            Value::Function(function) if function.def.kind == FunctionKind::Normal => {
                let object = Value::object(PlainObject::new());
                let result = self.call_value(callee, object.clone(), args, span)?;
                if result.is_primitive() {
                    Ok(object)
                } else {
                    Ok(result)
                }
            }
            other => Err(JsError::type_error(span, format!("{} is not a constructor", other.repr()))),
        }
    }

    /// Run `class`'s constructor chain against an already allocated instance.
    fn run_constructor(&mut self, class: &Rc<Class>, instance: Value, args: Vec<Value>, span: Span) -> JsResult<()> {
        let Some(constructor) = &class.def.constructor else {
            // Implicit constructor forwards its arguments to the parent.
            return match &class.parent {
                Some(parent) => self.run_constructor(parent, instance, args, span),
                None => Ok(()),
            };
        };

        let function = Function {
            name: class.name.clone(),
            def: constructor.clone(),
            env: class.env.clone(),
            home: Some(class.clone()),
            bound_this: None,
        };
        let env = Environment::new_function(&class.env);
        if class.is_derived() {
            env.borrow_mut().declare_uninitialized("this", BindingKind::This);
        } else {
            env.borrow_mut()
                .declare("this", BindingKind::This, instance.clone(), span)?;
        }

        self.run_function(&function, env.clone(), args, Some(instance))?;

        if let Lookup::Uninitialized = env.borrow().lookup("this") {
            return Err(JsError::super_misuse(
                constructor.span,
                format!("Must call super constructor in derived class '{}' before returning", class.name),
            )
            .with_help("Derived constructors must call super(...) before they finish."));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    pub fn get_property(&self, object: &Value, key: &str, span: Span) -> JsResult<Value> {
        let value = match object {
            Value::Undefined | Value::Null => {
                return Err(JsError::type_error(
                    span,
                    format!("Cannot read properties of {} (reading '{}')", object, key),
                ))
            }
            Value::Object(properties) => properties.borrow().get(key).cloned(),
            Value::Instance(instance) => instance.get(key),
            Value::Array(items) => {
                if key == "length" {
                    Some(Value::Number(items.borrow().len() as f64))
                } else if let Some(index) = array_index(key) {
                    items.borrow().get(index).cloned()
                } else {
                    array_method(key).map(|builtin| Value::native(builtin, Some(object.clone())))
                }
            }
            Value::String(s) => {
                if key == "length" {
                    Some(Value::Number(s.chars().count() as f64))
                } else if let Some(index) = array_index(key) {
                    s.chars().nth(index).map(|c| Value::String(c.to_string()))
                } else {
                    string_method(key).map(|builtin| Value::native(builtin, Some(object.clone())))
                }
            }
            Value::Function(function) => match key {
                "name" => Some(Value::from(function.name())),
                "length" => Some(Value::Number(function.def.params.len() as f64)),
                _ => function_method(key).map(|builtin| Value::native(builtin, Some(object.clone()))),
            },
            Value::Class(class) => match key {
                "name" => Some(Value::from(class.name.as_str())),
                _ => None,
            },
            Value::Native(native) => match key {
                "name" => Some(Value::from(native.builtin.name())),
                _ => None,
            },
            Value::Bool(_) | Value::Number(_) => None,
        };
        Ok(value.unwrap_or(Value::Undefined))
    }

    pub fn set_property(&self, object: &Value, key: &str, value: Value, span: Span) -> JsResult<()> {
        match object {
            Value::Object(properties) => {
                properties.borrow_mut().set(key, value);
                Ok(())
            }
            Value::Instance(instance) => {
                instance.fields.borrow_mut().set(key, value);
                Ok(())
            }
            Value::Array(items) => {
                let mut items = items.borrow_mut();
                if key == "length" {
                    let length = value.to_number().unwrap_or(f64::NAN);
                    if length < 0.0 || length.fract() != 0.0 || length.is_nan() || length > MAX_ARRAY_LENGTH as f64 {
                        return Err(JsError::range_error(span, "Invalid array length"));
                    }
                    return resize_array(&mut items, length as usize, span);
                }
                match array_index(key) {
                    Some(index) => {
                        if index >= items.len() {
                            resize_array(&mut items, index.saturating_add(1), span)?;
                        }
                        items[index] = value;
                        Ok(())
                    }
                    None => Err(JsError::type_error(
                        span,
                        format!("Cannot create property '{}' on array", key),
                    )),
                }
            }
            Value::Undefined | Value::Null => Err(JsError::type_error(
                span,
                format!("Cannot set properties of {} (setting '{}')", object, key),
            )),
            other => Err(JsError::type_error(
                span,
                format!("Cannot create property '{}' on {} '{}'", key, other.type_name(), other),
            )),
        }
    }
}

/// Values a `for-of` loop or spread walks. Arrays are read live so that
/// pushes during iteration are seen.
enum LiveItems {
    Array(Rc<RefCell<Vec<Value>>>),
    Fixed(Vec<Value>),
}

impl LiveItems {
    fn get(&self, index: usize) -> Option<Value> {
        match self {
            LiveItems::Array(items) => items.borrow().get(index).cloned(),
            LiveItems::Fixed(items) => items.get(index).cloned(),
        }
    }

    fn collect_from(&self, start: usize) -> Vec<Value> {
        match self {
            LiveItems::Array(items) => items.borrow().iter().skip(start).cloned().collect(),
            LiveItems::Fixed(items) => items.iter().skip(start).cloned().collect(),
        }
    }
}

fn iterate(value: &Value, span: Span) -> JsResult<LiveItems> {
    match value {
        Value::Array(items) => Ok(LiveItems::Array(items.clone())),
        Value::String(s) => Ok(LiveItems::Fixed(s.chars().map(|c| Value::String(c.to_string())).collect())),
        other => Err(JsError::type_error(span, format!("{} is not iterable", other.repr()))
            .with_help("Only arrays and strings can be iterated with for-of, spread, or array patterns.")),
    }
}

/// Fresh scope under `outer` holding copies of `names` from `from`.
fn copy_bindings(outer: &Env, from: &Env, names: &[(String, BindingKind)]) -> JsResult<Env> {
    if names.is_empty() {
        return Ok(from.clone());
    }
    let next = Environment::new_enclosed(outer);
    for (name, kind) in names {
        let value = from.borrow().get(name, Span::default())?;
        next.borrow_mut().declare(name, *kind, value, Span::default())?;
    }
    Ok(next)
}

fn declaration_kind(kind: VarKind) -> BindingKind {
    match kind {
        VarKind::Var => BindingKind::Var,
        VarKind::Let => BindingKind::Let,
        VarKind::Const => BindingKind::Const,
    }
}

/// `var` targets the hoisted binding; `let` and `const` create one here.
fn declaration_mode(kind: VarKind) -> BindMode {
    match kind {
        VarKind::Var => BindMode::Assign,
        other => BindMode::Declare(declaration_kind(other)),
    }
}

fn pattern_name(pattern: &Pattern) -> Option<&str> {
    match pattern {
        Pattern::Identifier { name, .. } => Some(name),
        _ => None,
    }
}

fn is_constructor(value: &Value) -> bool {
    match value {
        Value::Class(_) => true,
        Value::Function(function) => function.def.kind == FunctionKind::Normal,
        _ => false,
    }
}

/// Arrays are stored densely, so growing one allocates every slot up to the
/// new length. Lengths past `MAX_ARRAY_LENGTH` are invalid outright; below
/// that, growth beyond `MAX_DENSE_LENGTH` or a failed allocation is refused
/// the same way instead of aborting the process.
fn resize_array(items: &mut Vec<Value>, length: usize, span: Span) -> JsResult<()> {
    if length > MAX_ARRAY_LENGTH || (length > items.len() && length > MAX_DENSE_LENGTH) {
        return Err(JsError::range_error(span, "Invalid array length")
            .with_help(format!("Arrays can grow to at most {} elements.", MAX_DENSE_LENGTH)));
    }
    if length > items.len() {
        items
            .try_reserve(length - items.len())
            .map_err(|_| JsError::range_error(span, "Invalid array length"))?;
    }
    items.resize(length, Value::Undefined);
    Ok(())
}

/// Canonical array index for a property key such as `"3"`.
fn array_index(key: &str) -> Option<usize> {
    let index = key.parse::<usize>().ok()?;
    (index.to_string() == key).then_some(index)
}

fn property_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Source-like rendering of a callee for error messages.
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Identifier { name, .. } => name.clone(),
        Expr::This { .. } => "this".to_string(),
        Expr::Member { object, property, .. } => match property {
            MemberProperty::Named(name) => format!("{}.{}", describe(object), name),
            MemberProperty::Computed(_) => format!("{}[...]", describe(object)),
        },
        Expr::SuperMember {
            property: MemberProperty::Named(name),
            ..
        } => format!("super.{}", name),
        Expr::Call { callee, .. } => format!("{}(...)", describe(callee)),
        Expr::Literal { value: Literal::String(s), .. } => format!("\"{}\"", s),
        Expr::Literal { value: Literal::Number(n), .. } => number_to_string(*n),
        _ => "expression".to_string(),
    }
}

fn to_numeric(value: &Value, operator: &str, span: Span) -> JsResult<f64> {
    value.to_number().ok_or_else(|| {
        JsError::type_error(
            span,
            format!("Cannot apply '{}' to {} value {}", operator, value.type_name(), value.repr()),
        )
        .with_help("Arithmetic operators only accept numbers, strings, booleans, null and undefined.")
    })
}

fn binary_op(operator: BinaryOp, left: &Value, right: &Value, span: Span) -> JsResult<Value> {
    let symbol = operator.as_str();
    let value = match operator {
        BinaryOp::Add => {
            let concatenates = matches!(left, Value::String(_))
                || matches!(right, Value::String(_))
                || !left.is_primitive()
                || !right.is_primitive();
            if concatenates {
                Value::String(format!("{}{}", left, right))
            } else {
                Value::Number(to_numeric(left, symbol, span)? + to_numeric(right, symbol, span)?)
            }
        }
        BinaryOp::Subtract => Value::Number(to_numeric(left, symbol, span)? - to_numeric(right, symbol, span)?),
        BinaryOp::Multiply => Value::Number(to_numeric(left, symbol, span)? * to_numeric(right, symbol, span)?),
        BinaryOp::Divide => Value::Number(to_numeric(left, symbol, span)? / to_numeric(right, symbol, span)?),
        BinaryOp::Remainder => Value::Number(to_numeric(left, symbol, span)? % to_numeric(right, symbol, span)?),
        BinaryOp::StrictEqual => Value::Bool(left.strict_equals(right)),
        BinaryOp::StrictNotEqual => Value::Bool(!left.strict_equals(right)),
        BinaryOp::Equal => Value::Bool(left.loose_equals(right)),
        BinaryOp::NotEqual => Value::Bool(!left.loose_equals(right)),
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => {
                    let a = to_numeric(left, symbol, span)?;
                    let b = to_numeric(right, symbol, span)?;
                    a.partial_cmp(&b)
                }
            };
            let result = match ordering {
                None => false,
                Some(ordering) => match operator {
                    BinaryOp::Less => ordering.is_lt(),
                    BinaryOp::LessEqual => ordering.is_le(),
                    BinaryOp::Greater => ordering.is_gt(),
                    _ => ordering.is_ge(),
                },
            };
            Value::Bool(result)
        }
        BinaryOp::In => {
            let key = property_key(left);
            let found = match right {
                Value::Object(object) => object.borrow().contains_key(&key),
                Value::Instance(instance) => {
                    instance.fields.borrow().contains_key(&key) || instance.class.find_method(&key).is_some()
                }
                Value::Array(items) => {
                    key == "length" || array_index(&key).is_some_and(|index| index < items.borrow().len())
                }
                other => {
                    return Err(JsError::type_error(
                        span,
                        format!("Cannot use 'in' operator to search for '{}' in {}", key, other.repr()),
                    ))
                }
            };
            Value::Bool(found)
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    fn run(source: &str) -> (JsResult<Value>, Vec<String>) {
        let output = SharedOutput::new();
        let mut evaluator = Evaluator::with_output(Box::new(output.clone()));
        let program = parse(tokenize(source).unwrap()).unwrap();
        let result = evaluator.evaluate_program(&program);
        (result, output.lines())
    }

    fn eval(source: &str) -> Value {
        let (result, _) = run(source);
        result.unwrap()
    }

    fn eval_err(source: &str) -> JsError {
        let (result, _) = run(source);
        result.unwrap_err()
    }

    #[test]
    fn arithmetic_and_concatenation() {
        assert_eq!(eval("1 + 2 * 3"), Value::Number(7.0));
        assert_eq!(eval("'a' + 1 + 2"), Value::from("a12"));
        assert_eq!(eval("1 + 2 + 'a'"), Value::from("3a"));
        assert_eq!(eval("7 % 3"), Value::Number(1.0));
        assert_eq!(eval("'3' * '4'"), Value::Number(12.0));
        assert_eq!(eval("[1, 2] + ''"), Value::from("1,2"));
    }

    #[test]
    fn arithmetic_on_objects_is_type_error() {
        assert_eq!(eval_err("({}) - 1").kind, ErrorKind::TypeError);
    }

    #[test]
    fn closures_capture_and_share_scope() {
        let source = "
            function counter() {
                let count = 0;
                return () => { count++; return count; };
            }
            const next = counter();
            next(); next();
            next();
        ";
        assert_eq!(eval(source), Value::Number(3.0));
    }

    #[test]
    fn loop_closures_see_their_own_iteration() {
        let source = "
            const fns = [];
            for (let i = 0; i < 3; i++) { fns.push(() => i); }
            fns.map(f => f()).join(',');
        ";
        assert_eq!(eval(source), Value::from("0,1,2"));
    }

    #[test]
    fn var_is_function_scoped() {
        let source = "
            function f() {
                if (true) { var x = 1; }
                return x;
            }
            f();
        ";
        assert_eq!(eval(source), Value::Number(1.0));
    }

    #[test]
    fn functions_are_hoisted() {
        assert_eq!(eval("const r = twice(4); function twice(n) { return n * 2; } r;"), Value::Number(8.0));
    }

    #[test]
    fn class_inheritance_and_super() {
        let source = r#"
            class Animal { speak() { return "sound"; } }
            class Dog extends Animal { speak() { return super.speak() + "+bark"; } }
            new Dog().speak();
        "#;
        assert_eq!(eval(source), Value::from("sound+bark"));
    }

    #[test]
    fn derived_constructor_runs_parent_first() {
        let source = "
            class Point { constructor(x, y) { this.x = x; this.y = y; } sum() { return this.x + this.y; } }
            class Point3D extends Point { constructor(x, y, z) { super(x, y); this.z = z; } sum() { return super.sum() + this.z; } }
            new Point3D(1, 2, 3).sum();
        ";
        assert_eq!(eval(source), Value::Number(6.0));
    }

    #[test]
    fn implicit_derived_constructor_forwards_arguments() {
        let source = "
            class A { constructor(v) { this.v = v; } }
            class B extends A {}
            new B(5).v;
        ";
        assert_eq!(eval(source), Value::Number(5.0));
    }

    #[test]
    fn this_before_super_is_rejected() {
        let error = eval_err("class A {} class B extends A { constructor() { this.x = 1; super(); } } new B();");
        assert_eq!(error.kind, ErrorKind::SuperMisuse);
    }

    #[test]
    fn missing_super_call_is_rejected() {
        let error = eval_err("class A {} class B extends A { constructor() {} } new B();");
        assert_eq!(error.kind, ErrorKind::SuperMisuse);
    }

    #[test]
    fn super_outside_class_is_rejected() {
        assert_eq!(eval_err("super.method();").kind, ErrorKind::SuperMisuse);
    }

    #[test]
    fn arrow_functions_use_lexical_this() {
        let source = "
            class Counter {
                constructor() { this.total = 0; }
                addAll(values) { values.forEach(v => { this.total += v; }); return this.total; }
            }
            new Counter().addAll([1, 2, 3]);
        ";
        assert_eq!(eval(source), Value::Number(6.0));
    }

    #[test]
    fn object_methods_receive_receiver() {
        assert_eq!(
            eval("const obj = { value: 42, getValue: function() { return this.value; } }; obj.getValue();"),
            Value::Number(42.0)
        );
    }

    #[test]
    fn destructuring_defaults_and_rest() {
        assert_eq!(eval("const {a, b = 2, ...others} = {a: 1, c: 3, d: 4}; a + b + Object.keys(others).length;"), Value::Number(5.0));
        assert_eq!(eval("const [x, , y = 9, ...zs] = [1, 2, undefined, 4, 5]; x + y + zs.length;"), Value::Number(12.0));
        assert_eq!(eval("let p = 1, q = 2; [p, q] = [q, p]; p * 10 + q;"), Value::Number(21.0));
    }

    #[test]
    fn spread_and_rest_parameters() {
        assert_eq!(eval("function sum(...n) { return n.reduce((a, b) => a + b, 0); } sum(1, 2, 3);"), Value::Number(6.0));
        assert_eq!(eval("const xs = [...[1, 2], 3]; xs.join('-');"), Value::from("1-2-3"));
        assert_eq!(eval("Math.max(...[4, 9, 2]);"), Value::Number(9.0));
    }

    #[test]
    fn for_of_and_for_in() {
        let (result, lines) = run("for (const x of [1, 2]) console.log(x); for (const k in {a: 1, b: 2}) console.log(k);");
        result.unwrap();
        assert_eq!(lines, vec!["1", "2", "a", "b"]);
    }

    #[test]
    fn break_and_continue() {
        let source = "
            let total = 0;
            for (let i = 0; i < 10; i++) {
                if (i === 5) break;
                if (i % 2 === 0) continue;
                total += i;
            }
            total;
        ";
        assert_eq!(eval(source), Value::Number(4.0));
    }

    #[test]
    fn const_reassignment_keeps_value() {
        let output = SharedOutput::new();
        let mut evaluator = Evaluator::with_output(Box::new(output));
        let program = parse(tokenize("const c = 1; c = 2;").unwrap()).unwrap();
        let error = evaluator.evaluate_program(&program).unwrap_err();
        assert_eq!(error.kind, ErrorKind::ConstReassignment);
        let value = evaluator.global_environment().borrow().get("c", Span::default()).unwrap();
        assert_eq!(value, Value::Number(1.0));
    }

    #[test]
    fn undeclared_reference_after_output() {
        let (result, lines) = run("console.log('before'); missing;");
        assert_eq!(result.unwrap_err().kind, ErrorKind::ReferenceError);
        assert_eq!(lines, vec!["before"]);
    }

    #[test]
    fn calling_non_function_is_type_error() {
        let error = eval_err("const o = {}; o.nope();");
        assert_eq!(error.kind, ErrorKind::TypeError);
        assert_eq!(error.message, "o.nope is not a function");
    }

    #[test]
    fn reading_member_of_undefined_is_type_error() {
        let error = eval_err("let u; u.x;");
        assert_eq!(error.kind, ErrorKind::TypeError);
        assert_eq!(error.message, "Cannot read properties of undefined (reading 'x')");
    }

    #[test]
    fn recursion_limit_is_range_error() {
        let output = SharedOutput::new();
        let options = EvaluatorOptions { max_call_depth: 32 };
        let mut evaluator = Evaluator::with_options(options, Box::new(output));
        let program = parse(tokenize("function f(n) { return f(n + 1); } f(0);").unwrap()).unwrap();
        let error = evaluator.evaluate_program(&program).unwrap_err();
        assert_eq!(error.kind, ErrorKind::RangeError);
    }

    #[test]
    fn await_passes_value_through() {
        assert_eq!(eval("async function f() { const v = await 41; return v + 1; } f();"), Value::Number(42.0));
    }

    #[test]
    fn typeof_undeclared_is_undefined() {
        assert_eq!(eval("typeof nothing"), Value::from("undefined"));
        assert_eq!(eval("typeof (() => 1)"), Value::from("function"));
    }

    #[test]
    fn checkpoint_can_halt_between_statements() {
        let output = SharedOutput::new();
        let mut evaluator = Evaluator::with_output(Box::new(output.clone()));
        let program = parse(tokenize("console.log(1); console.log(2); console.log(3);").unwrap()).unwrap();
        let outcome = evaluator
            .evaluate_program_with(&program, |index| {
                if index == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert!(matches!(outcome, Outcome::Halted { next: 2 }));
        assert_eq!(output.lines(), vec!["1", "2"]);
    }

    #[test]
    fn new_on_plain_function() {
        assert_eq!(eval("function P(x) { this.x = x; } new P(3).x;"), Value::Number(3.0));
        assert_eq!(eval_err("const n = 1; new n();").message, "n is not a constructor");
    }

    #[test]
    fn class_called_without_new() {
        assert_eq!(eval_err("class A {} A();").kind, ErrorKind::TypeError);
    }

    #[test]
    fn inferred_names() {
        let (result, lines) = run("const add = (a, b) => a + b; const K = class {}; console.log(add, K);");
        result.unwrap();
        assert_eq!(lines, vec!["[Function: add] [class K]"]);
    }

    #[test]
    fn array_growth_is_bounded() {
        for source in [
            "const a = []; a[1e18] = 1;",
            "const a = []; a.length = 1e18;",
            "const a = []; a.length = 4294967296;",
            "const a = []; a[4294967295] = 1;",
            "const a = []; a[100000000] = 1;",
        ] {
            let error = eval_err(source);
            assert_eq!(error.kind, ErrorKind::RangeError, "{}", source);
            assert_eq!(error.message, "Invalid array length");
        }
        assert_eq!(eval("const a = [1]; a[3] = 4; a.length;"), Value::Number(4.0));
        assert_eq!(eval("const a = [1, 2, 3]; a.length = 1; a.join('-');"), Value::from("1"));
    }

    #[test]
    fn self_referencing_array_stringifies() {
        let setup = "const a = [1]; a.push(a); a.push(2);";
        assert_eq!(eval(&format!("{} a.join('-');", setup)), Value::from("1--2"));
        assert_eq!(eval(&format!("{} `${{a}}`;", setup)), Value::from("1,,2"));
        assert_eq!(eval(&format!("{} a + '!';", setup)), Value::from("1,,2!"));
        assert_eq!(eval(&format!("{} String(a);", setup)), Value::from("1,,2"));
    }

    #[test]
    fn recursion_up_to_the_default_limit_succeeds() {
        let source = "function f(n) { return n === 0 ? 0 : 1 + f(n - 1); }";
        assert_eq!(eval(&format!("{} f(500);", source)), Value::Number(500.0));
        assert_eq!(eval_err(&format!("{} f(600);", source)).kind, ErrorKind::RangeError);
    }

    #[test]
    fn deep_recursion_on_a_small_thread() {
        let handle = std::thread::Builder::new()
            .stack_size(256 * 1024)
            .spawn(|| {
                assert_eq!(
                    eval("function f(n) { return n === 0 ? 0 : 1 + f(n - 1); } f(400);"),
                    Value::Number(400.0)
                );
            })
            .unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn method_reads_are_identical() {
        assert_eq!(
            eval("class A { m() { return 1; } } const a = new A(); a.m === a.m;"),
            Value::Bool(true)
        );
        assert_eq!(
            eval("class A { m() {} } class B extends A {} const b = new B(); const c = new B(); b.m === c.m;"),
            Value::Bool(true)
        );
        assert_eq!(
            eval("class A { m() {} n() {} } const a = new A(); a.m === a.n;"),
            Value::Bool(false)
        );
        assert_eq!(
            eval("class A { m() {} } const a = new A(); a.m.bind(a) === a.m;"),
            Value::Bool(false)
        );
    }

    #[test]
    fn shorthand_defaults_in_assignment() {
        assert_eq!(eval("let a; ({ a = 5 } = {}); a;"), Value::Number(5.0));
        assert_eq!(eval("let a, b; ({ a = 5, b = a * 2 } = { a: 1 }); [a, b].join();"), Value::from("1,2"));
        assert_eq!(eval("let n = 0; for ({ n = 7 } of [{}]) {} n;"), Value::Number(7.0));
    }

    #[test]
    fn contextual_keywords_as_names() {
        assert_eq!(eval("const of = 1; const async = 2; of + async;"), Value::Number(3.0));
        assert_eq!(eval("let total = 0; for (const of of [1, 2]) total += of; total;"), Value::Number(3.0));
    }
}
