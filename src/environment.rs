use crate::error::{JsError, JsResult, Span};
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Shared handle to a scope. Closures hold one of these to keep their
/// defining scope alive.
pub type Env = Rc<RefCell<Environment>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Var,
    Let,
    Const,
    Param,
    Function,
    Class,
    /// The receiver of the enclosing non-arrow function.
    This,
}

impl BindingKind {
    fn is_lexical(self) -> bool {
        matches!(self, BindingKind::Let | BindingKind::Const | BindingKind::Class)
    }
}

#[derive(Debug, Clone)]
struct Binding {
    value: Value,
    kind: BindingKind,
    initialized: bool,
}

/// Outcome of resolving a name through the scope chain.
#[derive(Debug, Clone)]
pub enum Lookup {
    Found(Value),
    /// Declared but not yet initialized, such as `this` before `super()`.
    Uninitialized,
    Missing,
}

#[derive(Debug, Default)]
pub struct Environment {
    bindings: HashMap<String, Binding>,
    enclosing: Option<Env>,
    /// Function bodies and the global scope own their `var` declarations.
    function_scope: bool,
}

impl Environment {
    pub fn new_global() -> Env {
        Rc::new(RefCell::new(Self {
            bindings: HashMap::new(),
            enclosing: None,
            function_scope: true,
        }))
    }

    pub fn new_enclosed(enclosing: &Env) -> Env {
        Rc::new(RefCell::new(Self {
            bindings: HashMap::new(),
            enclosing: Some(enclosing.clone()),
            function_scope: false,
        }))
    }

    pub fn new_function(enclosing: &Env) -> Env {
        Rc::new(RefCell::new(Self {
            bindings: HashMap::new(),
            enclosing: Some(enclosing.clone()),
            function_scope: true,
        }))
    }

    /// Create a binding in this scope.
    ///
    /// `let`, `const` and `class` may not collide with any existing binding
    /// in the same scope. `var` and function declarations may be repeated.
    pub fn declare(&mut self, name: &str, kind: BindingKind, value: Value, span: Span) -> JsResult<()> {
        if let Some(existing) = self.bindings.get(name) {
            if kind.is_lexical() || existing.kind.is_lexical() {
                return Err(JsError::redeclaration(span, name));
            }
            if kind == BindingKind::Var {
                // `var x;` over an existing binding keeps its value.
                return Ok(());
            }
        }
        tracing::trace!(name, ?kind, "declare");
        self.bindings.insert(
            name.to_string(),
            Binding {
                value,
                kind,
                initialized: true,
            },
        );
        Ok(())
    }

    /// Declare a binding that cannot be read until [`initialize`] runs.
    ///
    /// [`initialize`]: Environment::initialize
    pub fn declare_uninitialized(&mut self, name: &str, kind: BindingKind) {
        self.bindings.insert(
            name.to_string(),
            Binding {
                value: Value::Undefined,
                kind,
                initialized: false,
            },
        );
    }

    pub fn lookup(&self, name: &str) -> Lookup {
        match self.bindings.get(name) {
            Some(binding) if binding.initialized => Lookup::Found(binding.value.clone()),
            Some(_) => Lookup::Uninitialized,
            None => match &self.enclosing {
                Some(enclosing) => enclosing.borrow().lookup(name),
                None => Lookup::Missing,
            },
        }
    }

    pub fn get(&self, name: &str, span: Span) -> JsResult<Value> {
        match self.lookup(name) {
            Lookup::Found(value) => Ok(value),
            Lookup::Uninitialized => Err(JsError::reference_error(
                span,
                format!("Cannot access '{}' before initialization", name),
            )),
            Lookup::Missing => Err(JsError::reference_error(span, format!("{} is not defined", name))
                .with_help(format!("Declare '{}' with let, const or var before using it.", name))),
        }
    }

    /// Update an existing binding found anywhere on the chain.
    pub fn assign(&mut self, name: &str, value: Value, span: Span) -> JsResult<()> {
        if let Some(binding) = self.bindings.get_mut(name) {
            if binding.kind == BindingKind::Const {
                return Err(JsError::const_reassignment(span, name));
            }
            if !binding.initialized {
                return Err(JsError::reference_error(
                    span,
                    format!("Cannot access '{}' before initialization", name),
                ));
            }
            binding.value = value;
            return Ok(());
        }
        match &self.enclosing {
            Some(enclosing) => enclosing.borrow_mut().assign(name, value, span),
            None => Err(JsError::reference_error(span, format!("{} is not defined", name))
                .with_help(format!("Declare '{}' with let, const or var before assigning to it.", name))),
        }
    }

    /// Give an uninitialized binding its value. Returns false if the nearest
    /// binding for `name` was already initialized or does not exist.
    pub fn initialize(&mut self, name: &str, value: Value) -> bool {
        if let Some(binding) = self.bindings.get_mut(name) {
            if binding.initialized {
                return false;
            }
            binding.value = value;
            binding.initialized = true;
            return true;
        }
        match &self.enclosing {
            Some(enclosing) => enclosing.borrow_mut().initialize(name, value),
            None => false,
        }
    }
}

/// Nearest scope that owns `var` declarations for `env`.
pub fn function_scope(env: &Env) -> Env {
    let mut current = env.clone();
    loop {
        let next = {
            let scope = current.borrow();
            if scope.function_scope {
                None
            } else {
                scope.enclosing.clone()
            }
        };
        match next {
            Some(enclosing) => current = enclosing,
            None => return current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    fn span() -> Span {
        Span::default()
    }

    #[test]
    fn lookup_walks_enclosing_scopes() {
        let global = Environment::new_global();
        global
            .borrow_mut()
            .declare("x", BindingKind::Let, Value::from(1.0), span())
            .unwrap();
        let inner = Environment::new_enclosed(&global);
        assert_eq!(inner.borrow().get("x", span()).unwrap(), Value::from(1.0));
    }

    #[test]
    fn shadowing_does_not_touch_outer_binding() {
        let global = Environment::new_global();
        global
            .borrow_mut()
            .declare("x", BindingKind::Let, Value::from(1.0), span())
            .unwrap();
        let inner = Environment::new_enclosed(&global);
        inner
            .borrow_mut()
            .declare("x", BindingKind::Let, Value::from(2.0), span())
            .unwrap();
        assert_eq!(inner.borrow().get("x", span()).unwrap(), Value::from(2.0));
        assert_eq!(global.borrow().get("x", span()).unwrap(), Value::from(1.0));
    }

    #[test]
    fn const_rejects_assignment_and_keeps_value() {
        let global = Environment::new_global();
        global
            .borrow_mut()
            .declare("c", BindingKind::Const, Value::from(1.0), span())
            .unwrap();
        let error = global
            .borrow_mut()
            .assign("c", Value::from(2.0), span())
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::ConstReassignment);
        assert_eq!(global.borrow().get("c", span()).unwrap(), Value::from(1.0));
    }

    #[test]
    fn missing_name_is_reference_error() {
        let global = Environment::new_global();
        let error = global.borrow().get("nope", span()).unwrap_err();
        assert_eq!(error.kind, ErrorKind::ReferenceError);
        assert_eq!(error.message, "nope is not defined");
        let error = global
            .borrow_mut()
            .assign("nope", Value::Null, span())
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::ReferenceError);
    }

    #[test]
    fn let_redeclaration_fails_but_var_is_allowed() {
        let global = Environment::new_global();
        let mut scope = global.borrow_mut();
        scope.declare("a", BindingKind::Let, Value::Null, span()).unwrap();
        let error = scope.declare("a", BindingKind::Let, Value::Null, span()).unwrap_err();
        assert_eq!(error.kind, ErrorKind::Redeclaration);
        scope.declare("v", BindingKind::Var, Value::from(1.0), span()).unwrap();
        scope.declare("v", BindingKind::Var, Value::Undefined, span()).unwrap();
        assert_eq!(scope.get("v", span()).unwrap(), Value::from(1.0));
    }

    #[test]
    fn uninitialized_binding_until_initialize() {
        let global = Environment::new_global();
        let inner = Environment::new_function(&global);
        inner.borrow_mut().declare_uninitialized("this", BindingKind::This);
        assert!(matches!(inner.borrow().lookup("this"), Lookup::Uninitialized));
        assert!(inner.borrow_mut().initialize("this", Value::Null));
        assert!(!inner.borrow_mut().initialize("this", Value::Null));
        assert!(matches!(inner.borrow().lookup("this"), Lookup::Found(Value::Null)));
    }

    #[test]
    fn var_scope_skips_blocks() {
        let global = Environment::new_global();
        let function = Environment::new_function(&global);
        let block = Environment::new_enclosed(&function);
        let nested = Environment::new_enclosed(&block);
        assert!(Rc::ptr_eq(&function_scope(&nested), &function));
        assert!(Rc::ptr_eq(&function_scope(&global), &global));
    }

    #[test]
    fn closures_share_captured_scope() {
        let global = Environment::new_global();
        let captured = Environment::new_enclosed(&global);
        captured
            .borrow_mut()
            .declare("count", BindingKind::Let, Value::from(0.0), span())
            .unwrap();
        let handle = captured.clone();
        handle
            .borrow_mut()
            .assign("count", Value::from(5.0), span())
            .unwrap();
        assert_eq!(captured.borrow().get("count", span()).unwrap(), Value::from(5.0));
    }
}
