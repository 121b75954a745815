//! Lexical scopes
//!
//! A scope is a frame of bindings plus a link to its parent. Closures hold a
//! clone of the scope they were created in.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::types::ast::VarKind;
use super::types::Val;

#[derive(Clone)]
pub struct Scope(Rc<Frame>);

struct Frame {
    vars: RefCell<HashMap<String, Binding>>,
    parent: Option<Scope>,
    /// `var` declarations land in the nearest function frame
    function_boundary: bool,
}

struct Binding {
    value: Val,
    mutable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignError {
    NotDefined,
    Constant,
}

impl Scope {
    pub fn root() -> Self {
        Self::with_parent(None, true)
    }

    fn with_parent(parent: Option<Scope>, function_boundary: bool) -> Self {
        Scope(Rc::new(Frame {
            vars: RefCell::new(HashMap::new()),
            parent,
            function_boundary,
        }))
    }

    /// Block scope
    pub fn child(&self) -> Self {
        Self::with_parent(Some(self.clone()), false)
    }

    /// Function body scope
    pub fn function_child(&self) -> Self {
        Self::with_parent(Some(self.clone()), true)
    }

    /// Mutable binding in this frame (parameters, hoisted functions, globals)
    pub fn define(&self, name: &str, value: Val) {
        self.0.vars.borrow_mut().insert(
            name.to_string(),
            Binding {
                value,
                mutable: true,
            },
        );
    }

    pub fn declare(&self, name: &str, value: Val, kind: VarKind) {
        match kind {
            VarKind::Var => self.function_frame().define(name, value),
            VarKind::Let => self.define(name, value),
            VarKind::Const => {
                self.0.vars.borrow_mut().insert(
                    name.to_string(),
                    Binding {
                        value,
                        mutable: false,
                    },
                );
            }
        }
    }

    fn function_frame(&self) -> Scope {
        let mut current = self.clone();
        loop {
            if current.0.function_boundary {
                return current;
            }
            match current.0.parent.clone() {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Val> {
        let mut current = Some(self.clone());
        while let Some(scope) = current {
            if let Some(binding) = scope.0.vars.borrow().get(name) {
                return Some(binding.value.clone());
            }
            current = scope.0.parent.clone();
        }
        None
    }

    pub fn assign(&self, name: &str, value: Val) -> Result<(), AssignError> {
        let mut current = Some(self.clone());
        while let Some(scope) = current {
            if let Some(binding) = scope.0.vars.borrow_mut().get_mut(name) {
                if !binding.mutable {
                    return Err(AssignError::Constant);
                }
                binding.value = value;
                return Ok(());
            }
            current = scope.0.parent.clone();
        }
        Err(AssignError::NotDefined)
    }

    pub fn has_own(&self, name: &str) -> bool {
        self.0.vars.borrow().contains_key(name)
    }

    /// Names bound directly in this frame
    pub fn own_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.0.vars.borrow().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_parents() {
        let root = Scope::root();
        root.define("a", Val::Num(1.0));
        let inner = root.child().child();
        assert_eq!(inner.lookup("a"), Some(Val::Num(1.0)));
        assert_eq!(inner.lookup("missing"), None);
    }

    #[test]
    fn test_shadowing_and_assignment() {
        let root = Scope::root();
        root.declare("x", Val::Num(1.0), VarKind::Let);
        let inner = root.child();
        inner.declare("x", Val::Num(2.0), VarKind::Let);

        inner.assign("x", Val::Num(3.0)).unwrap();
        assert_eq!(inner.lookup("x"), Some(Val::Num(3.0)));
        assert_eq!(root.lookup("x"), Some(Val::Num(1.0)));
    }

    #[test]
    fn test_const_assignment_fails() {
        let root = Scope::root();
        root.declare("k", Val::Num(1.0), VarKind::Const);
        assert_eq!(root.assign("k", Val::Null), Err(AssignError::Constant));
        assert_eq!(root.assign("nope", Val::Null), Err(AssignError::NotDefined));
    }

    #[test]
    fn test_var_hoists_to_function_frame() {
        let root = Scope::root();
        let body = root.function_child();
        let block = body.child();
        block.declare("v", Val::Bool(true), VarKind::Var);
        assert!(body.has_own("v"));
        assert!(!block.has_own("v"));
        assert!(!root.has_own("v"));
    }
}
