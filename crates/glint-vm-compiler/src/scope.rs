//! Function-body pre-scan (§4.5 item 1).
//!
//! Walks a function's already-parsed statement list *without descending
//! into nested function bodies* — each nested function pre-scans itself
//! when `CodeGen` compiles it — collecting the hoisted `var`/function
//! bindings the environment must be pre-populated with, and deciding the
//! two header flags that hinge on this information:
//! `arguments_needed` and `lex_env_not_needed`.

use crate::ast::{Expr, Stmt};

/// The result of pre-scanning one function (or program) body.
#[derive(Debug, Default)]
pub struct PrescanResult {
    /// Every `var`-declared name, hoisted to the top of the function,
    /// in first-occurrence order, deduplicated.
    pub hoisted_vars: Vec<String>,
    /// Every function declaration's name, in source order (later
    /// declarations of the same name win, per ES5.1 semantics — the
    /// compiler emits their initializers in order so the last one
    /// sticks).
    pub hoisted_functions: Vec<String>,
    /// Whether the body references the `arguments` identifier anywhere
    /// (not counting nested function bodies, which have their own).
    pub uses_arguments: bool,
    /// Whether the body contains a direct `eval` call, a `with`
    /// statement, or a closure that could capture a binding — any of
    /// which force a fresh lexical environment per call.
    pub escapes: bool,
}

impl PrescanResult {
    /// `lex_env_not_needed`: true only when nothing declared in this
    /// scope needs a home (no hoisted bindings, no parameters supplied
    /// by the caller) and nothing in the body could capture or shadow
    /// an enclosing binding.
    pub fn lex_env_not_needed(&self, param_count: usize) -> bool {
        param_count == 0
            && self.hoisted_vars.is_empty()
            && self.hoisted_functions.is_empty()
            && !self.escapes
            && !self.uses_arguments
    }
}

/// Pre-scan a function body (or top-level program body).
pub fn prescan(body: &[Stmt]) -> PrescanResult {
    let mut result = PrescanResult::default();
    for stmt in body {
        scan_stmt(stmt, &mut result);
    }
    result
}

fn declare_var(result: &mut PrescanResult, name: &str) {
    if !result.hoisted_vars.iter().any(|existing| existing == name) {
        result.hoisted_vars.push(name.to_string());
    }
}

fn scan_stmt(stmt: &Stmt, result: &mut PrescanResult) {
    match stmt {
        Stmt::VarDecl(decls) => {
            for decl in decls {
                declare_var(result, &decl.name);
                if let Some(init) = &decl.init {
                    scan_expr(init, result);
                }
            }
        }
        Stmt::FunctionDecl(func) => {
            result.hoisted_functions.push(func.name.clone().unwrap_or_default());
            // A nested function declaration is itself a closure; the
            // enclosing scope must keep the binding it closes over alive.
            result.escapes = true;
        }
        Stmt::Expr(e) | Stmt::Throw(e) => scan_expr(e, result),
        Stmt::Return(Some(e)) => scan_expr(e, result),
        Stmt::Return(None) | Stmt::Empty | Stmt::Debugger => {}
        Stmt::Block(stmts) => {
            for s in stmts {
                scan_stmt(s, result);
            }
        }
        Stmt::If { test, consequent, alternate } => {
            scan_expr(test, result);
            scan_stmt(consequent, result);
            if let Some(alt) = alternate {
                scan_stmt(alt, result);
            }
        }
        Stmt::While { test, body } => {
            scan_expr(test, result);
            scan_stmt(body, result);
        }
        Stmt::DoWhile { body, test } => {
            scan_stmt(body, result);
            scan_expr(test, result);
        }
        Stmt::For { init, test, update, body } => {
            if let Some(init) = init {
                scan_stmt(init, result);
            }
            if let Some(test) = test {
                scan_expr(test, result);
            }
            if let Some(update) = update {
                scan_expr(update, result);
            }
            scan_stmt(body, result);
        }
        Stmt::ForIn { decl_name, is_var_decl, object, body } => {
            if *is_var_decl {
                declare_var(result, decl_name);
            }
            scan_expr(object, result);
            scan_stmt(body, result);
        }
        Stmt::Break(_) | Stmt::Continue(_) => {}
        Stmt::Try { block, handler, finalizer } => {
            for s in block {
                scan_stmt(s, result);
            }
            if let Some(h) = handler {
                for s in &h.body {
                    scan_stmt(s, result);
                }
            }
            if let Some(f) = finalizer {
                for s in f {
                    scan_stmt(s, result);
                }
            }
        }
        Stmt::With { object, body } => {
            scan_expr(object, result);
            scan_stmt(body, result);
            result.escapes = true;
        }
        Stmt::Labeled { body, .. } => scan_stmt(body, result),
        Stmt::Switch { discriminant, cases } => {
            scan_expr(discriminant, result);
            for case in cases {
                if let Some(test) = &case.test {
                    scan_expr(test, result);
                }
                for s in &case.body {
                    scan_stmt(s, result);
                }
            }
        }
    }
}

fn scan_expr(expr: &Expr, result: &mut PrescanResult) {
    match expr {
        Expr::Ident(name) => {
            if name == "arguments" {
                result.uses_arguments = true;
            }
        }
        Expr::Number(_) | Expr::String(_) | Expr::Boolean(_) | Expr::Null | Expr::This | Expr::Regex { .. } => {}
        Expr::Function(_) => {
            // A function expression is a closure too; conservatively
            // force a fresh environment for the enclosing scope.
            result.escapes = true;
        }
        Expr::Array(elements) => {
            for el in elements.iter().flatten() {
                scan_expr(el, result);
            }
        }
        Expr::Object(props) => {
            for prop in props {
                match prop {
                    crate::ast::ObjectProperty::Data { value, .. } => scan_expr(value, result),
                    crate::ast::ObjectProperty::Getter { .. } | crate::ast::ObjectProperty::Setter { .. } => {
                        result.escapes = true;
                    }
                }
            }
        }
        Expr::Unary { arg, .. } => scan_expr(arg, result),
        Expr::Update { arg, .. } => scan_expr(arg, result),
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            scan_expr(left, result);
            scan_expr(right, result);
        }
        Expr::Assign { target, value, .. } => {
            scan_expr(target, result);
            scan_expr(value, result);
        }
        Expr::Conditional { test, consequent, alternate } => {
            scan_expr(test, result);
            scan_expr(consequent, result);
            scan_expr(alternate, result);
        }
        Expr::Call { callee, args, .. } => {
            if let Expr::Ident(name) = callee.as_ref() {
                if name == "eval" {
                    result.escapes = true;
                }
            }
            scan_expr(callee, result);
            for a in args {
                scan_expr(a, result);
            }
        }
        Expr::Member { object, property, computed } => {
            scan_expr(object, result);
            if *computed {
                scan_expr(property, result);
            }
        }
        Expr::Sequence(exprs) => {
            for e in exprs {
                scan_expr(e, result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::VarDeclarator;

    #[test]
    fn hoists_var_declarations_in_order() {
        let body = vec![
            Stmt::VarDecl(vec![VarDeclarator { name: "a".into(), init: None }]),
            Stmt::Block(vec![Stmt::VarDecl(vec![VarDeclarator { name: "b".into(), init: None }])]),
        ];
        let scan = prescan(&body);
        assert_eq!(scan.hoisted_vars, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn detects_arguments_usage() {
        let body = vec![Stmt::Return(Some(Expr::Ident("arguments".into())))];
        assert!(prescan(&body).uses_arguments);
    }

    #[test]
    fn empty_body_does_not_need_a_fresh_environment() {
        let scan = prescan(&[]);
        assert!(scan.lex_env_not_needed(0));
        assert!(!scan.lex_env_not_needed(1));
    }

    #[test]
    fn nested_function_declaration_forces_escapes() {
        let body = vec![Stmt::FunctionDecl(crate::ast::Function {
            name: Some("inner".into()),
            params: vec![],
            body: vec![],
            own_strict: false,
            line: 1,
        })];
        assert!(prescan(&body).escapes);
    }
}
