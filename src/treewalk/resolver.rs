use std::collections::HashMap;
use std::rc::Rc;
use std::result;

use tracing::debug;

use crate::error::BindingError;
use crate::expr::{Expr, ExprId};
use crate::scanner::Token;
use crate::stmt::{FunctionDecl, Stmt};

use super::class::INITIALIZER_METHOD;

/// Where a name-carrying expression finds its binding at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Number of enclosing links between the frame active at the use site and the declaring frame.
    Local(usize),
    /// Looked up by name in the global frame when evaluated.
    Global,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionTable {
    entries: HashMap<ExprId, Resolution>,
}

impl ResolutionTable {
    pub fn get(&self, id: ExprId) -> Option<Resolution> {
        self.entries.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn extend(&mut self, other: ResolutionTable) {
        self.entries.extend(other.entries);
    }

    fn record(&mut self, id: ExprId, resolution: Resolution) {
        self.entries.insert(id, resolution);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindingState {
    Declared,
    Defined,
    // defined, and a body-local var may shadow it
    Parameter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    None,
    Function,
    Method,
    Initializer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassKind {
    None,
    Class,
    Subclass,
}

struct VarScopes {
    // only local scopes, top-level declarations are never tracked here
    stack: Vec<HashMap<String, BindingState>>,
    table: ResolutionTable,
    errors: Vec<BindingError>,
    current_function: FunctionKind,
    current_class: ClassKind,
}

impl VarScopes {
    fn new() -> VarScopes {
        VarScopes {
            stack: Vec::new(),
            table: ResolutionTable::default(),
            errors: Vec::new(),
            current_function: FunctionKind::None,
            current_class: ClassKind::None,
        }
    }

    fn push(&mut self) {
        self.stack.push(HashMap::new());
    }

    fn pop(&mut self) {
        self.stack
            .pop()
            .expect("Attempted to pop empty VarScopes stack."); // panic here because this would indicate a bug in the resolver
    }

    fn declare(&mut self, name: &Token) {
        if let Some(frame) = self.stack.last_mut() {
            let previous = frame.insert(name.lexeme.clone(), BindingState::Declared);
            if matches!(previous, Some(BindingState::Declared | BindingState::Defined)) {
                self.error(BindingError::DuplicateDeclaration {
                    name: name.lexeme.clone(),
                    line: name.line,
                });
            }
        }
    }

    // errors are collected and resolution carries on, so one pass reports all of them
    fn error(&mut self, error: BindingError) {
        self.errors.push(error);
    }

    fn define(&mut self, name: &str) {
        self.set_state(name, BindingState::Defined);
    }

    fn define_parameter(&mut self, name: &str) {
        self.set_state(name, BindingState::Parameter);
    }

    fn set_state(&mut self, name: &str, state: BindingState) {
        if let Some(frame) = self.stack.last_mut() {
            frame.insert(name.to_string(), state);
        }
    }

    fn innermost_state(&self, name: &str) -> Option<BindingState> {
        self.stack.last().and_then(|frame| frame.get(name).copied())
    }

    fn resolve_local(&mut self, id: ExprId, name: &str) {
        let resolution = self
            .stack
            .iter()
            .rev()
            .position(|frame| frame.contains_key(name))
            .map_or(Resolution::Global, Resolution::Local);
        self.table.record(id, resolution);
    }
}

/// Resolve every variable reference in a program, or report every static error in it.
pub fn resolve(statements: &[Stmt]) -> result::Result<ResolutionTable, Vec<BindingError>> {
    let mut scope = VarScopes::new();
    for statement in statements {
        resolve_statement(statement, &mut scope);
    }
    debug!(
        statements = statements.len(),
        entries = scope.table.len(),
        errors = scope.errors.len(),
        "resolved program"
    );
    if scope.errors.is_empty() {
        Ok(scope.table)
    } else {
        Err(scope.errors)
    }
}

fn resolve_statement(statement: &Stmt, scope: &mut VarScopes) {
    match statement {
        Stmt::Block { statements } => block_statement(statements, scope),
        Stmt::Class {
            name,
            superclass,
            methods,
        } => class_statement(name, superclass.as_ref(), methods, scope),
        Stmt::Expression { expression } => resolve_expr(expression, scope),
        Stmt::Function(declaration) => function_statement(declaration, scope),
        Stmt::If {
            condition,
            then_branch,
            else_branch,
        } => if_statement(condition, then_branch, else_branch.as_deref(), scope),
        Stmt::Print { expression } => resolve_expr(expression, scope),
        Stmt::Return { keyword, value } => return_statement(keyword, value.as_ref(), scope),
        Stmt::Var { name, initializer } => var_statement(name, initializer, scope),
        Stmt::While { condition, body } => while_statement(condition, body, scope),
    }
}

fn block_statement(statements: &[Stmt], scope: &mut VarScopes) {
    scope.push();
    for statement in statements {
        resolve_statement(statement, scope);
    }
    scope.pop();
}

fn class_statement(
    name: &Token,
    superclass: Option<&Expr>,
    methods: &[Rc<FunctionDecl>],
    scope: &mut VarScopes,
) {
    let enclosing_class = scope.current_class;
    scope.current_class = ClassKind::Class;

    scope.declare(name);
    scope.define(&name.lexeme);

    if let Some(superclass) = superclass {
        if let Expr::Variable {
            name: superclass_name, ..
        } = superclass
        {
            if superclass_name.lexeme == name.lexeme {
                scope.error(BindingError::SelfInheritance {
                    name: name.lexeme.clone(),
                    line: superclass_name.line,
                });
            }
        }
        scope.current_class = ClassKind::Subclass;
        resolve_expr(superclass, scope);

        scope.push();
        scope.define("super");
    }

    scope.push();
    scope.define("this");

    for method in methods {
        let kind = if method.name.lexeme == INITIALIZER_METHOD {
            FunctionKind::Initializer
        } else {
            FunctionKind::Method
        };
        resolve_function(method, kind, scope);
    }

    scope.pop();
    if superclass.is_some() {
        scope.pop();
    }

    scope.current_class = enclosing_class;
}

fn function_statement(declaration: &FunctionDecl, scope: &mut VarScopes) {
    // defined eagerly so the body can refer to the function recursively
    scope.declare(&declaration.name);
    scope.define(&declaration.name.lexeme);
    resolve_function(declaration, FunctionKind::Function, scope);
}

fn resolve_function(declaration: &FunctionDecl, kind: FunctionKind, scope: &mut VarScopes) {
    let enclosing_function = scope.current_function;
    scope.current_function = kind;

    scope.push();
    for param in &declaration.params {
        scope.declare(param);
        scope.define_parameter(&param.lexeme);
    }
    // the body shares the parameter scope, matching the single frame created per call
    for statement in &declaration.body {
        resolve_statement(statement, scope);
    }
    scope.pop();

    scope.current_function = enclosing_function;
}

fn if_statement(condition: &Expr, then_branch: &Stmt, else_branch: Option<&Stmt>, scope: &mut VarScopes) {
    resolve_expr(condition, scope);
    resolve_statement(then_branch, scope);
    if let Some(else_statement) = else_branch {
        resolve_statement(else_statement, scope);
    }
}

fn return_statement(keyword: &Token, value: Option<&Expr>, scope: &mut VarScopes) {
    if scope.current_function == FunctionKind::None {
        scope.error(BindingError::ReturnOutsideFunction { line: keyword.line });
    }
    if let Some(value) = value {
        if scope.current_function == FunctionKind::Initializer {
            scope.error(BindingError::ReturnValueFromInitializer { line: keyword.line });
        }
        resolve_expr(value, scope);
    }
}

fn var_statement(name: &Token, initializer: &Expr, scope: &mut VarScopes) {
    // declared before the initializer is resolved so self references can be detected
    scope.declare(name);
    resolve_expr(initializer, scope);
    scope.define(&name.lexeme);
}

fn while_statement(condition: &Expr, body: &Stmt, scope: &mut VarScopes) {
    resolve_expr(condition, scope);
    resolve_statement(body, scope);
}

fn resolve_expr(expression: &Expr, scope: &mut VarScopes) {
    match expression {
        Expr::Assign { id, name, value } => {
            resolve_expr(value, scope);
            scope.resolve_local(*id, &name.lexeme);
        }
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            resolve_expr(left, scope);
            resolve_expr(right, scope);
        }
        Expr::Call { callee, arguments, .. } => {
            resolve_expr(callee, scope);
            resolve_all(arguments, scope);
        }
        Expr::Get { object, .. } => resolve_expr(object, scope),
        Expr::Grouping { expression } => resolve_expr(expression, scope),
        Expr::Index { list, index, .. } => {
            resolve_expr(list, scope);
            resolve_expr(index, scope);
        }
        Expr::List { elements, .. } => resolve_all(elements, scope),
        Expr::Literal { .. } => {}
        Expr::Set { object, value, .. } => {
            resolve_expr(value, scope);
            resolve_expr(object, scope);
        }
        Expr::Super { id, keyword, .. } => resolve_super(*id, keyword, scope),
        Expr::Ternary {
            condition,
            then_branch,
            else_branch,
        } => {
            resolve_expr(condition, scope);
            resolve_expr(then_branch, scope);
            resolve_expr(else_branch, scope);
        }
        Expr::This { id, keyword } => {
            if scope.current_class == ClassKind::None {
                scope.error(BindingError::ThisOutsideClass { line: keyword.line });
            }
            scope.resolve_local(*id, &keyword.lexeme);
        }
        Expr::Unary { right, .. } => resolve_expr(right, scope),
        Expr::Variable { id, name } => resolve_variable(*id, name, scope),
    }
}

fn resolve_all(expressions: &[Expr], scope: &mut VarScopes) {
    for expression in expressions {
        resolve_expr(expression, scope);
    }
}

fn resolve_super(id: ExprId, keyword: &Token, scope: &mut VarScopes) {
    match scope.current_class {
        ClassKind::None => scope.error(BindingError::SuperOutsideClass { line: keyword.line }),
        ClassKind::Class => scope.error(BindingError::SuperWithoutSuperclass { line: keyword.line }),
        ClassKind::Subclass => scope.resolve_local(id, &keyword.lexeme),
    }
}

fn resolve_variable(id: ExprId, name: &Token, scope: &mut VarScopes) {
    if scope.innermost_state(&name.lexeme) == Some(BindingState::Declared) {
        scope.error(BindingError::SelfReferencingInitializer {
            name: name.lexeme.clone(),
            line: name.line,
        });
    }
    scope.resolve_local(id, &name.lexeme);
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::parser::parse;
    use crate::scanner::scan_tokens;

    fn parse_source(code: &str) -> Vec<Stmt> {
        let tokens = scan_tokens(code).expect("scan should succeed");
        parse(&tokens).expect("parse should succeed")
    }

    // ids of every variable reference named `name`, in source order
    fn variable_ids(statements: &[Stmt], name: &str) -> Vec<ExprId> {
        fn visit_expr(expr: &Expr, name: &str, ids: &mut Vec<ExprId>) {
            match expr {
                Expr::Variable { id, name: token } | Expr::Assign { id, name: token, .. } => {
                    if token.lexeme == name {
                        ids.push(*id);
                    }
                    if let Expr::Assign { value, .. } = expr {
                        visit_expr(value, name, ids);
                    }
                }
                Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                    visit_expr(left, name, ids);
                    visit_expr(right, name, ids);
                }
                Expr::Call { callee, arguments, .. } => {
                    visit_expr(callee, name, ids);
                    arguments.iter().for_each(|argument| visit_expr(argument, name, ids));
                }
                Expr::Grouping { expression } => visit_expr(expression, name, ids),
                _ => {}
            }
        }
        fn visit_stmt(stmt: &Stmt, name: &str, ids: &mut Vec<ExprId>) {
            match stmt {
                Stmt::Block { statements } => statements.iter().for_each(|s| visit_stmt(s, name, ids)),
                Stmt::Expression { expression } | Stmt::Print { expression } => visit_expr(expression, name, ids),
                Stmt::Function(declaration) => declaration.body.iter().for_each(|s| visit_stmt(s, name, ids)),
                Stmt::Var { initializer, .. } => visit_expr(initializer, name, ids),
                Stmt::Return { value: Some(value), .. } => visit_expr(value, name, ids),
                _ => {}
            }
        }
        let mut ids = Vec::new();
        statements.iter().for_each(|s| visit_stmt(s, name, &mut ids));
        ids
    }

    #[test]
    fn closure_reference_is_fixed_by_nesting() {
        let statements = parse_source(
            "var a = \"global\";
            {
                fun showA() { print a; }
                showA();
                var a = \"block\";
                showA();
                print a;
            }",
        );
        let table = resolve(&statements).expect("resolve should succeed");
        let ids = variable_ids(&statements, "a");
        // inside showA, then the block-level print
        assert_eq!(ids.len(), 2);
        assert_eq!(table.get(ids[0]), Some(Resolution::Global));
        assert_eq!(table.get(ids[1]), Some(Resolution::Local(0)));
    }

    #[test]
    fn hop_distances() {
        let statements = parse_source(
            "fun outer(x) {
                var y = 1;
                fun inner() { return x + y; }
                { print x; }
                return inner;
            }",
        );
        let table = resolve(&statements).expect("resolve should succeed");
        let x_ids = variable_ids(&statements, "x");
        let y_ids = variable_ids(&statements, "y");
        assert_eq!(table.get(x_ids[0]), Some(Resolution::Local(1)));
        assert_eq!(table.get(y_ids[0]), Some(Resolution::Local(1)));
        assert_eq!(table.get(x_ids[1]), Some(Resolution::Local(1)));
        let inner_ids = variable_ids(&statements, "inner");
        assert_eq!(table.get(inner_ids[0]), Some(Resolution::Local(0)));
    }

    #[test]
    fn resolution_is_deterministic() {
        let statements = parse_source(
            "var a = 1;
            fun f(b) { var c = a + b; { var d = c; return d; } }
            class K { m() { return this; } }",
        );
        let first = resolve(&statements).expect("resolve should succeed");
        let second = resolve(&statements).expect("resolve should succeed");
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn self_reference_in_local_initializer() {
        let statements = parse_source("var a = 10; { var a = a; }");
        assert_eq!(
            resolve(&statements),
            Err(vec![BindingError::SelfReferencingInitializer {
                name: "a".to_string(),
                line: 1
            }])
        );
    }

    #[test]
    fn global_self_reference_is_allowed() {
        let statements = parse_source("var a = 1; var a = a;");
        assert!(resolve(&statements).is_ok());
    }

    #[test]
    fn recursive_function_name_is_not_self_reference() {
        let statements = parse_source("{ fun a() { a(); } a(); }");
        assert!(resolve(&statements).is_ok());
    }

    #[test]
    fn duplicate_local_declaration() {
        let statements = parse_source("{ var a = 1; var a = 2; }");
        assert!(matches!(
            resolve(&statements).unwrap_err().as_slice(),
            [BindingError::DuplicateDeclaration { .. }]
        ));
    }

    #[test]
    fn body_local_may_shadow_parameter() {
        let statements = parse_source("fun f(a) { var a = 2; return a; }");
        assert!(resolve(&statements).is_ok());

        let statements = parse_source("fun f(a, a) {}");
        assert!(matches!(
            resolve(&statements).unwrap_err().as_slice(),
            [BindingError::DuplicateDeclaration { .. }]
        ));
    }

    #[test]
    fn structural_errors() {
        let cases = [
            ("return 1;", "ReturnOutsideFunction"),
            ("print this;", "ThisOutsideClass"),
            ("fun f() { return super.x; }", "SuperOutsideClass"),
            ("class A { m() { return super.m(); } }", "SuperWithoutSuperclass"),
            ("class A < A {}", "SelfInheritance"),
            ("class A { init() { return 1; } }", "ReturnValueFromInitializer"),
        ];
        for (code, expected) in cases {
            let errors = resolve(&parse_source(code)).expect_err(code);
            assert_eq!(errors.len(), 1, "{code}: {errors:?}");
            assert!(format!("{:?}", errors[0]).starts_with(expected), "{code}: {errors:?}");
        }
    }

    #[test]
    fn bare_return_in_initializer_is_allowed() {
        let statements = parse_source("class A { init() { return; } }");
        assert!(resolve(&statements).is_ok());
    }

    #[test]
    fn reports_every_error_in_one_pass() {
        let statements = parse_source(
            "{ var a = a; }
            return 1;
            class A < A {}
            fun f() { print this; }",
        );
        assert_eq!(
            resolve(&statements),
            Err(vec![
                BindingError::SelfReferencingInitializer {
                    name: "a".to_string(),
                    line: 1
                },
                BindingError::ReturnOutsideFunction { line: 2 },
                BindingError::SelfInheritance {
                    name: "A".to_string(),
                    line: 3
                },
                BindingError::ThisOutsideClass { line: 4 },
            ])
        );
    }
}
