//! Recursive-descent parser and bytecode code generator.
//!
//! `Parser` builds an [`crate::ast`] tree from a [`crate::lexer::Lexer`]
//! token stream using a standard precedence-climbing expression parser.
//! `CodeGen` then walks that tree, consulting [`crate::scope::prescan`]
//! for each function body, and writes bytecode through
//! [`crate::emitter::CodeBuilder`].

use std::rc::Rc;

use glint_vm_bytecode::{CodeFlags, CodeHeader, CompiledCode, ExtendedOpcode, Opcode};

use crate::ast::*;
use crate::emitter::{CodeBuilder, Label};
use crate::error::{CompileError, CompileResult};
use crate::lexer::{Keyword, Lexer, Punct, Token, TokenKind};
use crate::scope::prescan;

// =========================================================================
// Parser
// =========================================================================

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    cur: Token,
    /// Effective strictness (inherited or locally declared) at the
    /// current parse position, used only for early-error checks. What
    /// ends up stored on [`Function::own_strict`] is just the locally
    /// declared flag; `CodeGen` recomputes the effective value from the
    /// enclosing code when it compiles the function.
    strict: bool,
}

impl<'a> Parser<'a> {
    pub fn new(src: &'a str) -> CompileResult<Self> {
        let mut lexer = Lexer::new(src);
        let cur = lexer.next_token_regex_allowed()?;
        Ok(Self { lexer, cur, strict: false })
    }

    fn err(&self, message: impl Into<String>) -> CompileError {
        CompileError::syntax(message, self.cur.line, self.cur.column)
    }

    fn advance(&mut self) -> CompileResult<()> {
        let regex_allowed = !matches!(
            &self.cur.kind,
            TokenKind::Identifier(_)
                | TokenKind::Number(_)
                | TokenKind::String(_)
                | TokenKind::Regex { .. }
                | TokenKind::Keyword(Keyword::This | Keyword::True | Keyword::False | Keyword::Null)
                | TokenKind::Punct(Punct::RParen | Punct::RBracket | Punct::PlusPlus | Punct::MinusMinus)
        );
        self.cur =
            if regex_allowed { self.lexer.next_token_regex_allowed()? } else { self.lexer.next_token()? };
        Ok(())
    }

    fn is_punct(&self, p: Punct) -> bool {
        matches!(&self.cur.kind, TokenKind::Punct(q) if *q == p)
    }

    fn is_keyword(&self, k: Keyword) -> bool {
        matches!(&self.cur.kind, TokenKind::Keyword(q) if *q == k)
    }

    fn eat_punct(&mut self, p: Punct) -> CompileResult<()> {
        if self.is_punct(p) {
            self.advance()
        } else {
            Err(self.err(format!("expected {p:?}")))
        }
    }

    fn eat_keyword(&mut self, k: Keyword) -> CompileResult<()> {
        if self.is_keyword(k) {
            self.advance()
        } else {
            Err(self.err(format!("expected keyword {k:?}")))
        }
    }

    fn ident_name(&mut self) -> CompileResult<String> {
        match self.cur.kind.clone() {
            TokenKind::Identifier(name) => {
                self.advance()?;
                Ok(name)
            }
            _ => Err(self.err("expected identifier")),
        }
    }

    /// Automatic semicolon insertion: accept an explicit `;`, or treat
    /// `}`, EOF, or a preceding newline as an implicit one.
    fn consume_semicolon(&mut self) -> CompileResult<()> {
        if self.is_punct(Punct::Semi) {
            return self.advance();
        }
        if self.is_punct(Punct::RBrace) || matches!(self.cur.kind, TokenKind::Eof) || self.cur.preceded_by_newline {
            return Ok(());
        }
        Err(self.err("expected ';'"))
    }

    fn checkpoint(&self) -> (Lexer<'a>, Token) {
        (self.lexer.clone(), self.cur.clone())
    }

    fn restore(&mut self, checkpoint: (Lexer<'a>, Token)) {
        self.lexer = checkpoint.0;
        self.cur = checkpoint.1;
    }

    // ---- program / functions ----

    pub fn parse_program(&mut self) -> CompileResult<Program> {
        let (body, strict) = self.parse_directive_prefixed_body(false, &[])?;
        if !matches!(self.cur.kind, TokenKind::Eof) {
            return Err(self.err("unexpected trailing input"));
        }
        Ok(Program { body, strict })
    }

    /// Parse a statement list, scanning a leading directive prologue for
    /// `"use strict"`. `self.strict` tracks the *effective*
    /// (inherited-or-own) strictness for the duration of the body so
    /// nested early-error checks see it; only the locally declared flag
    /// is returned for storage on the AST.
    fn parse_directive_prefixed_body(
        &mut self,
        outer_strict: bool,
        terminator: &[Punct],
    ) -> CompileResult<(Vec<Stmt>, bool)> {
        let saved = self.strict;
        self.strict = outer_strict;
        let mut body = Vec::new();
        let mut in_prologue = true;
        let mut own_strict = false;
        loop {
            if terminator.iter().any(|p| self.is_punct(*p)) || matches!(self.cur.kind, TokenKind::Eof) {
                break;
            }
            let stmt = self.parse_statement()?;
            if in_prologue {
                if let Stmt::Expr(Expr::String(s)) = &stmt {
                    if s == "use strict" {
                        own_strict = true;
                        self.strict = true;
                    }
                } else {
                    in_prologue = false;
                }
            }
            body.push(stmt);
        }
        self.strict = saved;
        Ok((body, own_strict))
    }

    fn parse_function_common(&mut self, declaration: bool) -> CompileResult<Function> {
        let line = self.cur.line;
        self.eat_keyword(Keyword::Function)?;
        let name = if let TokenKind::Identifier(_) = self.cur.kind {
            Some(self.ident_name()?)
        } else if declaration {
            return Err(self.err("function declaration requires a name"));
        } else {
            None
        };
        self.eat_punct(Punct::LParen)?;
        let mut params = Vec::new();
        while !self.is_punct(Punct::RParen) {
            params.push(self.ident_name()?);
            if self.is_punct(Punct::Comma) {
                self.advance()?;
            } else {
                break;
            }
        }
        self.eat_punct(Punct::RParen)?;
        self.eat_punct(Punct::LBrace)?;
        let (body, own_strict) = self.parse_directive_prefixed_body(self.strict, &[Punct::RBrace])?;
        self.eat_punct(Punct::RBrace)?;

        let effective = self.strict || own_strict;
        if effective {
            if params.iter().any(|p| p == "eval" || p == "arguments") {
                return Err(self.err("'eval' or 'arguments' cannot be a parameter name in strict mode"));
            }
            let mut seen = std::collections::HashSet::new();
            if !params.iter().all(|p| seen.insert(p.clone())) {
                return Err(self.err("duplicate parameter name in strict mode"));
            }
        }

        Ok(Function { name, params, body, own_strict, line })
    }

    // ---- statements ----

    fn parse_statement(&mut self) -> CompileResult<Stmt> {
        match &self.cur.kind {
            TokenKind::Punct(Punct::LBrace) => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::Punct(Punct::Semi) => {
                self.advance()?;
                Ok(Stmt::Empty)
            }
            TokenKind::Keyword(Keyword::Var) => self.parse_var_statement(),
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::While) => self.parse_while(),
            TokenKind::Keyword(Keyword::Do) => self.parse_do_while(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::Return) => self.parse_return(),
            TokenKind::Keyword(Keyword::Break) => self.parse_break_continue(true),
            TokenKind::Keyword(Keyword::Continue) => self.parse_break_continue(false),
            TokenKind::Keyword(Keyword::Throw) => self.parse_throw(),
            TokenKind::Keyword(Keyword::Try) => self.parse_try(),
            TokenKind::Keyword(Keyword::With) => self.parse_with(),
            TokenKind::Keyword(Keyword::Switch) => self.parse_switch(),
            TokenKind::Keyword(Keyword::Function) => Ok(Stmt::FunctionDecl(self.parse_function_common(true)?)),
            TokenKind::Keyword(Keyword::Debugger) => {
                self.advance()?;
                self.consume_semicolon()?;
                Ok(Stmt::Debugger)
            }
            TokenKind::Identifier(name) => {
                let name = name.clone();
                let save = self.checkpoint();
                self.advance()?;
                if self.is_punct(Punct::Colon) {
                    self.advance()?;
                    let body = Box::new(self.parse_statement()?);
                    return Ok(Stmt::Labeled { label: name, body });
                }
                self.restore(save);
                self.parse_expression_statement()
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_block(&mut self) -> CompileResult<Vec<Stmt>> {
        self.eat_punct(Punct::LBrace)?;
        let mut stmts = Vec::new();
        while !self.is_punct(Punct::RBrace) {
            stmts.push(self.parse_statement()?);
        }
        self.eat_punct(Punct::RBrace)?;
        Ok(stmts)
    }

    fn parse_var_statement(&mut self) -> CompileResult<Stmt> {
        let decls = self.parse_var_declarators(false)?;
        self.consume_semicolon()?;
        Ok(Stmt::VarDecl(decls))
    }

    fn parse_var_declarators(&mut self, no_in: bool) -> CompileResult<Vec<VarDeclarator>> {
        self.eat_keyword(Keyword::Var)?;
        let mut decls = Vec::new();
        loop {
            let name = self.ident_name()?;
            if self.strict && (name == "eval" || name == "arguments") {
                return Err(self.err("cannot declare 'eval' or 'arguments' in strict mode"));
            }
            let init = if self.is_punct(Punct::Eq_) {
                self.advance()?;
                Some(self.parse_assignment_expression(no_in)?)
            } else {
                None
            };
            decls.push(VarDeclarator { name, init });
            if self.is_punct(Punct::Comma) {
                self.advance()?;
            } else {
                break;
            }
        }
        Ok(decls)
    }

    fn parse_if(&mut self) -> CompileResult<Stmt> {
        self.eat_keyword(Keyword::If)?;
        self.eat_punct(Punct::LParen)?;
        let test = self.parse_expression(false)?;
        self.eat_punct(Punct::RParen)?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.is_keyword(Keyword::Else) {
            self.advance()?;
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If { test, consequent, alternate })
    }

    fn parse_while(&mut self) -> CompileResult<Stmt> {
        self.eat_keyword(Keyword::While)?;
        self.eat_punct(Punct::LParen)?;
        let test = self.parse_expression(false)?;
        self.eat_punct(Punct::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::While { test, body })
    }

    fn parse_do_while(&mut self) -> CompileResult<Stmt> {
        self.eat_keyword(Keyword::Do)?;
        let body = Box::new(self.parse_statement()?);
        self.eat_keyword(Keyword::While)?;
        self.eat_punct(Punct::LParen)?;
        let test = self.parse_expression(false)?;
        self.eat_punct(Punct::RParen)?;
        if self.is_punct(Punct::Semi) {
            self.advance()?;
        }
        Ok(Stmt::DoWhile { body, test })
    }

    fn parse_for(&mut self) -> CompileResult<Stmt> {
        self.eat_keyword(Keyword::For)?;
        self.eat_punct(Punct::LParen)?;

        if self.is_keyword(Keyword::Var) {
            let save = self.checkpoint();
            self.advance()?; // `var`
            let name = self.ident_name()?;
            if self.is_keyword(Keyword::In) {
                self.advance()?;
                let object = self.parse_expression(false)?;
                self.eat_punct(Punct::RParen)?;
                let body = Box::new(self.parse_statement()?);
                return Ok(Stmt::ForIn { decl_name: name, is_var_decl: true, object, body });
            }
            self.restore(save);
            let decls = self.parse_var_declarators(true)?;
            return self.finish_classic_for(Some(Stmt::VarDecl(decls)));
        }

        if self.is_punct(Punct::Semi) {
            return self.finish_classic_for(None);
        }

        let expr = self.parse_expression(true)?;
        if self.is_keyword(Keyword::In) {
            if let Expr::Ident(name) = expr {
                self.advance()?;
                let object = self.parse_expression(false)?;
                self.eat_punct(Punct::RParen)?;
                let body = Box::new(self.parse_statement()?);
                return Ok(Stmt::ForIn { decl_name: name, is_var_decl: false, object, body });
            }
            return Err(self.err("invalid for-in left-hand side"));
        }
        self.finish_classic_for(Some(Stmt::Expr(expr)))
    }

    fn finish_classic_for(&mut self, init: Option<Stmt>) -> CompileResult<Stmt> {
        self.eat_punct(Punct::Semi)?;
        let test = if self.is_punct(Punct::Semi) { None } else { Some(self.parse_expression(false)?) };
        self.eat_punct(Punct::Semi)?;
        let update = if self.is_punct(Punct::RParen) { None } else { Some(self.parse_expression(false)?) };
        self.eat_punct(Punct::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::For { init: init.map(Box::new), test, update, body })
    }

    fn parse_return(&mut self) -> CompileResult<Stmt> {
        self.eat_keyword(Keyword::Return)?;
        if self.is_punct(Punct::Semi)
            || self.is_punct(Punct::RBrace)
            || self.cur.preceded_by_newline
            || matches!(self.cur.kind, TokenKind::Eof)
        {
            self.consume_semicolon()?;
            return Ok(Stmt::Return(None));
        }
        let value = self.parse_expression(false)?;
        self.consume_semicolon()?;
        Ok(Stmt::Return(Some(value)))
    }

    fn parse_break_continue(&mut self, is_break: bool) -> CompileResult<Stmt> {
        self.advance()?; // `break` / `continue`
        let label = if !self.cur.preceded_by_newline {
            if let TokenKind::Identifier(name) = &self.cur.kind {
                let n = name.clone();
                self.advance()?;
                Some(n)
            } else {
                None
            }
        } else {
            None
        };
        self.consume_semicolon()?;
        Ok(if is_break { Stmt::Break(label) } else { Stmt::Continue(label) })
    }

    fn parse_throw(&mut self) -> CompileResult<Stmt> {
        self.eat_keyword(Keyword::Throw)?;
        if self.cur.preceded_by_newline {
            return Err(self.err("illegal newline after 'throw'"));
        }
        let value = self.parse_expression(false)?;
        self.consume_semicolon()?;
        Ok(Stmt::Throw(value))
    }

    fn parse_try(&mut self) -> CompileResult<Stmt> {
        self.eat_keyword(Keyword::Try)?;
        let block = self.parse_block()?;
        let handler = if self.is_keyword(Keyword::Catch) {
            self.advance()?;
            self.eat_punct(Punct::LParen)?;
            let param = self.ident_name()?;
            self.eat_punct(Punct::RParen)?;
            let body = self.parse_block()?;
            Some(CatchClause { param, body })
        } else {
            None
        };
        let finalizer = if self.is_keyword(Keyword::Finally) {
            self.advance()?;
            Some(self.parse_block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.err("missing catch or finally after try"));
        }
        Ok(Stmt::Try { block, handler, finalizer })
    }

    fn parse_with(&mut self) -> CompileResult<Stmt> {
        if self.strict {
            return Err(self.err("'with' statement is not allowed in strict mode"));
        }
        self.eat_keyword(Keyword::With)?;
        self.eat_punct(Punct::LParen)?;
        let object = self.parse_expression(false)?;
        self.eat_punct(Punct::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::With { object, body })
    }

    fn parse_switch(&mut self) -> CompileResult<Stmt> {
        self.eat_keyword(Keyword::Switch)?;
        self.eat_punct(Punct::LParen)?;
        let discriminant = self.parse_expression(false)?;
        self.eat_punct(Punct::RParen)?;
        self.eat_punct(Punct::LBrace)?;
        let mut cases = Vec::new();
        while !self.is_punct(Punct::RBrace) {
            let test = if self.is_keyword(Keyword::Case) {
                self.advance()?;
                let e = self.parse_expression(false)?;
                self.eat_punct(Punct::Colon)?;
                Some(e)
            } else {
                self.eat_keyword(Keyword::Default)?;
                self.eat_punct(Punct::Colon)?;
                None
            };
            let mut body = Vec::new();
            while !self.is_keyword(Keyword::Case) && !self.is_keyword(Keyword::Default) && !self.is_punct(Punct::RBrace)
            {
                body.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        self.eat_punct(Punct::RBrace)?;
        Ok(Stmt::Switch { discriminant, cases })
    }

    fn parse_expression_statement(&mut self) -> CompileResult<Stmt> {
        let expr = self.parse_expression(false)?;
        self.consume_semicolon()?;
        Ok(Stmt::Expr(expr))
    }

    // ---- expressions ----

    fn parse_expression(&mut self, no_in: bool) -> CompileResult<Expr> {
        let first = self.parse_assignment_expression(no_in)?;
        if self.is_punct(Punct::Comma) {
            let mut exprs = vec![first];
            while self.is_punct(Punct::Comma) {
                self.advance()?;
                exprs.push(self.parse_assignment_expression(no_in)?);
            }
            return Ok(Expr::Sequence(exprs));
        }
        Ok(first)
    }

    fn parse_assignment_expression(&mut self, no_in: bool) -> CompileResult<Expr> {
        let left = self.parse_conditional(no_in)?;
        let op = match &self.cur.kind {
            TokenKind::Punct(Punct::Eq_) => Some(AssignOp::Assign),
            TokenKind::Punct(Punct::PlusEq) => Some(AssignOp::Add),
            TokenKind::Punct(Punct::MinusEq) => Some(AssignOp::Sub),
            TokenKind::Punct(Punct::StarEq) => Some(AssignOp::Mul),
            TokenKind::Punct(Punct::SlashEq) => Some(AssignOp::Div),
            TokenKind::Punct(Punct::PercentEq) => Some(AssignOp::Mod),
            TokenKind::Punct(Punct::AmpEq) => Some(AssignOp::BitAnd),
            TokenKind::Punct(Punct::PipeEq) => Some(AssignOp::BitOr),
            TokenKind::Punct(Punct::CaretEq) => Some(AssignOp::BitXor),
            TokenKind::Punct(Punct::ShlEq) => Some(AssignOp::Shl),
            TokenKind::Punct(Punct::ShrEq) => Some(AssignOp::Shr),
            TokenKind::Punct(Punct::UshrEq) => Some(AssignOp::Ushr),
            _ => None,
        };
        let Some(op) = op else { return Ok(left) };
        if !is_assignment_target(&left) {
            return Err(self.err("invalid assignment target"));
        }
        self.check_strict_assignment_target(&left)?;
        self.advance()?;
        let value = self.parse_assignment_expression(no_in)?;
        Ok(Expr::Assign { op, target: Box::new(left), value: Box::new(value) })
    }

    fn check_strict_assignment_target(&self, target: &Expr) -> CompileResult<()> {
        if self.strict {
            if let Expr::Ident(name) = target {
                if name == "eval" || name == "arguments" {
                    return Err(self.err("cannot assign to 'eval' or 'arguments' in strict mode"));
                }
            }
        }
        Ok(())
    }

    fn parse_conditional(&mut self, no_in: bool) -> CompileResult<Expr> {
        let test = self.parse_binary(0, no_in)?;
        if self.is_punct(Punct::Question) {
            self.advance()?;
            let consequent = self.parse_assignment_expression(false)?;
            self.eat_punct(Punct::Colon)?;
            let alternate = self.parse_assignment_expression(no_in)?;
            return Ok(Expr::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            });
        }
        Ok(test)
    }

    fn binop_info(&self, no_in: bool) -> Option<(u8, BinKind)> {
        use BinKind::*;
        Some(match &self.cur.kind {
            TokenKind::Punct(Punct::PipePipe) => (1, Logical(LogicalOp::Or)),
            TokenKind::Punct(Punct::AmpAmp) => (2, Logical(LogicalOp::And)),
            TokenKind::Punct(Punct::Pipe) => (3, Bin(BinOp::BitOr)),
            TokenKind::Punct(Punct::Caret) => (4, Bin(BinOp::BitXor)),
            TokenKind::Punct(Punct::Amp) => (5, Bin(BinOp::BitAnd)),
            TokenKind::Punct(Punct::EqEq) => (6, Bin(BinOp::Eq)),
            TokenKind::Punct(Punct::NotEq) => (6, Bin(BinOp::Ne)),
            TokenKind::Punct(Punct::EqEqEq) => (6, Bin(BinOp::StrictEq)),
            TokenKind::Punct(Punct::NotEqEq) => (6, Bin(BinOp::StrictNe)),
            TokenKind::Punct(Punct::Lt) => (7, Bin(BinOp::Lt)),
            TokenKind::Punct(Punct::Le) => (7, Bin(BinOp::Le)),
            TokenKind::Punct(Punct::Gt) => (7, Bin(BinOp::Gt)),
            TokenKind::Punct(Punct::Ge) => (7, Bin(BinOp::Ge)),
            TokenKind::Keyword(Keyword::Instanceof) => (7, Bin(BinOp::InstanceOf)),
            TokenKind::Keyword(Keyword::In) if !no_in => (7, Bin(BinOp::In)),
            TokenKind::Punct(Punct::Shl) => (8, Bin(BinOp::Shl)),
            TokenKind::Punct(Punct::Shr) => (8, Bin(BinOp::Shr)),
            TokenKind::Punct(Punct::Ushr) => (8, Bin(BinOp::Ushr)),
            TokenKind::Punct(Punct::Plus) => (9, Bin(BinOp::Add)),
            TokenKind::Punct(Punct::Minus) => (9, Bin(BinOp::Sub)),
            TokenKind::Punct(Punct::Star) => (10, Bin(BinOp::Mul)),
            TokenKind::Punct(Punct::Slash) => (10, Bin(BinOp::Div)),
            TokenKind::Punct(Punct::Percent) => (10, Bin(BinOp::Mod)),
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_prec: u8, no_in: bool) -> CompileResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let Some((prec, kind)) = self.binop_info(no_in) else { break };
            if prec < min_prec {
                break;
            }
            self.advance()?;
            let right = self.parse_binary(prec + 1, no_in)?;
            left = match kind {
                BinKind::Bin(op) => Expr::Binary { op, left: Box::new(left), right: Box::new(right) },
                BinKind::Logical(op) => Expr::Logical { op, left: Box::new(left), right: Box::new(right) },
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> CompileResult<Expr> {
        let op = match &self.cur.kind {
            TokenKind::Punct(Punct::Plus) => Some(UnaryOp::Plus),
            TokenKind::Punct(Punct::Minus) => Some(UnaryOp::Neg),
            TokenKind::Punct(Punct::Bang) => Some(UnaryOp::Not),
            TokenKind::Punct(Punct::Tilde) => Some(UnaryOp::BitNot),
            TokenKind::Keyword(Keyword::Typeof) => Some(UnaryOp::TypeOf),
            TokenKind::Keyword(Keyword::Void) => Some(UnaryOp::Void),
            TokenKind::Keyword(Keyword::Delete) => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            self.advance()?;
            let arg = self.parse_unary()?;
            return Ok(Expr::Unary { op, arg: Box::new(arg) });
        }
        if self.is_punct(Punct::PlusPlus) || self.is_punct(Punct::MinusMinus) {
            let op = if self.is_punct(Punct::PlusPlus) { UpdateOp::Increment } else { UpdateOp::Decrement };
            self.advance()?;
            let arg = self.parse_unary()?;
            if !is_assignment_target(&arg) {
                return Err(self.err("invalid update expression target"));
            }
            return Ok(Expr::Update { op, arg: Box::new(arg), prefix: true });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> CompileResult<Expr> {
        let expr = self.parse_call_member(true)?;
        if !self.cur.preceded_by_newline && (self.is_punct(Punct::PlusPlus) || self.is_punct(Punct::MinusMinus)) {
            if !is_assignment_target(&expr) {
                return Err(self.err("invalid update expression target"));
            }
            let op = if self.is_punct(Punct::PlusPlus) { UpdateOp::Increment } else { UpdateOp::Decrement };
            self.advance()?;
            return Ok(Expr::Update { op, arg: Box::new(expr), prefix: false });
        }
        Ok(expr)
    }

    /// `allow_call`: `false` while parsing a `new`'s callee, where a
    /// trailing `(...)` belongs to the `new` expression, not a nested
    /// call on the callee.
    fn parse_call_member(&mut self, allow_call: bool) -> CompileResult<Expr> {
        let mut expr = if self.is_keyword(Keyword::New) {
            self.advance()?;
            let callee = self.parse_call_member(false)?;
            let args = if self.is_punct(Punct::LParen) { self.parse_arguments()? } else { Vec::new() };
            Expr::Call { callee: Box::new(callee), args, is_new: true }
        } else {
            self.parse_primary()?
        };
        loop {
            if self.is_punct(Punct::Dot) {
                self.advance()?;
                let name = self.ident_name()?;
                expr = Expr::Member { object: Box::new(expr), property: Box::new(Expr::String(name)), computed: false };
            } else if self.is_punct(Punct::LBracket) {
                self.advance()?;
                let key = self.parse_expression(false)?;
                self.eat_punct(Punct::RBracket)?;
                expr = Expr::Member { object: Box::new(expr), property: Box::new(key), computed: true };
            } else if allow_call && self.is_punct(Punct::LParen) {
                let args = self.parse_arguments()?;
                expr = Expr::Call { callee: Box::new(expr), args, is_new: false };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_arguments(&mut self) -> CompileResult<Vec<Expr>> {
        self.eat_punct(Punct::LParen)?;
        let mut args = Vec::new();
        while !self.is_punct(Punct::RParen) {
            args.push(self.parse_assignment_expression(false)?);
            if self.is_punct(Punct::Comma) {
                self.advance()?;
            } else {
                break;
            }
        }
        self.eat_punct(Punct::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> CompileResult<Expr> {
        match self.cur.kind.clone() {
            TokenKind::Number(n) => {
                self.advance()?;
                Ok(Expr::Number(n))
            }
            TokenKind::String(s) => {
                self.advance()?;
                Ok(Expr::String(s))
            }
            TokenKind::Regex { pattern, flags } => {
                self.advance()?;
                Ok(Expr::Regex { pattern, flags })
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance()?;
                Ok(Expr::Boolean(true))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance()?;
                Ok(Expr::Boolean(false))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance()?;
                Ok(Expr::Null)
            }
            TokenKind::Keyword(Keyword::This) => {
                self.advance()?;
                Ok(Expr::This)
            }
            TokenKind::Keyword(Keyword::Function) => Ok(Expr::Function(Box::new(self.parse_function_common(false)?))),
            TokenKind::Identifier(name) => {
                self.advance()?;
                Ok(Expr::Ident(name))
            }
            TokenKind::Punct(Punct::LParen) => {
                self.advance()?;
                let expr = self.parse_expression(false)?;
                self.eat_punct(Punct::RParen)?;
                Ok(expr)
            }
            TokenKind::Punct(Punct::LBracket) => self.parse_array_literal(),
            TokenKind::Punct(Punct::LBrace) => self.parse_object_literal(),
            _ => Err(self.err("unexpected token")),
        }
    }

    fn parse_array_literal(&mut self) -> CompileResult<Expr> {
        self.eat_punct(Punct::LBracket)?;
        let mut elements = Vec::new();
        while !self.is_punct(Punct::RBracket) {
            if self.is_punct(Punct::Comma) {
                elements.push(None);
                self.advance()?;
                continue;
            }
            elements.push(Some(self.parse_assignment_expression(false)?));
            if self.is_punct(Punct::Comma) {
                self.advance()?;
            } else {
                break;
            }
        }
        self.eat_punct(Punct::RBracket)?;
        Ok(Expr::Array(elements))
    }

    fn parse_property_key(&mut self) -> CompileResult<PropertyKey> {
        match self.cur.kind.clone() {
            TokenKind::Identifier(name) => {
                self.advance()?;
                Ok(PropertyKey::Ident(name))
            }
            TokenKind::Keyword(kw) => {
                let name = keyword_text(kw);
                self.advance()?;
                Ok(PropertyKey::Ident(name.to_string()))
            }
            TokenKind::String(s) => {
                self.advance()?;
                Ok(PropertyKey::String(s))
            }
            TokenKind::Number(n) => {
                self.advance()?;
                Ok(PropertyKey::Number(n))
            }
            _ => Err(self.err("expected property name")),
        }
    }

    fn parse_object_literal(&mut self) -> CompileResult<Expr> {
        self.eat_punct(Punct::LBrace)?;
        let mut props = Vec::new();
        while !self.is_punct(Punct::RBrace) {
            if (self.is_ident_text("get") || self.is_ident_text("set")) && !self.peek_is_property_separator() {
                let is_getter = self.is_ident_text("get");
                self.advance()?;
                let key = self.parse_property_key()?;
                self.eat_punct(Punct::LParen)?;
                if is_getter {
                    self.eat_punct(Punct::RParen)?;
                    self.eat_punct(Punct::LBrace)?;
                    let (body, own_strict) = self.parse_directive_prefixed_body(self.strict, &[Punct::RBrace])?;
                    self.eat_punct(Punct::RBrace)?;
                    let func = Function { name: None, params: vec![], body, own_strict, line: self.cur.line };
                    props.push(ObjectProperty::Getter { key, body: Box::new(func) });
                } else {
                    let param = self.ident_name()?;
                    self.eat_punct(Punct::RParen)?;
                    self.eat_punct(Punct::LBrace)?;
                    let (body, own_strict) = self.parse_directive_prefixed_body(self.strict, &[Punct::RBrace])?;
                    self.eat_punct(Punct::RBrace)?;
                    let func =
                        Function { name: None, params: vec![param.clone()], body, own_strict, line: self.cur.line };
                    props.push(ObjectProperty::Setter { key, param, body: Box::new(func) });
                }
            } else {
                let key = self.parse_property_key()?;
                self.eat_punct(Punct::Colon)?;
                let value = self.parse_assignment_expression(false)?;
                props.push(ObjectProperty::Data { key, value });
            }
            if self.is_punct(Punct::Comma) {
                self.advance()?;
            } else {
                break;
            }
        }
        self.eat_punct(Punct::RBrace)?;
        Ok(Expr::Object(props))
    }

    fn is_ident_text(&self, s: &str) -> bool {
        matches!(&self.cur.kind, TokenKind::Identifier(n) if n == s)
    }

    /// Whether the token after the current `get`/`set`-looking identifier
    /// is the property separator, meaning `get`/`set` is being used as a
    /// plain property name rather than an accessor keyword.
    fn peek_is_property_separator(&mut self) -> bool {
        let save = self.checkpoint();
        let _ = self.advance();
        let result = self.is_punct(Punct::Colon) || self.is_punct(Punct::Comma) || self.is_punct(Punct::RBrace);
        self.restore(save);
        result
    }
}

enum BinKind {
    Bin(BinOp),
    Logical(LogicalOp),
}

fn is_assignment_target(expr: &Expr) -> bool {
    matches!(expr, Expr::Ident(_) | Expr::Member { .. })
}

fn keyword_text(kw: Keyword) -> &'static str {
    use Keyword::*;
    match kw {
        Break => "break", Case => "case", Catch => "catch", Continue => "continue",
        Debugger => "debugger", Default => "default", Delete => "delete", Do => "do",
        Else => "else", Finally => "finally", For => "for", Function => "function",
        If => "if", In => "in", Instanceof => "instanceof", New => "new",
        Return => "return", Switch => "switch", This => "this", Throw => "throw",
        Try => "try", Typeof => "typeof", Var => "var", Void => "void", While => "while",
        With => "with", Null => "null", True => "true", False => "false", FutureReserved => "reserved",
    }
}

/// Parse a whole program (script or direct-eval source text).
pub fn parse(src: &str) -> CompileResult<Program> {
    let mut parser = Parser::new(src)?;
    parser.parse_program()
}

// =========================================================================
// Code generation
// =========================================================================

struct LoopCtx {
    labels: Vec<String>,
    break_labels: Vec<Label>,
    continue_target: Option<usize>,
    is_for_in: bool,
}

struct CodeGen {
    builder: CodeBuilder,
    strict: bool,
    temp_counter: u32,
    loops: Vec<LoopCtx>,
}

impl CodeGen {
    fn new(strict: bool) -> Self {
        let mut builder = CodeBuilder::new();
        // Literal indices are encoded before every literal the function
        // will ever push is known, so a single-pass emitter can't safely
        // narrow to 8-bit indices; always use the wide encoding.
        builder.set_wide_literals(true);
        Self { builder, strict, temp_counter: 0, loops: Vec::new() }
    }

    fn temp_name(&mut self) -> String {
        self.temp_counter += 1;
        format!("@t{}", self.temp_counter)
    }

    // ---- statements ----

    fn compile_stmts(&mut self, stmts: &[Stmt]) -> CompileResult<()> {
        for s in stmts {
            self.compile_stmt(s, &[])?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt, labels: &[String]) -> CompileResult<()> {
        match stmt {
            Stmt::Expr(e) => {
                self.compile_expr(e)?;
                self.builder.pop();
            }
            Stmt::VarDecl(decls) => {
                for decl in decls {
                    if let Some(init) = &decl.init {
                        self.compile_expr(init)?;
                        let idx = self.builder.intern_string(&decl.name);
                        self.builder.op_with_literal(Opcode::AssignIdent, idx);
                        self.builder.pop();
                    }
                }
            }
            Stmt::Block(stmts) => self.compile_stmts(stmts)?,
            Stmt::Empty | Stmt::Debugger | Stmt::FunctionDecl(_) => {}
            Stmt::If { test, consequent, alternate } => {
                self.compile_expr(test)?;
                let else_label = self.builder.branch(Opcode::BranchIfFalse);
                self.compile_stmt(consequent, &[])?;
                if let Some(alt) = alternate {
                    let end_label = self.builder.branch(Opcode::JumpForward);
                    self.builder.patch_to_here(else_label);
                    self.compile_stmt(alt, &[])?;
                    self.builder.patch_to_here(end_label);
                } else {
                    self.builder.patch_to_here(else_label);
                }
            }
            Stmt::While { test, body } => self.compile_while(test, body, labels)?,
            Stmt::DoWhile { body, test } => self.compile_do_while(body, test, labels)?,
            Stmt::For { init, test, update, body } => self.compile_for(init, test, update, body, labels)?,
            Stmt::ForIn { decl_name, object, body, .. } => self.compile_for_in(decl_name, object, body, labels)?,
            Stmt::Return(value) => {
                match value {
                    Some(e) => self.compile_expr(e)?,
                    None => self.builder.push_simple(Opcode::PushUndefined),
                }
                self.builder.ret();
            }
            Stmt::Break(label) => self.compile_break(label.as_deref())?,
            Stmt::Continue(label) => self.compile_continue(label.as_deref())?,
            Stmt::Throw(e) => {
                self.compile_expr(e)?;
                self.builder.throw();
            }
            Stmt::Try { block, handler, finalizer } => self.compile_try(block, handler, finalizer)?,
            Stmt::With { object, body } => {
                self.compile_expr(object)?;
                self.builder.ext_op(ExtendedOpcode::WithEnter, 0, 1);
                self.compile_stmt(body, &[])?;
                self.builder.ext_op(ExtendedOpcode::WithExit, 0, 0);
            }
            Stmt::Labeled { label, body } => {
                let mut all_labels = vec![label.clone()];
                all_labels.extend_from_slice(labels);
                if matches!(
                    body.as_ref(),
                    Stmt::While { .. } | Stmt::DoWhile { .. } | Stmt::For { .. } | Stmt::ForIn { .. } | Stmt::Switch { .. }
                ) {
                    self.compile_stmt(body, &all_labels)?;
                } else {
                    self.loops.push(LoopCtx {
                        labels: all_labels,
                        break_labels: Vec::new(),
                        continue_target: None,
                        is_for_in: false,
                    });
                    self.compile_stmt(body, &[])?;
                    let ctx = self.loops.pop().unwrap();
                    for label in ctx.break_labels {
                        self.builder.patch_to_here(label);
                    }
                }
            }
            Stmt::Switch { discriminant, cases } => self.compile_switch(discriminant, cases, labels)?,
        }
        Ok(())
    }

    fn compile_while(&mut self, test: &Expr, body: &Stmt, labels: &[String]) -> CompileResult<()> {
        let start = self.builder.pos();
        self.compile_expr(test)?;
        let exit = self.builder.branch(Opcode::BranchIfFalse);
        self.loops.push(LoopCtx {
            labels: labels.to_vec(),
            break_labels: Vec::new(),
            continue_target: Some(start),
            is_for_in: false,
        });
        self.compile_stmt(body, &[])?;
        let ctx = self.loops.pop().unwrap();
        self.builder.jump_backward_to(start);
        self.builder.patch_to_here(exit);
        for label in ctx.break_labels {
            self.builder.patch_to_here(label);
        }
        Ok(())
    }

    /// `continue` inside a `do`/`while` body must re-run the test, not
    /// jump back to the top of the body, so the continue target is the
    /// test's position, patched in once the body has been compiled.
    fn compile_do_while(&mut self, body: &Stmt, test: &Expr, labels: &[String]) -> CompileResult<()> {
        let body_start = self.builder.pos();
        self.loops.push(LoopCtx {
            labels: labels.to_vec(),
            break_labels: Vec::new(),
            continue_target: None,
            is_for_in: false,
        });
        let continue_slot = self.loops.len() - 1;
        // `continue` jumps collected while compiling the body are forward
        // references to the not-yet-emitted test; patched below once the
        // test's position is known.
        let mut pending_continues: Vec<Label> = Vec::new();
        std::mem::swap(&mut pending_continues, &mut self.loops[continue_slot].break_labels);
        self.compile_stmt(body, &[])?;
        let test_pos = self.builder.pos();
        self.compile_expr(test)?;
        let exit = self.builder.branch(Opcode::BranchIfFalse);
        self.builder.jump_backward_to(body_start);
        self.builder.patch_to_here(exit);
        let mut ctx = self.loops.remove(continue_slot);
        std::mem::swap(&mut pending_continues, &mut ctx.break_labels);
        let _ = test_pos;
        for label in ctx.break_labels {
            self.builder.patch_to_here(label);
        }
        Ok(())
    }

    fn compile_for(
        &mut self,
        init: &Option<Box<Stmt>>,
        test: &Option<Expr>,
        update: &Option<Expr>,
        body: &Stmt,
        labels: &[String],
    ) -> CompileResult<()> {
        if let Some(init) = init {
            self.compile_stmt(init, &[])?;
        }
        let test_pos = self.builder.pos();
        let exit = if let Some(test) = test {
            self.compile_expr(test)?;
            Some(self.builder.branch(Opcode::BranchIfFalse))
        } else {
            None
        };
        self.loops.push(LoopCtx {
            labels: labels.to_vec(),
            break_labels: Vec::new(),
            continue_target: None,
            is_for_in: false,
        });
        self.compile_stmt(body, &[])?;
        // `continue` must run the update before re-testing, so it jumps
        // here, not back to `test_pos` directly.
        let update_pos = self.builder.pos();
        if let Some(update) = update {
            self.compile_expr(update)?;
            self.builder.pop();
        }
        self.builder.jump_backward_to(test_pos);
        if let Some(exit) = exit {
            self.builder.patch_to_here(exit);
        }
        let ctx = self.loops.pop().unwrap();
        for label in ctx.break_labels {
            self.builder.patch_to_here(label);
        }
        let _ = update_pos;
        Ok(())
    }

    fn compile_for_in(&mut self, decl_name: &str, object: &Expr, body: &Stmt, labels: &[String]) -> CompileResult<()> {
        self.compile_expr(object)?;
        self.builder.ext_op(ExtendedOpcode::ForInStart, 0, 1);
        let start = self.builder.pos();
        let exit = self.builder.ext_branch(ExtendedOpcode::ForInNext, 1, 0);
        self.loops.push(LoopCtx {
            labels: labels.to_vec(),
            break_labels: Vec::new(),
            continue_target: Some(start),
            is_for_in: true,
        });
        let name_idx = self.builder.intern_string(decl_name);
        self.builder.op_with_literal(Opcode::AssignIdent, name_idx);
        self.builder.pop();
        self.compile_stmt(body, &[])?;
        let ctx = self.loops.pop().unwrap();
        self.builder.jump_backward_to(start);
        self.builder.patch_to_here(exit);
        for label in ctx.break_labels {
            self.builder.patch_to_here(label);
        }
        Ok(())
    }

    fn compile_break(&mut self, label: Option<&str>) -> CompileResult<()> {
        let idx = match label {
            Some(name) => self
                .loops
                .iter()
                .rposition(|c| c.labels.iter().any(|l| l == name))
                .ok_or_else(|| CompileError::early_error(format!("undefined label '{name}'"), 0, 0))?,
            None => self
                .loops
                .len()
                .checked_sub(1)
                .ok_or_else(|| CompileError::early_error("'break' outside of a loop or switch", 0, 0))?,
        };
        for ctx in &self.loops[idx..] {
            if ctx.is_for_in {
                self.builder.ext_op(ExtendedOpcode::ForInEnd, 0, 0);
            }
        }
        let label = self.builder.branch(Opcode::JumpForward);
        self.loops[idx].break_labels.push(label);
        Ok(())
    }

    fn compile_continue(&mut self, label: Option<&str>) -> CompileResult<()> {
        let idx = match label {
            Some(name) => self
                .loops
                .iter()
                .rposition(|c| c.labels.iter().any(|l| l == name) && c.continue_target.is_some())
                .ok_or_else(|| CompileError::early_error(format!("undefined label '{name}'"), 0, 0))?,
            None => self
                .loops
                .iter()
                .rposition(|c| c.continue_target.is_some())
                .ok_or_else(|| CompileError::early_error("'continue' outside of a loop", 0, 0))?,
        };
        for ctx in &self.loops[idx + 1..] {
            if ctx.is_for_in {
                self.builder.ext_op(ExtendedOpcode::ForInEnd, 0, 0);
            }
        }
        match self.loops[idx].continue_target {
            Some(target) => self.builder.jump_backward_to(target),
            None => {
                // `do`/`while`'s continue target (the test) isn't known
                // until the body finishes compiling; record a forward
                // branch in `break_labels` for `compile_do_while` to
                // retarget once it does.
                let label = self.builder.branch(Opcode::JumpForward);
                self.loops[idx].break_labels.push(label);
            }
        }
        Ok(())
    }

    fn compile_try(
        &mut self,
        block: &[Stmt],
        handler: &Option<CatchClause>,
        finalizer: &Option<Vec<Stmt>>,
    ) -> CompileResult<()> {
        let (outer_catch_at, outer_finally_at) = self.builder.try_start();
        let inner = if handler.is_some() { Some(self.builder.try_start()) } else { None };

        self.compile_stmts(block)?;

        if let (Some(h), Some((inner_catch_at, inner_finally_at))) = (handler, inner) {
            self.builder.catch_op();
            let skip_catch = self.builder.branch(Opcode::JumpForward);
            let catch_pc = self.builder.pos();
            self.builder.patch_try_target(inner_catch_at, Some(catch_pc));
            self.builder.patch_try_target(inner_finally_at, None);
            let param_idx = self.builder.intern_string(&h.param);
            self.builder.op_with_literal(Opcode::AssignIdent, param_idx);
            self.builder.pop();
            self.compile_stmts(&h.body)?;
            self.builder.patch_to_here(skip_catch);
        }

        self.builder.catch_op();

        if let Some(fin) = finalizer {
            let fin_start = self.builder.pos();
            self.builder.patch_try_target(outer_catch_at, None);
            self.builder.patch_try_target(outer_finally_at, Some(fin_start));
            let len_at = self.builder.finally_start();
            let body_start = self.builder.pos();
            self.compile_stmts(fin)?;
            let body_len = self.builder.pos() - body_start;
            self.builder.finally_patch_len(len_at, body_len);
        } else {
            self.builder.patch_try_target(outer_catch_at, None);
            self.builder.patch_try_target(outer_finally_at, None);
        }
        Ok(())
    }

    /// Forward-label dispatch-then-bodies: every `case` test is compared
    /// against the discriminant first (each a conditional branch to that
    /// case's body), followed by an unconditional jump to `default` (or
    /// past the switch if there is none); bodies are then emitted in
    /// source order so unlabeled fallthrough between cases is just
    /// adjacent bytecode, exactly as ES5.1 describes it.
    fn compile_switch(&mut self, discriminant: &Expr, cases: &[SwitchCase], labels: &[String]) -> CompileResult<()> {
        self.compile_expr(discriminant)?;
        let temp = self.temp_name();
        let temp_idx = self.builder.intern_string(&temp);
        self.builder.op_with_literal(Opcode::AssignIdent, temp_idx);
        self.builder.pop();

        self.loops.push(LoopCtx {
            labels: labels.to_vec(),
            break_labels: Vec::new(),
            continue_target: None,
            is_for_in: false,
        });

        let mut body_labels: Vec<Option<Label>> = Vec::with_capacity(cases.len());
        let mut default_label: Option<Label> = None;
        for case in cases {
            match &case.test {
                Some(test) => {
                    self.builder.op_with_literal(Opcode::PushIdent, temp_idx);
                    self.compile_expr(test)?;
                    self.builder.op(Opcode::StrictEq);
                    body_labels.push(Some(self.builder.branch(Opcode::BranchIfTrue)));
                }
                None => {
                    default_label = Some(self.builder.branch(Opcode::JumpForward));
                    body_labels.push(None);
                }
            }
        }
        let no_match_exit =
            if default_label.is_none() { Some(self.builder.branch(Opcode::JumpForward)) } else { None };

        for (case, body_label) in cases.iter().zip(body_labels) {
            match body_label {
                Some(label) => self.builder.patch_to_here(label),
                None => self.builder.patch_to_here(default_label.take().unwrap()),
            }
            self.compile_stmts(&case.body)?;
        }

        if let Some(exit) = no_match_exit {
            self.builder.patch_to_here(exit);
        }

        let ctx = self.loops.pop().unwrap();
        for label in ctx.break_labels {
            self.builder.patch_to_here(label);
        }
        Ok(())
    }

    // ---- expressions ----

    fn compile_expr(&mut self, expr: &Expr) -> CompileResult<()> {
        match expr {
            Expr::Number(n) => self.builder.push_number(*n),
            Expr::String(s) => {
                let idx = self.builder.intern_string(s);
                self.builder.push_literal(idx);
            }
            Expr::Boolean(true) => self.builder.push_simple(Opcode::PushTrue),
            Expr::Boolean(false) => self.builder.push_simple(Opcode::PushFalse),
            Expr::Null => self.builder.push_simple(Opcode::PushNull),
            Expr::This => self.builder.push_simple(Opcode::PushThis),
            Expr::Ident(name) if name == "arguments" => {
                self.builder.ext_op(ExtendedOpcode::PushArguments, 1, 0);
            }
            Expr::Ident(name) => {
                let idx = self.builder.intern_string(name);
                self.builder.push_ident(idx);
            }
            Expr::Regex { .. } => {
                return Err(CompileError::unsupported("regular expression literals"));
            }
            Expr::Function(func) => self.compile_function_expr(func)?,
            Expr::Array(elements) => {
                self.builder.op(Opcode::CreateArray);
                for el in elements {
                    match el {
                        Some(e) => self.compile_expr(e)?,
                        None => self.builder.push_simple(Opcode::PushElision),
                    }
                    self.builder.op(Opcode::ArrayAppend);
                }
            }
            Expr::Object(props) => self.compile_object_literal(props)?,
            Expr::Unary { op, arg } => self.compile_unary(*op, arg)?,
            Expr::Update { op, arg, prefix } => self.compile_update(*op, arg, *prefix)?,
            Expr::Binary { op, left, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.compile_binop(*op);
            }
            Expr::Logical { op, left, right } => self.compile_logical(*op, left, right)?,
            Expr::Assign { op, target, value } => self.compile_assign(*op, target, value)?,
            Expr::Conditional { test, consequent, alternate } => {
                self.compile_expr(test)?;
                let else_label = self.builder.branch(Opcode::BranchIfFalse);
                self.compile_expr(consequent)?;
                let end_label = self.builder.branch(Opcode::JumpForward);
                self.builder.patch_to_here(else_label);
                self.compile_expr(alternate)?;
                self.builder.patch_to_here(end_label);
            }
            Expr::Call { callee, args, is_new } => self.compile_call(callee, args, *is_new)?,
            Expr::Member { object, property, computed } => self.compile_member_get(object, property, *computed)?,
            Expr::Sequence(exprs) => {
                for (i, e) in exprs.iter().enumerate() {
                    self.compile_expr(e)?;
                    if i + 1 < exprs.len() {
                        self.builder.pop();
                    }
                }
            }
        }
        Ok(())
    }

    fn compile_binop(&mut self, op: BinOp) {
        match op {
            BinOp::Add => self.builder.add(),
            BinOp::Sub => self.builder.sub(),
            BinOp::Mul => self.builder.op(Opcode::Mul),
            BinOp::Div => self.builder.op(Opcode::Div),
            BinOp::Mod => self.builder.op(Opcode::Mod),
            BinOp::BitAnd => self.builder.op(Opcode::BitAnd),
            BinOp::BitOr => self.builder.op(Opcode::BitOr),
            BinOp::BitXor => self.builder.op(Opcode::BitXor),
            BinOp::Shl => self.builder.op(Opcode::Shl),
            BinOp::Shr => self.builder.op(Opcode::Shr),
            BinOp::Ushr => self.builder.op(Opcode::Ushr),
            BinOp::Eq => self.builder.op(Opcode::Eq),
            BinOp::StrictEq => self.builder.op(Opcode::StrictEq),
            BinOp::Ne => self.builder.op(Opcode::Ne),
            BinOp::StrictNe => self.builder.op(Opcode::StrictNe),
            BinOp::Lt => self.builder.op(Opcode::Lt),
            BinOp::Le => self.builder.op(Opcode::Le),
            BinOp::Gt => self.builder.op(Opcode::Gt),
            BinOp::Ge => self.builder.op(Opcode::Ge),
            BinOp::InstanceOf => self.builder.op(Opcode::InstanceOf),
            BinOp::In => self.builder.op(Opcode::In),
        }
    }

    fn compile_logical(&mut self, op: LogicalOp, left: &Expr, right: &Expr) -> CompileResult<()> {
        self.compile_expr(left)?;
        let short_circuit_op = match op {
            LogicalOp::And => Opcode::BranchIfLogicalFalse,
            LogicalOp::Or => Opcode::BranchIfLogicalTrue,
        };
        let label = self.builder.branch(short_circuit_op);
        self.builder.pop();
        self.compile_expr(right)?;
        self.builder.patch_to_here(label);
        Ok(())
    }

    fn compile_unary(&mut self, op: UnaryOp, arg: &Expr) -> CompileResult<()> {
        match op {
            UnaryOp::TypeOf => {
                if let Expr::Ident(name) = arg {
                    let idx = self.builder.intern_string(name);
                    self.builder.type_of_ident(idx);
                } else {
                    self.compile_expr(arg)?;
                    self.builder.op(Opcode::TypeOf);
                }
            }
            UnaryOp::Neg => {
                if let Expr::Ident(name) = arg {
                    let idx = self.builder.intern_string(name);
                    self.builder.push_ident(idx);
                    self.builder.neg();
                } else {
                    self.compile_expr(arg)?;
                    self.builder.neg();
                }
            }
            UnaryOp::Plus => {
                self.compile_expr(arg)?;
                self.builder.op(Opcode::ToNumber);
            }
            UnaryOp::Not => {
                self.compile_expr(arg)?;
                self.builder.op(Opcode::Not);
            }
            UnaryOp::BitNot => {
                self.compile_expr(arg)?;
                self.builder.op(Opcode::BitNot);
            }
            UnaryOp::Void => {
                self.compile_expr(arg)?;
                self.builder.pop();
                self.builder.push_simple(Opcode::PushUndefined);
            }
            UnaryOp::Delete => self.compile_delete(arg)?,
        }
        Ok(())
    }

    fn compile_delete(&mut self, arg: &Expr) -> CompileResult<()> {
        match arg {
            Expr::Member { object, property, computed: false } => {
                self.compile_expr(object)?;
                let Expr::String(name) = property.as_ref() else {
                    return Err(CompileError::internal("non-computed member property must be a string"));
                };
                let idx = self.builder.intern_string(name);
                self.builder.ext_op_with_literal(ExtendedOpcode::DeletePropLiteral, idx, 1, 1);
            }
            Expr::Member { computed: true, .. } => {
                return Err(CompileError::unsupported("delete with a computed property key"));
            }
            _ => {
                // `delete` of anything else (an identifier, a literal, a
                // call result) evaluates its operand and always yields
                // `true` per ES5.1 §11.4.1.
                self.compile_expr(arg)?;
                self.builder.pop();
                self.builder.push_simple(Opcode::PushTrue);
            }
        }
        Ok(())
    }

    fn compile_update(&mut self, op: UpdateOp, arg: &Expr, prefix: bool) -> CompileResult<()> {
        match arg {
            Expr::Ident(name) => {
                let idx = self.builder.intern_string(name);
                self.builder.push_ident(idx);
                self.builder.op(Opcode::ToNumber);
                let old_idx = if !prefix {
                    let temp = self.temp_name();
                    let temp_idx = self.builder.intern_string(&temp);
                    self.builder.op_with_literal(Opcode::AssignIdent, temp_idx);
                    Some(temp_idx)
                } else {
                    None
                };
                self.apply_update_delta(op);
                self.builder.op_with_literal(Opcode::AssignIdent, idx);
                if let Some(old_idx) = old_idx {
                    self.builder.pop();
                    self.builder.op_with_literal(Opcode::PushIdent, old_idx);
                }
            }
            Expr::Member { object, property, computed: false } => {
                let Expr::String(name) = property.as_ref() else {
                    return Err(CompileError::internal("non-computed member property must be a string"));
                };
                let obj_temp = self.temp_name();
                let obj_idx = self.builder.intern_string(&obj_temp);
                self.compile_expr(object)?;
                self.builder.op_with_literal(Opcode::AssignIdent, obj_idx);
                let name_idx = self.builder.intern_string(name);
                self.builder.op_with_literal(Opcode::PropLiteralGet, name_idx);
                self.builder.op(Opcode::ToNumber);
                let old_idx = if !prefix {
                    let temp = self.temp_name();
                    let temp_idx = self.builder.intern_string(&temp);
                    self.builder.op_with_literal(Opcode::AssignIdent, temp_idx);
                    Some(temp_idx)
                } else {
                    None
                };
                self.apply_update_delta(op);
                let new_temp = self.temp_name();
                let new_idx = self.builder.intern_string(&new_temp);
                self.builder.op_with_literal(Opcode::AssignIdent, new_idx);
                self.builder.pop();
                self.builder.op_with_literal(Opcode::PushIdent, obj_idx);
                self.builder.op_with_literal(Opcode::PushIdent, new_idx);
                self.builder.op_with_literal(Opcode::AssignPropLiteral, name_idx);
                if let Some(old_idx) = old_idx {
                    self.builder.pop();
                    self.builder.op_with_literal(Opcode::PushIdent, old_idx);
                }
            }
            Expr::Member { object, property, computed: true } => {
                let obj_temp = self.temp_name();
                let obj_idx = self.builder.intern_string(&obj_temp);
                self.compile_expr(object)?;
                self.builder.op_with_literal(Opcode::AssignIdent, obj_idx);
                let key_temp = self.temp_name();
                let key_idx = self.builder.intern_string(&key_temp);
                self.compile_expr(property)?;
                self.builder.op_with_literal(Opcode::AssignIdent, key_idx);
                self.builder.op(Opcode::PropGet);
                self.builder.op(Opcode::ToNumber);
                let old_idx = if !prefix {
                    let temp = self.temp_name();
                    let temp_idx = self.builder.intern_string(&temp);
                    self.builder.op_with_literal(Opcode::AssignIdent, temp_idx);
                    Some(temp_idx)
                } else {
                    None
                };
                self.apply_update_delta(op);
                let new_temp = self.temp_name();
                let new_idx = self.builder.intern_string(&new_temp);
                self.builder.op_with_literal(Opcode::AssignIdent, new_idx);
                self.builder.pop();
                self.builder.op_with_literal(Opcode::PushIdent, obj_idx);
                self.builder.op_with_literal(Opcode::PushIdent, key_idx);
                self.builder.op_with_literal(Opcode::PushIdent, new_idx);
                self.builder.op(Opcode::Assign);
                if let Some(old_idx) = old_idx {
                    self.builder.pop();
                    self.builder.op_with_literal(Opcode::PushIdent, old_idx);
                }
            }
            _ => return Err(CompileError::internal("invalid update target")),
        }
        Ok(())
    }

    fn apply_update_delta(&mut self, op: UpdateOp) {
        match op {
            UpdateOp::Increment => {
                self.builder.push_simple(Opcode::PushNumber1);
                self.builder.add();
            }
            UpdateOp::Decrement => {
                self.builder.push_simple(Opcode::PushNumber1);
                self.builder.sub();
            }
        }
    }

    fn compile_assign(&mut self, op: AssignOp, target: &Expr, value: &Expr) -> CompileResult<()> {
        match target {
            Expr::Ident(name) => {
                let idx = self.builder.intern_string(name);
                if matches!(op, AssignOp::Assign) {
                    self.compile_expr(value)?;
                } else {
                    self.builder.push_ident(idx);
                    self.compile_expr(value)?;
                    self.compile_assign_op(op);
                }
                self.builder.op_with_literal(Opcode::AssignIdent, idx);
            }
            Expr::Member { object, property, computed: false } => {
                let Expr::String(name) = property.as_ref() else {
                    return Err(CompileError::internal("non-computed member property must be a string"));
                };
                let name_idx = self.builder.intern_string(name);
                if matches!(op, AssignOp::Assign) {
                    self.compile_expr(object)?;
                    self.compile_expr(value)?;
                    self.builder.op_with_literal(Opcode::AssignPropLiteral, name_idx);
                } else if matches!(op, AssignOp::Add) {
                    self.compile_expr(object)?;
                    self.compile_expr(value)?;
                    self.builder.assign_prop_literal_get_add(name_idx);
                } else {
                    let obj_temp = self.temp_name();
                    let obj_idx = self.builder.intern_string(&obj_temp);
                    self.compile_expr(object)?;
                    self.builder.op_with_literal(Opcode::AssignIdent, obj_idx);
                    self.builder.op_with_literal(Opcode::PropLiteralGet, name_idx);
                    self.compile_expr(value)?;
                    self.compile_assign_op(op);
                    let result_temp = self.temp_name();
                    let result_idx = self.builder.intern_string(&result_temp);
                    self.builder.op_with_literal(Opcode::AssignIdent, result_idx);
                    self.builder.pop();
                    self.builder.op_with_literal(Opcode::PushIdent, obj_idx);
                    self.builder.op_with_literal(Opcode::PushIdent, result_idx);
                    self.builder.op_with_literal(Opcode::AssignPropLiteral, name_idx);
                }
            }
            Expr::Member { object, property, computed: true } => {
                if matches!(op, AssignOp::Assign) {
                    self.compile_expr(object)?;
                    self.compile_expr(property)?;
                    self.compile_expr(value)?;
                    self.builder.op(Opcode::Assign);
                } else {
                    let obj_temp = self.temp_name();
                    let obj_idx = self.builder.intern_string(&obj_temp);
                    self.compile_expr(object)?;
                    self.builder.op_with_literal(Opcode::AssignIdent, obj_idx);
                    let key_temp = self.temp_name();
                    let key_idx = self.builder.intern_string(&key_temp);
                    self.compile_expr(property)?;
                    self.builder.op_with_literal(Opcode::AssignIdent, key_idx);
                    self.builder.op(Opcode::PropGet);
                    self.compile_expr(value)?;
                    self.compile_assign_op(op);
                    let result_temp = self.temp_name();
                    let result_idx = self.builder.intern_string(&result_temp);
                    self.builder.op_with_literal(Opcode::AssignIdent, result_idx);
                    self.builder.pop();
                    self.builder.op_with_literal(Opcode::PushIdent, obj_idx);
                    self.builder.op_with_literal(Opcode::PushIdent, key_idx);
                    self.builder.op_with_literal(Opcode::PushIdent, result_idx);
                    self.builder.op(Opcode::Assign);
                }
            }
            _ => return Err(CompileError::internal("invalid assignment target")),
        }
        Ok(())
    }

    fn compile_assign_op(&mut self, op: AssignOp) {
        match op {
            AssignOp::Assign => unreachable!("Assign has no combining operator"),
            AssignOp::Add => self.builder.add(),
            AssignOp::Sub => self.builder.sub(),
            AssignOp::Mul => self.builder.op(Opcode::Mul),
            AssignOp::Div => self.builder.op(Opcode::Div),
            AssignOp::Mod => self.builder.op(Opcode::Mod),
            AssignOp::BitAnd => self.builder.op(Opcode::BitAnd),
            AssignOp::BitOr => self.builder.op(Opcode::BitOr),
            AssignOp::BitXor => self.builder.op(Opcode::BitXor),
            AssignOp::Shl => self.builder.op(Opcode::Shl),
            AssignOp::Shr => self.builder.op(Opcode::Shr),
            AssignOp::Ushr => self.builder.op(Opcode::Ushr),
        }
    }

    fn compile_member_get(&mut self, object: &Expr, property: &Expr, computed: bool) -> CompileResult<()> {
        if computed {
            self.compile_expr(object)?;
            self.compile_expr(property)?;
            self.builder.op(Opcode::PropGet);
            return Ok(());
        }
        let Expr::String(name) = property else {
            return Err(CompileError::internal("non-computed member property must be a string"));
        };
        let key_idx = self.builder.intern_string(name);
        if let Expr::Ident(base_name) = object {
            let base_idx = self.builder.intern_string(base_name);
            self.builder.prop_literal_literal_get(base_idx, key_idx);
        } else {
            self.compile_expr(object)?;
            self.builder.op_with_literal(Opcode::PropLiteralGet, key_idx);
        }
        Ok(())
    }

    fn compile_object_literal(&mut self, props: &[ObjectProperty]) -> CompileResult<()> {
        self.builder.op(Opcode::CreateObject);
        for prop in props {
            match prop {
                ObjectProperty::Data { key, value } => {
                    self.compile_expr(value)?;
                    match key {
                        PropertyKey::Ident(s) | PropertyKey::String(s) => {
                            let idx = self.builder.intern_string(s);
                            self.builder.op_with_literal(Opcode::AssignPropLiteral, idx);
                            self.builder.pop();
                        }
                        PropertyKey::Number(n) => {
                            let idx = self.builder.intern_string(&format_number_key(*n));
                            self.builder.op_with_literal(Opcode::AssignPropLiteral, idx);
                            self.builder.pop();
                        }
                        PropertyKey::Computed(key_expr) => {
                            let value_temp = self.temp_name();
                            let value_idx = self.builder.intern_string(&value_temp);
                            self.builder.op_with_literal(Opcode::AssignIdent, value_idx);
                            self.builder.pop();
                            self.compile_expr(key_expr)?;
                            self.builder.op_with_literal(Opcode::PushIdent, value_idx);
                            self.builder.op(Opcode::Assign);
                            self.builder.pop();
                        }
                    }
                }
                ObjectProperty::Getter { key, body } => {
                    let code = self.compile_nested_function(body)?;
                    let fn_idx = self.builder.intern_function(code);
                    self.builder.push_literal(fn_idx);
                    let key_idx = self.intern_property_key(key)?;
                    self.builder.ext_op_with_literal(ExtendedOpcode::ObjectLiteralSetGetter, key_idx, 0, 1);
                }
                ObjectProperty::Setter { key, body, .. } => {
                    let code = self.compile_nested_function(body)?;
                    let fn_idx = self.builder.intern_function(code);
                    self.builder.push_literal(fn_idx);
                    let key_idx = self.intern_property_key(key)?;
                    self.builder.ext_op_with_literal(ExtendedOpcode::ObjectLiteralSetSetter, key_idx, 0, 1);
                }
            }
        }
        Ok(())
    }

    fn intern_property_key(&mut self, key: &PropertyKey) -> CompileResult<u32> {
        match key {
            PropertyKey::Ident(s) | PropertyKey::String(s) => Ok(self.builder.intern_string(s)),
            PropertyKey::Number(n) => Ok(self.builder.intern_string(&format_number_key(*n))),
            PropertyKey::Computed(_) => Err(CompileError::unsupported("computed accessor property name")),
        }
    }

    fn compile_call(&mut self, callee: &Expr, args: &[Expr], is_new: bool) -> CompileResult<()> {
        if is_new {
            self.compile_expr(callee)?;
            for a in args {
                self.compile_expr(a)?;
            }
            self.builder.call(Opcode::New, args.len() as u32);
            return Ok(());
        }
        match callee {
            Expr::Member { object, property, computed } => {
                self.compile_expr(object)?;
                if *computed {
                    self.compile_expr(property)?;
                } else {
                    let Expr::String(name) = property.as_ref() else {
                        return Err(CompileError::internal("non-computed member property must be a string"));
                    };
                    let idx = self.builder.intern_string(name);
                    self.builder.push_literal(idx);
                }
                for a in args {
                    self.compile_expr(a)?;
                }
                if args.is_empty() {
                    self.builder.call(Opcode::Call0Prop, 0);
                } else {
                    self.builder.call(Opcode::CallProp, args.len() as u32);
                }
            }
            Expr::Ident(name) if name == "eval" => {
                self.builder.push_simple(Opcode::PushUndefined);
                for a in args {
                    self.compile_expr(a)?;
                }
                self.builder.call(Opcode::CallEval, args.len() as u32);
            }
            _ => {
                self.compile_expr(callee)?;
                for a in args {
                    self.compile_expr(a)?;
                }
                if args.is_empty() {
                    self.builder.call(Opcode::Call0, 0);
                } else {
                    self.builder.call(Opcode::Call, args.len() as u32);
                }
            }
        }
        Ok(())
    }

    // ---- function compilation ----

    fn compile_nested_function(&mut self, func: &Function) -> CompileResult<Rc<CompiledCode>> {
        compile_function(func, self.strict)
    }

    fn compile_function_expr(&mut self, func: &Function) -> CompileResult<()> {
        let code = self.compile_nested_function(func)?;
        let idx = self.builder.intern_function(code);
        self.builder.push_literal(idx);
        Ok(())
    }
}

fn format_number_key(n: f64) -> String {
    format!("{n}")
}

/// Compile one function body (or the top-level program, treated as a
/// zero-parameter function) into a finished [`CompiledCode`] blob.
fn compile_function(func: &Function, outer_strict: bool) -> CompileResult<Rc<CompiledCode>> {
    let strict = outer_strict || func.own_strict;
    let scan = prescan(&func.body);
    let mut gen = CodeGen::new(strict);

    // Hoisted function declarations initialize before the first
    // statement runs, each as a nested `CompiledCode` pushed and bound
    // by name (a later declaration of the same name wins, matching
    // `scope::prescan`'s documented source-order tie-break).
    for stmt in &func.body {
        if let Stmt::FunctionDecl(inner) = stmt {
            let code = gen.compile_nested_function(inner)?;
            let name = inner.name.clone().unwrap_or_default();
            let fn_idx = gen.builder.intern_function(code);
            gen.builder.push_literal(fn_idx);
            let name_idx = gen.builder.intern_string(&name);
            gen.builder.op_with_literal(Opcode::AssignIdent, name_idx);
            gen.builder.pop();
        }
    }

    gen.compile_stmts(&func.body)?;
    gen.builder.push_simple(Opcode::PushUndefined);
    gen.builder.ret();

    let register_count = gen.builder.max_depth().min(u16::MAX as u32) as u16;
    let (bytes, literals) = gen.builder.into_parts();

    let mut seen = std::collections::HashSet::new();
    let mut var_names: Vec<Rc<[u16]>> = Vec::new();
    for name in func.params.iter().chain(scan.hoisted_vars.iter()).chain(scan.hoisted_functions.iter()) {
        if seen.insert(name.clone()) {
            var_names.push(name.encode_utf16().collect::<Vec<_>>().into());
        }
    }
    let param_names: Rc<[Rc<[u16]>]> =
        func.params.iter().map(|p| p.encode_utf16().collect::<Vec<_>>().into()).collect::<Vec<_>>().into();

    let flags = CodeFlags {
        strict,
        arguments_needed: scan.uses_arguments,
        lex_env_not_needed: scan.lex_env_not_needed(func.params.len()),
        wide_literals: true,
        has_initializers: false,
    };
    let header = CodeHeader {
        arg_count: func.params.len().min(u8::MAX as usize) as u8,
        register_count,
        function_name: func.name.as_ref().map(|n| n.encode_utf16().collect::<Vec<_>>().into()),
        param_names,
        var_names: var_names.into(),
        flags,
    };
    Ok(CompiledCode::compiled(header, literals, bytes))
}

/// Compile a whole program's top level (script body or direct-eval
/// source) into a callable [`CompiledCode`] taking no parameters.
pub fn compile_program(program: &Program) -> CompileResult<Rc<CompiledCode>> {
    let synthetic =
        Function { name: None, params: vec![], body: program.body.clone(), own_strict: program.strict, line: 0 };
    compile_function(&synthetic, false)
}

/// Parse and compile a whole program in one step.
pub fn compile(src: &str) -> CompileResult<Rc<CompiledCode>> {
    let program = parse(src)?;
    compile_program(&program)
}

/// Parse and compile a direct-`eval` body, inheriting `outer_strict`
/// from the calling context (a strict caller makes the eval body strict
/// even without its own directive prologue, per ES5.1 §10.1.1).
pub fn compile_eval(src: &str, outer_strict: bool) -> CompileResult<Rc<CompiledCode>> {
    let program = parse(src)?;
    let synthetic =
        Function { name: None, params: vec![], body: program.body, own_strict: program.strict, line: 0 };
    compile_function(&synthetic, outer_strict)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_small_program() {
        let program = parse("var x = 1 + 2; function f(a) { return a; }").unwrap();
        assert_eq!(program.body.len(), 2);
    }

    #[test]
    fn rejects_unterminated_input() {
        assert_eq!(parse("if (true) {").is_err(), true);
    }

    #[test]
    fn compiles_arithmetic_without_error() {
        let code = compile("var x = (1 + 2) * 3; x;").unwrap();
        assert!(!code.bytecode.is_empty());
    }

    #[test]
    fn compiles_function_with_nested_closure() {
        let code = compile("function outer() { function inner() { return 1; } return inner(); }").unwrap();
        assert!(!code.literals.is_empty());
    }

    #[test]
    fn compiles_for_in_and_switch() {
        let src = "for (var k in obj) { switch (k) { case 'a': break; default: continue; } }";
        assert!(compile(src).is_ok());
    }

    #[test]
    fn strict_directive_is_local_to_function() {
        let program = parse("function f() { \"use strict\"; return 1; }").unwrap();
        match &program.body[0] {
            Stmt::FunctionDecl(f) => assert!(f.own_strict),
            _ => panic!("expected function declaration"),
        }
        assert!(!program.strict);
    }
}
