//! PEST-based parser for the script language
//!
//! Produces the AST consumed by the instrumentation pass, the printer and the
//! sandbox executor.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use std::rc::Rc;
use thiserror::Error;

use crate::executor::types::ast::{
    AssignOp, BinaryOp, DeclareTarget, Declarator, Expr, ForLoopKind, FunctionBody, FunctionDef,
    LogicalOp, Program, Stmt, UnaryOp, UpdateOp, VarKind,
};

pub mod printer;
pub mod transform;

#[cfg(test)]
mod tests;

pub use printer::{print_expr, print_program, print_stmt};
pub use transform::Transform;

/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "parser/script.pest"]
struct ScriptParser;

/* ===================== Error Types ===================== */

/// Line/column (1-indexed) where parsing failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub col: usize,
}

/// A syntax-level failure. Reported before any run starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("{0}")]
    PestError(String, Option<Location>),
    #[error("{0}")]
    BuildError(String),
}

impl ParseError {
    pub fn message(&self) -> &str {
        match self {
            ParseError::PestError(msg, _) => msg,
            ParseError::BuildError(msg) => msg,
        }
    }

    pub fn location(&self) -> Option<Location> {
        match self {
            ParseError::PestError(_, location) => *location,
            ParseError::BuildError(_) => None,
        }
    }
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let (line, col) = match err.line_col {
            pest::error::LineColLocation::Pos(pos) => pos,
            pest::error::LineColLocation::Span(start, _) => start,
        };
        ParseError::PestError(err.to_string(), Some(Location { line, col }))
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/* ===================== Public API ===================== */

/// Parse script source into a program
pub fn parse_program(source: &str) -> ParseResult<Program> {
    let mut pairs = ScriptParser::parse(Rule::program, source)?;
    let program = expect_pair(&mut pairs, "program")?;

    let body = program
        .into_inner()
        .filter(|pair| pair.as_rule() != Rule::EOI)
        .map(build_statement)
        .collect::<ParseResult<Vec<_>>>()?;

    Ok(Program { body })
}

/* ===================== Pair Helpers ===================== */

fn expect_pair<'i>(
    pairs: &mut impl Iterator<Item = Pair<'i, Rule>>,
    what: &str,
) -> ParseResult<Pair<'i, Rule>> {
    pairs
        .next()
        .ok_or_else(|| ParseError::BuildError(format!("Expected {}", what)))
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_async
            | Rule::kw_await
            | Rule::kw_break
            | Rule::kw_catch
            | Rule::kw_continue
            | Rule::kw_else
            | Rule::kw_finally
            | Rule::kw_for
            | Rule::kw_function
            | Rule::kw_if
            | Rule::kw_new
            | Rule::kw_return
            | Rule::kw_throw
            | Rule::kw_try
            | Rule::kw_while
    )
}

/// Inner pairs without the keyword tokens
fn significant<'i>(pair: Pair<'i, Rule>) -> impl Iterator<Item = Pair<'i, Rule>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

fn unexpected(what: &str, rule: Rule) -> ParseError {
    ParseError::BuildError(format!("Unexpected {} rule: {:?}", what, rule))
}

/* ===================== Statements ===================== */

fn build_statements(pair: Pair<Rule>) -> ParseResult<Vec<Stmt>> {
    pair.into_inner().map(build_statement).collect()
}

fn build_statement(pair: Pair<Rule>) -> ParseResult<Stmt> {
    match pair.as_rule() {
        Rule::statement => {
            let inner = expect_pair(&mut pair.into_inner(), "statement")?;
            build_statement(inner)
        }
        Rule::block => Ok(Stmt::Block {
            body: build_statements(pair)?,
        }),
        Rule::function_decl => Ok(Stmt::Function {
            func: Rc::new(build_function(pair)?),
        }),
        Rule::declare_stmt => {
            let declaration = expect_pair(&mut pair.into_inner(), "declaration")?;
            build_declaration(declaration)
        }
        Rule::if_stmt => build_if_stmt(pair),
        Rule::while_stmt => {
            let mut inner = significant(pair);
            let test = build_expression(expect_pair(&mut inner, "while condition")?)?;
            let body = build_statement(expect_pair(&mut inner, "while body")?)?;
            Ok(Stmt::While {
                test,
                body: Box::new(body),
            })
        }
        Rule::for_loop_stmt => build_for_loop_stmt(pair),
        Rule::for_stmt => build_for_stmt(pair),
        Rule::return_stmt => {
            let value = significant(pair).next().map(build_expression).transpose()?;
            Ok(Stmt::Return { value })
        }
        Rule::break_stmt => Ok(Stmt::Break),
        Rule::continue_stmt => Ok(Stmt::Continue),
        Rule::throw_stmt => {
            let value = build_expression(expect_pair(&mut significant(pair), "throw value")?)?;
            Ok(Stmt::Throw { value })
        }
        Rule::try_stmt => build_try_stmt(pair),
        Rule::empty_stmt => Ok(Stmt::Empty),
        Rule::expr_stmt => {
            let expr = build_expression(expect_pair(&mut pair.into_inner(), "expression")?)?;
            Ok(Stmt::Expr { expr })
        }
        other => Err(unexpected("statement", other)),
    }
}

fn build_if_stmt(pair: Pair<Rule>) -> ParseResult<Stmt> {
    let mut inner = significant(pair);

    let test = build_expression(expect_pair(&mut inner, "if condition")?)?;
    let then_s = build_statement(expect_pair(&mut inner, "if body")?)?;

    let else_s = match inner.next() {
        Some(else_clause) => {
            let else_body = expect_pair(&mut significant(else_clause), "else body")?;
            Some(Box::new(build_statement(else_body)?))
        }
        None => None,
    };

    Ok(Stmt::If {
        test,
        then_s: Box::new(then_s),
        else_s,
    })
}

fn build_for_loop_stmt(pair: Pair<Rule>) -> ParseResult<Stmt> {
    let mut inner = significant(pair);

    let var_kind = build_var_kind(expect_pair(&mut inner, "let, const or var")?)?;
    let binding = expect_pair(&mut inner, "loop binding")?.as_str().to_string();

    let kind_pair = expect_pair(&mut inner, "of or in")?;
    let kind = match kind_pair.as_str() {
        "of" => ForLoopKind::Of,
        "in" => ForLoopKind::In,
        other => {
            return Err(ParseError::BuildError(format!(
                "Expected 'of' or 'in', got: {}",
                other
            )))
        }
    };

    let iterable = build_expression(expect_pair(&mut inner, "iterable")?)?;
    let body = build_statement(expect_pair(&mut inner, "loop body")?)?;

    Ok(Stmt::ForLoop {
        kind,
        var_kind,
        binding,
        iterable,
        body: Box::new(body),
    })
}

fn build_for_stmt(pair: Pair<Rule>) -> ParseResult<Stmt> {
    let mut init = None;
    let mut test = None;
    let mut update = None;
    let mut body = None;

    for part in significant(pair) {
        match part.as_rule() {
            Rule::for_init => {
                let inner = expect_pair(&mut part.into_inner(), "loop initializer")?;
                let stmt = match inner.as_rule() {
                    Rule::declaration => build_declaration(inner)?,
                    _ => Stmt::Expr {
                        expr: build_expression(inner)?,
                    },
                };
                init = Some(Box::new(stmt));
            }
            Rule::for_test => {
                test = Some(build_expression(expect_pair(&mut part.into_inner(), "loop test")?)?);
            }
            Rule::for_update => {
                update = Some(build_expression(expect_pair(
                    &mut part.into_inner(),
                    "loop update",
                )?)?);
            }
            Rule::statement => body = Some(build_statement(part)?),
            other => return Err(unexpected("for", other)),
        }
    }

    let body = body.ok_or_else(|| ParseError::BuildError("Expected loop body".to_string()))?;

    Ok(Stmt::For {
        init,
        test,
        update,
        body: Box::new(body),
    })
}

fn build_try_stmt(pair: Pair<Rule>) -> ParseResult<Stmt> {
    let mut body = None;
    let mut catch_var = None;
    let mut catch_body = None;
    let mut finally_body = None;

    for part in significant(pair) {
        match part.as_rule() {
            Rule::block => body = Some(Box::new(build_statement(part)?)),
            Rule::catch_clause => {
                for catch_part in significant(part) {
                    match catch_part.as_rule() {
                        Rule::identifier => catch_var = Some(catch_part.as_str().to_string()),
                        Rule::block => catch_body = Some(Box::new(build_statement(catch_part)?)),
                        other => return Err(unexpected("catch", other)),
                    }
                }
            }
            Rule::finally_clause => {
                let block = expect_pair(&mut significant(part), "finally block")?;
                finally_body = Some(Box::new(build_statement(block)?));
            }
            other => return Err(unexpected("try", other)),
        }
    }

    let body = body.ok_or_else(|| ParseError::BuildError("Expected try block".to_string()))?;

    if catch_body.is_none() && finally_body.is_none() {
        return Err(ParseError::BuildError(
            "Missing catch or finally after try".to_string(),
        ));
    }

    Ok(Stmt::Try {
        body,
        catch_var,
        catch_body,
        finally_body,
    })
}

fn build_var_kind(pair: Pair<Rule>) -> ParseResult<VarKind> {
    match pair.as_str() {
        "var" => Ok(VarKind::Var),
        "let" => Ok(VarKind::Let),
        "const" => Ok(VarKind::Const),
        other => Err(ParseError::BuildError(format!(
            "Expected 'let', 'const' or 'var', got: {}",
            other
        ))),
    }
}

fn build_declaration(pair: Pair<Rule>) -> ParseResult<Stmt> {
    let mut inner = pair.into_inner();
    let var_kind = build_var_kind(expect_pair(&mut inner, "let, const or var")?)?;

    let declarations = inner
        .map(|declarator| build_declarator(declarator, var_kind))
        .collect::<ParseResult<Vec<_>>>()?;

    Ok(Stmt::Declare {
        var_kind,
        declarations,
    })
}

fn build_declarator(pair: Pair<Rule>, var_kind: VarKind) -> ParseResult<Declarator> {
    let mut target = None;
    let mut init = None;

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::declare_target => {
                let inner = expect_pair(&mut part.into_inner(), "declaration target")?;
                target = Some(match inner.as_rule() {
                    Rule::identifier => DeclareTarget::Simple {
                        name: inner.as_str().to_string(),
                    },
                    Rule::destructure_pattern => DeclareTarget::Destructure {
                        names: inner.into_inner().map(|id| id.as_str().to_string()).collect(),
                    },
                    other => return Err(unexpected("declaration target", other)),
                });
            }
            Rule::assign_eq => {}
            Rule::expression => init = Some(build_expression(part)?),
            other => return Err(unexpected("declarator", other)),
        }
    }

    let target =
        target.ok_or_else(|| ParseError::BuildError("Expected declaration target".to_string()))?;

    if init.is_none() {
        if matches!(target, DeclareTarget::Destructure { .. }) {
            return Err(ParseError::BuildError(
                "Destructuring declaration requires an initializer".to_string(),
            ));
        }
        if var_kind == VarKind::Const {
            return Err(ParseError::BuildError(
                "Missing initializer in const declaration".to_string(),
            ));
        }
    }

    Ok(Declarator { target, init })
}

/* ===================== Functions ===================== */

fn build_param_list(pair: Pair<Rule>) -> ParseResult<(Vec<String>, Option<String>)> {
    let mut params = Vec::new();
    let mut rest = None;

    for param in pair.into_inner() {
        if rest.is_some() {
            return Err(ParseError::BuildError(
                "Rest parameter must be last formal parameter".to_string(),
            ));
        }
        let inner = expect_pair(&mut param.into_inner(), "parameter")?;
        match inner.as_rule() {
            Rule::identifier => params.push(inner.as_str().to_string()),
            Rule::rest_param => {
                let name = expect_pair(&mut inner.into_inner(), "rest parameter name")?;
                rest = Some(name.as_str().to_string());
            }
            other => return Err(unexpected("parameter", other)),
        }
    }

    Ok((params, rest))
}

/// function_decl / function_expr
fn build_function(pair: Pair<Rule>) -> ParseResult<FunctionDef> {
    let mut is_async = false;
    let mut name = None;
    let mut params = Vec::new();
    let mut rest = None;
    let mut body = None;

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::kw_async => is_async = true,
            Rule::kw_function => {}
            Rule::identifier => name = Some(part.as_str().to_string()),
            Rule::param_list => (params, rest) = build_param_list(part)?,
            Rule::block => body = Some(build_statements(part)?),
            other => return Err(unexpected("function", other)),
        }
    }

    let body = body.ok_or_else(|| ParseError::BuildError("Expected function body".to_string()))?;

    Ok(FunctionDef {
        name,
        params,
        rest,
        body: FunctionBody::Block { body },
        is_async,
        is_arrow: false,
    })
}

fn build_arrow_function(pair: Pair<Rule>) -> ParseResult<FunctionDef> {
    let mut is_async = false;
    let mut params = Vec::new();
    let mut rest = None;
    let mut body = None;

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::kw_async => is_async = true,
            Rule::arrow_params => {
                if let Some(inner) = part.into_inner().next() {
                    match inner.as_rule() {
                        Rule::identifier => params.push(inner.as_str().to_string()),
                        Rule::param_list => (params, rest) = build_param_list(inner)?,
                        other => return Err(unexpected("arrow parameter", other)),
                    }
                }
            }
            Rule::block => {
                body = Some(FunctionBody::Block {
                    body: build_statements(part)?,
                })
            }
            Rule::expression => {
                body = Some(FunctionBody::Expr {
                    expr: Box::new(build_expression(part)?),
                })
            }
            other => return Err(unexpected("arrow function", other)),
        }
    }

    let body = body.ok_or_else(|| ParseError::BuildError("Expected arrow body".to_string()))?;

    Ok(FunctionDef {
        name: None,
        params,
        rest,
        body,
        is_async,
        is_arrow: true,
    })
}

/* ===================== Expressions ===================== */

fn is_assignable(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Ident { .. } | Expr::Member { optional: false, .. } | Expr::Index { .. }
    )
}

fn build_binary_expr(pair: Pair<Rule>) -> ParseResult<Expr> {
    let mut inner = pair.into_inner();
    let mut left = build_expression(expect_pair(&mut inner, "operand")?)?;

    while let Some(op_pair) = inner.next() {
        let right = build_expression(expect_pair(&mut inner, "right operand")?)?;
        let (left_box, right_box) = (Box::new(left), Box::new(right));

        left = match op_pair.as_rule() {
            Rule::op_and => Expr::Logical {
                op: LogicalOp::And,
                left: left_box,
                right: right_box,
            },
            Rule::op_or => Expr::Logical {
                op: LogicalOp::Or,
                left: left_box,
                right: right_box,
            },
            Rule::op_nullish => Expr::Logical {
                op: LogicalOp::Nullish,
                left: left_box,
                right: right_box,
            },
            rule => {
                let op = match rule {
                    Rule::op_seq => BinaryOp::StrictEq,
                    Rule::op_sne => BinaryOp::StrictNe,
                    Rule::op_eq => BinaryOp::Eq,
                    Rule::op_ne => BinaryOp::Ne,
                    Rule::op_lt => BinaryOp::Lt,
                    Rule::op_lte => BinaryOp::Lte,
                    Rule::op_gt => BinaryOp::Gt,
                    Rule::op_gte => BinaryOp::Gte,
                    Rule::op_add => BinaryOp::Add,
                    Rule::op_sub => BinaryOp::Sub,
                    Rule::op_mul => BinaryOp::Mul,
                    Rule::op_div => BinaryOp::Div,
                    Rule::op_mod => BinaryOp::Mod,
                    other => return Err(unexpected("operator", other)),
                };
                Expr::Binary {
                    op,
                    left: left_box,
                    right: right_box,
                }
            }
        };
    }

    Ok(left)
}

fn build_expression(pair: Pair<Rule>) -> ParseResult<Expr> {
    match pair.as_rule() {
        Rule::expression | Rule::primary | Rule::literal | Rule::paren_expr => {
            let what = format!("{:?}", pair.as_rule());
            let inner = expect_pair(&mut pair.into_inner(), &what)?;
            build_expression(inner)
        }
        Rule::arrow_function => Ok(Expr::Function {
            func: Rc::new(build_arrow_function(pair)?),
        }),
        Rule::function_expr => Ok(Expr::Function {
            func: Rc::new(build_function(pair)?),
        }),
        Rule::assign_expr => {
            let mut inner = pair.into_inner();
            let target = build_expression(expect_pair(&mut inner, "assignment target")?)?;
            let op = match expect_pair(&mut inner, "assignment operator")?.as_rule() {
                Rule::assign_eq => AssignOp::Assign,
                Rule::assign_add => AssignOp::Add,
                Rule::assign_sub => AssignOp::Sub,
                Rule::assign_mul => AssignOp::Mul,
                Rule::assign_div => AssignOp::Div,
                other => return Err(unexpected("assignment operator", other)),
            };
            let value = build_expression(expect_pair(&mut inner, "assigned value")?)?;

            if !is_assignable(&target) {
                return Err(ParseError::BuildError(
                    "Invalid left-hand side in assignment".to_string(),
                ));
            }

            Ok(Expr::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            })
        }
        Rule::ternary_expr => {
            let mut inner = pair.into_inner();
            let condition = build_expression(expect_pair(&mut inner, "condition")?)?;

            match inner.next() {
                Some(consequent_pair) => {
                    let consequent = build_expression(consequent_pair)?;
                    let alternate = build_expression(expect_pair(&mut inner, "alternate")?)?;
                    Ok(Expr::Ternary {
                        condition: Box::new(condition),
                        consequent: Box::new(consequent),
                        alternate: Box::new(alternate),
                    })
                }
                None => Ok(condition),
            }
        }
        Rule::nullish_expr
        | Rule::logical_or_expr
        | Rule::logical_and_expr
        | Rule::equality_expr
        | Rule::comparison_expr
        | Rule::additive_expr
        | Rule::multiplicative_expr => build_binary_expr(pair),
        Rule::unary_expr => {
            let mut inner = pair.into_inner();
            let first = expect_pair(&mut inner, "unary operand")?;

            match first.as_rule() {
                Rule::unary_op => {
                    let op_pair = expect_pair(&mut first.into_inner(), "unary operator")?;
                    let op = match op_pair.as_rule() {
                        Rule::op_not => UnaryOp::Not,
                        Rule::op_neg => UnaryOp::Neg,
                        Rule::op_plus => UnaryOp::Plus,
                        Rule::kw_typeof => UnaryOp::Typeof,
                        other => return Err(unexpected("unary operator", other)),
                    };
                    let operand = build_expression(expect_pair(&mut inner, "unary operand")?)?;
                    Ok(Expr::Unary {
                        op,
                        operand: Box::new(operand),
                    })
                }
                _ => build_expression(first),
            }
        }
        Rule::await_expr => {
            let inner = build_expression(expect_pair(&mut significant(pair), "awaited value")?)?;
            Ok(Expr::awaited(inner))
        }
        Rule::update_expr => build_update_expr(pair),
        Rule::call_expr => {
            let mut inner = pair.into_inner();
            let mut expr = build_expression(expect_pair(&mut inner, "callee")?)?;

            for postfix in inner {
                let suffix = expect_pair(&mut postfix.into_inner(), "postfix")?;
                expr = match suffix.as_rule() {
                    Rule::call_suffix => Expr::Call {
                        callee: Box::new(expr),
                        args: build_call_args(suffix)?,
                    },
                    Rule::member_suffix => apply_member_suffix(expr, suffix)?,
                    other => return Err(unexpected("postfix", other)),
                };
            }

            Ok(expr)
        }
        Rule::new_expr => {
            let mut inner = significant(pair);
            let mut callee = build_expression(expect_pair(&mut inner, "constructor")?)?;
            let mut args = Vec::new();

            for part in inner {
                match part.as_rule() {
                    Rule::member_suffix => callee = apply_member_suffix(callee, part)?,
                    Rule::call_suffix => args = build_call_args(part)?,
                    other => return Err(unexpected("new", other)),
                }
            }

            Ok(Expr::New {
                callee: Box::new(callee),
                args,
            })
        }
        Rule::identifier => Ok(Expr::ident(pair.as_str())),
        Rule::number => {
            let num_str = pair.as_str();
            let value = num_str.parse::<f64>().map_err(|e| {
                ParseError::BuildError(format!("Failed to parse number '{}': {}", num_str, e))
            })?;
            Ok(Expr::LitNum { v: value })
        }
        Rule::boolean => Ok(Expr::LitBool {
            v: pair.as_str() == "true",
        }),
        Rule::null_lit => Ok(Expr::LitNull),
        Rule::undefined_lit => Ok(Expr::LitUndefined),
        Rule::string => {
            let content = pair
                .into_inner()
                .next()
                .map(|content| unescape(content.as_str()))
                .unwrap_or_default();
            Ok(Expr::LitStr { v: content })
        }
        Rule::template => build_template(pair),
        Rule::array_lit => {
            let elements = match pair.into_inner().next() {
                Some(element_list) => element_list
                    .into_inner()
                    .map(build_expression)
                    .collect::<ParseResult<Vec<_>>>()?,
                None => vec![],
            };
            Ok(Expr::LitList { elements })
        }
        Rule::object_lit => {
            let properties = match pair.into_inner().next() {
                Some(property_list) => property_list
                    .into_inner()
                    .map(build_property)
                    .collect::<ParseResult<Vec<_>>>()?,
                None => vec![],
            };
            Ok(Expr::LitObj { properties })
        }
        other => Err(unexpected("expression", other)),
    }
}

fn build_update_expr(pair: Pair<Rule>) -> ParseResult<Expr> {
    let parts: Vec<_> = pair.into_inner().collect();

    let (op_pair, target_pair, prefix) = match parts.as_slice() {
        [target] => return build_expression(target.clone()),
        [first, second] if first.as_rule() == Rule::update_op => {
            (first.clone(), second.clone(), true)
        }
        [first, second] => (second.clone(), first.clone(), false),
        _ => {
            return Err(ParseError::BuildError(
                "Malformed update expression".to_string(),
            ))
        }
    };

    let op = match expect_pair(&mut op_pair.into_inner(), "update operator")?.as_rule() {
        Rule::op_inc => UpdateOp::Inc,
        Rule::op_dec => UpdateOp::Dec,
        other => return Err(unexpected("update operator", other)),
    };

    let target = build_expression(target_pair)?;
    if !is_assignable(&target) {
        return Err(ParseError::BuildError(
            "Invalid left-hand side expression in update operation".to_string(),
        ));
    }

    Ok(Expr::Update {
        op,
        prefix,
        target: Box::new(target),
    })
}

fn build_call_args(pair: Pair<Rule>) -> ParseResult<Vec<Expr>> {
    match pair.into_inner().next() {
        Some(arg_list) => arg_list.into_inner().map(build_expression).collect(),
        None => Ok(vec![]),
    }
}

fn apply_member_suffix(object: Expr, pair: Pair<Rule>) -> ParseResult<Expr> {
    let access = expect_pair(&mut pair.into_inner(), "member access")?;
    let rule = access.as_rule();
    let inner = expect_pair(&mut access.into_inner(), "property")?;

    match rule {
        Rule::regular_access | Rule::optional_access => Ok(Expr::Member {
            object: Box::new(object),
            property: inner.as_str().to_string(),
            optional: rule == Rule::optional_access,
        }),
        Rule::index_access => Ok(Expr::Index {
            object: Box::new(object),
            index: Box::new(build_expression(inner)?),
        }),
        other => Err(unexpected("member access", other)),
    }
}

fn build_template(pair: Pair<Rule>) -> ParseResult<Expr> {
    let mut quasis = vec![String::new()];
    let mut exprs = Vec::new();

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::template_chars => {
                if let Some(current) = quasis.last_mut() {
                    current.push_str(&unescape(part.as_str()));
                }
            }
            Rule::template_subst => {
                let inner = expect_pair(&mut part.into_inner(), "template substitution")?;
                exprs.push(build_expression(inner)?);
                quasis.push(String::new());
            }
            other => return Err(unexpected("template", other)),
        }
    }

    Ok(Expr::Template { quasis, exprs })
}

fn build_property(pair: Pair<Rule>) -> ParseResult<(String, Expr)> {
    let inner = expect_pair(&mut pair.into_inner(), "property")?;

    match inner.as_rule() {
        Rule::property_pair => {
            let mut parts = inner.into_inner();
            let key_pair = expect_pair(&mut parts, "property key")?;
            let key_inner = expect_pair(&mut key_pair.into_inner(), "property key")?;
            let key = match key_inner.as_rule() {
                Rule::string => key_inner
                    .into_inner()
                    .next()
                    .map(|content| unescape(content.as_str()))
                    .unwrap_or_default(),
                _ => key_inner.as_str().to_string(),
            };
            let value = build_expression(expect_pair(&mut parts, "property value")?)?;
            Ok((key, value))
        }
        Rule::property_shorthand => {
            let key = inner.as_str().trim().to_string();
            Ok((key.clone(), Expr::Ident { name: key }))
        }
        other => Err(unexpected("property", other)),
    }
}

/// Resolve backslash escapes of string and template content
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push('u');
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }

    out
}
