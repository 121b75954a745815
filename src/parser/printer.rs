//! Pretty printer: AST back to script text
//!
//! Output re-parses into an equivalent tree. Layout is fixed: four-space
//! indentation, single-quoted strings, `;`-terminated simple statements.

use crate::executor::types::ast::{
    AssignOp, BinaryOp, DeclareTarget, Declarator, Expr, ForLoopKind, FunctionBody, FunctionDef,
    LogicalOp, Program, Stmt, UnaryOp, UpdateOp,
};

const INDENT: &str = "    ";

/* ===================== Precedence ===================== */

const PREC_ASSIGN: u8 = 1;
const PREC_TERNARY: u8 = 2;
const PREC_NULLISH: u8 = 3;
const PREC_OR: u8 = 4;
const PREC_AND: u8 = 5;
const PREC_EQUALITY: u8 = 6;
const PREC_COMPARE: u8 = 7;
const PREC_ADD: u8 = 8;
const PREC_MUL: u8 = 9;
const PREC_UNARY: u8 = 10;
const PREC_POSTFIX: u8 = 11;
const PREC_CALL: u8 = 12;
const PREC_PRIMARY: u8 = 13;

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Assign { .. } => PREC_ASSIGN,
        Expr::Function { func } if func.is_arrow => PREC_ASSIGN,
        Expr::Ternary { .. } => PREC_TERNARY,
        Expr::Logical { op, .. } => match op {
            LogicalOp::Nullish => PREC_NULLISH,
            LogicalOp::Or => PREC_OR,
            LogicalOp::And => PREC_AND,
        },
        Expr::Binary { op, .. } => binary_precedence(*op),
        Expr::Unary { .. } | Expr::Await { .. } => PREC_UNARY,
        Expr::Update { prefix: true, .. } => PREC_UNARY,
        Expr::Update { prefix: false, .. } => PREC_POSTFIX,
        Expr::Call { .. } | Expr::New { .. } | Expr::Member { .. } | Expr::Index { .. } => {
            PREC_CALL
        }
        _ => PREC_PRIMARY,
    }
}

fn binary_precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::StrictEq | BinaryOp::StrictNe => PREC_EQUALITY,
        BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => PREC_COMPARE,
        BinaryOp::Add | BinaryOp::Sub => PREC_ADD,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => PREC_MUL,
    }
}

pub fn binary_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::StrictEq => "===",
        BinaryOp::StrictNe => "!==",
        BinaryOp::Lt => "<",
        BinaryOp::Lte => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Gte => ">=",
    }
}

fn logical_symbol(op: LogicalOp) -> &'static str {
    match op {
        LogicalOp::And => "&&",
        LogicalOp::Or => "||",
        LogicalOp::Nullish => "??",
    }
}

fn assign_symbol(op: AssignOp) -> &'static str {
    match op {
        AssignOp::Assign => "=",
        AssignOp::Add => "+=",
        AssignOp::Sub => "-=",
        AssignOp::Mul => "*=",
        AssignOp::Div => "/=",
    }
}

/* ===================== Public API ===================== */

pub fn print_program(program: &Program) -> String {
    program
        .body
        .iter()
        .map(|stmt| stmt_at(stmt, 0))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn print_stmt(stmt: &Stmt) -> String {
    stmt_at(stmt, 0)
}

pub fn print_expr(expr: &Expr) -> String {
    expr_at(expr, PREC_ASSIGN, 0)
}

/* ===================== Statements ===================== */

fn block_at(body: &[Stmt], indent: usize) -> String {
    if body.is_empty() {
        return "{}".to_string();
    }

    let pad = INDENT.repeat(indent + 1);
    let mut out = String::from("{\n");
    for stmt in body {
        out.push_str(&pad);
        out.push_str(&stmt_at(stmt, indent + 1));
        out.push('\n');
    }
    out.push_str(&INDENT.repeat(indent));
    out.push('}');
    out
}

fn declaration_at(var_kind: &str, declarations: &[Declarator], indent: usize) -> String {
    let parts: Vec<String> = declarations
        .iter()
        .map(|declarator| {
            let target = match &declarator.target {
                DeclareTarget::Simple { name } => name.clone(),
                DeclareTarget::Destructure { names } => format!("{{ {} }}", names.join(", ")),
            };
            match &declarator.init {
                Some(init) => format!("{} = {}", target, expr_at(init, PREC_ASSIGN, indent)),
                None => target,
            }
        })
        .collect();

    format!("{} {}", var_kind, parts.join(", "))
}

/// Expression statements must not open with `{` or `function`
fn statement_expr_at(expr: &Expr, indent: usize) -> String {
    let text = expr_at(expr, PREC_ASSIGN, indent);
    if text.starts_with('{')
        || text.starts_with("function ")
        || text.starts_with("function(")
        || text.starts_with("async function")
    {
        format!("({})", text)
    } else {
        text
    }
}

fn stmt_at(stmt: &Stmt, indent: usize) -> String {
    match stmt {
        Stmt::Block { body } => block_at(body, indent),
        Stmt::Declare {
            var_kind,
            declarations,
        } => format!(
            "{};",
            declaration_at(var_kind.keyword(), declarations, indent)
        ),
        Stmt::Function { func } => function_at(func, indent),
        Stmt::If {
            test,
            then_s,
            else_s,
        } => {
            let mut out = format!(
                "if ({}) {}",
                expr_at(test, PREC_ASSIGN, indent),
                stmt_at(then_s, indent)
            );
            if let Some(else_s) = else_s {
                out.push_str(" else ");
                out.push_str(&stmt_at(else_s, indent));
            }
            out
        }
        Stmt::While { test, body } => format!(
            "while ({}) {}",
            expr_at(test, PREC_ASSIGN, indent),
            stmt_at(body, indent)
        ),
        Stmt::For {
            init,
            test,
            update,
            body,
        } => {
            let init_text = match init.as_deref() {
                Some(Stmt::Declare {
                    var_kind,
                    declarations,
                }) => declaration_at(var_kind.keyword(), declarations, indent),
                Some(Stmt::Expr { expr }) => expr_at(expr, PREC_ASSIGN, indent),
                Some(other) => stmt_at(other, indent).trim_end_matches(';').to_string(),
                None => String::new(),
            };
            let test_text = test
                .as_ref()
                .map(|e| format!(" {}", expr_at(e, PREC_ASSIGN, indent)))
                .unwrap_or_default();
            let update_text = update
                .as_ref()
                .map(|e| format!(" {}", expr_at(e, PREC_ASSIGN, indent)))
                .unwrap_or_default();
            format!(
                "for ({};{};{}) {}",
                init_text,
                test_text,
                update_text,
                stmt_at(body, indent)
            )
        }
        Stmt::ForLoop {
            kind,
            var_kind,
            binding,
            iterable,
            body,
        } => {
            let keyword = match kind {
                ForLoopKind::Of => "of",
                ForLoopKind::In => "in",
            };
            format!(
                "for ({} {} {} {}) {}",
                var_kind.keyword(),
                binding,
                keyword,
                expr_at(iterable, PREC_ASSIGN, indent),
                stmt_at(body, indent)
            )
        }
        Stmt::Return { value: Some(value) } => {
            format!("return {};", expr_at(value, PREC_ASSIGN, indent))
        }
        Stmt::Return { value: None } => "return;".to_string(),
        Stmt::Throw { value } => format!("throw {};", expr_at(value, PREC_ASSIGN, indent)),
        Stmt::Try {
            body,
            catch_var,
            catch_body,
            finally_body,
        } => {
            let mut out = format!("try {}", stmt_at(body, indent));
            if let Some(catch_body) = catch_body {
                match catch_var {
                    Some(var) => out.push_str(&format!(" catch ({}) ", var)),
                    None => out.push_str(" catch "),
                }
                out.push_str(&stmt_at(catch_body, indent));
            }
            if let Some(finally_body) = finally_body {
                out.push_str(" finally ");
                out.push_str(&stmt_at(finally_body, indent));
            }
            out
        }
        Stmt::Expr { expr } => format!("{};", statement_expr_at(expr, indent)),
        Stmt::Break => "break;".to_string(),
        Stmt::Continue => "continue;".to_string(),
        Stmt::Empty => ";".to_string(),
    }
}

/* ===================== Functions ===================== */

fn params_text(func: &FunctionDef) -> String {
    let mut params = func.params.clone();
    if let Some(rest) = &func.rest {
        params.push(format!("...{}", rest));
    }
    params.join(", ")
}

fn function_at(func: &FunctionDef, indent: usize) -> String {
    let prefix = if func.is_async { "async " } else { "" };

    if func.is_arrow {
        let params = if func.params.len() == 1 && func.rest.is_none() {
            func.params[0].clone()
        } else {
            format!("({})", params_text(func))
        };
        let body = match &func.body {
            FunctionBody::Block { body } => block_at(body, indent),
            FunctionBody::Expr { expr } => {
                let text = expr_at(expr, PREC_ASSIGN, indent);
                if text.starts_with('{') {
                    format!("({})", text)
                } else {
                    text
                }
            }
        };
        return format!("{}{} => {}", prefix, params, body);
    }

    let body = match &func.body {
        FunctionBody::Block { body } => block_at(body, indent),
        FunctionBody::Expr { expr } => block_at(
            &[Stmt::Return {
                value: Some(expr.as_ref().clone()),
            }],
            indent,
        ),
    };

    match &func.name {
        Some(name) => format!("{}function {}({}) {}", prefix, name, params_text(func), body),
        None => format!("{}function ({}) {}", prefix, params_text(func), body),
    }
}

/* ===================== Expressions ===================== */

fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

/// Escape raw text for the inside of a template literal
pub fn escape_template(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace("${", "\\${")
}

fn is_plain_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// `new` callees are restricted to a member chain over a primary
fn is_member_chain(expr: &Expr) -> bool {
    match expr {
        Expr::Member { object, .. } | Expr::Index { object, .. } => is_member_chain(object),
        Expr::Call { .. } | Expr::New { .. } => false,
        other => precedence(other) == PREC_PRIMARY,
    }
}

fn args_text(args: &[Expr], indent: usize) -> String {
    args.iter()
        .map(|arg| expr_at(arg, PREC_ASSIGN, indent))
        .collect::<Vec<_>>()
        .join(", ")
}

fn expr_at(expr: &Expr, min_prec: u8, indent: usize) -> String {
    let text = expr_text(expr, indent);
    if precedence(expr) < min_prec {
        format!("({})", text)
    } else {
        text
    }
}

fn expr_text(expr: &Expr, indent: usize) -> String {
    match expr {
        Expr::LitBool { v } => v.to_string(),
        Expr::LitNum { v } => v.to_string(),
        Expr::LitStr { v } => quote_string(v),
        Expr::LitNull => "null".to_string(),
        Expr::LitUndefined => "undefined".to_string(),
        Expr::Template { quasis, exprs } => {
            let mut out = String::from("`");
            for (i, quasi) in quasis.iter().enumerate() {
                out.push_str(&escape_template(quasi));
                if let Some(sub) = exprs.get(i) {
                    out.push_str("${");
                    out.push_str(&expr_at(sub, PREC_ASSIGN, indent));
                    out.push('}');
                }
            }
            out.push('`');
            out
        }
        Expr::LitList { elements } => format!("[{}]", args_text(elements, indent)),
        Expr::LitObj { properties } => {
            if properties.is_empty() {
                return "{}".to_string();
            }
            let parts: Vec<String> = properties
                .iter()
                .map(|(key, value)| match value {
                    Expr::Ident { name } if name == key => key.clone(),
                    _ => {
                        let key_text = if is_plain_key(key) {
                            key.clone()
                        } else {
                            quote_string(key)
                        };
                        format!("{}: {}", key_text, expr_at(value, PREC_ASSIGN, indent))
                    }
                })
                .collect();
            format!("{{ {} }}", parts.join(", "))
        }
        Expr::Ident { name } => name.clone(),
        Expr::Member {
            object,
            property,
            optional,
        } => {
            let access = if *optional { "?." } else { "." };
            format!("{}{}{}", expr_at(object, PREC_CALL, indent), access, property)
        }
        Expr::Index { object, index } => format!(
            "{}[{}]",
            expr_at(object, PREC_CALL, indent),
            expr_at(index, PREC_ASSIGN, indent)
        ),
        Expr::Call { callee, args } => format!(
            "{}({})",
            expr_at(callee, PREC_CALL, indent),
            args_text(args, indent)
        ),
        Expr::New { callee, args } => {
            let callee_text = if is_member_chain(callee) {
                expr_text(callee, indent)
            } else {
                format!("({})", expr_text(callee, indent))
            };
            format!("new {}({})", callee_text, args_text(args, indent))
        }
        Expr::Await { inner } => format!("await {}", expr_at(inner, PREC_UNARY, indent)),
        Expr::Unary { op, operand } => {
            let operand_text = expr_at(operand, PREC_UNARY, indent);
            match op {
                UnaryOp::Not => format!("!{}", operand_text),
                UnaryOp::Typeof => format!("typeof {}", operand_text),
                UnaryOp::Neg | UnaryOp::Plus => {
                    let symbol = if *op == UnaryOp::Neg { "-" } else { "+" };
                    if operand_text.starts_with('-') || operand_text.starts_with('+') {
                        format!("{} {}", symbol, operand_text)
                    } else {
                        format!("{}{}", symbol, operand_text)
                    }
                }
            }
        }
        Expr::Update { op, prefix, target } => {
            let symbol = match op {
                UpdateOp::Inc => "++",
                UpdateOp::Dec => "--",
            };
            let target_text = expr_at(target, PREC_CALL, indent);
            if *prefix {
                format!("{}{}", symbol, target_text)
            } else {
                format!("{}{}", target_text, symbol)
            }
        }
        Expr::Binary { op, left, right } => {
            let prec = binary_precedence(*op);
            format!(
                "{} {} {}",
                expr_at(left, prec, indent),
                binary_symbol(*op),
                expr_at(right, prec + 1, indent)
            )
        }
        Expr::Logical { op, left, right } => {
            let prec = precedence(expr);
            format!(
                "{} {} {}",
                expr_at(left, prec, indent),
                logical_symbol(*op),
                expr_at(right, prec + 1, indent)
            )
        }
        Expr::Ternary {
            condition,
            consequent,
            alternate,
        } => format!(
            "{} ? {} : {}",
            expr_at(condition, PREC_NULLISH, indent),
            expr_at(consequent, PREC_ASSIGN, indent),
            expr_at(alternate, PREC_ASSIGN, indent)
        ),
        Expr::Assign { op, target, value } => format!(
            "{} {} {}",
            expr_at(target, PREC_CALL, indent),
            assign_symbol(*op),
            expr_at(value, PREC_ASSIGN, indent)
        ),
        Expr::Function { func } => function_at(func, indent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn reprint(source: &str) -> String {
        let program = parse_program(source).unwrap();
        print_program(&program)
    }

    #[test]
    fn test_print_declarations() {
        assert_eq!(reprint("const a = 1; let b"), "const a = 1;\nlet b;");
        assert_eq!(
            reprint("const { x, y } = point"),
            "const { x, y } = point;"
        );
    }

    #[test]
    fn test_print_block_indentation() {
        assert_eq!(
            reprint("while (true) { console.log(\"hey!\") }"),
            "while (true) {\n    console.log('hey!');\n}"
        );
    }

    #[test]
    fn test_print_nested_function() {
        let source = "function outer(a, ...rest) { if (a) { return rest } }";
        assert_eq!(
            reprint(source),
            "function outer(a, ...rest) {\n    if (a) {\n        return rest;\n    }\n}"
        );
    }

    #[test]
    fn test_print_keeps_grouping() {
        assert_eq!(reprint("(a + b) * c"), "(a + b) * c;");
        assert_eq!(reprint("a + b * c"), "a + b * c;");
        assert_eq!(reprint("a - (b - c)"), "a - (b - c);");
        assert_eq!(reprint("-(-x)"), "- -x;");
    }

    #[test]
    fn test_print_arrows_and_objects() {
        assert_eq!(reprint("xs.map(x => x + 1)"), "xs.map(x => x + 1);");
        assert_eq!(reprint("const f = () => ({ a: 1 })"), "const f = () => ({ a: 1 });");
        assert_eq!(reprint("({ a, 'b c': 2 })"), "({ a, 'b c': 2 });");
    }

    #[test]
    fn test_print_template_and_strings() {
        assert_eq!(reprint("`sum ${a + b}!`"), "`sum ${a + b}!`;");
        assert_eq!(reprint("'it\\'s'"), "'it\\'s';");
    }

    #[test]
    fn test_output_reparses_to_same_tree() {
        let source = r#"
            async function run(items) {
                for (let i = 0; i < items.length; i++) {
                    try { await work(items[i]) } catch (e) { log(e.message) } finally { done++ }
                }
                for (const k in table) total += table[k]
                return a?.b ?? (c ? d : e)
            }
            const inst = new Shape.Circle(1, 2)
        "#;
        let first = parse_program(source).unwrap();
        let second = parse_program(&print_program(&first)).unwrap();
        assert_eq!(first, second);
    }
}
