//! Minimal expression engine
//!
//! Stands in for the full expression language in the CLI and tests. Supported
//! forms: `$var`, `.` (context item), string and integer literals, `+`/`-` on
//! integers, and the functions `concat`, `string`, `qname`, `arg`, `error`,
//! `true` and `false`.

use std::any::Any;
use std::sync::Arc;

use nom::{
    branch::alt,
    bytes::complete::{take_until, take_while, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{all_consuming, map, map_res, recognize, value},
    multi::{fold_many0, separated_list0},
    sequence::{delimited, pair, preceded},
    IResult,
};
use tracing::trace;

use crate::domain::{CompileError, CompiledProgram, EvalContext, EvalError, ExpressionEngine, Program, QName, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
}

#[derive(Debug, Clone, PartialEq)]
enum Ast {
    Literal(Value),
    Variable(String),
    ContextItem,
    Call(String, Vec<Ast>),
    Binary(BinOp, Box<Ast>, Box<Ast>),
}

#[derive(Debug)]
struct SimpleProgram {
    source: String,
    ast: Ast,
}

impl CompiledProgram for SimpleProgram {
    fn source(&self) -> &str {
        &self.source
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn parse(source: &str) -> Result<Ast, CompileError> {
    let error = |message: String| CompileError {
        source_text: source.to_string(),
        message,
    };
    let input = source.trim();
    if input.is_empty() {
        return Err(error("empty expression".to_string()));
    }
    let ast = match all_consuming(delimited(multispace0, additive, multispace0))(input) {
        Ok((_, ast)) => ast,
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let position = input.len() - e.input.len();
            return Err(error(format!("unexpected input at {}: `{}`", position, e.input)));
        }
        Err(nom::Err::Incomplete(_)) => return Err(error("incomplete expression".to_string())),
    };
    check_calls(&ast).map_err(error)?;
    Ok(ast)
}

// ============================================================
// GRAMMAR
// ============================================================

fn additive(input: &str) -> IResult<&str, Ast> {
    let (input, first) = primary(input)?;
    fold_many0(
        pair(delimited(multispace0, bin_op, multispace0), primary),
        move || first.clone(),
        |lhs, (op, rhs)| Ast::Binary(op, Box::new(lhs), Box::new(rhs)),
    )(input)
}

fn bin_op(input: &str) -> IResult<&str, BinOp> {
    alt((value(BinOp::Add, char('+')), value(BinOp::Sub, char('-'))))(input)
}

fn primary(input: &str) -> IResult<&str, Ast> {
    alt((
        variable,
        string_literal,
        integer,
        call,
        value(Ast::ContextItem, char('.')),
        delimited(pair(char('('), multispace0), additive, pair(multispace0, char(')'))),
    ))(input)
}

fn variable(input: &str) -> IResult<&str, Ast> {
    map(
        preceded(
            char('$'),
            recognize(pair(
                take_while1(|c: char| c.is_alphabetic() || c == '_'),
                take_while(|c: char| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')),
            )),
        ),
        |name: &str| Ast::Variable(name.to_string()),
    )(input)
}

fn string_literal(input: &str) -> IResult<&str, Ast> {
    map(
        alt((
            delimited(char('\''), take_until("'"), char('\'')),
            delimited(char('"'), take_until("\""), char('"')),
        )),
        |text: &str| Ast::Literal(Value::text(text)),
    )(input)
}

fn integer(input: &str) -> IResult<&str, Ast> {
    map_res(digit1, |digits: &str| digits.parse::<i64>().map(|i| Ast::Literal(Value::Integer(i))))(input)
}

fn function_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || matches!(c, '_' | '-')),
    ))(input)
}

fn call(input: &str) -> IResult<&str, Ast> {
    map(
        pair(
            function_name,
            delimited(
                pair(char('('), multispace0),
                separated_list0(delimited(multispace0, char(','), multispace0), additive),
                pair(multispace0, char(')')),
            ),
        ),
        |(name, args)| Ast::Call(name.to_string(), args),
    )(input)
}

/// Reject unknown functions and wrong arities at compile time.
fn check_calls(ast: &Ast) -> Result<(), String> {
    match ast {
        Ast::Call(name, args) => {
            let arity_ok = match name.as_str() {
                "concat" => args.len() >= 2,
                "string" | "qname" | "arg" => args.len() == 1,
                "error" => args.len() == 2,
                "true" | "false" => args.is_empty(),
                _ => return Err(format!("unknown function {}()", name)),
            };
            if !arity_ok {
                return Err(format!("wrong number of arguments to {}()", name));
            }
            args.iter().try_for_each(check_calls)
        }
        Ast::Binary(_, lhs, rhs) => {
            check_calls(lhs)?;
            check_calls(rhs)
        }
        _ => Ok(()),
    }
}

/// Engine for the minimal expression language.
#[derive(Debug, Default)]
pub struct SimpleEngine;

impl SimpleEngine {
    fn eval(&self, ast: &Ast, ctx: &EvalContext, args: &[Value]) -> Result<Value, EvalError> {
        match ast {
            Ast::Literal(v) => Ok(v.clone()),
            Ast::Variable(name) => ctx
                .variable(name)
                .cloned()
                .ok_or_else(|| EvalError::UndefinedVariable(name.clone())),
            Ast::ContextItem => ctx.context_item().cloned().ok_or_else(|| EvalError::Raised {
                code: "XPDY0002".to_string(),
                message: "context item is absent".to_string(),
            }),
            Ast::Binary(op, lhs, rhs) => {
                match (self.eval(lhs, ctx, args)?, self.eval(rhs, ctx, args)?) {
                    (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(match op {
                        BinOp::Add => a + b,
                        BinOp::Sub => a - b,
                    })),
                    (a, b) => Err(EvalError::Type(format!("cannot combine {} and {}", a, b))),
                }
            }
            Ast::Call(name, call_args) => {
                let values = call_args
                    .iter()
                    .map(|a| self.eval(a, ctx, args))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(name, values, args)
            }
        }
    }

    fn call(&self, name: &str, values: Vec<Value>, args: &[Value]) -> Result<Value, EvalError> {
        let text = |v: &Value| v.to_string();
        match name {
            "concat" => Ok(Value::Text(values.iter().map(text).collect())),
            "string" => Ok(Value::Text(values.iter().map(text).collect())),
            "true" => Ok(Value::Boolean(true)),
            "false" => Ok(Value::Boolean(false)),
            "qname" => {
                let raw = values.first().map(text).unwrap_or_default();
                QName::parse(&raw)
                    .map(Value::QName)
                    .map_err(|e| EvalError::Type(e.to_string()))
            }
            "arg" => match values.first() {
                Some(Value::Integer(i)) if *i >= 0 => args
                    .get(*i as usize)
                    .cloned()
                    .ok_or_else(|| EvalError::Type(format!("no argument at position {}", i))),
                other => Err(EvalError::Type(format!("invalid argument index {:?}", other))),
            },
            "error" => Err(EvalError::Raised {
                code: values.first().map(text).unwrap_or_default(),
                message: values.get(1).map(text).unwrap_or_default(),
            }),
            other => Err(EvalError::Type(format!("unknown function {}()", other))),
        }
    }
}

impl ExpressionEngine for SimpleEngine {
    fn compile(&self, text: &str) -> Result<Program, CompileError> {
        let ast = parse(text)?;
        trace!("compiled `{}`", text);
        Ok(Arc::new(SimpleProgram {
            source: text.to_string(),
            ast,
        }))
    }

    fn evaluate(&self, program: &Program, ctx: &EvalContext, args: &[Value]) -> Result<Value, EvalError> {
        let program = program
            .as_any()
            .downcast_ref::<SimpleProgram>()
            .ok_or_else(|| EvalError::Type(format!("foreign program `{}`", program.source())))?;
        self.eval(&program.ast, ctx, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn run(text: &str, ctx: &EvalContext) -> Result<Value, EvalError> {
        let engine = SimpleEngine;
        let program = engine.compile(text).unwrap();
        engine.evaluate(&program, ctx, &[Value::text("a0")])
    }

    #[rstest]
    #[case("'hello'", Value::text("hello"))]
    #[case("concat('a', $x, 'c')", Value::text("a1c"))]
    #[case("$x + 2", Value::Integer(3))]
    #[case("qname('eg:Revenue')", Value::QName(QName::new(Some("eg"), "Revenue")))]
    #[case("arg(0)", Value::text("a0"))]
    #[case("true()", Value::Boolean(true))]
    #[case(" concat( 'a' , ( $x + 2 ) - 1 ) ", Value::text("a2"))]
    #[case("\"double\"", Value::text("double"))]
    fn test_evaluate(#[case] text: &str, #[case] expected: Value) {
        let mut ctx = EvalContext::new();
        ctx.bind("x", Value::Integer(1));
        assert_eq!(run(text, &ctx).unwrap(), expected);
    }

    #[test]
    fn test_error_function_raises() {
        let ctx = EvalContext::new();
        let err = run("error('err:X', 'boom')", &ctx).unwrap_err();
        assert_eq!(
            err,
            EvalError::Raised {
                code: "err:X".to_string(),
                message: "boom".to_string()
            }
        );
        assert!(matches!(run("$missing", &ctx), Err(EvalError::UndefinedVariable(_))));
        assert!(run(".", &ctx).is_err());
    }

    #[rstest]
    #[case("")]
    #[case("concat('a'")]
    #[case("nosuch(1)")]
    #[case("'a' 'b'")]
    #[case("concat('a')")]
    #[case("$x +")]
    fn test_compile_errors(#[case] text: &str) {
        assert!(SimpleEngine.compile(text).is_err());
    }

    #[test]
    fn test_compile_error_names_unknown_function() {
        let err = SimpleEngine.compile("string(sum(1, 2))").unwrap_err();
        assert_eq!(err.message, "unknown function sum()");
    }
}
