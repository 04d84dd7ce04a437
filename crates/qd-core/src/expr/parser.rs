//! Expression parser using pest

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use super::{BinOp, Expr, ExprError, ExprResult, Quantity};
use crate::units::Unit;

#[derive(Parser)]
#[grammar = "expr/expr.pest"]
struct ExprParser;

/// Parse an expression such as `"100um"` or `"(xx + 2*gap) / 2"`
pub fn parse(source: &str) -> ExprResult<Expr> {
    let mut pairs = ExprParser::parse(Rule::expression, source)
        .map_err(|e| ExprError::Parse(e.to_string()))?;

    let sum = pairs
        .next()
        .and_then(|expression| expression.into_inner().next())
        .ok_or_else(|| ExprError::Parse(format!("empty expression: {:?}", source)))?;

    build_sum(sum)
}

fn malformed(rule: &str) -> ExprError {
    ExprError::Parse(format!("malformed {}", rule))
}

fn build_sum(pair: Pair<Rule>) -> ExprResult<Expr> {
    let mut inner = pair.into_inner();
    let mut lhs = build_product(inner.next().ok_or_else(|| malformed("sum"))?)?;

    while let Some(op) = inner.next() {
        let rhs = build_product(inner.next().ok_or_else(|| malformed("sum"))?)?;
        let op = if op.as_str() == "+" {
            BinOp::Add
        } else {
            BinOp::Sub
        };
        lhs = Expr::binary(op, lhs, rhs);
    }

    Ok(lhs)
}

fn build_product(pair: Pair<Rule>) -> ExprResult<Expr> {
    let mut inner = pair.into_inner();
    let mut lhs = build_unary(inner.next().ok_or_else(|| malformed("product"))?)?;

    while let Some(op) = inner.next() {
        let rhs = build_unary(inner.next().ok_or_else(|| malformed("product"))?)?;
        let op = if op.as_str() == "*" {
            BinOp::Mul
        } else {
            BinOp::Div
        };
        lhs = Expr::binary(op, lhs, rhs);
    }

    Ok(lhs)
}

fn build_unary(pair: Pair<Rule>) -> ExprResult<Expr> {
    let mut negations = 0usize;
    let mut operand = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::neg => negations += 1,
            _ => operand = Some(build_primary(inner)?),
        }
    }

    let operand = operand.ok_or_else(|| malformed("unary"))?;
    // "--x" is x
    if negations % 2 == 1 {
        Ok(-operand)
    } else {
        Ok(operand)
    }
}

fn build_primary(pair: Pair<Rule>) -> ExprResult<Expr> {
    match pair.as_rule() {
        Rule::quantity => build_quantity(pair),
        Rule::ident => Ok(Expr::Var(pair.as_str().to_string())),
        Rule::sum => build_sum(pair),
        _ => Err(malformed("primary")),
    }
}

fn build_quantity(pair: Pair<Rule>) -> ExprResult<Expr> {
    let mut value = None;
    let mut unit = Unit::None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::number => {
                let number = inner
                    .as_str()
                    .parse::<f64>()
                    .map_err(|e| ExprError::Parse(format!("{}: {}", inner.as_str(), e)))?;
                value = Some(number);
            }
            Rule::unit => {
                unit = Unit::parse(inner.as_str())
                    .ok_or_else(|| ExprError::UnknownUnit(inner.as_str().to_string()))?;
            }
            _ => {}
        }
    }

    let value = value.ok_or_else(|| malformed("quantity"))?;
    Ok(Expr::Quantity(Quantity { value, unit }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity_with_unit() {
        let expr = parse("100um").unwrap();
        assert_eq!(expr, Expr::quantity(100.0, Unit::Micrometer));
    }

    #[test]
    fn test_parse_exponent_before_unit() {
        let expr = parse("1.5e-3mm").unwrap();
        assert_eq!(expr, Expr::quantity(1.5e-3, Unit::Millimeter));
    }

    #[test]
    fn test_precedence() {
        let expr = parse("a + b * 2").unwrap();
        match expr {
            Expr::Binary { op, lhs, rhs } => {
                assert_eq!(op, BinOp::Add);
                assert_eq!(*lhs, Expr::Var("a".into()));
                assert!(matches!(*rhs, Expr::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("expected a sum, got {:?}", other),
        }
    }

    #[test]
    fn test_subtraction_is_left_associative() {
        let expr = parse("a - b - c").unwrap();
        assert_eq!(expr.to_string(), "a - b - c");
        let expr = parse("a - (b - c)").unwrap();
        assert_eq!(expr.to_string(), "a - (b - c)");
    }

    #[test]
    fn test_unknown_unit() {
        assert_eq!(
            parse("3parsec"),
            Err(ExprError::UnknownUnit("parsec".to_string()))
        );
    }

    #[test]
    fn test_garbage_is_parse_error() {
        assert!(matches!(parse("2 +"), Err(ExprError::Parse(_))));
        assert!(matches!(parse(""), Err(ExprError::Parse(_))));
    }
}
