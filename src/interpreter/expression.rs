//! Expression evaluation.

use super::executor::{Executor, Flow};
use crate::ast::{Expression, ExpressionKind, InfixOperator, PrefixOperator};
use crate::error::{FunctionError, InterpreterError, InterpreterResult, ValueError};
use crate::function::{self, Signature};
use crate::value::{Value, ValueType, operator, parse_rtime};
use crate::variable;
use std::sync::Arc;
use tracing::warn;

impl Executor<'_> {
    /// Evaluate `expression`, pinning any failure to its token.
    pub(crate) fn evaluate(&mut self, expression: &Expression) -> InterpreterResult<Value> {
        self.evaluate_kind(&expression.kind)
            .map_err(|err| err.at(&expression.token))
    }

    fn evaluate_kind(&mut self, kind: &ExpressionKind) -> InterpreterResult<Value> {
        let value = match kind {
            ExpressionKind::Ident(name) => return self.identifier(name),
            ExpressionKind::Ip(text) => {
                let ip = text
                    .parse()
                    .map_err(|_| ValueError::InvalidIp(text.clone()))?;
                Value::ip(ip)
            }
            ExpressionKind::String(text) => Value::string(text.as_str()),
            ExpressionKind::Integer(number) => Value::integer(*number),
            ExpressionKind::Float(number) => Value::float(*number),
            ExpressionKind::Boolean(flag) => Value::boolean(*flag),
            ExpressionKind::RTime(text) => Value::rtime(parse_rtime(text)?),
            ExpressionKind::Prefix { operator, right } => {
                let operand = self.evaluate(right)?;
                return self.prefix(*operator, operand);
            }
            ExpressionKind::Group(inner) => return self.evaluate(inner),
            ExpressionKind::Infix {
                left,
                operator,
                right,
            } => return self.infix(left, *operator, right),
            ExpressionKind::If {
                condition,
                consequence,
                alternative,
            } => {
                return if self.condition(condition)? {
                    self.evaluate(consequence)
                } else {
                    self.evaluate(alternative)
                };
            }
            ExpressionKind::Call {
                function,
                arguments,
            } => return self.call_function(function, arguments),
        };
        Ok(value.into_literal())
    }

    /// Declared names shadow variables: backends, ACLs, tables, then bare
    /// identifiers (goto labels, penalty boxes, rate counters).
    fn identifier(&mut self, name: &str) -> InterpreterResult<Value> {
        let declarations = &self.ctx.declarations;
        if let Some(backend) = declarations.backend(name) {
            return Ok(Value::Backend(Arc::clone(backend)));
        }
        if let Some(acl) = declarations.acls.get(name) {
            return Ok(Value::Acl(Arc::clone(acl)));
        }
        if declarations.tables.contains_key(name) {
            return Ok(Value::Table(name.to_string()));
        }
        if declarations.gotos.contains_key(name)
            || declarations.penaltyboxes.contains_key(name)
            || declarations.ratecounters.contains_key(name)
        {
            return Ok(Value::Ident(name.to_string()));
        }
        variable::get(self.ctx, name)
    }

    fn prefix(&mut self, operator: PrefixOperator, operand: Value) -> InterpreterResult<Value> {
        let unsupported = |operand: &Value| ValueError::UnsupportedOperator {
            operator: operator.to_string(),
            value_type: operand.value_type(),
        };
        let value = match (operator, operand) {
            (PrefixOperator::Not, operand) => match truthiness(&operand) {
                Some(flag) => Value::boolean(!flag),
                None => return Err(unsupported(&operand).into()),
            },
            (PrefixOperator::Minus, Value::Integer { value, literal, not_set }) => Value::Integer {
                value: value.wrapping_neg(),
                literal,
                not_set,
            },
            (PrefixOperator::Minus, Value::Float { value, literal, not_set }) => Value::Float {
                value: -value,
                literal,
                not_set,
            },
            (PrefixOperator::Minus, Value::RTime { value, literal, not_set }) => Value::RTime {
                value: -value,
                literal,
                not_set,
            },
            (
                PrefixOperator::Plus,
                operand @ (Value::Integer { .. } | Value::Float { .. } | Value::RTime { .. }),
            ) => operand,
            (_, operand) => return Err(unsupported(&operand).into()),
        };
        Ok(value)
    }

    /// `&&` and `||` short-circuit; everything else evaluates both sides and
    /// defers to the operator table. Regex operators record their captures.
    fn infix(
        &mut self,
        left: &Expression,
        operator: InfixOperator,
        right: &Expression,
    ) -> InterpreterResult<Value> {
        let lhs = self.evaluate(left)?;
        match operator {
            InfixOperator::And | InfixOperator::Or => {
                let short_circuit = operator == InfixOperator::Or;
                if self.truthy(&lhs, operator)? == short_circuit {
                    return Ok(Value::boolean(short_circuit));
                }
                let rhs = self.evaluate(right)?;
                Ok(Value::boolean(self.truthy(&rhs, operator)?))
            }
            _ => {
                let rhs = self.evaluate(right)?;
                Ok(operator::evaluate(
                    operator,
                    &lhs,
                    &rhs,
                    &mut self.ctx.regex_matched_values,
                )?)
            }
        }
    }

    fn truthy(&self, value: &Value, operator: InfixOperator) -> InterpreterResult<bool> {
        truthiness(value).ok_or_else(|| InterpreterError::TypeMismatch {
            context: format!("operand of {operator}"),
            expected: ValueType::Boolean,
            actual: value.value_type(),
        })
    }

    /// Evaluate an `if` or `elseif` condition.
    pub(crate) fn condition(&mut self, expression: &Expression) -> InterpreterResult<bool> {
        let value = self.evaluate(expression)?;
        truthiness(&value).ok_or_else(|| {
            InterpreterError::TypeMismatch {
                context: "condition".to_string(),
                expected: ValueType::Boolean,
                actual: value.value_type(),
            }
            .at(&expression.token)
        })
    }

    pub(crate) fn integer(&mut self, expression: &Expression, context: &str) -> InterpreterResult<i64> {
        let value = self.evaluate(expression)?;
        value.as_integer().ok_or_else(|| {
            InterpreterError::TypeMismatch {
                context: context.to_string(),
                expected: ValueType::Integer,
                actual: value.value_type(),
            }
            .at(&expression.token)
        })
    }

    /// Bare identifiers in ID positions are passed by name, unevaluated.
    pub(crate) fn arguments(
        &mut self,
        signature: &Signature,
        arguments: &[Expression],
    ) -> InterpreterResult<Vec<Value>> {
        arguments
            .iter()
            .enumerate()
            .map(|(position, argument)| match &argument.kind {
                ExpressionKind::Ident(name) if signature.takes_ident(position) => {
                    Ok(Value::Ident(name.clone()))
                }
                _ => self.evaluate(argument),
            })
            .collect()
    }

    /// Functional subroutines take precedence over builtins of the same name.
    fn call_function(&mut self, name: &str, arguments: &[Expression]) -> InterpreterResult<Value> {
        let declarations = Arc::clone(&self.ctx.declarations);
        if let Some(subroutine) = declarations.functional_subroutines.get(name) {
            if !arguments.is_empty() {
                return Err(FunctionError::ArgumentMustEmpty {
                    name: name.to_string(),
                    actual: arguments.len(),
                }
                .into());
            }
            let returns = subroutine.return_type.unwrap_or(ValueType::String);
            self.process.subroutines.push(name.to_string());
            let value = match self.invoke(subroutine, Some(returns))? {
                Flow::Value(value) => value,
                Flow::Goto(label) => return Err(InterpreterError::UndefinedGoto(label)),
                _ => Value::not_set(returns),
            };
            if !value.is_not_set() && value.value_type() != returns {
                return Err(InterpreterError::TypeMismatch {
                    context: format!("return value of {name}"),
                    expected: returns,
                    actual: value.value_type(),
                });
            }
            return Ok(value);
        }

        let function = function::resolve(self.ctx, name)?;
        let arguments = self.arguments(&function.signature, arguments)?;
        match function.call(self.ctx, &arguments) {
            Ok(value) => Ok(value),
            Err(FunctionError::Fallback {
                name,
                message,
                fallback,
            }) => {
                warn!(function = %name, %message, "function failed, using its fallback value");
                Ok(*fallback)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Booleans are themselves; strings are true when set.
fn truthiness(value: &Value) -> Option<bool> {
    match value {
        Value::Boolean { value, .. } => Some(*value),
        Value::String { not_set, .. } => Some(!not_set),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Declaration, Program, Statement, SubroutineDeclaration, TableDeclaration, TableEntry};
    use crate::config::InterpreterConfig;
    use crate::context::{Context, Declarations, Scope};
    use crate::interpreter::process::Process;
    use http::Request;

    fn context(program: Program) -> Context {
        let mut ctx = Context::new(
            Arc::new(Declarations::load(&program).unwrap()),
            &InterpreterConfig::default(),
            Request::builder()
                .uri("http://example.com/path?a=1")
                .body(String::new())
                .unwrap(),
            "192.0.2.1:4000".parse().unwrap(),
            fastrand::Rng::with_seed(1),
        );
        ctx.enter_subroutine(Scope::Recv);
        ctx
    }

    fn eval(ctx: &mut Context, expression: &Expression) -> InterpreterResult<Value> {
        let mut process = Process::default();
        Executor::new(ctx, &mut process).evaluate(expression)
    }

    #[test]
    fn literals_carry_the_literal_flag() {
        let mut ctx = context(Program::default());
        assert!(eval(&mut ctx, &Expression::string("x")).unwrap().is_literal());
        assert_eq!(
            eval(&mut ctx, &Expression::rtime("1d")).unwrap().as_rtime(),
            Some(chrono::TimeDelta::days(1))
        );
        let computed = Expression::infix(
            Expression::string("a"),
            InfixOperator::Plus,
            Expression::string("b"),
        );
        let value = eval(&mut ctx, &computed).unwrap();
        assert_eq!(value.as_str(), Some("ab"));
        assert!(!value.is_literal());
    }

    #[test]
    fn regex_captures_are_recorded() {
        let mut ctx = context(Program::default());
        let expression = Expression::infix(
            Expression::string("www.example.com"),
            InfixOperator::Regex,
            Expression::string(r"^([^.]+)\.([^.]+)\.([^.]+)$"),
        );
        assert_eq!(eval(&mut ctx, &expression).unwrap(), Value::boolean(true));
        assert_eq!(ctx.regex_matched_values["1"], "www");
        assert_eq!(ctx.regex_matched_values["3"], "com");

        let computed_pattern = Expression::infix(
            Expression::string("abc"),
            InfixOperator::Regex,
            Expression::infix(Expression::string("a"), InfixOperator::Plus, Expression::string("b")),
        );
        assert!(matches!(
            eval(&mut ctx, &computed_pattern).unwrap_err().root(),
            InterpreterError::Value(ValueError::NonLiteralPattern { .. })
        ));
    }

    #[test]
    fn logical_operators_short_circuit() {
        let mut ctx = context(Program::default());
        let or = Expression::infix(Expression::boolean(true), InfixOperator::Or, Expression::ident("no.such.variable"));
        assert_eq!(eval(&mut ctx, &or).unwrap(), Value::boolean(true));
        let and = Expression::infix(Expression::boolean(false), InfixOperator::And, Expression::ident("no.such.variable"));
        assert_eq!(eval(&mut ctx, &and).unwrap(), Value::boolean(false));
        let unset_header = Expression::prefix(PrefixOperator::Not, Expression::ident("req.http.X-Never"));
        assert_eq!(eval(&mut ctx, &unset_header).unwrap(), Value::boolean(true));
    }

    #[test]
    fn prefix_minus_keeps_the_type() {
        let mut ctx = context(Program::default());
        let negated = eval(
            &mut ctx,
            &Expression::prefix(PrefixOperator::Minus, Expression::integer(5)),
        )
        .unwrap();
        assert_eq!(negated.as_integer(), Some(-5));
        assert!(eval(
            &mut ctx,
            &Expression::prefix(PrefixOperator::Minus, Expression::string("x"))
        )
        .is_err());
    }

    #[test]
    fn if_expression_and_condition_types() {
        let mut ctx = context(Program::default());
        let choose = Expression::if_expr(
            Expression::ident("req.http.X-Missing"),
            Expression::string("present"),
            Expression::string("absent"),
        );
        assert_eq!(eval(&mut ctx, &choose).unwrap().as_str(), Some("absent"));
        let bad = Expression::if_expr(
            Expression::integer(1),
            Expression::string("a"),
            Expression::string("b"),
        );
        assert!(matches!(
            eval(&mut ctx, &bad).unwrap_err().root(),
            InterpreterError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn functional_subroutines_shadow_builtins() {
        let mut subroutine = SubroutineDeclaration::new(
            "std.toupper",
            vec![Statement::return_value(Expression::string("shadowed"))],
        );
        subroutine.return_type = Some(ValueType::String);
        let mut ctx = context(Program::new(vec![Declaration::Subroutine(subroutine)]));
        let value = eval(&mut ctx, &Expression::call("std.toupper", Vec::new())).unwrap();
        assert_eq!(value.as_str(), Some("shadowed"));
        let builtin = eval(
            &mut ctx,
            &Expression::call("std.tolower", vec![Expression::string("ABC")]),
        )
        .unwrap();
        assert_eq!(builtin.as_str(), Some("abc"));
    }

    #[test]
    fn fallback_errors_yield_the_fallback_value() {
        let table = TableDeclaration {
            name: "redirects".into(),
            entries: vec![TableEntry {
                key: "/old".into(),
                value: Expression::string("/new"),
            }],
            ..Default::default()
        };
        let mut ctx = context(Program::new(vec![Declaration::Table(table)]));
        let lookup = Expression::call(
            "table.lookup_integer",
            vec![
                Expression::ident("redirects"),
                Expression::string("/old"),
                Expression::integer(7),
            ],
        );
        assert_eq!(eval(&mut ctx, &lookup).unwrap().as_integer(), Some(7));
    }
}
