//! Statement executor.
//!
//! An [`Executor`] borrows the request [`Context`] and the [`Process`] record
//! for the duration of one request (or one direct subroutine run). Statement
//! lists run sequentially; control transfer is reported upward as a [`Flow`]
//! until the construct that owns it handles it: `break` by the enclosing
//! switch, `goto` by the statement list that holds the destination, and
//! everything else by the subroutine boundary.

use super::process::Process;
use crate::ast::{
    CaseTest, Expression, ExpressionKind, IfStatement, Statement, StatementKind, SubroutineDeclaration,
    SwitchStatement,
};
use crate::context::{Context, ReturnState, Scope, TestingState};
use crate::error::{FunctionError, InterpreterError, InterpreterResult};
use crate::function;
use crate::value::operator::{capture, compile};
use crate::value::{Value, ValueType};
use crate::variable;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use http::StatusCode;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Target for messages emitted by VCL `log` statements.
pub const VCL_LOG_TARGET: &str = "edgevcl::vcl";

/// How a statement (or statement list) finished.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Flow {
    /// Fall through to the next statement.
    Next,
    /// `break;`
    Break,
    /// `goto label;` not yet resolved.
    Goto(String),
    /// `return;` or `return(state);`
    Return(Option<ReturnState>),
    /// `return value;` from a functional subroutine.
    Value(Value),
    /// `restart;`
    Restart,
    /// `error ...;`
    Error,
}

/// One active subroutine invocation.
#[derive(Debug)]
pub(crate) struct Frame {
    name: String,
    returns: Option<ValueType>,
}

/// Runs statements and expressions against a request context.
pub(crate) struct Executor<'a> {
    pub(crate) ctx: &'a mut Context,
    pub(crate) process: &'a mut Process,
    frames: Vec<Frame>,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(ctx: &'a mut Context, process: &'a mut Process) -> Self {
        Self {
            ctx,
            process,
            frames: Vec::new(),
        }
    }

    /// Run the subroutine `name` as the body of `scope` and record how it ended.
    ///
    /// A reserved subroutine the program does not declare ends with the
    /// scope's default return state.
    pub(crate) fn run_subroutine(
        &mut self,
        name: &str,
        scope: Scope,
    ) -> InterpreterResult<TestingState> {
        self.ctx.enter_subroutine(scope);
        self.ctx.locals.clear();
        let declarations = Arc::clone(&self.ctx.declarations);
        let flow = match declarations.subroutines.get(name) {
            Some(subroutine) => {
                debug!(subroutine = name, %scope, "entering subroutine");
                self.process.subroutines.push(name.to_string());
                self.frames.push(Frame {
                    name: name.to_string(),
                    returns: None,
                });
                let flow = self.run_block(&subroutine.body);
                self.frames.pop();
                flow.map_err(|err| err.at(&subroutine.token))?
            }
            None if Scope::from_subroutine(name).is_some() => Flow::Next,
            None => return Err(InterpreterError::UndefinedSubroutine(name.to_string())),
        };

        let ending = match flow {
            Flow::Restart => TestingState::Restart,
            Flow::Error => TestingState::Error {
                status: self.ctx.object_status.as_integer().unwrap_or_default(),
                response: self.ctx.object_response.to_string(),
            },
            Flow::Return(Some(state)) => TestingState::Returned { state },
            Flow::Goto(label) => return Err(InterpreterError::UndefinedGoto(label)),
            Flow::Next | Flow::Break | Flow::Return(None) | Flow::Value(_) => {
                TestingState::Returned {
                    state: default_return(scope),
                }
            }
        };
        debug!(subroutine = name, ending = ?ending, "leaving subroutine");
        self.ctx.testing_state = Some(ending.clone());
        Ok(ending)
    }

    /// Run a statement list, resolving `goto` targets that live in it.
    pub(crate) fn run_block(&mut self, statements: &[Statement]) -> InterpreterResult<Flow> {
        let mut index = 0;
        while let Some(statement) = statements.get(index) {
            index += 1;
            match self.execute(statement)? {
                Flow::Next => {}
                Flow::Goto(label) => match destination(statements, &label) {
                    Some(position) => index = position + 1,
                    None => return Ok(Flow::Goto(label)),
                },
                other => return Ok(other),
            }
        }
        Ok(Flow::Next)
    }

    fn execute(&mut self, statement: &Statement) -> InterpreterResult<Flow> {
        self.execute_kind(&statement.kind)
            .map_err(|err| err.at(&statement.token))
    }

    fn execute_kind(&mut self, kind: &StatementKind) -> InterpreterResult<Flow> {
        match kind {
            StatementKind::Block(statements) => return self.run_block(statements),
            StatementKind::Declare { name, value_type } => {
                self.ctx.locals.insert(name.clone(), Value::not_set(*value_type));
            }
            StatementKind::Set {
                target,
                operator,
                value,
            } => {
                let value = self.evaluate(value)?;
                variable::set(self.ctx, target, *operator, &value)?;
            }
            StatementKind::Unset { target } => variable::unset(self.ctx, target)?,
            StatementKind::Add { target, value } => {
                let value = self.evaluate(value)?;
                variable::add(self.ctx, target, &value)?;
            }
            StatementKind::Call { subroutine } => return self.call(subroutine),
            StatementKind::If(branch) => return self.branch(branch),
            StatementKind::Switch(switch) => return self.switch(switch),
            StatementKind::Restart => {
                self.require(self.ctx.scope.allows_restart(), "restart")?;
                return Ok(Flow::Restart);
            }
            StatementKind::Esi => self.ctx.trigger_esi = true,
            StatementKind::Log { value } => {
                let message = self.evaluate(value)?.to_string();
                info!(target: VCL_LOG_TARGET, scope = %self.ctx.scope, "{message}");
                self.process.logs.push(message);
            }
            StatementKind::Synthetic { value, base64 } => {
                self.require(self.ctx.scope == Scope::Error, "synthetic")?;
                let text = self.evaluate(value)?.to_string();
                let body = if *base64 {
                    let bytes = STANDARD.decode(text.as_bytes()).map_err(|err| {
                        InterpreterError::InvalidValue {
                            name: "synthetic.base64".to_string(),
                            reason: err.to_string(),
                        }
                    })?;
                    String::from_utf8_lossy(&bytes).into_owned()
                } else {
                    text
                };
                *self.ctx.object.body_mut() = body;
            }
            StatementKind::Return { value } => return self.return_statement(value.as_ref()),
            StatementKind::Error { code, response } => {
                self.require(self.ctx.scope.allows_error(), "error")?;
                let status = match code {
                    Some(code) => self.integer(code, "error status")?,
                    None => i64::from(StatusCode::SERVICE_UNAVAILABLE.as_u16()),
                };
                let response = match response {
                    Some(response) => self.evaluate(response)?.to_string(),
                    None => reason_phrase(status).to_string(),
                };
                self.ctx.object_status = Value::integer(status);
                self.ctx.object_response = Value::string(response);
                return Ok(Flow::Error);
            }
            StatementKind::Goto { destination } => {
                let owner = self.ctx.declarations.gotos.get(destination);
                let current = self.frames.last().map(|frame| &frame.name);
                if owner.is_none() || owner != current {
                    return Err(InterpreterError::UndefinedGoto(destination.clone()));
                }
                return Ok(Flow::Goto(destination.clone()));
            }
            StatementKind::GotoDestination { .. } => {}
            StatementKind::FunctionCall {
                function,
                arguments,
            } => {
                let callee = function::resolve(self.ctx, function)?;
                if !callee.statement_callable {
                    return Err(InterpreterError::NotStatementCallable(function.clone()));
                }
                let arguments = self.arguments(&callee.signature, arguments)?;
                match callee.call(self.ctx, &arguments) {
                    Ok(_) => {}
                    Err(FunctionError::Fallback { name, message, .. }) => {
                        warn!(function = %name, %message, "function failed, result discarded");
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            StatementKind::Break => return Ok(Flow::Break),
        }
        Ok(Flow::Next)
    }

    fn require(&self, allowed: bool, statement: &str) -> InterpreterResult<()> {
        if allowed {
            Ok(())
        } else {
            Err(InterpreterError::StatementNotAllowed {
                statement: statement.to_string(),
                scope: self.ctx.scope,
            })
        }
    }

    /// `call name;` with locals saved around the callee.
    fn call(&mut self, name: &str) -> InterpreterResult<Flow> {
        let declarations = Arc::clone(&self.ctx.declarations);
        let subroutine = declarations
            .subroutines
            .get(name)
            .ok_or_else(|| InterpreterError::UndefinedSubroutine(name.to_string()))?;
        debug!(subroutine = name, "call");
        self.process.subroutines.push(name.to_string());
        let flow = self.invoke(subroutine, None)?;
        Ok(match flow {
            Flow::Next | Flow::Break | Flow::Return(None) | Flow::Value(_) => Flow::Next,
            Flow::Goto(label) => return Err(InterpreterError::UndefinedGoto(label)),
            other => other,
        })
    }

    /// Run a subroutine body in a fresh frame with its own locals.
    pub(crate) fn invoke(
        &mut self,
        subroutine: &SubroutineDeclaration,
        returns: Option<ValueType>,
    ) -> InterpreterResult<Flow> {
        let saved = std::mem::take(&mut self.ctx.locals);
        self.ctx.regex_matched_values.clear();
        self.frames.push(Frame {
            name: subroutine.name.clone(),
            returns,
        });
        let flow = self.run_block(&subroutine.body);
        self.frames.pop();
        self.ctx.locals = saved;
        flow
    }

    fn branch(&mut self, branch: &IfStatement) -> InterpreterResult<Flow> {
        if self.condition(&branch.condition)? {
            return self.run_block(&branch.consequence);
        }
        for alternative in &branch.alternatives {
            if self.condition(&alternative.condition)? {
                return self.run_block(&alternative.consequence);
            }
        }
        match &branch.alternative {
            Some(statements) => self.run_block(statements),
            None => Ok(Flow::Next),
        }
    }

    /// First matching case wins, then `default`. A case only continues into
    /// the next one when it is marked `fallthrough`.
    fn switch(&mut self, switch: &SwitchStatement) -> InterpreterResult<Flow> {
        let subject = self.evaluate(&switch.control)?.to_string();
        let mut matched = None;
        for (index, case) in switch.cases.iter().enumerate() {
            let hit = match &case.test {
                Some(CaseTest::Equal(expected)) => subject == *expected,
                Some(CaseTest::Regex(pattern)) => {
                    let regex = compile(pattern)
                        .map_err(|err| InterpreterError::from(err).at(&case.token))?;
                    capture(&regex, &subject, &mut self.ctx.regex_matched_values)
                }
                None => false,
            };
            if hit {
                matched = Some(index);
                break;
            }
        }
        let Some(start) = matched.or(switch.default) else {
            return Ok(Flow::Next);
        };
        for case in switch.cases.get(start..).unwrap_or_default() {
            match self.run_block(&case.statements)? {
                Flow::Break => return Ok(Flow::Next),
                Flow::Next if case.fallthrough => {}
                Flow::Next => return Ok(Flow::Next),
                other => return Ok(other),
            }
        }
        Ok(Flow::Next)
    }

    fn return_statement(&mut self, value: Option<&Expression>) -> InterpreterResult<Flow> {
        if let Some(returns) = self.frames.last().and_then(|frame| frame.returns) {
            let value = match value {
                Some(expression) => self.evaluate(expression)?,
                None => Value::not_set(returns),
            };
            return Ok(Flow::Value(value));
        }
        let Some(expression) = value else {
            return Ok(Flow::Return(None));
        };
        let state = match &expression.kind {
            ExpressionKind::Ident(name) => name.as_str(),
            _ => {
                return Err(InterpreterError::InvalidReturnState {
                    state: "expression".to_string(),
                    scope: self.ctx.scope,
                });
            }
        };
        ReturnState::from_name(state)
            .filter(|parsed| self.ctx.scope.legal_returns().contains(parsed))
            .map(|parsed| Flow::Return(Some(parsed)))
            .ok_or_else(|| InterpreterError::InvalidReturnState {
                state: state.to_string(),
                scope: self.ctx.scope,
            })
    }
}

fn destination(statements: &[Statement], label: &str) -> Option<usize> {
    statements.iter().position(|statement| {
        matches!(&statement.kind, StatementKind::GotoDestination { name } if name == label)
    })
}

pub(crate) fn default_return(scope: Scope) -> ReturnState {
    scope.default_return().unwrap_or(ReturnState::Lookup)
}

pub(crate) fn reason_phrase(status: i64) -> &'static str {
    u16::try_from(status)
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Unknown")
}
