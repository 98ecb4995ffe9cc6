//! Syntax tree consumed by the runtime.
//!
//! The parser lives outside this crate; the runtime receives an already
//! validated tree. Every node category is a closed sum type so the executor
//! matches exhaustively. Trees are serde-serialisable so a host can hand a
//! program over as JSON, and the constructors below make building them in
//! code (tests, embedders) tolerable.

use crate::value::ValueType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source position attached to every node for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Token {
    /// Logical file name (main or include name).
    pub file: String,
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
}

impl Token {
    /// Create a token for the given position.
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() {
            write!(f, "{}:{}", self.line, self.column)
        } else {
            write!(f, "{}:{}:{}", self.file, self.line, self.column)
        }
    }
}

/// A complete program: top-level declarations in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Declarations in source order.
    pub declarations: Vec<Declaration>,
}

impl Program {
    /// Build a program from declarations.
    pub fn new(declarations: Vec<Declaration>) -> Self {
        Self { declarations }
    }
}

/// Top-level declarations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Declaration {
    /// `acl name { ... }`
    Acl(AclDeclaration),
    /// `backend name { ... }`
    Backend(BackendDeclaration),
    /// `director name type { ... }`
    Director(DirectorDeclaration),
    /// `table name [TYPE] { ... }`
    Table(TableDeclaration),
    /// `sub name [TYPE] { ... }`
    Subroutine(SubroutineDeclaration),
    /// `penaltybox name {}`
    Penaltybox(NamedDeclaration),
    /// `ratecounter name {}`
    Ratecounter(NamedDeclaration),
}

/// ACL declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AclDeclaration {
    /// Declaration position.
    #[serde(default)]
    pub token: Token,
    /// ACL name.
    pub name: String,
    /// CIDR entries in declaration order.
    pub entries: Vec<AclEntry>,
}

/// One `[!] "ip"[/mask];` line of an ACL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    /// Leading `!`.
    #[serde(default)]
    pub negated: bool,
    /// Address text.
    pub ip: String,
    /// Optional prefix length.
    #[serde(default)]
    pub mask: Option<u8>,
}

/// `.key = value;` property inside backend and director blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Property position.
    #[serde(default)]
    pub token: Token,
    /// Property name without the leading dot.
    pub key: String,
    /// Property value.
    pub value: Expression,
}

impl Property {
    /// Construct a property with a default token.
    pub fn new(key: impl Into<String>, value: Expression) -> Self {
        Self {
            token: Token::default(),
            key: key.into(),
            value,
        }
    }
}

/// Backend declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendDeclaration {
    /// Declaration position.
    #[serde(default)]
    pub token: Token,
    /// Backend name.
    pub name: String,
    /// `.host`, `.port`, ... properties.
    #[serde(default)]
    pub properties: Vec<Property>,
}

impl BackendDeclaration {
    /// Look up a property expression by key.
    pub fn property(&self, key: &str) -> Option<&Expression> {
        self.properties
            .iter()
            .find(|p| p.key == key)
            .map(|p| &p.value)
    }
}

/// Director declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectorDeclaration {
    /// Declaration position.
    #[serde(default)]
    pub token: Token,
    /// Director name.
    pub name: String,
    /// Algorithm name (`random`, `fallback`, `hash`, `client`, `chash`).
    pub director_type: String,
    /// Fields and backend entries in declaration order.
    pub properties: Vec<DirectorProperty>,
}

/// Either a director-level field or a `{ .backend = ...; }` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum DirectorProperty {
    /// `.quorum = 50%;` and friends.
    Field(Property),
    /// `{ .backend = F_origin; .weight = 1; }`
    Backend {
        /// Entry position.
        #[serde(default)]
        token: Token,
        /// Entry fields.
        fields: Vec<Property>,
    },
}

/// Table declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDeclaration {
    /// Declaration position.
    #[serde(default)]
    pub token: Token,
    /// Table name.
    pub name: String,
    /// Declared value type, `STRING` when omitted.
    #[serde(default)]
    pub value_type: Option<ValueType>,
    /// Entries in declaration order.
    pub entries: Vec<TableEntry>,
}

impl TableDeclaration {
    /// Effective value type of the table.
    pub fn value_type(&self) -> ValueType {
        self.value_type.unwrap_or(ValueType::String)
    }
}

/// `"key": value,` table entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEntry {
    /// Lookup key.
    pub key: String,
    /// Stored value.
    pub value: Expression,
}

/// Subroutine declaration. A declared return type makes it a functional
/// subroutine callable from expressions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubroutineDeclaration {
    /// Declaration position.
    #[serde(default)]
    pub token: Token,
    /// Subroutine name.
    pub name: String,
    /// Return type of a functional subroutine.
    #[serde(default)]
    pub return_type: Option<ValueType>,
    /// Body statements.
    pub body: Vec<Statement>,
}

/// Declarations that only carry a name (penalty boxes, rate counters).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedDeclaration {
    /// Declaration position.
    #[serde(default)]
    pub token: Token,
    /// Declared name.
    pub name: String,
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrefixOperator {
    /// `!`
    Not,
    /// `-`
    Minus,
    /// `+`
    Plus,
}

impl fmt::Display for PrefixOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PrefixOperator::Not => "!",
            PrefixOperator::Minus => "-",
            PrefixOperator::Plus => "+",
        })
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InfixOperator {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `>`
    GreaterThan,
    /// `<`
    LessThan,
    /// `>=`
    GreaterThanEqual,
    /// `<=`
    LessThanEqual,
    /// `~`
    Regex,
    /// `!~`
    NotRegex,
    /// `+` (string concatenation)
    Plus,
    /// `&&`
    And,
    /// `||`
    Or,
}

impl fmt::Display for InfixOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InfixOperator::Equal => "==",
            InfixOperator::NotEqual => "!=",
            InfixOperator::GreaterThan => ">",
            InfixOperator::LessThan => "<",
            InfixOperator::GreaterThanEqual => ">=",
            InfixOperator::LessThanEqual => "<=",
            InfixOperator::Regex => "~",
            InfixOperator::NotRegex => "!~",
            InfixOperator::Plus => "+",
            InfixOperator::And => "&&",
            InfixOperator::Or => "||",
        })
    }
}

/// Assignment operators accepted by `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOperator {
    /// `=`
    Assign,
    /// `+=`
    Addition,
    /// `-=`
    Subtraction,
    /// `*=`
    Multiplication,
    /// `/=`
    Division,
    /// `%=`
    Remainder,
    /// `|=`
    BitwiseOr,
    /// `&=`
    BitwiseAnd,
    /// `^=`
    BitwiseXor,
    /// `<<=`
    LeftShift,
    /// `>>=`
    RightShift,
    /// `rol=`
    LeftRotate,
    /// `ror=`
    RightRotate,
    /// `&&=`
    LogicalAnd,
    /// `||=`
    LogicalOr,
}

impl fmt::Display for AssignOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssignOperator::Assign => "=",
            AssignOperator::Addition => "+=",
            AssignOperator::Subtraction => "-=",
            AssignOperator::Multiplication => "*=",
            AssignOperator::Division => "/=",
            AssignOperator::Remainder => "%=",
            AssignOperator::BitwiseOr => "|=",
            AssignOperator::BitwiseAnd => "&=",
            AssignOperator::BitwiseXor => "^=",
            AssignOperator::LeftShift => "<<=",
            AssignOperator::RightShift => ">>=",
            AssignOperator::LeftRotate => "rol=",
            AssignOperator::RightRotate => "ror=",
            AssignOperator::LogicalAnd => "&&=",
            AssignOperator::LogicalOr => "||=",
        })
    }
}

/// Expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    /// Position of the expression.
    #[serde(default)]
    pub token: Token,
    /// Expression payload.
    pub kind: ExpressionKind,
}

/// Expression variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ExpressionKind {
    /// Named reference: variable, backend, ACL, table, ...
    Ident(String),
    /// IP literal.
    Ip(String),
    /// String literal.
    String(String),
    /// Integer literal.
    Integer(i64),
    /// Float literal.
    Float(f64),
    /// Boolean literal.
    Boolean(bool),
    /// Relative time literal such as `10s` or `1d`.
    RTime(String),
    /// Prefix operation.
    Prefix {
        /// Operator.
        operator: PrefixOperator,
        /// Operand.
        right: Box<Expression>,
    },
    /// Parenthesised expression.
    Group(Box<Expression>),
    /// Binary operation.
    Infix {
        /// Left operand.
        left: Box<Expression>,
        /// Operator.
        operator: InfixOperator,
        /// Right operand.
        right: Box<Expression>,
    },
    /// `if(condition, consequence, alternative)`
    If {
        /// Condition.
        condition: Box<Expression>,
        /// Value when true.
        consequence: Box<Expression>,
        /// Value when false.
        alternative: Box<Expression>,
    },
    /// Function or functional-subroutine call.
    Call {
        /// Callee name.
        function: String,
        /// Arguments in order.
        arguments: Vec<Expression>,
    },
}

impl Expression {
    /// Wrap a kind with a default token.
    pub fn new(kind: ExpressionKind) -> Self {
        Self {
            token: Token::default(),
            kind,
        }
    }

    /// Replace the node token.
    pub fn at(mut self, token: Token) -> Self {
        self.token = token;
        self
    }

    /// Identifier reference.
    pub fn ident(name: impl Into<String>) -> Self {
        Self::new(ExpressionKind::Ident(name.into()))
    }

    /// String literal.
    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ExpressionKind::String(value.into()))
    }

    /// Integer literal.
    pub fn integer(value: i64) -> Self {
        Self::new(ExpressionKind::Integer(value))
    }

    /// Float literal.
    pub fn float(value: f64) -> Self {
        Self::new(ExpressionKind::Float(value))
    }

    /// Boolean literal.
    pub fn boolean(value: bool) -> Self {
        Self::new(ExpressionKind::Boolean(value))
    }

    /// Relative time literal.
    pub fn rtime(value: impl Into<String>) -> Self {
        Self::new(ExpressionKind::RTime(value.into()))
    }

    /// IP literal.
    pub fn ip(value: impl Into<String>) -> Self {
        Self::new(ExpressionKind::Ip(value.into()))
    }

    /// Prefix operation.
    pub fn prefix(operator: PrefixOperator, right: Expression) -> Self {
        Self::new(ExpressionKind::Prefix {
            operator,
            right: Box::new(right),
        })
    }

    /// Grouped expression.
    pub fn group(inner: Expression) -> Self {
        Self::new(ExpressionKind::Group(Box::new(inner)))
    }

    /// Binary operation.
    pub fn infix(left: Expression, operator: InfixOperator, right: Expression) -> Self {
        Self::new(ExpressionKind::Infix {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        })
    }

    /// `if(...)` expression.
    pub fn if_expr(condition: Expression, consequence: Expression, alternative: Expression) -> Self {
        Self::new(ExpressionKind::If {
            condition: Box::new(condition),
            consequence: Box::new(consequence),
            alternative: Box::new(alternative),
        })
    }

    /// Function call.
    pub fn call(function: impl Into<String>, arguments: Vec<Expression>) -> Self {
        Self::new(ExpressionKind::Call {
            function: function.into(),
            arguments,
        })
    }
}

/// Statement node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Position of the statement.
    #[serde(default)]
    pub token: Token,
    /// Statement payload.
    pub kind: StatementKind,
}

/// Statement variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum StatementKind {
    /// `{ ... }`
    Block(Vec<Statement>),
    /// `declare local var.name TYPE;`
    Declare {
        /// Variable name including the `var.` prefix.
        name: String,
        /// Declared type.
        value_type: ValueType,
    },
    /// `set target op value;`
    Set {
        /// Assigned variable.
        target: String,
        /// Assignment operator.
        operator: AssignOperator,
        /// Right-hand side.
        value: Expression,
    },
    /// `unset target;` / `remove target;`
    Unset {
        /// Removed variable.
        target: String,
    },
    /// `add target = value;`
    Add {
        /// Header variable.
        target: String,
        /// Appended value.
        value: Expression,
    },
    /// `call name;`
    Call {
        /// Called subroutine.
        subroutine: String,
    },
    /// `if (...) { } elseif (...) { } else { }`
    If(IfStatement),
    /// `switch (...) { case ...: }`
    Switch(SwitchStatement),
    /// `restart;`
    Restart,
    /// `esi;`
    Esi,
    /// `log value;`
    Log {
        /// Logged expression.
        value: Expression,
    },
    /// `synthetic value;` / `synthetic.base64 value;`
    Synthetic {
        /// Body expression.
        value: Expression,
        /// Whether the body is base64 encoded.
        #[serde(default)]
        base64: bool,
    },
    /// `return;`, `return(state);` or `return value;` in functional subroutines.
    Return {
        /// State identifier or returned value.
        #[serde(default)]
        value: Option<Expression>,
    },
    /// `error [code [response]];`
    Error {
        /// Status code.
        #[serde(default)]
        code: Option<Expression>,
        /// Response text.
        #[serde(default)]
        response: Option<Expression>,
    },
    /// `goto label;`
    Goto {
        /// Destination label.
        destination: String,
    },
    /// `label:`
    GotoDestination {
        /// Label name.
        name: String,
    },
    /// Function call evaluated for its side effect.
    FunctionCall {
        /// Function name.
        function: String,
        /// Arguments in order.
        arguments: Vec<Expression>,
    },
    /// `break;` inside a switch case.
    Break,
}

/// `if` statement with its `elseif` chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfStatement {
    /// Leading condition.
    pub condition: Expression,
    /// Statements when the condition holds.
    pub consequence: Vec<Statement>,
    /// `elseif` / `else if` branches in order.
    #[serde(default)]
    pub alternatives: Vec<ElseIf>,
    /// Final `else` block.
    #[serde(default)]
    pub alternative: Option<Vec<Statement>>,
}

/// One `elseif` branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElseIf {
    /// Branch condition.
    pub condition: Expression,
    /// Branch body.
    pub consequence: Vec<Statement>,
}

/// `switch` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchStatement {
    /// Control expression.
    pub control: Expression,
    /// Cases in declaration order.
    pub cases: Vec<CaseClause>,
    /// Index of the `default:` clause in `cases`.
    #[serde(default)]
    pub default: Option<usize>,
}

/// One `case` or `default` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseClause {
    /// Clause position.
    #[serde(default)]
    pub token: Token,
    /// Test; `None` for the default clause.
    #[serde(default)]
    pub test: Option<CaseTest>,
    /// Clause body.
    pub statements: Vec<Statement>,
    /// Ends with `fallthrough;`.
    #[serde(default)]
    pub fallthrough: bool,
}

/// Case comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum CaseTest {
    /// `case "literal":`
    Equal(String),
    /// `case ~ "pattern":`
    Regex(String),
}

impl Statement {
    /// Wrap a kind with a default token.
    pub fn new(kind: StatementKind) -> Self {
        Self {
            token: Token::default(),
            kind,
        }
    }

    /// Replace the node token.
    pub fn at(mut self, token: Token) -> Self {
        self.token = token;
        self
    }

    /// `set target = value;`
    pub fn set(target: impl Into<String>, value: Expression) -> Self {
        Self::set_with(target, AssignOperator::Assign, value)
    }

    /// `set target <op> value;`
    pub fn set_with(target: impl Into<String>, operator: AssignOperator, value: Expression) -> Self {
        Self::new(StatementKind::Set {
            target: target.into(),
            operator,
            value,
        })
    }

    /// `unset target;`
    pub fn unset(target: impl Into<String>) -> Self {
        Self::new(StatementKind::Unset {
            target: target.into(),
        })
    }

    /// `add target = value;`
    pub fn add(target: impl Into<String>, value: Expression) -> Self {
        Self::new(StatementKind::Add {
            target: target.into(),
            value,
        })
    }

    /// `declare local name TYPE;`
    pub fn declare(name: impl Into<String>, value_type: ValueType) -> Self {
        Self::new(StatementKind::Declare {
            name: name.into(),
            value_type,
        })
    }

    /// `call name;`
    pub fn call(subroutine: impl Into<String>) -> Self {
        Self::new(StatementKind::Call {
            subroutine: subroutine.into(),
        })
    }

    /// `if (condition) { consequence }`
    pub fn if_then(condition: Expression, consequence: Vec<Statement>) -> Self {
        Self::new(StatementKind::If(IfStatement {
            condition,
            consequence,
            alternatives: Vec::new(),
            alternative: None,
        }))
    }

    /// `return(state);`
    pub fn return_state(state: impl Into<String>) -> Self {
        Self::new(StatementKind::Return {
            value: Some(Expression::ident(state)),
        })
    }

    /// `return value;` in a functional subroutine.
    pub fn return_value(value: Expression) -> Self {
        Self::new(StatementKind::Return { value: Some(value) })
    }

    /// `error code "response";`
    pub fn error(code: i64, response: impl Into<String>) -> Self {
        Self::new(StatementKind::Error {
            code: Some(Expression::integer(code)),
            response: Some(Expression::string(response)),
        })
    }

    /// `log value;`
    pub fn log(value: Expression) -> Self {
        Self::new(StatementKind::Log { value })
    }

    /// `goto label;`
    pub fn goto(destination: impl Into<String>) -> Self {
        Self::new(StatementKind::Goto {
            destination: destination.into(),
        })
    }

    /// `label:`
    pub fn destination(name: impl Into<String>) -> Self {
        Self::new(StatementKind::GotoDestination { name: name.into() })
    }

    /// Function call statement.
    pub fn function_call(function: impl Into<String>, arguments: Vec<Expression>) -> Self {
        Self::new(StatementKind::FunctionCall {
            function: function.into(),
            arguments,
        })
    }

    /// `synthetic value;`
    pub fn synthetic(value: Expression) -> Self {
        Self::new(StatementKind::Synthetic {
            value,
            base64: false,
        })
    }
}

impl SubroutineDeclaration {
    /// Plain lifecycle or custom subroutine.
    pub fn new(name: impl Into<String>, body: Vec<Statement>) -> Self {
        Self {
            token: Token::default(),
            name: name.into(),
            return_type: None,
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_display_includes_file_when_known() {
        assert_eq!(Token::new("main.vcl", 3, 7).to_string(), "main.vcl:3:7");
        assert_eq!(Token::new("", 3, 7).to_string(), "3:7");
    }

    #[test]
    fn program_round_trips_through_json() {
        let program = Program::new(vec![Declaration::Subroutine(SubroutineDeclaration::new(
            "vcl_recv",
            vec![
                Statement::set("req.http.X-Foo", Expression::string("bar")),
                Statement::return_state("pass"),
            ],
        ))]);
        let json = serde_json::to_string(&program).unwrap();
        let decoded: Program = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, program);
    }

    #[test]
    fn tokens_may_be_omitted_in_json() {
        let json = r#"{"kind":{"type":"Ident","value":"req.url"}}"#;
        let expr: Expression = serde_json::from_str(json).unwrap();
        assert_eq!(expr.kind, ExpressionKind::Ident("req.url".into()));
        assert_eq!(expr.token, Token::default());
    }
}
