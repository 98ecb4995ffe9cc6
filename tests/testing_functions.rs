//! `assert.*` tests
//!
//! Runs test subroutines directly through `Interpreter::run_subroutine`, the
//! way a VCL unit-test runner drives the interpreter.

use edgevcl::ast::{Declaration, Expression, Program, Statement, SubroutineDeclaration};
use edgevcl::context::ReturnState;
use edgevcl::error::InterpreterError;
use edgevcl::{Interpreter, InterpreterConfig, TestingState};
use http::Request;

fn interpreter(testing: bool, subroutines: Vec<(&str, Vec<Statement>)>) -> Interpreter {
    let declarations = subroutines
        .into_iter()
        .map(|(name, body)| Declaration::Subroutine(SubroutineDeclaration::new(name, body)))
        .collect();
    let config = InterpreterConfig {
        testing,
        seed: Some(3),
        ..Default::default()
    };
    Interpreter::new(&Program::new(declarations), config).unwrap()
}

fn context(interpreter: &Interpreter) -> edgevcl::Context {
    let request = Request::builder()
        .uri("http://example.com/index.html")
        .header("Host", "example.com")
        .body(String::new())
        .unwrap();
    interpreter.context(request, "203.0.113.9:9000".parse().unwrap())
}

fn assert_call(function: &str, arguments: Vec<Expression>) -> Statement {
    Statement::function_call(function, arguments)
}

#[test]
fn passing_assertions_let_the_subroutine_finish() {
    let interpreter = interpreter(
        true,
        vec![
            (
                "vcl_recv",
                vec![Statement::set("req.http.X-Stage", Expression::string("recv"))],
            ),
            (
                "test_recv",
                vec![
                    Statement::call("vcl_recv"),
                    assert_call(
                        "assert.equal",
                        vec![Expression::ident("req.http.X-Stage"), Expression::string("recv")],
                    ),
                    assert_call(
                        "assert.starts_with",
                        vec![Expression::ident("req.url"), Expression::string("/index")],
                    ),
                    assert_call("assert.null", vec![Expression::ident("req.http.X-Absent")]),
                ],
            ),
        ],
    );
    let mut ctx = context(&interpreter);
    let ending = interpreter.run_subroutine(&mut ctx, "test_recv").unwrap();
    assert_eq!(
        ending,
        TestingState::Returned {
            state: ReturnState::Lookup
        }
    );
}

#[test]
fn failed_assertions_surface_their_message() {
    let interpreter = interpreter(
        true,
        vec![(
            "test_header",
            vec![assert_call(
                "assert.equal",
                vec![
                    Expression::ident("req.http.Host"),
                    Expression::string("other.example"),
                    Expression::string("host header should be rewritten"),
                ],
            )],
        )],
    );
    let mut ctx = context(&interpreter);
    let error = interpreter.run_subroutine(&mut ctx, "test_header").unwrap_err();
    assert!(error.is_assertion());
    assert!(error.to_string().contains("host header should be rewritten"));
}

#[test]
fn assert_error_checks_the_previous_subroutine() {
    let interpreter = interpreter(
        true,
        vec![
            ("vcl_recv", vec![Statement::error(403, "Forbidden")]),
            (
                "test_forbidden",
                vec![assert_call(
                    "assert.error",
                    vec![Expression::integer(403), Expression::string("Forbidden")],
                )],
            ),
            (
                "test_wrong_code",
                vec![assert_call("assert.error", vec![Expression::integer(500)])],
            ),
        ],
    );
    let mut ctx = context(&interpreter);
    let ending = interpreter.run_subroutine(&mut ctx, "vcl_recv").unwrap();
    assert_eq!(
        ending,
        TestingState::Error {
            status: 403,
            response: "Forbidden".into()
        }
    );
    interpreter.run_subroutine(&mut ctx, "test_forbidden").unwrap();

    // the passing test above ended normally and replaced the recorded state
    interpreter.run_subroutine(&mut ctx, "vcl_recv").unwrap();
    let error = interpreter.run_subroutine(&mut ctx, "test_wrong_code").unwrap_err();
    assert!(error.is_assertion());
}

#[test]
fn assert_restart_sees_a_restarting_subroutine() {
    let interpreter = interpreter(
        true,
        vec![
            ("vcl_deliver", vec![Statement::new(edgevcl::ast::StatementKind::Restart)]),
            ("test_restart", vec![assert_call("assert.restart", Vec::new())]),
        ],
    );
    let mut ctx = context(&interpreter);
    assert_eq!(
        interpreter.run_subroutine(&mut ctx, "vcl_deliver").unwrap(),
        TestingState::Restart
    );
    interpreter.run_subroutine(&mut ctx, "test_restart").unwrap();
}

#[test]
fn assertions_are_hidden_unless_testing_is_enabled() {
    let interpreter = interpreter(
        false,
        vec![(
            "test_anything",
            vec![assert_call("assert.true", vec![Expression::boolean(true)])],
        )],
    );
    let mut ctx = context(&interpreter);
    let error = interpreter.run_subroutine(&mut ctx, "test_anything").unwrap_err();
    assert!(matches!(
        error.root(),
        InterpreterError::UndefinedFunction(name) if name == "assert.true"
    ));
}
