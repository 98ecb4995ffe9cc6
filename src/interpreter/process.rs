//! Per-request record handed back to callers of [`super::Interpreter::serve`].

use crate::error::InterpreterError;
use serde::{Serialize, Serializer};

/// What happened while one request was served.
#[derive(Debug, Default, Serialize)]
pub struct Process {
    /// `req.restarts` when the request finished.
    pub restarts: u32,
    /// Name of the backend the request was sent to, or `req.backend` when no fetch happened.
    pub backend: Option<String>,
    /// Error that terminated the request.
    #[serde(serialize_with = "render_error")]
    pub error: Option<InterpreterError>,
    /// Subroutines entered, in execution order.
    pub subroutines: Vec<String>,
    /// Messages emitted by `log` statements.
    pub logs: Vec<String>,
}

impl Process {
    /// Whether the request finished without a terminal error.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Pretty JSON rendering for display.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn render_error<S: Serializer>(
    error: &Option<InterpreterError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(error) => serializer.serialize_some(&error.to_string()),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_serialize_as_messages() {
        let process = Process {
            restarts: 1,
            backend: Some("F_origin".into()),
            error: Some(InterpreterError::UndefinedSubroutine("missing".into())),
            ..Default::default()
        };
        let json: serde_json::Value = serde_json::from_str(&process.to_json().unwrap()).unwrap();
        assert_eq!(json["error"], "undefined subroutine missing");
        assert_eq!(json["restarts"], 1);
        assert!(!process.is_ok());
    }
}
