use ember_syntax::ParseError;

/// Every failure an ember engine can surface.
///
/// Compile errors abort compilation; runtime errors abort `VM::run`;
/// `Eval` errors abort the tree-walker and carry the 1-based source line
/// of the failing token. Builtin failures are *not* represented here:
/// they travel in-band as `Value::Error`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmberError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("unknown operator {0}")]
    UnknownOperator(String),

    #[error("undefined variable {0}")]
    UndefinedVariable(String),

    #[error("{0}")]
    Runtime(String),

    #[error("on line {line} - {message}")]
    Eval { line: usize, message: String },
}

impl EmberError {
    pub fn runtime(message: impl Into<String>) -> Self {
        EmberError::Runtime(message.into())
    }

    pub fn eval(line: usize, message: impl Into<String>) -> Self {
        EmberError::Eval {
            line,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formats() {
        assert_eq!(
            EmberError::UnknownOperator("&".into()).to_string(),
            "unknown operator &"
        );
        assert_eq!(
            EmberError::UndefinedVariable("foo".into()).to_string(),
            "undefined variable foo"
        );
        assert_eq!(
            EmberError::runtime("stack overflow").to_string(),
            "stack overflow"
        );
        assert_eq!(
            EmberError::eval(3, "identifier not found: x").to_string(),
            "on line 3 - identifier not found: x"
        );
    }
}
