use std::fmt::{self, Display, Formatter};

/// The error taxonomy named by spec.md §7. Every variant carries enough
/// context (cursor string, source string, operator name) to be actionable
/// without source-line inspection.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Parse {
        source: String,
        position: usize,
        message: String,
    },
    Reference {
        cursor: String,
        message: String,
    },
    Operator {
        operator: String,
        cursor: String,
        message: String,
    },
    Cycle {
        remaining: Vec<String>,
    },
    TypeMismatch {
        cursor: String,
        expected: String,
        found: String,
    },
    Cancelled {
        cursor: String,
    },
    Timeout {
        cursor: String,
    },
    Configuration {
        message: String,
    },
    External {
        message: String,
    },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse {
                source,
                position,
                message,
            } => write!(f, "ParseError: {} (at {} in `{}`)", message, position, source),
            Error::Reference { cursor, message } => {
                write!(f, "ReferenceError: {} ({})", message, cursor)
            }
            Error::Operator {
                operator,
                cursor,
                message,
            } => write!(f, "OperatorError: ({} {}) - {}", operator, cursor, message),
            Error::Cycle { remaining } => {
                write!(f, "CycleError: no opcall could make progress: {}", remaining.join(", "))
            }
            Error::TypeMismatch {
                cursor,
                expected,
                found,
            } => write!(
                f,
                "TypeMismatchError: expected {} at {}, found {}",
                expected, cursor, found
            ),
            Error::Cancelled { cursor } => write!(f, "CancelledError: at {}", cursor),
            Error::Timeout { cursor } => write!(f, "TimeoutError: at {}", cursor),
            Error::Configuration { message } => write!(f, "ConfigurationError: {}", message),
            Error::External { message } => write!(f, "ExternalError: {}", message),
        }
    }
}

impl std::error::Error for Error {}

/// An aggregate of multiple [Error]s, in discovery order. Every public entry
/// point that can fail in more than one way (scan, param-phase, cherry-pick
/// projection) returns this instead of a single `Error`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiError(Vec<Error>);

impl MultiError {
    pub fn new() -> Self {
        MultiError(Vec::new())
    }

    pub fn push(&mut self, err: Error) {
        self.0.push(err);
    }

    pub fn extend(&mut self, other: MultiError) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn errors(&self) -> &[Error] {
        &self.0
    }

    pub fn into_result<T>(self, ok: T) -> Result<T, MultiError> {
        if self.is_empty() {
            Ok(ok)
        } else {
            Err(self)
        }
    }
}

impl From<Error> for MultiError {
    fn from(err: Error) -> Self {
        MultiError(vec![err])
    }
}

impl Display for MultiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", e)?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_discovery_order() {
        let mut agg = MultiError::new();
        agg.push(Error::Reference {
            cursor: "a".into(),
            message: "not found".into(),
        });
        agg.push(Error::Cycle {
            remaining: vec!["b".into()],
        });
        let rendered = agg.to_string();
        assert!(rendered.find("ReferenceError").unwrap() < rendered.find("CycleError").unwrap());
    }
}
