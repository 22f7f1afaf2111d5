use miette::{Diagnostic, SourceOffset, SourceSpan};
use smol_str::SmolStr;

use crate::number::Number;
use crate::range::Range;

/// A must-stop evaluation failure. Never caught by scopes; unwinds through
/// `get`/`put`/`add_argument` to whoever drove the evaluation.
#[derive(thiserror::Error, Debug, PartialEq, Clone)]
pub enum EvalError {
    #[error("divided by 0")]
    ZeroDivision(Range),
    #[error("index {1} out of bounds")]
    IndexOutOfBounds(Range, Number),
    #[error("\"{1}\" is not a valid index")]
    InvalidIndex(Range, SmolStr),
    #[error("map key \"{1}\" is not a string")]
    InvalidMapKey(Range, SmolStr),
    #[error("invalid operands for \"{op}\", got {lhs} and {rhs}")]
    InvalidOperands {
        range: Range,
        op: SmolStr,
        lhs: SmolStr,
        rhs: SmolStr,
    },
}

impl EvalError {
    pub fn range(&self) -> &Range {
        match self {
            EvalError::ZeroDivision(range) => range,
            EvalError::IndexOutOfBounds(range, _) => range,
            EvalError::InvalidIndex(range, _) => range,
            EvalError::InvalidMapKey(range, _) => range,
            EvalError::InvalidOperands { range, .. } => range,
        }
    }
}

/// An evaluation failure paired with the template source it occurred in,
/// carrying diagnostic information for the user.
#[derive(PartialEq, Debug, thiserror::Error)]
#[error("{cause}")]
pub struct Error {
    /// The underlying cause of the error.
    pub cause: EvalError,
    /// The template source related to the error.
    pub source_code: String,
    /// The location in the template source for diagnostics.
    pub location: SourceSpan,
}

impl Error {
    pub fn from_eval(template_source: impl Into<String>, cause: EvalError) -> Self {
        let source_code = template_source.into();
        let range = cause.range();
        let start = SourceOffset::from_location(
            &source_code,
            range.start.line as usize,
            range.start.column,
        );
        let end = SourceOffset::from_location(
            &source_code,
            range.end.line as usize,
            range.end.column,
        );
        let location = SourceSpan::new(
            start,
            std::cmp::max(end.offset().saturating_sub(start.offset()), 1),
        );

        Self {
            cause,
            source_code,
            location,
        }
    }
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let code = match self.cause {
            EvalError::ZeroDivision(_) => "EvalError::ZeroDivision",
            EvalError::IndexOutOfBounds(_, _) => "EvalError::IndexOutOfBounds",
            EvalError::InvalidIndex(_, _) => "EvalError::InvalidIndex",
            EvalError::InvalidMapKey(_, _) => "EvalError::InvalidMapKey",
            EvalError::InvalidOperands { .. } => "EvalError::InvalidOperands",
        };

        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let msg = match &self.cause {
            EvalError::ZeroDivision(_) => {
                "Division by zero is not allowed.".to_string()
            }
            EvalError::IndexOutOfBounds(_, index) => {
                format!("Index {index} does not exist in the addressed array.")
            }
            EvalError::InvalidIndex(_, _) => {
                "Array indices must evaluate to integers.".to_string()
            }
            EvalError::InvalidMapKey(_, _) => {
                "Inline map keys must evaluate to strings.".to_string()
            }
            EvalError::InvalidOperands { op, .. } => {
                format!("Check the operand types of \"{op}\".")
            }
        };

        Some(Box::new(msg))
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        Some(Box::new(std::iter::once(
            miette::LabeledSpan::new_with_span(Some(format!("{}", self.cause)), self.location),
        )))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.source_code)
    }
}
