//! Error types for AT protocol parsing and encoding

use thiserror::Error;

/// Errors that can occur while parsing modem lines or building commands
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A reply or notification was missing an expected argument
    #[error("missing argument {index} in {context}")]
    MissingArgument {
        /// Where the argument was expected (e.g. "+CLIP")
        context: &'static str,
        /// Zero-based position of the missing argument
        index: usize,
    },

    /// An argument was present but could not be interpreted
    #[error("invalid {field}: {value:?}")]
    InvalidField {
        /// Name of the field being parsed
        field: &'static str,
        /// The offending text
        value: String,
    },

    /// A reply did not contain the line it must carry
    #[error("reply has no {0} line")]
    MissingLine(&'static str),

    /// A value that the command cannot carry on the wire
    #[error("invalid command argument: {0}")]
    InvalidArgument(String),
}

/// Parse the argument at `index` as a number
pub(crate) fn numeric_arg<T: std::str::FromStr>(
    args: &[String],
    index: usize,
    context: &'static str,
    field: &'static str,
) -> Result<T, ParseError> {
    let raw = args
        .get(index)
        .ok_or(ParseError::MissingArgument { context, index })?;
    raw.trim().parse().map_err(|_| ParseError::InvalidField {
        field,
        value: raw.clone(),
    })
}

/// Borrow the argument at `index` as text
pub(crate) fn text_arg<'a>(
    args: &'a [String],
    index: usize,
    context: &'static str,
) -> Result<&'a str, ParseError> {
    args.get(index)
        .map(String::as_str)
        .ok_or(ParseError::MissingArgument { context, index })
}
