use graft_core::error::Error;
use graft_core::span::Span;

/// Create a simple interpolation error
pub fn interpolation_error(message: impl Into<String>) -> Error {
    Error::EvaluationError(message.into())
}

/// Create an interpolation error with a specific error code
pub fn interpolation_error_with_code(
    message: impl Into<String>,
    code: impl Into<String>,
) -> Error {
    let message = format!("{} ({})", message.into(), code.into());
    Error::EvaluationError(message)
}

/// Create an interpolation error with a specific span
pub fn interpolation_error_with_span(message: impl Into<String>, span: Span) -> Error {
    let msg = format!("{} [span {}:{}]", message.into(), span.lo, span.hi);
    Error::EvaluationError(msg)
}

/// Macro to return early with an interpolation error
#[macro_export]
macro_rules! interp_bail {
    ($message:expr) => {
        return Err($crate::error::interpolation_error($message))
    };
    ($message:expr, $code:expr) => {
        return Err($crate::error::interpolation_error_with_code($message, $code))
    };
}

/// Macro to ensure a condition is true, or return an interpolation error
#[macro_export]
macro_rules! interp_ensure {
    ($cond:expr, $message:expr) => {
        if !($cond) {
            $crate::interp_bail!($message);
        }
    };
    ($cond:expr, $message:expr, $code:expr) => {
        if !($cond) {
            $crate::interp_bail!($message, $code);
        }
    };
}
