#[macro_use]
pub mod macros;

pub mod ast;
pub mod cancel;
pub mod collections;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod sema;
pub mod span;

// Re-export commonly used items for convenience
pub use tracing;

pub use cancel::CancellationFlag;
pub use context::{ScopedContext, SharedScopedContext};

// Alias for error types
pub type Error = crate::error::Error;
pub type Result<T> = crate::error::Result<T>;
