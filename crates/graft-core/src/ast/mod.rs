pub mod expr;
pub mod ident;
pub mod ops;
pub mod ty;
pub mod value;

pub use expr::*;
pub use ident::*;
pub use ops::*;
pub use ty::*;
pub use value::*;
