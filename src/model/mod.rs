pub mod common;
mod decode;
pub mod operation;
pub mod result;
pub mod value;

pub use common::*;
pub use operation::*;
pub use result::*;
pub use value::*;
