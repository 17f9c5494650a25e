pub mod error;
pub mod process;
pub mod traits;
pub mod worker;

pub use error::*;
pub use process::*;
pub use traits::*;
pub use worker::*;
