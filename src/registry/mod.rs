pub mod container;
pub mod descriptor;
pub mod error;
pub mod scanner;

pub use container::*;
pub use descriptor::*;
pub use error::*;
pub use scanner::*;
