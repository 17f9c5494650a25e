pub mod coerce;
pub mod proxy;
pub mod repository;

pub use coerce::*;
pub use proxy::*;
pub use repository::*;
