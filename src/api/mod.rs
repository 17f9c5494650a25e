pub mod dispatcher;
pub mod request;
pub mod routes;
pub mod server;

pub use dispatcher::*;
pub use request::*;
pub use routes::*;
pub use server::*;
