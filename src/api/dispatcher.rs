use std::sync::Arc;

use log::{error, warn};
use serde_json::Value;
use thiserror::Error;

use crate::api::request::{bind_arguments, ArgumentError, Request};
use crate::api::routes::RouteTable;

pub const NOT_FOUND_BODY: &str = "404 Not Found";
pub const BAD_REQUEST_BODY: &str = "400 Bad Request";
pub const INTERNAL_ERROR_BODY: &str = "500 Internal Server Error";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no route for {verb}:{path}")]
    NotFound { verb: String, path: String },

    #[error("bad request for {route}: {source}")]
    BadArgument {
        route: String,
        #[source]
        source: ArgumentError,
    },

    #[error("handler for {route} failed: {cause:#}")]
    Handler { route: String, cause: anyhow::Error },
}

/// What goes back on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// `200` with a JSON body.
    Json(String),
    /// `204` without a body.
    NoContent,
    NotFound,
    BadRequest,
    InternalError,
}

impl Reply {
    pub fn status(&self) -> u16 {
        match self {
            Reply::Json(_) => 200,
            Reply::NoContent => 204,
            Reply::BadRequest => 400,
            Reply::NotFound => 404,
            Reply::InternalError => 500,
        }
    }

    pub fn body(&self) -> &str {
        match self {
            Reply::Json(body) => body,
            Reply::NoContent => "",
            Reply::NotFound => NOT_FOUND_BODY,
            Reply::BadRequest => BAD_REQUEST_BODY,
            Reply::InternalError => INTERNAL_ERROR_BODY,
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, Reply::Json(_))
    }
}

/// Binds requests to routes and runs them.
///
/// Dispatch is synchronous: the handler, and any worker it drives, runs on
/// the calling thread.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    routes: Arc<RouteTable>,
}

impl Dispatcher {
    pub fn new(routes: Arc<RouteTable>) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Runs the matching handler and returns its serialised result.
    pub fn call(&self, request: &Request) -> Result<Value, DispatchError> {
        let route = self
            .routes
            .lookup(&request.verb, &request.path)
            .ok_or_else(|| DispatchError::NotFound {
                verb: request.verb.clone(),
                path: request.path.clone(),
            })?;

        let args = bind_arguments(route.handler.params(), request).map_err(|source| {
            DispatchError::BadArgument {
                route: route.key(),
                source,
            }
        })?;

        route
            .handler
            .invoke(&route.target, args)
            .map_err(|source| classify(route.key(), source))
    }

    /// Runs the request and renders the outcome. Failure details are logged,
    /// never returned.
    pub fn dispatch(&self, request: &Request) -> Reply {
        match self.call(request) {
            Ok(Value::Null) => Reply::NoContent,
            Ok(value) => Reply::Json(value.to_string()),
            Err(DispatchError::NotFound { .. }) => Reply::NotFound,
            Err(err @ DispatchError::BadArgument { .. }) => {
                warn!("{err}");
                Reply::BadRequest
            }
            Err(err @ DispatchError::Handler { .. }) => {
                error!("{err}");
                Reply::InternalError
            }
        }
    }
}

// Handlers decode their own arguments, so a malformed body can surface as a
// handler error; those still count as client errors.
fn classify(route: String, source: anyhow::Error) -> DispatchError {
    let argument = source
        .chain()
        .find_map(|cause| cause.downcast_ref::<ArgumentError>())
        .map(|err| ArgumentError::new(err.name.clone(), err.message.clone()));

    match argument {
        Some(source) => DispatchError::BadArgument { route, source },
        None => DispatchError::Handler {
            route,
            cause: source,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::{HandlerMethod, ParamBinding, ValueShape};
    use crate::model::{Instance, TypeKey};
    use anyhow::Context;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct UserController {
        calls: AtomicUsize,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct User {
        id: i64,
        name: String,
    }

    fn table() -> (Arc<UserController>, Dispatcher) {
        let controller = Arc::new(UserController::default());
        let target: Instance = controller.clone();
        let key = TypeKey::of::<UserController>();
        let mut routes = RouteTable::new();

        routes.register(
            "GET",
            "/users/find",
            key,
            target.clone(),
            HandlerMethod::new::<UserController, _, _>(
                "find",
                vec![ParamBinding::query("id", ValueShape::Long)],
                |ctrl, args| {
                    ctrl.calls.fetch_add(1, Ordering::SeqCst);
                    let id: Option<i64> = args.optional(0)?;
                    Ok(id.filter(|id| *id == 1).map(|id| User {
                        id,
                        name: "Ann".to_string(),
                    }))
                },
            ),
        );
        routes.register(
            "POST",
            "/users",
            key,
            target.clone(),
            HandlerMethod::new::<UserController, _, _>(
                "create",
                vec![ParamBinding::Body],
                |_, args| {
                    let user: User = args.get(0)?;
                    Ok(user)
                },
            ),
        );
        routes.register(
            "DELETE",
            "/users",
            key,
            target,
            HandlerMethod::new::<UserController, (), _>("purge", vec![], |_, _| {
                Err(anyhow::anyhow!("worker exited with status 1"))
                    .context("purging users")
            }),
        );
        (controller, Dispatcher::new(Arc::new(routes)))
    }

    #[test]
    fn test_unmatched_route_is_404_without_invoking_anything() {
        let (controller, dispatcher) = table();
        let reply = dispatcher.dispatch(&Request::new("GET", "/nope"));
        assert_eq!(reply, Reply::NotFound);
        assert_eq!(reply.status(), 404);
        assert_eq!(reply.body(), "404 Not Found");
        assert_eq!(controller.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_non_null_result_is_json() {
        let (_, dispatcher) = table();
        let reply = dispatcher.dispatch(&Request::new("GET", "/users/find").with_query("id=1"));
        assert_eq!(reply.status(), 200);
        assert!(reply.is_json());
        let body: User = serde_json::from_str(reply.body()).unwrap();
        assert_eq!(body, User { id: 1, name: "Ann".to_string() });
    }

    #[test]
    fn test_null_result_is_no_content() {
        let (controller, dispatcher) = table();
        let reply = dispatcher.dispatch(&Request::new("GET", "/users/find"));
        assert_eq!(reply, Reply::NoContent);
        assert_eq!(reply.body(), "");
        assert_eq!(controller.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_malformed_query_is_400_and_skips_handler() {
        let (controller, dispatcher) = table();
        let reply = dispatcher.dispatch(&Request::new("GET", "/users/find").with_query("id=abc"));
        assert_eq!(reply, Reply::BadRequest);
        assert_eq!(controller.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_body_decoding_failure_inside_handler_is_400() {
        let (_, dispatcher) = table();
        let request = Request::new("POST", "/users").with_body(r#"{"id":"x"}"#);
        assert_eq!(dispatcher.dispatch(&request), Reply::BadRequest);

        let request = Request::new("POST", "/users").with_body(r#"{"id":2,"name":"Bo"}"#);
        let reply = dispatcher.dispatch(&request);
        assert_eq!(reply.status(), 200);
    }

    #[test]
    fn test_handler_failure_is_generic_500() {
        let (_, dispatcher) = table();
        let reply = dispatcher.dispatch(&Request::new("DELETE", "/users"));
        assert_eq!(reply, Reply::InternalError);
        assert_eq!(reply.body(), "500 Internal Server Error");
        assert!(!reply.body().contains("worker"));

        let err = dispatcher.call(&Request::new("DELETE", "/users")).unwrap_err();
        assert!(err.to_string().contains("worker exited with status 1"));
    }
}
