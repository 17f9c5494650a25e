use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use log::{debug, info};
use serde::Serialize;
use serde_json::Value;

use crate::api::request::Args;
use crate::model::{Instance, TypeKey};

/// HTTP verbs a controller can map methods to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primitive shapes a query parameter can be coerced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    Bool,
    Double,
    Text,
}

/// Where a handler parameter takes its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamBinding {
    Query { name: String, shape: ValueShape },
    Body,
    /// Always passed as `null`.
    Unbound,
}

impl ParamBinding {
    pub fn query(name: impl Into<String>, shape: ValueShape) -> Self {
        ParamBinding::Query {
            name: name.into(),
            shape,
        }
    }
}

type Invoke = dyn Fn(&Instance, Args) -> anyhow::Result<Value> + Send + Sync;

/// A controller method with its declared parameter bindings.
#[derive(Clone)]
pub struct HandlerMethod {
    name: String,
    params: Vec<ParamBinding>,
    invoke: Arc<Invoke>,
}

impl HandlerMethod {
    /// Binds a method of controller type `C`.
    ///
    /// The closure receives the live controller and one argument per entry
    /// of `params`, in order. Returning a value that serialises to `null`
    /// (for example `None`) produces an empty response.
    pub fn new<C, R, F>(name: impl Into<String>, params: Vec<ParamBinding>, method: F) -> Self
    where
        C: Send + Sync + 'static,
        R: Serialize,
        F: Fn(&C, Args) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let name = name.into();
        let bound_name = name.clone();
        let invoke = move |target: &Instance, args: Args| -> anyhow::Result<Value> {
            let controller = target.downcast_ref::<C>().ok_or_else(|| {
                anyhow!(
                    "handler '{bound_name}' expects a {} target",
                    TypeKey::of::<C>()
                )
            })?;
            let result = method(controller, args)?;
            Ok(serde_json::to_value(result)?)
        };
        Self {
            name,
            params,
            invoke: Arc::new(invoke),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ParamBinding] {
        &self.params
    }

    pub fn invoke(&self, target: &Instance, args: Args) -> anyhow::Result<Value> {
        (self.invoke)(target, args)
    }
}

impl fmt::Debug for HandlerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerMethod")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A bound handler: the live target plus the method to call on it.
#[derive(Debug, Clone)]
pub struct Route {
    pub verb: String,
    pub path: String,
    pub controller: TypeKey,
    pub target: Instance,
    pub handler: HandlerMethod,
}

impl Route {
    pub fn key(&self) -> String {
        route_key(&self.verb, &self.path)
    }
}

/// Exact-match `(verb, path)` lookup.
///
/// Registering a key twice replaces the earlier binding; the last
/// registration wins and no error is raised. The table is filled once at
/// startup and only read afterwards.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: HashMap<String, Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the binding that was replaced, if any.
    pub fn register(
        &mut self,
        verb: &str,
        path: &str,
        controller: TypeKey,
        target: Instance,
        handler: HandlerMethod,
    ) -> Option<Route> {
        let route = Route {
            verb: verb.to_string(),
            path: path.to_string(),
            controller,
            target,
            handler,
        };
        let key = route.key();
        info!("Route registered: {key}");

        let previous = self.routes.insert(key, route);
        if let Some(previous) = &previous {
            debug!(
                "{} replaced {}::{}",
                previous.key(),
                previous.controller,
                previous.handler.name()
            );
        }
        previous
    }

    pub fn lookup(&self, verb: &str, path: &str) -> Option<&Route> {
        self.routes.get(&route_key(verb, path))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered keys in `VERB:path` form, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.routes.keys().cloned().collect();
        keys.sort();
        keys
    }
}

fn route_key(verb: &str, path: &str) -> String {
    format!("{verb}:{path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Greeter {
        greeting: &'static str,
    }

    fn greet() -> HandlerMethod {
        HandlerMethod::new::<Greeter, _, _>("greet", vec![], |greeter, _args| {
            Ok(greeter.greeting.to_string())
        })
    }

    fn target(greeting: &'static str) -> Instance {
        Arc::new(Greeter { greeting })
    }

    #[test]
    fn test_lookup_is_exact() {
        let mut table = RouteTable::new();
        table.register("GET", "/users", TypeKey::of::<Greeter>(), target("hi"), greet());

        assert!(table.lookup("GET", "/users").is_some());
        assert!(table.lookup("GET", "/users/").is_none());
        assert!(table.lookup("GET", "/users/1").is_none());
        assert!(table.lookup("POST", "/users").is_none());
        assert!(table.lookup("get", "/users").is_none());
    }

    #[test]
    fn test_last_registration_wins() {
        let mut table = RouteTable::new();
        let key = TypeKey::of::<Greeter>();
        assert!(table.register("GET", "/hello", key, target("first"), greet()).is_none());
        let replaced = table.register("GET", "/hello", key, target("second"), greet());

        assert!(replaced.is_some());
        assert_eq!(table.len(), 1);

        let route = table.lookup("GET", "/hello").unwrap();
        let result = route.handler.invoke(&route.target, Args::default()).unwrap();
        assert_eq!(result, Value::String("second".to_string()));
    }

    #[test]
    fn test_handler_rejects_wrong_target() {
        let handler = greet();
        let wrong: Instance = Arc::new(42u32);
        let err = handler.invoke(&wrong, Args::default()).unwrap_err();
        assert!(err.to_string().contains("greet"));
    }

    #[test]
    fn test_keys_are_sorted() {
        let mut table = RouteTable::new();
        let key = TypeKey::of::<Greeter>();
        table.register("POST", "/b", key, target("x"), greet());
        table.register("GET", "/a", key, target("x"), greet());
        assert_eq!(table.keys(), vec!["GET:/a".to_string(), "POST:/b".to_string()]);
    }
}
