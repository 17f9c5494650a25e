//! Startup wiring.
//!
//! Repositories become proxies first, then services, components and
//! controllers are built, and finally every controller mapping is bound into
//! the route table. The table is frozen once startup is done.

use std::sync::Arc;

use anyhow::Context;
use log::info;

use crate::api::dispatcher::Dispatcher;
use crate::api::routes::RouteTable;
use crate::logic::proxy::RepositoryProxy;
use crate::model::{Instance, Role};
use crate::registry::{ComponentScanner, ControllerDescriptor, Declaration, Registry};
use crate::store::DataBridge;

/// The live application: components, routes and the shared bridge.
pub struct AppContext {
    registry: Arc<Registry>,
    routes: Arc<RouteTable>,
    bridge: Arc<dyn DataBridge>,
}

impl AppContext {
    pub fn bootstrap(
        scanner: &dyn ComponentScanner,
        namespace: &str,
        bridge: Arc<dyn DataBridge>,
    ) -> anyhow::Result<Self> {
        let declarations = scanner.scan(namespace);
        info!(
            "Scanning namespace '{namespace}': found {} declaration(s)",
            declarations.len()
        );

        let registry = Arc::new(Registry::new());
        let mut components = Vec::new();
        let mut controllers = Vec::new();

        for declaration in declarations {
            match declaration {
                Declaration::Repository(repository) => {
                    let proxy: Instance = Arc::new(RepositoryProxy::new(&repository, bridge.clone()));
                    registry.register_external(repository.key(), proxy);
                }
                Declaration::Component(component) => {
                    components.push((component.role(), component.key()));
                    registry.declare(component);
                }
                Declaration::Controller(controller) => {
                    registry.declare(controller.component().clone());
                    controllers.push(controller);
                }
            }
        }

        // Services before other components, matching declaration roles.
        components.sort_by_key(|(role, _)| *role != Role::Service);
        for (role, key) in components {
            registry
                .resolve(key)
                .with_context(|| format!("failed to start {role} {key}"))?;
        }

        let mut routes = RouteTable::new();
        for controller in &controllers {
            bind_controller(&registry, &mut routes, controller)?;
        }
        info!("{} route(s) registered", routes.len());

        Ok(Self {
            registry,
            routes: Arc::new(routes),
            bridge,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    pub fn bridge(&self) -> &Arc<dyn DataBridge> {
        &self.bridge
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.routes.clone())
    }
}

fn bind_controller(
    registry: &Registry,
    routes: &mut RouteTable,
    controller: &ControllerDescriptor,
) -> anyhow::Result<()> {
    let key = controller.key();
    info!("Found controller: {key}");
    let target = registry
        .resolve(key)
        .with_context(|| format!("failed to start controller {key}"))?;

    for (verb, path, handler) in controller.routes() {
        routes.register(verb.as_str(), &path, key, target.clone(), handler.clone());
    }
    Ok(())
}
