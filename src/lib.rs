pub mod api;
pub mod app;
pub mod config;
pub mod logic;
pub mod model;
pub mod registry;
pub mod store;

// Export API types
pub use api::{
    create_router, Args, ArgumentError, Dispatcher, HandlerMethod, ParamBinding, Reply, Request,
    RouteTable, ValueShape, Verb,
};

pub use app::AppContext;

// Export repository types
pub use logic::{Mapped, ProxyError, RepositoryMethod, RepositoryProxy, ReturnShape};

// Export all model types
pub use model::*;

pub use registry::{
    Catalog, ComponentDescriptor, ComponentScanner, ControllerDescriptor, Declaration, Injector,
    Registry, RegistryError, RepositoryDescriptor,
};

// Export store types
pub use store::{BridgeError, DataBridge, WorkerBridge};

/// Boots `namespace` from `scanner` against the configured workers and serves
/// it until the process exits.
pub async fn run_server(
    scanner: &dyn ComponentScanner,
    namespace: &str,
    config: &config::AppConfig,
) -> anyhow::Result<()> {
    use std::sync::Arc;

    let bridge: Arc<dyn DataBridge> = Arc::new(WorkerBridge::spawning(
        config.worker.clone(),
        config.database.clone(),
    ));
    let context = AppContext::bootstrap(scanner, namespace, bridge)?;
    let app = create_router(context.dispatcher(), &config.server);

    api::run_server(app, &config.server).await
}
