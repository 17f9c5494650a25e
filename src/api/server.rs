use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use log::{error, info};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::api::dispatcher::{Dispatcher, Reply};
use crate::api::request::Request;
use crate::config::ServerConfig;

/// Builds the HTTP surface.
///
/// Every request goes to a single fallback handler that looks up the exact
/// `(verb, path)` pair in the route table.
pub fn create_router(dispatcher: Dispatcher, server: &ServerConfig) -> Router {
    let router = Router::new().fallback(handle).with_state(dispatcher);

    if server.cross_origin {
        router.layer(cors_layer(server))
    } else {
        router
    }
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if server.allows_any_origin() {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = server
            .allowed_origins
            .iter()
            .filter_map(|origin| origin.trim().parse().ok())
            .collect();
        cors.allow_origin(AllowOrigin::list(origins))
    }
}

async fn handle(
    State(dispatcher): State<Dispatcher>,
    method: Method,
    uri: Uri,
    body: String,
) -> Response {
    let request = Request {
        verb: method.as_str().to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        body,
    };

    // Handlers block on worker processes; give each request its own thread.
    let reply = match tokio::task::spawn_blocking(move || dispatcher.dispatch(&request)).await {
        Ok(reply) => reply,
        Err(err) => {
            error!("Request handler did not complete: {err}");
            Reply::InternalError
        }
    };

    render(reply)
}

fn render(reply: Reply) -> Response {
    let status = StatusCode::from_u16(reply.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match reply {
        Reply::Json(body) => (status, [(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Reply::NoContent => status.into_response(),
        other => (status, other.body().to_string()).into_response(),
    }
}

pub async fn run_server(app: Router, config: &ServerConfig) -> anyhow::Result<()> {
    let bind_address = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&bind_address).await?;
    info!("HTTP server started on {bind_address}");

    serve(listener, app).await
}

/// Serves `app` on an already bound listener until the process exits.
pub async fn serve(listener: TcpListener, app: Router) -> anyhow::Result<()> {
    axum::serve(listener, app).await?;
    Ok(())
}
