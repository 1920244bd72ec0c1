use std::sync::Arc;
use std::time::Duration;

use palisade::config::{ServerConfig, SessionConfig};
use palisade::container::Container;
use palisade::di::DiContainer;
use palisade::middleware::IntoHandler;
use palisade::request::{BodyCaps, Request};
use palisade::response::Response;
use palisade::router::Router;
use palisade::server::Server;
use palisade::session::InMemorySessionStore;

async fn hello(req: Request, mut res: Response) -> (Request, Response, Result<(), palisade::AppError>) {
    res.text("Hello, World!").unwrap();
    (req, res, Ok(()))
}

async fn show_user(req: Request, mut res: Response) -> (Request, Response, Result<(), palisade::AppError>) {
    let id = req.param("id").unwrap_or("unknown").to_string();
    res.text(format!("User ID: {id}")).unwrap();
    (req, res, Ok(()))
}

#[tokio::main]
async fn main() {
    palisade::tracing_init::init_tracing();

    let router = Router::new();
    router.insert(http::Method::GET, "/", hello.into_handler()).unwrap();
    router
        .insert(http::Method::GET, "/users/:id", show_user.into_handler())
        .unwrap();

    let config = ServerConfig::default().port(8080);
    let caps = BodyCaps {
        max_body_bytes: config.max_body_bytes,
        max_file_bytes: config.max_file_bytes,
    };

    let container = Container {
        router: Arc::new(router),
        di: Arc::new(DiContainer::new()),
        session_store: InMemorySessionStore::new(Duration::from_secs(30 * 60)),
        signer: None,
        session_config: SessionConfig::default(),
        caps,
        error_handler: None,
    };

    let server = Arc::new(Server::new(container, config));
    let listener = server.bind().await.expect("failed to bind listener");
    tracing::info!(addr = %listener.local_addr().unwrap(), "listening");

    let shutdown_server = server.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_server.shutdown().await;
    });

    server.serve(listener).await;
}
