//! A small application on top of the thicket router.
//! Demonstrates routing, path parameters, middleware, groups and shared state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thicket::middleware::error_logger;
use thicket::{chain, Context, Dispatcher, ErrorKind, RouterConfig, Routing, Server, ServerError};

fn welcome(ctx: &mut Context) {
    ctx.string(200, "Welcome to thicket!");
}

fn hello(ctx: &mut Context) {
    let name = ctx.param("name").unwrap_or("world").to_owned();
    ctx.string(200, format!("Hello, {}!", name));
}

fn download(ctx: &mut Context) {
    let file = ctx.param("filepath").unwrap_or_default().to_owned();
    ctx.string(200, format!("would serve {}", file));
}

/// Rejects requests without the demo token.
fn require_token(ctx: &mut Context) {
    let authorized = ctx
        .request()
        .headers()
        .get("x-token")
        .map_or(false, |token| token == "letmein");

    if !authorized {
        ctx.error("missing or wrong x-token").set_kind(ErrorKind::PUBLIC);
        ctx.abort_with_status(401);
        return;
    }
    ctx.set("user", "admin".to_string());
    ctx.next();
}

fn dashboard(ctx: &mut Context) {
    let user = ctx.get::<String>("user").cloned().unwrap_or_default();
    ctx.json(200, &serde_json::json!({ "user": user, "handler": ctx.handler_name() }));
}

/// Entry point for the demo server.
///
/// Starts on the configured address (localhost:3000 by default) and prints
/// the registered routes.
#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let config = RouterConfig::new()?;
    let mut router = Dispatcher::with_default_middleware(config);
    router.use_middleware(vec![error_logger()]);

    let counter = Arc::new(AtomicUsize::new(0));

    router.get("/", chain![welcome]).expect("valid route");
    router.get("/hello/:name", chain![hello]).expect("valid route");
    router.get("/files/*filepath", chain![download]).expect("valid route");
    router
        .get(
            "/counter",
            chain![move |ctx: &mut Context| {
                let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
                ctx.string(200, format!("Counter: {}", count));
            }],
        )
        .expect("valid route");

    {
        let mut admin = router.group("/admin", chain![require_token]);
        admin.get("/dashboard", chain![dashboard]).expect("valid route");
    }

    let server = Server::from_env()?;
    println!("Try these routes:");
    for route in router.routes() {
        println!("  - {} {}", route.method, route.path);
    }

    server.serve(router).await
}
