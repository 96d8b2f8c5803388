use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use hyper::header;
use hyper::{Method, StatusCode};

use crate::config::{Mode, RouterConfig};
use crate::context::Context;
use crate::error::RouteError;
use crate::group::{RouterGroup, Routing};
use crate::handler::{self, Handler, HandlersChain};
use crate::http::{Request, Response};
use crate::middleware;
use crate::path::{self, clean_path, join_paths};
use crate::pool::ContextPool;
use crate::tree::{MethodTrees, RouteInfo};

/// Longest chain a route may carry, middleware included.
pub const MAX_HANDLERS: usize = 62;

const DEFAULT_404_BODY: &[u8] = b"404 page not found";
const DEFAULT_405_BODY: &[u8] = b"405 method not allowed";

/// Matches requests against the registered routes and runs their chains.
///
/// Routes are registered up front through [`Routing`]; afterwards the
/// dispatcher is shared read-only, typically behind an `Arc`, and
/// [`serve`](Self::serve) may be called from any number of threads.
///
/// ```
/// use thicket::{chain, Body, Context, Dispatcher, RequestBuilder, Routing};
///
/// fn show(ctx: &mut Context) {
///     let id = ctx.param("id").unwrap_or_default().to_owned();
///     ctx.string(200, format!("user {}", id));
/// }
///
/// let mut router = Dispatcher::default();
/// router.get("/users/:id", chain![show]).unwrap();
///
/// let request = RequestBuilder::new().uri("/users/42").body(Body::empty()).unwrap();
/// let response = router.serve(request);
/// assert_eq!(response.body().as_bytes(), b"user 42");
/// ```
pub struct Dispatcher {
    config: Arc<RouterConfig>,
    trees: MethodTrees,
    middleware: Vec<Handler>,
    no_route: Vec<Handler>,
    no_method: Vec<Handler>,
    all_no_route: HandlersChain,
    all_no_method: HandlersChain,
    pool: ContextPool,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

impl Dispatcher {
    pub fn new(config: RouterConfig) -> Self {
        let config = Arc::new(config);
        Self {
            pool: ContextPool::new(config.clone()),
            config,
            trees: MethodTrees::default(),
            middleware: Vec::new(),
            no_route: Vec::new(),
            no_method: Vec::new(),
            all_no_route: Arc::from(Vec::new()),
            all_no_method: Arc::from(Vec::new()),
        }
    }

    /// A dispatcher with the access logger and panic recovery installed.
    pub fn with_default_middleware(config: RouterConfig) -> Self {
        let mut dispatcher = Self::new(config);
        dispatcher.use_middleware(vec![middleware::logger(), middleware::recovery()]);
        dispatcher
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Appends global middleware.
    ///
    /// Applies to routes registered afterwards and to the 404 and 405 chains.
    pub fn use_middleware(&mut self, handlers: Vec<Handler>) -> &mut Self {
        self.middleware.extend(handlers);
        self.rebuild_fallbacks();
        self
    }

    /// Handlers run when no route matches.
    pub fn no_route(&mut self, handlers: Vec<Handler>) -> &mut Self {
        self.no_route = handlers;
        self.rebuild_fallbacks();
        self
    }

    /// Handlers run when the path exists under another method only.
    pub fn no_method(&mut self, handlers: Vec<Handler>) -> &mut Self {
        self.no_method = handlers;
        self.rebuild_fallbacks();
        self
    }

    fn rebuild_fallbacks(&mut self) {
        self.all_no_route = self.combine(&self.no_route).into();
        self.all_no_method = self.combine(&self.no_method).into();
    }

    fn combine(&self, handlers: &[Handler]) -> Vec<Handler> {
        let mut combined = Vec::with_capacity(self.middleware.len() + handlers.len());
        combined.extend_from_slice(&self.middleware);
        combined.extend_from_slice(handlers);
        combined
    }

    /// A group of routes under `prefix` sharing `handlers` as leading middleware.
    pub fn group(&mut self, prefix: &str, handlers: Vec<Handler>) -> RouterGroup<'_> {
        let base_path = join_paths("/", prefix);
        RouterGroup::new(self, base_path, handlers)
    }

    /// Inserts a finished chain into the method's tree, without global middleware.
    ///
    /// # Errors
    /// Fails when the path lacks a leading `/`, the method is empty or not a
    /// valid token, the chain is empty, or the tree rejects the pattern.
    pub fn add_route(&mut self, method: &str, path: &str, handlers: Vec<Handler>) -> Result<(), RouteError> {
        if !path.starts_with('/') {
            return Err(RouteError::MissingLeadingSlash(path.to_owned()));
        }
        if method.is_empty() {
            return Err(RouteError::EmptyMethod);
        }
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| RouteError::InvalidMethod(method.to_owned()))?;
        if handlers.is_empty() {
            return Err(RouteError::NoHandlers(path.to_owned()));
        }

        if self.config.mode == Mode::Debug {
            log::debug!("{}", route_line(&method, path, &handlers));
        }

        self.trees
            .get_or_insert(method)
            .insert(path, handlers.into())
    }

    /// Every registered route with the name of its own handler.
    pub fn routes(&self) -> Vec<RouteInfo> {
        self.trees.routes()
    }

    /// Runs the request through the matching chain, or through the redirect
    /// and fallback policy on a miss, and returns the finished response.
    ///
    /// A panic escaping the chain is logged, recorded as a private error and
    /// answered with 500 if nothing was written yet.
    pub fn serve(&self, request: Request) -> Response {
        let mut ctx = self.pool.acquire();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.handle_request(&mut ctx, request)
        }));
        if let Err(payload) = outcome {
            let message = middleware::panic_message(payload.as_ref());
            log::error!("handler panicked: {}", message);
            ctx.error(format!("handler panicked: {}", message));
            if !ctx.writer().written() {
                ctx.writer_mut().write_header(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }

        ctx.writer_mut().take_response()
    }

    /// Routes the context's request again, on the same context.
    ///
    /// Meant for handlers that rewrite the request URI and want the result
    /// served as if it had arrived that way. The response, params, errors
    /// and chain position are cleared first; stored keys survive. Once the
    /// new chain returns, the caller's chain position is restored.
    ///
    /// Handlers reach the dispatcher through whatever shared handle the
    /// application keeps, typically a `Weak` set after wrapping it in an `Arc`.
    pub fn handle_context(&self, ctx: &mut Context) {
        let (request, cursor) = ctx.rewind();
        self.handle_request(ctx, request);
        ctx.restore_cursor(cursor);
    }

    fn handle_request(&self, ctx: &mut Context, request: Request) {
        let method = request.method().clone();
        let raw_path = request.uri().path().to_owned();
        let query = request.uri().query().map(str::to_owned);

        let (path, unescape) = if self.config.use_raw_path {
            (raw_path, self.config.unescape_path_values)
        } else {
            let decoded = urlencoding::decode(&raw_path)
                .map(|p| p.into_owned())
                .unwrap_or_else(|_| raw_path.clone());
            (decoded, false)
        };

        if let Some(tree) = self.trees.get(&method) {
            let lookup = tree.get_value(&path, ctx.params_mut(), unescape);
            if let Some(handlers) = lookup.handlers {
                ctx.bind(request, handlers.clone());
                ctx.next();
                ctx.writer_mut().write_header_now();
                return;
            }

            if method != Method::CONNECT && path != "/" {
                if lookup.tsr && self.config.redirect_trailing_slash {
                    if let Some(target) = path::toggle_trailing_slash(&path) {
                        self.redirect(ctx, &method, &target, query.as_deref());
                        return;
                    }
                }
                if self.config.redirect_fixed_path {
                    let fixed = tree.find_case_insensitive_path(
                        &clean_path(&path),
                        self.config.redirect_trailing_slash,
                    );
                    if let Some(target) = fixed {
                        self.redirect(ctx, &method, &target, query.as_deref());
                        return;
                    }
                }
            }
        }

        if self.config.handle_method_not_allowed {
            let allowed: Vec<&str> = self
                .trees
                .iter()
                .filter(|(m, tree)| **m != method && tree.matches(&path, unescape))
                .map(|(m, _)| m.as_str())
                .collect();

            if !allowed.is_empty() {
                ctx.bind(request, self.all_no_method.clone());
                ctx.header(header::ALLOW.as_str(), &allowed.join(", "));
                serve_error(ctx, StatusCode::METHOD_NOT_ALLOWED, DEFAULT_405_BODY);
                return;
            }
        }

        ctx.bind(request, self.all_no_route.clone());
        serve_error(ctx, StatusCode::NOT_FOUND, DEFAULT_404_BODY);
    }

    fn redirect(&self, ctx: &mut Context, method: &Method, target: &str, query: Option<&str>) {
        let code = if *method == Method::GET || *method == Method::HEAD {
            StatusCode::MOVED_PERMANENTLY
        } else {
            StatusCode::TEMPORARY_REDIRECT
        };

        let mut location = if self.config.use_raw_path {
            target.to_owned()
        } else {
            path::encode_path(target)
        };
        if let Some(query) = query {
            location.push('?');
            location.push_str(query);
        }

        log::debug!("redirecting request {}: {} --> {}", code.as_u16(), method, location);
        ctx.redirect(code.as_u16(), &location);
    }
}

impl Routing for Dispatcher {
    /// Registers `handlers` behind the global middleware.
    fn handle(&mut self, method: &str, path: &str, handlers: Vec<Handler>) -> Result<(), RouteError> {
        let combined = self.combine(&handlers);
        if combined.len() > MAX_HANDLERS {
            return Err(RouteError::TooManyHandlers {
                path: path.to_owned(),
                count: combined.len(),
                max: MAX_HANDLERS,
            });
        }
        self.add_route(method, path, combined)
    }
}

/// One aligned line of the registration log.
fn route_line(method: &Method, path: &str, handlers: &[Handler]) -> String {
    format!(
        "{:<6} {:<25} --> {} ({} handlers)",
        method.as_str(),
        path,
        handler::last_name(handlers),
        handlers.len()
    )
}

/// Runs a fallback chain, writing the default body if the chain left the
/// response untouched.
fn serve_error(ctx: &mut Context, status: StatusCode, default_body: &[u8]) {
    ctx.writer_mut().write_header(status);
    ctx.next();

    if ctx.writer().written() {
        return;
    }
    if ctx.writer().status() == status {
        ctx.data(status.as_u16(), "text/plain", default_body);
    } else {
        ctx.writer_mut().write_header_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain;
    use crate::http::{Body, RequestBuilder};
    use std::sync::{Mutex, Weak};
    use std::thread;

    fn test_config() -> RouterConfig {
        RouterConfig {
            mode: Mode::Test,
            ..RouterConfig::default()
        }
    }

    fn request(method: &str, uri: &str) -> Request {
        RequestBuilder::new()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn text(response: &Response) -> String {
        String::from_utf8_lossy(response.body().as_bytes()).into_owned()
    }

    fn echo_path(ctx: &mut Context) {
        let path = ctx.request().uri().path().to_owned();
        ctx.string(200, path);
    }

    /// Tests registration preconditions.
    #[test]
    fn test_registration_errors() {
        let mut router = Dispatcher::new(test_config());
        assert_eq!(
            router.get("users", chain![echo_path]),
            Err(RouteError::MissingLeadingSlash("users".into()))
        );
        assert_eq!(router.handle("", "/", chain![echo_path]), Err(RouteError::EmptyMethod));
        assert!(matches!(
            router.handle("GE T", "/", chain![echo_path]),
            Err(RouteError::InvalidMethod(_))
        ));
        assert_eq!(router.get("/", vec![]), Err(RouteError::NoHandlers("/".into())));

        let many = vec![Handler::new(|_: &mut Context| {}); MAX_HANDLERS + 1];
        assert!(matches!(
            router.get("/many", many),
            Err(RouteError::TooManyHandlers { .. })
        ));

        router.get("/", chain![echo_path]).unwrap();
        assert_eq!(router.get("/", chain![echo_path]), Err(RouteError::Duplicate("/".into())));
    }

    /// Tests that the registration log columns line up.
    #[test]
    fn test_route_line_alignment() {
        let line = route_line(&Method::GET, "/users/:id", &chain![echo_path]);
        assert!(line.starts_with("GET    /users/:id                --> "), "{}", line);
        assert!(line.ends_with("echo_path (1 handlers)"), "{}", line);

        let line = route_line(&Method::DELETE, "/", &chain![echo_path]);
        assert!(line.starts_with("DELETE /                         --> "), "{}", line);
    }

    /// Tests that distinct registered paths resolve to their own handler.
    #[test]
    fn test_exact_matches() {
        let mut router = Dispatcher::new(test_config());
        let paths = ["/", "/users", "/users/new", "/users/:id", "/files/*path", "/about/team"];
        for path in paths {
            router
                .get(path, chain![move |ctx: &mut Context| ctx.string(200, path)])
                .unwrap();
        }

        for (uri, expected) in [
            ("/", "/"),
            ("/users", "/users"),
            ("/users/new", "/users/new"),
            ("/users/7", "/users/:id"),
            ("/files/a/b", "/files/*path"),
            ("/about/team", "/about/team"),
        ] {
            let response = router.serve(request("GET", uri));
            assert_eq!(response.status(), 200, "{}", uri);
            assert_eq!(text(&response), expected);
        }
    }

    /// Tests trailing slash redirects, including status codes and query preservation.
    #[test]
    fn test_trailing_slash_redirect() {
        let mut router = Dispatcher::new(test_config());
        router.get("/user/:id", chain![echo_path]).unwrap();
        router.post("/items/", chain![echo_path]).unwrap();

        let response = router.serve(request("GET", "/user/42/?tab=1"));
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[header::LOCATION], "/user/42?tab=1");

        let response = router.serve(request("POST", "/items"));
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "/items/");

        router.handle("HEAD", "/x/", chain![echo_path]).unwrap();
        let response = router.serve(request("HEAD", "/x"));
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[header::LOCATION], "/x/");

        // CONNECT and the root path are never redirected
        router.handle("CONNECT", "/c/", chain![echo_path]).unwrap();
        let response = router.serve(request("CONNECT", "/c"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(header::LOCATION).is_none());

        router.get("//", chain![echo_path]).unwrap();
        let response = router.serve(request("GET", "/"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(header::LOCATION).is_none());

        let mut router = Dispatcher::new(RouterConfig {
            redirect_trailing_slash: false,
            ..test_config()
        });
        router.get("/user/:id", chain![echo_path]).unwrap();
        assert_eq!(router.serve(request("GET", "/user/42/")).status(), StatusCode::NOT_FOUND);
    }

    /// Tests the case-insensitive fixed path redirect and its switch.
    #[test]
    fn test_fixed_path_redirect() {
        let mut router = Dispatcher::new(RouterConfig {
            redirect_fixed_path: true,
            ..test_config()
        });
        router.get("/Admin", chain![echo_path]).unwrap();
        router.get("/docs/:page", chain![echo_path]).unwrap();

        let response = router.serve(request("GET", "/admin"));
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[header::LOCATION], "/Admin");

        let response = router.serve(request("GET", "/DOCS/../docs//Intro"));
        assert_eq!(response.headers()[header::LOCATION], "/docs/Intro");

        let mut router = Dispatcher::new(test_config());
        router.get("/Admin", chain![echo_path]).unwrap();
        let response = router.serve(request("GET", "/admin"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(text(&response), "404 page not found");
    }

    /// Tests the 405 fallback, the Allow header and custom fallback chains.
    #[test]
    fn test_method_not_allowed() {
        let mut router = Dispatcher::new(RouterConfig {
            handle_method_not_allowed: true,
            ..test_config()
        });
        router.get("/path", chain![echo_path]).unwrap();
        router.put("/path", chain![echo_path]).unwrap();

        let response = router.serve(request("POST", "/path"));
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET, PUT");
        assert_eq!(text(&response), "405 method not allowed");

        router.no_method(chain![|ctx: &mut Context| ctx.string(405, "nope")]);
        router.no_route(chain![|ctx: &mut Context| ctx.status(410)]);
        assert_eq!(text(&router.serve(request("POST", "/path"))), "nope");

        let response = router.serve(request("GET", "/missing"));
        assert_eq!(response.status(), StatusCode::GONE);
        assert!(response.body().is_empty());
    }

    /// Tests that global middleware wraps fallback chains too.
    #[test]
    fn test_middleware_sees_fallbacks() {
        let mut router = Dispatcher::new(test_config());
        router.use_middleware(chain![|ctx: &mut Context| {
            ctx.next();
            let status = ctx.writer().status().as_u16().to_string();
            ctx.header("x-seen", &status);
        }]);
        router.get("/ok", chain![echo_path]).unwrap();

        let response = router.serve(request("GET", "/nothing"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-seen"], "404");
    }

    /// Tests abort semantics through a full chain.
    #[test]
    fn test_abort_unwinds_middleware() {
        let mut router = Dispatcher::new(test_config());
        router
            .get(
                "/secret",
                chain![
                    |ctx: &mut Context| {
                        ctx.set("trail", vec!["a in"]);
                        ctx.next();
                        let trail = ctx.get::<Vec<&str>>("trail").map(|t| t.join(",")).unwrap_or_default();
                        ctx.header("x-trail", &format!("{},a out", trail));
                    },
                    |ctx: &mut Context| {
                        if let Some(trail) = ctx.get::<Vec<&str>>("trail").cloned() {
                            let mut trail = trail;
                            trail.push("b");
                            ctx.set("trail", trail);
                        }
                        ctx.next();
                    },
                    |ctx: &mut Context| ctx.abort_with_status(403),
                    |ctx: &mut Context| ctx.string(200, "leaked"),
                ],
            )
            .unwrap();

        let response = router.serve(request("GET", "/secret"));
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()["x-trail"], "a in,b,a out");
        assert!(response.body().is_empty());
    }

    /// Tests that a handler can rewrite the URI and have the request routed again.
    #[test]
    fn test_handle_context_reroutes() {
        let slot: Arc<Mutex<Weak<Dispatcher>>> = Arc::new(Mutex::new(Weak::new()));
        let reroute = slot.clone();

        let mut router = Dispatcher::new(test_config());
        router
            .get(
                "/old/:id",
                chain![move |ctx: &mut Context| {
                    ctx.set("origin", "old".to_owned());
                    ctx.header("x-stale", "1");
                    ctx.error("stale");
                    let id = ctx.param("id").unwrap_or_default().to_owned();
                    *ctx.request_mut().uri_mut() = format!("/new?id={}", id).parse().unwrap();

                    let router = reroute.lock().unwrap().upgrade();
                    if let Some(router) = router {
                        router.handle_context(ctx);
                    }
                }],
            )
            .unwrap();
        router
            .get(
                "/new",
                chain![|ctx: &mut Context| {
                    let body = format!(
                        "{} from {} params={} errors={}",
                        ctx.query("id").unwrap_or_default(),
                        ctx.get::<String>("origin").cloned().unwrap_or_default(),
                        ctx.params().len(),
                        ctx.errors().len(),
                    );
                    ctx.string(200, body);
                }],
            )
            .unwrap();

        let router = Arc::new(router);
        *slot.lock().unwrap() = Arc::downgrade(&router);

        let response = router.serve(request("GET", "/old/7"));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text(&response), "7 from old params=0 errors=0");
        assert!(response.headers().get("x-stale").is_none());
    }

    /// Tests that a rewrite to an unknown path gets the 404 policy.
    #[test]
    fn test_handle_context_not_found() {
        let slot: Arc<Mutex<Weak<Dispatcher>>> = Arc::new(Mutex::new(Weak::new()));
        let reroute = slot.clone();

        let mut router = Dispatcher::new(test_config());
        router
            .get(
                "/moved",
                chain![move |ctx: &mut Context| {
                    ctx.string(200, "stale body");
                    *ctx.request_mut().uri_mut() = "/nowhere".parse().unwrap();
                    let router = reroute.lock().unwrap().upgrade();
                    if let Some(router) = router {
                        router.handle_context(ctx);
                    }
                }],
            )
            .unwrap();

        let router = Arc::new(router);
        *slot.lock().unwrap() = Arc::downgrade(&router);

        let response = router.serve(request("GET", "/moved"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(text(&response), "404 page not found");
    }

    /// Tests that an unrecovered panic becomes a 500 and the dispatcher keeps serving.
    #[test]
    fn test_panic_boundary() {
        let mut router = Dispatcher::new(test_config());
        router
            .get("/boom", chain![|_: &mut Context| panic!("kaboom")])
            .unwrap();
        router.get("/fine", chain![echo_path]).unwrap();

        assert_eq!(
            router.serve(request("GET", "/boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(router.serve(request("GET", "/fine")).status(), StatusCode::OK);
    }

    /// Tests path decoding in both path modes.
    #[test]
    fn test_path_decoding() {
        let show = |ctx: &mut Context| {
            let name = ctx.param("name").unwrap_or_default().to_owned();
            ctx.string(200, name);
        };

        let mut router = Dispatcher::new(test_config());
        router.get("/hello/:name", chain![show]).unwrap();
        assert_eq!(text(&router.serve(request("GET", "/hello/a%20b"))), "a b");

        let mut router = Dispatcher::new(RouterConfig {
            use_raw_path: true,
            ..test_config()
        });
        router.get("/hello/:name", chain![show]).unwrap();
        assert_eq!(text(&router.serve(request("GET", "/hello/a%2Fb"))), "a/b");

        let mut router = Dispatcher::new(RouterConfig {
            use_raw_path: true,
            unescape_path_values: false,
            ..test_config()
        });
        router.get("/hello/:name", chain![show]).unwrap();
        assert_eq!(text(&router.serve(request("GET", "/hello/a%2Fb"))), "a%2Fb");
    }

    /// Tests route introspection across methods.
    #[test]
    fn test_routes() {
        let mut router = Dispatcher::new(test_config());
        router.post("/users", chain![echo_path]).unwrap();
        router.get("/users/:id", chain![echo_path]).unwrap();
        router.get("/", chain![echo_path]).unwrap();

        let mut routes: Vec<(String, String)> = router
            .routes()
            .into_iter()
            .map(|r| (r.method.to_string(), r.path))
            .collect();
        routes.sort();
        assert_eq!(
            routes,
            vec![
                ("GET".to_owned(), "/".to_owned()),
                ("GET".to_owned(), "/users/:id".to_owned()),
                ("POST".to_owned(), "/users".to_owned()),
            ]
        );
        assert!(router.routes().iter().all(|r| r.handler.ends_with("echo_path")));
    }

    /// Tests that concurrent requests never observe each other's params or keys.
    #[test]
    fn test_concurrent_isolation() {
        let mut router = Dispatcher::new(test_config());
        router
            .get(
                "/user/:id",
                chain![
                    |ctx: &mut Context| {
                        let id = ctx.param("id").unwrap_or_default().to_owned();
                        ctx.set("id", id);
                        thread::yield_now();
                        ctx.next();
                    },
                    |ctx: &mut Context| {
                        let stored = ctx.get::<String>("id").cloned().unwrap_or_default();
                        let param = ctx.param("id").unwrap_or_default().to_owned();
                        ctx.string(200, format!("{}:{}:{}", stored, param, ctx.params().len()));
                    },
                ],
            )
            .unwrap();
        let router = Arc::new(router);

        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let router = router.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        let id = format!("{}-{}", worker, i);
                        let response = router.serve(request("GET", &format!("/user/{}", id)));
                        assert_eq!(text(&response), format!("{}:{}:1", id, id));
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
    }
}
