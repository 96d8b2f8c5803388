use crate::dispatcher::Dispatcher;
use crate::error::RouteError;
use crate::handler::Handler;
use crate::path::join_paths;

/// Methods registered by [`Routing::any`].
pub const ANY_METHODS: [&str; 9] = [
    "GET", "POST", "PUT", "PATCH", "HEAD", "OPTIONS", "DELETE", "CONNECT", "TRACE",
];

/// Route registration shared by the dispatcher and its groups.
pub trait Routing {
    /// Registers `handlers` for `method` and `path`.
    ///
    /// # Errors
    /// Fails if the route is malformed or conflicts with an existing one.
    fn handle(&mut self, method: &str, path: &str, handlers: Vec<Handler>) -> Result<(), RouteError>;

    fn get(&mut self, path: &str, handlers: Vec<Handler>) -> Result<(), RouteError> {
        self.handle("GET", path, handlers)
    }

    fn post(&mut self, path: &str, handlers: Vec<Handler>) -> Result<(), RouteError> {
        self.handle("POST", path, handlers)
    }

    fn put(&mut self, path: &str, handlers: Vec<Handler>) -> Result<(), RouteError> {
        self.handle("PUT", path, handlers)
    }

    fn patch(&mut self, path: &str, handlers: Vec<Handler>) -> Result<(), RouteError> {
        self.handle("PATCH", path, handlers)
    }

    fn delete(&mut self, path: &str, handlers: Vec<Handler>) -> Result<(), RouteError> {
        self.handle("DELETE", path, handlers)
    }

    fn head(&mut self, path: &str, handlers: Vec<Handler>) -> Result<(), RouteError> {
        self.handle("HEAD", path, handlers)
    }

    fn options(&mut self, path: &str, handlers: Vec<Handler>) -> Result<(), RouteError> {
        self.handle("OPTIONS", path, handlers)
    }

    /// Registers the same chain under every method in [`ANY_METHODS`].
    fn any(&mut self, path: &str, handlers: Vec<Handler>) -> Result<(), RouteError> {
        for method in ANY_METHODS {
            self.handle(method, path, handlers.clone())?;
        }
        Ok(())
    }
}

/// Routes sharing a path prefix and leading middleware.
///
/// ```
/// use thicket::{chain, Context, Dispatcher, Routing};
///
/// fn auth(ctx: &mut Context) { ctx.next(); }
/// fn list(ctx: &mut Context) { ctx.string(200, "[]"); }
///
/// let mut router = Dispatcher::default();
/// let mut api = router.group("/api", chain![auth]);
/// api.get("/users", chain![list]).unwrap();
/// assert_eq!(router.routes()[0].path, "/api/users");
/// ```
pub struct RouterGroup<'d> {
    dispatcher: &'d mut Dispatcher,
    base_path: String,
    handlers: Vec<Handler>,
}

impl<'d> RouterGroup<'d> {
    pub(crate) fn new(dispatcher: &'d mut Dispatcher, base_path: String, handlers: Vec<Handler>) -> Self {
        Self {
            dispatcher,
            base_path,
            handlers,
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Appends middleware for routes registered through this group from now on.
    pub fn use_middleware(&mut self, handlers: Vec<Handler>) -> &mut Self {
        self.handlers.extend(handlers);
        self
    }

    /// A nested group inheriting this group's prefix and middleware.
    pub fn group(&mut self, prefix: &str, handlers: Vec<Handler>) -> RouterGroup<'_> {
        let mut combined = self.handlers.clone();
        combined.extend(handlers);
        RouterGroup::new(
            &mut *self.dispatcher,
            join_paths(&self.base_path, prefix),
            combined,
        )
    }
}

impl Routing for RouterGroup<'_> {
    fn handle(&mut self, method: &str, path: &str, handlers: Vec<Handler>) -> Result<(), RouteError> {
        let mut combined = self.handlers.clone();
        combined.extend(handlers);
        self.dispatcher
            .handle(method, &join_paths(&self.base_path, path), combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Mode, RouterConfig};
    use crate::context::Context;
    use crate::http::{Body, RequestBuilder};
    use crate::chain;

    fn tag(name: &'static str) -> Handler {
        Handler::new(move |ctx: &mut Context| {
            let mut trail = ctx.get::<String>("trail").cloned().unwrap_or_default();
            trail.push_str(name);
            ctx.set("trail", trail);
            ctx.next();
        })
    }

    fn reply(ctx: &mut Context) {
        let trail = ctx.get::<String>("trail").cloned().unwrap_or_default();
        ctx.string(200, trail);
    }

    /// Tests prefix joining and middleware inheritance across nested groups.
    #[test]
    fn test_nested_groups() {
        let mut router = Dispatcher::new(RouterConfig {
            mode: Mode::Test,
            ..RouterConfig::default()
        });
        router.use_middleware(vec![tag("g")]);

        {
            let mut api = router.group("/api", vec![tag("a")]);
            api.get("/ping", chain![reply]).unwrap();

            let mut v1 = api.group("v1/", vec![tag("1")]);
            assert_eq!(v1.base_path(), "/api/v1/");
            v1.use_middleware(vec![tag("x")]);
            v1.post("/users/:id", chain![reply]).unwrap();
        }

        let response = router.serve(RequestBuilder::new().uri("/api/ping").body(Body::empty()).unwrap());
        assert_eq!(response.body().as_bytes(), b"ga");

        let request = RequestBuilder::new()
            .method("POST")
            .uri("/api/v1/users/3")
            .body(Body::empty())
            .unwrap();
        assert_eq!(router.serve(request).body().as_bytes(), b"ga1x");
    }

    /// Tests that `any` registers every method.
    #[test]
    fn test_any() {
        let mut router = Dispatcher::new(RouterConfig {
            mode: Mode::Test,
            ..RouterConfig::default()
        });
        router.group("/", vec![]).any("/all", chain![reply]).unwrap();
        assert_eq!(router.routes().len(), ANY_METHODS.len());
    }
}
