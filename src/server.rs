use std::convert::Infallible;
use std::future::Future;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::StatusCode;

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::ServerError;
use crate::executor::Executor;
use crate::http::{Body, ConnectionInfo, Request};

/// Serves a [`Dispatcher`] over HTTP.
///
/// Connections are accepted and parsed by hyper on the tokio runtime. Each
/// request body is buffered, then the handler chain runs on the worker pool
/// so that blocking handlers never stall the reactor.
///
/// ```no_run
/// use thicket::{chain, Context, Dispatcher, RouterConfig, Routing, Server};
///
/// #[tokio::main]
/// async fn main() -> Result<(), thicket::ServerError> {
///     let mut router = Dispatcher::with_default_middleware(RouterConfig::default());
///     router
///         .get("/", chain![|ctx: &mut Context| ctx.string(200, "Hello World!")])
///         .expect("valid route");
///
///     Server::bind("127.0.0.1:3000").serve(router).await
/// }
/// ```
pub struct Server {
    addr: String,
    config: ServerConfig,
}

impl Server {
    /// A server for `addr` with default settings.
    pub fn bind(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            config: ServerConfig::default(),
        }
    }

    /// A server listening on the configured host and port.
    pub fn from_config(config: ServerConfig) -> Self {
        Self {
            addr: config.listen_address(),
            config,
        }
    }

    /// A server configured from `.env`, the `config` file and `THICKET_` variables.
    ///
    /// # Errors
    /// Returns an error if configuration loading or parsing fails.
    pub fn from_env() -> Result<Self, ServerError> {
        Ok(Self::from_config(ServerConfig::new()?))
    }

    /// Replaces the tuning options, keeping the bound address.
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs until the listener fails.
    ///
    /// # Errors
    /// Returns an error if the address does not resolve, binding fails or
    /// the accept loop stops with an error.
    pub async fn serve(self, dispatcher: Dispatcher) -> Result<(), ServerError> {
        self.serve_with_shutdown(dispatcher, futures::future::pending())
            .await
    }

    /// Runs until `signal` completes, then drains in-flight connections.
    ///
    /// # Errors
    /// See [`serve`](Self::serve).
    pub async fn serve_with_shutdown<S>(
        self,
        dispatcher: Dispatcher,
        signal: S,
    ) -> Result<(), ServerError>
    where
        S: Future<Output = ()>,
    {
        let addr = resolve(&self.addr)?;
        let executor = Executor::new(
            Some(self.config.max_workers),
            Some(self.config.worker_keep_alive()),
        );
        let dispatcher = Arc::new(dispatcher);

        let make_service = make_service_fn(move |conn: &AddrStream| {
            let info = ConnectionInfo {
                peer_addr: Some(conn.remote_addr()),
            };
            let dispatcher = dispatcher.clone();
            let executor = executor.clone();

            async move {
                Ok::<_, Infallible>(service_fn(move |request| {
                    dispatch(dispatcher.clone(), executor.clone(), info, request)
                }))
            }
        });

        let builder = hyper::Server::try_bind(&addr)?
            .http1_keepalive(self.config.http1_keep_alive)
            .http1_half_close(self.config.http1_half_close)
            .http1_max_buf_size(self.config.http1_max_buf_size)
            .http1_title_case_headers(self.config.http1_title_case_headers)
            .http1_preserve_header_case(self.config.http1_preserve_header_case);

        #[cfg(feature = "http2")]
        let builder = builder
            .http1_only(self.config.http1_only)
            .http2_only(self.config.http2_only)
            .http2_initial_stream_window_size(self.config.http2_initial_stream_window_size)
            .http2_initial_connection_window_size(self.config.http2_initial_connection_window_size)
            .http2_adaptive_window(self.config.http2_adaptive_window)
            .http2_max_frame_size(self.config.http2_max_frame_size)
            .http2_max_concurrent_streams(self.config.http2_max_concurrent_streams)
            .http2_max_send_buf_size(self.config.http2_max_send_buf_size);

        log::info!("listening on http://{}", addr);
        builder
            .serve(make_service)
            .with_graceful_shutdown(signal)
            .await?;
        log::info!("server on {} shut down", addr);
        Ok(())
    }
}

fn resolve(addr: &str) -> Result<SocketAddr, ServerError> {
    addr.to_socket_addrs()
        .map_err(|e| ServerError::Address(format!("{}: {}", addr, e)))?
        .next()
        .ok_or_else(|| ServerError::Address(addr.to_owned()))
}

/// Buffers the body, then runs the dispatcher on a worker thread.
async fn dispatch(
    dispatcher: Arc<Dispatcher>,
    executor: Executor,
    info: ConnectionInfo,
    request: hyper::Request<hyper::Body>,
) -> Result<hyper::Response<hyper::Body>, Infallible> {
    let (mut parts, body) = request.into_parts();
    let bytes = match hyper::body::to_bytes(body).await {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("failed to read request body: {}", e);
            return Ok(bare(StatusCode::BAD_REQUEST));
        }
    };
    parts.extensions.insert(info);
    let request = Request::from_parts(parts, Body::from(bytes));

    match executor.run(move || dispatcher.serve(request)).await {
        Ok(response) => Ok(response.map(hyper::Body::from)),
        Err(_) => {
            log::error!("request dropped by worker pool");
            Ok(bare(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

fn bare(status: StatusCode) -> hyper::Response<hyper::Body> {
    let mut response = hyper::Response::new(hyper::Body::empty());
    *response.status_mut() = status;
    response
}
