#![allow(clippy::return_self_not_must_use)]
#![doc = include_str!("../README.md")]

//! ## Architecture
//!
//! - [`Dispatcher`]: route registration, lookup, redirect and fallback policy
//! - [`PathTree`]: the per-method radix tree
//! - [`Context`]: per-request state driving a handler chain
//! - [`Server`]: hyper front end handing requests to a worker pool
//!
//! ## Configuration
//! Routing flags ([`RouterConfig`]) and server settings ([`ServerConfig`]) load from:
//! - Environment variables (prefixed with `THICKET_`)
//! - Configuration file (`config.toml` and the other formats `config` reads)
//! - `Default` impls and struct literals
//!
//! ## Features
//! - `http2`: Enables HTTP/2 support (enabled by default)

pub use crate::config::{Mode, RouterConfig, ServerConfig};
pub use crate::context::Context;
pub use crate::dispatcher::{Dispatcher, MAX_HANDLERS};
pub use crate::error::{ChainError, ErrorKind, ErrorList, ExecutorError, RouteError, ServerError};
pub use crate::executor::Executor;
pub use crate::group::{RouterGroup, Routing, ANY_METHODS};
pub use crate::handler::{Handler, HandlerFn, HandlersChain};
pub use crate::http::{Body, Bytes, ConnectionInfo, Request, RequestBuilder, Response};
pub use crate::params::{Param, Params};
pub use crate::path::{clean_path, join_paths};
pub use crate::server::Server;
pub use crate::tree::{Lookup, MethodTrees, PathTree, RouteInfo};
pub use crate::writer::ResponseWriter;

mod config;
mod context;
mod dispatcher;
mod error;
mod executor;
mod group;
mod handler;
mod http;
pub mod middleware;
mod params;
mod path;
mod pool;
mod server;
mod tree;
mod writer;

// Re-export common types
pub use hyper;
