//! Stock middleware: access logging, error rendering and panic recovery.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use crate::context::Context;
use crate::error::{self, ErrorKind};
use crate::handler::Handler;

/// Logs one line per request at info level once the chain has run.
pub fn logger() -> Handler {
    logger_skipping(&[])
}

/// Like [`logger`], but stays quiet for the given paths.
pub fn logger_skipping(paths: &[&str]) -> Handler {
    let skip: HashSet<String> = paths.iter().map(|p| (*p).to_owned()).collect();

    Handler::new(move |ctx: &mut Context| {
        let start = Instant::now();
        let method = ctx.request().method().clone();
        let path = ctx.request().uri().path().to_owned();
        let target = ctx
            .request()
            .uri()
            .path_and_query()
            .map_or_else(|| path.clone(), |pq| pq.as_str().to_owned());

        ctx.next();

        if skip.contains(&path) {
            return;
        }

        let mut private = String::new();
        let errors = ctx.errors().by_kind(ErrorKind::PRIVATE);
        if error::write_listing(&mut private, errors.into_iter()).is_err() {
            private.clear();
        }

        log::info!(
            "{:>3} | {:>12?} | {:>15} | {:<7} {}{}{}",
            ctx.writer().status().as_u16(),
            start.elapsed(),
            ctx.client_ip().unwrap_or_else(|| "-".to_owned()),
            method,
            target,
            if private.is_empty() { "" } else { "\n" },
            private.trim_end(),
        );
    })
    .named("thicket::middleware::logger")
}

/// Renders public errors as JSON when nothing else was written.
pub fn error_logger() -> Handler {
    error_logger_for(ErrorKind::PUBLIC)
}

/// Renders errors of `kind` as JSON, keeping the current status, when the
/// chain produced no body of its own.
pub fn error_logger_for(kind: ErrorKind) -> Handler {
    Handler::new(move |ctx: &mut Context| {
        ctx.next();

        if ctx.writer().written() {
            return;
        }
        let rendered = {
            let errors = ctx.errors().by_kind(kind);
            if errors.is_empty() {
                return;
            }
            error::json_for(errors.into_iter())
        };
        let status = ctx.writer().status().as_u16();
        ctx.json(status, &rendered);
    })
    .named("thicket::middleware::error_logger")
}

/// Turns a panic in the rest of the chain into a 500 and a private error.
pub fn recovery() -> Handler {
    Handler::new(|ctx: &mut Context| {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| ctx.next()));
        if let Err(payload) = outcome {
            let message = panic_message(payload.as_ref());
            log::error!(
                "panic recovered in {} {}: {}{}",
                ctx.request().method(),
                ctx.request().uri().path(),
                message,
                backtrace_suffix(&Backtrace::capture())
            );
            ctx.error(format!("panic recovered: {}", message));
            ctx.abort_with_status(500);
        }
    })
    .named("thicket::middleware::recovery")
}

/// The trace on its own lines, or nothing unless `RUST_BACKTRACE` enabled it.
fn backtrace_suffix(trace: &Backtrace) -> String {
    match trace.status() {
        BacktraceStatus::Captured => format!("\n{}", trace),
        _ => String::new(),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
