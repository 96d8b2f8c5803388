use std::fmt;
use std::sync::Arc;

use crate::context::Context;

/// The callable behind every [`Handler`].
pub type HandlerFn = dyn Fn(&mut Context) + Send + Sync;

/// A named handler function.
///
/// The name is the Rust type name of the function or closure it was built
/// from and is only used for diagnostics such as [`Dispatcher::routes`](crate::Dispatcher::routes).
#[derive(Clone)]
pub struct Handler {
    name: &'static str,
    func: Arc<HandlerFn>,
}

impl Handler {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        Self {
            name: std::any::type_name::<F>(),
            func: Arc::new(func),
        }
    }

    /// Overrides the diagnostic name.
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn call(&self, ctx: &mut Context) {
        (self.func)(ctx)
    }
}

impl<F> From<F> for Handler
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    fn from(func: F) -> Self {
        Handler::new(func)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.name).finish()
    }
}

/// An immutable, shareable handler chain.
pub type HandlersChain = Arc<[Handler]>;

/// Builds a `Vec<Handler>` from functions or closures of different types.
///
/// ```
/// use thicket::{chain, Context};
///
/// fn auth(ctx: &mut Context) { ctx.next(); }
/// fn show(ctx: &mut Context) { ctx.string(200, "ok"); }
///
/// let handlers = chain![auth, show];
/// assert_eq!(handlers.len(), 2);
/// ```
#[macro_export]
macro_rules! chain {
    [] => { ::std::vec::Vec::<$crate::Handler>::new() };
    [ $($handler:expr),+ $(,)? ] => {
        vec![$($crate::Handler::new($handler)),+]
    };
}

/// Name of the last handler of a chain, which is the route's own handler.
pub(crate) fn last_name(chain: &[Handler]) -> &'static str {
    chain.last().map(Handler::name).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(_ctx: &mut Context) {}

    /// Tests that handler names come from the wrapped function's type name.
    #[test]
    fn test_handler_names() {
        let handler = Handler::new(index);
        assert!(handler.name().ends_with("handler::tests::index"));

        let renamed = Handler::new(|_: &mut Context| {}).named("inline");
        assert_eq!(renamed.name(), "inline");
    }

    /// Tests the chain macro and last-handler lookup.
    #[test]
    fn test_chain_macro() {
        let handlers = chain![index, |_: &mut Context| {}];
        assert_eq!(handlers.len(), 2);
        assert!(last_name(&handlers).contains("{{closure}}"));
        assert_eq!(last_name(&[]), "");
        assert!(chain![].is_empty());
    }
}
