use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use iot_proto::Request;

/// A boxed, type-erased future, as produced by a [`Middleware`] closure.
pub type BoxFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// The remaining portion of a middleware chain.
///
/// Calling [`Next::run`] advances to the next middleware (or, if this was
/// the last one, simply returns); never calling it ends the chain right
/// there, silently, exactly as the protocol's dispatch contract specifies.
pub struct Next {
    remaining: Arc<[Arc<dyn Fn(Request, Next) -> BoxFuture<'static> + Send + Sync>]>,
    index: usize,
}

impl Next {
    pub(crate) fn new(chain: Arc<[Arc<dyn Fn(Request, Next) -> BoxFuture<'static> + Send + Sync>]>) -> Self {
        Self { remaining: chain, index: 0 }
    }

    /// Runs the next middleware in the chain with `request`, if any remain.
    pub async fn run(self, request: Request) {
        let Some(middleware) = self.remaining.get(self.index).cloned() else {
            return;
        };
        let next = Next { remaining: self.remaining, index: self.index + 1 };
        middleware(request, next).await;
    }
}

/// One link in the inbound dispatch chain for unmatched `Signal`, `Request`,
/// and `Streaming` frames.
pub type Middleware = Arc<dyn Fn(Request, Next) -> BoxFuture<'static> + Send + Sync>;

/// An ordered list of middleware, invoked in registration order starting
/// from index 0.
#[derive(Clone, Default)]
pub struct Dispatcher {
    chain: Vec<Middleware>,
}

impl Dispatcher {
    /// Creates an empty dispatcher; nothing runs until middleware is added.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware to the end of the chain.
    pub fn add<F, Fut>(&mut self, middleware: F)
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.chain.push(Arc::new(move |req, next| Box::pin(middleware(req, next)) as BoxFuture<'static>));
    }

    /// Runs the chain against `request`, starting from the first
    /// middleware.
    pub async fn dispatch(&self, request: Request) {
        let chain: Arc<[Middleware]> = Arc::from(self.chain.clone());
        Next::new(chain).run(request).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iot_proto::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn middlewares_run_in_order_when_next_is_called() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = Dispatcher::new();

        let first = calls.clone();
        dispatcher.add(move |req, next| {
            let first = first.clone();
            async move {
                first.fetch_add(1, Ordering::SeqCst);
                next.run(req).await;
            }
        });

        let second = calls.clone();
        dispatcher.add(move |_req, _next| {
            let second = second.clone();
            async move {
                second.fetch_add(10, Ordering::SeqCst);
            }
        });

        dispatcher.dispatch(Request::new(Method::Signal)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 11);
    }

    #[tokio::test]
    async fn omitting_next_silently_ends_the_chain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = Dispatcher::new();

        dispatcher.add(move |_req, _next| async move {});

        let second = calls.clone();
        dispatcher.add(move |_req, _next| {
            let second = second.clone();
            async move {
                second.fetch_add(1, Ordering::SeqCst);
            }
        });

        dispatcher.dispatch(Request::new(Method::Signal)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
