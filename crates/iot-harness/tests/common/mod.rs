use std::sync::{Arc, Mutex};

use iot_core::{Dispatcher, Next};
use iot_proto::Request;

/// A `Dispatcher` whose sole middleware appends every unmatched inbound
/// `Signal`/`Request`/`Streaming` frame to a shared `Vec`, for tests that
/// just want to observe what the engine delivered upward.
pub fn collecting_dispatcher() -> (Dispatcher, Arc<Mutex<Vec<Request>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let mut dispatcher = Dispatcher::new();
    let sink = received.clone();
    dispatcher.add(move |req: Request, _next: Next| {
        let sink = sink.clone();
        async move {
            sink.lock().expect("collector mutex poisoned").push(req);
        }
    });
    (dispatcher, received)
}
