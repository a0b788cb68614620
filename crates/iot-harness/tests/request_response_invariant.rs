//! Checks that for every `Request`/`Streaming` send carrying a response
//! descriptor, exactly one of a final `on_response` call or `on_timeout`
//! ever fires — both when the peer answers and when it never does.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use iot_core::{ConnectionConfig, ConnectionState, Dispatcher, ResponseHandlers};
use iot_harness::{RecordingTransport, VirtualEnvironment, spawn_forwarder};
use iot_proto::{Method, Request};

fn config() -> ConnectionConfig {
    ConnectionConfig { alive_interval_secs: 0, ..ConnectionConfig::default() }
}

#[tokio::test]
async fn exactly_one_of_response_or_timeout_fires_when_the_peer_answers() {
    let env = VirtualEnvironment::with_seed(6);

    let (a_transport, a_outbound) = RecordingTransport::new("a");
    let (b_transport, b_outbound) = RecordingTransport::new("b");

    // `b`'s echoing middleware needs a handle to `b` itself, which doesn't
    // exist until after the dispatcher it's built into is handed to
    // `ConnectionState::new`. A slot filled right after construction breaks
    // the cycle; nothing dispatches before the slot is set.
    let b_slot: Arc<Mutex<Option<ConnectionState<VirtualEnvironment, RecordingTransport>>>> = Arc::new(Mutex::new(None));
    let b_slot_mw = b_slot.clone();

    let mut b_dispatcher = Dispatcher::new();
    b_dispatcher.add(move |req: Request, _next| {
        let b_slot_mw = b_slot_mw.clone();
        async move {
            let b = b_slot_mw.lock().expect("slot mutex poisoned").clone().expect("b constructed before first dispatch");
            let reply =
                Request::new(Method::Response).with_id(req.id.expect("request carries id")).with_body(b"pong".to_vec());
            let _ = b.response(reply).await;
        }
    });

    let a = ConnectionState::new(env.clone(), a_transport, config(), Dispatcher::new(), || {});
    let b = ConnectionState::new(env.clone(), b_transport, config(), b_dispatcher, || {});
    *b_slot.lock().expect("slot mutex poisoned") = Some(b.clone());

    spawn_forwarder(a_outbound, b.clone());
    spawn_forwarder(b_outbound, a.clone());

    let responses = Arc::new(AtomicUsize::new(0));
    let timeouts = Arc::new(AtomicUsize::new(0));

    let responses_cb = responses.clone();
    let timeouts_cb = timeouts.clone();
    let handlers = ResponseHandlers::on_response(Duration::from_millis(200), move |resp| {
        if resp.is_complete() {
            responses_cb.fetch_add(1, Ordering::SeqCst);
        }
    })
    .with_on_timeout(move || {
        timeouts_cb.fetch_add(1, Ordering::SeqCst);
    });

    let request = Request::new(Method::Request).with_body(b"ping".to_vec());
    a.request(request, Some(handlers)).await.expect("request send succeeds");

    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(responses.load(Ordering::SeqCst), 1);
    assert_eq!(timeouts.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn exactly_one_of_response_or_timeout_fires_when_the_peer_never_answers() {
    let env = VirtualEnvironment::with_seed(7);
    let (a_transport, _a_outbound) = RecordingTransport::new("a");
    let a = ConnectionState::new(env, a_transport, config(), Dispatcher::new(), || {});

    let responses = Arc::new(AtomicUsize::new(0));
    let timeouts = Arc::new(AtomicUsize::new(0));

    let responses_cb = responses.clone();
    let timeouts_cb = timeouts.clone();
    let handlers = ResponseHandlers::on_response(Duration::from_millis(200), move |_resp| {
        responses_cb.fetch_add(1, Ordering::SeqCst);
    })
    .with_on_timeout(move || {
        timeouts_cb.fetch_add(1, Ordering::SeqCst);
    });

    let request = Request::new(Method::Request).with_body(b"ping".to_vec());
    a.request(request, Some(handlers)).await.expect("request send succeeds");

    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(responses.load(Ordering::SeqCst), 0);
    assert_eq!(timeouts.load(Ordering::SeqCst), 1);
}
