//! End-to-end relay behavior over an in-memory connection.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;

use svcrelay_core::error::{CryptoOp, Result, RelayError};
use svcrelay_core::protocol::{
    CorrelationKey, ErrorHolder, InvocationDescriptor, Payload, RequestEnvelope, ResponseBody,
    ResponseEnvelope,
};
use svcrelay_gateway::config::ServicesSection;
use svcrelay_gateway::connection::{ChannelSink, ClientConnection, SinkEvent};
use svcrelay_gateway::context::{session, SessionContext, SessionToken};
use svcrelay_gateway::crypto::{Cryptor, PassthroughCryptor, XChaChaCryptor};
use svcrelay_gateway::dispatch::{Deferred, Fault, HandlerRegistration, Relay, Reply, ServiceRegistry};
use svcrelay_gateway::obs::RelayMetrics;
use svcrelay_gateway::services;

const KEY_HEX: &str = "1f1e1d1c1b1a191817161514131211100f0e0d0c0b0a09080706050403020100";

struct Faulty;

impl Faulty {
    fn crash(&self, _args: &[Value]) -> std::result::Result<Reply, Fault> {
        panic!("index out of bounds")
    }

    fn abandon(&self, _args: &[Value]) -> std::result::Result<Reply, Fault> {
        let (completer, deferred) = Deferred::pending();
        drop(completer);
        Ok(Reply::Deferred(deferred))
    }

    fn later(&self, _args: &[Value]) -> std::result::Result<Reply, Fault> {
        let (completer, deferred) = Deferred::pending();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            // Completion runs on this thread, with no binding of its own.
            let bound = session::current().is_some();
            completer.succeed(json!({ "bound": bound }));
        });
        Ok(Reply::Deferred(deferred))
    }
}

/// Seals fail; unseal passes bytes through.
struct BrokenSeal;

impl Cryptor for BrokenSeal {
    fn seal(&self, _plain: &[u8]) -> Result<Bytes> {
        Err(RelayError::Crypto {
            op: CryptoOp::Seal,
            reason: "key material revoked".into(),
        })
    }

    fn unseal(&self, sealed: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(sealed))
    }
}

struct Harness {
    relay: Relay,
    metrics: Arc<RelayMetrics>,
}

impl Harness {
    fn new() -> Self {
        let registry = Arc::new(ServiceRegistry::new());
        services::register_builtin(&registry, &ServicesSection::default());
        registry.register(
            HandlerRegistration::builder("Faulty", Arc::new(Faulty))
                .method("crash", &[], Faulty::crash)
                .method("abandon", &[], Faulty::abandon)
                .method("later", &[], Faulty::later)
                .build(),
        );
        let metrics = Arc::new(RelayMetrics::default());
        Self {
            relay: Relay::new(registry, Arc::clone(&metrics)),
            metrics,
        }
    }

    fn connect(&self, id: &str, cryptor: Arc<dyn Cryptor>) -> (Arc<ClientConnection>, UnboundedReceiver<SinkEvent>) {
        let (sink, rx) = ChannelSink::new();
        let ctx = SessionContext::new(
            id,
            Some(SessionToken {
                session_id: format!("sess-{id}"),
                user: "user:dev".into(),
            }),
        );
        (Arc::new(ClientConnection::new(ctx, cryptor, Arc::new(sink))), rx)
    }
}

fn plain(key: &'static str, target: &str, method: &str, args: Vec<Value>) -> RequestEnvelope {
    let body = InvocationDescriptor::new(target, method, args).encode().unwrap();
    RequestEnvelope::new(key.into(), Payload::Plain(body))
}

fn sealed(cryptor: &dyn Cryptor, key: &'static str, target: &str, method: &str, args: Vec<Value>) -> RequestEnvelope {
    let body = InvocationDescriptor::new(target, method, args).encode().unwrap();
    RequestEnvelope::new(key.into(), Payload::Sealed(cryptor.seal(&body).unwrap()))
}

fn take_response(rx: &mut UnboundedReceiver<SinkEvent>) -> ResponseEnvelope {
    match rx.try_recv() {
        Ok(SinkEvent::Response(r)) => r,
        other => panic!("expected a response, got {other:?}"),
    }
}

fn assert_no_more(rx: &mut UnboundedReceiver<SinkEvent>) {
    assert!(rx.try_recv().is_err(), "more than one sink event");
}

fn plain_body(resp: &ResponseEnvelope) -> ResponseBody {
    match &resp.payload {
        Payload::Plain(b) => ResponseBody::decode(b).unwrap(),
        Payload::Sealed(_) => panic!("response unexpectedly sealed"),
    }
}

fn sealed_body(cryptor: &dyn Cryptor, resp: &ResponseEnvelope) -> ResponseBody {
    match &resp.payload {
        Payload::Sealed(b) => ResponseBody::decode(&cryptor.unseal(b).unwrap()).unwrap(),
        Payload::Plain(_) => panic!("response unexpectedly plain"),
    }
}

fn failure(body: ResponseBody) -> ErrorHolder {
    match body {
        ResponseBody::Failure(h) => h,
        ResponseBody::Success(v) => panic!("expected failure, got success {v}"),
    }
}

#[test]
fn sealed_call_gets_sealed_success() {
    let h = Harness::new();
    let cryptor: Arc<dyn Cryptor> = Arc::new(XChaChaCryptor::from_hex(KEY_HEX).unwrap());
    let (conn, mut rx) = h.connect("c1", Arc::clone(&cryptor));

    h.relay
        .process(&conn, sealed(cryptor.as_ref(), "K1", "Echo", "say", vec![json!("hi")]));

    let resp = take_response(&mut rx);
    assert_eq!(resp.key, CorrelationKey::from("K1"));
    assert_eq!(sealed_body(cryptor.as_ref(), &resp), ResponseBody::Success(json!("hi")));
    assert_no_more(&mut rx);
}

#[test]
fn unknown_target_gets_plain_failure() {
    let h = Harness::new();
    let (conn, mut rx) = h.connect("c2", Arc::new(PassthroughCryptor));

    h.relay.process(&conn, plain("K2", "Unknown", "x", vec![]));

    let resp = take_response(&mut rx);
    assert_eq!(resp.key, CorrelationKey::from("K2"));
    let holder = failure(plain_body(&resp));
    assert_eq!(holder.type_name, "RelayError");
    assert_eq!(holder.message, "unknown service: Unknown");
    assert_no_more(&mut rx);
    assert_eq!(h.metrics.failures.get(&[("class", "system")]), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deferred_value_is_sent_on_completion() {
    let h = Harness::new();
    let (conn, mut rx) = h.connect("c3", Arc::new(PassthroughCryptor));

    let started = Instant::now();
    h.relay
        .process(&conn, plain("K3", "Timer", "after", vec![json!(50), json!(42)]));
    assert!(rx.try_recv().is_err(), "nothing may be sent before completion");

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    let SinkEvent::Response(resp) = event else {
        panic!("expected response");
    };
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(resp.key, CorrelationKey::from("K3"));
    assert_eq!(plain_body(&resp), ResponseBody::Success(json!(42)));
    assert_eq!(h.metrics.responses.get(&[("outcome", "success"), ("mode", "deferred")]), 1);
    assert_eq!(h.metrics.dispatch_duration.count(&[("mode", "deferred")]), 1);
    assert_eq!(h.metrics.dispatch_duration.count(&[("mode", "immediate")]), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deferred_failure_is_sanitized() {
    let h = Harness::new();
    let (conn, mut rx) = h.connect("c4", Arc::new(PassthroughCryptor));

    h.relay
        .process(&conn, plain("K4", "Timer", "fail_after", vec![json!(10), json!("late")]));

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    let SinkEvent::Response(resp) = event else {
        panic!("expected response");
    };
    let holder = failure(plain_body(&resp));
    assert_eq!(holder.type_name, "Rejected");
    assert_eq!(holder.message, "late");
    assert_eq!(h.metrics.failures.get(&[("class", "processing")]), 1);
}

#[test]
fn business_rejection_and_crash_share_wire_shape() {
    let h = Harness::new();
    let (conn, mut rx) = h.connect("c5", Arc::new(PassthroughCryptor));

    h.relay
        .process(&conn, plain("K5a", "Session", "reject", vec![json!("quota")]));
    h.relay.process(&conn, plain("K5b", "Faulty", "crash", vec![]));

    let rejected = failure(plain_body(&take_response(&mut rx)));
    assert_eq!(rejected.type_name, "RequestRejected");
    assert_eq!(rejected.message, "request rejected: quota");
    assert_eq!(rejected.causes, vec!["caller asked to reject: quota".to_string()]);

    let crashed = failure(plain_body(&take_response(&mut rx)));
    assert_eq!(crashed.type_name, "RelayError");
    assert!(crashed.message.starts_with("handler panicked:"), "{}", crashed.message);

    assert_eq!(h.metrics.failures.get(&[("class", "processing")]), 1);
    assert_eq!(h.metrics.failures.get(&[("class", "system")]), 1);
    assert_no_more(&mut rx);
}

#[test]
fn malformed_payloads_still_get_one_response() {
    let h = Harness::new();
    let cryptor: Arc<dyn Cryptor> = Arc::new(XChaChaCryptor::from_hex(KEY_HEX).unwrap());
    let (conn, mut rx) = h.connect("c6", Arc::clone(&cryptor));

    h.relay.process(
        &conn,
        RequestEnvelope::new("bad-json".into(), Payload::Plain(Bytes::from_static(b"not json"))),
    );
    h.relay.process(
        &conn,
        RequestEnvelope::new("bad-seal".into(), Payload::Sealed(Bytes::from_static(b"garbage"))),
    );

    let first = take_response(&mut rx);
    assert_eq!(first.key, CorrelationKey::from("bad-json"));
    assert!(failure(plain_body(&first)).message.starts_with("decode failed"));

    let second = take_response(&mut rx);
    assert_eq!(second.key, CorrelationKey::from("bad-seal"));
    let holder = failure(sealed_body(cryptor.as_ref(), &second));
    assert!(holder.message.starts_with("crypto failure (Unseal)"), "{}", holder.message);
    assert_no_more(&mut rx);
}

#[test]
fn null_and_bad_arguments() {
    let h = Harness::new();
    let (conn, mut rx) = h.connect("c7", Arc::new(PassthroughCryptor));

    h.relay.process(&conn, plain("n", "Echo", "echo", vec![Value::Null]));
    h.relay
        .process(&conn, plain("neg", "Timer", "after", vec![json!(-5), json!(1)]));
    h.relay.process(&conn, plain("arity", "Echo", "say", vec![]));

    assert_eq!(plain_body(&take_response(&mut rx)), ResponseBody::Success(Value::Null));
    assert!(failure(plain_body(&take_response(&mut rx)))
        .message
        .starts_with("argument 0 of after"));
    assert_eq!(
        failure(plain_body(&take_response(&mut rx))).message,
        "no method Echo.say accepts ()"
    );
}

#[test]
fn abandoned_deferred_yields_failure() {
    let h = Harness::new();
    let (conn, mut rx) = h.connect("c8", Arc::new(PassthroughCryptor));

    h.relay.process(&conn, plain("K8", "Faulty", "abandon", vec![]));

    let holder = failure(plain_body(&take_response(&mut rx)));
    assert_eq!(holder.message, "deferred result abandoned before completion");
    assert_no_more(&mut rx);
}

#[tokio::test]
async fn completion_on_foreign_thread_has_no_binding() {
    let h = Harness::new();
    let (conn, mut rx) = h.connect("c9", Arc::new(PassthroughCryptor));

    h.relay.process(&conn, plain("K9", "Faulty", "later", vec![]));

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    let SinkEvent::Response(resp) = event else {
        panic!("expected response");
    };
    assert_eq!(plain_body(&resp), ResponseBody::Success(json!({ "bound": false })));
}

#[test]
fn unsealable_response_aborts_instead_of_sending() {
    let h = Harness::new();
    let (conn, mut rx) = h.connect("c10", Arc::new(BrokenSeal));

    h.relay.process(
        &conn,
        RequestEnvelope::new(
            "K10".into(),
            Payload::Sealed(InvocationDescriptor::new("Echo", "say", vec![json!("x")]).encode().unwrap()),
        ),
    );

    match rx.try_recv() {
        Ok(SinkEvent::Abort { key, error }) => {
            assert_eq!(key, CorrelationKey::from("K10"));
            assert!(error.is_fatal_for_exchange());
        }
        other => panic!("expected abort, got {other:?}"),
    }
    assert_no_more(&mut rx);
    assert_eq!(h.metrics.aborts.get(&[("category", "ENCODING")]), 1);
}

#[test]
fn concurrent_calls_see_only_their_own_session() {
    let h = Arc::new(Harness::new());
    let workers: Vec<_> = (0..8)
        .map(|i| {
            let h = Arc::clone(&h);
            std::thread::spawn(move || {
                let id = format!("conn-{i}");
                let (conn, mut rx) = h.connect(&id, Arc::new(PassthroughCryptor));
                for _ in 0..25 {
                    assert!(session::current().is_none());
                    h.relay.process(&conn, plain("who", "Session", "whoami", vec![]));
                    assert!(session::current().is_none());
                    let body = plain_body(&take_response(&mut rx));
                    let ResponseBody::Success(v) = body else {
                        panic!("whoami failed");
                    };
                    assert_eq!(v["connection_id"], json!(id));
                    assert_eq!(v["session_id"], json!(format!("sess-{id}")));
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    assert_eq!(h.metrics.responses.get(&[("outcome", "success"), ("mode", "immediate")]), 200);
    assert_eq!(h.metrics.dispatch_duration.count(&[("mode", "immediate")]), 200);
}
