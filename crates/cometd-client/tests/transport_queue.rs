//! Request transport bookkeeping: connection slots, the long-poll slot,
//! network timeouts and the two wire variants.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use cometd_client::config::ClientConfig;
use cometd_client::timer::TimerTask;
use cometd_client::transport::callback_polling::{encoded_url_length, unwrap_jsonp, MAX_URL_LENGTH};
use cometd_client::transport::{
    CallbackPollingTransport, Envelope, Exchange, LongPollingTransport, Outcome, Transport,
    TransportContext,
};
use cometd_core::Message;

use harness::{FakeExchange, FakeScheduler, Kind};

const URL: &str = "https://x/bayeux";

fn envelope(channel: &str) -> Envelope {
    Envelope {
        url: URL.into(),
        sync: false,
        messages: vec![Message::publish(channel, json!(1))],
    }
}

struct Fixture {
    config: ClientConfig,
    scheduler: Arc<FakeScheduler>,
    exchange: Arc<FakeExchange>,
}

impl Fixture {
    fn new(config: ClientConfig) -> Self {
        Self {
            config,
            scheduler: Arc::new(FakeScheduler::default()),
            exchange: Arc::new(FakeExchange::default()),
        }
    }

    fn ctx(&self) -> TransportContext<'_> {
        TransportContext {
            config: &self.config,
            advice: &self.config.advice,
            scheduler: self.scheduler.as_ref(),
        }
    }

    fn exchange(&self) -> Arc<dyn Exchange> {
        self.exchange.clone()
    }
}

#[test]
fn ordinary_sends_are_bounded_and_fifo() {
    let mut cfg = ClientConfig::new(URL);
    cfg.max_connections = 3;
    let f = Fixture::new(cfg);
    let mut t = LongPollingTransport::with_exchange(f.exchange());

    for n in 1..=5 {
        t.send(&f.ctx(), envelope(&format!("/m{n}")), false).unwrap();
    }
    assert_eq!(t.in_flight(), 2);
    assert_eq!(t.queued(), 3);

    let sent = f.exchange.take_sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].channels(), vec!["/m1"]);
    assert_eq!(sent[1].channels(), vec!["/m2"]);

    let first = sent[0].request.request;
    t.complete(&f.ctx(), first, true, false).unwrap();
    assert_eq!(t.in_flight(), 2);
    assert_eq!(t.queued(), 2);

    let sent = f.exchange.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channels(), vec!["/m3"]);
}

#[test]
fn one_long_poll_at_a_time() {
    let f = Fixture::new(ClientConfig::new(URL));
    let mut t = LongPollingTransport::with_exchange(f.exchange());

    t.send(&f.ctx(), envelope("/meta/connect"), true).unwrap();
    let err = t
        .send(&f.ctx(), envelope("/meta/connect"), true)
        .expect_err("second long-poll");
    assert_eq!(err.code().as_str(), "CONCURRENT_LONG_POLL");

    // long-polls do not take an ordinary slot
    t.send(&f.ctx(), envelope("/p"), false).unwrap();
    assert_eq!(t.in_flight(), 1);

    let sent = f.exchange.take_sent();
    let longpoll = sent[0].request.request;
    t.complete(&f.ctx(), longpoll, true, true).unwrap();
    assert!(!t.longpoll_pending());
    t.send(&f.ctx(), envelope("/meta/connect"), true).unwrap();
}

#[test]
fn network_delay_includes_advice_timeout_for_long_polls() {
    let f = Fixture::new(ClientConfig::new(URL));
    let mut t = LongPollingTransport::with_exchange(f.exchange());

    t.send(&f.ctx(), envelope("/p"), false).unwrap();
    t.send(&f.ctx(), envelope("/meta/connect"), true).unwrap();

    let mut delays: Vec<Duration> = f
        .scheduler
        .pending()
        .into_iter()
        .filter(|(_, _, task)| matches!(task, TimerTask::RequestTimeout { .. }))
        .map(|(_, d, _)| d)
        .collect();
    delays.sort();
    assert_eq!(
        delays,
        vec![Duration::from_millis(10_000), Duration::from_millis(70_000)]
    );
}

#[test]
fn sync_sends_have_no_timeout() {
    let f = Fixture::new(ClientConfig::new(URL));
    let mut t = LongPollingTransport::with_exchange(f.exchange());
    let mut env = envelope("/meta/disconnect");
    env.sync = true;
    t.send(&f.ctx(), env, false).unwrap();
    assert!(f.scheduler.pending().is_empty());
    assert!(f.exchange.take_sent()[0].request.sync);
}

#[test]
fn expired_request_ignores_late_response() {
    let f = Fixture::new(ClientConfig::new(URL));
    let mut t = LongPollingTransport::with_exchange(f.exchange());
    t.send(&f.ctx(), envelope("/p"), false).unwrap();
    let sent = f.exchange.take_sent();
    let request = sent[0].request.request;

    let (timer, _) = f
        .scheduler
        .take(|task| matches!(task, TimerTask::RequestTimeout { .. }))
        .unwrap();
    let resolution = t.expire(&f.ctx(), timer.id, request).unwrap();
    match &resolution.outcome {
        Outcome::Failure(failure) => assert_eq!(failure.reason, "timeout"),
        other => panic!("expected a timeout, got {other:?}"),
    }
    assert_eq!(resolution.envelope.messages[0].channel, "/p");
    assert_eq!(f.exchange.aborted(), vec![(sent[0].request.transport.clone(), request)]);

    let late = json!([{"channel": "/p", "successful": true}]).to_string();
    assert!(t.transport_success(&f.ctx(), request, &late).is_none());
    assert!(t.expire(&f.ctx(), timer.id, request).is_none());
}

#[test]
fn response_cancels_timeout() {
    let f = Fixture::new(ClientConfig::new(URL));
    let mut t = LongPollingTransport::with_exchange(f.exchange());
    t.send(&f.ctx(), envelope("/p"), false).unwrap();
    let request = f.exchange.take_sent()[0].request.request;

    let body = json!([{"channel": "/p", "successful": true}]).to_string();
    let resolution = t.transport_success(&f.ctx(), request, &body).unwrap();
    assert!(matches!(resolution.outcome, Outcome::Success(ref m) if m.len() == 1));
    assert!(f.scheduler.pending().is_empty());
    // second completion of the same request is ignored
    assert!(t.transport_success(&f.ctx(), request, &body).is_none());
}

#[test]
fn auto_batch_coalesces_queued_envelopes() {
    let mut cfg = ClientConfig::new(URL);
    cfg.auto_batch = true;
    let f = Fixture::new(cfg);
    let mut t = LongPollingTransport::with_exchange(f.exchange());

    t.send(&f.ctx(), envelope("/a"), false).unwrap();
    t.send(&f.ctx(), envelope("/b"), false).unwrap();
    t.send(&f.ctx(), envelope("/c"), false).unwrap();
    let mut other = envelope("/d");
    other.url = format!("{URL}/elsewhere");
    t.send(&f.ctx(), other, false).unwrap();
    assert_eq!(t.queued(), 3);

    let first = f.exchange.take_sent()[0].request.request;
    t.complete(&f.ctx(), first, true, false).unwrap();

    let sent = f.exchange.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channels(), vec!["/b", "/c"]);
    assert_eq!(t.queued(), 1);
}

#[test]
fn no_coalescing_after_a_failure() {
    let mut cfg = ClientConfig::new(URL);
    cfg.auto_batch = true;
    let f = Fixture::new(cfg);
    let mut t = LongPollingTransport::with_exchange(f.exchange());

    t.send(&f.ctx(), envelope("/a"), false).unwrap();
    t.send(&f.ctx(), envelope("/b"), false).unwrap();
    t.send(&f.ctx(), envelope("/c"), false).unwrap();

    let first = f.exchange.take_sent()[0].request.request;
    t.complete(&f.ctx(), first, false, false).unwrap();
    assert_eq!(f.exchange.take_sent()[0].channels(), vec!["/b"]);
}

#[test]
fn empty_response_disables_cross_domain() {
    let f = Fixture::new(ClientConfig::new(URL));
    let mut t = LongPollingTransport::with_exchange(f.exchange());
    assert!(t.accept("1.0", true));

    t.send(&f.ctx(), envelope("/p"), false).unwrap();
    let request = f.exchange.take_sent()[0].request.request;
    let resolution = t.transport_success(&f.ctx(), request, "").unwrap();
    match resolution.outcome {
        Outcome::Failure(failure) => assert_eq!(failure.reason, "no response"),
        other => panic!("expected a failure, got {other:?}"),
    }

    assert!(!t.accept("1.0", true));
    assert!(t.accept("1.0", false));
    t.reset();
    assert!(t.accept("1.0", true));
}

#[test]
fn abort_cancels_everything() {
    let f = Fixture::new(ClientConfig::new(URL));
    let mut t = LongPollingTransport::with_exchange(f.exchange());
    t.send(&f.ctx(), envelope("/p"), false).unwrap();
    t.send(&f.ctx(), envelope("/q"), false).unwrap();
    t.send(&f.ctx(), envelope("/meta/connect"), true).unwrap();

    t.abort(&f.ctx());
    assert_eq!(f.exchange.aborted().len(), 2);
    assert_eq!(t.in_flight(), 0);
    assert_eq!(t.queued(), 0);
    assert!(!t.longpoll_pending());
    assert!(f.scheduler.pending().is_empty());
}

#[test]
fn callback_polling_uses_jsonp() {
    let f = Fixture::new(ClientConfig::new(URL));
    let mut t = CallbackPollingTransport::with_exchange(f.exchange());
    assert!(t.accept("1.0", true));

    t.send(&f.ctx(), envelope("/p"), false).unwrap();
    let sent = f.exchange.take_sent();
    assert_eq!(sent[0].kind, Kind::Jsonp);
    assert_eq!(sent[0].request.transport, "callback-polling");

    let body = r#"cometd_jsonp([{"channel":"/p","successful":true}]);"#;
    let resolution = t
        .transport_success(&f.ctx(), sent[0].request.request, body)
        .unwrap();
    assert!(matches!(resolution.outcome, Outcome::Success(ref m) if m[0].channel == "/p"));
}

#[test]
fn callback_polling_rejects_oversized_batches() {
    let f = Fixture::new(ClientConfig::new(URL));
    let mut t = CallbackPollingTransport::with_exchange(f.exchange());

    let big = "x".repeat(MAX_URL_LENGTH);
    let env = Envelope {
        url: URL.into(),
        sync: false,
        messages: vec![Message::publish("/p", json!(big))],
    };
    t.send(&f.ctx(), env, false).unwrap();
    assert!(f.exchange.take_sent().is_empty());

    let (timer, delay) = f
        .scheduler
        .take(|task| matches!(task, TimerTask::DeferredFailure { .. }))
        .unwrap();
    assert_eq!(delay, Duration::ZERO);
    let TimerTask::DeferredFailure { reason, request, .. } = timer.task else {
        panic!("not a deferred failure");
    };
    assert!(reason.starts_with("bayeux message too big"), "{reason}");
    assert!(reason.contains("max is 2000"), "{reason}");

    let resolution = t
        .transport_failure(
            &f.ctx(),
            request,
            cometd_client::transport::Failure::with_detail("error", reason),
        )
        .unwrap();
    assert!(matches!(resolution.outcome, Outcome::Failure(_)));
}

#[test]
fn callback_polling_names_batches_in_size_errors() {
    let f = Fixture::new(ClientConfig::new(URL));
    let mut t = CallbackPollingTransport::with_exchange(f.exchange());
    let half = "y".repeat(MAX_URL_LENGTH / 2);
    let env = Envelope {
        url: URL.into(),
        sync: false,
        messages: vec![
            Message::publish("/p", json!(half.clone())),
            Message::publish("/p", json!(half)),
        ],
    };
    t.send(&f.ctx(), env, false).unwrap();
    let (timer, _) = f
        .scheduler
        .take(|task| matches!(task, TimerTask::DeferredFailure { .. }))
        .unwrap();
    let TimerTask::DeferredFailure { reason, .. } = timer.task else {
        panic!("not a deferred failure");
    };
    assert!(reason.starts_with("too many bayeux messages"), "{reason}");
}

#[test]
fn jsonp_helpers() {
    assert_eq!(unwrap_jsonp("cometd_jsonp([1])", "cometd_jsonp"), "[1]");
    assert_eq!(unwrap_jsonp(" cometd_jsonp ( [1] ) ; ", "cometd_jsonp"), "[1]");
    assert_eq!(unwrap_jsonp("[1]", "cometd_jsonp"), "[1]");

    assert_eq!(encoded_url_length("http://h/c", "[]"), 10 + 6);
    // brackets, space and quotes are all escaped
    assert_eq!(encoded_url_length("", r#"[" "]"#), 5 * 3);
}
