//! Traffic that crosses a context boundary.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use strand_actors::{
    atom, ActorError, Aid, Context, ContextConfig, CtxId, ExitCode, LocalRelay, MatchType,
    Message, Relay, Tag, EXIT,
};
use strand_codec::WireEnvelope;

const PING: MatchType = atom("ping");
const FAIL: MatchType = atom("fail");

fn context(name: &str) -> Context {
    Context::new(ContextConfig {
        ctxid: name.to_string(),
        thread_num: 2,
        per_thread_service_num: 1,
        nonblocked_num: 1,
        default_request_timeout_ms: 2_000,
        ..ContextConfig::default()
    })
    .unwrap()
}

fn joined(left: &Context, right: &Context) -> Arc<LocalRelay> {
    let relay = Arc::new(LocalRelay::new());
    relay.attach(left.wire_sink());
    relay.attach(right.wire_sink());
    left.set_relay(relay.clone());
    right.set_relay(relay.clone());
    relay
}

fn foreign_aid() -> Aid {
    Aid::new(CtxId::from_name("elsewhere"), 0, 1, 1)
}

struct Refusing;

#[async_trait]
impl Relay for Refusing {
    async fn forward(&self, ctxid: CtxId, _frame: Bytes) -> strand_actors::Result<()> {
        Err(ActorError::relay(format!("link to {ctxid} is down")))
    }
}

#[tokio::test]
async fn test_foreign_target_without_relay_answers_neterr() {
    let ctx = context("alone");
    let mut client = ctx.threaded_actor().await.unwrap();
    let target = foreign_aid();

    client.send(target, Message::new(PING)).await.unwrap();
    let (from, exit) = client.recv_types([EXIT]).await.unwrap();
    assert_eq!(from, target);
    assert_eq!(exit.exit_info().unwrap().0, ExitCode::NetErr);

    let handle = client.request(target, Message::new(PING)).await.unwrap();
    let (from, reply) = client.respond(handle).await.unwrap();
    assert_eq!(from, target);
    assert_eq!(reply.exit_info().unwrap().0, ExitCode::NetErr);
}

#[tokio::test]
async fn test_request_across_local_relay() {
    let left = context("left");
    let right = context("right");
    let _relay = joined(&left, &right);

    let echo = right
        .spawn(|mut actor| async move {
            let (from, msg) = actor.recv().await;
            actor.reply(from, msg);
            Ok(())
        })
        .await
        .unwrap();

    let mut client = left.threaded_actor().await.unwrap();
    let handle = client
        .request(echo, Message::from_bytes(PING, &b"over the wire"[..]))
        .await
        .unwrap();
    let (from, reply) = client.respond(handle).await.unwrap();
    assert_eq!(from, echo);
    assert_eq!(&reply.payload()[..], b"over the wire");

    assert!(right.metrics().frames_delivered >= 1);
    assert!(left.metrics().frames_delivered >= 1);
}

#[tokio::test]
async fn test_link_across_contexts() {
    let left = context("left");
    let right = context("right");
    let _relay = joined(&left, &right);

    let worker = right
        .spawn(|mut actor| async move {
            actor.recv_types([FAIL]).await;
            Err(ActorError::fault("remote failure"))
        })
        .await
        .unwrap();

    let mut watcher = left.threaded_actor().await.unwrap();
    watcher.link(worker).await.unwrap();
    watcher.send(worker, Message::new(FAIL)).await.unwrap();

    let (from, exit) = watcher.recv_types([EXIT]).await.unwrap();
    assert_eq!(from, worker);
    let (code, reason) = exit.exit_info().unwrap();
    assert_eq!(code, ExitCode::Exception);
    assert!(reason.contains("remote failure"));
}

#[tokio::test]
async fn test_failed_forward_answers_neterr() {
    let ctx = context("lonely");
    ctx.set_relay(Arc::new(Refusing));
    let mut client = ctx.threaded_actor().await.unwrap();
    let target = foreign_aid();

    let handle = client.request(target, Message::new(PING)).await.unwrap();
    let (from, reply) = client.respond(handle).await.unwrap();
    assert_eq!(from, target);
    assert_eq!(reply.exit_info().unwrap().0, ExitCode::NetErr);
    assert_eq!(ctx.metrics().frames_relayed, 0);

    ctx.clear_relay();
    client.send(target, Message::new(PING)).await.unwrap();
    let (from, exit) = client.recv_types([EXIT]).await.unwrap();
    assert_eq!(from, target);
    assert_eq!(exit.exit_info().unwrap().0, ExitCode::NetErr);
}

#[tokio::test]
async fn test_detached_peer_is_unreachable() {
    let left = context("left");
    let right = context("right");
    let relay = joined(&left, &right);
    let echo = right
        .spawn(|mut actor| async move {
            actor.recv().await;
            Ok(())
        })
        .await
        .unwrap();

    assert!(relay.detach(right.ctxid()));
    let mut client = left.threaded_actor().await.unwrap();
    client.send(echo, Message::new(PING)).await.unwrap();
    let (from, exit) = client.recv_types([EXIT]).await.unwrap();
    assert_eq!(from, echo);
    assert_eq!(exit.exit_info().unwrap().0, ExitCode::NetErr);
}

#[tokio::test]
async fn test_injected_frame_reaches_threaded_actor() {
    let ctx = context("inbound");
    let mut client = ctx.threaded_actor().await.unwrap();
    let sender = Aid::new(CtxId::from_name("remote"), 3, 7, 2);

    let env = WireEnvelope::new(
        client.aid(),
        Tag::Direct(sender),
        Message::from_bytes(PING, &b"injected"[..]),
    );
    ctx.deliver_wire(strand_codec::encode(&env).unwrap()).unwrap();

    let (from, msg) = client.recv().await.unwrap();
    assert_eq!(from, sender);
    assert_eq!(msg.ty(), PING);
    assert_eq!(&msg.payload()[..], b"injected");
}

#[tokio::test]
async fn test_deliver_wire_rejects_bad_frames() {
    let ctx = context("strict");
    let client = ctx.threaded_actor().await.unwrap();

    let garbage = Bytes::from_static(b"definitely not a frame at all");
    assert!(matches!(
        ctx.deliver_wire(garbage),
        Err(ActorError::Codec(_))
    ));

    let misrouted =
        WireEnvelope::new(foreign_aid(), Tag::Direct(client.aid()), Message::new(PING));
    assert!(matches!(
        ctx.deliver_wire(strand_codec::encode(&misrouted).unwrap()),
        Err(ActorError::Relay { .. })
    ));
}

#[tokio::test]
async fn test_stopped_context_answers_remote_requests() {
    let left = context("left");
    let right = context("right");
    let _relay = joined(&left, &right);
    let echo = right
        .spawn(|mut actor| async move {
            let (from, msg) = actor.recv().await;
            actor.reply(from, msg);
            Ok(())
        })
        .await
        .unwrap();
    right.shutdown();

    let mut client = left.threaded_actor().await.unwrap();
    let started = Instant::now();
    let handle = client.request(echo, Message::new(PING)).await.unwrap();
    let (from, reply) = client
        .respond_timeout(handle, Duration::from_millis(1_500))
        .await
        .unwrap();
    assert_eq!(from, echo);
    assert_eq!(reply.exit_info().unwrap().0, ExitCode::Already);
    assert!(started.elapsed() < Duration::from_millis(1_000));
    assert!(right.metrics().bounces >= 1);

    // Fire-and-forget traffic gets an exit as well.
    client.send(echo, Message::new(PING)).await.unwrap();
    let (from, exit) = client.recv_types([EXIT]).await.unwrap();
    assert_eq!(from, echo);
    assert_eq!(exit.exit_info().unwrap().0, ExitCode::Already);
}
