//! Links, monitors, spawn supervision and named services.

use std::time::{Duration, Instant};
use strand_actors::{
    atom, ActorError, Context, ContextConfig, ExitCode, MatchType, Message, Pattern, SpawnOpts,
    EXIT,
};

const FAIL: MatchType = atom("fail");
const ECHO: MatchType = atom("echo");
const READY: MatchType = atom("ready");
const STOP: MatchType = atom("stop");
const REPORT: MatchType = atom("report");
const CHECK: MatchType = atom("check");

fn context() -> Context {
    Context::new(ContextConfig {
        ctxid: "sup".to_string(),
        thread_num: 2,
        per_thread_service_num: 2,
        nonblocked_num: 1,
        default_request_timeout_ms: 2_000,
        ..ContextConfig::default()
    })
    .unwrap()
}

fn exit_code(msg: &Message) -> ExitCode {
    msg.exit_info().unwrap().0
}

#[tokio::test]
async fn test_linked_peer_failure_delivers_one_exit() {
    let ctx = context();
    let worker = ctx
        .spawn(|mut actor| async move {
            actor.recv_types([FAIL]).await;
            Err(ActorError::fault("asked to fail"))
        })
        .await
        .unwrap();

    let mut watcher = ctx.threaded_actor().await.unwrap();
    watcher.link(worker).await.unwrap();
    watcher.send(worker, Message::new(FAIL)).await.unwrap();

    let (from, exit) = watcher.recv_types([EXIT]).await.unwrap();
    assert_eq!(from, worker);
    assert_eq!(exit_code(&exit), ExitCode::Exception);

    let (from, _) = watcher
        .recv_match(Pattern::of([EXIT]).timeout(Duration::from_millis(100)))
        .await
        .unwrap();
    assert!(from.is_nil());
}

#[tokio::test]
async fn test_link_to_exited_actor_notifies_immediately() {
    let ctx = context();
    let mut first = ctx.threaded_actor().await.unwrap();
    let mut second = ctx.threaded_actor().await.unwrap();

    let gone = ctx.spawn(|_actor| async move { Ok(()) }).await.unwrap();
    first.monitor(gone).await.unwrap();
    first.recv_types([EXIT]).await.unwrap();

    let started = Instant::now();
    second.link(gone).await.unwrap();
    let (from, exit) = second.recv_types([EXIT]).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(from, gone);
    assert_eq!(exit_code(&exit), ExitCode::Already);
}

#[tokio::test]
async fn test_link_is_bidirectional() {
    let ctx = context();
    let mut observer = ctx.threaded_actor().await.unwrap();
    let report_to = observer.aid();

    let peer = ctx
        .spawn(move |mut actor| async move {
            let (from, exit) = actor.recv_types([EXIT]).await;
            actor.send(report_to, Message::with(REPORT, &from).unwrap());
            actor.send(report_to, exit);
            Ok(())
        })
        .await
        .unwrap();

    let mut linker = ctx.threaded_actor().await.unwrap();
    let linker_aid = linker.aid();
    linker.link(peer).await.unwrap();
    linker.quit(ExitCode::Exception, "linker done").await.unwrap();

    let (_, who) = observer.recv_types([REPORT]).await.unwrap();
    assert_eq!(who.decode::<strand_actors::Aid>().unwrap(), linker_aid);
    let (from, exit) = observer.recv_types([EXIT]).await.unwrap();
    assert_eq!(from, peer);
    assert_eq!(
        exit.exit_info().unwrap(),
        (ExitCode::Exception, "linker done".to_string())
    );
}

#[tokio::test]
async fn test_monitor_is_one_directional() {
    let ctx = context();
    let mut observer = ctx.threaded_actor().await.unwrap();
    let report_to = observer.aid();

    let watched = ctx
        .spawn(move |mut actor| async move {
            let (from, _) = actor
                .recv_match(&Pattern::of([EXIT]).timeout(Duration::from_millis(200)))
                .await;
            actor.send(report_to, Message::with(REPORT, &from.is_nil()).unwrap());
            Ok(())
        })
        .await
        .unwrap();

    let mut watcher = ctx.threaded_actor().await.unwrap();
    watcher.monitor(watched).await.unwrap();
    watcher.quit(ExitCode::Normal, "").await.unwrap();

    let (_, report) = observer.recv_types([REPORT]).await.unwrap();
    assert!(report.decode::<bool>().unwrap(), "watched actor saw an exit");
}

#[tokio::test]
async fn test_exited_watcher_is_forgotten() {
    let ctx = context();
    let watched = ctx
        .spawn(|mut actor| async move {
            loop {
                let (from, msg) = actor.recv_types([CHECK, STOP]).await;
                if msg.ty() == STOP {
                    return Ok(());
                }
                let count = actor.link_count() as u64;
                actor.reply(from, Message::with(REPORT, &count)?);
            }
        })
        .await
        .unwrap();

    let mut client = ctx.threaded_actor().await.unwrap();
    let mut watcher = ctx.threaded_actor().await.unwrap();
    watcher.monitor(watched).await.unwrap();

    let handle = client.request(watched, Message::new(CHECK)).await.unwrap();
    let (_, count) = client.respond(handle).await.unwrap();
    assert_eq!(count.decode::<u64>().unwrap(), 1);

    watcher.quit(ExitCode::Normal, "").await.unwrap();
    let handle = client.request(watched, Message::new(CHECK)).await.unwrap();
    let (_, count) = client.respond(handle).await.unwrap();
    assert_eq!(count.decode::<u64>().unwrap(), 0);

    client.send(watched, Message::new(STOP)).await.unwrap();
}

#[tokio::test]
async fn test_unlink_discards_cached_exit() {
    let ctx = context();
    let worker = ctx
        .spawn(|mut actor| async move {
            actor.recv_types([FAIL]).await;
            Err(ActorError::fault("asked to fail"))
        })
        .await
        .unwrap();

    let mut owner = ctx.threaded_actor().await.unwrap();
    owner.link(worker).await.unwrap();
    owner.send(worker, Message::new(FAIL)).await.unwrap();

    // Nothing of this type ever arrives; the cached exit answers instead, and stays.
    let pattern = Pattern::of([atom("never")])
        .recver(worker)
        .timeout(Duration::from_secs(2));
    let (from, exit) = owner.recv_match(pattern.clone()).await.unwrap();
    assert_eq!(from, worker);
    assert_eq!(exit_code(&exit), ExitCode::Exception);
    let (from, _) = owner.recv_match(pattern).await.unwrap();
    assert_eq!(from, worker);

    owner.unlink(worker).await.unwrap();
    let (from, _) = owner
        .recv_match(Pattern::of([EXIT]).timeout(Duration::from_millis(50)))
        .await
        .unwrap();
    assert!(from.is_nil());
}

#[tokio::test]
async fn test_spawn_linked_and_monitored_children() {
    let ctx = context();
    let mut sire = ctx.threaded_actor().await.unwrap();

    let crashing = sire
        .spawn(
            |_actor| async move { Err(ActorError::fault("child crashed")) },
            SpawnOpts::linked(),
        )
        .await
        .unwrap();
    let (from, exit) = sire.recv_types([EXIT]).await.unwrap();
    assert_eq!(from, crashing);
    assert_eq!(exit_code(&exit), ExitCode::Exception);

    let finishing = sire
        .spawn(
            |mut actor| async move {
                actor.recv_types([STOP]).await;
                Ok(())
            },
            SpawnOpts::monitored(),
        )
        .await
        .unwrap();
    sire.send(finishing, Message::new(STOP)).await.unwrap();
    let (from, exit) = sire.recv_types([EXIT]).await.unwrap();
    assert_eq!(from, finishing);
    assert_eq!(exit_code(&exit), ExitCode::Normal);
}

#[tokio::test]
async fn test_spawn_reports_pool_exhaustion() {
    let ctx = Context::new(ContextConfig {
        ctxid: "tiny".to_string(),
        thread_num: 1,
        per_thread_service_num: 1,
        nonblocked_num: 1,
        actor_pool_reserve_size: 1,
        actor_pool_max_size: 1,
        ..ContextConfig::default()
    })
    .unwrap();
    let mut sire = ctx.threaded_actor().await.unwrap();

    // The threaded actor already holds the only slot of its strand.
    let refused = sire
        .spawn(|_actor| async move { Ok(()) }, SpawnOpts::default().pinned())
        .await;
    match refused {
        Err(ActorError::SpawnFailed { reason }) => assert!(reason.contains("pool exhausted")),
        other => panic!("expected spawn failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_service_lifecycle() {
    let ctx = context();
    let mut client = ctx.threaded_actor().await.unwrap();
    let ready_to = client.aid();

    let echo = ctx
        .spawn(move |mut actor| async move {
            actor.register_service(ECHO).await.unwrap();
            actor.send(ready_to, Message::new(READY));
            loop {
                let (from, msg) = actor.recv().await;
                if msg.ty() == STOP {
                    return Ok(());
                }
                actor.reply(from, msg);
            }
        })
        .await
        .unwrap();
    client.recv_types([READY]).await.unwrap();

    let svc = client.service(ECHO);
    let handle = client
        .request_svc(svc, Message::from_bytes(ECHO, &b"hi"[..]))
        .await
        .unwrap();
    let (from, reply) = client.respond(handle).await.unwrap();
    assert_eq!(from, echo);
    assert_eq!(&reply.payload()[..], b"hi");

    // The exit is cached under the service id as well.
    client.monitor(echo).await.unwrap();
    client.send_svc(svc, Message::new(STOP)).await.unwrap();
    let (from, exit) = client
        .recv_match(
            Pattern::of([atom("never")])
                .recver(svc)
                .timeout(Duration::from_secs(2)),
        )
        .await
        .unwrap();
    assert_eq!(from, echo);
    assert_eq!(exit_code(&exit), ExitCode::Normal);

    let handle = client
        .request_svc(svc, Message::new(ECHO))
        .await
        .unwrap();
    let (_, reply) = client.respond(handle).await.unwrap();
    assert!(reply.is_exit());
}

#[tokio::test]
async fn test_unknown_service_answers_already() {
    let ctx = context();
    let mut client = ctx.threaded_actor().await.unwrap();
    let ghost = client.service(atom("ghost"));

    let started = Instant::now();
    let handle = client
        .request_svc(ghost, Message::new(ECHO))
        .await
        .unwrap();
    let (from, reply) = client.respond(handle).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(from.is_nil());
    assert_eq!(exit_code(&reply), ExitCode::Already);
}
