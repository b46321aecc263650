//! Mirror demo - two contexts joined by an in-process relay
//!
//! Usage:
//!   mirror --rounds 5
//!   mirror --config config/context.toml --log-level debug
//!
//! Context "right" hosts a `mirror` service that reverses text. A threaded actor
//! in context "left" sends it requests across the relay and prints the replies.

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use strand_actors::{
    atom, Actor, Context, ContextConfig, CtxId, LocalRelay, MatchType, Message, ServiceId,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const MIRROR: MatchType = atom("mirror");
const REFLECT: MatchType = atom("reflect");
const STOP: MatchType = atom("stop");

#[derive(Parser, Debug)]
#[command(name = "mirror")]
#[command(about = "Strand actor runtime demo: request/response across two contexts")]
#[command(version)]
struct Args {
    /// Base context configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Requests to send
    #[arg(short, long, default_value_t = 3)]
    rounds: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct Reflection {
    round: u32,
    text: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let base = match &args.config {
        Some(path) => ContextConfig::load(Some(path.as_path()), None)?,
        None => ContextConfig::default(),
    };
    let left = Context::new(ContextConfig {
        ctxid: "left".to_string(),
        ..base.clone()
    })?;
    let right = Context::new(ContextConfig {
        ctxid: "right".to_string(),
        ..base
    })?;

    let relay = Arc::new(LocalRelay::new());
    relay.attach(left.wire_sink());
    relay.attach(right.wire_sink());
    left.set_relay(relay.clone());
    right.set_relay(relay);

    let mirror = right.spawn(run_mirror).await?;
    info!(actor = %mirror, "Mirror spawned");

    let svc = ServiceId::new(CtxId::from_name("right"), MIRROR);
    let mut client = left.threaded_actor().await?;

    // Early rounds can bounce until the binding reaches every strand of "right".
    let mut round = 0;
    let mut attempts = 0;
    while round < args.rounds {
        let request = Reflection {
            round,
            text: format!("strand round {round}"),
        };
        let handle = client
            .request_svc(svc, Message::with(REFLECT, &request)?)
            .await?;
        let (from, reply) = client
            .respond_timeout(handle, Duration::from_secs(2))
            .await?;

        if from.is_nil() && !reply.is_exit() {
            bail!("mirror did not answer round {round}");
        }
        if reply.is_exit() {
            let (code, reason) = reply.exit_info()?;
            attempts += 1;
            if attempts > 10 {
                bail!("mirror unavailable: {code} ({reason})");
            }
            warn!(code = %code, reason = %reason, "Mirror not reachable yet; retrying");
            tokio::time::sleep(Duration::from_millis(20)).await;
            continue;
        }

        let reflected: Reflection = reply.decode().context("decoding mirror reply")?;
        println!("{} -> {}", request.text, reflected.text);
        round += 1;
    }

    client.send_svc(svc, Message::new(STOP)).await?;
    let metrics = right.metrics();
    info!(
        delivered = metrics.frames_delivered,
        relayed = metrics.frames_relayed,
        "Mirror demo finished"
    );
    Ok(())
}

async fn run_mirror(mut actor: Actor) -> strand_actors::Result<()> {
    actor.register_service(MIRROR).await?;
    loop {
        let (from, msg) = actor.recv_types([REFLECT, STOP]).await;
        if msg.ty() == STOP {
            info!(actor = %actor.aid(), "Mirror stopping");
            return Ok(());
        }
        let mut body: Reflection = msg.decode()?;
        body.text = body.text.chars().rev().collect();
        actor.reply(from, Message::with(REFLECT, &body)?);
    }
}

fn init_logging(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
