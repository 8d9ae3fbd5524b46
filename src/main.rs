use kvtx::command::CmdLine;
use kvtx::config::{Config, SharedConfig};
use kvtx::engine::{Engine, TxStatus};
use kvtx::persistence::aof::{self, AofWriter, DurabilitySink, FsyncPolicy};
use kvtx::resp::RespValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Parse command line args
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = Config::from_args(&args);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.loglevel)),
        )
        .with_writer(std::io::stderr)
        .init();

    let aof_path = config.aof_path();
    let (sink, recovered): (Box<dyn DurabilitySink>, Vec<CmdLine>) = if config.appendonly {
        let entries = aof::load(&aof_path)?;
        info!(path = %aof_path.display(), entries = entries.len(), "append only file loaded");
        (Box::new(AofWriter::open(&aof_path, config.appendfsync)?), entries)
    } else {
        (Box::new(AofWriter::new()), Vec::new())
    };

    let engine = Arc::new(Engine::new(sink).map_err(std::io::Error::other)?);
    if !recovered.is_empty() {
        engine.recover(recovered).await;
    }
    run(engine, Arc::new(RwLock::new(config))).await
}

async fn run(engine: Arc<Engine>, config: SharedConfig) -> std::io::Result<()> {
    let engine_clone = engine.clone();
    let config_clone = config.clone();
    tokio::spawn(async move {
        aof_fsync_loop(engine_clone, config_clone).await;
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut queue: Option<Vec<CmdLine>> = None;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let cmd = match CmdLine::from_inline(&line) {
                    Ok(cmd) if cmd.is_empty() => continue,
                    Ok(cmd) => cmd,
                    Err(e) => {
                        write_reply(&mut stdout, &RespValue::error(format!("ERR Protocol error: {e}"))).await?;
                        continue;
                    }
                };
                let reply = handle(&engine, &config, &mut queue, cmd).await;
                write_reply(&mut stdout, &reply).await?;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Shutting down...");
    if let Err(e) = engine.flush_log().await {
        warn!(error = %e, "failed to flush append only file");
    }
    Ok(())
}

/// Console-level commands first, everything else goes to the engine.
async fn handle(
    engine: &Engine,
    config: &SharedConfig,
    queue: &mut Option<Vec<CmdLine>>,
    cmd: CmdLine,
) -> RespValue {
    let name = String::from_utf8_lossy(cmd.name()).to_ascii_uppercase();
    match (name.as_str(), queue.as_mut()) {
        ("MULTI", Some(_)) => RespValue::error("ERR MULTI calls can not be nested"),
        ("MULTI", None) => {
            *queue = Some(Vec::new());
            RespValue::ok()
        }
        ("EXEC", None) => RespValue::error("ERR EXEC without MULTI"),
        ("EXEC", Some(_)) => {
            let cmds = queue.take().unwrap_or_default();
            let outcome = engine.run_transaction(cmds).await;
            match (outcome.status, outcome.error) {
                (TxStatus::Committed | TxStatus::RolledBack, _) | (_, None) => {
                    RespValue::array(outcome.replies)
                }
                (TxStatus::Rejected, Some(e)) => RespValue::error(format!(
                    "EXECABORT Transaction discarded because of: {e}"
                )),
                (TxStatus::NotDurable, Some(e)) => e.to_resp_error(),
            }
        }
        ("DISCARD", None) => RespValue::error("ERR DISCARD without MULTI"),
        ("DISCARD", Some(_)) => {
            *queue = None;
            RespValue::ok()
        }
        (_, Some(batch)) => {
            batch.push(cmd);
            RespValue::SimpleString("QUEUED".to_string())
        }
        ("BGREWRITEAOF", None) => match engine.rewrite_log().await {
            Ok(_) => RespValue::ok(),
            Err(e) => e.to_resp_error(),
        },
        ("COMMAND", None) => RespValue::array(
            engine
                .command_table()
                .into_iter()
                .map(|entry| {
                    RespValue::array(vec![
                        RespValue::bulk_string(entry.name.to_ascii_lowercase()),
                        RespValue::integer(entry.arity as i64),
                        RespValue::SimpleString(entry.mode.as_str().to_string()),
                    ])
                })
                .collect(),
        ),
        ("CONFIG", None) => config_command(engine, config, cmd.args()).await,
        _ => engine.execute(cmd).await,
    }
}

async fn config_command(engine: &Engine, config: &SharedConfig, args: &[Vec<u8>]) -> RespValue {
    let text = |i: usize| args.get(i).map(|a| String::from_utf8_lossy(a).into_owned());
    match (text(0).map(|s| s.to_ascii_uppercase()).as_deref(), text(1), text(2)) {
        (Some("GET"), Some(name), None) => match config.read().await.get(&name) {
            Some(value) => RespValue::array(vec![
                RespValue::bulk_string(name.into_bytes()),
                RespValue::bulk_string(value.into_bytes()),
            ]),
            None => RespValue::empty_array(),
        },
        (Some("SET"), Some(name), Some(value)) => {
            let mut config = config.write().await;
            match config.set(&name, &value) {
                Ok(()) => {
                    if name.eq_ignore_ascii_case("appendfsync") {
                        engine.set_fsync_policy(config.appendfsync).await;
                    }
                    RespValue::ok()
                }
                Err(e) => RespValue::error(format!("ERR {e}")),
            }
        }
        _ => RespValue::error("ERR wrong number of arguments for 'config' command"),
    }
}

async fn write_reply(stdout: &mut tokio::io::Stdout, reply: &RespValue) -> std::io::Result<()> {
    stdout.write_all(&reply.serialize()).await?;
    stdout.flush().await
}

/// Background task that flushes the log every second (for everysec policy).
async fn aof_fsync_loop(engine: Arc<Engine>, config: SharedConfig) {
    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        if config.read().await.appendfsync != FsyncPolicy::Everysec {
            continue;
        }
        if let Err(e) = engine.flush_log().await {
            warn!(error = %e, "append only file fsync failed");
        }
    }
}
