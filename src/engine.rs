use crate::command::{CmdLine, CommandDescriptor, CommandTableEntry, Registry, arg_to_string};
use crate::error::{EngineError, EngineResult};
use crate::persistence::aof::{DurabilitySink, FsyncPolicy};
use crate::resp::RespValue;
use crate::store::{Keyspace, SharedKeyspace};
use crate::transaction::locks::{KeyLocks, LockPlan};
use crate::transaction::undo::UndoLog;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// Every command ran and the log accepted the batch.
    Committed,
    /// A command failed; all earlier commands were undone.
    RolledBack,
    /// Nothing ran: a command could not be resolved or writes are refused.
    Rejected,
    /// Applied in memory but the log append failed. Writes are now refused.
    NotDurable,
}

#[derive(Debug)]
pub struct TxOutcome {
    /// One reply per executed command. On rollback the last one is the error.
    pub replies: Vec<RespValue>,
    pub status: TxStatus,
    pub error: Option<EngineError>,
}

impl TxOutcome {
    fn rejected(err: EngineError) -> Self {
        TxOutcome {
            replies: Vec::new(),
            status: TxStatus::Rejected,
            error: Some(err),
        }
    }

    pub fn committed(&self) -> bool {
        self.status == TxStatus::Committed
    }
}

/// Transactional execution core: key locks, undo on failure, and handoff of
/// canonical writes to the durability sink.
pub struct Engine {
    registry: Arc<Registry>,
    keyspace: SharedKeyspace,
    locks: KeyLocks,
    sink: Mutex<Box<dyn DurabilitySink>>,
    /// Shared by transactions from first apply until rollback or log
    /// append; held exclusively while the log is rewritten from a snapshot.
    commit_gate: RwLock<()>,
    halted: AtomicBool,
}

impl Engine {
    pub fn new(sink: Box<dyn DurabilitySink>) -> EngineResult<Self> {
        Ok(Self::with_registry(Registry::with_builtin_commands()?, sink))
    }

    pub fn with_registry(registry: Registry, sink: Box<dyn DurabilitySink>) -> Self {
        Engine {
            registry: Arc::new(registry),
            keyspace: Arc::new(RwLock::new(Keyspace::new())),
            locks: KeyLocks::new(),
            sink: Mutex::new(sink),
            commit_gate: RwLock::new(()),
            halted: AtomicBool::new(false),
        }
    }

    pub fn keyspace(&self) -> SharedKeyspace {
        self.keyspace.clone()
    }

    pub fn command_table(&self) -> Vec<CommandTableEntry> {
        self.registry.command_table()
    }

    /// Run one command as a transaction of its own and return its reply.
    pub async fn execute(&self, cmd: CmdLine) -> RespValue {
        let outcome = self.run_transaction(vec![cmd]).await;
        match (outcome.status, outcome.error) {
            (TxStatus::Rejected | TxStatus::NotDurable, Some(e)) => e.to_resp_error(),
            (_, _) => outcome
                .replies
                .into_iter()
                .last()
                .unwrap_or_else(RespValue::null_bulk_string),
        }
    }

    /// Run `cmds` atomically.
    ///
    /// Keys are locked up front in sorted order and held until the batch is
    /// either rolled back or handed to the sink, so no other transaction sees
    /// a partial state.
    pub async fn run_transaction(&self, cmds: Vec<CmdLine>) -> TxOutcome {
        let mut plan = LockPlan::new();
        let mut descriptors: Vec<&CommandDescriptor> = Vec::with_capacity(cmds.len());
        for cmd in &cmds {
            match self.registry.resolve(cmd) {
                Ok(descriptor) => {
                    for key in descriptor.keys.extract(cmd.args()) {
                        plan.add(key, descriptor.mode);
                    }
                    descriptors.push(descriptor);
                }
                Err(e) => return TxOutcome::rejected(e),
            }
        }
        if self.is_halted() && descriptors.iter().any(|d| d.is_write()) {
            return TxOutcome::rejected(EngineError::WritesRefused);
        }

        debug!(commands = cmds.len(), keys = plan.len(), "acquiring key locks");
        let _locks = self.locks.acquire(&plan).await;
        let _gate = self.commit_gate.read().await;

        let mut undo = UndoLog::new();
        let mut replies = Vec::with_capacity(cmds.len());
        let mut pending = Vec::new();
        let mut failure = None;
        for (cmd, descriptor) in cmds.iter().zip(&descriptors) {
            let mut db = self.keyspace.write().await;
            if let Some(touches) = descriptor.undo {
                undo.record(&db, &touches(cmd.args()));
            }
            match self.registry.apply(&mut db, cmd) {
                Ok(applied) => {
                    replies.push(applied.reply);
                    pending.extend(applied.propagate);
                }
                Err(e) => {
                    replies.push(e.to_resp_error());
                    failure = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = failure {
            let undone = undo.len();
            let mut db = self.keyspace.write().await;
            let failed = undo.rollback(&self.registry, &mut db);
            warn!(
                error = %e,
                command = %arg_to_string(cmds[replies.len() - 1].name()),
                undone,
                failed,
                "transaction rolled back"
            );
            return TxOutcome {
                replies,
                status: TxStatus::RolledBack,
                error: Some(e),
            };
        }

        if !pending.is_empty() {
            let mut sink = self.sink.lock().await;
            if let Err(e) = sink.append(&pending) {
                self.halted.store(true, Ordering::SeqCst);
                error!(error = %e, entries = pending.len(), "durability sink rejected committed writes; refusing further writes");
                return TxOutcome {
                    replies,
                    status: TxStatus::NotDurable,
                    error: Some(EngineError::Durability(e)),
                };
            }
        }

        TxOutcome {
            replies,
            status: TxStatus::Committed,
            error: None,
        }
    }

    /// Replay log entries into the keyspace. Entries are applied without undo
    /// and are not logged again. Returns how many applied cleanly.
    pub async fn recover(&self, entries: Vec<CmdLine>) -> usize {
        let mut db = self.keyspace.write().await;
        let total = entries.len();
        let mut applied = 0;
        for entry in &entries {
            match self.registry.apply(&mut db, entry) {
                Ok(_) => applied += 1,
                Err(e) => warn!(error = %e, command = %arg_to_string(entry.name()), "skipping log entry during recovery"),
            }
        }
        info!(applied, total, keys = db.len(), "log replayed");
        applied
    }

    /// Replace the log with the commands that rebuild the current keyspace.
    ///
    /// Waits until no transaction is between its first apply and its log
    /// append or rollback, so the snapshot never holds uncommitted writes.
    pub async fn rewrite_log(&self) -> EngineResult<usize> {
        let _gate = self.commit_gate.write().await;
        let mut sink = self.sink.lock().await;
        let entries = {
            let db = self.keyspace.read().await;
            let mut keys: Vec<_> = db.iter().collect();
            keys.sort_by(|a, b| a.0.cmp(b.0));
            keys.into_iter()
                .flat_map(|(key, entity)| entity.restore_commands(key))
                .collect::<Vec<_>>()
        };
        let count = entries.len();
        sink.rewrite(entries)?;
        Ok(count)
    }

    /// Apply a runtime `appendfsync` change to the open sink.
    pub async fn set_fsync_policy(&self, policy: FsyncPolicy) {
        self.sink.lock().await.set_fsync_policy(policy);
    }

    pub async fn flush_log(&self) -> EngineResult<()> {
        let mut sink = self.sink.lock().await;
        sink.flush()?;
        Ok(())
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Accept writes again after an operator has dealt with a sink failure.
    pub fn resume_writes(&self) {
        if self.halted.swap(false, Ordering::SeqCst) {
            info!("writes resumed");
        }
    }
}
