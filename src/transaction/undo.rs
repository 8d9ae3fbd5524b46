use crate::command::{CmdLine, Registry, arg_to_string};
use crate::store::Keyspace;
use crate::types::Entity;
use tracing::warn;

/// Part of the keyspace a write command is about to change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Touch {
    /// Individual fields of a hash.
    Fields { key: String, fields: Vec<String> },
    /// The whole entity under a key.
    Key(String),
}

/// Undo for commands whose first argument is the only key they write.
pub fn first_key(args: &[Vec<u8>]) -> Vec<Touch> {
    args.first()
        .map(|k| Touch::Key(arg_to_string(k)))
        .into_iter()
        .collect()
}

/// Undo for commands where every argument is a key.
pub fn all_keys(args: &[Vec<u8>]) -> Vec<Touch> {
    args.iter().map(|k| Touch::Key(arg_to_string(k))).collect()
}

/// Commands that restore what `touch` names to its current state.
///
/// Absent fields and keys are restored by deleting them, so the result holds
/// even when later commands of the same transaction touch them again.
pub fn snapshot(db: &Keyspace, touch: &Touch) -> Vec<CmdLine> {
    match touch {
        Touch::Key(key) => whole_key(db, key),
        Touch::Fields { key, fields } => match db.get_entity(key) {
            None => {
                let mut del = CmdLine::new("HDEL").arg(key);
                for field in unique(fields) {
                    del.push(field);
                }
                vec![del]
            }
            Some(Entity::Hash(hash)) => {
                let mut cmds = Vec::new();
                let mut del = CmdLine::new("HDEL").arg(key);
                for field in unique(fields) {
                    match hash.get(field) {
                        Some(value) => {
                            cmds.push(CmdLine::new("HSET").arg(key).arg(field).arg(value))
                        }
                        None => del.push(field),
                    }
                }
                if del.len() > 2 {
                    cmds.push(del);
                }
                cmds
            }
            // The command will fail with WRONGTYPE; keep the entity as it is.
            Some(_) => whole_key(db, key),
        },
    }
}

fn whole_key(db: &Keyspace, key: &str) -> Vec<CmdLine> {
    let mut cmds = vec![CmdLine::new("DEL").arg(key)];
    if let Some(entity) = db.get_entity(key) {
        cmds.extend(entity.restore_commands(key));
    }
    cmds
}

fn unique(fields: &[String]) -> impl Iterator<Item = &String> {
    fields
        .iter()
        .enumerate()
        .filter(|&(i, f)| !fields[..i].contains(f))
        .map(|(_, f)| f)
}

/// Reversal commands of one transaction, one group per executed command.
#[derive(Debug, Default)]
pub struct UndoLog {
    groups: Vec<Vec<CmdLine>>,
}

impl UndoLog {
    pub fn new() -> Self {
        UndoLog { groups: Vec::new() }
    }

    /// Capture the current state of everything in `touches`. Must run before
    /// the command that changes it.
    pub fn record(&mut self, db: &Keyspace, touches: &[Touch]) {
        let group = touches.iter().flat_map(|t| snapshot(db, t)).collect();
        self.groups.push(group);
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replay the groups newest first. Returns how many undo commands failed,
    /// which is 0 unless the keyspace was changed behind the transaction.
    pub fn rollback(self, registry: &Registry, db: &mut Keyspace) -> usize {
        let mut failures = 0;
        for group in self.groups.into_iter().rev() {
            for cmd in group {
                if let Err(e) = registry.apply(db, &cmd) {
                    warn!(error = %e, command = %arg_to_string(cmd.name()), "undo command failed");
                    failures += 1;
                }
            }
        }
        failures
    }
}
