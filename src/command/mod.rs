pub mod hash;
pub mod key;
pub mod set;
pub mod string;

use crate::error::{EngineError, EngineResult};
use crate::resp::{RespError, RespValue, split_inline, write_command};
use crate::store::Keyspace;
use crate::transaction::undo::Touch;
use std::collections::HashMap;
use tracing::debug;

/// One command invocation: name followed by its arguments.
///
/// Used for client commands, undo entries and log entries alike, so it must
/// be re-executable on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdLine {
    parts: Vec<Vec<u8>>,
}

impl CmdLine {
    pub fn new(name: &str) -> Self {
        CmdLine {
            parts: vec![name.as_bytes().to_vec()],
        }
    }

    pub fn from_parts(parts: Vec<Vec<u8>>) -> Self {
        CmdLine { parts }
    }

    /// Parse a whitespace-separated command line, e.g. `HSET k f "a b"`.
    pub fn from_inline(line: &str) -> Result<Self, RespError> {
        split_inline(line).map(CmdLine::from_parts)
    }

    pub fn arg(mut self, part: impl AsRef<[u8]>) -> Self {
        self.push(part);
        self
    }

    pub fn push(&mut self, part: impl AsRef<[u8]>) {
        self.parts.push(part.as_ref().to_vec());
    }

    pub fn name(&self) -> &[u8] {
        self.parts.first().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn args(&self) -> &[Vec<u8>] {
        self.parts.get(1..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Append the RESP array encoding of this command to `buf`.
    pub fn write_resp(&self, buf: &mut Vec<u8>) {
        write_command(buf, self.parts.iter().map(Vec::as_slice));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessMode {
    ReadOnly,
    Write,
}

impl AccessMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessMode::ReadOnly => "readonly",
            AccessMode::Write => "write",
        }
    }
}

/// Which arguments (after the command name) are keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySpec {
    First,
    All,
}

impl KeySpec {
    pub fn extract(self, args: &[Vec<u8>]) -> Vec<String> {
        match self {
            KeySpec::First => args.first().map(Vec::as_slice).map(arg_to_string).into_iter().collect(),
            KeySpec::All => args.iter().map(Vec::as_slice).map(arg_to_string).collect(),
        }
    }
}

pub type ExecFn = fn(&mut CommandCtx<'_>, &[Vec<u8>]) -> EngineResult<RespValue>;

/// Names what a write is about to change so its prior state can be captured.
pub type UndoFn = fn(&[Vec<u8>]) -> Vec<Touch>;

/// One command table entry.
#[derive(Debug, Clone)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub exec: ExecFn,
    pub keys: KeySpec,
    pub undo: Option<UndoFn>,
    /// Redis convention: `n` means exactly `n` parts including the name,
    /// `-n` means at least `n`.
    pub arity: i32,
    pub mode: AccessMode,
}

impl CommandDescriptor {
    pub fn read(name: &'static str, exec: ExecFn, arity: i32) -> Self {
        CommandDescriptor {
            name,
            exec,
            keys: KeySpec::First,
            undo: None,
            arity,
            mode: AccessMode::ReadOnly,
        }
    }

    pub fn write(name: &'static str, exec: ExecFn, arity: i32, undo: UndoFn) -> Self {
        CommandDescriptor {
            name,
            exec,
            keys: KeySpec::First,
            undo: Some(undo),
            arity,
            mode: AccessMode::Write,
        }
    }

    pub fn with_keys(mut self, keys: KeySpec) -> Self {
        self.keys = keys;
        self
    }

    pub fn arity_ok(&self, parts: usize) -> bool {
        if self.arity >= 0 {
            parts == self.arity as usize
        } else {
            parts >= self.arity.unsigned_abs() as usize
        }
    }

    pub fn is_write(&self) -> bool {
        self.mode == AccessMode::Write
    }
}

/// `(name, arity, access-mode)` as exposed to request validators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTableEntry {
    pub name: &'static str,
    pub arity: i32,
    pub mode: AccessMode,
}

/// Execution context handed to executors.
pub struct CommandCtx<'a> {
    pub db: &'a mut Keyspace,
    propagate: Option<Vec<CmdLine>>,
}

impl<'a> CommandCtx<'a> {
    pub fn new(db: &'a mut Keyspace) -> Self {
        CommandCtx {
            db,
            propagate: None,
        }
    }

    /// Log `cmds` in place of the command as received. An empty list logs nothing.
    pub fn propagate(&mut self, cmds: Vec<CmdLine>) {
        self.propagate = Some(cmds);
    }
}

/// Result of a successfully executed command.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub reply: RespValue,
    /// Canonical commands for the durability log; empty for reads.
    pub propagate: Vec<CmdLine>,
}

/// Command table built once at startup from the per-family registrations.
#[derive(Debug, Default)]
pub struct Registry {
    commands: HashMap<String, CommandDescriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            commands: HashMap::new(),
        }
    }

    /// Registry holding every command family this crate ships.
    pub fn with_builtin_commands() -> EngineResult<Self> {
        let mut registry = Registry::new();
        key::register(&mut registry)?;
        string::register(&mut registry)?;
        hash::register(&mut registry)?;
        set::register(&mut registry)?;
        debug!(commands = registry.len(), "command registry built");
        Ok(registry)
    }

    /// Add a command. A name already present is a configuration error.
    pub fn register(&mut self, descriptor: CommandDescriptor) -> EngineResult<()> {
        let name = descriptor.name.to_ascii_uppercase();
        if self.commands.contains_key(&name) {
            return Err(EngineError::DuplicateCommand(name));
        }
        self.commands.insert(name, descriptor);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Case-insensitive lookup.
    pub fn lookup(&self, name: &[u8]) -> Option<&CommandDescriptor> {
        let name = String::from_utf8_lossy(name).to_ascii_uppercase();
        self.commands.get(&name)
    }

    /// Find the descriptor for `cmd` and check its arity; no state is touched.
    pub fn resolve(&self, cmd: &CmdLine) -> EngineResult<&CommandDescriptor> {
        let descriptor = self.lookup(cmd.name()).ok_or_else(|| unknown_command(cmd))?;
        if !descriptor.arity_ok(cmd.len()) {
            return Err(EngineError::WrongArgCount(
                descriptor.name.to_ascii_lowercase(),
            ));
        }
        Ok(descriptor)
    }

    /// Run `cmd` against `db`, returning its reply and the canonical commands
    /// to log if it was a write.
    pub fn apply(&self, db: &mut Keyspace, cmd: &CmdLine) -> EngineResult<Applied> {
        let descriptor = self.resolve(cmd)?;
        let mut ctx = CommandCtx::new(db);
        let reply = (descriptor.exec)(&mut ctx, cmd.args())?;
        let propagate = if descriptor.is_write() {
            ctx.propagate.unwrap_or_else(|| vec![cmd.clone()])
        } else {
            Vec::new()
        };
        Ok(Applied { reply, propagate })
    }

    /// Run `cmd` and turn any failure into an error reply.
    ///
    /// This does not log or take key locks; the engine does both around it.
    pub fn dispatch(&self, db: &mut Keyspace, cmd: &CmdLine) -> RespValue {
        match self.apply(db, cmd) {
            Ok(applied) => applied.reply,
            Err(e) => e.to_resp_error(),
        }
    }

    pub fn command_table(&self) -> Vec<CommandTableEntry> {
        let mut table: Vec<CommandTableEntry> = self
            .commands
            .values()
            .map(|d| CommandTableEntry {
                name: d.name,
                arity: d.arity,
                mode: d.mode,
            })
            .collect();
        table.sort_by_key(|entry| entry.name);
        table
    }
}

fn unknown_command(cmd: &CmdLine) -> EngineError {
    let args_preview: Vec<String> = cmd
        .args()
        .iter()
        .take(3)
        .map(|a| format!("'{}'", arg_to_string(a)))
        .collect();
    EngineError::UnknownCommand(arg_to_string(cmd.name()), args_preview.join(" "))
}

/// Extract a UTF-8 string from an argument.
pub fn arg_to_string(arg: &[u8]) -> String {
    String::from_utf8_lossy(arg).into_owned()
}

pub fn parse_i64(arg: &[u8]) -> EngineResult<i64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(EngineError::NotInteger)
}

/// Parse a float argument; `inf`/`-inf` are accepted, NaN is not.
pub fn parse_f64(arg: &[u8]) -> EngineResult<f64> {
    let s = std::str::from_utf8(arg).map_err(|_| EngineError::NotFloat)?;
    let v = s.trim().parse::<f64>().map_err(|_| EngineError::NotFloat)?;
    if v.is_nan() || s.trim().is_empty() {
        return Err(EngineError::NotFloat);
    }
    if v.is_infinite() {
        let lower = s.trim().to_ascii_lowercase();
        if !matches!(lower.trim_start_matches(['+', '-']), "inf" | "infinity") {
            return Err(EngineError::NotFloat);
        }
    }
    Ok(v)
}

/// `field value [field value ...]` pairs; an odd count is an arity error.
pub fn field_value_pairs<'a>(
    cmd: &str,
    args: &'a [Vec<u8>],
) -> EngineResult<Vec<(String, &'a [u8])>> {
    if args.is_empty() || args.len() % 2 != 0 {
        return Err(EngineError::WrongArgCount(cmd.to_string()));
    }
    Ok(args
        .chunks(2)
        .map(|pair| (arg_to_string(&pair[0]), pair[1].as_slice()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_ctx: &mut CommandCtx<'_>, _args: &[Vec<u8>]) -> EngineResult<RespValue> {
        Ok(RespValue::ok())
    }

    #[test]
    fn test_arity_rules() {
        let exact = CommandDescriptor::read("X", noop, 3);
        assert!(exact.arity_ok(3));
        assert!(!exact.arity_ok(2));
        assert!(!exact.arity_ok(4));

        let at_least = CommandDescriptor::read("Y", noop, -3);
        assert!(!at_least.arity_ok(2));
        assert!(at_least.arity_ok(3));
        assert!(at_least.arity_ok(7));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = Registry::new();
        registry.register(CommandDescriptor::read("hget", noop, 3)).unwrap();
        let err = registry
            .register(CommandDescriptor::read("HGet", noop, -3))
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateCommand(name) if name == "HGET"));
    }

    #[test]
    fn test_builtin_registry_has_no_duplicates() {
        let registry = Registry::with_builtin_commands().unwrap();
        assert!(registry.lookup(b"hget").is_some());
        assert_eq!(registry.lookup(b"HGET").map(|d| d.arity), Some(3));
    }

    #[test]
    fn test_resolve_unknown_and_arity() {
        let registry = Registry::with_builtin_commands().unwrap();
        let unknown = CmdLine::from_inline("NOPE a b").unwrap();
        assert!(matches!(
            registry.resolve(&unknown),
            Err(EngineError::UnknownCommand(name, preview)) if name == "NOPE" && preview == "'a' 'b'"
        ));

        let short = CmdLine::from_inline("hget k").unwrap();
        let err = registry.resolve(&short).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ERR wrong number of arguments for 'hget' command"
        );
    }

    #[test]
    fn test_dispatch_is_case_insensitive() {
        let registry = Registry::with_builtin_commands().unwrap();
        let mut db = Keyspace::new();
        let reply = registry.dispatch(&mut db, &CmdLine::from_inline("hSeT k f v").unwrap());
        assert_eq!(reply, RespValue::integer(1));
        let reply = registry.dispatch(&mut db, &CmdLine::from_inline("HGET k f").unwrap());
        assert_eq!(reply, RespValue::bulk_string(b"v".to_vec()));
    }

    #[test]
    fn test_reads_propagate_nothing() {
        let registry = Registry::with_builtin_commands().unwrap();
        let mut db = Keyspace::new();
        let applied = registry
            .apply(&mut db, &CmdLine::from_inline("HLEN k").unwrap())
            .unwrap();
        assert!(applied.propagate.is_empty());
    }

    #[test]
    fn test_command_table_sorted() {
        let registry = Registry::with_builtin_commands().unwrap();
        let table = registry.command_table();
        assert_eq!(table.len(), registry.len());
        assert!(table.windows(2).all(|w| w[0].name <= w[1].name));
        let hset = table.iter().find(|e| e.name == "HSET").unwrap();
        assert_eq!((hset.arity, hset.mode), (-4, AccessMode::Write));
    }

    #[test]
    fn test_parse_f64() {
        assert_eq!(parse_f64(b"1.5").unwrap(), 1.5);
        assert!(parse_f64(b"inf").unwrap().is_infinite());
        assert!(parse_f64(b"nan").is_err());
        assert!(parse_f64(b"1e400").is_err());
        assert!(parse_f64(b"abc").is_err());
    }

    #[test]
    fn test_cmdline_accessors() {
        let cmd = CmdLine::new("HSET").arg("k").arg(b"f").arg(vec![1u8, 2]);
        assert_eq!(cmd.name(), b"HSET");
        assert_eq!(cmd.args().len(), 3);
        assert_eq!(cmd.len(), 4);
        assert!(CmdLine::from_parts(Vec::new()).args().is_empty());
    }
}
