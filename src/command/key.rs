use crate::command::{CmdLine, CommandCtx, CommandDescriptor, KeySpec, Registry, arg_to_string};
use crate::error::EngineResult;
use crate::resp::RespValue;
use crate::transaction::undo::all_keys;

pub fn register(registry: &mut Registry) -> EngineResult<()> {
    registry.register(CommandDescriptor::write("DEL", cmd_del, -2, all_keys).with_keys(KeySpec::All))?;
    registry.register(CommandDescriptor::read("EXISTS", cmd_exists, -2).with_keys(KeySpec::All))?;
    registry.register(CommandDescriptor::read("TYPE", cmd_type, 2))?;
    Ok(())
}

/// Logs only the keys that were actually present.
pub fn cmd_del(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let mut canonical = CmdLine::new("DEL");
    for key in args {
        if ctx.db.remove(&arg_to_string(key)) {
            canonical.push(key);
        }
    }
    let deleted = canonical.args().len();
    ctx.propagate(if deleted > 0 { vec![canonical] } else { Vec::new() });
    Ok(RespValue::integer(deleted as i64))
}

/// Counts repeated keys once per occurrence.
pub fn cmd_exists(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let count = args
        .iter()
        .filter(|key| ctx.db.exists(&arg_to_string(key)))
        .count();
    Ok(RespValue::integer(count as i64))
}

pub fn cmd_type(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let name = ctx
        .db
        .get_entity(&key)
        .map_or("none", |entity| entity.kind().name());
    Ok(RespValue::SimpleString(name.to_string()))
}
