use crate::command::{CmdLine, CommandCtx, CommandDescriptor, Registry, arg_to_string, parse_i64};
use crate::error::{EngineError, EngineResult};
use crate::resp::RespValue;
use crate::transaction::undo::first_key;
use crate::types::Entity;
use crate::types::rstring::RedisString;

pub fn register(registry: &mut Registry) -> EngineResult<()> {
    registry.register(CommandDescriptor::write("SET", cmd_set, 3, first_key))?;
    registry.register(CommandDescriptor::read("GET", cmd_get, 2))?;
    registry.register(CommandDescriptor::write("SETNX", cmd_setnx, 3, first_key))?;
    registry.register(CommandDescriptor::write("INCR", cmd_incr, 2, first_key))?;
    registry.register(CommandDescriptor::write("DECR", cmd_decr, 2, first_key))?;
    registry.register(CommandDescriptor::write("INCRBY", cmd_incrby, 3, first_key))?;
    registry.register(CommandDescriptor::write("APPEND", cmd_append, 3, first_key))?;
    registry.register(CommandDescriptor::read("STRLEN", cmd_strlen, 2))?;
    Ok(())
}

/// Overwrites whatever the key held, whatever its type.
pub fn cmd_set(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let key = arg_to_string(&args[0]);
    ctx.db
        .put_entity(key, Entity::String(RedisString::new(args[1].clone())));
    Ok(RespValue::ok())
}

pub fn cmd_get(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let value = ctx
        .db
        .get_as::<RedisString>(&key)?
        .map(|s| s.as_bytes().to_vec());
    Ok(RespValue::BulkString(value))
}

pub fn cmd_setnx(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let key = arg_to_string(&args[0]);
    if ctx.db.exists(&key) {
        ctx.propagate(Vec::new());
        return Ok(RespValue::integer(0));
    }
    ctx.db
        .put_entity(key, Entity::String(RedisString::new(args[1].clone())));
    ctx.propagate(vec![CmdLine::new("SET").arg(&args[0]).arg(&args[1])]);
    Ok(RespValue::integer(1))
}

fn incr_by(ctx: &mut CommandCtx<'_>, raw_key: &[u8], delta: i64) -> EngineResult<RespValue> {
    let key = arg_to_string(raw_key);
    let current = match ctx.db.get_as::<RedisString>(&key)? {
        Some(s) => s.as_i64().ok_or(EngineError::NotInteger)?,
        None => 0,
    };
    let new_val = current.checked_add(delta).ok_or(EngineError::Overflow)?;
    let text = new_val.to_string();
    ctx.propagate(vec![CmdLine::new("SET").arg(raw_key).arg(&text)]);
    ctx.db
        .put_entity(key, Entity::String(RedisString::new(text.into_bytes())));
    Ok(RespValue::integer(new_val))
}

pub fn cmd_incr(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    incr_by(ctx, &args[0], 1)
}

pub fn cmd_decr(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    incr_by(ctx, &args[0], -1)
}

pub fn cmd_incrby(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let delta = parse_i64(&args[1])?;
    incr_by(ctx, &args[0], delta)
}

pub fn cmd_append(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let (s, _) = ctx.db.get_or_init::<RedisString>(&key)?;
    let len = s.append(&args[1]);
    let canonical = CmdLine::new("SET").arg(&args[0]).arg(s.as_bytes());
    ctx.propagate(vec![canonical]);
    Ok(RespValue::integer(len as i64))
}

pub fn cmd_strlen(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let len = ctx.db.get_as::<RedisString>(&key)?.map_or(0, RedisString::len);
    Ok(RespValue::integer(len as i64))
}
