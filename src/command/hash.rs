use crate::command::{
    CmdLine, CommandCtx, CommandDescriptor, Registry, arg_to_string, field_value_pairs, parse_f64,
    parse_i64,
};
use crate::error::{EngineError, EngineResult};
use crate::resp::RespValue;
use crate::transaction::undo::Touch;
use crate::types::hash::RedisHash;

pub fn register(registry: &mut Registry) -> EngineResult<()> {
    registry.register(CommandDescriptor::write("HSET", cmd_hset, -4, touch_pairs))?;
    registry.register(CommandDescriptor::write("HSETNX", cmd_hsetnx, 4, touch_field))?;
    registry.register(CommandDescriptor::read("HGET", cmd_hget, 3))?;
    registry.register(CommandDescriptor::read("HEXISTS", cmd_hexists, 3))?;
    registry.register(CommandDescriptor::write("HDEL", cmd_hdel, -3, touch_fields))?;
    registry.register(CommandDescriptor::read("HLEN", cmd_hlen, 2))?;
    registry.register(CommandDescriptor::read("HSTRLEN", cmd_hstrlen, 3))?;
    registry.register(CommandDescriptor::write("HMSET", cmd_hmset, -4, touch_pairs))?;
    registry.register(CommandDescriptor::read("HMGET", cmd_hmget, -3))?;
    registry.register(CommandDescriptor::read("HKEYS", cmd_hkeys, 2))?;
    registry.register(CommandDescriptor::read("HVALS", cmd_hvals, 2))?;
    registry.register(CommandDescriptor::read("HGETALL", cmd_hgetall, 2))?;
    registry.register(CommandDescriptor::write("HINCRBY", cmd_hincrby, 4, touch_field))?;
    registry.register(CommandDescriptor::write(
        "HINCRBYFLOAT",
        cmd_hincrbyfloat,
        4,
        touch_field,
    ))?;
    registry.register(CommandDescriptor::read("HRANDFIELD", cmd_hrandfield, -2))?;
    Ok(())
}

/// `key field value [field value ...]`
fn touch_pairs(args: &[Vec<u8>]) -> Vec<Touch> {
    vec![Touch::Fields {
        key: arg_to_string(&args[0]),
        fields: args[1..].iter().step_by(2).map(Vec::as_slice).map(arg_to_string).collect(),
    }]
}

/// `key field ...`
fn touch_field(args: &[Vec<u8>]) -> Vec<Touch> {
    vec![Touch::Fields {
        key: arg_to_string(&args[0]),
        fields: vec![arg_to_string(&args[1])],
    }]
}

/// `key field [field ...]`
fn touch_fields(args: &[Vec<u8>]) -> Vec<Touch> {
    vec![Touch::Fields {
        key: arg_to_string(&args[0]),
        fields: args[1..].iter().map(Vec::as_slice).map(arg_to_string).collect(),
    }]
}

fn set_pairs(ctx: &mut CommandCtx<'_>, cmd: &str, args: &[Vec<u8>]) -> EngineResult<i64> {
    let key = arg_to_string(&args[0]);
    let pairs = field_value_pairs(cmd, &args[1..])?;
    let (hash, _) = ctx.db.get_or_init::<RedisHash>(&key)?;
    let mut created = 0i64;
    for (field, value) in pairs {
        if hash.put(field, value.to_vec()) {
            created += 1;
        }
    }
    Ok(created)
}

pub fn cmd_hset(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    set_pairs(ctx, "hset", args).map(RespValue::integer)
}

pub fn cmd_hmset(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    set_pairs(ctx, "hmset", args)?;
    let mut canonical = CmdLine::new("HSET");
    for arg in args {
        canonical.push(arg);
    }
    ctx.propagate(vec![canonical]);
    Ok(RespValue::ok())
}

pub fn cmd_hsetnx(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let field = arg_to_string(&args[1]);
    let (hash, _) = ctx.db.get_or_init::<RedisHash>(&key)?;
    if hash.put_if_absent(field, args[2].clone()) {
        ctx.propagate(vec![
            CmdLine::new("HSET").arg(&args[0]).arg(&args[1]).arg(&args[2]),
        ]);
        Ok(RespValue::integer(1))
    } else {
        ctx.propagate(Vec::new());
        Ok(RespValue::integer(0))
    }
}

pub fn cmd_hget(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let field = arg_to_string(&args[1]);
    let value = ctx
        .db
        .get_as::<RedisHash>(&key)?
        .and_then(|h| h.get(&field).cloned());
    Ok(RespValue::BulkString(value))
}

pub fn cmd_hexists(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let field = arg_to_string(&args[1]);
    let exists = ctx
        .db
        .get_as::<RedisHash>(&key)?
        .is_some_and(|h| h.contains(&field));
    Ok(RespValue::integer(exists as i64))
}

pub fn cmd_hdel(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let Some(hash) = ctx.db.get_as_mut::<RedisHash>(&key)? else {
        ctx.propagate(Vec::new());
        return Ok(RespValue::integer(0));
    };
    let mut deleted = 0i64;
    for field in &args[1..] {
        if hash.remove(&arg_to_string(field)) {
            deleted += 1;
        }
    }
    ctx.db.remove_if_vacant::<RedisHash>(&key);
    if deleted == 0 {
        ctx.propagate(Vec::new());
    }
    Ok(RespValue::integer(deleted))
}

pub fn cmd_hlen(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let len = ctx.db.get_as::<RedisHash>(&key)?.map_or(0, RedisHash::len);
    Ok(RespValue::integer(len as i64))
}

pub fn cmd_hstrlen(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let field = arg_to_string(&args[1]);
    let len = ctx
        .db
        .get_as::<RedisHash>(&key)?
        .map_or(0, |h| h.value_len(&field));
    Ok(RespValue::integer(len as i64))
}

pub fn cmd_hmget(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let hash = ctx.db.get_as::<RedisHash>(&key)?;
    let values = args[1..]
        .iter()
        .map(|field| hash.and_then(|h| h.get(&arg_to_string(field)).cloned()));
    Ok(RespValue::optional_bulks(values))
}

pub fn cmd_hkeys(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let mut fields = Vec::new();
    if let Some(hash) = ctx.db.get_as::<RedisHash>(&key)? {
        fields.reserve(hash.len());
        hash.for_each(|field, _| {
            fields.push(RespValue::bulk_string(field.as_bytes()));
            true
        });
    }
    Ok(RespValue::array(fields))
}

pub fn cmd_hvals(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let mut values = Vec::new();
    if let Some(hash) = ctx.db.get_as::<RedisHash>(&key)? {
        hash.for_each(|_, value| {
            values.push(RespValue::bulk_string(value));
            true
        });
    }
    Ok(RespValue::array(values))
}

pub fn cmd_hgetall(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let mut result = Vec::new();
    if let Some(hash) = ctx.db.get_as::<RedisHash>(&key)? {
        hash.for_each(|field, value| {
            result.push(RespValue::bulk_string(field.as_bytes()));
            result.push(RespValue::bulk_string(value));
            true
        });
    }
    Ok(RespValue::array(result))
}

pub fn cmd_hincrby(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let field = arg_to_string(&args[1]);
    let delta = parse_i64(&args[2])?;

    let (hash, created) = ctx.db.get_or_init::<RedisHash>(&key)?;
    match hash.incr_by(&field, delta) {
        Ok(n) => {
            ctx.propagate(vec![
                CmdLine::new("HSET").arg(&key).arg(&field).arg(n.to_string()),
            ]);
            Ok(RespValue::bulk_string(n.to_string().into_bytes()))
        }
        Err(e) => {
            if created {
                ctx.db.remove_if_vacant::<RedisHash>(&key);
            }
            Err(e)
        }
    }
}

pub fn cmd_hincrbyfloat(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let field = arg_to_string(&args[1]);
    parse_f64(&args[2])?;
    let delta = std::str::from_utf8(&args[2]).map_err(|_| EngineError::NotFloat)?;

    let (hash, created) = ctx.db.get_or_init::<RedisHash>(&key)?;
    match hash.incr_by_float(&field, delta) {
        Ok(text) => {
            ctx.propagate(vec![
                CmdLine::new("HSET").arg(&key).arg(&field).arg(&text),
            ]);
            Ok(RespValue::bulk_string(text.into_bytes()))
        }
        Err(e) => {
            if created {
                ctx.db.remove_if_vacant::<RedisHash>(&key);
            }
            Err(e)
        }
    }
}

/// Largest negative HRANDFIELD count accepted. Replies are built in memory,
/// so this sits far below the `i64::MAX / 2` range check Redis applies.
const MAX_RANDFIELD_REPEATS: u64 = 1 << 24;

/// `HRANDFIELD key [count [WITHVALUES]]`
pub fn cmd_hrandfield(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    if args.len() > 3 {
        return Err(EngineError::WrongArgCount("hrandfield".into()));
    }
    let count = args.get(1).map(Vec::as_slice).map(parse_i64).transpose()?;
    if let Some(c) = count
        && c < 0
        && c.unsigned_abs() > MAX_RANDFIELD_REPEATS
    {
        return Err(EngineError::Generic("value is out of range".into()));
    }
    let with_values = match args.get(2) {
        None => false,
        Some(opt) if opt.eq_ignore_ascii_case(b"withvalues") => true,
        Some(_) => return Err(EngineError::SyntaxError),
    };

    let key = arg_to_string(&args[0]);
    let Some(hash) = ctx.db.get_as::<RedisHash>(&key)? else {
        return Ok(match count {
            None => RespValue::null_bulk_string(),
            Some(_) => RespValue::empty_array(),
        });
    };

    let Some(count) = count else {
        let field = hash.random_distinct_fields(1).pop();
        return Ok(RespValue::BulkString(field.map(String::into_bytes)));
    };
    let fields = if count >= 0 {
        hash.random_distinct_fields(usize::try_from(count).unwrap_or(usize::MAX))
    } else {
        hash.random_fields_with_replacement(count.unsigned_abs() as usize)
    };

    let per_field = if with_values { 2 } else { 1 };
    let capacity = fields
        .len()
        .checked_mul(per_field)
        .ok_or_else(|| EngineError::Generic("value is out of range".into()))?;
    let mut items = Vec::with_capacity(capacity);
    for field in fields {
        let value = if with_values { hash.get(&field).cloned() } else { None };
        items.push(RespValue::bulk_string(field.into_bytes()));
        if with_values {
            items.push(RespValue::BulkString(value));
        }
    }
    Ok(RespValue::array(items))
}
