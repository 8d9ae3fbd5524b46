use crate::command::{CmdLine, CommandCtx, CommandDescriptor, Registry, arg_to_string};
use crate::error::EngineResult;
use crate::resp::RespValue;
use crate::transaction::undo::first_key;
use crate::types::set::RedisSet;

pub fn register(registry: &mut Registry) -> EngineResult<()> {
    registry.register(CommandDescriptor::write("SADD", cmd_sadd, -3, first_key))?;
    registry.register(CommandDescriptor::write("SREM", cmd_srem, -3, first_key))?;
    registry.register(CommandDescriptor::read("SISMEMBER", cmd_sismember, 3))?;
    registry.register(CommandDescriptor::read("SMEMBERS", cmd_smembers, 2))?;
    registry.register(CommandDescriptor::read("SCARD", cmd_scard, 2))?;
    Ok(())
}

pub fn cmd_sadd(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let (set, _) = ctx.db.get_or_init::<RedisSet>(&key)?;
    let mut canonical = CmdLine::new("SADD").arg(&args[0]);
    for member in &args[1..] {
        if set.add(member.clone()) {
            canonical.push(member);
        }
    }
    let added = canonical.args().len() - 1;
    ctx.propagate(if added > 0 { vec![canonical] } else { Vec::new() });
    Ok(RespValue::integer(added as i64))
}

pub fn cmd_srem(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let Some(set) = ctx.db.get_as_mut::<RedisSet>(&key)? else {
        ctx.propagate(Vec::new());
        return Ok(RespValue::integer(0));
    };
    let mut canonical = CmdLine::new("SREM").arg(&args[0]);
    for member in &args[1..] {
        if set.remove(member) {
            canonical.push(member);
        }
    }
    ctx.db.remove_if_vacant::<RedisSet>(&key);
    let removed = canonical.args().len() - 1;
    ctx.propagate(if removed > 0 { vec![canonical] } else { Vec::new() });
    Ok(RespValue::integer(removed as i64))
}

pub fn cmd_sismember(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let found = ctx
        .db
        .get_as::<RedisSet>(&key)?
        .is_some_and(|set| set.contains(&args[1]));
    Ok(RespValue::integer(found as i64))
}

/// Members in byte order, so replies and restore commands are stable.
pub fn cmd_smembers(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let members = match ctx.db.get_as::<RedisSet>(&key)? {
        Some(set) => set
            .sorted_members()
            .into_iter()
            .map(|m| RespValue::bulk_string(m.clone()))
            .collect(),
        None => Vec::new(),
    };
    Ok(RespValue::array(members))
}

pub fn cmd_scard(ctx: &mut CommandCtx<'_>, args: &[Vec<u8>]) -> EngineResult<RespValue> {
    let key = arg_to_string(&args[0]);
    let len = ctx.db.get_as::<RedisSet>(&key)?.map_or(0, RedisSet::len);
    Ok(RespValue::integer(len as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::store::Keyspace;

    fn run(db: &mut Keyspace, line: &str) -> RespValue {
        let registry = Registry::with_builtin_commands().unwrap();
        registry.dispatch(db, &CmdLine::from_inline(line).unwrap())
    }

    #[test]
    fn test_sadd_srem() {
        let mut db = Keyspace::new();
        assert_eq!(run(&mut db, "SADD s b a b"), RespValue::integer(2));
        assert_eq!(run(&mut db, "SCARD s"), RespValue::integer(2));
        assert_eq!(run(&mut db, "SISMEMBER s a"), RespValue::integer(1));
        assert_eq!(
            run(&mut db, "SMEMBERS s"),
            RespValue::array(vec![
                RespValue::bulk_string(b"a".to_vec()),
                RespValue::bulk_string(b"b".to_vec()),
            ])
        );
        assert_eq!(run(&mut db, "SREM s a z"), RespValue::integer(1));
        assert_eq!(run(&mut db, "SREM s b"), RespValue::integer(1));
        assert!(!db.exists("s"));
        assert_eq!(run(&mut db, "SREM s b"), RespValue::integer(0));
    }

    #[test]
    fn test_set_wrong_type() {
        let mut db = Keyspace::new();
        run(&mut db, "HSET h f v");
        assert_eq!(run(&mut db, "SADD h m"), EngineError::WrongType.to_resp_error());
        assert_eq!(run(&mut db, "SCARD h"), EngineError::WrongType.to_resp_error());
    }

    #[test]
    fn test_canonical_only_effective_members() {
        let registry = Registry::with_builtin_commands().unwrap();
        let mut db = Keyspace::new();
        run(&mut db, "SADD s a");
        let applied = registry
            .apply(&mut db, &CmdLine::from_inline("SADD s a b").unwrap())
            .unwrap();
        assert_eq!(applied.propagate, vec![CmdLine::new("SADD").arg("s").arg("b")]);
        let applied = registry
            .apply(&mut db, &CmdLine::from_inline("SREM s zz").unwrap())
            .unwrap();
        assert!(applied.propagate.is_empty());
    }
}
