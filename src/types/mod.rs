pub mod hash;
pub mod rstring;
pub mod set;

use crate::command::CmdLine;
use hash::RedisHash;
use rstring::RedisString;
use set::RedisSet;

/// Type tag of a stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    String,
    Hash,
    Set,
}

impl Kind {
    pub fn name(self) -> &'static str {
        match self {
            Kind::String => "string",
            Kind::Hash => "hash",
            Kind::Set => "set",
        }
    }
}

/// The value stored under one key. The variant never changes in place.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    String(RedisString),
    Hash(RedisHash),
    Set(RedisSet),
}

impl Entity {
    pub fn kind(&self) -> Kind {
        match self {
            Entity::String(_) => Kind::String,
            Entity::Hash(_) => Kind::Hash,
            Entity::Set(_) => Kind::Set,
        }
    }

    /// Commands that recreate this entity under `key`, assuming the key is absent.
    pub fn restore_commands(&self, key: &str) -> Vec<CmdLine> {
        match self {
            Entity::String(s) => vec![CmdLine::new("SET").arg(key).arg(s.as_bytes())],
            Entity::Hash(h) => {
                if h.is_empty() {
                    return Vec::new();
                }
                let mut fields: Vec<_> = h.iter().collect();
                fields.sort();
                let mut cmd = CmdLine::new("HSET").arg(key);
                for (field, value) in fields {
                    cmd.push(field.as_bytes());
                    cmd.push(value.as_slice());
                }
                vec![cmd]
            }
            Entity::Set(s) => {
                if s.is_empty() {
                    return Vec::new();
                }
                let mut cmd = CmdLine::new("SADD").arg(key);
                for member in s.sorted_members() {
                    cmd.push(member.as_slice());
                }
                vec![cmd]
            }
        }
    }
}

/// Capability interface of one entity family.
///
/// The keyspace resolves a key to a concrete container through this trait and
/// reports `WrongType` instead of casting when the tag differs.
pub trait Container: Default + Sized {
    fn view(entity: &Entity) -> Option<&Self>;

    fn view_mut(entity: &mut Entity) -> Option<&mut Self>;

    fn into_entity(self) -> Entity;

    /// Whether the keyspace should drop the key holding this container.
    fn is_vacant(&self) -> bool;
}

impl Container for RedisHash {
    fn view(entity: &Entity) -> Option<&Self> {
        match entity {
            Entity::Hash(h) => Some(h),
            _ => None,
        }
    }

    fn view_mut(entity: &mut Entity) -> Option<&mut Self> {
        match entity {
            Entity::Hash(h) => Some(h),
            _ => None,
        }
    }

    fn into_entity(self) -> Entity {
        Entity::Hash(self)
    }

    fn is_vacant(&self) -> bool {
        self.is_empty()
    }
}

impl Container for RedisSet {
    fn view(entity: &Entity) -> Option<&Self> {
        match entity {
            Entity::Set(s) => Some(s),
            _ => None,
        }
    }

    fn view_mut(entity: &mut Entity) -> Option<&mut Self> {
        match entity {
            Entity::Set(s) => Some(s),
            _ => None,
        }
    }

    fn into_entity(self) -> Entity {
        Entity::Set(self)
    }

    fn is_vacant(&self) -> bool {
        self.is_empty()
    }
}

impl Container for RedisString {
    fn view(entity: &Entity) -> Option<&Self> {
        match entity {
            Entity::String(s) => Some(s),
            _ => None,
        }
    }

    fn view_mut(entity: &mut Entity) -> Option<&mut Self> {
        match entity {
            Entity::String(s) => Some(s),
            _ => None,
        }
    }

    fn into_entity(self) -> Entity {
        Entity::String(self)
    }

    // An empty string is still a value.
    fn is_vacant(&self) -> bool {
        false
    }
}
