use crate::error::{EngineError, EngineResult};
use crate::types::{Container, Entity};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The single keyspace: key name to typed entity.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Keyspace {
    data: HashMap<String, Entity>,
}

impl Keyspace {
    pub fn new() -> Self {
        Keyspace {
            data: HashMap::new(),
        }
    }

    pub fn get_entity(&self, key: &str) -> Option<&Entity> {
        self.data.get(key)
    }

    /// Insert or replace, including a change of kind.
    pub fn put_entity(&mut self, key: String, entity: Entity) {
        self.data.insert(key, entity);
    }

    /// Delete a key. Returns true if it existed.
    pub fn remove(&mut self, key: &str) -> bool {
        self.data.remove(key).is_some()
    }

    pub fn exists(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Resolve `key` as container `C`; `WrongType` if another kind lives there.
    pub fn get_as<C: Container>(&self, key: &str) -> EngineResult<Option<&C>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(entity) => C::view(entity).map(Some).ok_or(EngineError::WrongType),
        }
    }

    pub fn get_as_mut<C: Container>(&mut self, key: &str) -> EngineResult<Option<&mut C>> {
        match self.data.get_mut(key) {
            None => Ok(None),
            Some(entity) => C::view_mut(entity).map(Some).ok_or(EngineError::WrongType),
        }
    }

    /// Resolve `key` as container `C`, storing an empty one if the key is absent.
    /// The flag reports whether the container was created.
    pub fn get_or_init<C: Container>(&mut self, key: &str) -> EngineResult<(&mut C, bool)> {
        let created = match self.data.get(key) {
            Some(entity) if C::view(entity).is_none() => return Err(EngineError::WrongType),
            Some(_) => false,
            None => {
                self.data.insert(key.to_string(), C::default().into_entity());
                true
            }
        };
        let container = self
            .data
            .get_mut(key)
            .and_then(C::view_mut)
            .ok_or(EngineError::WrongType)?;
        Ok((container, created))
    }

    /// Drop `key` if it holds a `C` with nothing left in it.
    pub fn remove_if_vacant<C: Container>(&mut self, key: &str) -> bool {
        let vacant = self
            .data
            .get(key)
            .and_then(C::view)
            .is_some_and(C::is_vacant);
        if vacant {
            self.data.remove(key);
        }
        vacant
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Entity)> {
        self.data.iter()
    }
}

pub type SharedKeyspace = Arc<RwLock<Keyspace>>;
