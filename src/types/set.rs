use std::collections::HashSet;

/// Redis set type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RedisSet {
    data: HashSet<Vec<u8>>,
}

impl RedisSet {
    pub fn new() -> Self {
        RedisSet {
            data: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Add a member. Returns true if the member was new.
    pub fn add(&mut self, member: Vec<u8>) -> bool {
        self.data.insert(member)
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        self.data.remove(member)
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        self.data.contains(member)
    }

    /// Members in byte order, so replies and rebuild commands are stable.
    pub fn sorted_members(&self) -> Vec<&Vec<u8>> {
        let mut members: Vec<&Vec<u8>> = self.data.iter().collect();
        members.sort();
        members
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_remove() {
        let mut s = RedisSet::new();
        assert!(s.add(b"a".to_vec()));
        assert!(!s.add(b"a".to_vec()));
        assert!(s.contains(b"a"));
        assert!(s.remove(b"a"));
        assert!(s.is_empty());
    }

    #[test]
    fn test_sorted_members() {
        let mut s = RedisSet::new();
        for m in [b"c", b"a", b"b"] {
            s.add(m.to_vec());
        }
        let members: Vec<&[u8]> = s.sorted_members().into_iter().map(|m| m.as_slice()).collect();
        assert_eq!(members, vec![&b"a"[..], &b"b"[..], &b"c"[..]]);
    }
}
