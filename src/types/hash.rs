use crate::error::{EngineError, EngineResult};
use crate::types::rstring::format_float;
use rand::Rng;
use rand::seq::IteratorRandom;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::str::FromStr;

/// Field-to-value mapping backing a hash-typed key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RedisHash {
    data: HashMap<String, Vec<u8>>,
}

impl RedisHash {
    pub fn new() -> Self {
        RedisHash {
            data: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&Vec<u8>> {
        self.data.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.data.contains_key(field)
    }

    /// Set a field. Returns true if the field is new (didn't exist before).
    pub fn put(&mut self, field: String, value: Vec<u8>) -> bool {
        self.data.insert(field, value).is_none()
    }

    /// Set a field only when it is absent. Returns true if it was created.
    pub fn put_if_absent(&mut self, field: String, value: Vec<u8>) -> bool {
        match self.data.entry(field) {
            Entry::Occupied(_) => false,
            Entry::Vacant(e) => {
                e.insert(value);
                true
            }
        }
    }

    pub fn remove(&mut self, field: &str) -> bool {
        self.data.remove(field).is_some()
    }

    /// Byte length of a field's value, 0 when absent.
    pub fn value_len(&self, field: &str) -> usize {
        self.data.get(field).map_or(0, Vec::len)
    }

    /// Visit every field until the visitor returns false.
    pub fn for_each(&self, mut visitor: impl FnMut(&str, &[u8]) -> bool) {
        for (field, value) in &self.data {
            if !visitor(field, value) {
                break;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<u8>)> {
        self.data.iter()
    }

    /// Up to `count` distinct field names, fewer when the hash is smaller.
    pub fn random_distinct_fields(&self, count: usize) -> Vec<String> {
        let mut rng = rand::thread_rng();
        self.data
            .keys()
            .choose_multiple(&mut rng, count.min(self.data.len()))
            .into_iter()
            .cloned()
            .collect()
    }

    /// Exactly `count` field names drawn with replacement; none when empty.
    pub fn random_fields_with_replacement(&self, count: usize) -> Vec<String> {
        let fields: Vec<&String> = self.data.keys().collect();
        if fields.is_empty() {
            return Vec::new();
        }
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| fields[rng.gen_range(0..fields.len())].clone())
            .collect()
    }

    /// Add `delta` to an integer field, treating an absent field as 0.
    /// The hash is untouched on error.
    pub fn incr_by(&mut self, field: &str, delta: i64) -> EngineResult<i64> {
        let current = match self.data.get(field) {
            Some(v) => std::str::from_utf8(v)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or(EngineError::HashValueNotInteger)?,
            None => 0,
        };
        let new_val = current.checked_add(delta).ok_or(EngineError::Overflow)?;
        self.data
            .insert(field.to_string(), new_val.to_string().into_bytes());
        Ok(new_val)
    }

    /// Float counterpart of [`RedisHash::incr_by`]; returns the stored text.
    ///
    /// Values are added as decimals so `0.1 + 0.2` stores `0.3`. Operands
    /// outside the decimal range fall back to `f64` arithmetic.
    pub fn incr_by_float(&mut self, field: &str, delta: &str) -> EngineResult<String> {
        let delta = delta.trim();
        let delta_f = delta.parse::<f64>().map_err(|_| EngineError::NotFloat)?;
        let current = match self.data.get(field) {
            Some(v) => std::str::from_utf8(v)
                .ok()
                .map(str::trim)
                .filter(|s| s.parse::<f64>().is_ok_and(f64::is_finite))
                .ok_or(EngineError::HashValueNotFloat)?,
            None => "0",
        };

        let text = match decimal_sum(current, delta) {
            Some(sum) => sum,
            None => {
                let current_f = current.parse::<f64>().unwrap_or_default();
                let new_val = current_f + delta_f;
                if !new_val.is_finite() {
                    return Err(EngineError::Generic(
                        "increment would produce NaN or Infinity".into(),
                    ));
                }
                format_float(new_val)
            }
        };
        self.data.insert(field.to_string(), text.clone().into_bytes());
        Ok(text)
    }
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

/// Exact decimal sum, `None` when either side or the result does not fit.
fn decimal_sum(a: &str, b: &str) -> Option<String> {
    let sum = parse_decimal(a)?.checked_add(parse_decimal(b)?)?;
    Some(sum.normalize().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sample(n: usize) -> RedisHash {
        let mut h = RedisHash::new();
        for i in 0..n {
            h.put(format!("f{i}"), format!("v{i}").into_bytes());
        }
        h
    }

    #[test]
    fn test_put_reports_creation() {
        let mut h = RedisHash::new();
        assert!(h.put("f".into(), b"v".to_vec()));
        assert!(!h.put("f".into(), b"v2".to_vec()));
        assert_eq!(h.get("f"), Some(&b"v2".to_vec()));
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn test_put_if_absent_keeps_existing() {
        let mut h = RedisHash::new();
        assert!(h.put_if_absent("f".into(), b"a".to_vec()));
        assert!(!h.put_if_absent("f".into(), b"b".to_vec()));
        assert_eq!(h.get("f"), Some(&b"a".to_vec()));
    }

    #[test]
    fn test_remove() {
        let mut h = sample(2);
        assert!(h.remove("f0"));
        assert!(!h.remove("f0"));
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn test_for_each_stops_early() {
        let h = sample(5);
        let mut seen = 0;
        h.for_each(|_, _| {
            seen += 1;
            seen < 2
        });
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_random_distinct_fields() {
        let h = sample(5);
        let picked = h.random_distinct_fields(3);
        assert_eq!(picked.len(), 3);
        let unique: HashSet<_> = picked.iter().collect();
        assert_eq!(unique.len(), 3);

        let all = h.random_distinct_fields(10);
        assert_eq!(all.len(), 5);
        assert!(h.random_distinct_fields(0).is_empty());
    }

    #[test]
    fn test_random_fields_with_replacement() {
        let h = sample(2);
        let picked = h.random_fields_with_replacement(7);
        assert_eq!(picked.len(), 7);
        assert!(picked.iter().all(|f| h.contains(f)));
        assert!(RedisHash::new().random_fields_with_replacement(3).is_empty());
    }

    #[test]
    fn test_incr_by() {
        let mut h = RedisHash::new();
        assert_eq!(h.incr_by("n", 5).unwrap(), 5);
        assert_eq!(h.incr_by("n", -7).unwrap(), -2);
        assert_eq!(h.get("n"), Some(&b"-2".to_vec()));
    }

    #[test]
    fn test_incr_by_rejects_non_integer_without_mutation() {
        let mut h = RedisHash::new();
        h.put("f".into(), b"abc".to_vec());
        assert!(matches!(
            h.incr_by("f", 1),
            Err(EngineError::HashValueNotInteger)
        ));
        assert_eq!(h.get("f"), Some(&b"abc".to_vec()));
    }

    #[test]
    fn test_incr_by_overflow() {
        let mut h = RedisHash::new();
        h.put("f".into(), i64::MAX.to_string().into_bytes());
        assert!(matches!(h.incr_by("f", 1), Err(EngineError::Overflow)));
    }

    #[test]
    fn test_incr_by_float() {
        let mut h = RedisHash::new();
        h.put("f".into(), b"10.5".to_vec());
        assert_eq!(h.incr_by_float("f", "0.1").unwrap(), "10.6");
        assert_eq!(h.incr_by_float("g", "3.0").unwrap(), "3");
    }

    #[test]
    fn test_incr_by_float_is_decimal_exact() {
        let mut h = RedisHash::new();
        assert_eq!(h.incr_by_float("f", "0.1").unwrap(), "0.1");
        assert_eq!(h.incr_by_float("f", "0.2").unwrap(), "0.3");
        assert_eq!(h.get("f"), Some(&b"0.3".to_vec()));
        assert_eq!(h.incr_by_float("f", "-0.3").unwrap(), "0");
    }

    #[test]
    fn test_incr_by_float_large_values_use_f64() {
        let mut h = RedisHash::new();
        h.put("f".into(), b"1e300".to_vec());
        let text = h.incr_by_float("f", "1e300").unwrap();
        assert_eq!(text.parse::<f64>().unwrap(), 2e300);

        h.put("g".into(), b"abc".to_vec());
        assert!(matches!(
            h.incr_by_float("g", "1"),
            Err(EngineError::HashValueNotFloat)
        ));
        assert_eq!(h.get("g"), Some(&b"abc".to_vec()));
    }
}
