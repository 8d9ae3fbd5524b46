/// Redis string type — binary-safe, stored as raw bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RedisString {
    data: Vec<u8>,
}

impl RedisString {
    pub fn new(data: Vec<u8>) -> Self {
        RedisString { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_i64(&self) -> Option<i64> {
        std::str::from_utf8(&self.data)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
    }

    /// Append data and return new length.
    pub fn append(&mut self, data: &[u8]) -> usize {
        self.data.extend_from_slice(data);
        self.data.len()
    }
}

/// Shortest text that parses back to the same float.
pub fn format_float(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    let simple = format!("{n}");
    if simple.parse::<f64>().ok() == Some(n) {
        simple
    } else {
        format!("{n:.17}")
    }
}
