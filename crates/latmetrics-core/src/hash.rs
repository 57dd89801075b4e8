//! Blake3 content fingerprints

/// Incremental fingerprint over typed, nullable fields.
///
/// Every field is tagged (null vs present) and strings are length-prefixed,
/// so `("ab", "c")` and `("a", "bc")` hash differently.
pub struct Fingerprinter {
    hasher: blake3::Hasher,
}

impl Fingerprinter {
    pub fn new() -> Self {
        Self {
            hasher: blake3::Hasher::new(),
        }
    }

    fn tag(&mut self, present: bool) {
        self.hasher.update(&[u8::from(present)]);
    }

    pub fn str(&mut self, v: Option<&str>) -> &mut Self {
        self.tag(v.is_some());
        if let Some(s) = v {
            self.hasher.update(&(s.len() as u64).to_le_bytes());
            self.hasher.update(s.as_bytes());
        }
        self
    }

    pub fn i32(&mut self, v: Option<i32>) -> &mut Self {
        self.tag(v.is_some());
        if let Some(n) = v {
            self.hasher.update(&n.to_le_bytes());
        }
        self
    }

    /// Hashes the bit pattern, so `0.0` and `-0.0` differ
    pub fn f64(&mut self, v: Option<f64>) -> &mut Self {
        self.tag(v.is_some());
        if let Some(x) = v {
            self.hasher.update(&x.to_bits().to_le_bytes());
        }
        self
    }

    pub fn bool(&mut self, v: Option<bool>) -> &mut Self {
        self.tag(v.is_some());
        if let Some(b) = v {
            self.hasher.update(&[u8::from(b)]);
        }
        self
    }

    /// Full hex digest
    pub fn finish(&self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

/// First 8 hex characters of a digest string.
pub fn short_hash(hex: &str) -> &str {
    &hex[..hex.len().min(8)]
}
