//! Content hashing
//!
//! Every sharing decision in the crate (topology, index ranges, primvar
//! ranges, geometric shaders) is keyed by a 64-bit xxh3 digest. Equal content
//! always produces an equal digest; the registries rely on that to converge
//! unrelated prims onto one allocation.

use xxhash_rust::xxh3::{xxh3_64_with_seed, Xxh3};

/// Incremental 64-bit content hasher
pub struct ContentHasher {
    state: Xxh3,
}

impl ContentHasher {
    /// Create an unseeded hasher
    pub fn new() -> Self {
        Self { state: Xxh3::new() }
    }

    /// Create a hasher seeded with a previous digest
    ///
    /// Used to chain ids, e.g. a primvar sharing id seeded with the topology id.
    pub fn with_seed(seed: u64) -> Self {
        Self { state: Xxh3::with_seed(seed) }
    }

    /// Feed raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.state.update(bytes);
        self
    }

    /// Feed a string, length-prefixed so adjacent strings cannot alias
    pub fn write_str(&mut self, value: &str) -> &mut Self {
        self.write_u64(value.len() as u64);
        self.write_bytes(value.as_bytes())
    }

    /// Feed a u64
    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Feed an i32
    pub fn write_i32(&mut self, value: i32) -> &mut Self {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Feed a bool
    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.write_bytes(&[u8::from(value)])
    }

    /// Feed a slice of i32, length-prefixed
    pub fn write_i32_slice(&mut self, values: &[i32]) -> &mut Self {
        self.write_u64(values.len() as u64);
        self.write_bytes(bytemuck::cast_slice(values))
    }

    /// Feed a slice of f32, length-prefixed
    pub fn write_f32_slice(&mut self, values: &[f32]) -> &mut Self {
        self.write_u64(values.len() as u64);
        self.write_bytes(bytemuck::cast_slice(values))
    }

    /// Feed a slice of f64, length-prefixed
    pub fn write_f64_slice(&mut self, values: &[f64]) -> &mut Self {
        self.write_u64(values.len() as u64);
        self.write_bytes(bytemuck::cast_slice(values))
    }

    /// Feed a slice of u32, length-prefixed
    pub fn write_u32_slice(&mut self, values: &[u32]) -> &mut Self {
        self.write_u64(values.len() as u64);
        self.write_bytes(bytemuck::cast_slice(values))
    }

    /// Current digest
    pub fn finish(&self) -> u64 {
        self.state.digest()
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Salt an existing digest with extra bytes
///
/// The digest is used as the seed, so `salt(h, a) != salt(h, b)` for
/// differing salts while staying deterministic.
pub fn salt(hash: u64, bytes: &[u8]) -> u64 {
    xxh3_64_with_seed(bytes, hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_content_equal_digest() {
        let mut a = ContentHasher::new();
        a.write_str("catmullClark").write_i32_slice(&[4, 4]);
        let mut b = ContentHasher::new();
        b.write_str("catmullClark").write_i32_slice(&[4, 4]);
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn test_length_prefix_prevents_aliasing() {
        let mut a = ContentHasher::new();
        a.write_i32_slice(&[1, 2]).write_i32_slice(&[3]);
        let mut b = ContentHasher::new();
        b.write_i32_slice(&[1]).write_i32_slice(&[2, 3]);
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn test_salt_changes_digest() {
        let base = 0xDEAD_BEEF_u64;
        assert_ne!(salt(base, &[0]), salt(base, &[1]));
        assert_eq!(salt(base, &[1]), salt(base, &[1]));
    }
}
