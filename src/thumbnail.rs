use std::fmt;
use std::sync::Arc;

/// Encoded crop of a detected object. The buffer is shared and never mutated;
/// updating an item's thumbnail swaps the whole value.
#[derive(Clone, PartialEq, Eq)]
pub struct Thumbnail {
    bytes: Arc<[u8]>,
}

impl Thumbnail {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Byte-for-byte equality; shared buffers short-circuit.
    #[inline]
    pub fn same_content(&self, other: &Thumbnail) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes) || self.bytes[..] == other.bytes[..]
    }
}

impl From<Vec<u8>> for Thumbnail {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for Thumbnail {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

impl fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thumbnail({} bytes)", self.bytes.len())
    }
}
