//!  Mask flag and key.

/// Payload mask with a 32-bit key.
///
/// `Mask::Skip` marks a masked frame whose key is all zero,
/// unmasking it is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mask {
    Key([u8; 4]),
    Skip,
    None,
}

impl Mask {
    /// Read the flag which indicates whether mask is used.
    #[inline]
    pub const fn from_flag(b: u8) -> Self {
        match b & 0x80 {
            0x80 => Mask::Skip,
            _ => Mask::None,
        }
    }

    /// Get the flag byte.
    #[inline]
    pub const fn to_flag(&self) -> u8 {
        use Mask::*;
        match self {
            Key(_) | Skip => 0x80,
            None => 0x00,
        }
    }

    /// Classify a key read from the wire.
    #[inline]
    pub fn from_key(key: [u8; 4]) -> Self {
        if key.iter().all(|b| *b == 0) {
            Mask::Skip
        } else {
            Mask::Key(key)
        }
    }

    /// Whether the mask bit is set.
    #[inline]
    pub const fn is_masked(&self) -> bool { !matches!(self, Mask::None) }
}

/// Generate a new random key.
#[inline]
pub fn new_rand_key() -> [u8; 4] { rand::random::<[u8; 4]>() }

/// Mask the buffer, byte by byte.
#[inline]
pub fn apply_mask(key: [u8; 4], buf: &mut [u8]) {
    for (i, b) in buf.iter_mut().enumerate() {
        *b ^= key[i & 0x03];
    }
}

/// Mask the buffer, 4 bytes at a time.
#[inline]
pub fn apply_mask4(key: [u8; 4], buf: &mut [u8]) {
    let key4 = u32::from_ne_bytes(key);

    let mut chunks = buf.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let mut word = [0u8; 4];
        word.copy_from_slice(chunk);
        let masked = u32::from_ne_bytes(word) ^ key4;
        chunk.copy_from_slice(&masked.to_ne_bytes());
    }

    // the remainder starts at a multiple of 4, so the key is not rotated
    apply_mask(key, chunks.into_remainder());
}
