//! Websocket data frame.
//!
//! [RFC-6455 Section5](https://datatracker.ietf.org/doc/html/rfc6455#section-5)
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! :                     Payload Data continued ...                :
//! + - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - +
//! |                     Payload Data continued ...                |
//! +---------------------------------------------------------------+
//! ```
//!
//! [`FrameHead`] handles the head alone. [`decode`] and [`encode`] work on
//! whole frames: the server never masks what it sends, and unmasks what
//! it receives.

pub mod flag;
pub mod length;
pub mod mask;

pub use flag::{Fin, OpCode};
pub use length::PayloadLen;
pub use mask::Mask;

use mask::apply_mask4;
use crate::error::FrameError;

/// 2 + 8 + 4
pub const MAX_HEAD_LEN: usize = 14;

/// Heartbeat sent by the server: fin, ping, unmasked, empty.
pub const PING: [u8; 2] = [0x89, 0x00];

/// Websocket frame head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHead {
    pub fin: Fin,
    pub opcode: OpCode,
    pub mask: Mask,
    pub length: PayloadLen,
}

impl FrameHead {
    /// Constructor.
    #[inline]
    pub const fn new(fin: Fin, opcode: OpCode, mask: Mask, length: PayloadLen) -> Self {
        Self {
            fin,
            opcode,
            mask,
            length,
        }
    }

    /// Length of a head, judged by its second byte.
    #[inline]
    pub const fn len_from_flag(b2: u8) -> usize {
        let mask_len = if Mask::from_flag(b2).is_masked() { 4 } else { 0 };
        2 + PayloadLen::from_flag(b2).extra_len() + mask_len
    }

    /// Serialized length of this head.
    #[inline]
    pub const fn len(&self) -> usize {
        let mask_len = if self.mask.is_masked() { 4 } else { 0 };
        2 + self.length.extra_len() + mask_len
    }

    fn to_bytes(self) -> ([u8; MAX_HEAD_LEN], usize) {
        let mut out = [0_u8; MAX_HEAD_LEN];

        // fin, opcode
        out[0] = self.fin as u8 | self.opcode as u8;

        // mask, payload length
        out[1] = self.mask.to_flag() | self.length.to_flag();

        let mut n = 2;

        // extended payload length
        match self.length {
            PayloadLen::Standard(_) => {}
            PayloadLen::Extended1(v) => {
                out[n..n + 2].copy_from_slice(&v.to_be_bytes());
                n += 2;
            }
            PayloadLen::Extended2(v) => {
                out[n..n + 8].copy_from_slice(&v.to_be_bytes());
                n += 8;
            }
        };

        // mask key
        match self.mask {
            Mask::Key(k) => {
                out[n..n + 4].copy_from_slice(&k);
                n += 4;
            }
            Mask::Skip => n += 4,
            Mask::None => {}
        };

        (out, n)
    }

    /// Append to a growable buffer, returns the count of written bytes.
    pub fn encode_to(&self, buf: &mut Vec<u8>) -> usize {
        let (bytes, n) = self.to_bytes();
        buf.extend_from_slice(&bytes[..n]);
        n
    }

    /// Parse from provided buffer, returns [`FrameHead`] and the count of read bytes
    /// if the parse succeeds.
    /// If there is not enough data to parse, a [`FrameError::NotEnoughData`] error
    /// will be returned.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), FrameError> {
        if buf.len() < 2 {
            return Err(FrameError::NotEnoughData);
        }

        // fin, opcode
        let b1 = buf[0];

        // mask, payload length
        let b2 = buf[1];

        let fin = Fin::from_flag(b1);
        let opcode = OpCode::from_flag(b1)?;

        let mut mask = Mask::from_flag(b2);
        let mut length = PayloadLen::from_flag(b2);

        if buf.len() < Self::len_from_flag(b2) {
            return Err(FrameError::NotEnoughData);
        }

        let mut n: usize = 2;

        match length {
            PayloadLen::Standard(_) => {}
            PayloadLen::Extended1(_) => {
                length = PayloadLen::from_byte2([buf[2], buf[3]]);
                n += 2;
            }
            PayloadLen::Extended2(_) => {
                let mut b8 = [0_u8; 8];
                b8.copy_from_slice(&buf[2..10]);
                length = PayloadLen::from_byte8(b8);
                n += 8;
            }
        };

        if mask.is_masked() {
            let mut key = [0_u8; 4];
            key.copy_from_slice(&buf[n..n + 4]);
            mask = Mask::from_key(key);
            n += 4;
        }

        Ok((
            FrameHead {
                fin,
                opcode,
                mask,
                length,
            },
            n,
        ))
    }
}

/// A complete frame with its payload unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub head: FrameHead,
    pub payload: Vec<u8>,
}

impl Frame {
    #[inline]
    pub const fn opcode(&self) -> OpCode { self.head.opcode }

    #[inline]
    pub const fn is_fin(&self) -> bool { matches!(self.head.fin, Fin::Y) }

    #[inline]
    pub const fn is_masked(&self) -> bool { self.head.mask.is_masked() }
}

/// Outcome of [`decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame, and the count of bytes it occupied.
    Frame(Frame, usize),

    /// At least this many more bytes are required.
    NeedMore(usize),

    /// These bytes can never form a valid frame.
    Invalid(FrameError),
}

/// Decode one frame from the front of `buf`.
#[inline]
pub fn decode(buf: &[u8]) -> Decoded { decode_limited(buf, u64::MAX) }

/// Same as [`decode`], with an upper bound on the declared payload length.
pub fn decode_limited(buf: &[u8], max_payload: u64) -> Decoded {
    if buf.len() < 2 {
        return Decoded::NeedMore(2 - buf.len());
    }

    let (head, head_len) = match FrameHead::decode(buf) {
        Ok(x) => x,
        Err(FrameError::NotEnoughData) => {
            return Decoded::NeedMore(FrameHead::len_from_flag(buf[1]) - buf.len())
        }
        Err(e) => return Decoded::Invalid(e),
    };

    let payload_len = head.length.to_num();
    if payload_len > max_payload {
        return Decoded::Invalid(FrameError::TooLarge);
    }

    let available = (buf.len() - head_len) as u64;
    if available < payload_len {
        let shortfall = usize::try_from(payload_len - available).unwrap_or(usize::MAX);
        return Decoded::NeedMore(shortfall);
    }

    // fits in usize, it is no more than what the buffer holds
    let end = head_len + payload_len as usize;
    let mut payload = buf[head_len..end].to_vec();

    if let Mask::Key(key) = head.mask {
        apply_mask4(key, &mut payload);
    }

    Decoded::Frame(Frame { head, payload }, end)
}

fn encode_with(opcode: OpCode, mask: Mask, payload: &[u8]) -> Vec<u8> {
    let head = FrameHead::new(
        Fin::Y,
        opcode,
        mask,
        PayloadLen::from_num(payload.len() as u64),
    );

    let mut buf = Vec::with_capacity(head.len() + payload.len());
    let n = head.encode_to(&mut buf);
    buf.extend_from_slice(payload);

    if let Mask::Key(key) = mask {
        apply_mask4(key, &mut buf[n..]);
    }

    buf
}

/// Encode a server frame: fin set, never masked.
#[inline]
pub fn encode(opcode: OpCode, payload: &[u8]) -> Vec<u8> { encode_with(opcode, Mask::None, payload) }

/// Encode a client frame, masked with the given key.
#[inline]
pub fn encode_masked(opcode: OpCode, payload: &[u8], key: [u8; 4]) -> Vec<u8> {
    encode_with(opcode, Mask::from_key(key), payload)
}
