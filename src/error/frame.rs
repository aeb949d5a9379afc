use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    IllegalOpCode,

    IllegalControl,

    UnmaskedFrame,

    TooLarge,

    NotEnoughData,
}

impl Display for FrameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use FrameError::*;
        match self {
            IllegalOpCode => write!(f, "Illegal opcode value"),
            IllegalControl => write!(f, "Fragmented or oversized control frame"),
            UnmaskedFrame => write!(f, "Unmasked frame from client"),
            TooLarge => write!(f, "Payload exceeds the frame size limit"),
            NotEnoughData => write!(f, "Not enough data to parse"),
        }
    }
}

// use default impl
impl std::error::Error for FrameError {}
