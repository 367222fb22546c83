//! Frames and logical messages.
//!
//! A logical message is an ordered run of one or more frames. On the frame
//! level every frame but the last carries `more = true`; a `Message` keeps the
//! frames together so that delivery is all-or-nothing.

use bytes::Bytes;

use crate::error::{Error, Result};

/// One frame of a multipart message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame payload, possibly empty
    pub payload: Bytes,
    /// True when at least one more frame of the same message follows
    pub more: bool,
}

impl Frame {
    pub fn new(payload: impl Into<Bytes>, more: bool) -> Self {
        Self {
            payload: payload.into(),
            more,
        }
    }

    /// Final frame of a message.
    pub fn last(payload: impl Into<Bytes>) -> Self {
        Self::new(payload, false)
    }

    /// Empty delimiter frame used by the request/reply envelope.
    #[inline]
    pub fn is_delimiter(&self) -> bool {
        self.payload.is_empty()
    }
}

/// A logical multipart message.
///
/// Frames are reference-counted `Bytes`, so cloning a message for fan-out
/// (PUB, proxy capture) never copies payloads.
///
/// # Examples
///
/// ```
/// use switchyard_core::message::Message;
///
/// // REQ/REP style envelope: [identity, empty, body]
/// let msg = Message::new()
///     .push("client-123")
///     .push_empty()
///     .push_str("Hello");
/// assert_eq!(msg.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    frames: Vec<Bytes>,
}

impl Message {
    /// Create a new empty message.
    #[must_use]
    pub const fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Create a message with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: Vec::with_capacity(capacity),
        }
    }

    /// Build a message from owned frames.
    #[must_use]
    pub fn from_frames(frames: Vec<Bytes>) -> Self {
        Self { frames }
    }

    /// Add a frame from any type that can be converted to `Bytes`.
    #[must_use]
    pub fn push(mut self, frame: impl Into<Bytes>) -> Self {
        self.frames.push(frame.into());
        self
    }

    /// Add a UTF-8 string frame.
    #[must_use]
    pub fn push_str(mut self, s: &str) -> Self {
        self.frames.push(Bytes::copy_from_slice(s.as_bytes()));
        self
    }

    /// Add an empty frame.
    #[must_use]
    pub fn push_empty(mut self) -> Self {
        self.frames.push(Bytes::new());
        self
    }

    /// Add a frame containing a big-endian u32.
    #[must_use]
    pub fn push_u32(mut self, value: u32) -> Self {
        self.frames.push(Bytes::copy_from_slice(&value.to_be_bytes()));
        self
    }

    /// Add a frame containing a big-endian u64.
    #[must_use]
    pub fn push_u64(mut self, value: u64) -> Self {
        self.frames.push(Bytes::copy_from_slice(&value.to_be_bytes()));
        self
    }

    /// Append a frame in place.
    pub fn append(&mut self, frame: impl Into<Bytes>) {
        self.frames.push(frame.into());
    }

    /// Append every frame of `other` in place.
    pub fn extend(&mut self, other: Message) {
        self.frames.extend(other.frames);
    }

    /// Prepend a frame (envelope prefixes such as a ROUTER identity).
    pub fn push_front(&mut self, frame: impl Into<Bytes>) {
        self.frames.insert(0, frame.into());
    }

    /// Remove and return the first frame.
    pub fn pop_front(&mut self) -> Option<Bytes> {
        if self.frames.is_empty() {
            None
        } else {
            Some(self.frames.remove(0))
        }
    }

    /// Split off the first `at` frames, leaving the rest in `self`.
    pub fn split_front(&mut self, at: usize) -> Message {
        let rest = self.frames.split_off(at.min(self.frames.len()));
        Message {
            frames: std::mem::replace(&mut self.frames, rest),
        }
    }

    /// Index of the first empty (delimiter) frame, if any.
    #[must_use]
    pub fn delimiter_position(&self) -> Option<usize> {
        self.frames.iter().position(Bytes::is_empty)
    }

    /// First frame, which is the topic for PUB/SUB and the identity for ROUTER.
    #[must_use]
    pub fn first(&self) -> Option<&Bytes> {
        self.frames.first()
    }

    /// All frames in order.
    #[must_use]
    pub fn frames(&self) -> &[Bytes] {
        &self.frames
    }

    /// Number of frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True when the message has no frames at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total payload size across all frames.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.frames.iter().map(Bytes::len).sum()
    }

    /// Consume the message and return its frames.
    #[must_use]
    pub fn into_frames(self) -> Vec<Bytes> {
        self.frames
    }

    /// Frame-level view with `more` flags set on all but the last frame.
    pub fn into_wire_frames(self) -> impl Iterator<Item = Frame> {
        let last = self.frames.len().saturating_sub(1);
        self.frames
            .into_iter()
            .enumerate()
            .map(move |(i, payload)| Frame::new(payload, i < last))
    }

    /// Reassemble a message from a frame run.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMessage` when the run is empty, when a frame before the
    /// end lacks the `more` flag, or when the final frame still has it.
    pub fn from_wire_frames(frames: impl IntoIterator<Item = Frame>) -> Result<Self> {
        let mut msg = Message::new();
        let mut open = true;
        for frame in frames {
            if !open {
                return Err(Error::MalformedMessage("frame follows a final frame"));
            }
            open = frame.more;
            msg.frames.push(frame.payload);
        }
        if msg.is_empty() {
            return Err(Error::MalformedMessage("message has no frames"));
        }
        if open {
            return Err(Error::MalformedMessage("last frame has the more flag set"));
        }
        Ok(msg)
    }
}

impl From<Vec<Bytes>> for Message {
    fn from(frames: Vec<Bytes>) -> Self {
        Self::from_frames(frames)
    }
}

impl From<Bytes> for Message {
    fn from(frame: Bytes) -> Self {
        Self {
            frames: vec![frame],
        }
    }
}

impl From<&'static str> for Message {
    fn from(frame: &'static str) -> Self {
        Self::from(Bytes::from_static(frame.as_bytes()))
    }
}

impl From<String> for Message {
    fn from(frame: String) -> Self {
        Self::from(Bytes::from(frame))
    }
}

impl From<Vec<u8>> for Message {
    fn from(frame: Vec<u8>) -> Self {
        Self::from(Bytes::from(frame))
    }
}

impl From<Message> for Vec<Bytes> {
    fn from(msg: Message) -> Self {
        msg.frames
    }
}
