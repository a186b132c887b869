//! Manual binary wire format scaffolding shared by every packet definition
//! in `zone_core::protocol`. Kept deliberately separate from `serde`: these
//! packets are fixed-layout, checksum-bearing, and size-capped (spec.md §6),
//! which a manual `Serialize`/`Deserialize` pair expresses more directly
//! than a derive macro would.

use std::io;

pub type WireResult<T> = Result<T, WireError>;

#[derive(Debug, Eq, PartialEq)]
pub enum WireError {
    /// Not enough room in the destination/source to complete the operation;
    /// retryable once more capacity/data is available.
    Wait,
    Fatal(WireErrorKind),
}

#[derive(Debug, Eq, PartialEq)]
pub enum WireErrorKind {
    PayloadTooLarge,
    EmptyPayload,
    BadChecksum,
    BadLength,
    Io(io::ErrorKind),
}

impl From<io::Error> for WireError {
    #[inline]
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::WouldBlock => WireError::Wait,
            kind => WireError::Fatal(WireErrorKind::Io(kind)),
        }
    }
}

pub trait ErrorUtils {
    fn has_failed(&self) -> bool;
}

impl<T> ErrorUtils for WireResult<T> {
    #[inline]
    fn has_failed(&self) -> bool {
        !matches!(self, Ok(_) | Err(WireError::Wait))
    }
}

/// Augmented `io::Write` that is aware of the amount of remaining free
/// capacity in the destination.
pub trait SizedWrite: io::Write {
    fn free_capacity(&self) -> usize;
}

/// Augmented `io::Read` that is aware of the amount of remaining data in
/// the source.
pub trait SizedRead: io::Read {
    fn remaining_data(&self) -> usize;
}

impl SizedWrite for io::Cursor<&mut [u8]> {
    #[inline]
    fn free_capacity(&self) -> usize {
        self.get_ref().len() - self.position() as usize
    }
}

impl SizedRead for io::Cursor<&[u8]> {
    #[inline]
    fn remaining_data(&self) -> usize {
        self.get_ref().len() - self.position() as usize
    }
}

/// Trait for manually serialized wire objects. Implementors must check the
/// remaining free capacity upfront and only write if everything fits,
/// returning `WireError::Wait` rather than a partial write.
pub trait Serialize {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> WireResult<()>;
}

/// Trait for manually deserialized wire objects.
pub trait Deserialize: Sized {
    fn deserialize<R: SizedRead>(stream: &mut R) -> WireResult<Self>;
}

/// Batched payload messages, written/read until the stream runs out of
/// room/data. Used to coalesce multiple outbound packets (e.g. the
/// concatenated `PlayerEntering` burst of spec.md §4.6) into one transport
/// send.
pub struct PayloadBatch<P> {
    data: Vec<P>,
}

impl<P> Default for PayloadBatch<P> {
    fn default() -> Self {
        PayloadBatch { data: Vec::new() }
    }
}

impl<P> PayloadBatch<P> {
    #[inline]
    pub fn new() -> PayloadBatch<P> {
        PayloadBatch::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<P: Serialize> PayloadBatch<P> {
    #[inline]
    pub fn push(&mut self, payload: P) {
        self.data.push(payload)
    }

    #[inline]
    pub fn drain(&mut self) -> impl Iterator<Item = P> + '_ {
        self.data.drain(..)
    }

    /// Writes as many payload messages as possible to the destination
    /// stream, draining the backlog by however many made it out.
    pub fn write<W: SizedWrite>(&mut self, stream: &mut W) -> WireResult<()> {
        let mut sent = 0;

        for payload in self.data.iter() {
            match payload.serialize(stream) {
                Ok(_) => sent += 1,
                Err(WireError::Wait) => break,
                Err(error) => return Err(error),
            }
        }

        if sent == 0 {
            return Err(WireError::Wait);
        }

        self.data.drain(..sent);
        Ok(())
    }
}


impl<P: Deserialize> PayloadBatch<P> {
    /// Reads as many messages as possible from the source stream into the
    /// current batch.
    pub fn read<R: SizedRead>(&mut self, stream: &mut R) -> WireResult<()> {
        while stream.remaining_data() > 0 {
            self.data.push(P::deserialize(stream)?)
        }

        Ok(())
    }
}
