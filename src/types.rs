use scursor::ReadCursor;

use crate::common::bits::num_bytes_for_bits;
use crate::constants::{coil, limits};
use crate::error::{AduParseError, InvalidRange, RequestError};

/// Names the device a request is addressed to; echoed verbatim by servers
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Ord, Eq)]
pub struct UnitId {
    /// raw wire value
    pub value: u8,
}

impl UnitId {
    /// Wrap a raw unit id
    pub fn new(value: u8) -> Self {
        Self { value }
    }
}

/// `0xFF`, the conventional id for a directly attached TCP server
impl Default for UnitId {
    fn default() -> Self {
        Self { value: 0xFF }
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:#04X}", self.value)
    }
}

/// Transaction identifier used to pair requests and responses on TCP
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct TxId {
    value: u16,
}

impl TxId {
    /// Create a TxId from a raw value
    pub fn new(value: u16) -> Self {
        TxId { value }
    }

    /// Underlying raw value
    pub fn to_u16(self) -> u16 {
        self.value
    }

    /// Return the current id and advance, wrapping at the maximum
    pub fn next(&mut self) -> TxId {
        let ret = self.value;
        self.value = self.value.wrapping_add(1);
        TxId::new(ret)
    }
}

impl Default for TxId {
    fn default() -> Self {
        TxId::new(0)
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:#06X}", self.value)
    }
}

/// A contiguous span of register addresses: where it begins and how many it
/// covers. Construction rejects empty spans and spans that run off the end of
/// the u16 address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressRange {
    /// First address in the span
    pub start: u16,
    /// How many consecutive addresses the span covers
    pub count: u16,
}

impl AddressRange {
    /// Build a range, checking the count and that the span stays inside u16
    pub fn try_from(start: u16, count: u16) -> Result<Self, InvalidRange> {
        if count == 0 {
            return Err(InvalidRange::CountOfZero);
        }

        let max_start = u16::MAX - (count - 1);
        if start > max_start {
            return Err(InvalidRange::AddressOverflow(start, count));
        }

        Ok(Self { start, count })
    }

    // the count ceiling is checked before the address arithmetic so that an
    // oversized quantity is reported as a value error, not an address error
    fn bounded(start: u16, count: u16, max: u16) -> Result<Self, InvalidRange> {
        if count == 0 {
            return Err(InvalidRange::CountOfZero);
        }
        if count > max {
            return Err(InvalidRange::CountTooLargeForType(count, max));
        }
        Self::try_from(start, count)
    }

    pub(crate) fn of_read_bits(start: u16, count: u16) -> Result<Self, InvalidRange> {
        Self::bounded(start, count, limits::MAX_READ_COILS_COUNT)
    }

    pub(crate) fn of_read_registers(start: u16, count: u16) -> Result<Self, InvalidRange> {
        Self::bounded(start, count, limits::MAX_READ_REGISTERS_COUNT)
    }

    pub(crate) fn of_write_bits(start: u16, count: u16) -> Result<Self, InvalidRange> {
        Self::bounded(start, count, limits::MAX_WRITE_COILS_COUNT)
    }

    pub(crate) fn of_write_registers(start: u16, count: u16) -> Result<Self, InvalidRange> {
        Self::bounded(start, count, limits::MAX_WRITE_REGISTERS_COUNT)
    }

    pub(crate) fn parse(cursor: &mut ReadCursor) -> Result<(u16, u16), RequestError> {
        let start = cursor.read_u16_be()?;
        let count = cursor.read_u16_be()?;
        Ok((start, count))
    }
}

impl std::fmt::Display for AddressRange {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "start = {:#06X}, count = {}", self.start, self.count)
    }
}

/// A register value paired with the address it lives at
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Indexed<T> {
    /// Where the value lives
    pub index: u16,
    /// The value itself
    pub value: T,
}

impl<T> Indexed<T> {
    /// Pair an address with a value
    pub fn new(index: u16, value: T) -> Self {
        Indexed { index, value }
    }
}

impl<T> From<(u16, T)> for Indexed<T>
where
    T: Copy,
{
    fn from(tuple: (u16, T)) -> Self {
        let (index, value) = tuple;
        Self::new(index, value)
    }
}

impl Indexed<bool> {
    pub(crate) fn parse(cursor: &mut ReadCursor) -> Result<Self, RequestError> {
        let index = cursor.read_u16_be()?;
        let value = coil_from_u16(cursor.read_u16_be()?)?;
        Ok(Indexed::new(index, value))
    }
}

impl Indexed<u16> {
    pub(crate) fn parse(cursor: &mut ReadCursor) -> Result<Self, RequestError> {
        let index = cursor.read_u16_be()?;
        let value = cursor.read_u16_be()?;
        Ok(Indexed::new(index, value))
    }
}

impl std::fmt::Display for Indexed<bool> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "address = {:#06X}, value = {}", self.index, self.value as i32)
    }
}

impl std::fmt::Display for Indexed<u16> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "address = {:#06X}, value = {:#06X}", self.index, self.value)
    }
}

pub(crate) fn coil_from_u16(value: u16) -> Result<bool, AduParseError> {
    match value {
        coil::ON => Ok(true),
        coil::OFF => Ok(false),
        _ => Err(AduParseError::UnknownCoilState(value)),
    }
}

pub(crate) fn coil_to_u16(value: bool) -> u16 {
    if value {
        coil::ON
    } else {
        coil::OFF
    }
}

/// Walks a packed-bit payload in place, yielding each bit with its address;
/// the low bit of every byte comes first
#[derive(Debug, Copy, Clone)]
pub struct BitIterator<'a> {
    bytes: &'a [u8],
    range: AddressRange,
    pos: u16,
}

impl<'a> BitIterator<'a> {
    pub(crate) fn parse_all(
        range: AddressRange,
        cursor: &mut ReadCursor<'a>,
    ) -> Result<Self, RequestError> {
        let bytes = cursor.read_bytes(num_bytes_for_bits(range.count))?;
        cursor.expect_empty()?;
        Ok(Self {
            bytes,
            range,
            pos: 0,
        })
    }
}

impl Iterator for BitIterator<'_> {
    type Item = Indexed<bool>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos == self.range.count {
            return None;
        }
        let byte = self.pos / 8;
        let bit = (self.pos % 8) as u8;

        match self.bytes.get(byte as usize) {
            Some(value) => {
                let bit = (*value & (1 << bit)) != 0;
                let address = self.range.start + self.pos;
                self.pos += 1;
                Some(Indexed::new(address, bit))
            }
            None => None,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.range.count - self.pos) as usize;
        (remaining, Some(remaining))
    }
}

/// Walks a payload of big-endian 16-bit values in place, yielding each one
/// with its address
#[derive(Debug, Copy, Clone)]
pub struct RegisterIterator<'a> {
    bytes: &'a [u8],
    range: AddressRange,
    pos: u16,
}

impl<'a> RegisterIterator<'a> {
    pub(crate) fn parse_all(
        range: AddressRange,
        cursor: &mut ReadCursor<'a>,
    ) -> Result<Self, RequestError> {
        let bytes = cursor.read_bytes(2 * (range.count as usize))?;
        cursor.expect_empty()?;
        Ok(Self {
            bytes,
            range,
            pos: 0,
        })
    }
}

impl Iterator for RegisterIterator<'_> {
    type Item = Indexed<u16>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos == self.range.count {
            return None;
        }

        let pos = 2 * (self.pos as usize);
        match self.bytes.get(pos..pos + 2) {
            Some([high, low]) => {
                let value = ((*high as u16) << 8) | *low as u16;
                let index = self.pos + self.range.start;
                self.pos += 1;
                Some(Indexed::new(index, value))
            }
            _ => None,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.range.count - self.pos) as usize;
        (remaining, Some(remaining))
    }
}
