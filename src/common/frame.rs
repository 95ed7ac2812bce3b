use tokio::io::{AsyncRead, AsyncReadExt};

use crate::constants::mbap;
use crate::error::{FrameParseError, InternalError, RequestError};
use crate::types::{TxId, UnitId};

/// The fixed 7-byte MBAP header that precedes every PDU on TCP.
///
/// All multi-byte fields are big-endian. The `length` field counts the unit
/// identifier byte plus the PDU bytes that follow the header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MbapHeader {
    /// Transaction identifier, echoed verbatim in the response
    pub tx_id: TxId,
    /// Protocol identifier, zero for Modbus
    pub protocol_id: u16,
    /// Number of bytes following the length field, including the unit id
    pub length: u16,
    /// Unit identifier, echoed verbatim in the response
    pub unit_id: UnitId,
}

impl MbapHeader {
    /// Build a request header for a PDU of the given length
    pub fn request(tx_id: TxId, unit_id: UnitId, pdu_len: usize) -> Self {
        Self {
            tx_id,
            protocol_id: 0,
            length: (pdu_len + 1) as u16,
            unit_id,
        }
    }

    /// Parse a header from the first 7 bytes of `bytes`.
    ///
    /// The fields are decoded verbatim. Validation of the protocol id and the
    /// length field happens at the stream layer, so that `parse` and
    /// [`MbapHeader::serialize`] are exact inverses.
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameParseError> {
        if bytes.len() < mbap::HEADER_LENGTH {
            return Err(FrameParseError::MalformedHeader);
        }

        Ok(Self {
            tx_id: TxId::new(u16::from_be_bytes([bytes[0], bytes[1]])),
            protocol_id: u16::from_be_bytes([bytes[2], bytes[3]]),
            length: u16::from_be_bytes([bytes[4], bytes[5]]),
            unit_id: UnitId::new(bytes[6]),
        })
    }

    /// Serialize the header into its 7-byte wire representation
    pub fn serialize(&self) -> [u8; mbap::HEADER_LENGTH] {
        let mut bytes = [0u8; mbap::HEADER_LENGTH];
        bytes[0..2].copy_from_slice(&self.tx_id.to_u16().to_be_bytes());
        bytes[2..4].copy_from_slice(&self.protocol_id.to_be_bytes());
        bytes[4..6].copy_from_slice(&self.length.to_be_bytes());
        bytes[6] = self.unit_id.value;
        bytes
    }

    /// Build a complete response frame for `pdu`, echoing every header field
    /// except the length, which is recomputed from the PDU
    pub fn reply_frame(&self, pdu: &[u8]) -> Vec<u8> {
        let header = Self {
            length: (pdu.len() + 1) as u16,
            ..*self
        };
        let mut bytes = Vec::with_capacity(mbap::HEADER_LENGTH + pdu.len());
        bytes.extend_from_slice(&header.serialize());
        bytes.extend_from_slice(pdu);
        bytes
    }
}

impl std::fmt::Display for MbapHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "tx_id: {} unit: {} len: {}",
            self.tx_id, self.unit_id, self.length
        )
    }
}

/// A parsed frame: the MBAP header and the PDU bytes that followed it
pub(crate) struct Frame {
    pub(crate) header: MbapHeader,
    length: usize,
    pdu: [u8; mbap::MAX_PDU_LENGTH],
}

impl Frame {
    pub(crate) fn new(header: MbapHeader) -> Frame {
        Frame {
            header,
            length: 0,
            pdu: [0; mbap::MAX_PDU_LENGTH],
        }
    }

    pub(crate) fn set(&mut self, src: &[u8]) -> bool {
        if src.len() > self.pdu.len() {
            return false;
        }

        self.pdu[0..src.len()].copy_from_slice(src);
        self.length = src.len();
        true
    }

    pub(crate) fn payload(&self) -> &[u8] {
        &self.pdu[0..self.length]
    }
}

/// Accumulates socket reads so frames can be parsed even when they arrive
/// split across TCP segments
pub(crate) struct ReadBuffer {
    buffer: Vec<u8>,
    begin: usize,
    end: usize,
}

impl ReadBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        ReadBuffer {
            buffer: vec![0; capacity],
            begin: 0,
            end: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.end - self.begin
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    pub(crate) fn read(&mut self, count: usize) -> Result<&[u8], InternalError> {
        if self.len() < count {
            return Err(InternalError::InsufficientBytesForRead(count, self.len()));
        }

        match self.buffer.get(self.begin..(self.begin + count)) {
            Some(ret) => {
                self.begin += count;
                Ok(ret)
            }
            None => Err(InternalError::InsufficientBytesForRead(count, self.len())),
        }
    }

    pub(crate) async fn read_some<T: AsyncRead + Unpin>(
        &mut self,
        io: &mut T,
    ) -> Result<usize, std::io::Error> {
        // an empty buffer lets us rewind and offer the socket the full capacity
        if self.is_empty() {
            self.begin = 0;
            self.end = 0;
        }

        // out of room at the tail with a frame still incomplete, so slide the
        // unread remainder down to the front
        if self.end == self.buffer.capacity() {
            let length = self.len();
            self.buffer.copy_within(self.begin..self.end, 0);
            self.begin = 0;
            self.end = length;
        }

        let count = io.read(&mut self.buffer[self.end..]).await?;

        if count == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        }
        self.end += count;
        Ok(count)
    }
}

#[derive(Clone, Copy)]
enum ParseState {
    Begin,
    // validated header and the length of the PDU that follows it
    Header(MbapHeader, usize),
}

/// Reads complete MBAP frames off an async stream.
///
/// A header that fails validation is unrecoverable because there is no way to
/// resynchronize on the stream, so the error propagates and the caller drops
/// the connection.
pub(crate) struct FramedReader {
    state: ParseState,
    buffer: ReadBuffer,
}

impl FramedReader {
    pub(crate) fn new() -> Self {
        Self {
            state: ParseState::Begin,
            buffer: ReadBuffer::new(mbap::MAX_FRAME_LENGTH),
        }
    }

    pub(crate) async fn next_frame<T>(&mut self, io: &mut T) -> Result<Frame, RequestError>
    where
        T: AsyncRead + Unpin,
    {
        loop {
            match self.parse()? {
                Some(frame) => return Ok(frame),
                None => {
                    self.buffer.read_some(io).await?;
                }
            }
        }
    }

    fn parse(&mut self) -> Result<Option<Frame>, RequestError> {
        match self.state {
            ParseState::Begin => {
                if self.buffer.len() < mbap::HEADER_LENGTH {
                    return Ok(None);
                }

                let header = MbapHeader::parse(self.buffer.read(mbap::HEADER_LENGTH)?)?;
                let pdu_length = Self::validate(&header)?;
                self.state = ParseState::Header(header, pdu_length);
                self.parse()
            }
            ParseState::Header(header, pdu_length) => {
                if self.buffer.len() < pdu_length {
                    return Ok(None);
                }

                let mut frame = Frame::new(header);
                frame.set(self.buffer.read(pdu_length)?);
                self.state = ParseState::Begin;
                Ok(Some(frame))
            }
        }
    }

    // returns the length of the PDU that follows the header
    fn validate(header: &MbapHeader) -> Result<usize, FrameParseError> {
        if header.protocol_id != 0 {
            return Err(FrameParseError::UnknownProtocolId(header.protocol_id));
        }

        let length = header.length as usize;
        if length > mbap::MAX_LENGTH_FIELD {
            return Err(FrameParseError::FrameLengthTooBig(
                length,
                mbap::MAX_LENGTH_FIELD,
            ));
        }

        // must be > 0 since the unit identifier counts towards the length field
        length.checked_sub(1).ok_or(FrameParseError::MbapLengthZero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::*;
    use tokio_test::{block_on, io};

    // tx id 0x0102, protocol 0, length 4, unit 0x11, then a three byte PDU
    const SIMPLE_FRAME: &[u8] = &[0x01, 0x02, 0x00, 0x00, 0x00, 0x04, 0x11, 0x03, 0xBE, 0xEF];

    fn test_error(input: &[u8]) -> RequestError {
        let mut io = io::Builder::new().read(input).build();
        let mut reader = FramedReader::new();
        block_on(reader.next_frame(&mut io)).err().unwrap()
    }

    #[test]
    fn header_parse_and_serialize_are_inverses() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let header = MbapHeader::parse(&bytes).unwrap();
        assert_eq!(header.tx_id, TxId::new(0x0102));
        assert_eq!(header.protocol_id, 0x0304);
        assert_eq!(header.length, 0x0506);
        assert_eq!(header.unit_id, UnitId::new(0x07));
        assert_eq!(header.serialize(), bytes);
        assert_eq!(MbapHeader::parse(&header.serialize()).unwrap(), header);
    }

    #[test]
    fn header_parse_requires_seven_bytes() {
        assert_eq!(
            MbapHeader::parse(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]),
            Err(FrameParseError::MalformedHeader)
        );
    }

    #[test]
    fn reply_frame_echoes_the_header_and_recomputes_the_length() {
        let header = MbapHeader::parse(&SIMPLE_FRAME[..7]).unwrap();
        let frame = header.reply_frame(&[0x01, 0x01, 0xFF]);
        assert_eq!(
            frame,
            &[0x01, 0x02, 0x00, 0x00, 0x00, 0x04, 0x11, 0x01, 0x01, 0xFF]
        );
    }

    #[test]
    fn reads_a_whole_frame_off_the_stream() {
        let mut io = io::Builder::new().read(SIMPLE_FRAME).build();
        let mut reader = FramedReader::new();
        let frame = block_on(reader.next_frame(&mut io)).unwrap();
        assert_eq!(frame.header.tx_id, TxId::new(0x0102));
        assert_eq!(frame.header.unit_id, UnitId::new(0x11));
        assert_eq!(frame.payload(), &[0x03, 0xBE, 0xEF]);
    }

    #[test]
    fn reassembles_a_header_split_across_reads() {
        let (f1, f2) = SIMPLE_FRAME.split_at(4);
        let mut io = io::Builder::new().read(f1).read(f2).build();
        let mut reader = FramedReader::new();
        let frame = block_on(reader.next_frame(&mut io)).unwrap();
        assert_eq!(frame.payload(), &[0x03, 0xBE, 0xEF]);
    }

    #[test]
    fn reassembles_a_payload_split_across_reads() {
        let (f1, f2) = SIMPLE_FRAME.split_at(8);
        let mut io = io::Builder::new().read(f1).read(f2).build();
        let mut reader = FramedReader::new();
        let frame = block_on(reader.next_frame(&mut io)).unwrap();
        assert_eq!(frame.payload(), &[0x03, 0xBE, 0xEF]);
    }

    #[test]
    fn accepts_the_largest_legal_frame() {
        // a 253 byte PDU puts 254 in the length field
        let mut input = vec![0x01, 0x02, 0x00, 0x00, 0x00, 0xFE, 0x11];
        input.extend_from_slice(&[0xCC; 253]);

        let mut io = io::Builder::new().read(&input).build();
        let mut reader = FramedReader::new();
        let frame = block_on(reader.next_frame(&mut io)).unwrap();
        assert_eq!(frame.payload(), [0xCC; 253].as_ref());
    }

    #[test]
    fn rejects_a_nonzero_protocol_id() {
        let frame = &[0x01, 0x02, 0xBE, 0xEF, 0x00, 0x01, 0x11];
        assert_eq!(
            test_error(frame),
            RequestError::BadFrame(FrameParseError::UnknownProtocolId(0xBEEF)),
        );
    }

    #[test]
    fn rejects_a_zero_length_field() {
        let frame = &[0x01, 0x02, 0x00, 0x00, 0x00, 0x00, 0x11];
        assert_eq!(
            test_error(frame),
            RequestError::BadFrame(FrameParseError::MbapLengthZero)
        );
    }

    #[test]
    fn rejects_an_oversized_length_field() {
        let frame = &[0x01, 0x02, 0x00, 0x00, 0x00, 0xFF, 0x11];
        assert_eq!(
            test_error(frame),
            RequestError::BadFrame(FrameParseError::FrameLengthTooBig(
                0xFF,
                mbap::MAX_LENGTH_FIELD,
            ))
        );
    }

    #[test]
    fn buffer_refuses_reads_past_what_it_holds() {
        let mut buffer = ReadBuffer::new(10);
        assert_eq!(
            buffer.read(1),
            Err(InternalError::InsufficientBytesForRead(1, 0))
        );
    }

    #[test]
    fn buffer_slides_unread_bytes_down_when_full() {
        let mut buffer = ReadBuffer::new(3);
        let mut io = io::Builder::new()
            .read(&[0x0A, 0x0B, 0x0C])
            .read(&[0x0D, 0x0E])
            .build();
        assert_eq!(block_on(buffer.read_some(&mut io)).unwrap(), 3);
        assert_eq!(buffer.read(2).unwrap(), &[0x0A, 0x0B]);
        assert_eq!(block_on(buffer.read_some(&mut io)).unwrap(), 2);
        assert_eq!(buffer.read(3).unwrap(), &[0x0C, 0x0D, 0x0E]);
    }
}
