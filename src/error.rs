use std::fmt::{Display, Formatter};

use crate::exception::ExceptionCode;

/// Errors that occur while parsing a frame off a TCP stream
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameParseError {
    /// Fewer bytes than the fixed MBAP header requires
    MalformedHeader,
    /// The MBAP length field was zero, leaving no room for a unit id
    MbapLengthZero,
    /// The MBAP length field exceeds what a legal frame may carry
    FrameLengthTooBig(usize, usize),
    /// The protocol id field was not the Modbus value of zero
    UnknownProtocolId(u16),
}

impl std::error::Error for FrameParseError {}

impl Display for FrameParseError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            FrameParseError::MalformedHeader => {
                f.write_str("fewer than the seven bytes an MBAP header needs")
            }
            FrameParseError::MbapLengthZero => {
                f.write_str("the MBAP length field was zero, leaving no room for a unit id")
            }
            FrameParseError::FrameLengthTooBig(size, max) => write!(
                f,
                "the MBAP length field of {size} is over the allowed maximum of {max}"
            ),
            FrameParseError::UnknownProtocolId(id) => {
                write!(f, "protocol id {id} is not Modbus")
            }
        }
    }
}

/// Errors that occur while parsing requests and responses
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AduParseError {
    /// The PDU ended before all expected fields were read
    InsufficientBytes,
    /// Declared byte count disagrees with the quantity field
    ByteCountMismatch(usize, usize),
    /// Bytes remained after the final expected field
    TrailingBytes,
    /// The reply did not echo the request parameters
    ReplyEchoMismatch,
    /// The reply's function code matched neither the request nor its error form
    UnknownResponseFunction(u8, u8, u8),
    /// Coil state field was something other than 0xFF00 or 0x0000
    UnknownCoilState(u16),
}

impl std::error::Error for AduParseError {}

impl Display for AduParseError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            AduParseError::InsufficientBytes => {
                f.write_str("the PDU ended before all expected fields were read")
            }
            AduParseError::ByteCountMismatch(expected, actual) => write!(
                f,
                "declared byte count of {actual} where the quantity calls for {expected}"
            ),
            AduParseError::TrailingBytes => {
                f.write_str("bytes were left over after the last expected field")
            }
            AduParseError::ReplyEchoMismatch => {
                f.write_str("the reply did not echo the request parameters")
            }
            AduParseError::UnknownResponseFunction(actual, expected, error) => write!(
                f,
                "response carried function code {actual} where {expected} or {error} was expected"
            ),
            AduParseError::UnknownCoilState(value) => write!(
                f,
                "coil state field was {value:#06X}, expected 0xFF00 or 0x0000"
            ),
        }
    }
}

/// Errors that result from an invalid address range
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InvalidRange {
    /// The span covers zero elements
    CountOfZero,
    /// The span runs past the end of the u16 address space
    AddressOverflow(u16, u16),
    /// The count is over the ceiling for this register type
    CountTooLargeForType(u16, u16),
}

impl std::error::Error for InvalidRange {}

impl Display for InvalidRange {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            InvalidRange::CountOfZero => f.write_str("the range covers zero elements"),
            InvalidRange::AddressOverflow(start, count) => write!(
                f,
                "{count} elements starting at {start} run past the end of the u16 address space"
            ),
            InvalidRange::CountTooLargeForType(count, max) => write!(
                f,
                "a count of {count} is more than the {max} this register type allows"
            ),
        }
    }
}

/// Errors produced by data area operations
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The register kind is already at its maximum count
    CapacityExceeded,
    /// A register with the same address already exists for this kind
    DuplicateAddress,
    /// No register exists at the requested address
    NotFound,
    /// The requested interval is empty, too long, or not fully populated
    OutOfRange,
    /// The value pattern does not apply to this register kind
    InvalidGenerationPattern,
}

impl std::error::Error for StorageError {}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            StorageError::CapacityExceeded => {
                f.write_str("register kind is already at its maximum count")
            }
            StorageError::DuplicateAddress => {
                f.write_str("a register with the same address already exists for this kind")
            }
            StorageError::NotFound => f.write_str("no register exists at the requested address"),
            StorageError::OutOfRange => {
                f.write_str("requested interval is empty, too long, or not fully populated")
            }
            StorageError::InvalidGenerationPattern => {
                f.write_str("value pattern does not apply to this register kind")
            }
        }
    }
}

/// Errors that indicate a bug in the library rather than bad input
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InternalError {
    /// A response outgrew the buffer reserved for it
    InsufficientWriteSpace,
    /// A read asked for more buffered bytes than are held
    InsufficientBytesForRead(usize, usize),
}

impl std::error::Error for InternalError {}

impl Display for InternalError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            InternalError::InsufficientWriteSpace => {
                f.write_str("a response outgrew its buffer")
            }
            InternalError::InsufficientBytesForRead(requested, remaining) => write!(
                f,
                "needed {requested} buffered bytes but only {remaining} are available"
            ),
        }
    }
}

/// Top-level error type for requests made through the transport layer
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// An I/O error occurred on the underlying stream
    Io(std::io::ErrorKind),
    /// A frame-level parsing error occurred
    BadFrame(FrameParseError),
    /// A PDU-level parsing error occurred
    BadAdu(AduParseError),
    /// The request parameters form an invalid range
    BadRange(InvalidRange),
    /// The server responded with a Modbus exception
    Exception(ExceptionCode),
    /// An internal buffer operation failed
    Internal(InternalError),
    /// The task serving the connection has shut down
    Shutdown,
}

impl std::error::Error for RequestError {}

impl Display for RequestError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            RequestError::Io(kind) => write!(f, "i/o error: {kind:?}"),
            RequestError::BadFrame(err) => write!(f, "{err}"),
            RequestError::BadAdu(err) => write!(f, "{err}"),
            RequestError::BadRange(err) => write!(f, "{err}"),
            RequestError::Exception(ex) => write!(f, "modbus exception: {ex}"),
            RequestError::Internal(err) => write!(f, "{err}"),
            RequestError::Shutdown => f.write_str("the task serving the connection has shut down"),
        }
    }
}

impl From<std::io::Error> for RequestError {
    fn from(err: std::io::Error) -> Self {
        RequestError::Io(err.kind())
    }
}

impl From<FrameParseError> for RequestError {
    fn from(err: FrameParseError) -> Self {
        RequestError::BadFrame(err)
    }
}

impl From<AduParseError> for RequestError {
    fn from(err: AduParseError) -> Self {
        RequestError::BadAdu(err)
    }
}

impl From<InvalidRange> for RequestError {
    fn from(err: InvalidRange) -> Self {
        RequestError::BadRange(err)
    }
}

impl From<ExceptionCode> for RequestError {
    fn from(ex: ExceptionCode) -> Self {
        RequestError::Exception(ex)
    }
}

impl From<InternalError> for RequestError {
    fn from(err: InternalError) -> Self {
        RequestError::Internal(err)
    }
}

impl From<scursor::ReadError> for RequestError {
    fn from(_: scursor::ReadError) -> Self {
        RequestError::BadAdu(AduParseError::InsufficientBytes)
    }
}

impl From<scursor::WriteError> for RequestError {
    fn from(_: scursor::WriteError) -> Self {
        RequestError::Internal(InternalError::InsufficientWriteSpace)
    }
}

impl From<scursor::TrailingBytes> for RequestError {
    fn from(_: scursor::TrailingBytes) -> Self {
        RequestError::BadAdu(AduParseError::TrailingBytes)
    }
}
