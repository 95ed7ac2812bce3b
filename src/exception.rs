/// Exception codes a server may place in the second byte of an exception
/// response.
///
/// Codes `0x01` through `0x04` are the ones this crate's engine produces;
/// the remainder exist so that a client can name whatever a foreign server
/// sends back.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Ord, Eq)]
pub enum ExceptionCode {
    /// `0x01`, the server does not implement the requested function code
    IllegalFunction,
    /// `0x02`, the request touches an address the server does not hold
    IllegalDataAddress,
    /// `0x03`, a quantity, byte count, or value field is outside what the
    /// function allows
    IllegalDataValue,
    /// `0x04`, the server failed partway through an otherwise valid request
    ServerDeviceFailure,
    /// `0x05`, the request was taken on but will finish later; used with
    /// programming commands
    Acknowledge,
    /// `0x06`, the server is tied up with a long-running command and the
    /// client should retry
    ServerDeviceBusy,
    /// `0x08`, a record-file access detected corrupt memory
    MemoryParityError,
    /// `0x0A`, a gateway had no free path between its ports for the request
    GatewayPathUnavailable,
    /// `0x0B`, a gateway forwarded the request but the target stayed silent
    GatewayTargetDeviceFailedToRespond,
    /// Anything outside the set the standard defines
    Unknown(u8),
}

impl From<u8> for ExceptionCode {
    fn from(value: u8) -> Self {
        match value {
            0x01 => ExceptionCode::IllegalFunction,
            0x02 => ExceptionCode::IllegalDataAddress,
            0x03 => ExceptionCode::IllegalDataValue,
            0x04 => ExceptionCode::ServerDeviceFailure,
            0x05 => ExceptionCode::Acknowledge,
            0x06 => ExceptionCode::ServerDeviceBusy,
            0x08 => ExceptionCode::MemoryParityError,
            0x0A => ExceptionCode::GatewayPathUnavailable,
            0x0B => ExceptionCode::GatewayTargetDeviceFailedToRespond,
            other => ExceptionCode::Unknown(other),
        }
    }
}

impl From<ExceptionCode> for u8 {
    fn from(code: ExceptionCode) -> Self {
        match code {
            ExceptionCode::IllegalFunction => 0x01,
            ExceptionCode::IllegalDataAddress => 0x02,
            ExceptionCode::IllegalDataValue => 0x03,
            ExceptionCode::ServerDeviceFailure => 0x04,
            ExceptionCode::Acknowledge => 0x05,
            ExceptionCode::ServerDeviceBusy => 0x06,
            ExceptionCode::MemoryParityError => 0x08,
            ExceptionCode::GatewayPathUnavailable => 0x0A,
            ExceptionCode::GatewayTargetDeviceFailedToRespond => 0x0B,
            ExceptionCode::Unknown(raw) => raw,
        }
    }
}

impl std::error::Error for ExceptionCode {}

impl std::fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        match self {
            ExceptionCode::IllegalFunction => {
                f.write_str("the requested function code is not supported")
            }
            ExceptionCode::IllegalDataAddress => {
                f.write_str("the requested data address is not held by the server")
            }
            ExceptionCode::IllegalDataValue => {
                f.write_str("a request field holds a value the server cannot accept")
            }
            ExceptionCode::ServerDeviceFailure => {
                f.write_str("the server failed while carrying out the request")
            }
            ExceptionCode::Acknowledge => {
                f.write_str("the request was accepted and is still in progress")
            }
            ExceptionCode::ServerDeviceBusy => {
                f.write_str("the server is busy with a long-running command, retry later")
            }
            ExceptionCode::MemoryParityError => {
                f.write_str("the server detected corrupt memory during a record-file access")
            }
            ExceptionCode::GatewayPathUnavailable => {
                f.write_str("no gateway path was available to reach the target")
            }
            ExceptionCode::GatewayTargetDeviceFailedToRespond => {
                f.write_str("the target device behind the gateway never responded")
            }
            ExceptionCode::Unknown(code) => {
                write!(f, "exception code {code:#04X} is not defined by the standard")
            }
        }
    }
}
