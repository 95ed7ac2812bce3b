//! Thin Modbus TCP client: one request in flight at a time, one method per
//! supported function code.

use std::net::SocketAddr;

use scursor::{ReadCursor, WriteCursor};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::common::bits::num_bytes_for_bits;
use crate::common::frame::{FramedReader, MbapHeader};
use crate::common::function::FunctionCode;
use crate::constants::{limits, mbap};
use crate::error::{AduParseError, InvalidRange, RequestError};
use crate::exception::ExceptionCode;
use crate::types::{
    coil_to_u16, AddressRange, BitIterator, Indexed, RegisterIterator, TxId, UnitId,
};

/// A connected Modbus TCP client.
///
/// Each request writes one frame and waits for the matching response; the
/// transaction identifier of every reply is checked against the request.
pub struct Client {
    io: TcpStream,
    unit_id: UnitId,
    tx_id: TxId,
    reader: FramedReader,
}

impl Client {
    /// Connect to a server and address all requests to `unit_id`
    pub async fn connect(addr: SocketAddr, unit_id: UnitId) -> Result<Self, RequestError> {
        let io = TcpStream::connect(addr).await?;
        Ok(Self {
            io,
            unit_id,
            tx_id: TxId::default(),
            reader: FramedReader::new(),
        })
    }

    /// Read a range of coils
    pub async fn read_coils(
        &mut self,
        range: AddressRange,
    ) -> Result<Vec<Indexed<bool>>, RequestError> {
        let range = AddressRange::of_read_bits(range.start, range.count)?;
        let body = self
            .transact(FunctionCode::ReadCoils, |cursor| {
                cursor.write_u16_be(range.start)?;
                cursor.write_u16_be(range.count)?;
                Ok(())
            })
            .await?;
        parse_bits(range, &body)
    }

    /// Read a range of discrete inputs
    pub async fn read_discrete_inputs(
        &mut self,
        range: AddressRange,
    ) -> Result<Vec<Indexed<bool>>, RequestError> {
        let range = AddressRange::of_read_bits(range.start, range.count)?;
        let body = self
            .transact(FunctionCode::ReadDiscreteInputs, |cursor| {
                cursor.write_u16_be(range.start)?;
                cursor.write_u16_be(range.count)?;
                Ok(())
            })
            .await?;
        parse_bits(range, &body)
    }

    /// Read a range of holding registers
    pub async fn read_holding_registers(
        &mut self,
        range: AddressRange,
    ) -> Result<Vec<Indexed<u16>>, RequestError> {
        let range = AddressRange::of_read_registers(range.start, range.count)?;
        let body = self
            .transact(FunctionCode::ReadHoldingRegisters, |cursor| {
                cursor.write_u16_be(range.start)?;
                cursor.write_u16_be(range.count)?;
                Ok(())
            })
            .await?;
        parse_registers(range, &body)
    }

    /// Read a range of input registers
    pub async fn read_input_registers(
        &mut self,
        range: AddressRange,
    ) -> Result<Vec<Indexed<u16>>, RequestError> {
        let range = AddressRange::of_read_registers(range.start, range.count)?;
        let body = self
            .transact(FunctionCode::ReadInputRegisters, |cursor| {
                cursor.write_u16_be(range.start)?;
                cursor.write_u16_be(range.count)?;
                Ok(())
            })
            .await?;
        parse_registers(range, &body)
    }

    /// Write a single coil, returning the echoed value
    pub async fn write_single_coil(
        &mut self,
        request: Indexed<bool>,
    ) -> Result<Indexed<bool>, RequestError> {
        let body = self
            .transact(FunctionCode::WriteSingleCoil, |cursor| {
                cursor.write_u16_be(request.index)?;
                cursor.write_u16_be(coil_to_u16(request.value))?;
                Ok(())
            })
            .await?;

        let mut cursor = ReadCursor::new(&body);
        let echo = Indexed::<bool>::parse(&mut cursor)?;
        cursor.expect_empty()?;
        if echo != request {
            return Err(AduParseError::ReplyEchoMismatch.into());
        }
        Ok(echo)
    }

    /// Write a single holding register, returning the echoed value
    pub async fn write_single_register(
        &mut self,
        request: Indexed<u16>,
    ) -> Result<Indexed<u16>, RequestError> {
        let body = self
            .transact(FunctionCode::WriteSingleRegister, |cursor| {
                cursor.write_u16_be(request.index)?;
                cursor.write_u16_be(request.value)?;
                Ok(())
            })
            .await?;

        let mut cursor = ReadCursor::new(&body);
        let echo = Indexed::<u16>::parse(&mut cursor)?;
        cursor.expect_empty()?;
        if echo != request {
            return Err(AduParseError::ReplyEchoMismatch.into());
        }
        Ok(echo)
    }

    /// Write a run of coils starting at `start`, returning the acknowledged range
    pub async fn write_multiple_coils(
        &mut self,
        start: u16,
        values: &[bool],
    ) -> Result<AddressRange, RequestError> {
        let count = u16::try_from(values.len()).map_err(|_| {
            InvalidRange::CountTooLargeForType(u16::MAX, limits::MAX_WRITE_COILS_COUNT)
        })?;
        let range = AddressRange::of_write_bits(start, count)?;

        let body = self
            .transact(FunctionCode::WriteMultipleCoils, |cursor| {
                cursor.write_u16_be(range.start)?;
                cursor.write_u16_be(range.count)?;
                cursor.write_u8(num_bytes_for_bits(range.count) as u8)?;
                for chunk in values.chunks(8) {
                    let mut acc: u8 = 0;
                    for (pos, bit) in chunk.iter().enumerate() {
                        if *bit {
                            acc |= 1 << pos;
                        }
                    }
                    cursor.write_u8(acc)?;
                }
                Ok(())
            })
            .await?;

        Self::expect_range_ack(range, &body)?;
        Ok(range)
    }

    /// Write a run of holding registers starting at `start`, returning the
    /// acknowledged range
    pub async fn write_multiple_registers(
        &mut self,
        start: u16,
        values: &[u16],
    ) -> Result<AddressRange, RequestError> {
        let count = u16::try_from(values.len()).map_err(|_| {
            InvalidRange::CountTooLargeForType(u16::MAX, limits::MAX_WRITE_REGISTERS_COUNT)
        })?;
        let range = AddressRange::of_write_registers(start, count)?;

        let body = self
            .transact(FunctionCode::WriteMultipleRegisters, |cursor| {
                cursor.write_u16_be(range.start)?;
                cursor.write_u16_be(range.count)?;
                cursor.write_u8(2 * range.count as u8)?;
                for value in values {
                    cursor.write_u16_be(*value)?;
                }
                Ok(())
            })
            .await?;

        Self::expect_range_ack(range, &body)?;
        Ok(range)
    }

    // write one request frame and read back the PDU body of the matching reply
    async fn transact<F>(
        &mut self,
        function: FunctionCode,
        write_body: F,
    ) -> Result<Vec<u8>, RequestError>
    where
        F: FnOnce(&mut WriteCursor) -> Result<(), RequestError>,
    {
        let mut buffer = [0u8; mbap::MAX_PDU_LENGTH];
        let mut cursor = WriteCursor::new(&mut buffer);
        cursor.write_u8(function.get_value())?;
        write_body(&mut cursor)?;
        let length = cursor.position();

        let tx_id = self.tx_id.next();
        let header = MbapHeader::request(tx_id, self.unit_id, length);
        let mut frame = Vec::with_capacity(mbap::HEADER_LENGTH + length);
        frame.extend_from_slice(&header.serialize());
        frame.extend_from_slice(&buffer[..length]);
        self.io.write_all(&frame).await?;

        let reply = self.reader.next_frame(&mut self.io).await?;
        if reply.header.tx_id != tx_id || reply.header.unit_id != self.unit_id {
            return Err(AduParseError::ReplyEchoMismatch.into());
        }

        let payload = reply.payload();
        let code = *payload.first().ok_or(AduParseError::InsufficientBytes)?;
        let body = &payload[1..];

        if code == function.get_value() {
            return Ok(body.to_vec());
        }
        if code == function.as_error() {
            let raw = *body.first().ok_or(AduParseError::InsufficientBytes)?;
            return Err(RequestError::Exception(ExceptionCode::from(raw)));
        }
        Err(AduParseError::UnknownResponseFunction(
            code,
            function.get_value(),
            function.as_error(),
        )
        .into())
    }

    fn expect_range_ack(range: AddressRange, body: &[u8]) -> Result<(), RequestError> {
        let mut cursor = ReadCursor::new(body);
        let (start, count) = AddressRange::parse(&mut cursor)?;
        cursor.expect_empty()?;
        if start != range.start || count != range.count {
            return Err(AduParseError::ReplyEchoMismatch.into());
        }
        Ok(())
    }
}

fn parse_bits(range: AddressRange, body: &[u8]) -> Result<Vec<Indexed<bool>>, RequestError> {
    let mut cursor = ReadCursor::new(body);
    let expected = num_bytes_for_bits(range.count);
    let byte_count = cursor.read_u8()? as usize;
    if byte_count != expected {
        return Err(AduParseError::ByteCountMismatch(expected, byte_count).into());
    }
    Ok(BitIterator::parse_all(range, &mut cursor)?.collect())
}

fn parse_registers(range: AddressRange, body: &[u8]) -> Result<Vec<Indexed<u16>>, RequestError> {
    let mut cursor = ReadCursor::new(body);
    let expected = 2 * (range.count as usize);
    let byte_count = cursor.read_u8()? as usize;
    if byte_count != expected {
        return Err(AduParseError::ByteCountMismatch(expected, byte_count).into());
    }
    Ok(RegisterIterator::parse_all(range, &mut cursor)?.collect())
}
