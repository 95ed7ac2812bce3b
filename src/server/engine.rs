use scursor::{ReadCursor, WriteCursor};

use crate::common::bits::num_bytes_for_bits;
use crate::common::function::FunctionCode;
use crate::constants::mbap;
use crate::data::{DataArea, Register};
use crate::error::{AduParseError, InvalidRange, RequestError, StorageError};
use crate::exception::ExceptionCode;
use crate::types::{coil_to_u16, AddressRange, BitIterator, Indexed, RegisterIterator};

/// Transform a request PDU into a response PDU against `area`.
///
/// Every failure is reported in-band as an exception PDU; nothing propagates
/// to the caller. The only input without a response is an empty PDU, which
/// carries no function code to echo and yields `None`.
pub fn process(pdu: &[u8], area: &DataArea) -> Option<Vec<u8>> {
    let mut cursor = ReadCursor::new(pdu);
    let raw = cursor.read_u8().ok()?;

    let function = match FunctionCode::get(raw) {
        Some(x) => x,
        None => {
            tracing::warn!("request carried unsupported function code {raw:#04X}");
            return Some(exception_pdu(raw, ExceptionCode::IllegalFunction));
        }
    };

    let request = match Request::parse(function, &mut cursor) {
        Ok(request) => request,
        Err(err) => {
            tracing::warn!("rejecting {function} request: {err}");
            return Some(exception_pdu(raw, reject_code(err)));
        }
    };

    match request.execute(area) {
        Ok(response) => Some(response),
        Err(ex) => Some(exception_pdu(raw, ex)),
    }
}

/// The two-byte exception PDU every error path funnels through
pub(crate) fn exception_pdu(function: u8, code: ExceptionCode) -> Vec<u8> {
    vec![function | 0x80, code.into()]
}

// quantity and value problems are value errors, a range whose arithmetic
// escapes the address space is an addressing error
fn reject_code(err: RequestError) -> ExceptionCode {
    match err {
        RequestError::BadRange(InvalidRange::AddressOverflow(_, _)) => {
            ExceptionCode::IllegalDataAddress
        }
        _ => ExceptionCode::IllegalDataValue,
    }
}

fn storage_exception(err: StorageError) -> ExceptionCode {
    match err {
        StorageError::NotFound | StorageError::OutOfRange => ExceptionCode::IllegalDataAddress,
        StorageError::CapacityExceeded
        | StorageError::DuplicateAddress
        | StorageError::InvalidGenerationPattern => ExceptionCode::ServerDeviceFailure,
    }
}

pub(crate) struct WriteCoils<'a> {
    pub(crate) range: AddressRange,
    pub(crate) iterator: BitIterator<'a>,
}

pub(crate) struct WriteRegisters<'a> {
    pub(crate) range: AddressRange,
    pub(crate) iterator: RegisterIterator<'a>,
}

pub(crate) enum Request<'a> {
    ReadCoils(AddressRange),
    ReadDiscreteInputs(AddressRange),
    ReadHoldingRegisters(AddressRange),
    ReadInputRegisters(AddressRange),
    WriteSingleCoil(Indexed<bool>),
    WriteSingleRegister(Indexed<u16>),
    WriteMultipleCoils(WriteCoils<'a>),
    WriteMultipleRegisters(WriteRegisters<'a>),
}

impl<'a> Request<'a> {
    pub(crate) fn parse(
        function: FunctionCode,
        cursor: &mut ReadCursor<'a>,
    ) -> Result<Self, RequestError> {
        match function {
            FunctionCode::ReadCoils => {
                let (start, count) = AddressRange::parse(cursor)?;
                let range = AddressRange::of_read_bits(start, count)?;
                cursor.expect_empty()?;
                Ok(Request::ReadCoils(range))
            }
            FunctionCode::ReadDiscreteInputs => {
                let (start, count) = AddressRange::parse(cursor)?;
                let range = AddressRange::of_read_bits(start, count)?;
                cursor.expect_empty()?;
                Ok(Request::ReadDiscreteInputs(range))
            }
            FunctionCode::ReadHoldingRegisters => {
                let (start, count) = AddressRange::parse(cursor)?;
                let range = AddressRange::of_read_registers(start, count)?;
                cursor.expect_empty()?;
                Ok(Request::ReadHoldingRegisters(range))
            }
            FunctionCode::ReadInputRegisters => {
                let (start, count) = AddressRange::parse(cursor)?;
                let range = AddressRange::of_read_registers(start, count)?;
                cursor.expect_empty()?;
                Ok(Request::ReadInputRegisters(range))
            }
            FunctionCode::WriteSingleCoil => {
                let value = Indexed::<bool>::parse(cursor)?;
                cursor.expect_empty()?;
                Ok(Request::WriteSingleCoil(value))
            }
            FunctionCode::WriteSingleRegister => {
                let value = Indexed::<u16>::parse(cursor)?;
                cursor.expect_empty()?;
                Ok(Request::WriteSingleRegister(value))
            }
            FunctionCode::WriteMultipleCoils => {
                let (start, count) = AddressRange::parse(cursor)?;
                let range = AddressRange::of_write_bits(start, count)?;
                let byte_count = cursor.read_u8()? as usize;
                let expected = num_bytes_for_bits(range.count);
                if byte_count != expected {
                    return Err(AduParseError::ByteCountMismatch(expected, byte_count).into());
                }
                let iterator = BitIterator::parse_all(range, cursor)?;
                Ok(Request::WriteMultipleCoils(WriteCoils { range, iterator }))
            }
            FunctionCode::WriteMultipleRegisters => {
                let (start, count) = AddressRange::parse(cursor)?;
                let range = AddressRange::of_write_registers(start, count)?;
                let byte_count = cursor.read_u8()? as usize;
                let expected = 2 * (range.count as usize);
                if byte_count != expected {
                    return Err(AduParseError::ByteCountMismatch(expected, byte_count).into());
                }
                let iterator = RegisterIterator::parse_all(range, cursor)?;
                Ok(Request::WriteMultipleRegisters(WriteRegisters {
                    range,
                    iterator,
                }))
            }
        }
    }

    pub(crate) fn execute(self, area: &DataArea) -> Result<Vec<u8>, ExceptionCode> {
        match self {
            Request::ReadCoils(range) => {
                let registers = area
                    .coil_range(range.start, range.count)
                    .map_err(storage_exception)?;
                bit_response(FunctionCode::ReadCoils, &registers)
            }
            Request::ReadDiscreteInputs(range) => {
                let registers = area
                    .discrete_input_range(range.start, range.count)
                    .map_err(storage_exception)?;
                bit_response(FunctionCode::ReadDiscreteInputs, &registers)
            }
            Request::ReadHoldingRegisters(range) => {
                let registers = area
                    .holding_register_range(range.start, range.count)
                    .map_err(storage_exception)?;
                register_response(FunctionCode::ReadHoldingRegisters, &registers)
            }
            Request::ReadInputRegisters(range) => {
                let registers = area
                    .input_register_range(range.start, range.count)
                    .map_err(storage_exception)?;
                register_response(FunctionCode::ReadInputRegisters, &registers)
            }
            Request::WriteSingleCoil(request) => {
                area.set_coil(request.index, request.value)
                    .map_err(storage_exception)?;
                echo_response(
                    FunctionCode::WriteSingleCoil,
                    request.index,
                    coil_to_u16(request.value),
                )
            }
            Request::WriteSingleRegister(request) => {
                area.set_holding_register(request.index, request.value)
                    .map_err(storage_exception)?;
                echo_response(
                    FunctionCode::WriteSingleRegister,
                    request.index,
                    request.value,
                )
            }
            Request::WriteMultipleCoils(write) => {
                let values: Vec<bool> = write.iterator.map(|x| x.value).collect();
                area.set_coil_range(write.range.start, &values)
                    .map_err(storage_exception)?;
                echo_response(
                    FunctionCode::WriteMultipleCoils,
                    write.range.start,
                    write.range.count,
                )
            }
            Request::WriteMultipleRegisters(write) => {
                let values: Vec<u16> = write.iterator.map(|x| x.value).collect();
                area.set_holding_register_range(write.range.start, &values)
                    .map_err(storage_exception)?;
                echo_response(
                    FunctionCode::WriteMultipleRegisters,
                    write.range.start,
                    write.range.count,
                )
            }
        }
    }
}

// a serialization failure after validation would mean the response cannot be
// represented, which the wire can only express as a server failure
fn write_pdu<F>(write: F) -> Result<Vec<u8>, ExceptionCode>
where
    F: FnOnce(&mut WriteCursor) -> Result<(), RequestError>,
{
    let mut buffer = [0u8; mbap::MAX_PDU_LENGTH];
    let mut cursor = WriteCursor::new(&mut buffer);
    write(&mut cursor).map_err(|_| ExceptionCode::ServerDeviceFailure)?;
    let length = cursor.position();
    Ok(buffer[..length].to_vec())
}

fn bit_response(
    function: FunctionCode,
    registers: &[Register<bool>],
) -> Result<Vec<u8>, ExceptionCode> {
    write_pdu(|cursor| {
        cursor.write_u8(function.get_value())?;
        cursor.write_u8(num_bytes_for_bits(registers.len() as u16) as u8)?;

        // accumulate bits LSB-first, flushing each full byte
        let mut acc: u8 = 0;
        let mut num_bits: usize = 0;
        for register in registers {
            if register.value {
                acc |= 1 << num_bits;
            }
            num_bits += 1;
            if num_bits == 8 {
                cursor.write_u8(acc)?;
                acc = 0;
                num_bits = 0;
            }
        }
        if num_bits > 0 {
            cursor.write_u8(acc)?;
        }
        Ok(())
    })
}

fn register_response(
    function: FunctionCode,
    registers: &[Register<u16>],
) -> Result<Vec<u8>, ExceptionCode> {
    write_pdu(|cursor| {
        cursor.write_u8(function.get_value())?;
        cursor.write_u8(2 * registers.len() as u8)?;
        for register in registers {
            cursor.write_u16_be(register.value)?;
        }
        Ok(())
    })
}

fn echo_response(function: FunctionCode, first: u16, second: u16) -> Result<Vec<u8>, ExceptionCode> {
    write_pdu(|cursor| {
        cursor.write_u8(function.get_value())?;
        cursor.write_u16_be(first)?;
        cursor.write_u16_be(second)?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ValuePattern;

    // ten of each kind at addresses 0..9, booleans true, integers one
    fn test_area() -> DataArea {
        let area = DataArea::new();
        area.generate_coils(0, 10, ValuePattern::Ones).unwrap();
        area.generate_discrete_inputs(0, 10, ValuePattern::Ones)
            .unwrap();
        area.generate_holding_registers(0, 10, ValuePattern::Ones)
            .unwrap();
        area.generate_input_registers(0, 10, ValuePattern::Ones)
            .unwrap();
        area
    }

    fn respond(area: &DataArea, request: &[u8]) -> Vec<u8> {
        process(request, area).unwrap()
    }

    #[test]
    fn reads_eight_coils_into_a_single_byte() {
        let area = test_area();
        assert_eq!(
            respond(&area, &[0x01, 0x00, 0x01, 0x00, 0x08]),
            vec![0x01, 0x01, 0xFF]
        );
    }

    #[test]
    fn reads_nine_coils_into_two_bytes() {
        let area = test_area();
        assert_eq!(
            respond(&area, &[0x01, 0x00, 0x01, 0x00, 0x09]),
            vec![0x01, 0x02, 0xFF, 0x01]
        );
    }

    #[test]
    fn reads_a_single_coil() {
        let area = test_area();
        assert_eq!(
            respond(&area, &[0x01, 0x00, 0x01, 0x00, 0x01]),
            vec![0x01, 0x01, 0x01]
        );
    }

    #[test]
    fn read_of_unpopulated_coils_is_an_address_exception() {
        let area = test_area();
        assert_eq!(
            respond(&area, &[0x01, 0x00, 0x0F, 0x00, 0x0A]),
            vec![0x81, 0x02]
        );
    }

    #[test]
    fn reads_discrete_inputs() {
        let area = test_area();
        assert_eq!(
            respond(&area, &[0x02, 0x00, 0x00, 0x00, 0x0A]),
            vec![0x02, 0x02, 0xFF, 0x03]
        );
    }

    #[test]
    fn reads_holding_registers() {
        let area = test_area();
        let mut expected = vec![0x03, 0x14];
        for _ in 0..10 {
            expected.extend_from_slice(&[0x00, 0x01]);
        }
        assert_eq!(respond(&area, &[0x03, 0x00, 0x00, 0x00, 0x0A]), expected);
    }

    #[test]
    fn reads_input_registers() {
        let area = test_area();
        assert_eq!(
            respond(&area, &[0x04, 0x00, 0x08, 0x00, 0x02]),
            vec![0x04, 0x04, 0x00, 0x01, 0x00, 0x01]
        );
    }

    #[test]
    fn write_single_register_is_echoed_and_visible_to_reads() {
        let area = test_area();
        assert_eq!(
            respond(&area, &[0x06, 0x00, 0x01, 0xAB, 0xCD]),
            vec![0x06, 0x00, 0x01, 0xAB, 0xCD]
        );
        assert_eq!(
            respond(&area, &[0x03, 0x00, 0x01, 0x00, 0x01]),
            vec![0x03, 0x02, 0xAB, 0xCD]
        );
    }

    #[test]
    fn write_single_coil_accepts_only_the_two_defined_states() {
        let area = test_area();
        assert_eq!(
            respond(&area, &[0x05, 0x00, 0x01, 0x12, 0x34]),
            vec![0x85, 0x03]
        );
        assert_eq!(
            respond(&area, &[0x05, 0x00, 0x01, 0x00, 0x00]),
            vec![0x05, 0x00, 0x01, 0x00, 0x00]
        );
        assert_eq!(
            respond(&area, &[0x01, 0x00, 0x01, 0x00, 0x01]),
            vec![0x01, 0x01, 0x00]
        );
        assert_eq!(
            respond(&area, &[0x05, 0x00, 0x01, 0xFF, 0x00]),
            vec![0x05, 0x00, 0x01, 0xFF, 0x00]
        );
        assert_eq!(
            respond(&area, &[0x01, 0x00, 0x01, 0x00, 0x01]),
            vec![0x01, 0x01, 0x01]
        );
    }

    #[test]
    fn writes_to_absent_addresses_are_address_exceptions() {
        let area = test_area();
        assert_eq!(
            respond(&area, &[0x05, 0x00, 0x64, 0xFF, 0x00]),
            vec![0x85, 0x02]
        );
        assert_eq!(
            respond(&area, &[0x06, 0x00, 0x64, 0x00, 0x01]),
            vec![0x86, 0x02]
        );
    }

    #[test]
    fn unknown_function_codes_are_rejected() {
        let area = test_area();
        assert_eq!(respond(&area, &[0x2B, 0x0E, 0x01, 0x00]), vec![0xAB, 0x01]);
        assert_eq!(respond(&area, &[0x07]), vec![0x87, 0x01]);
    }

    #[test]
    fn empty_pdu_yields_no_response() {
        let area = test_area();
        assert_eq!(process(&[], &area), None);
    }

    #[test]
    fn zero_quantity_reads_are_value_exceptions() {
        let area = test_area();
        for function in [0x01, 0x02, 0x03, 0x04] {
            assert_eq!(
                respond(&area, &[function, 0x00, 0x00, 0x00, 0x00]),
                vec![function | 0x80, 0x03]
            );
        }
    }

    #[test]
    fn oversized_quantities_are_value_exceptions() {
        let area = test_area();
        // 2001 coils
        assert_eq!(
            respond(&area, &[0x01, 0x00, 0x00, 0x07, 0xD1]),
            vec![0x81, 0x03]
        );
        // 126 registers
        assert_eq!(
            respond(&area, &[0x03, 0x00, 0x00, 0x00, 0x7E]),
            vec![0x83, 0x03]
        );
    }

    #[test]
    fn truncated_requests_are_value_exceptions() {
        let area = test_area();
        assert_eq!(respond(&area, &[0x01, 0x00, 0x01]), vec![0x81, 0x03]);
        assert_eq!(respond(&area, &[0x06, 0x00]), vec![0x86, 0x03]);
    }

    #[test]
    fn trailing_bytes_are_value_exceptions() {
        let area = test_area();
        assert_eq!(
            respond(&area, &[0x01, 0x00, 0x01, 0x00, 0x01, 0xFF]),
            vec![0x81, 0x03]
        );
    }

    #[test]
    fn range_that_overflows_the_address_space_is_an_address_exception() {
        let area = test_area();
        assert_eq!(
            respond(&area, &[0x01, 0xFF, 0xFF, 0x00, 0x02]),
            vec![0x81, 0x02]
        );
    }

    #[test]
    fn reading_the_full_coil_space_fills_the_largest_pdu() {
        let area = DataArea::new();
        area.generate_coils(0, 2000, ValuePattern::Ones).unwrap();

        let response = respond(&area, &[0x01, 0x00, 0x00, 0x07, 0xD0]);
        assert_eq!(response.len(), 252);
        assert_eq!(response[0], 0x01);
        assert_eq!(response[1], 250);
        assert!(response[2..].iter().all(|b| *b == 0xFF));
    }

    #[test]
    fn reading_the_full_register_space_fills_the_largest_pdu() {
        let area = DataArea::new();
        area.generate_holding_registers(0, 125, ValuePattern::Max)
            .unwrap();

        let response = respond(&area, &[0x03, 0x00, 0x00, 0x00, 0x7D]);
        assert_eq!(response.len(), 252);
        assert_eq!(response[0], 0x03);
        assert_eq!(response[1], 250);
        assert!(response[2..].iter().all(|b| *b == 0xFF));
    }

    #[test]
    fn writes_the_maximum_coil_quantity_but_not_one_more() {
        let area = DataArea::new();
        area.generate_coils(0, 2000, ValuePattern::Zeros).unwrap();

        // 1968 coils is 246 data bytes
        let mut request = vec![0x0F, 0x00, 0x00, 0x07, 0xB0, 0xF6];
        request.extend_from_slice(&[0xFF; 246]);
        assert_eq!(
            respond(&area, &request),
            vec![0x0F, 0x00, 0x00, 0x07, 0xB0]
        );
        assert!(area.coil(1967).unwrap().value);
        assert!(!area.coil(1968).unwrap().value);

        let mut request = vec![0x0F, 0x00, 0x00, 0x07, 0xB1, 0xF7];
        request.extend_from_slice(&[0xFF; 247]);
        assert_eq!(respond(&area, &request), vec![0x8F, 0x03]);
    }

    #[test]
    fn write_multiple_coils_round_trips_the_bit_order() {
        let area = test_area();
        // 0x05 = coils 0 and 2 on, LSB-first
        assert_eq!(
            respond(&area, &[0x0F, 0x00, 0x00, 0x00, 0x03, 0x01, 0x05]),
            vec![0x0F, 0x00, 0x00, 0x00, 0x03]
        );
        assert_eq!(
            respond(&area, &[0x01, 0x00, 0x00, 0x00, 0x03]),
            vec![0x01, 0x01, 0x05]
        );
    }

    #[test]
    fn write_multiple_coils_validates_the_byte_count() {
        let area = test_area();
        // eight coils require one byte, two declared
        assert_eq!(
            respond(&area, &[0x0F, 0x00, 0x00, 0x00, 0x08, 0x02, 0xFF, 0xFF]),
            vec![0x8F, 0x03]
        );
        // declared byte missing from the body
        assert_eq!(
            respond(&area, &[0x0F, 0x00, 0x00, 0x00, 0x08, 0x01]),
            vec![0x8F, 0x03]
        );
        // body longer than declared
        assert_eq!(
            respond(&area, &[0x0F, 0x00, 0x00, 0x00, 0x08, 0x01, 0xFF, 0xFF]),
            vec![0x8F, 0x03]
        );
    }

    #[test]
    fn write_multiple_coils_to_a_partially_absent_range_changes_nothing() {
        let area = test_area();
        assert_eq!(
            respond(&area, &[0x0F, 0x00, 0x05, 0x00, 0x0A, 0x02, 0x00, 0x00]),
            vec![0x8F, 0x02]
        );
        assert!(area.coil(5).unwrap().value);
    }

    #[test]
    fn write_multiple_registers_round_trips() {
        let area = test_area();
        assert_eq!(
            respond(
                &area,
                &[0x10, 0x00, 0x00, 0x00, 0x02, 0x04, 0x01, 0x02, 0x03, 0x04]
            ),
            vec![0x10, 0x00, 0x00, 0x00, 0x02]
        );
        assert_eq!(
            respond(&area, &[0x03, 0x00, 0x00, 0x00, 0x02]),
            vec![0x03, 0x04, 0x01, 0x02, 0x03, 0x04]
        );
    }

    #[test]
    fn write_multiple_registers_validates_the_byte_count() {
        let area = test_area();
        assert_eq!(
            respond(&area, &[0x10, 0x00, 0x00, 0x00, 0x02, 0x03, 0x01, 0x02, 0x03]),
            vec![0x90, 0x03]
        );
    }

    #[test]
    fn write_multiple_registers_beyond_the_area_is_an_address_exception() {
        let area = test_area();
        assert_eq!(
            respond(
                &area,
                &[0x10, 0x00, 0x09, 0x00, 0x02, 0x04, 0x01, 0x02, 0x03, 0x04]
            ),
            vec![0x90, 0x02]
        );
        assert_eq!(area.holding_register(9).unwrap().value, 1);
    }

    #[test]
    fn every_response_fits_within_the_pdu_budget() {
        let area = DataArea::new();
        area.generate_coils(0, 2000, ValuePattern::Random).unwrap();
        area.generate_holding_registers(0, 125, ValuePattern::Random)
            .unwrap();

        for request in [
            vec![0x01, 0x00, 0x00, 0x07, 0xD0],
            vec![0x03, 0x00, 0x00, 0x00, 0x7D],
            vec![0x2B, 0x00],
        ] {
            assert!(respond(&area, &request).len() <= mbap::MAX_PDU_LENGTH);
        }
    }
}
