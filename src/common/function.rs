use std::fmt::{Display, Formatter};

/// The eight function codes the engine implements. Anything else on the wire
/// is answered with an IllegalFunction exception.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum FunctionCode {
    ReadCoils = 0x01,
    ReadDiscreteInputs = 0x02,
    ReadHoldingRegisters = 0x03,
    ReadInputRegisters = 0x04,
    WriteSingleCoil = 0x05,
    WriteSingleRegister = 0x06,
    WriteMultipleCoils = 0x0F,
    WriteMultipleRegisters = 0x10,
}

impl FunctionCode {
    pub(crate) const fn get_value(self) -> u8 {
        self as u8
    }

    pub(crate) const fn as_error(self) -> u8 {
        self.get_value() | 0x80
    }

    pub(crate) fn get(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(FunctionCode::ReadCoils),
            0x02 => Some(FunctionCode::ReadDiscreteInputs),
            0x03 => Some(FunctionCode::ReadHoldingRegisters),
            0x04 => Some(FunctionCode::ReadInputRegisters),
            0x05 => Some(FunctionCode::WriteSingleCoil),
            0x06 => Some(FunctionCode::WriteSingleRegister),
            0x0F => Some(FunctionCode::WriteMultipleCoils),
            0x10 => Some(FunctionCode::WriteMultipleRegisters),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            FunctionCode::ReadCoils => "Read Coils",
            FunctionCode::ReadDiscreteInputs => "Read Discrete Inputs",
            FunctionCode::ReadHoldingRegisters => "Read Holding Registers",
            FunctionCode::ReadInputRegisters => "Read Input Registers",
            FunctionCode::WriteSingleCoil => "Write Single Coil",
            FunctionCode::WriteSingleRegister => "Write Single Register",
            FunctionCode::WriteMultipleCoils => "Write Multiple Coils",
            FunctionCode::WriteMultipleRegisters => "Write Multiple Registers",
        }
    }
}

impl Display for FunctionCode {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        write!(f, "{} ({:#04X})", self.name(), self.get_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_all_supported_codes() {
        for raw in [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x0F, 0x10] {
            assert_eq!(FunctionCode::get(raw).unwrap().get_value(), raw);
        }
    }

    #[test]
    fn rejects_unsupported_codes() {
        assert_eq!(FunctionCode::get(0x00), None);
        assert_eq!(FunctionCode::get(0x07), None);
        assert_eq!(FunctionCode::get(0x2B), None);
    }

    #[test]
    fn error_code_sets_the_high_bit() {
        assert_eq!(FunctionCode::ReadCoils.as_error(), 0x81);
        assert_eq!(FunctionCode::WriteMultipleRegisters.as_error(), 0x90);
    }
}
