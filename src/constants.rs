/// the two u16 encodings Write Single Coil accepts as a coil state
pub mod coil {
    /// Wire value that sets a coil
    pub const ON: u16 = 0xFF00;
    /// Wire value that clears a coil
    pub const OFF: u16 = 0x0000;
}

/// per-function quantity ceilings; a request past one of these draws an
/// IllegalDataValue exception
pub mod limits {
    /// Most coils or discrete inputs one read may ask for (2000)
    pub const MAX_READ_COILS_COUNT: u16 = 0x07D0;
    /// Most holding or input registers one read may ask for (125)
    pub const MAX_READ_REGISTERS_COUNT: u16 = 0x007D;
    /// Most coils Write Multiple Coils may carry (1968)
    pub const MAX_WRITE_COILS_COUNT: u16 = 0x07B0;
    /// Most registers Write Multiple Registers may carry (123)
    pub const MAX_WRITE_REGISTERS_COUNT: u16 = 0x007B;
}

/// how many registers of each kind a single data area may hold
pub mod capacity {
    /// Maximum number of coils in a data area
    pub const MAX_COILS: usize = 2000;
    /// Maximum number of discrete inputs in a data area
    pub const MAX_DISCRETE_INPUTS: usize = 2000;
    /// Maximum number of holding registers in a data area
    pub const MAX_HOLDING_REGISTERS: usize = 125;
    /// Maximum number of input registers in a data area
    pub const MAX_INPUT_REGISTERS: usize = 125;
}

/// sizes related to MBAP framing on TCP
pub mod mbap {
    /// Length of the fixed MBAP header
    pub const HEADER_LENGTH: usize = 7;
    /// Maximum length of a PDU (function code + data)
    pub const MAX_PDU_LENGTH: usize = 253;
    /// Maximum length of a complete frame (header + PDU)
    pub const MAX_FRAME_LENGTH: usize = HEADER_LENGTH + MAX_PDU_LENGTH;
    /// Maximum value of the MBAP length field, which counts the unit id byte
    pub const MAX_LENGTH_FIELD: usize = MAX_PDU_LENGTH + 1;
}

/// Default Modbus TCP port
pub const DEFAULT_PORT: u16 = 502;
