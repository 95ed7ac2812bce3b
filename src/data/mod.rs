//! Thread-safe store of the four Modbus register kinds.
//!
//! A [`DataArea`] owns one address-sorted sequence per register kind. Every
//! operation takes the area's single mutex for the duration of the call, so
//! concurrent sessions observe a total order over reads and writes.

use std::sync::Mutex;

use crate::constants::{capacity, limits};
use crate::error::StorageError;

/// A register value and the address it lives at
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Register<T> {
    /// Address of the register within its kind's address space
    pub address: u16,
    /// Current value of the register
    pub value: T,
}

impl<T> Register<T> {
    /// Create a register from an address and a value
    pub fn new(address: u16, value: T) -> Self {
        Self { address, value }
    }
}

/// The four register kinds of the Modbus data model
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterKind {
    /// Discrete, writable 1-bit output
    Coil,
    /// Discrete, read-only 1-bit input
    DiscreteInput,
    /// 16-bit writable register
    HoldingRegister,
    /// 16-bit read-only register
    InputRegister,
}

impl RegisterKind {
    /// Table prefix used by the legacy address notation
    pub fn prefix(self) -> char {
        match self {
            RegisterKind::Coil => '0',
            RegisterKind::DiscreteInput => '1',
            RegisterKind::InputRegister => '3',
            RegisterKind::HoldingRegister => '4',
        }
    }

    /// Format an address in the legacy `<prefix>x<5-digit-decimal>` notation,
    /// e.g. `4x00010` for holding register 10
    pub fn legacy_address(self, address: u16) -> String {
        format!("{}x{:05}", self.prefix(), address)
    }

    /// Maximum number of registers of this kind a data area may hold
    pub fn max_registers(self) -> usize {
        match self {
            RegisterKind::Coil => capacity::MAX_COILS,
            RegisterKind::DiscreteInput => capacity::MAX_DISCRETE_INPUTS,
            RegisterKind::HoldingRegister => capacity::MAX_HOLDING_REGISTERS,
            RegisterKind::InputRegister => capacity::MAX_INPUT_REGISTERS,
        }
    }
}

impl std::fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RegisterKind::Coil => f.write_str("COIL"),
            RegisterKind::DiscreteInput => f.write_str("DISCRETE INPUT"),
            RegisterKind::HoldingRegister => f.write_str("HOLDING REGISTER"),
            RegisterKind::InputRegister => f.write_str("INPUT REGISTER"),
        }
    }
}

/// Value patterns accepted by the bulk generation operations.
///
/// Boolean kinds accept `Zeros`, `Ones`, and `Random`; the remaining patterns
/// only apply to 16-bit kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValuePattern {
    /// Every value is zero / false
    Zeros,
    /// Every value is one / true
    Ones,
    /// Values are drawn independently at random
    Random,
    /// Value equals the offset from the starting address
    Incremental,
    /// Value counts down from the requested quantity
    Decremental,
    /// Every value is the u16 maximum
    Max,
}

impl ValuePattern {
    fn register_value(self, count: u16, offset: u16) -> u16 {
        match self {
            ValuePattern::Zeros => 0,
            ValuePattern::Ones => 1,
            ValuePattern::Random => rand::random::<u16>(),
            ValuePattern::Incremental => offset,
            ValuePattern::Decremental => count - offset,
            ValuePattern::Max => u16::MAX,
        }
    }
}

#[derive(Default)]
struct AreaInner {
    coils: Vec<Register<bool>>,
    discrete_inputs: Vec<Register<bool>>,
    holding_registers: Vec<Register<u16>>,
    input_registers: Vec<Register<u16>>,
}

/// Thread-safe store of the four register kinds.
///
/// Constructed empty; registers are added by insertion or bulk generation and
/// are never removed. Each kind's sequence stays strictly ascending by address
/// and each (kind, address) pair is unique.
pub struct DataArea {
    inner: Mutex<AreaInner>,
}

impl DataArea {
    /// Create an empty data area
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(AreaInner::default()),
        }
    }

    /// Add a coil, keeping the sequence sorted by address
    pub fn insert_coil(&self, register: Register<bool>) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        insert_sorted(&mut inner.coils, capacity::MAX_COILS, register)
    }

    /// Add a discrete input, keeping the sequence sorted by address
    pub fn insert_discrete_input(&self, register: Register<bool>) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        insert_sorted(
            &mut inner.discrete_inputs,
            capacity::MAX_DISCRETE_INPUTS,
            register,
        )
    }

    /// Add a holding register, keeping the sequence sorted by address
    pub fn insert_holding_register(&self, register: Register<u16>) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        insert_sorted(
            &mut inner.holding_registers,
            capacity::MAX_HOLDING_REGISTERS,
            register,
        )
    }

    /// Add an input register, keeping the sequence sorted by address
    pub fn insert_input_register(&self, register: Register<u16>) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        insert_sorted(
            &mut inner.input_registers,
            capacity::MAX_INPUT_REGISTERS,
            register,
        )
    }

    /// Bulk-populate coils starting at `start` with values chosen by `pattern`
    pub fn generate_coils(
        &self,
        start: u16,
        count: u16,
        pattern: ValuePattern,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        generate_bits(&mut inner.coils, capacity::MAX_COILS, start, count, pattern)
    }

    /// Bulk-populate discrete inputs starting at `start` with values chosen by `pattern`
    pub fn generate_discrete_inputs(
        &self,
        start: u16,
        count: u16,
        pattern: ValuePattern,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        generate_bits(
            &mut inner.discrete_inputs,
            capacity::MAX_DISCRETE_INPUTS,
            start,
            count,
            pattern,
        )
    }

    /// Bulk-populate holding registers starting at `start` with values chosen by `pattern`
    pub fn generate_holding_registers(
        &self,
        start: u16,
        count: u16,
        pattern: ValuePattern,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        generate(
            &mut inner.holding_registers,
            capacity::MAX_HOLDING_REGISTERS,
            start,
            count,
            |i| pattern.register_value(count, i),
        )
    }

    /// Bulk-populate input registers starting at `start` with values chosen by `pattern`
    pub fn generate_input_registers(
        &self,
        start: u16,
        count: u16,
        pattern: ValuePattern,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        generate(
            &mut inner.input_registers,
            capacity::MAX_INPUT_REGISTERS,
            start,
            count,
            |i| pattern.register_value(count, i),
        )
    }

    /// Copy of the single coil at `address`
    pub fn coil(&self, address: u16) -> Result<Register<bool>, StorageError> {
        get_one(&self.inner.lock().unwrap().coils, address)
    }

    /// Copy of the single discrete input at `address`
    pub fn discrete_input(&self, address: u16) -> Result<Register<bool>, StorageError> {
        get_one(&self.inner.lock().unwrap().discrete_inputs, address)
    }

    /// Copy of the single holding register at `address`
    pub fn holding_register(&self, address: u16) -> Result<Register<u16>, StorageError> {
        get_one(&self.inner.lock().unwrap().holding_registers, address)
    }

    /// Copy of the single input register at `address`
    pub fn input_register(&self, address: u16) -> Result<Register<u16>, StorageError> {
        get_one(&self.inner.lock().unwrap().input_registers, address)
    }

    /// Overwrite the coil at `address`
    pub fn set_coil(&self, address: u16, value: bool) -> Result<(), StorageError> {
        set_one(&mut self.inner.lock().unwrap().coils, address, value)
    }

    /// Overwrite the discrete input at `address`.
    ///
    /// No function code writes discrete inputs; this exists so that owners of
    /// the area can update input state between requests.
    pub fn set_discrete_input(&self, address: u16, value: bool) -> Result<(), StorageError> {
        set_one(
            &mut self.inner.lock().unwrap().discrete_inputs,
            address,
            value,
        )
    }

    /// Overwrite the holding register at `address`
    pub fn set_holding_register(&self, address: u16, value: u16) -> Result<(), StorageError> {
        set_one(
            &mut self.inner.lock().unwrap().holding_registers,
            address,
            value,
        )
    }

    /// Overwrite the input register at `address`.
    ///
    /// No function code writes input registers; this exists so that owners of
    /// the area can update input state between requests.
    pub fn set_input_register(&self, address: u16, value: u16) -> Result<(), StorageError> {
        set_one(
            &mut self.inner.lock().unwrap().input_registers,
            address,
            value,
        )
    }

    /// Copies of the coils with addresses in `[start, start + length - 1]`.
    ///
    /// The interval must be fully populated.
    pub fn coil_range(&self, start: u16, length: u16) -> Result<Vec<Register<bool>>, StorageError> {
        get_range(
            &self.inner.lock().unwrap().coils,
            start,
            length,
            limits::MAX_READ_COILS_COUNT,
        )
    }

    /// Copies of the discrete inputs with addresses in `[start, start + length - 1]`.
    ///
    /// The interval must be fully populated.
    pub fn discrete_input_range(
        &self,
        start: u16,
        length: u16,
    ) -> Result<Vec<Register<bool>>, StorageError> {
        get_range(
            &self.inner.lock().unwrap().discrete_inputs,
            start,
            length,
            limits::MAX_READ_COILS_COUNT,
        )
    }

    /// Copies of the holding registers with addresses in `[start, start + length - 1]`.
    ///
    /// The interval must be fully populated.
    pub fn holding_register_range(
        &self,
        start: u16,
        length: u16,
    ) -> Result<Vec<Register<u16>>, StorageError> {
        get_range(
            &self.inner.lock().unwrap().holding_registers,
            start,
            length,
            limits::MAX_READ_REGISTERS_COUNT,
        )
    }

    /// Copies of the input registers with addresses in `[start, start + length - 1]`.
    ///
    /// The interval must be fully populated.
    pub fn input_register_range(
        &self,
        start: u16,
        length: u16,
    ) -> Result<Vec<Register<u16>>, StorageError> {
        get_range(
            &self.inner.lock().unwrap().input_registers,
            start,
            length,
            limits::MAX_READ_REGISTERS_COUNT,
        )
    }

    /// Overwrite a contiguous run of coils starting at `start`.
    ///
    /// The full run is checked for presence before anything is written, so a
    /// failed call leaves every coil unchanged.
    pub fn set_coil_range(&self, start: u16, values: &[bool]) -> Result<(), StorageError> {
        set_range(&mut self.inner.lock().unwrap().coils, start, values)
    }

    /// Overwrite a contiguous run of holding registers starting at `start`.
    ///
    /// The full run is checked for presence before anything is written, so a
    /// failed call leaves every register unchanged.
    pub fn set_holding_register_range(
        &self,
        start: u16,
        values: &[u16],
    ) -> Result<(), StorageError> {
        set_range(
            &mut self.inner.lock().unwrap().holding_registers,
            start,
            values,
        )
    }

    /// Snapshot of every coil in address order
    pub fn all_coils(&self) -> Vec<Register<bool>> {
        self.inner.lock().unwrap().coils.clone()
    }

    /// Snapshot of every discrete input in address order
    pub fn all_discrete_inputs(&self) -> Vec<Register<bool>> {
        self.inner.lock().unwrap().discrete_inputs.clone()
    }

    /// Snapshot of every holding register in address order
    pub fn all_holding_registers(&self) -> Vec<Register<u16>> {
        self.inner.lock().unwrap().holding_registers.clone()
    }

    /// Snapshot of every input register in address order
    pub fn all_input_registers(&self) -> Vec<Register<u16>> {
        self.inner.lock().unwrap().input_registers.clone()
    }
}

impl Default for DataArea {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_sorted<T>(
    seq: &mut Vec<Register<T>>,
    max: usize,
    register: Register<T>,
) -> Result<(), StorageError> {
    if seq.len() == max {
        return Err(StorageError::CapacityExceeded);
    }

    match seq.binary_search_by_key(&register.address, |r| r.address) {
        Ok(_) => Err(StorageError::DuplicateAddress),
        Err(index) => {
            seq.insert(index, register);
            Ok(())
        }
    }
}

fn get_one<T: Copy>(seq: &[Register<T>], address: u16) -> Result<Register<T>, StorageError> {
    let index = seq
        .binary_search_by_key(&address, |r| r.address)
        .map_err(|_| StorageError::NotFound)?;
    Ok(seq[index])
}

fn set_one<T: Copy>(seq: &mut [Register<T>], address: u16, value: T) -> Result<(), StorageError> {
    let index = seq
        .binary_search_by_key(&address, |r| r.address)
        .map_err(|_| StorageError::NotFound)?;
    seq[index].value = value;
    Ok(())
}

fn get_range<T: Copy>(
    seq: &[Register<T>],
    start: u16,
    length: u16,
    max_read: u16,
) -> Result<Vec<Register<T>>, StorageError> {
    if length == 0 || length > max_read {
        return Err(StorageError::OutOfRange);
    }

    let end = start
        .checked_add(length - 1)
        .ok_or(StorageError::OutOfRange)?;

    let first = seq
        .binary_search_by_key(&start, |r| r.address)
        .map_err(|_| StorageError::OutOfRange)?;
    let last = first + (length as usize) - 1;

    // addresses are strictly ascending, so the interval is fully populated
    // exactly when the element `length - 1` past `start` sits at `end`
    match seq.get(last) {
        Some(register) if register.address == end => Ok(seq[first..=last].to_vec()),
        _ => Err(StorageError::OutOfRange),
    }
}

fn set_range<T: Copy>(
    seq: &mut [Register<T>],
    start: u16,
    values: &[T],
) -> Result<(), StorageError> {
    let count = match values.len() {
        0 => return Ok(()),
        count => count,
    };

    let end = u16::try_from(count - 1)
        .ok()
        .and_then(|offset| start.checked_add(offset))
        .ok_or(StorageError::NotFound)?;

    let first = seq
        .binary_search_by_key(&start, |r| r.address)
        .map_err(|_| StorageError::NotFound)?;
    let last = first + count - 1;

    match seq.get(last) {
        Some(register) if register.address == end => {}
        _ => return Err(StorageError::NotFound),
    }

    for (offset, value) in values.iter().enumerate() {
        seq[first + offset].value = *value;
    }
    Ok(())
}

fn generate_bits(
    seq: &mut Vec<Register<bool>>,
    max: usize,
    start: u16,
    count: u16,
    pattern: ValuePattern,
) -> Result<(), StorageError> {
    match pattern {
        ValuePattern::Zeros => generate(seq, max, start, count, |_| false),
        ValuePattern::Ones => generate(seq, max, start, count, |_| true),
        ValuePattern::Random => generate(seq, max, start, count, |_| rand::random::<bool>()),
        ValuePattern::Incremental | ValuePattern::Decremental | ValuePattern::Max => {
            Err(StorageError::InvalidGenerationPattern)
        }
    }
}

fn generate<T, F>(
    seq: &mut Vec<Register<T>>,
    max: usize,
    start: u16,
    count: u16,
    mut value_at: F,
) -> Result<(), StorageError>
where
    T: Copy,
    F: FnMut(u16) -> T,
{
    if count as usize > max.saturating_sub(seq.len()) {
        return Err(StorageError::CapacityExceeded);
    }
    if count == 0 {
        return Ok(());
    }

    let end = start
        .checked_add(count - 1)
        .ok_or(StorageError::OutOfRange)?;

    // all capacity and collision checks complete before the first insertion,
    // so a failed call has no side effect
    let index = seq.partition_point(|r| r.address < start);
    if let Some(register) = seq.get(index) {
        if register.address <= end {
            return Err(StorageError::DuplicateAddress);
        }
    }

    let mut tail = seq.split_off(index);
    seq.extend((0..count).map(|i| Register::new(start + i, value_at(i))));
    seq.append(&mut tail);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_keep_the_sequence_sorted_by_address() {
        let area = DataArea::new();
        for address in [9, 3, 7, 1, 5] {
            area.insert_coil(Register::new(address, true)).unwrap();
        }

        let addresses: Vec<u16> = area.all_coils().iter().map(|r| r.address).collect();
        assert_eq!(addresses, vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn rejects_a_duplicate_address() {
        let area = DataArea::new();
        area.insert_holding_register(Register::new(10, 0xCAFE))
            .unwrap();
        assert_eq!(
            area.insert_holding_register(Register::new(10, 0xBEEF)),
            Err(StorageError::DuplicateAddress)
        );
        assert_eq!(area.holding_register(10).unwrap().value, 0xCAFE);
    }

    #[test]
    fn rejects_inserts_beyond_capacity() {
        let area = DataArea::new();
        area.generate_holding_registers(0, 125, ValuePattern::Zeros)
            .unwrap();
        assert_eq!(
            area.insert_holding_register(Register::new(1000, 0)),
            Err(StorageError::CapacityExceeded)
        );
    }

    #[test]
    fn generates_incremental_and_decremental_values() {
        let area = DataArea::new();
        area.generate_holding_registers(0, 5, ValuePattern::Incremental)
            .unwrap();
        area.generate_input_registers(0, 5, ValuePattern::Decremental)
            .unwrap();

        let holding: Vec<u16> = area
            .all_holding_registers()
            .iter()
            .map(|r| r.value)
            .collect();
        let input: Vec<u16> = area.all_input_registers().iter().map(|r| r.value).collect();
        assert_eq!(holding, vec![0, 1, 2, 3, 4]);
        assert_eq!(input, vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn generates_ones_and_max_values() {
        let area = DataArea::new();
        area.generate_discrete_inputs(0, 3, ValuePattern::Ones)
            .unwrap();
        area.generate_input_registers(0, 3, ValuePattern::Max)
            .unwrap();

        assert!(area.all_discrete_inputs().iter().all(|r| r.value));
        assert!(area
            .all_input_registers()
            .iter()
            .all(|r| r.value == u16::MAX));
    }

    #[test]
    fn integer_patterns_do_not_apply_to_boolean_kinds() {
        let area = DataArea::new();
        for pattern in [
            ValuePattern::Incremental,
            ValuePattern::Decremental,
            ValuePattern::Max,
        ] {
            assert_eq!(
                area.generate_coils(0, 10, pattern),
                Err(StorageError::InvalidGenerationPattern)
            );
        }
        assert!(area.all_coils().is_empty());
    }

    #[test]
    fn generate_rejects_a_count_beyond_capacity() {
        let area = DataArea::new();
        assert_eq!(
            area.generate_coils(0, 2001, ValuePattern::Zeros),
            Err(StorageError::CapacityExceeded)
        );

        area.generate_coils(0, 1999, ValuePattern::Zeros).unwrap();
        assert_eq!(
            area.generate_coils(3000, 2, ValuePattern::Zeros),
            Err(StorageError::CapacityExceeded)
        );
    }

    #[test]
    fn generate_rejects_colliding_addresses_without_side_effect() {
        let area = DataArea::new();
        area.insert_coil(Register::new(5, false)).unwrap();
        assert_eq!(
            area.generate_coils(0, 10, ValuePattern::Ones),
            Err(StorageError::DuplicateAddress)
        );
        assert_eq!(area.all_coils().len(), 1);
    }

    #[test]
    fn range_query_returns_contiguous_copies() {
        let area = DataArea::new();
        area.generate_holding_registers(10, 5, ValuePattern::Incremental)
            .unwrap();

        let registers = area.holding_register_range(11, 3).unwrap();
        assert_eq!(
            registers,
            vec![
                Register::new(11, 1),
                Register::new(12, 2),
                Register::new(13, 3)
            ]
        );
    }

    #[test]
    fn range_query_requires_a_fully_populated_interval() {
        let area = DataArea::new();
        area.insert_coil(Register::new(0, true)).unwrap();
        area.insert_coil(Register::new(1, true)).unwrap();
        // gap at 2
        area.insert_coil(Register::new(3, true)).unwrap();

        assert_eq!(area.coil_range(0, 2).unwrap().len(), 2);
        assert_eq!(area.coil_range(0, 4), Err(StorageError::OutOfRange));
        assert_eq!(area.coil_range(2, 1), Err(StorageError::OutOfRange));
    }

    #[test]
    fn range_query_rejects_degenerate_lengths() {
        let area = DataArea::new();
        area.generate_coils(0, 10, ValuePattern::Zeros).unwrap();
        assert_eq!(area.coil_range(0, 0), Err(StorageError::OutOfRange));
        assert_eq!(area.coil_range(0, 2001), Err(StorageError::OutOfRange));
        assert_eq!(
            area.holding_register_range(0, 126),
            Err(StorageError::OutOfRange)
        );
    }

    #[test]
    fn single_register_reads_and_writes() {
        let area = DataArea::new();
        area.insert_input_register(Register::new(3, 2000)).unwrap();

        assert_eq!(area.input_register(3).unwrap().value, 2000);
        area.set_input_register(3, 3000).unwrap();
        assert_eq!(area.input_register(3).unwrap().value, 3000);

        assert_eq!(area.input_register(4), Err(StorageError::NotFound));
        assert_eq!(area.set_coil(0, true), Err(StorageError::NotFound));
    }

    #[test]
    fn range_write_is_all_or_nothing() {
        let area = DataArea::new();
        area.generate_coils(0, 4, ValuePattern::Zeros).unwrap();

        area.set_coil_range(1, &[true, true]).unwrap();
        assert_eq!(
            area.all_coils().iter().map(|r| r.value).collect::<Vec<_>>(),
            vec![false, true, true, false]
        );

        assert_eq!(
            area.set_coil_range(2, &[true, true, true]),
            Err(StorageError::NotFound)
        );
        assert!(!area.coil(3).unwrap().value);
    }

    #[test]
    fn formats_legacy_addresses() {
        assert_eq!(RegisterKind::Coil.legacy_address(1), "0x00001");
        assert_eq!(RegisterKind::DiscreteInput.legacy_address(42), "1x00042");
        assert_eq!(RegisterKind::InputRegister.legacy_address(7), "3x00007");
        assert_eq!(
            RegisterKind::HoldingRegister.legacy_address(u16::MAX),
            "4x65535"
        );
    }
}
