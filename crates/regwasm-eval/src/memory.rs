//! Linear memory.

use regwasm_types::{ArrayView, ValueType};

use crate::error::{EvalError, EvalResult};
use crate::value::Value;

pub const PAGE_SIZE: usize = 64 * 1024;

/// Upper bound on pages for a 32-bit memory.
const MAX_PAGES: u32 = 65536;

#[derive(Debug, Clone, Default)]
pub struct LinearMemory {
    bytes: Vec<u8>,
    maximum: Option<u32>,
}

impl LinearMemory {
    pub fn new(initial: u32, maximum: Option<u32>) -> Self {
        Self {
            bytes: vec![0; initial as usize * PAGE_SIZE],
            maximum,
        }
    }

    pub fn pages(&self) -> u32 {
        (self.bytes.len() / PAGE_SIZE) as u32
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Grow by `delta` pages, returning the old size or `-1`.
    pub fn grow(&mut self, delta: u32) -> i32 {
        let old = self.pages();
        let limit = self.maximum.unwrap_or(MAX_PAGES).min(MAX_PAGES);
        match old.checked_add(delta) {
            Some(new) if new <= limit => {
                self.bytes.resize(new as usize * PAGE_SIZE, 0);
                old as i32
            }
            _ => -1,
        }
    }

    fn range(&self, address: u64, len: usize) -> EvalResult<std::ops::Range<usize>> {
        let start = usize::try_from(address).ok();
        match start.and_then(|s| s.checked_add(len).map(|e| s..e)) {
            Some(range) if range.end <= self.bytes.len() => Ok(range),
            _ => Err(EvalError::MemoryOutOfBounds(format!(
                "{len} byte(s) at {address}, memory is {} bytes",
                self.bytes.len()
            ))),
        }
    }

    /// Copy a data segment into memory.
    pub fn write(&mut self, address: u64, data: &[u8]) -> EvalResult<()> {
        let range = self.range(address, data.len())?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    pub fn read(&self, address: u64, len: usize) -> EvalResult<&[u8]> {
        let range = self.range(address, len)?;
        Ok(&self.bytes[range])
    }

    /// Load through a typed view, extending narrow views to `ty`.
    pub fn load(&self, address: u64, view: ArrayView, ty: ValueType) -> EvalResult<Value> {
        let mut raw = [0u8; 8];
        let size = view.size();
        raw[..size].copy_from_slice(self.read(address, size)?);
        let bits = u64::from_le_bytes(raw);
        let wide = match view {
            ArrayView::Int8 => i64::from(bits as u8 as i8),
            ArrayView::Uint8 => i64::from(bits as u8),
            ArrayView::Int16 => i64::from(bits as u16 as i16),
            ArrayView::Uint16 => i64::from(bits as u16),
            ArrayView::Int32 => i64::from(bits as u32 as i32),
            ArrayView::Uint32 => i64::from(bits as u32),
            ArrayView::Int64 => bits as i64,
            ArrayView::Float32 => return Ok(Value::F32(f32::from_bits(bits as u32))),
            ArrayView::Float64 => return Ok(Value::F64(f64::from_bits(bits))),
        };
        match ty {
            ValueType::I32 => Ok(Value::I32(wide as i32)),
            ValueType::I64 => Ok(Value::I64(wide)),
            other => Err(EvalError::Runtime(format!("{view:?} view cannot load {other}"))),
        }
    }

    /// Store the low bytes of `value` through a typed view.
    pub fn store(&mut self, address: u64, view: ArrayView, value: Value) -> EvalResult<()> {
        let bits = match value {
            Value::I32(v) => u64::from(v as u32),
            Value::I64(v) => v as u64,
            Value::F32(v) => u64::from(v.to_bits()),
            Value::F64(v) => v.to_bits(),
        };
        let size = view.size();
        let range = self.range(address, size)?;
        self.bytes[range].copy_from_slice(&bits.to_le_bytes()[..size]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_loads_extend() {
        let mut mem = LinearMemory::new(1, None);
        mem.store(0, ArrayView::Int32, Value::I32(-2)).unwrap();
        assert_eq!(mem.load(0, ArrayView::Int8, ValueType::I32), Ok(Value::I32(-2)));
        assert_eq!(mem.load(0, ArrayView::Uint8, ValueType::I32), Ok(Value::I32(0xfe)));
        assert_eq!(
            mem.load(0, ArrayView::Uint32, ValueType::I64),
            Ok(Value::I64(0xffff_fffe))
        );
        assert_eq!(mem.load(0, ArrayView::Int16, ValueType::I64), Ok(Value::I64(-2)));
    }

    #[test]
    fn accesses_are_bounds_checked() {
        let mut mem = LinearMemory::new(1, None);
        let end = PAGE_SIZE as u64;
        assert!(mem.load(end - 4, ArrayView::Int32, ValueType::I32).is_ok());
        assert!(matches!(
            mem.load(end - 3, ArrayView::Int32, ValueType::I32),
            Err(EvalError::MemoryOutOfBounds(_))
        ));
        assert!(mem.store(u64::MAX, ArrayView::Int8, Value::I32(1)).is_err());
    }

    #[test]
    fn grow_respects_maximum() {
        let mut mem = LinearMemory::new(1, Some(2));
        assert_eq!(mem.grow(1), 1);
        assert_eq!(mem.pages(), 2);
        assert_eq!(mem.grow(1), -1);
        assert_eq!(mem.grow(0), 2);
    }
}
