//! Data section decoding and conversion to Polars columns.

use polars::prelude::*;

use super::error::DtaError;
use super::header::{decode_text, ByteOrder, DtaHeader, VarType};

/// Largest non-missing value of each integer storage type. Anything above
/// is one of Stata's 27 missing codes (`.`, `.a` .. `.z`).
const MAX_BYTE: i8 = 100;
const MAX_INT: i16 = 32_740;
const MAX_LONG: i32 = 2_147_483_620;
/// Bit patterns of 2^127 and 2^1023, where float and double missing codes start
const FLOAT_MISSING_BITS: u32 = 0x7f00_0000;
const DOUBLE_MISSING_BITS: u64 = 0x7fe0_0000_0000_0000;

/// Values of one variable, accumulated row by row
enum ColumnValues {
    Int(Vec<Option<i32>>),
    Float(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnValues {
    fn for_type(var_type: VarType, capacity: usize) -> Self {
        match var_type {
            VarType::Byte | VarType::Int | VarType::Long => {
                ColumnValues::Int(Vec::with_capacity(capacity))
            }
            VarType::Float | VarType::Double => ColumnValues::Float(Vec::with_capacity(capacity)),
            VarType::Str(_) | VarType::StrL => ColumnValues::Text(Vec::with_capacity(capacity)),
        }
    }

    fn into_column(self, name: &str) -> Column {
        match self {
            ColumnValues::Int(v) => Column::new(name.into(), v),
            ColumnValues::Float(v) => Column::new(name.into(), v),
            ColumnValues::Text(v) => Column::new(name.into(), v),
        }
    }
}

pub fn decode_byte(raw: u8) -> Option<i32> {
    let v = raw as i8;
    (v <= MAX_BYTE).then_some(v as i32)
}

pub fn decode_int(raw: u16) -> Option<i32> {
    let v = raw as i16;
    (v <= MAX_INT).then_some(v as i32)
}

pub fn decode_long(raw: u32) -> Option<i32> {
    let v = raw as i32;
    (v <= MAX_LONG).then_some(v)
}

pub fn decode_float(raw: u32) -> Option<f64> {
    let v = f32::from_bits(raw);
    (v.is_finite() && v < f32::from_bits(FLOAT_MISSING_BITS)).then_some(v as f64)
}

pub fn decode_double(raw: u64) -> Option<f64> {
    let v = f64::from_bits(raw);
    (v.is_finite() && v < f64::from_bits(DOUBLE_MISSING_BITS)).then_some(v)
}

fn read_u16(order: ByteOrder, b: &[u8]) -> u16 {
    order.u16([b[0], b[1]])
}

fn read_u32(order: ByteOrder, b: &[u8]) -> u32 {
    order.u32([b[0], b[1], b[2], b[3]])
}

fn read_u64(order: ByteOrder, b: &[u8]) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&b[..8]);
    order.u64(arr)
}

/// Decode every observation into one Polars column per variable.
pub fn read_columns(buf: &[u8], header: &DtaHeader) -> Result<Vec<Column>, DtaError> {
    let row_width = header.row_width();
    let truncated = |needed: usize| DtaError::TruncatedData {
        offset: header.data_offset,
        needed,
        len: buf.len(),
    };
    let needed = header
        .nobs
        .checked_mul(row_width)
        .ok_or_else(|| truncated(usize::MAX))?;
    let end = header
        .data_offset
        .checked_add(needed)
        .filter(|end| *end <= buf.len())
        .ok_or_else(|| truncated(needed))?;

    let strl_count = header
        .variables
        .iter()
        .filter(|v| v.var_type == VarType::StrL)
        .count();
    if strl_count > 0 {
        log::warn!(
            "{} strL variable(s) are not decoded and will be read as nulls",
            strl_count
        );
    }

    let mut values: Vec<ColumnValues> = header
        .variables
        .iter()
        .map(|v| ColumnValues::for_type(v.var_type, needed / row_width.max(1)))
        .collect();

    let order = header.byte_order;
    let data = &buf[header.data_offset..end];

    for row in data.chunks_exact(row_width.max(1)).take(header.nobs) {
        let mut offset = 0;
        for (var, column) in header.variables.iter().zip(values.iter_mut()) {
            let width = var.var_type.width();
            let field = &row[offset..offset + width];
            offset += width;

            match (var.var_type, column) {
                (VarType::Byte, ColumnValues::Int(v)) => v.push(decode_byte(field[0])),
                (VarType::Int, ColumnValues::Int(v)) => v.push(decode_int(read_u16(order, field))),
                (VarType::Long, ColumnValues::Int(v)) => {
                    v.push(decode_long(read_u32(order, field)))
                }
                (VarType::Float, ColumnValues::Float(v)) => {
                    v.push(decode_float(read_u32(order, field)))
                }
                (VarType::Double, ColumnValues::Float(v)) => {
                    v.push(decode_double(read_u64(order, field)))
                }
                (VarType::Str(_), ColumnValues::Text(v)) => {
                    let text = decode_text(field, header.release);
                    v.push((!text.is_empty()).then_some(text));
                }
                (VarType::StrL, ColumnValues::Text(v)) => v.push(None),
                _ => unreachable!("column buffer built from the same variable type"),
            }
        }
    }

    Ok(header
        .variables
        .iter()
        .zip(values)
        .map(|(var, column)| column.into_column(&var.name))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_missing_codes() {
        assert_eq!(decode_byte(100), Some(100));
        assert_eq!(decode_byte((-127i8) as u8), Some(-127));
        assert_eq!(decode_byte(101), None);
    }

    #[test]
    fn test_int_missing_codes() {
        assert_eq!(decode_int(32_740), Some(32_740));
        assert_eq!(decode_int(32_741), None);
        assert_eq!(decode_int((-5i16) as u16), Some(-5));
    }

    #[test]
    fn test_long_missing_codes() {
        assert_eq!(decode_long(2_147_483_620), Some(2_147_483_620));
        assert_eq!(decode_long(2_147_483_621), None);
    }

    #[test]
    fn test_float_missing_codes() {
        assert_eq!(decode_float(1.5f32.to_bits()), Some(1.5));
        assert_eq!(decode_float(0x7f00_0000), None);
    }

    #[test]
    fn test_double_missing_codes() {
        assert_eq!(decode_double(2.25f64.to_bits()), Some(2.25));
        assert_eq!(decode_double(0x7fe0_0000_0000_0000), None);
        assert_eq!(decode_double(f64::NAN.to_bits()), None);
    }
}
