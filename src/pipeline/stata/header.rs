//! Header and variable-descriptor parsing for both `.dta` layouts.
//!
//! Releases 114/115 use a fixed binary header. Releases 117-119 wrap every
//! section in XML-like tags and carry a map of section offsets, which lets
//! the parser skip sort lists, formats, labels and characteristics.

use super::error::DtaError;

/// Opening bytes of the tagged (117+) layout
pub const TAGGED_MAGIC: &[u8] = b"<stata_dta>";

/// Index of the `<data>` offset inside the 14-entry section map
const MAP_DATA_INDEX: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub fn u16(self, b: [u8; 2]) -> u16 {
        match self {
            ByteOrder::Little => u16::from_le_bytes(b),
            ByteOrder::Big => u16::from_be_bytes(b),
        }
    }

    pub fn u32(self, b: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes(b),
            ByteOrder::Big => u32::from_be_bytes(b),
        }
    }

    pub fn u64(self, b: [u8; 8]) -> u64 {
        match self {
            ByteOrder::Little => u64::from_le_bytes(b),
            ByteOrder::Big => u64::from_be_bytes(b),
        }
    }
}

/// Storage type of a single variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    /// Fixed-width string of the given byte length
    Str(usize),
    /// Long string stored in the `<strls>` section
    StrL,
    Byte,
    Int,
    Long,
    Float,
    Double,
}

impl VarType {
    /// Width of one value in the data section
    pub fn width(self) -> usize {
        match self {
            VarType::Str(n) => n,
            VarType::StrL => 8,
            VarType::Byte => 1,
            VarType::Int => 2,
            VarType::Long | VarType::Float => 4,
            VarType::Double => 8,
        }
    }

    /// Type codes of the tagged layout
    fn from_tagged_code(code: u16) -> Option<Self> {
        match code {
            1..=2045 => Some(VarType::Str(code as usize)),
            32768 => Some(VarType::StrL),
            65526 => Some(VarType::Double),
            65527 => Some(VarType::Float),
            65528 => Some(VarType::Long),
            65529 => Some(VarType::Int),
            65530 => Some(VarType::Byte),
            _ => None,
        }
    }

    /// Type codes of the 114/115 layout
    fn from_legacy_code(code: u8) -> Option<Self> {
        match code {
            1..=244 => Some(VarType::Str(code as usize)),
            251 => Some(VarType::Byte),
            252 => Some(VarType::Int),
            253 => Some(VarType::Long),
            254 => Some(VarType::Float),
            255 => Some(VarType::Double),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DtaVariable {
    pub name: String,
    pub var_type: VarType,
}

/// Everything needed to walk the data section
#[derive(Debug, Clone)]
pub struct DtaHeader {
    pub release: u16,
    pub byte_order: ByteOrder,
    pub nobs: usize,
    pub data_label: String,
    pub variables: Vec<DtaVariable>,
    /// Byte offset of the first observation
    pub data_offset: usize,
}

impl DtaHeader {
    pub fn row_width(&self) -> usize {
        self.variables.iter().map(|v| v.var_type.width()).sum()
    }
}

/// Bounds-checked reader over the in-memory file
pub struct Cursor<'a> {
    buf: &'a [u8],
    pub pos: usize,
    pub order: ByteOrder,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8], order: ByteOrder) -> Self {
        Self { buf, pos: 0, order }
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], DtaError> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.buf.len()).ok_or(
            DtaError::TruncatedData {
                offset: self.pos,
                needed: n,
                len: self.buf.len(),
            },
        )?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, DtaError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, DtaError> {
        let b = self.take(2)?;
        Ok(self.order.u16([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32, DtaError> {
        let b = self.take(4)?;
        Ok(self.order.u32([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64(&mut self) -> Result<u64, DtaError> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(self.order.u64(arr))
    }

    pub fn expect_tag(&mut self, tag: &str) -> Result<(), DtaError> {
        let offset = self.pos;
        match self.take(tag.len()) {
            Ok(bytes) if bytes == tag.as_bytes() => Ok(()),
            _ => Err(DtaError::MalformedTag {
                expected: tag.to_string(),
                offset,
            }),
        }
    }

    pub fn seek(&mut self, pos: usize) -> Result<(), DtaError> {
        if pos > self.buf.len() {
            return Err(DtaError::TruncatedData {
                offset: pos,
                needed: 0,
                len: self.buf.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }
}

/// Decode a NUL-padded text field. Release 118+ stores UTF-8, older
/// releases store Windows-1252.
pub fn decode_text(bytes: &[u8], release: u16) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let bytes = &bytes[..end];
    if release >= 118 {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
        text.into_owned()
    }
}

/// Parse the header of either layout
pub fn parse_header(buf: &[u8]) -> Result<DtaHeader, DtaError> {
    if buf.starts_with(TAGGED_MAGIC) {
        parse_tagged(buf)
    } else {
        match buf.first() {
            Some(&release @ (114 | 115)) => parse_legacy(buf, release as u16),
            Some(&other) => Err(DtaError::UnsupportedRelease(other as u16)),
            None => Err(DtaError::TruncatedData {
                offset: 0,
                needed: 1,
                len: 0,
            }),
        }
    }
}

fn parse_tagged(buf: &[u8]) -> Result<DtaHeader, DtaError> {
    let mut c = Cursor::new(buf, ByteOrder::Little);
    c.expect_tag("<stata_dta>")?;
    c.expect_tag("<header>")?;
    c.expect_tag("<release>")?;
    let release_text = String::from_utf8_lossy(c.take(3)?).into_owned();
    let release: u16 = release_text
        .parse()
        .map_err(|_| DtaError::UnsupportedRelease(0))?;
    if !(117..=119).contains(&release) {
        return Err(DtaError::UnsupportedRelease(release));
    }
    c.expect_tag("</release>")?;

    c.expect_tag("<byteorder>")?;
    c.order = match c.take(3)? {
        b"LSF" => ByteOrder::Little,
        b"MSF" => ByteOrder::Big,
        other => {
            return Err(DtaError::InvalidByteOrder(
                String::from_utf8_lossy(other).into_owned(),
            ))
        }
    };
    c.expect_tag("</byteorder>")?;

    c.expect_tag("<K>")?;
    let nvar = if release == 119 {
        c.u32()? as usize
    } else {
        c.u16()? as usize
    };
    c.expect_tag("</K>")?;

    c.expect_tag("<N>")?;
    let nobs = if release == 117 {
        c.u32()? as usize
    } else {
        c.u64()? as usize
    };
    c.expect_tag("</N>")?;

    c.expect_tag("<label>")?;
    let label_len = if release == 117 {
        c.u8()? as usize
    } else {
        c.u16()? as usize
    };
    let data_label = decode_text(c.take(label_len)?, release);
    c.expect_tag("</label>")?;

    c.expect_tag("<timestamp>")?;
    let stamp_len = c.u8()? as usize;
    c.take(stamp_len)?;
    c.expect_tag("</timestamp>")?;
    c.expect_tag("</header>")?;

    c.expect_tag("<map>")?;
    let mut map = [0u64; 14];
    for entry in map.iter_mut() {
        *entry = c.u64()?;
    }
    c.expect_tag("</map>")?;

    c.expect_tag("<variable_types>")?;
    let mut types = Vec::with_capacity(nvar);
    for index in 0..nvar {
        let code = c.u16()?;
        let var_type = VarType::from_tagged_code(code)
            .ok_or(DtaError::UnknownVariableType { code, index })?;
        types.push(var_type);
    }
    c.expect_tag("</variable_types>")?;

    c.expect_tag("<varnames>")?;
    let name_len = if release == 117 { 33 } else { 129 };
    let mut variables = Vec::with_capacity(nvar);
    for var_type in types {
        let name = decode_text(c.take(name_len)?, release);
        variables.push(DtaVariable { name, var_type });
    }
    c.expect_tag("</varnames>")?;

    c.seek(map[MAP_DATA_INDEX] as usize)?;
    c.expect_tag("<data>")?;

    Ok(DtaHeader {
        release,
        byte_order: c.order,
        nobs,
        data_label,
        variables,
        data_offset: c.pos,
    })
}

fn parse_legacy(buf: &[u8], release: u16) -> Result<DtaHeader, DtaError> {
    let order = match buf.get(1) {
        Some(1) => ByteOrder::Big,
        Some(2) => ByteOrder::Little,
        other => {
            return Err(DtaError::InvalidByteOrder(format!("{:?}", other)));
        }
    };

    let mut c = Cursor::new(buf, order);
    c.seek(4)?;
    let nvar = c.u16()? as usize;
    let nobs = c.u32()? as usize;
    let data_label = decode_text(c.take(81)?, release);
    c.take(18)?; // timestamp

    let mut types = Vec::with_capacity(nvar);
    for index in 0..nvar {
        let code = c.u8()?;
        let var_type = VarType::from_legacy_code(code).ok_or(DtaError::UnknownVariableType {
            code: code as u16,
            index,
        })?;
        types.push(var_type);
    }

    let mut variables = Vec::with_capacity(nvar);
    for var_type in types {
        let name = decode_text(c.take(33)?, release);
        variables.push(DtaVariable { name, var_type });
    }

    // sort list, formats, value-label names, variable labels
    c.take(2 * (nvar + 1))?;
    c.take(49 * nvar)?;
    c.take(33 * nvar)?;
    c.take(81 * nvar)?;

    // expansion fields end with a zero type and zero length
    loop {
        let field_type = c.u8()?;
        let len = c.u32()? as usize;
        if field_type == 0 && len == 0 {
            break;
        }
        c.take(len)?;
    }

    Ok(DtaHeader {
        release,
        byte_order: order,
        nobs,
        data_label,
        variables,
        data_offset: c.pos,
    })
}
