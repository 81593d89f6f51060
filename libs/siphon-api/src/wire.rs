//! Source wire format, read field-by-field.
//!
//! All multi-byte values are little-endian. Null is carried in-band with
//! sentinel values — this is a wire-format compatibility contract, not an
//! implementation detail:
//!
//! | encoding        | layout                      | null sentinel        |
//! |-----------------|-----------------------------|----------------------|
//! | int8..int64     | fixed-width two's complement| `iN::MIN`            |
//! | float32/float64 | IEEE binary                 | NaN                  |
//! | decimal         | scale `u8` + mantissa `i64` | mantissa `i64::MIN`  |
//! | boolean         | `u8` 0 / 1                  | `0xFF`               |
//! | char            | `u16` code unit             | `0xFFFF`             |
//! | enum            | `i16` ordinal               | `i16::MIN`           |
//! | timestamp       | `i64` ns since epoch        | `i64::MIN`           |
//! | time-of-day     | `i32` ms since midnight     | `i32::MIN`           |
//! | string / binary | `u32` length + bytes        | length `0xFFFF_FFFF` |
//! | array           | `u32` count + elements      | count `0xFFFF_FFFF`  |
//! | object          | `i16` type tag + fields     | tag `-1`             |
//!
//! [`WireCursor`] exposes every read as `Option<T>` so sentinel handling
//! lives in exactly one place. [`WireWriter`] mirrors it for sources and
//! tests; values equal to a sentinel are unrepresentable and rejected.

use crate::error::ReplicaError;
use crate::schema::TypeTag;

pub const NULL_BOOL: u8 = 0xFF;
pub const NULL_CHAR: u16 = 0xFFFF;
pub const NULL_LEN: u32 = u32::MAX;
pub const NULL_OBJECT_TAG: i16 = -1;

/// Positioned reader over one record body.
pub struct WireCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ReplicaError> {
        if self.remaining() < n {
            return Err(ReplicaError::decode(format!(
                "truncated record: need {n} bytes at offset {}, {} left",
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_i8(&mut self) -> Result<Option<i8>, ReplicaError> {
        let v = self.take(1)?[0] as i8;
        Ok((v != i8::MIN).then_some(v))
    }

    pub fn read_i16(&mut self) -> Result<Option<i16>, ReplicaError> {
        let v = i16::from_le_bytes(self.take(2)?.try_into().unwrap());
        Ok((v != i16::MIN).then_some(v))
    }

    pub fn read_i32(&mut self) -> Result<Option<i32>, ReplicaError> {
        let v = i32::from_le_bytes(self.take(4)?.try_into().unwrap());
        Ok((v != i32::MIN).then_some(v))
    }

    pub fn read_i64(&mut self) -> Result<Option<i64>, ReplicaError> {
        let v = i64::from_le_bytes(self.take(8)?.try_into().unwrap());
        Ok((v != i64::MIN).then_some(v))
    }

    pub fn read_f32(&mut self) -> Result<Option<f32>, ReplicaError> {
        let v = f32::from_le_bytes(self.take(4)?.try_into().unwrap());
        Ok((!v.is_nan()).then_some(v))
    }

    pub fn read_f64(&mut self) -> Result<Option<f64>, ReplicaError> {
        let v = f64::from_le_bytes(self.take(8)?.try_into().unwrap());
        Ok((!v.is_nan()).then_some(v))
    }

    /// Scaled decimal: `(scale, mantissa)`. The scale byte is present even
    /// for null mantissas so the field width is self-contained.
    pub fn read_decimal(&mut self) -> Result<Option<(u8, i64)>, ReplicaError> {
        let scale = self.take(1)?[0];
        let mantissa = i64::from_le_bytes(self.take(8)?.try_into().unwrap());
        Ok((mantissa != i64::MIN).then_some((scale, mantissa)))
    }

    pub fn read_bool(&mut self) -> Result<Option<bool>, ReplicaError> {
        match self.take(1)?[0] {
            0 => Ok(Some(false)),
            1 => Ok(Some(true)),
            NULL_BOOL => Ok(None),
            other => Err(ReplicaError::decode(format!("invalid boolean byte 0x{other:02X}"))),
        }
    }

    pub fn read_char(&mut self) -> Result<Option<char>, ReplicaError> {
        let v = u16::from_le_bytes(self.take(2)?.try_into().unwrap());
        if v == NULL_CHAR {
            return Ok(None);
        }
        char::from_u32(v as u32)
            .map(Some)
            .ok_or_else(|| ReplicaError::decode(format!("invalid char code unit 0x{v:04X}")))
    }

    pub fn read_enum(&mut self) -> Result<Option<i16>, ReplicaError> {
        self.read_i16()
    }

    pub fn read_timestamp(&mut self) -> Result<Option<i64>, ReplicaError> {
        self.read_i64()
    }

    pub fn read_time(&mut self) -> Result<Option<i32>, ReplicaError> {
        self.read_i32()
    }

    pub fn read_bytes(&mut self) -> Result<Option<Vec<u8>>, ReplicaError> {
        match self.read_len()? {
            None => Ok(None),
            Some(len) => Ok(Some(self.take(len)?.to_vec())),
        }
    }

    pub fn read_string(&mut self) -> Result<Option<String>, ReplicaError> {
        match self.read_len()? {
            None => Ok(None),
            Some(len) => {
                let bytes = self.take(len)?;
                Ok(Some(std::str::from_utf8(bytes)?.to_owned()))
            }
        }
    }

    /// Length prefix of a string, binary, or array value.
    pub fn read_len(&mut self) -> Result<Option<usize>, ReplicaError> {
        let v = u32::from_le_bytes(self.take(4)?.try_into().unwrap());
        Ok((v != NULL_LEN).then_some(v as usize))
    }

    /// Type tag of a nested object; `None` for a null object.
    pub fn read_object_tag(&mut self) -> Result<Option<TypeTag>, ReplicaError> {
        let v = i16::from_le_bytes(self.take(2)?.try_into().unwrap());
        if v == NULL_OBJECT_TAG {
            Ok(None)
        } else if v >= 0 {
            Ok(Some(v as TypeTag))
        } else {
            Err(ReplicaError::decode(format!("invalid object type tag {v}")))
        }
    }
}

/// Mirror of [`WireCursor`] — assembles record bodies.
#[derive(Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn reject_sentinel(ok: bool, what: &str) -> Result<(), ReplicaError> {
        if ok {
            Ok(())
        } else {
            Err(ReplicaError::decode(format!("{what} value collides with the null sentinel")))
        }
    }

    pub fn write_i8(&mut self, v: Option<i8>) -> Result<(), ReplicaError> {
        if let Some(v) = v {
            Self::reject_sentinel(v != i8::MIN, "int8")?;
            self.buf.push(v as u8);
        } else {
            self.buf.push(i8::MIN as u8);
        }
        Ok(())
    }

    pub fn write_i16(&mut self, v: Option<i16>) -> Result<(), ReplicaError> {
        if let Some(v) = v {
            Self::reject_sentinel(v != i16::MIN, "int16")?;
            self.buf.extend_from_slice(&v.to_le_bytes());
        } else {
            self.buf.extend_from_slice(&i16::MIN.to_le_bytes());
        }
        Ok(())
    }

    pub fn write_i32(&mut self, v: Option<i32>) -> Result<(), ReplicaError> {
        if let Some(v) = v {
            Self::reject_sentinel(v != i32::MIN, "int32")?;
            self.buf.extend_from_slice(&v.to_le_bytes());
        } else {
            self.buf.extend_from_slice(&i32::MIN.to_le_bytes());
        }
        Ok(())
    }

    pub fn write_i64(&mut self, v: Option<i64>) -> Result<(), ReplicaError> {
        if let Some(v) = v {
            Self::reject_sentinel(v != i64::MIN, "int64")?;
            self.buf.extend_from_slice(&v.to_le_bytes());
        } else {
            self.buf.extend_from_slice(&i64::MIN.to_le_bytes());
        }
        Ok(())
    }

    pub fn write_f32(&mut self, v: Option<f32>) -> Result<(), ReplicaError> {
        let v = match v {
            Some(v) => {
                Self::reject_sentinel(!v.is_nan(), "float32")?;
                v
            }
            None => f32::NAN,
        };
        self.buf.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    pub fn write_f64(&mut self, v: Option<f64>) -> Result<(), ReplicaError> {
        let v = match v {
            Some(v) => {
                Self::reject_sentinel(!v.is_nan(), "float64")?;
                v
            }
            None => f64::NAN,
        };
        self.buf.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    pub fn write_decimal(&mut self, scale: u8, mantissa: Option<i64>) -> Result<(), ReplicaError> {
        self.buf.push(scale);
        if let Some(m) = mantissa {
            Self::reject_sentinel(m != i64::MIN, "decimal mantissa")?;
            self.buf.extend_from_slice(&m.to_le_bytes());
        } else {
            self.buf.extend_from_slice(&i64::MIN.to_le_bytes());
        }
        Ok(())
    }

    pub fn write_bool(&mut self, v: Option<bool>) {
        self.buf.push(match v {
            Some(false) => 0,
            Some(true) => 1,
            None => NULL_BOOL,
        });
    }

    pub fn write_char(&mut self, v: Option<char>) -> Result<(), ReplicaError> {
        let unit = match v {
            Some(c) => {
                let code = c as u32;
                if code >= NULL_CHAR as u32 {
                    return Err(ReplicaError::decode(format!(
                        "char {c:?} does not fit a single code unit"
                    )));
                }
                code as u16
            }
            None => NULL_CHAR,
        };
        self.buf.extend_from_slice(&unit.to_le_bytes());
        Ok(())
    }

    pub fn write_enum(&mut self, ordinal: Option<i16>) -> Result<(), ReplicaError> {
        self.write_i16(ordinal)
    }

    pub fn write_timestamp(&mut self, v: Option<i64>) -> Result<(), ReplicaError> {
        self.write_i64(v)
    }

    pub fn write_time(&mut self, v: Option<i32>) -> Result<(), ReplicaError> {
        self.write_i32(v)
    }

    pub fn write_bytes(&mut self, v: Option<&[u8]>) -> Result<(), ReplicaError> {
        match v {
            None => self.write_null_len(),
            Some(bytes) => {
                self.write_len(bytes.len())?;
                self.buf.extend_from_slice(bytes);
            }
        }
        Ok(())
    }

    pub fn write_string(&mut self, v: Option<&str>) -> Result<(), ReplicaError> {
        self.write_bytes(v.map(str::as_bytes))
    }

    pub fn write_len(&mut self, len: usize) -> Result<(), ReplicaError> {
        if len as u64 >= NULL_LEN as u64 {
            return Err(ReplicaError::decode(format!("length {len} exceeds the wire limit")));
        }
        self.buf.extend_from_slice(&(len as u32).to_le_bytes());
        Ok(())
    }

    pub fn write_null_len(&mut self) {
        self.buf.extend_from_slice(&NULL_LEN.to_le_bytes());
    }

    pub fn write_object_tag(&mut self, tag: Option<TypeTag>) -> Result<(), ReplicaError> {
        let v = match tag {
            None => NULL_OBJECT_TAG,
            Some(tag) => {
                if tag > i16::MAX as TypeTag {
                    return Err(ReplicaError::decode(format!("type tag {tag} exceeds the wire limit")));
                }
                tag as i16
            }
        };
        self.buf.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }
}
