//! Minimal reader for two-dimensional numeric `.npy` arrays.
//!
//! # Format
//! ```text
//! [MAGIC:6 "\x93NUMPY"][MAJOR:1][MINOR:1][HEADER_LEN:2|4 LE][HEADER][DATA]
//! ```
//! HEADER_LEN is a u16 for format 1.x and a u32 for 2.x/3.x. HEADER is a
//! Python dict literal such as
//! `{'descr': '<u4', 'fortran_order': False, 'shape': (12, 2), }`.

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use std::io::Cursor;
use std::path::Path;

use crate::error::{FilterError, Result};

const MAGIC: &[u8; 6] = b"\x93NUMPY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Int,
    Uint,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Dtype {
    kind: Kind,
    width: usize,
    endian: Endian,
}

impl Dtype {
    fn parse(descr: &str) -> Option<Self> {
        let mut chars = descr.chars();
        let endian = match chars.next()? {
            '<' | '|' | '=' => Endian::Little,
            '>' => Endian::Big,
            _ => return None,
        };
        let kind = match chars.next()? {
            'i' => Kind::Int,
            'u' => Kind::Uint,
            'f' => Kind::Float,
            _ => return None,
        };
        let width: usize = chars.as_str().parse().ok()?;
        let supported = match kind {
            Kind::Int | Kind::Uint => matches!(width, 1 | 2 | 4 | 8),
            Kind::Float => matches!(width, 4 | 8),
        };
        supported.then_some(Self { kind, width, endian })
    }

    fn decode(&self, bytes: &[u8]) -> f64 {
        match self.endian {
            Endian::Little => self.decode_with::<LittleEndian>(bytes),
            Endian::Big => self.decode_with::<BigEndian>(bytes),
        }
    }

    fn decode_with<B: ByteOrder>(&self, bytes: &[u8]) -> f64 {
        match (self.kind, self.width) {
            (Kind::Int, 1) => bytes[0] as i8 as f64,
            (Kind::Uint, 1) => bytes[0] as f64,
            (Kind::Int, 2) => B::read_i16(bytes) as f64,
            (Kind::Uint, 2) => B::read_u16(bytes) as f64,
            (Kind::Int, 4) => B::read_i32(bytes) as f64,
            (Kind::Uint, 4) => B::read_u32(bytes) as f64,
            (Kind::Int, _) => B::read_i64(bytes) as f64,
            (Kind::Uint, _) => B::read_u64(bytes) as f64,
            (Kind::Float, 4) => B::read_f32(bytes) as f64,
            (Kind::Float, _) => B::read_f64(bytes),
        }
    }
}

/// A dense 2-D array widened to `f64`, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, idx: usize) -> &[f64] {
        &self.data[idx * self.cols..(idx + 1) * self.cols]
    }
}

pub fn read_matrix(path: &Path) -> Result<Matrix> {
    let bytes = std::fs::read(path).map_err(|e| FilterError::io(path, e))?;
    decode_matrix(&bytes).map_err(|message| FilterError::npy(path, message))
}

fn decode_matrix(bytes: &[u8]) -> std::result::Result<Matrix, String> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err("not an npy file (bad magic)".to_string());
    }

    let mut cursor = Cursor::new(&bytes[6..]);
    let major = cursor.read_u8().map_err(|e| e.to_string())?;
    let _minor = cursor.read_u8().map_err(|e| e.to_string())?;
    let header_len = match major {
        1 => cursor.read_u16::<LittleEndian>().map_err(|e| e.to_string())? as usize,
        2 | 3 => cursor.read_u32::<LittleEndian>().map_err(|e| e.to_string())? as usize,
        other => return Err(format!("unsupported npy format version {}", other)),
    };
    let header_start = 6 + cursor.position() as usize;
    let data_start = header_start + header_len;
    if bytes.len() < data_start {
        return Err("truncated header".to_string());
    }
    let header = std::str::from_utf8(&bytes[header_start..data_start])
        .map_err(|_| "header is not valid text".to_string())?;

    let descr = dict_value(header, "descr")
        .map(|v| v.trim_matches(|c| c == '\'' || c == '"'))
        .ok_or("header has no 'descr'")?;
    let dtype = Dtype::parse(descr).ok_or_else(|| format!("unsupported dtype '{}'", descr))?;
    let fortran_order = match dict_value(header, "fortran_order") {
        Some("True") => true,
        Some("False") | None => false,
        Some(other) => return Err(format!("bad fortran_order '{}'", other)),
    };
    let shape = dict_value(header, "shape")
        .and_then(parse_shape)
        .ok_or("header has no readable 'shape'")?;
    let (rows, cols) = match shape.as_slice() {
        [rows, cols] => (*rows, *cols),
        other => return Err(format!("expected a 2-D array, got shape {:?}", other)),
    };

    let count = rows
        .checked_mul(cols)
        .filter(|count| count.checked_mul(dtype.width).is_some())
        .ok_or_else(|| format!("shape ({}, {}) is too large", rows, cols))?;
    let needed = count * dtype.width;
    let payload = &bytes[data_start..];
    if payload.len() < needed {
        return Err(format!(
            "payload holds {} bytes, shape ({}, {}) needs {}",
            payload.len(),
            rows,
            cols,
            needed
        ));
    }

    let mut data = vec![0.0; count];
    for (flat, chunk) in payload.chunks_exact(dtype.width).take(count).enumerate() {
        let (r, c) = if fortran_order {
            (flat % rows.max(1), flat / rows.max(1))
        } else {
            (flat / cols.max(1), flat % cols.max(1))
        };
        data[r * cols + c] = dtype.decode(chunk);
    }

    Ok(Matrix { rows, cols, data })
}

/// Raw text of `key`'s value in the header dict, up to the next top-level comma.
fn dict_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let quoted = [format!("'{}'", key), format!("\"{}\"", key)];
    let start = quoted.iter().find_map(|q| header.find(q.as_str()).map(|i| i + q.len()))?;
    let rest = header[start..].trim_start().strip_prefix(':')?.trim_start();

    let mut depth = 0usize;
    for (idx, ch) in rest.char_indices() {
        match ch {
            '(' | '[' => depth += 1,
            ')' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 && rest.starts_with('(') {
                    return Some(&rest[..=idx]);
                }
            }
            ',' | '}' if depth == 0 => return Some(rest[..idx].trim()),
            _ => {}
        }
    }
    None
}

fn parse_shape(raw: &str) -> Option<Vec<usize>> {
    let inner = raw.trim().strip_prefix('(')?.strip_suffix(')')?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('L').parse().ok())
        .collect()
}
