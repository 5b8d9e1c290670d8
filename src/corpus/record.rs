//! Binary record codec.
//!
//! A record is a sequence of named raw-f32 fields inside a length-delimited
//! container: `u32` payload length, then `u8` field count, then per field a
//! `u8` name length, the name bytes, a `u32` data byte length, and the data
//! as little-endian `f32` values. Field names and order are fixed by the
//! schema; the record itself carries no shape or dtype metadata.

use std::io::{Read, Write};

use thiserror::Error;

/// Largest payload the reader will accept. Anything bigger means the length
/// prefix was garbage, not a real record.
const MAX_PAYLOAD_BYTES: u32 = 256 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("truncated record: {0}")]
    Truncated(&'static str),
    #[error("record payload of {0} bytes exceeds the {MAX_PAYLOAD_BYTES} byte cap")]
    Oversized(u32),
    #[error("field name is not valid UTF-8")]
    BadFieldName,
    #[error("field {name} holds {bytes} bytes, not a whole number of f32 values")]
    Misaligned { name: String, bytes: usize },
}

/// One named tensor payload inside a record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordField {
    pub name: String,
    pub values: Vec<f32>,
}

impl RecordField {
    pub fn new(name: &str, values: Vec<f32>) -> Self {
        Self {
            name: name.to_string(),
            values,
        }
    }
}

/// An ordered set of named fields; the serialized unit of the corpus.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordFields {
    pub fields: Vec<RecordField>,
}

impl RecordFields {
    pub fn new(fields: Vec<RecordField>) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&RecordField> {
        self.fields.iter().find(|field| field.name == name)
    }

    fn payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.fields.len() as u8);
        for field in &self.fields {
            out.push(field.name.len() as u8);
            out.extend_from_slice(field.name.as_bytes());
            out.extend_from_slice(&((field.values.len() * 4) as u32).to_le_bytes());
            for value in &field.values {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        out
    }
}

/// Append one length-delimited record to `writer`.
pub fn write_record<W: Write>(writer: &mut W, record: &RecordFields) -> std::io::Result<()> {
    let payload = record.payload();
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&payload)
}

/// Read the next record, or `None` at a clean end of stream.
///
/// A stream that ends inside a record is an error: the shard is malformed
/// and no partial-record recovery is attempted.
pub fn read_record<R: Read>(reader: &mut R) -> Result<Option<RecordFields>, RecordError> {
    let mut len_buf = [0u8; 4];
    if !fill_or_eof(reader, &mut len_buf)? {
        return Ok(None);
    }
    let payload_len = u32::from_le_bytes(len_buf);
    if payload_len > MAX_PAYLOAD_BYTES {
        return Err(RecordError::Oversized(payload_len));
    }
    let mut payload = vec![0u8; payload_len as usize];
    reader.read_exact(&mut payload).map_err(|err| {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            RecordError::Truncated("payload shorter than its length prefix")
        } else {
            RecordError::Io(err)
        }
    })?;
    decode_payload(&payload).map(Some)
}

fn decode_payload(payload: &[u8]) -> Result<RecordFields, RecordError> {
    let mut cursor = 0usize;
    let field_count = *payload
        .first()
        .ok_or(RecordError::Truncated("missing field count"))? as usize;
    cursor += 1;

    let mut fields = Vec::with_capacity(field_count);
    for _ in 0..field_count {
        let name_len = *payload
            .get(cursor)
            .ok_or(RecordError::Truncated("missing field name length"))?
            as usize;
        cursor += 1;
        let name_bytes = payload
            .get(cursor..cursor + name_len)
            .ok_or(RecordError::Truncated("field name out of bounds"))?;
        let name = std::str::from_utf8(name_bytes)
            .map_err(|_| RecordError::BadFieldName)?
            .to_string();
        cursor += name_len;

        let len_bytes = payload
            .get(cursor..cursor + 4)
            .ok_or(RecordError::Truncated("missing field data length"))?;
        let data_len = u32::from_le_bytes(len_bytes.try_into().expect("slice length checked")) as usize;
        cursor += 4;
        let data = payload
            .get(cursor..cursor + data_len)
            .ok_or(RecordError::Truncated("field data out of bounds"))?;
        cursor += data_len;
        if data_len % 4 != 0 {
            return Err(RecordError::Misaligned {
                name,
                bytes: data_len,
            });
        }
        let values = data
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes(chunk.try_into().expect("chunk size verified")))
            .collect();
        fields.push(RecordField { name, values });
    }
    if cursor != payload.len() {
        return Err(RecordError::Truncated("trailing bytes after last field"));
    }
    Ok(RecordFields { fields })
}

fn fill_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool, RecordError> {
    let mut filled = 0usize;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(RecordError::Truncated("length prefix cut short"));
        }
        filled += n;
    }
    Ok(true)
}
