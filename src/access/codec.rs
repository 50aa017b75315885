//! Row wire format.
//!
//! Columns are written back to back in schema order with no header:
//! INT is an i32 little-endian, TEXT a u16 little-endian byte length followed
//! by the UTF-8 bytes, BOOLEAN a single byte. A record is only readable with
//! the schema that wrote it.

use crate::access::error::{RelationError, RelationResult};
use crate::access::schema::ColumnSchema;
use crate::access::value::{DataType, Row, Value};
use crate::storage::{SlottedPage, StorageError};
use bytes::{Buf, BufMut};

/// Longest TEXT value that fits the u16 length prefix.
pub const MAX_TEXT_LEN: usize = u16::MAX as usize;

/// Largest encoded row, the largest record a page can hold.
pub const MAX_ROW_SIZE: usize = SlottedPage::max_record_size();

/// Encodes a complete row. Extra keys in `row` are ignored.
pub fn marshal(schema: &ColumnSchema, row: &Row) -> RelationResult<Vec<u8>> {
    let mut data = Vec::with_capacity(encoded_len(schema, row).min(MAX_ROW_SIZE));

    for column in schema {
        let value = row
            .get(&column.name)
            .ok_or_else(|| RelationError::Incomplete(column.name.clone()))?;

        let width = match (column.data_type, value) {
            (DataType::Int, Value::Int(_)) => 4,
            (DataType::Text, Value::Text(s)) => {
                if s.len() > MAX_TEXT_LEN {
                    return Err(RelationError::TextTooLong {
                        column: column.name.clone(),
                        len: s.len(),
                        max: MAX_TEXT_LEN,
                    });
                }
                2 + s.len()
            }
            (DataType::Boolean, Value::Boolean(_)) => 1,
            (expected, found) => {
                return Err(RelationError::TypeMismatch {
                    column: column.name.clone(),
                    expected,
                    found: found.data_type(),
                })
            }
        };

        if data.len() + width > MAX_ROW_SIZE {
            return Err(RelationError::RowTooLarge {
                size: data.len() + width,
                max: MAX_ROW_SIZE,
            });
        }

        match value {
            Value::Int(n) => data.put_i32_le(*n),
            Value::Text(s) => {
                data.put_u16_le(s.len() as u16);
                data.put_slice(s.as_bytes());
            }
            Value::Boolean(b) => data.put_u8(u8::from(*b)),
        }
    }

    Ok(data)
}

/// Decodes a record written by [`marshal`] under the same schema.
pub fn unmarshal(schema: &ColumnSchema, data: &[u8]) -> RelationResult<Row> {
    let mut buf = data;
    let mut row = Row::new();

    for column in schema {
        let value = match column.data_type {
            DataType::Int => {
                need(buf, 4, &column.name)?;
                Value::Int(buf.get_i32_le())
            }
            DataType::Text => {
                need(buf, 2, &column.name)?;
                let len = buf.get_u16_le() as usize;
                need(buf, len, &column.name)?;
                let text = String::from_utf8(buf[..len].to_vec()).map_err(|_| {
                    StorageError::CorruptRecord(format!(
                        "column '{}' is not valid UTF-8",
                        column.name
                    ))
                })?;
                buf.advance(len);
                Value::Text(text)
            }
            DataType::Boolean => {
                need(buf, 1, &column.name)?;
                Value::Boolean(buf.get_u8() != 0)
            }
        };
        row.insert(column.name.clone(), value);
    }

    if buf.has_remaining() {
        return Err(StorageError::CorruptRecord(format!(
            "{} trailing bytes after last column",
            buf.remaining()
        ))
        .into());
    }

    Ok(row)
}

fn need(buf: &[u8], len: usize, column: &str) -> RelationResult<()> {
    if buf.len() < len {
        return Err(StorageError::CorruptRecord(format!(
            "record truncated in column '{}': need {} bytes, have {}",
            column,
            len,
            buf.len()
        ))
        .into());
    }
    Ok(())
}

fn encoded_len(schema: &ColumnSchema, row: &Row) -> usize {
    schema
        .iter()
        .map(|column| match row.get(&column.name) {
            Some(Value::Text(s)) => 2 + s.len(),
            Some(Value::Boolean(_)) => 1,
            _ => 4,
        })
        .sum()
}
