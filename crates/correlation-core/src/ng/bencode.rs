//! Bencode decoding for NG control messages
//!
//! An NG message is `<cookie> <bencoded dictionary>`. Byte strings are kept
//! as raw bytes; dictionary keys must be UTF-8.

use std::collections::BTreeMap;

use bytes::Bytes;

use super::{NgDecoder, NgMessage, NgValue};
use crate::error::NgError;

/// Deepest list/dictionary nesting accepted
pub const MAX_DEPTH: usize = 64;

type Result<T> = std::result::Result<T, NgError>;

/// Splits off the cookie and bencode-decodes the rest
#[derive(Debug, Clone, Copy, Default)]
pub struct BencodeNgDecoder;

impl BencodeNgDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl NgDecoder for BencodeNgDecoder {
    fn decode(&self, payload: &[u8]) -> Result<NgMessage> {
        if payload.is_empty() {
            return Err(NgError::Empty);
        }
        let space = memchr::memchr(b' ', payload).ok_or(NgError::MissingCookie)?;
        if space == 0 {
            return Err(NgError::MissingCookie);
        }

        let body_start = space + 1;
        let mut parser = Parser {
            input: payload,
            pos: body_start,
        };
        let value = parser.value(0)?;
        if parser.pos != payload.len() {
            return Err(NgError::TrailingData(payload.len() - parser.pos));
        }

        Ok(NgMessage {
            cookie: Bytes::copy_from_slice(&payload[..space]),
            value,
        })
    }
}

/// Decode a single bencoded value spanning all of `input`
pub fn decode_value(input: &[u8]) -> Result<NgValue> {
    let mut parser = Parser { input, pos: 0 };
    let value = parser.value(0)?;
    if parser.pos != input.len() {
        return Err(NgError::TrailingData(input.len() - parser.pos));
    }
    Ok(value)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Result<u8> {
        self.input
            .get(self.pos)
            .copied()
            .ok_or(NgError::UnexpectedEof(self.pos))
    }

    fn value(&mut self, depth: usize) -> Result<NgValue> {
        match self.peek()? {
            b'i' => {
                self.pos += 1;
                let number = self.number_until(b'e')?;
                Ok(NgValue::Integer(number))
            }
            b'0'..=b'9' => Ok(NgValue::Bytes(Bytes::copy_from_slice(self.byte_string()?))),
            b'l' => {
                let depth = self.descend(depth)?;
                let mut items = Vec::new();
                while self.peek()? != b'e' {
                    items.push(self.value(depth)?);
                }
                self.pos += 1;
                Ok(NgValue::List(items))
            }
            b'd' => {
                let depth = self.descend(depth)?;
                let mut entries = BTreeMap::new();
                while self.peek()? != b'e' {
                    let key_offset = self.pos;
                    let key = std::str::from_utf8(self.byte_string()?)
                        .map_err(|_| NgError::InvalidKey(key_offset))?
                        .to_owned();
                    let value = self.value(depth)?;
                    entries.insert(key, value);
                }
                self.pos += 1;
                Ok(NgValue::Dict(entries))
            }
            byte => Err(NgError::InvalidByte {
                byte,
                offset: self.pos,
            }),
        }
    }

    fn descend(&mut self, depth: usize) -> Result<usize> {
        if depth >= MAX_DEPTH {
            return Err(NgError::TooDeep(MAX_DEPTH));
        }
        self.pos += 1;
        Ok(depth + 1)
    }

    /// `<len>:<bytes>`
    fn byte_string(&mut self) -> Result<&'a [u8]> {
        let start = self.pos;
        let len = self.number_until(b':')?;
        let len = usize::try_from(len).map_err(|_| NgError::InvalidNumber(start))?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.input.len())
            .ok_or(NgError::UnexpectedEof(self.input.len()))?;
        let bytes = &self.input[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Decimal number terminated by `terminator`, which is consumed
    fn number_until(&mut self, terminator: u8) -> Result<i64> {
        let start = self.pos;
        let rest = &self.input[start..];
        let end = memchr::memchr(terminator, rest).ok_or(NgError::UnexpectedEof(self.input.len()))?;
        let digits = std::str::from_utf8(&rest[..end]).map_err(|_| NgError::InvalidNumber(start))?;
        let number = digits.parse::<i64>().map_err(|_| NgError::InvalidNumber(start))?;
        self.pos = start + end + 1;
        Ok(number)
    }
}
