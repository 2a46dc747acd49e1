use std::{collections::BTreeMap, iter::Peekable};

use bstr::ByteSlice;
use sha1::{Digest, Sha1};

use crate::error::TorrentParserError;

/// A decoded bencode value.
///
/// Dictionary keys are kept as raw bytes in a sorted map, which is the
/// canonical bencode key order, so [`Field::encode`] reproduces any
/// canonically encoded input byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    String(Vec<u8>),
    Integer(i64),
    List(Vec<Field>),
    Dict(BTreeMap<Vec<u8>, Field>),
}

impl Field {
    pub fn field_type(&self) -> &'static str {
        match self {
            Field::String(_) => "String",
            Field::Integer(_) => "Integer",
            Field::List(_) => "List",
            Field::Dict(_) => "Dict",
        }
    }

    /// Decodes exactly one value, trailing bytes are an error.
    pub fn decode(bencoded: &[u8]) -> Result<Field, TorrentParserError> {
        let mut buffer = bencoded.iter().copied().peekable();
        let field = get_field_type(&mut buffer, 0)?.ok_or(TorrentParserError::InvalidStructure(
            "Expected field".to_string(),
        ))?;
        if buffer.next().is_some() {
            return Err(TorrentParserError::InvalidStructure(
                "Trailing bytes after root field".to_string(),
            ));
        }
        Ok(field)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Field::String(bytes) => {
                out.extend_from_slice(bytes.len().to_string().as_bytes());
                out.push(b':');
                out.extend_from_slice(bytes);
            }
            Field::Integer(value) => {
                out.push(b'i');
                out.extend_from_slice(value.to_string().as_bytes());
                out.push(b'e');
            }
            Field::List(list) => {
                out.push(b'l');
                for field in list {
                    field.encode_into(out);
                }
                out.push(b'e');
            }
            Field::Dict(dict) => {
                out.push(b'd');
                for (key, value) in dict {
                    out.extend_from_slice(key.len().to_string().as_bytes());
                    out.push(b':');
                    out.extend_from_slice(key);
                    value.encode_into(out);
                }
                out.push(b'e');
            }
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, Field>> {
        match self {
            Field::Dict(dict) => Some(dict),
            _ => None,
        }
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Field::String(value.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for Field {
    fn from(value: Vec<u8>) -> Self {
        Field::String(value)
    }
}

impl From<i64> for Field {
    fn from(value: i64) -> Self {
        Field::Integer(value)
    }
}

/// SHA-1 of the canonical encoding of an `info` dictionary.
pub(crate) fn info_hash(info: &Field) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(info.encode());
    hasher.finalize().into()
}

fn read_until<I: Iterator<Item = u8>>(
    buffer: &mut Peekable<I>,
    first: Option<u8>,
    terminator: u8,
    what: &str,
) -> Result<Vec<u8>, TorrentParserError> {
    let mut digits = Vec::new();
    digits.extend(first);
    loop {
        match buffer.next() {
            Some(c) if c == terminator => return Ok(digits),
            Some(c) if c.is_ascii_digit() || (c == b'-' && digits.is_empty()) => digits.push(c),
            Some(c) => {
                return Err(TorrentParserError::InvalidStructure(format!(
                    "Unexpected byte {:?} in {}",
                    [c].as_bstr(),
                    what
                )))
            }
            None => {
                return Err(TorrentParserError::InvalidStructure(format!(
                    "Unexpected end for {}",
                    what
                )))
            }
        }
    }
}

fn check_canonical_integer(digits: &[u8]) -> Result<(), TorrentParserError> {
    let unsigned = digits.strip_prefix(b"-").unwrap_or(digits);
    let canonical = !unsigned.is_empty()
        && (unsigned == b"0" && digits.len() == 1 || unsigned[0] != b'0');
    if canonical {
        Ok(())
    } else {
        Err(TorrentParserError::InvalidStructure(format!(
            "Non canonical integer {:?}",
            digits.as_bstr()
        )))
    }
}

/// Deepest list or dictionary nesting the decoder accepts.
pub const MAX_DEPTH: usize = 64;

pub(crate) fn get_field_type<I: Iterator<Item = u8>>(
    buffer: &mut Peekable<I>,
    depth: usize,
) -> Result<Option<Field>, TorrentParserError> {
    let specifier = buffer.next();
    if matches!(specifier, Some(b'l' | b'd')) && depth >= MAX_DEPTH {
        return Err(TorrentParserError::InvalidStructure(format!(
            "Nesting deeper than {} levels",
            MAX_DEPTH
        )));
    }

    match specifier {
        None => Ok(None),
        Some(c) if c.is_ascii_digit() => {
            // get until the colon
            let length = read_until(buffer, Some(c), b':', "string length")?;
            let length = String::from_utf8(length)?.parse::<usize>()?;
            let field: Vec<u8> = buffer.by_ref().take(length).collect();
            if field.len() != length {
                return Err(TorrentParserError::InvalidStructure(format!(
                    "Unexpected end for string, expected length {}, ending at {}",
                    length,
                    field.len()
                )));
            }
            Ok(Some(Field::String(field)))
        }
        Some(b'i') => {
            // get until the e
            let digits = read_until(buffer, None, b'e', "integer")?;
            check_canonical_integer(&digits)?;
            let field = String::from_utf8(digits)?.parse::<i64>()?;
            Ok(Some(Field::Integer(field)))
        }
        Some(b'l') => {
            let mut list = Vec::new();
            loop {
                let peek_next = buffer.peek().ok_or(TorrentParserError::InvalidStructure(
                    "Unexpected end for list".to_string(),
                ))?;
                if *peek_next == b'e' {
                    buffer.next();
                    break;
                }
                match get_field_type(buffer, depth + 1)? {
                    Some(field) => list.push(field),
                    None => {
                        return Err(TorrentParserError::InvalidStructure(
                            "Unexpected end for list".to_string(),
                        ))
                    }
                }
            }
            Ok(Some(Field::List(list)))
        }
        Some(b'd') => {
            let mut dict = BTreeMap::new();
            loop {
                let peek_next = buffer.peek().ok_or(TorrentParserError::InvalidStructure(
                    "Unexpected end for dict".to_string(),
                ))?;
                if *peek_next == b'e' {
                    buffer.next();
                    break;
                }
                let key = match get_field_type(buffer, depth + 1)? {
                    Some(Field::String(key)) => key,
                    Some(other) => {
                        return Err(TorrentParserError::FieldTypeError {
                            field: "dictionary key".to_string(),
                            expected: "String",
                            found: other.field_type(),
                        })
                    }
                    None => {
                        return Err(TorrentParserError::InvalidStructure(
                            "Unexpected end for dict".to_string(),
                        ))
                    }
                };
                match get_field_type(buffer, depth + 1)? {
                    Some(value) => {
                        dict.insert(key, value);
                    }
                    None => {
                        return Err(TorrentParserError::InvalidStructure(
                            "Expected value for dictionary".to_string(),
                        ))
                    }
                }
            }
            Ok(Some(Field::Dict(dict)))
        }
        Some(c) => Err(TorrentParserError::UnknownSpecifier(c)),
    }
}
