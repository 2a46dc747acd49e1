use std::{
    collections::BTreeMap,
    net::{IpAddr, Ipv4Addr},
    path::Path,
};

use bstr::ByteSlice;
use byteorder::{BigEndian, ByteOrder};
use error::TorrentParserError;
use field::info_hash;
use model::{
    InfoFile, Peer, Sha1Hash, TorrentDescriptor, TrackerResponse, TrackerSuccessResponse,
};

pub mod error;
mod field;
pub mod model;

pub use field::Field;

type Dict = BTreeMap<Vec<u8>, Field>;

fn type_error(key: &str, expected: &'static str, found: &Field) -> TorrentParserError {
    TorrentParserError::FieldTypeError {
        field: key.to_string(),
        expected,
        found: found.field_type(),
    }
}

fn missing(key: &str) -> TorrentParserError {
    TorrentParserError::MissingRequiredField(key.to_string())
}

fn get_bytes<'a>(dict: &'a Dict, key: &str) -> Result<Option<&'a [u8]>, TorrentParserError> {
    match dict.get(key.as_bytes()) {
        Some(Field::String(bytes)) => Ok(Some(bytes)),
        None => Ok(None),
        Some(other) => Err(type_error(key, "String", other)),
    }
}

fn get_string(dict: &Dict, key: &str) -> Result<Option<String>, TorrentParserError> {
    get_bytes(dict, key)?
        .map(|bytes| String::from_utf8(bytes.to_vec()).map_err(TorrentParserError::from))
        .transpose()
}

fn get_integer(dict: &Dict, key: &str) -> Result<Option<i64>, TorrentParserError> {
    match dict.get(key.as_bytes()) {
        Some(Field::Integer(value)) => Ok(Some(*value)),
        None => Ok(None),
        Some(other) => Err(type_error(key, "Integer", other)),
    }
}

fn get_list<'a>(dict: &'a Dict, key: &str) -> Result<Option<&'a [Field]>, TorrentParserError> {
    match dict.get(key.as_bytes()) {
        Some(Field::List(list)) => Ok(Some(list)),
        None => Ok(None),
        Some(other) => Err(type_error(key, "List", other)),
    }
}

fn string_list(key: &str, list: &[Field]) -> Result<Vec<String>, TorrentParserError> {
    list.iter()
        .map(|field| match field {
            Field::String(value) => String::from_utf8(value.clone()).map_err(Into::into),
            other => Err(type_error(key, "String", other)),
        })
        .collect()
}

fn non_negative(key: &str, value: i64) -> Result<u64, TorrentParserError> {
    u64::try_from(value).map_err(|_| TorrentParserError::InvalidValue {
        field: key.to_string(),
        value,
    })
}

fn root_dict(bencoded: &[u8]) -> Result<Dict, TorrentParserError> {
    // the root element should be a dictionary
    match Field::decode(bencoded)? {
        Field::Dict(dict) => Ok(dict),
        other => Err(type_error("root", "Dict", &other)),
    }
}

/// Decodes a bencoded torrent descriptor.
///
/// The info-hash is the SHA-1 of the re-encoded `info` dictionary, which is
/// the original byte span whenever the descriptor is canonically encoded.
pub fn parse_descriptor(bencoded: &[u8]) -> Result<TorrentDescriptor, TorrentParserError> {
    let dict = root_dict(bencoded)?;

    // read announce
    let announce = get_string(&dict, "announce")?.ok_or_else(|| missing("announce"))?;

    // read optional announce-list
    let announce_list = match get_list(&dict, "announce-list")? {
        Some(tiers) => {
            let mut tiers = tiers
                .iter()
                .map(|tier| match tier {
                    Field::List(list) => string_list("announce-list", list),
                    other => Err(type_error("announce-list", "List", other)),
                })
                .collect::<Result<Vec<Vec<String>>, TorrentParserError>>()?;
            tiers.dedup();
            Some(tiers)
        }
        None => None,
    };

    let comment = get_string(&dict, "comment")?;
    let created_by = get_string(&dict, "created by")?;
    let creation_date = get_integer(&dict, "creation date")?;

    // read info
    let info_field = dict.get(b"info".as_slice()).ok_or_else(|| missing("info"))?;
    let info = info_field
        .as_dict()
        .ok_or_else(|| type_error("info", "Dict", info_field))?;

    // read piece length
    let piece_length = get_integer(info, "piece length")?.ok_or_else(|| missing("piece length"))?;
    if piece_length <= 0 {
        return Err(TorrentParserError::InvalidValue {
            field: "piece length".to_string(),
            value: piece_length,
        });
    }

    // divide pieces into 20-byte SHA1 hashes
    let pieces = get_bytes(info, "pieces")?.ok_or_else(|| missing("pieces"))?;
    if pieces.len() % 20 != 0 {
        return Err(TorrentParserError::MalformedPieces(pieces.len()));
    }
    let pieces = pieces
        .chunks_exact(20)
        .map(|chunk| {
            let mut hash: Sha1Hash = [0; 20];
            hash.copy_from_slice(chunk);
            hash
        })
        .collect::<Vec<Sha1Hash>>();

    let private = get_integer(info, "private")?.map(|private| private != 0);

    // names are display only, so a non UTF-8 name is not fatal
    let name = get_bytes(info, "name")?
        .ok_or_else(|| missing("name"))?
        .to_str_lossy()
        .into_owned();

    // read optional files
    let files = match get_list(info, "files")? {
        Some(files) => Some(
            files
                .iter()
                .map(|file| -> Result<InfoFile, TorrentParserError> {
                    let file = file.as_dict().ok_or_else(|| type_error("files", "Dict", file))?;
                    let length = get_integer(file, "length")?.ok_or_else(|| missing("length"))?;
                    let path = get_list(file, "path")?.ok_or_else(|| missing("path"))?;
                    Ok(InfoFile {
                        length: non_negative("length", length)?,
                        path: string_list("path", path)?,
                    })
                })
                .collect::<Result<Vec<InfoFile>, TorrentParserError>>()?,
        ),
        None => None,
    };

    // single-file length, or the sum of the sequential file layout
    let length = match (get_integer(info, "length")?, &files) {
        (Some(length), _) => non_negative("length", length)?,
        (None, Some(files)) => files
            .iter()
            .try_fold(0u64, |total, file| total.checked_add(file.length))
            .ok_or_else(|| {
                TorrentParserError::InvalidStructure("Total file length overflows".to_string())
            })?,
        (None, None) => return Err(missing("length")),
    };
    if length == 0 {
        return Err(TorrentParserError::InvalidValue {
            field: "length".to_string(),
            value: 0,
        });
    }

    // one hash per piece, the last piece may be short
    let piece_length = piece_length as u64;
    let expected = length.div_ceil(piece_length);
    if expected != pieces.len() as u64 {
        return Err(TorrentParserError::PieceCountMismatch {
            length,
            piece_length,
            expected,
            found: pieces.len(),
        });
    }

    Ok(TorrentDescriptor {
        announce,
        announce_list,
        comment,
        created_by,
        creation_date,
        name,
        piece_length,
        pieces,
        private,
        files,
        length,
        info_hash: info_hash(info_field),
    })
}

pub fn open_descriptor(file_path: impl AsRef<Path>) -> Result<TorrentDescriptor, TorrentParserError> {
    let bencoded = std::fs::read(file_path)?;
    parse_descriptor(&bencoded)
}

/// Splits a compact peer string into 6-byte IPv4 + port records.
pub fn parse_compact_peers(peers: &[u8]) -> Result<Vec<Peer>, TorrentParserError> {
    if peers.len() % 6 != 0 {
        return Err(TorrentParserError::MalformedPeers(peers.len()));
    }
    Ok(peers
        .chunks_exact(6)
        .map(|record| Peer {
            ip: IpAddr::V4(Ipv4Addr::new(record[0], record[1], record[2], record[3])),
            port: BigEndian::read_u16(&record[4..6]),
        })
        .collect())
}

pub fn parse_tracker_response(bencoded: &[u8]) -> Result<TrackerResponse, TorrentParserError> {
    let root_field = root_dict(bencoded)?;

    if let Some(reason) = get_bytes(&root_field, "failure reason")? {
        return Ok(TrackerResponse::Failure(reason.to_str_lossy().into_owned()));
    }

    let warning = get_bytes(&root_field, "warning message")?
        .map(|warning| warning.to_str_lossy().into_owned());

    let peers = match root_field.get(b"peers".as_slice()) {
        Some(Field::String(compact)) => parse_compact_peers(compact)?,
        Some(Field::List(peers)) => peers
            .iter()
            .map(|peer| -> Result<Peer, TorrentParserError> {
                let peer = peer.as_dict().ok_or_else(|| type_error("peers", "Dict", peer))?;
                let ip = get_string(peer, "ip")?.ok_or_else(|| missing("ip"))?;
                let ip = ip.parse::<IpAddr>().map_err(|_| {
                    TorrentParserError::InvalidStructure(format!("Invalid peer ip {}", ip))
                })?;
                let port = get_integer(peer, "port")?.ok_or_else(|| missing("port"))?;
                let port = u16::try_from(port).map_err(|_| TorrentParserError::InvalidValue {
                    field: "port".to_string(),
                    value: port,
                })?;
                Ok(Peer { ip, port })
            })
            .collect::<Result<Vec<Peer>, TorrentParserError>>()?,
        Some(other) => return Err(type_error("peers", "List or String", other)),
        None => return Err(missing("peers")),
    };

    Ok(TrackerResponse::Success(TrackerSuccessResponse {
        interval: get_integer(&root_field, "interval")?,
        min_interval: get_integer(&root_field, "min interval")?,
        tracker_id: get_string(&root_field, "tracker id")?,
        complete: get_integer(&root_field, "complete")?,
        incomplete: get_integer(&root_field, "incomplete")?,
        warning,
        peers,
    }))
}
