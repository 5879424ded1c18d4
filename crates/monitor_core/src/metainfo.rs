use bip_bencode::{BDecodeOpt, BRefAccess, BencodeRef};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetainfoError {
    #[error("not a bencoded torrent: {0}")]
    Decode(String),
    #[error("metainfo has no `info` dictionary")]
    MissingInfo,
    #[error("metainfo declares no file lengths")]
    MissingLength,
    #[error("metainfo length is negative or overflows")]
    InvalidLength,
}

/// Total payload size declared by a `.torrent` file.
///
/// Single-file torrents carry `info.length`; multi-file torrents sum
/// `info.files[].length`.
pub fn torrent_size(bytes: &[u8]) -> Result<u64, MetainfoError> {
    let root = BencodeRef::decode(bytes, BDecodeOpt::default())
        .map_err(|err| MetainfoError::Decode(err.to_string()))?;
    let info = root
        .dict()
        .and_then(|dict| dict.lookup(b"info"))
        .and_then(|info| info.dict())
        .ok_or(MetainfoError::MissingInfo)?;

    if let Some(length) = info.lookup(b"length") {
        return length_of(length);
    }

    let files = info
        .lookup(b"files")
        .and_then(|files| files.list())
        .ok_or(MetainfoError::MissingLength)?;
    let mut total: u64 = 0;
    for index in 0..files.len() {
        let length = files
            .get(index)
            .and_then(|file| file.dict())
            .and_then(|file| file.lookup(b"length"))
            .ok_or(MetainfoError::MissingLength)?;
        total = total
            .checked_add(length_of(length)?)
            .ok_or(MetainfoError::InvalidLength)?;
    }
    Ok(total)
}

fn length_of(value: &BencodeRef<'_>) -> Result<u64, MetainfoError> {
    let raw = value.int().ok_or(MetainfoError::MissingLength)?;
    u64::try_from(raw).map_err(|_| MetainfoError::InvalidLength)
}
