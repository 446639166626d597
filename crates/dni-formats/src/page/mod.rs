//! Resource-page (PRP) binary reader and age text-file parser.
//!
//! Only the three keyed-object classes the dependency resolver cares about
//! (`SoundBuffer`, `PythonFileMod`, `RelevanceRegion`) are materialized; every
//! other key is skipped by its recorded `data_pos`/`data_length` without ever
//! reading its body.

pub mod error;

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use dni_crypto::{CipherKey, CipherReader};

use crate::manifestdb::flags::ManifestFlags;
pub use error::{PageError, Result};

/// `SoundBuffer` class id (`plSoundBuffer`).
const CLASS_SOUND_BUFFER: u16 = 0x0029;
/// `PythonFileMod` class id.
const CLASS_PYTHON_FILE_MOD: u16 = 0x00A2;
/// `RelevanceRegion` class id.
const CLASS_RELEVANCE_REGION: u16 = 0x011E;

const SOUND_IS_EXTERNAL: u32 = 1;
const SOUND_ALWAYS_EXTERNAL: u32 = 2;
const SOUND_ONLY_LEFT: u32 = 4;
const SOUND_ONLY_RIGHT: u32 = 8;
const SOUND_STREAM_COMPRESSED: u32 = 16;

const SYNCHED_HAS_EXCLUDED_STATE: u32 = 1 << 4;
const SYNCHED_HAS_VOLATILE_STATE: u32 = 1 << 6;

/// A page's two-part key into the D'ni coordinate space, and its raw fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// Raw sequence number as it appears on disk.
    pub sequence: u32,
    /// Location flags.
    pub flags: u16,
    /// Decoded age-relative prefix.
    pub prefix: i32,
    /// Decoded age-relative suffix.
    pub suffix: i32,
}

impl Location {
    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let sequence = read_u32(reader)?;
        let flags = read_u16(reader)?;
        let (prefix, suffix) = decode_location(sequence);
        Ok(Self {
            sequence,
            flags,
            prefix,
            suffix,
        })
    }
}

/// Decode a raw page-location sequence number into its `(prefix, suffix)`
/// pair, per the remap rule used throughout the Plasma key-location space.
fn decode_location(n: u32) -> (i32, i32) {
    if n & 0x8000_0000 != 0 {
        let adjusted = i64::from(n) - 0xFF00_0001;
        let raw_prefix = adjusted >> 16;
        let suffix = adjusted - (raw_prefix << 16);
        (-raw_prefix as i32, suffix as i32)
    } else {
        let adjusted = i64::from(n) - 33;
        let prefix = adjusted >> 16;
        let suffix = adjusted - (prefix << 16);
        (prefix as i32, suffix as i32)
    }
}

/// A keyed object identifier: location, class, and name.
#[derive(Debug, Clone)]
pub struct Uoid {
    /// The class id of the object this key identifies.
    pub class: u16,
    /// Object id, unique within `(location, class)`.
    pub object_id: u32,
    /// The object's safe-string name.
    pub name: String,
}

/// Read a `plKey`'s full `Uoid` body: `contents`, location, optional
/// load-mask, class, object id, name, and optional clone fields.
fn read_uoid<R: Read>(reader: &mut R) -> Result<Uoid> {
    let contents = read_u8(reader)?;
    let _location = Location::read(reader)?;
    if contents & 0x02 != 0 {
        let _load_mask = read_u8(reader)?;
    }
    let class = read_u16(reader)?;
    let object_id = read_u32(reader)?;
    let name = read_safe_string(reader)?;
    if contents & 0x01 != 0 {
        let _clone_id = read_u16(reader)?;
        let _clone_player_id = read_u16(reader)?;
        let _clone_id2 = read_u32(reader)?;
    }
    Ok(Uoid {
        class,
        object_id,
        name,
    })
}

/// Read an optional embedded `plKey` reference: a leading existence byte,
/// then the full `Uoid` body if non-zero.
fn read_optional_uoid<R: Read>(reader: &mut R) -> Result<Option<Uoid>> {
    let exists = read_u8(reader)?;
    if exists == 0 {
        return Ok(None);
    }
    Ok(Some(read_uoid(reader)?))
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u16<R: Read>(reader: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn skip<R: Read>(reader: &mut R, n: usize) -> Result<()> {
    let mut buf = vec![0u8; n];
    reader.read_exact(&mut buf)?;
    Ok(())
}

/// Read a Plasma "safe string": a length-prefixed, optionally
/// bit-inverted, possibly legacy-framed string.
fn read_safe_string<R: Read>(reader: &mut R) -> Result<String> {
    let len_with_flags = read_u16(reader)?;
    if (len_with_flags >> 12) == 0 {
        // Legacy 32-bit count field; present but unused.
        let _legacy_count = read_u16(reader)?;
    }
    let len = (len_with_flags & 0x0FFF) as usize;
    if len == 0 {
        return Ok(String::new());
    }
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    if bytes[0] & 0x80 != 0 {
        for b in &mut bytes {
            *b = !*b;
        }
    }
    Ok(String::from_utf8(bytes)?)
}

/// Write a Plasma "safe string" in its modern (non-legacy) form: a
/// length-prefixed string with the top nibble of the length field set so
/// readers never take the legacy 32-bit-count branch. Used by the Python
/// pack archive's module-name index (spec §4.8), which borrows this exact
/// framing from the page format (spec §4.2).
///
/// Bit-inversion is a read-side accommodation for the handful of
/// historical PRP strings whose first byte happened to have the high bit
/// set; every string this crate writes (module names) is plain ASCII, so
/// no inversion is ever needed here.
pub fn write_safe_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    debug_assert!(bytes.len() <= 0x0FFF, "safe string too long to encode");
    let len_with_flags = 0xF000 | (bytes.len() as u16 & 0x0FFF);
    buf.extend_from_slice(&len_with_flags.to_le_bytes());
    buf.extend_from_slice(bytes);
}

/// The fixed PRP page header.
#[derive(Debug, Clone)]
pub struct PageHeader {
    /// Format version; only `6` is supported.
    pub version: u32,
    /// The page's location.
    pub location: Location,
    /// Owning age name.
    pub age: String,
    /// Page name within the age.
    pub page: String,
    /// Secondary version field, not used for dispatch.
    pub version2: u16,
    /// Content checksum, not independently verified here.
    pub checksum: u32,
    /// Byte offset where keyed-object bodies begin.
    pub data_start: u32,
    /// Byte offset of the class-group key index.
    pub index_pos: u32,
}

impl PageHeader {
    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let version = read_u32(reader)?;
        if version != 6 {
            return Err(PageError::UnsupportedVersion(version));
        }
        let location = Location::read(reader)?;
        let age = read_safe_string(reader)?;
        let page = read_safe_string(reader)?;
        let version2 = read_u16(reader)?;
        let checksum = read_u32(reader)?;
        let data_start = read_u32(reader)?;
        let index_pos = read_u32(reader)?;
        Ok(Self {
            version,
            location,
            age,
            page,
            version2,
            checksum,
            data_start,
            index_pos,
        })
    }
}

/// A dependency contributed by one keyed object in a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDependency {
    /// The client-relative path the owning asset must be staged at.
    pub client_path: String,
    /// Flag bits to OR into the staged entry (see [`ManifestFlags`]).
    pub flags: u16,
}

/// A fully parsed page: its header and the dependencies it contributes.
#[derive(Debug, Clone)]
pub struct ParsedPage {
    /// The page's header.
    pub header: PageHeader,
    /// Dependencies gathered from its keyed objects.
    pub dependencies: Vec<PageDependency>,
}

struct KeyListEntry {
    class_id: u16,
    data_pos: u32,
}

/// Parse a page from any seekable reader positioned at its start.
pub fn read_page<R: Read + Seek>(reader: &mut R) -> Result<ParsedPage> {
    let header = PageHeader::read(reader)?;
    reader.seek(SeekFrom::Start(u64::from(header.index_pos)))?;

    let num_class_groups = read_u32(reader)?;
    let mut entries = Vec::new();
    for _ in 0..num_class_groups {
        let class_id = read_u16(reader)?;
        let _keylist_byte_length = read_u32(reader)?;
        let _discard = read_u8(reader)?;
        let num_keys = read_u32(reader)?;
        for _ in 0..num_keys {
            let _uoid = read_uoid(reader)?;
            let data_pos = read_u32(reader)?;
            let _data_length = read_u32(reader)?;
            if matches!(
                class_id,
                CLASS_SOUND_BUFFER | CLASS_PYTHON_FILE_MOD | CLASS_RELEVANCE_REGION
            ) {
                entries.push(KeyListEntry { class_id, data_pos });
            }
        }
    }

    let mut dependencies = Vec::new();
    for entry in entries {
        reader.seek(SeekFrom::Start(u64::from(entry.data_pos)))?;
        match entry.class_id {
            CLASS_SOUND_BUFFER => dependencies.push(read_sound_buffer(reader)?),
            CLASS_PYTHON_FILE_MOD => dependencies.push(read_python_file_mod(reader)?),
            CLASS_RELEVANCE_REGION => {
                dependencies.push(read_relevance_region(reader, &header.age)?);
            }
            _ => unreachable!("entries are pre-filtered to known classes"),
        }
    }

    Ok(ParsedPage {
        header,
        dependencies,
    })
}

/// Parse a page file from disk, transparently decrypting it if it carries an
/// XTEA or BTEA header.
pub fn read_page_file(path: &Path, key: Option<CipherKey>) -> Result<ParsedPage> {
    let raw = std::fs::read(path)?;
    let mut head = [0u8; 16];
    let avail = raw.len().min(16);
    head[..avail].copy_from_slice(&raw[..avail]);
    let encryption = dni_crypto::detect(&head);

    let plaintext = if encryption == dni_crypto::Encryption::Unspecified {
        raw
    } else {
        let key = key.unwrap_or_default();
        let mut reader = CipherReader::open(std::io::Cursor::new(raw), encryption, key)?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        buf
    };

    let mut cursor = std::io::Cursor::new(plaintext);
    read_page(&mut cursor)
}

fn read_sound_buffer<R: Read>(reader: &mut R) -> Result<PageDependency> {
    let _key = read_uoid(reader)?;
    let flags = read_u32(reader)?;
    let _body_data_length = read_u32(reader)?;
    let file_name = read_safe_string(reader)?;
    let _format_tag = read_u16(reader)?;
    let _channels = read_u16(reader)?;
    let _samples_per_sec = read_u32(reader)?;
    let _avg_bytes_per_sec = read_u32(reader)?;
    let _block_align = read_u16(reader)?;
    let _bits_per_sample = read_u16(reader)?;

    let entry_flags = if flags & SOUND_STREAM_COMPRESSED != 0 {
        ManifestFlags::SOUND_STREAM_COMPRESSED
    } else if flags & (SOUND_ONLY_LEFT | SOUND_ONLY_RIGHT) != 0 {
        ManifestFlags::SOUND_CACHE_SPLIT
    } else {
        ManifestFlags::SOUND_CACHE_STEREO
    };
    let _ = (SOUND_IS_EXTERNAL, SOUND_ALWAYS_EXTERNAL);

    Ok(PageDependency {
        client_path: format!("sfx/{file_name}"),
        flags: entry_flags,
    })
}

fn read_python_file_mod<R: Read>(reader: &mut R) -> Result<PageDependency> {
    let _key = read_uoid(reader)?;
    let synched_flags = read_u32(reader)?;
    if synched_flags & SYNCHED_HAS_EXCLUDED_STATE != 0 {
        skip_state_list(reader)?;
    }
    if synched_flags & SYNCHED_HAS_VOLATILE_STATE != 0 {
        skip_state_list(reader)?;
    }

    let n = read_u32(reader)?;
    skip(reader, 4 * n as usize)?;

    let file_name = read_safe_string(reader)?;

    Ok(PageDependency {
        client_path: format!("Python/{file_name}.py"),
        flags: ManifestFlags::PYTHON_FILE_MOD | ManifestFlags::SCRIPT | ManifestFlags::CONSUMABLE,
    })
}

fn skip_state_list<R: Read>(reader: &mut R) -> Result<()> {
    let count = read_u32(reader)?;
    for _ in 0..count {
        let len = read_u16(reader)?;
        skip(reader, len as usize)?;
    }
    Ok(())
}

/// A `plRelevanceRegion` key's mere presence in the page contributes the
/// age's region CSV — the region Uoid it carries is never inspected, only
/// read past (matches `dependencies.py`'s `get_keys(plRelevanceRegion)` check).
fn read_relevance_region<R: Read>(reader: &mut R, age: &str) -> Result<PageDependency> {
    let _key = read_uoid(reader)?;
    let _synched_flags = read_u32(reader)?;
    let _owner = read_optional_uoid(reader)?;
    let n = read_u32(reader)?;
    skip(reader, 4 * n as usize)?;
    let _region = read_optional_uoid(reader)?;

    Ok(PageDependency {
        client_path: format!("dat/{age}.csv"),
        flags: ManifestFlags::NONE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn write_safe_string(buf: &mut Vec<u8>, s: &str) {
        let len = s.len() as u16;
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(s.as_bytes());
    }

    #[test]
    fn decode_location_positive_range() {
        // n = 33 + (prefix << 16) + suffix, with high bit clear.
        let n = 33 + (7u32 << 16) + 9;
        assert_eq!(decode_location(n), (7, 9));
    }

    #[test]
    fn decode_location_high_bit_set() {
        assert_eq!(decode_location(0xFF00_0000), (1, 65535));
    }

    #[test]
    fn safe_string_round_trip_plain() {
        let mut buf = Vec::new();
        write_safe_string(&mut buf, "BuiltIn");
        let mut cur = Cursor::new(buf);
        assert_eq!(read_safe_string(&mut cur).unwrap(), "BuiltIn");
    }

    #[test]
    fn safe_string_empty() {
        let mut cur = Cursor::new(0u16.to_le_bytes().to_vec());
        assert_eq!(read_safe_string(&mut cur).unwrap(), "");
    }

    #[test]
    fn safe_string_bit_inverted() {
        let plain = b"hi";
        let mut buf = Vec::new();
        let len = plain.len() as u16 | 0x1000; // nonzero high nibble, no legacy field
        buf.extend_from_slice(&len.to_le_bytes());
        let inverted: Vec<u8> = plain.iter().map(|b| !b).collect();
        buf.extend_from_slice(&inverted);
        let mut cur = Cursor::new(buf);
        assert_eq!(read_safe_string(&mut cur).unwrap(), "hi");
    }

    fn sample_page_bytes() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&6u32.to_le_bytes()); // version
        buf.extend_from_slice(&100u32.to_le_bytes()); // location sequence
        buf.extend_from_slice(&0u16.to_le_bytes()); // location flags
        write_safe_string(&mut buf, "Teledahn");
        write_safe_string(&mut buf, "District");
        buf.extend_from_slice(&1u16.to_le_bytes()); // version2
        buf.extend_from_slice(&0u32.to_le_bytes()); // checksum
        buf.extend_from_slice(&0u32.to_le_bytes()); // data_start (unused by reader)
        let index_pos_offset = buf.len();
        buf.extend_from_slice(&0u32.to_le_bytes()); // index_pos placeholder

        let body_start = buf.len() as u32;
        // SoundBuffer body: uoid, flags, data_length, file_name, ...
        write_uoid(&mut buf, 0x0029, "snd");
        buf.extend_from_slice(&SOUND_STREAM_COMPRESSED.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        write_safe_string(&mut buf, "ambient.ogg");
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&2u16.to_le_bytes());
        buf.extend_from_slice(&44100u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&16u16.to_le_bytes());

        let index_pos = buf.len() as u32;
        buf[index_pos_offset..index_pos_offset + 4].copy_from_slice(&index_pos.to_le_bytes());

        buf.extend_from_slice(&1u32.to_le_bytes()); // num_class_groups
        buf.extend_from_slice(&0x0029u16.to_le_bytes()); // class_id
        buf.extend_from_slice(&0u32.to_le_bytes()); // keylist_byte_length
        buf.push(0); // discard
        buf.extend_from_slice(&1u32.to_le_bytes()); // num_keys
        write_uoid(&mut buf, 0x0029, "snd");
        buf.extend_from_slice(&body_start.to_le_bytes()); // data_pos
        buf.extend_from_slice(&0u32.to_le_bytes()); // data_length

        buf
    }

    fn write_uoid(buf: &mut Vec<u8>, class: u16, name: &str) {
        buf.push(0); // contents: no load-mask, no clone
        buf.extend_from_slice(&100u32.to_le_bytes()); // location sequence
        buf.extend_from_slice(&0u16.to_le_bytes()); // location flags
        buf.extend_from_slice(&class.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes()); // object_id
        write_safe_string(buf, name);
    }

    #[test]
    fn reads_sound_buffer_dependency() {
        let bytes = sample_page_bytes();
        let mut cur = Cursor::new(bytes);
        let parsed = read_page(&mut cur).unwrap();
        assert_eq!(parsed.header.age, "Teledahn");
        assert_eq!(parsed.dependencies.len(), 1);
        assert_eq!(parsed.dependencies[0].client_path, "sfx/ambient.ogg");
        assert_eq!(
            parsed.dependencies[0].flags,
            ManifestFlags::SOUND_STREAM_COMPRESSED
        );
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&5u32.to_le_bytes());
        let mut cur = Cursor::new(buf);
        assert!(matches!(
            read_page(&mut cur),
            Err(PageError::UnsupportedVersion(5))
        ));
    }

    #[test]
    fn skips_unknown_class_without_reading_body() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&6u32.to_le_bytes());
        buf.extend_from_slice(&100u32.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        write_safe_string(&mut buf, "Age");
        write_safe_string(&mut buf, "Page");
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        let index_pos = buf.len() as u32 + 4;
        buf.extend_from_slice(&index_pos.to_le_bytes());

        buf.extend_from_slice(&1u32.to_le_bytes()); // num_class_groups
        buf.extend_from_slice(&0x9999u16.to_le_bytes()); // unknown class
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.push(0);
        buf.extend_from_slice(&1u32.to_le_bytes()); // num_keys
        write_uoid(&mut buf, 0x9999, "whatever");
        buf.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes()); // bogus data_pos, never read
        buf.extend_from_slice(&0u32.to_le_bytes());

        let mut cur = Cursor::new(buf);
        let parsed = read_page(&mut cur).unwrap();
        assert!(parsed.dependencies.is_empty());
    }

    #[allow(dead_code)]
    fn silence_unused_write(mut w: impl Write) {
        let _ = w.write_all(b"");
    }
}
