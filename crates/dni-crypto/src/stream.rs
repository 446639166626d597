//! Framed, random-access-free encrypted file streams.
//!
//! Wire framing (identical for both ciphers): a 12-byte ASCII magic, a
//! little-endian `u32` plaintext length, then `ceil(length/8)*8` cipher
//! bytes. `whatdoyousee` selects XTEA (`BriceIsSmart` is accepted as an
//! alternate magic on read only), `notthedroids` selects BTEA. Any other or
//! short header is treated as a plain, unencrypted file.

use std::io::{self, Read, Seek, SeekFrom, Write};

use tracing::debug;

use crate::btea;
use crate::error::CryptoError;
use crate::key::CipherKey;
use crate::xtea;

const MAGIC_XTEA: &[u8; 12] = b"whatdoyousee";
const MAGIC_XTEA_ALT: &[u8; 12] = b"BriceIsSmart";
const MAGIC_BTEA: &[u8; 12] = b"notthedroids";
const HEADER_LEN: usize = 16;

/// Which cipher frames a stream, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    /// No recognized magic; treat as plain data.
    Unspecified,
    /// `whatdoyousee` / `BriceIsSmart`.
    Xtea,
    /// `notthedroids`.
    Btea,
}

impl Encryption {
    fn magic(self) -> Option<&'static [u8; 12]> {
        match self {
            Self::Xtea => Some(MAGIC_XTEA),
            Self::Btea => Some(MAGIC_BTEA),
            Self::Unspecified => None,
        }
    }

    fn encipher(self, block: (u32, u32), key: &CipherKey) -> (u32, u32) {
        match self {
            Self::Xtea => xtea::encipher(block, key),
            Self::Btea => btea::encipher(block, key),
            Self::Unspecified => block,
        }
    }

    fn decipher(self, block: (u32, u32), key: &CipherKey) -> (u32, u32) {
        match self {
            Self::Xtea => xtea::decipher(block, key),
            Self::Btea => btea::decipher(block, key),
            Self::Unspecified => block,
        }
    }
}

/// Inspect the first 16 bytes of a header buffer and determine its
/// encryption, defaulting to [`Encryption::Unspecified`] on any mismatch or
/// short read.
pub fn detect(header: &[u8]) -> Encryption {
    if header.len() < HEADER_LEN {
        return Encryption::Unspecified;
    }
    let magic: &[u8; 12] = header[..12].try_into().unwrap_or(&[0; 12]);
    if magic == MAGIC_XTEA || magic == MAGIC_XTEA_ALT {
        Encryption::Xtea
    } else if magic == MAGIC_BTEA {
        Encryption::Btea
    } else {
        Encryption::Unspecified
    }
}

/// Read the magic from a file-like source without consuming more than the
/// header, for the orchestrator's "what encryption does this source already
/// have" check (spec §4.7 step 1).
pub fn detect_from_reader<R: Read>(mut reader: R) -> io::Result<Encryption> {
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header) {
        Ok(()) => Ok(detect(&header)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(Encryption::Unspecified),
        Err(e) => Err(e),
    }
}

/// A stream decoded through the block cipher, yielding exactly `length`
/// plaintext bytes regardless of block padding on the wire.
pub struct CipherReader<R> {
    inner: R,
    encryption: Encryption,
    key: CipherKey,
    length: u32,
    pos: u32,
    block: [u8; 8],
}

impl<R: Read> CipherReader<R> {
    /// Open a reader whose 16-byte header has already been determined to
    /// carry `encryption`. The 16-byte header (magic + length) is consumed
    /// here; the header's magic is not re-validated against `encryption`
    /// (mirrors the original accepting `BriceIsSmart` as an XTEA alias).
    pub fn open(mut inner: R, encryption: Encryption, key: CipherKey) -> Result<Self, CryptoError> {
        let mut header = [0u8; HEADER_LEN];
        inner
            .read_exact(&mut header)
            .map_err(|_| CryptoError::TruncatedHeader)?;
        let length = u32::from_le_bytes(header[12..16].try_into().unwrap_or([0; 4]));
        debug!(?encryption, length, "opened encrypted stream");
        Ok(Self {
            inner,
            encryption,
            key,
            length,
            pos: 0,
            block: [0; 8],
        })
    }

    /// Declared plaintext length from the header.
    pub fn len(&self) -> u32 {
        self.length
    }

    /// Whether the declared plaintext length is zero.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl<R: Read> Read for CipherReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = (self.length - self.pos) as usize;
        let want = buf.len().min(remaining);
        let mut written = 0;
        while written < want {
            let block_off = (self.pos % 8) as usize;
            if block_off == 0 {
                let mut raw = [0u8; 8];
                self.inner.read_exact(&mut raw)?;
                let v0 = u32::from_le_bytes(raw[0..4].try_into().unwrap());
                let v1 = u32::from_le_bytes(raw[4..8].try_into().unwrap());
                let (d0, d1) = self.encryption.decipher((v0, v1), &self.key);
                self.block[0..4].copy_from_slice(&d0.to_le_bytes());
                self.block[4..8].copy_from_slice(&d1.to_le_bytes());
            }
            let avail = 8 - block_off;
            let take = avail.min(want - written);
            buf[written..written + take].copy_from_slice(&self.block[block_off..block_off + take]);
            written += take;
            self.pos += take as u32;
        }
        Ok(written)
    }
}

/// A stream encoded through the block cipher. Any trailing bytes in the
/// last block beyond the declared length are undefined on the wire but are
/// never exposed to a paired [`CipherReader`].
pub struct CipherWriter<W> {
    inner: W,
    encryption: Encryption,
    key: CipherKey,
    pos: u32,
    block: [u8; 8],
}

impl<W: Write + Seek> CipherWriter<W> {
    /// Begin a new encrypted stream. `encryption` must not be
    /// [`Encryption::Unspecified`] — writable streams require an explicit
    /// kind.
    pub fn create(mut inner: W, encryption: Encryption, key: CipherKey) -> Result<Self, CryptoError> {
        let magic = encryption
            .magic()
            .ok_or(CryptoError::UnspecifiedWriteEncryption)?;
        inner.write_all(magic)?;
        inner.write_all(&0u32.to_le_bytes())?;
        Ok(Self {
            inner,
            encryption,
            key,
            pos: 0,
            block: [0; 8],
        })
    }

    fn flush_block(&mut self) -> io::Result<()> {
        let v0 = u32::from_le_bytes(self.block[0..4].try_into().unwrap());
        let v1 = u32::from_le_bytes(self.block[4..8].try_into().unwrap());
        let (e0, e1) = self.encryption.encipher((v0, v1), &self.key);
        self.inner.write_all(&e0.to_le_bytes())?;
        self.inner.write_all(&e1.to_le_bytes())?;
        Ok(())
    }

    /// Flush any trailing partial block and rewrite the header with the
    /// correct plaintext length, returning the underlying handle.
    pub fn finish(mut self) -> Result<W, CryptoError> {
        if self.pos % 8 != 0 {
            self.flush_block()?;
        }
        self.inner.seek(SeekFrom::Start(0))?;
        let magic = self.encryption.magic().ok_or(CryptoError::UnspecifiedWriteEncryption)?;
        self.inner.write_all(magic)?;
        self.inner.write_all(&self.pos.to_le_bytes())?;
        Ok(self.inner)
    }
}

impl<W: Write + Seek> Write for CipherWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            let block_off = (self.pos % 8) as usize;
            let avail = 8 - block_off;
            let take = avail.min(buf.len() - written);
            self.block[block_off..block_off + take].copy_from_slice(&buf[written..written + take]);
            written += take;
            self.pos += take as u32;
            if self.pos % 8 == 0 {
                self.flush_block()?;
            }
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
