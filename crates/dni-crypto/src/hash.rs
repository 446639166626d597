//! MD5 and SHA-512 hashing helpers shared by the dirty-compare, compress, and
//! secure-copy pipeline stages.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha512};

use crate::error::CryptoError;
use crate::stream::{CipherReader, Encryption};
use crate::key::CipherKey;

const CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Stream a file through MD5 in 10-MiB chunks, returning the hex digest and
/// byte size.
pub fn md5_file(path: &Path) -> io::Result<(String, u64)> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = md5::Context::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.consume(&buf[..n]);
        total += n as u64;
    }
    Ok((format!("{:x}", hasher.compute()), total))
}

/// Gzip `src` into `dst` at the default compression level and return the MD5
/// digest and size of the resulting gzip blob (spec I2: `download_hash` is
/// always of the gzip blob, never the plaintext).
pub fn gzip_and_hash(src: &Path, dst: &Path) -> io::Result<(String, u64)> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    {
        let mut input = BufReader::new(File::open(src)?);
        let output = File::create(dst)?;
        let mut encoder = GzEncoder::new(output, Compression::default());
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = input.read(&mut buf)?;
            if n == 0 {
                break;
            }
            encoder.write_all(&buf[..n])?;
        }
        encoder.finish()?;
    }
    md5_file(dst)
}

/// Compare two files for content equality, handling possibly-mismatched
/// encryption: if both share the same on-disk encryption magic, compare raw
/// bytes; otherwise decrypt both through the stream codec and compare
/// SHA-512 digests (spec §4.9).
pub fn content_equal(path_a: &Path, path_b: &Path, key: CipherKey) -> io::Result<bool> {
    let size_a = std::fs::metadata(path_a)?.len();
    let size_b = std::fs::metadata(path_b)?.len();
    if size_a != size_b {
        return Ok(false);
    }

    let enc_a = crate::stream::detect_from_reader(BufReader::new(File::open(path_a)?))?;
    let enc_b = crate::stream::detect_from_reader(BufReader::new(File::open(path_b)?))?;

    if enc_a == enc_b {
        return raw_bytes_equal(path_a, path_b);
    }

    let digest_a = sha512_through_codec(path_a, enc_a, key)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    let digest_b = sha512_through_codec(path_b, enc_b, key)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    Ok(digest_a == digest_b)
}

fn raw_bytes_equal(path_a: &Path, path_b: &Path) -> io::Result<bool> {
    let mut a = BufReader::new(File::open(path_a)?);
    let mut b = BufReader::new(File::open(path_b)?);
    let mut buf_a = [0u8; 8192];
    let mut buf_b = [0u8; 8192];
    loop {
        let na = a.read(&mut buf_a)?;
        let nb = b.read(&mut buf_b)?;
        if na != nb {
            return Ok(false);
        }
        if na == 0 {
            return Ok(true);
        }
        if buf_a[..na] != buf_b[..nb] {
            return Ok(false);
        }
    }
}

fn sha512_through_codec(path: &Path, enc: Encryption, key: CipherKey) -> Result<[u8; 64], CryptoError> {
    let file = BufReader::new(File::open(path)?);
    let mut hasher = Sha512::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    match enc {
        Encryption::Unspecified => {
            let mut reader = file;
            loop {
                let n = reader.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
        }
        _ => {
            let mut reader = CipherReader::open(file, enc, key)?;
            loop {
                let n = reader.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
        }
    }
    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn md5_matches_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"hello world").unwrap();
        let (digest, size) = md5_file(&path).unwrap();
        assert_eq!(digest, "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(size, 11);
    }

    #[test]
    fn gzip_hash_differs_from_plain_hash() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("f.bin");
        std::fs::write(&src, vec![0xAB; 4096]).unwrap();
        let (plain_hash, _) = md5_file(&src).unwrap();
        let dst = dir.path().join("f.bin.gz");
        let (gz_hash, gz_size) = gzip_and_hash(&src, &dst).unwrap();
        assert_ne!(plain_hash, gz_hash);
        assert!(gz_size > 0);
        assert!(dst.exists());
    }

    #[test]
    fn content_equal_detects_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, b"abc").unwrap();
        std::fs::write(&b, b"abcd").unwrap();
        assert!(!content_equal(&a, &b, CipherKey::default()).unwrap());
    }

    #[test]
    fn content_equal_same_plain_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, b"same content here").unwrap();
        std::fs::write(&b, b"same content here").unwrap();
        assert!(content_equal(&a, &b, CipherKey::default()).unwrap());
    }

    #[test]
    fn content_equal_decrypts_mismatched_encryption() {
        use crate::stream::CipherWriter;
        let dir = tempfile::tempdir().unwrap();
        let key = CipherKey::from_hex("31415926535897932384626433832795").unwrap();

        let a = dir.path().join("a.xtea");
        {
            let f = std::fs::File::create(&a).unwrap();
            let mut w = CipherWriter::create(f, Encryption::Xtea, key).unwrap();
            w.write_all(b"identical payload").unwrap();
            w.finish().unwrap();
        }
        let b = dir.path().join("b.btea");
        {
            let f = std::fs::File::create(&b).unwrap();
            let mut w = CipherWriter::create(f, Encryption::Btea, key).unwrap();
            w.write_all(b"identical payload").unwrap();
            w.finish().unwrap();
        }
        assert!(content_equal(&a, &b, key).unwrap());
    }
}
