//! Stream ciphers and content hashing for the D'ni content-manifest pipeline.
//!
//! This crate implements the two block ciphers that frame the game's
//! encrypted age, SDL, funny-number, and Python-pack files (XTEA and a
//! corrected two-word BTEA variant), the random-access-free stream wrapper
//! that frames them on disk, and the MD5/SHA-512 hashing helpers the
//! orchestrator uses to detect dirty assets and compare secure-list copies.
//!
//! # Examples
//!
//! ```
//! use std::io::{Cursor, Read, Write};
//! use dni_crypto::{CipherKey, CipherReader, CipherWriter, Encryption};
//!
//! let key = CipherKey::default();
//! let mut buf = Cursor::new(Vec::new());
//! let mut writer = CipherWriter::create(&mut buf, Encryption::Xtea, key).unwrap();
//! writer.write_all(b"hello D'ni").unwrap();
//! writer.finish().unwrap();
//!
//! buf.set_position(0);
//! let mut reader = CipherReader::open(buf, Encryption::Xtea, key).unwrap();
//! let mut plain = String::new();
//! reader.read_to_string(&mut plain).unwrap();
//! assert_eq!(plain, "hello D'ni");
//! ```

#![warn(missing_docs)]

pub mod btea;
pub mod error;
pub mod hash;
pub mod key;
pub mod stream;
pub mod xtea;

pub use error::CryptoError;
pub use key::{CipherKey, DEFAULT_XTEA_KEY};
pub use stream::{detect, detect_from_reader, CipherReader, CipherWriter, Encryption};
