use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use rand::{thread_rng, Rng};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const OBJECT_ID_BYTES: usize = 12;
const OBJECT_ID_HEX_LEN: usize = 24;

static ID_COUNTER: AtomicU32 = AtomicU32::new(0);

/// The hosted service's native document-identifier type: 12 bytes rendered as
/// 24 lowercase hex characters. Opaque identifier strings crossing the host
/// boundary are converted through [`ObjectId::parse_str`] before they reach
/// the service.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; OBJECT_ID_BYTES]);

impl ObjectId {
    /// Generates a fresh identifier: 4-byte creation timestamp, 5 random
    /// bytes, 3-byte rolling counter.
    pub fn new() -> Self {
        let mut bytes = [0u8; OBJECT_ID_BYTES];
        let seconds = chrono::Utc::now().timestamp().max(0) as u32;
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        thread_rng().fill(&mut bytes[4..9]);
        let count = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; OBJECT_ID_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn parse_str(input: &str) -> Result<Self, ObjectIdError> {
        if input.len() != OBJECT_ID_HEX_LEN {
            return Err(ObjectIdError::InvalidLength(input.len()));
        }
        let mut bytes = [0u8; OBJECT_ID_BYTES];
        for (index, chunk) in input.as_bytes().chunks(2).enumerate() {
            let high = hex_value(chunk[0])?;
            let low = hex_value(chunk[1])?;
            bytes[index] = (high << 4) | low;
        }
        Ok(Self(bytes))
    }

    pub fn bytes(&self) -> &[u8; OBJECT_ID_BYTES] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(OBJECT_ID_HEX_LEN);
        for byte in self.0 {
            out.push(hex_digit(byte >> 4));
            out.push(hex_digit(byte & 0x0f));
        }
        out
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = ObjectIdError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse_str(input)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        ObjectId::parse_str(&text).map_err(D::Error::custom)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectIdError {
    InvalidLength(usize),
    InvalidCharacter(char),
}

impl Display for ObjectIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectIdError::InvalidLength(length) => write!(
                f,
                "object id must be {OBJECT_ID_HEX_LEN} hex characters, got {length}"
            ),
            ObjectIdError::InvalidCharacter(character) => {
                write!(f, "object id contains non-hex character {character:?}")
            }
        }
    }
}

impl Error for ObjectIdError {}

fn hex_value(byte: u8) -> Result<u8, ObjectIdError> {
    match byte {
        b'0'..=b'9' => Ok(byte - b'0'),
        b'a'..=b'f' => Ok(byte - b'a' + 10),
        b'A'..=b'F' => Ok(byte - b'A' + 10),
        other => Err(ObjectIdError::InvalidCharacter(other as char)),
    }
}

fn hex_digit(value: u8) -> char {
    match value {
        0..=9 => (b'0' + value) as char,
        _ => (b'a' + value - 10) as char,
    }
}
