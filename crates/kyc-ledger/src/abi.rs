//! # Contract ABI Encoding
//!
//! The subset of the Solidity ABI the KYC contracts use: `address`, unsigned
//! integers up to 128 bits, `bool`, `bytes32`, `string` and `address[]`.
//! Function selectors are the first four bytes of the Keccak-256 hash of the
//! canonical signature.

use sha3::{Digest, Keccak256};

use crate::error::LedgerError;

const WORD: usize = 32;

/// One ABI-encodable argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// 20-byte address.
    Address([u8; 20]),
    /// Unsigned integer, left-padded.
    Uint(u128),
    /// Boolean.
    Bool(bool),
    /// Fixed 32 bytes.
    Bytes32([u8; 32]),
    /// Dynamic UTF-8 string.
    String(String),
    /// Dynamic array of addresses.
    AddressArray(Vec<[u8; 20]>),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(self, Self::String(_) | Self::AddressArray(_))
    }
}

/// 4-byte function selector for a canonical signature such as
/// `addSigner(address)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn uint_word(v: u128) -> [u8; WORD] {
    let mut w = [0u8; WORD];
    w[16..].copy_from_slice(&v.to_be_bytes());
    w
}

fn address_word(a: &[u8; 20]) -> [u8; WORD] {
    let mut w = [0u8; WORD];
    w[12..].copy_from_slice(a);
    w
}

fn encode_tail(token: &Token, out: &mut Vec<u8>) {
    match token {
        Token::String(s) => {
            let bytes = s.as_bytes();
            out.extend_from_slice(&uint_word(bytes.len() as u128));
            out.extend_from_slice(bytes);
            let pad = (WORD - bytes.len() % WORD) % WORD;
            out.extend(std::iter::repeat(0u8).take(pad));
        }
        Token::AddressArray(items) => {
            out.extend_from_slice(&uint_word(items.len() as u128));
            for a in items {
                out.extend_from_slice(&address_word(a));
            }
        }
        _ => {}
    }
}

/// Encode a tuple of arguments (no selector).
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for token in tokens {
        let word = match token {
            Token::Address(a) => address_word(a),
            Token::Uint(v) => uint_word(*v),
            Token::Bool(b) => uint_word(u128::from(*b)),
            Token::Bytes32(b) => *b,
            dynamic => {
                debug_assert!(dynamic.is_dynamic());
                let offset = (head_len + tail.len()) as u128;
                encode_tail(dynamic, &mut tail);
                uint_word(offset)
            }
        };
        head.extend_from_slice(&word);
    }
    head.extend_from_slice(&tail);
    head
}

/// Encode a call: selector followed by the argument tuple.
pub fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&encode(tokens));
    data
}

/// `0x`-prefixed hex for JSON-RPC.
pub fn to_hex_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Parse `0x`-prefixed hex returned by JSON-RPC.
pub fn from_hex_data(s: &str) -> Result<Vec<u8>, LedgerError> {
    hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| LedgerError::Encoding(format!("invalid hex data: {e}")))
}

/// Reader over ABI-encoded return data.
#[derive(Debug)]
pub struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    /// Wrap return data.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn word_at(&self, offset: usize) -> Result<&'a [u8], LedgerError> {
        self.data
            .get(offset..offset + WORD)
            .ok_or_else(|| LedgerError::Encoding(format!("return data truncated at byte {offset}")))
    }

    fn uint_at(&self, offset: usize) -> Result<u128, LedgerError> {
        let w = self.word_at(offset)?;
        if w[..16].iter().any(|b| *b != 0) {
            return Err(LedgerError::Encoding("integer exceeds 128 bits".into()));
        }
        let mut buf = [0u8; 16];
        buf.copy_from_slice(&w[16..]);
        Ok(u128::from_be_bytes(buf))
    }

    fn offset_at(&self, offset: usize) -> Result<usize, LedgerError> {
        usize::try_from(self.uint_at(offset)?)
            .map_err(|_| LedgerError::Encoding("dynamic offset out of range".into()))
    }

    /// Head word `i` as an unsigned integer.
    pub fn uint(&self, i: usize) -> Result<u128, LedgerError> {
        self.uint_at(i * WORD)
    }

    /// Head word `i` as a `u8`, rejecting wider values.
    pub fn uint8(&self, i: usize) -> Result<u8, LedgerError> {
        u8::try_from(self.uint(i)?).map_err(|_| LedgerError::Encoding("value exceeds uint8".into()))
    }

    /// Head word `i` as a bool.
    pub fn bool(&self, i: usize) -> Result<bool, LedgerError> {
        match self.uint(i)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(LedgerError::Encoding(format!("invalid bool word {other}"))),
        }
    }

    /// Head word `i` as an address.
    pub fn address(&self, i: usize) -> Result<[u8; 20], LedgerError> {
        let w = self.word_at(i * WORD)?;
        let mut a = [0u8; 20];
        a.copy_from_slice(&w[12..]);
        Ok(a)
    }

    /// Head word `i` as `bytes32`.
    pub fn bytes32(&self, i: usize) -> Result<[u8; 32], LedgerError> {
        let w = self.word_at(i * WORD)?;
        let mut b = [0u8; 32];
        b.copy_from_slice(w);
        Ok(b)
    }

    /// Dynamic string referenced by head word `i`.
    pub fn string(&self, i: usize) -> Result<String, LedgerError> {
        let start = self.offset_at(i * WORD)?;
        let len = usize::try_from(self.uint_at(start)?)
            .map_err(|_| LedgerError::Encoding("string length out of range".into()))?;
        let body = self
            .data
            .get(start + WORD..start + WORD + len)
            .ok_or_else(|| LedgerError::Encoding("string body truncated".into()))?;
        String::from_utf8(body.to_vec())
            .map_err(|e| LedgerError::Encoding(format!("string is not UTF-8: {e}")))
    }

    /// Dynamic `address[]` referenced by head word `i`.
    pub fn address_array(&self, i: usize) -> Result<Vec<[u8; 20]>, LedgerError> {
        let start = self.offset_at(i * WORD)?;
        let len = usize::try_from(self.uint_at(start)?)
            .map_err(|_| LedgerError::Encoding("array length out of range".into()))?;
        (0..len)
            .map(|k| {
                let w = self.word_at(start + WORD * (k + 1))?;
                let mut a = [0u8; 20];
                a.copy_from_slice(&w[12..]);
                Ok(a)
            })
            .collect()
    }
}
