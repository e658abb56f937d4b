//! # Identity Newtypes
//!
//! Each identifier is a distinct type: a [`SignerId`] cannot be passed where
//! a [`SubjectAddress`] is expected, even though both are wallet addresses.
//!
//! ## Validation
//!
//! String-based identifiers validate format at construction time and during
//! deserialization (`#[serde(try_from = "String")]`). UUID-based identifiers
//! ([`ProposalId`], [`EventId`]) are always valid by construction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// Wallet addresses
// ---------------------------------------------------------------------------

/// Validate a `0x`-prefixed 20-byte hex address and lowercase it.
pub fn normalize_address(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or(ValidationError::InvalidAddress {
            value: raw.to_string(),
            reason: "missing 0x prefix",
        })?;
    if digits.len() != 40 {
        return Err(ValidationError::InvalidAddress {
            value: raw.to_string(),
            reason: "expected 40 hex characters",
        });
    }
    let mut bytes = [0u8; 20];
    hex::decode_to_slice(digits, &mut bytes).map_err(|_| ValidationError::InvalidAddress {
        value: raw.to_string(),
        reason: "non-hex character",
    })?;
    Ok(format!("0x{}", hex::encode(bytes)))
}

/// Wallet address of a KYC subject. Stored lowercase, `0x`-prefixed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectAddress(String);

impl SubjectAddress {
    /// Parse and normalize a wallet address.
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        normalize_address(raw).map(Self)
    }

    /// The zero address. Audit events for actions that concern no single
    /// subject (threshold and rule changes) are filed under it.
    pub fn zero() -> Self {
        Self(format!("0x{}", "0".repeat(40)))
    }

    /// The normalized address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 20 raw address bytes.
    pub fn to_bytes(&self) -> [u8; 20] {
        address_bytes(&self.0)
    }
}

impl From<SignerId> for SubjectAddress {
    fn from(signer: SignerId) -> Self {
        Self(signer.0)
    }
}

/// Wallet address of an authorized multisig signer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SignerId(String);

impl SignerId {
    /// Parse and normalize a signer address.
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        normalize_address(raw).map(Self)
    }

    /// The normalized address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 20 raw address bytes.
    pub fn to_bytes(&self) -> [u8; 20] {
        address_bytes(&self.0)
    }
}

// Only called on addresses that passed `normalize_address`.
fn address_bytes(normalized: &str) -> [u8; 20] {
    let mut out = [0u8; 20];
    let decoded = hex::decode_to_slice(normalized.trim_start_matches("0x"), &mut out);
    debug_assert!(decoded.is_ok(), "unnormalized address {normalized}");
    out
}

// ---------------------------------------------------------------------------
// Other string identifiers
// ---------------------------------------------------------------------------

/// Off-chain user identifier (account id in the front-end database).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Maximum accepted length.
    pub const MAX_LEN: usize = 128;

    /// Validate a user id: non-empty, at most [`Self::MAX_LEN`] characters,
    /// no whitespace.
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        if raw.is_empty() || raw.len() > Self::MAX_LEN || raw.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidUserId(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// The user id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Jurisdiction code as registered in the compliance checker contract,
/// e.g. `US`, `EU`, `SG`, `AE-DIFC`. Stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JurisdictionCode(String);

impl JurisdictionCode {
    /// Parse a jurisdiction code: 2 to 16 ASCII alphanumerics or `-`/`_`,
    /// starting with a letter. Case-insensitive; normalized to uppercase.
    ///
    /// Format validity says nothing about whether the ledger knows the
    /// jurisdiction; unknown codes are handled by the compliance evaluator.
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        let code = raw.trim();
        let well_formed = (2..=16).contains(&code.len())
            && code.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            && code
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !well_formed {
            return Err(ValidationError::InvalidJurisdiction(raw.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// The normalized code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Reference to stored KYC documents in the content-addressed store.
///
/// Accepts either a `0x`-prefixed 32-byte hex digest or a CID-style
/// alphanumeric string (46 to 128 characters). The core never dereferences
/// it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Validate a document reference.
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        let s = raw.trim();
        let is_hex_digest = s
            .strip_prefix("0x")
            .is_some_and(|h| h.len() == 64 && hex::decode(h).is_ok());
        let is_cid = (46..=128).contains(&s.len()) && s.chars().all(|c| c.is_ascii_alphanumeric());
        if !(is_hex_digest || is_cid) {
            return Err(ValidationError::InvalidContentHash(raw.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// The reference string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the all-zero digest the storage contract holds when
    /// no documents were uploaded.
    pub fn is_placeholder(&self) -> bool {
        self.0
            .strip_prefix("0x")
            .is_some_and(|h| h.chars().all(|c| c == '0'))
    }
}

/// Risk score assigned by the external scorer, 0 (lowest) to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct RiskScore(u8);

impl RiskScore {
    /// Upper bound, inclusive.
    pub const MAX: u8 = 100;

    /// Validate a risk score.
    pub fn new(value: u32) -> Result<Self, ValidationError> {
        if value > u32::from(Self::MAX) {
            return Err(ValidationError::RiskScoreOutOfRange(value));
        }
        Ok(Self(value as u8))
    }

    /// The numeric score.
    pub fn value(&self) -> u8 {
        self.0
    }
}

macro_rules! string_newtype_conversions {
    ($($ty:ident),*) => {$(
        impl TryFrom<String> for $ty {
            type Error = ValidationError;
            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(&value)
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.0
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $ty {
            type Err = ValidationError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    )*};
}

string_newtype_conversions!(SubjectAddress, SignerId, UserId, JurisdictionCode, ContentHash);

impl TryFrom<u32> for RiskScore {
    type Error = ValidationError;
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RiskScore> for u32 {
    fn from(value: RiskScore) -> Self {
        u32::from(value.0)
    }
}

impl std::fmt::Display for RiskScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// UUID-based identifiers
// ---------------------------------------------------------------------------

/// Identifier of a multisig proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProposalId(Uuid);

impl ProposalId {
    /// Generate a new random proposal identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ProposalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "proposal:{}", self.0)
    }
}

/// Identifier of a recorded audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Generate a new random event identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// `bytes32` form used by the audit log contract: the 16 UUID bytes
    /// followed by 16 zero bytes.
    pub fn to_bytes32(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[..16].copy_from_slice(self.0.as_bytes());
        out
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "event:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn address_is_normalized_to_lowercase() {
        let a = SubjectAddress::new("0xABCDEF0123456789abcdef0123456789ABCDEF01").unwrap();
        assert_eq!(a.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
        assert_eq!(a.to_bytes()[0], 0xab);
        assert_eq!(a.to_bytes()[19], 0x01);
        assert_eq!(format!("0x{}", hex::encode(a.to_bytes())), a.as_str());
    }

    #[test]
    fn address_rejects_bad_input() {
        assert!(SubjectAddress::new("abcdef0123456789abcdef0123456789abcdef01").is_err());
        assert!(SubjectAddress::new("0x1234").is_err());
        assert!(SubjectAddress::new("0xZZcdef0123456789abcdef0123456789abcdef01").is_err());
    }

    #[test]
    fn signer_and_subject_compare_by_normalized_value() {
        let s1 = SignerId::new("0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA").unwrap();
        let s2 = SignerId::new("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        assert_eq!(s1, s2);
    }

    #[test]
    fn jurisdiction_is_uppercased() {
        assert_eq!(JurisdictionCode::new("ae-difc").unwrap().as_str(), "AE-DIFC");
        assert!(JurisdictionCode::new("U").is_err());
        assert!(JurisdictionCode::new("1US").is_err());
        assert!(JurisdictionCode::new("US EU").is_err());
    }

    #[test]
    fn content_hash_accepts_hex_and_cid() {
        let hex = format!("0x{}", "ab".repeat(32));
        assert!(ContentHash::new(&hex).is_ok());
        assert!(ContentHash::new("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG").is_ok());
        assert!(ContentHash::new("not a hash").is_err());
        assert!(ContentHash::new("0x1234").is_err());
    }

    #[test]
    fn risk_score_bounds() {
        assert_eq!(RiskScore::new(0).unwrap().value(), 0);
        assert_eq!(RiskScore::new(100).unwrap().value(), 100);
        assert_eq!(
            RiskScore::new(101),
            Err(ValidationError::RiskScoreOutOfRange(101))
        );
    }

    #[test]
    fn deserialization_validates() {
        let bad: Result<SubjectAddress, _> = serde_json::from_str("\"0x12\"");
        assert!(bad.is_err());
        let bad_score: Result<RiskScore, _> = serde_json::from_str("250");
        assert!(bad_score.is_err());
        let ok: JurisdictionCode = serde_json::from_str("\"sg\"").unwrap();
        assert_eq!(ok.as_str(), "SG");
    }

    #[test]
    fn user_id_rules() {
        assert!(UserId::new("user-42").is_ok());
        assert!(UserId::new("").is_err());
        assert!(UserId::new("has space").is_err());
        assert!(UserId::new(&"x".repeat(129)).is_err());
    }

    proptest! {
        #[test]
        fn any_40_hex_chars_form_an_address(hex in "[0-9a-fA-F]{40}") {
            let addr = SubjectAddress::new(&format!("0x{hex}")).unwrap();
            prop_assert_eq!(addr.as_str().len(), 42);
            prop_assert_eq!(addr.as_str(), format!("0x{}", hex.to_ascii_lowercase()));
        }

        #[test]
        fn scores_above_100_never_construct(v in 101u32..) {
            prop_assert!(RiskScore::new(v).is_err());
        }
    }
}
