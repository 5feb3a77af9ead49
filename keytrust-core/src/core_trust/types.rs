//! Core types for key acceptance
//!
//! Fingerprints and emails are always handled in their normalized,
//! lowercase form; everything that reaches the tables goes through
//! [`Fingerprint::parse`] or [`normalize_email`].

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::errors::{TrustError, TrustResult};

/// Length of a legacy (v3) key fingerprint in hex characters
pub const LEGACY_FINGERPRINT_LEN: usize = 32;

/// Length of a modern (v4) key fingerprint in hex characters
pub const FINGERPRINT_LEN: usize = 40;

/// Normalized hex fingerprint of a key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Validate and lowercase a fingerprint
    pub fn parse(input: &str) -> TrustResult<Self> {
        let len = input.len();
        if len != FINGERPRINT_LEN && len != LEGACY_FINGERPRINT_LEN {
            return Err(TrustError::InvalidFingerprint(input.to_string()));
        }
        if !input.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TrustError::InvalidFingerprint(input.to_string()));
        }
        Ok(Self(input.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_legacy(&self) -> bool {
        self.0.len() == LEGACY_FINGERPRINT_LEN
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = TrustError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(fpr: Fingerprint) -> Self {
        fpr.0
    }
}

impl ToSql for Fingerprint {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        self.0.to_sql()
    }
}

/// Trust decision recorded for a fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcceptanceDecision {
    Undecided,
    Unverified,
    Verified,
    Rejected,
    /// One of our own keys
    Personal,
}

impl AcceptanceDecision {
    pub const ALL: [AcceptanceDecision; 5] = [
        AcceptanceDecision::Undecided,
        AcceptanceDecision::Unverified,
        AcceptanceDecision::Verified,
        AcceptanceDecision::Rejected,
        AcceptanceDecision::Personal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AcceptanceDecision::Undecided => "undecided",
            AcceptanceDecision::Unverified => "unverified",
            AcceptanceDecision::Verified => "verified",
            AcceptanceDecision::Rejected => "rejected",
            AcceptanceDecision::Personal => "personal",
        }
    }

    /// Verified or unverified, i.e. positively accepted for correspondence
    pub fn is_accepted(&self) -> bool {
        matches!(self, AcceptanceDecision::Verified | AcceptanceDecision::Unverified)
    }

    /// Whether email rows are kept for this decision
    pub fn keeps_emails(&self) -> bool {
        !matches!(self, AcceptanceDecision::Undecided | AcceptanceDecision::Rejected)
    }
}

impl fmt::Display for AcceptanceDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AcceptanceDecision {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| TrustError::InvalidState(format!("Unknown acceptance decision: {}", s)))
    }
}

impl ToSql for AcceptanceDecision {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AcceptanceDecision {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse()
            .map_err(|e: TrustError| FromSqlError::Other(Box::new(e)))
    }
}

/// Set of normalized email addresses
pub type EmailSet = BTreeSet<String>;

/// Lowercase an email address the way it is stored
pub fn normalize_email(email: &str) -> String {
    email.to_lowercase()
}

/// Normalize and case-insensitively dedupe a list of emails, skipping empty entries
pub fn dedupe_emails<I, S>(emails: I) -> EmailSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    emails
        .into_iter()
        .filter(|e| !e.as_ref().is_empty())
        .map(|e| normalize_email(e.as_ref()))
        .collect()
}

/// Result of looking up a fingerprint + email combination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Acceptance {
    /// Decision for the fingerprint, `None` when nothing is recorded
    pub fingerprint_acceptance: Option<AcceptanceDecision>,
    /// Whether the email has been decided for under this fingerprint
    pub email_decided: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_lengths() {
        assert!(Fingerprint::parse(&"a".repeat(40)).is_ok());
        assert!(Fingerprint::parse(&"b".repeat(32)).is_ok());

        for len in [0, 16, 31, 33, 39, 41, 64] {
            let err = Fingerprint::parse(&"c".repeat(len)).unwrap_err();
            assert!(matches!(err, TrustError::InvalidFingerprint(_)), "len {}", len);
        }
    }

    #[test]
    fn test_fingerprint_normalization() {
        let fpr = Fingerprint::parse("ABCDEF0123456789ABCDEF0123456789ABCDEF01").unwrap();
        assert_eq!(fpr.as_str(), "abcdef0123456789abcdef0123456789abcdef01");
        assert!(!fpr.is_legacy());
        assert!(Fingerprint::parse(&"D".repeat(32)).unwrap().is_legacy());
    }

    #[test]
    fn test_fingerprint_rejects_non_hex() {
        let err = Fingerprint::parse(&"z".repeat(40)).unwrap_err();
        assert!(matches!(err, TrustError::InvalidFingerprint(_)));
    }

    #[test]
    fn test_decision_string_conversion() {
        for decision in AcceptanceDecision::ALL {
            assert_eq!(decision.as_str().parse::<AcceptanceDecision>().unwrap(), decision);
        }
        assert!("trusted".parse::<AcceptanceDecision>().is_err());
        assert!("".parse::<AcceptanceDecision>().is_err());
    }

    #[test]
    fn test_decision_predicates() {
        assert!(AcceptanceDecision::Verified.is_accepted());
        assert!(AcceptanceDecision::Unverified.is_accepted());
        assert!(!AcceptanceDecision::Personal.is_accepted());
        assert!(!AcceptanceDecision::Rejected.keeps_emails());
        assert!(!AcceptanceDecision::Undecided.keeps_emails());
        assert!(AcceptanceDecision::Personal.keeps_emails());
    }

    #[test]
    fn test_dedupe_emails() {
        let set = dedupe_emails(["a@x", "A@X", "", "b@y"]);
        assert_eq!(set.len(), 2);
        assert!(set.contains("a@x"));
        assert!(set.contains("b@y"));
    }

    #[test]
    fn test_decision_serde() {
        let json = serde_json::to_string(&AcceptanceDecision::Personal).unwrap();
        assert_eq!(json, "\"personal\"");
        let fpr: Fingerprint = serde_json::from_str(&format!("\"{}\"", "E".repeat(40))).unwrap();
        assert_eq!(fpr.as_str(), "e".repeat(40));
    }
}
