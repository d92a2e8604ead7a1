//! Claim node naming and sequence ordering
//!
//! Claim nodes are named `lock_<identity>_<sequence>`. The identity is
//! everything between the fixed `lock_` prefix and the last `_`, so an
//! identity may itself contain `_`. Sequences are compared as numbers:
//! nothing here assumes the service zero-pads them.

use dlock_foundation::path;
use tracing::warn;

use crate::error::LockError;
use crate::metrics;

pub const CLAIM_PREFIX: &str = "lock";
pub const FIELD_SEPARATOR: char = '_';

/// Identity and sequence parsed from a claim node name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedClaim<'a> {
    pub identity: &'a str,
    pub sequence: u64,
}

/// Reject identities that cannot be embedded in a node name
pub fn validate_identity(identity: &str) -> Result<(), LockError> {
    if identity.is_empty() || identity.contains(path::SEPARATOR) {
        return Err(LockError::InvalidIdentity(identity.to_string()));
    }
    Ok(())
}

/// Creation path for a sequential claim node; the service appends the sequence
pub fn claim_prefix(lock_path: &str, identity: &str) -> String {
    path::join(
        lock_path,
        &format!("{CLAIM_PREFIX}{FIELD_SEPARATOR}{identity}{FIELD_SEPARATOR}"),
    )
}

fn base_name(node: &str) -> &str {
    node.rsplit(path::SEPARATOR).next().unwrap_or(node)
}

/// Numeric sequence after the last separator of a node name or path
pub fn sequence_of(node: &str) -> Result<u64, LockError> {
    let name = base_name(node);
    let malformed = || LockError::MalformedNodeName(node.to_string());

    let (_, suffix) = name.rsplit_once(FIELD_SEPARATOR).ok_or_else(malformed)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    suffix.parse::<u64>().map_err(|_| malformed())
}

/// Identity embedded in a claim node name or path
pub fn claim_identity_of(node: &str) -> Result<&str, LockError> {
    parse_claim_name(node).map(|claim| claim.identity)
}

/// Parse a full `lock_<identity>_<sequence>` name
pub fn parse_claim_name(node: &str) -> Result<ParsedClaim<'_>, LockError> {
    let name = base_name(node);
    let malformed = || LockError::MalformedNodeName(node.to_string());

    let rest = name
        .strip_prefix(CLAIM_PREFIX)
        .and_then(|rest| rest.strip_prefix(FIELD_SEPARATOR))
        .ok_or_else(malformed)?;
    let (identity, _) = rest.rsplit_once(FIELD_SEPARATOR).ok_or_else(malformed)?;
    if identity.is_empty() {
        return Err(malformed());
    }
    Ok(ParsedClaim {
        identity,
        sequence: sequence_of(node)?,
    })
}

/// One listing of a lock path, parsed once. Malformed siblings are warned
/// about and counted here and nowhere else.
#[derive(Debug, Clone, Default)]
pub struct Siblings<'a> {
    claims: Vec<(&'a str, ParsedClaim<'a>)>,
    skipped: usize,
}

impl<'a> Siblings<'a> {
    pub fn parse(siblings: &'a [String]) -> Self {
        let mut parsed = Self::default();
        for sibling in siblings {
            match parse_claim_name(sibling) {
                Ok(claim) => parsed.claims.push((sibling.as_str(), claim)),
                Err(_) => {
                    warn!(sibling = %sibling, "Skipping sibling that is not a claim node");
                    metrics::record_malformed_sibling();
                    parsed.skipped += 1;
                }
            }
        }
        parsed
    }

    /// Number of siblings that were not claim nodes
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.claims.iter().any(|(sibling, _)| *sibling == name)
    }

    pub fn is_lowest(&self, own_sequence: u64) -> bool {
        self.claims.iter().map(|(_, claim)| claim.sequence).min() == Some(own_sequence)
    }

    /// The claim holding the lock, if any
    pub fn lowest(&self) -> Option<&'a str> {
        self.claims
            .iter()
            .min_by_key(|(_, claim)| claim.sequence)
            .map(|(name, _)| *name)
    }

    /// The claim immediately ahead of `own_sequence`
    pub fn predecessor_of(&self, own_sequence: u64) -> Option<&'a str> {
        self.claims
            .iter()
            .filter(|(_, claim)| claim.sequence < own_sequence)
            .max_by_key(|(_, claim)| claim.sequence)
            .map(|(name, _)| *name)
    }

    /// Earliest claim made under `identity`
    pub fn find(&self, identity: &str) -> Option<&'a str> {
        self.claims
            .iter()
            .filter(|(_, claim)| claim.identity == identity)
            .min_by_key(|(_, claim)| claim.sequence)
            .map(|(name, _)| *name)
    }

    /// Every claim made under `identity`
    pub fn all_for<'s>(&'s self, identity: &'s str) -> impl Iterator<Item = &'a str> + 's {
        self.claims
            .iter()
            .filter(move |(_, claim)| claim.identity == identity)
            .map(|(name, _)| *name)
    }
}

/// Whether `own` carries the minimum sequence among `siblings`
pub fn is_lowest(own: &str, siblings: &[String]) -> Result<bool, LockError> {
    let own_sequence = sequence_of(own)?;
    Ok(Siblings::parse(siblings).is_lowest(own_sequence))
}

/// The sibling holding the lock, if any
pub fn lowest_claim(siblings: &[String]) -> Option<&str> {
    Siblings::parse(siblings).lowest()
}

/// The claim immediately ahead of `own`, for diagnostics
pub fn predecessor_of<'a>(own: &str, siblings: &'a [String]) -> Option<&'a str> {
    let own_sequence = sequence_of(own).ok()?;
    Siblings::parse(siblings).predecessor_of(own_sequence)
}

/// Earliest existing claim made under `identity`
pub fn find_claim<'a>(siblings: &'a [String], identity: &str) -> Option<&'a str> {
    Siblings::parse(siblings).find(identity)
}
