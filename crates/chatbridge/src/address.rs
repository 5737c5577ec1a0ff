//! Recipient address normalization.
//!
//! Callers identify recipients loosely: a bare phone number, or an address the
//! chat network already understands. Everything past [`normalize`] is a
//! canonical [`Address`] that is either a contact or a group, never both.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Domain suffix of one-to-one contact addresses.
pub const CONTACT_SUFFIX: &str = "@c.us";

/// Domain suffix of group addresses.
pub const GROUP_SUFFIX: &str = "@g.us";

/// Which kind of conversation an address points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    Contact,
    Group,
}

/// A canonical chat address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    value: String,
    kind: AddressKind,
}

impl Address {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    pub fn is_group(&self) -> bool {
        self.kind == AddressKind::Group
    }

    pub fn into_string(self) -> String {
        self.value
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize(s)
    }
}

/// Rejected recipient input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error(
        "invalid address format '{input}': use a digit-only phone number \
         (e.g. 628123456789) or a full address ending in {CONTACT_SUFFIX} or {GROUP_SUFFIX}"
    )]
    InvalidAddress { input: String },
}

/// Turn user input into a canonical address.
///
/// - Input already ending in [`CONTACT_SUFFIX`] or [`GROUP_SUFFIX`] is kept as is.
/// - A string of decimal digits is treated as an international phone number and
///   gets the contact suffix.
/// - Anything else is rejected.
pub fn normalize(input: &str) -> Result<Address, AddressError> {
    let invalid = || AddressError::InvalidAddress {
        input: input.to_string(),
    };

    for (suffix, kind) in [
        (CONTACT_SUFFIX, AddressKind::Contact),
        (GROUP_SUFFIX, AddressKind::Group),
    ] {
        if let Some(local) = input.strip_suffix(suffix) {
            // "@c.us" on its own names nobody.
            if local.is_empty() {
                return Err(invalid());
            }
            return Ok(Address {
                value: input.to_string(),
                kind,
            });
        }
    }

    if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(Address {
            value: format!("{input}{CONTACT_SUFFIX}"),
            kind: AddressKind::Contact,
        });
    }

    Err(invalid())
}
