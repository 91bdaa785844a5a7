//! Remote address allow-list.

use std::fmt;
use std::net::{AddrParseError, IpAddr};
use std::str::FromStr;

use thiserror::Error;

/// Error raised for an entry that is not an IPv4 or IPv6 literal.
#[derive(Debug, Error)]
#[error("'{entry}' is not a valid IP address")]
pub struct IpFilterError {
    entry: String,
    #[source]
    source: AddrParseError,
}

impl IpFilterError {
    /// The offending entry.
    #[must_use]
    pub fn entry(&self) -> &str {
        &self.entry
    }
}

/// Set of peer addresses allowed to connect.
///
/// An empty filter admits every peer. Addresses are compared in canonical
/// form, so `::ffff:127.0.0.1` matches an entry of `127.0.0.1`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpFilter {
    allowed: Vec<IpAddr>,
}

impl IpFilter {
    /// Parses a `;`-delimited list. Blank entries are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`IpFilterError`] for the first entry that is not an address.
    pub fn parse(list: &str) -> Result<Self, IpFilterError> {
        let mut allowed = Vec::new();
        for entry in list.split(';').map(str::trim).filter(|entry| !entry.is_empty()) {
            let address = entry.parse::<IpAddr>().map_err(|source| IpFilterError {
                entry: entry.to_owned(),
                source,
            })?;
            let canonical = address.to_canonical();
            if !allowed.contains(&canonical) {
                allowed.push(canonical);
            }
        }
        Ok(Self { allowed })
    }

    /// Returns `true` when `peer` may connect.
    #[must_use]
    pub fn allows(&self, peer: IpAddr) -> bool {
        self.allowed.is_empty() || self.allowed.contains(&peer.to_canonical())
    }

    /// Returns `true` when no restriction applies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Allowed addresses, canonicalised and deduplicated.
    #[must_use]
    pub fn addresses(&self) -> &[IpAddr] {
        &self.allowed
    }
}

impl FromStr for IpFilter {
    type Err = IpFilterError;

    fn from_str(list: &str) -> Result<Self, Self::Err> {
        Self::parse(list)
    }
}

impl fmt::Display for IpFilter {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, address) in self.allowed.iter().enumerate() {
            if index > 0 {
                formatter.write_str(";")?;
            }
            write!(formatter, "{address}")?;
        }
        Ok(())
    }
}
