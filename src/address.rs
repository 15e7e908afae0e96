//! Address and rule set types shared by the feed, the backends and the reconciler.
//!
//! Addresses compare by their trimmed text only. `10.0.0.0/8` and `10.1.2.3`
//! are unrelated entries here even though one contains the other.

use ipnet::IpNet;
use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;

use crate::error::SyncError;

/// Address family of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub const ALL: [Family; 2] = [Family::V4, Family::V6];

    pub fn is_ipv4(self) -> bool {
        matches!(self, Family::V4)
    }

    /// Name used in firewalld rich rules
    pub fn label(self) -> &'static str {
        match self {
            Family::V4 => "ipv4",
            Family::V6 => "ipv6",
        }
    }

    /// Prefix length that designates a single host
    pub fn host_prefix(self) -> u8 {
        match self {
            Family::V4 => 32,
            Family::V6 => 128,
        }
    }

    fn of_net(net: &IpNet) -> Self {
        match net {
            IpNet::V4(_) => Family::V4,
            IpNet::V6(_) => Family::V6,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single IP literal or CIDR block, tagged with its family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    text: String,
    family: Family,
}

impl Address {
    /// Parse an entry that is expected to belong to `family`.
    ///
    /// Surrounding whitespace is trimmed. Blank input, text that is not an IP
    /// or CIDR, and entries of the other family are rejected.
    pub fn parse(raw: &str, family: Family) -> Result<Self, SyncError> {
        let address = Self::detect(raw)?;
        if address.family != family {
            return Err(SyncError::InvalidAddress(format!(
                "{} is not an {} address",
                address.text, family
            )));
        }
        Ok(address)
    }

    /// Parse an entry and infer its family from the text.
    pub fn detect(raw: &str) -> Result<Self, SyncError> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(SyncError::InvalidAddress("empty address".to_string()));
        }

        let family = if text.contains('/') {
            text.parse::<IpNet>().ok().map(|net| Family::of_net(&net))
        } else {
            text.parse::<IpAddr>().ok().map(|ip| Family::of_net(&IpNet::from(ip)))
        };

        match family {
            Some(family) => Ok(Self {
                text: text.to_string(),
                family,
            }),
            None => Err(SyncError::InvalidAddress(text.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn is_ipv4(&self) -> bool {
        self.family.is_ipv4()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Set of addresses of a single family.
///
/// Iteration follows insertion order so that commands are issued in the
/// order the feed or the firewall listed them.
#[derive(Debug, Clone)]
pub struct RuleSet {
    family: Family,
    entries: Vec<Address>,
    index: HashSet<String>,
}

impl RuleSet {
    pub fn new(family: Family) -> Self {
        Self {
            family,
            entries: Vec::new(),
            index: HashSet::new(),
        }
    }

    /// Build a set from addresses, keeping only those of `family`.
    pub fn from_addresses<'a, I>(family: Family, addresses: I) -> Self
    where
        I: IntoIterator<Item = &'a Address>,
    {
        let mut set = Self::new(family);
        for address in addresses {
            set.insert(address.clone());
        }
        set
    }

    pub fn family(&self) -> Family {
        self.family
    }

    /// Insert an address. Returns false for duplicates and foreign families.
    pub fn insert(&mut self, address: Address) -> bool {
        if address.family != self.family || self.index.contains(&address.text) {
            return false;
        }
        self.index.insert(address.text.clone());
        self.entries.push(address);
        true
    }

    pub fn contains(&self, address: &Address) -> bool {
        address.family == self.family && self.index.contains(&address.text)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.entries.iter()
    }
}

impl PartialEq for RuleSet {
    fn eq(&self, other: &Self) -> bool {
        self.family == other.family && self.index == other.index
    }
}

impl Eq for RuleSet {}
