//! Client address allow-list (CIDR blocks or literal addresses)

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid allow-list entry '{entry}': {reason}")]
pub struct IpRuleError {
    pub entry: String,
    pub reason: &'static str,
}

/// One network block. A literal address is a block with a full-length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNet {
    addr: IpAddr,
    prefix: u8,
}

impl IpNet {
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, canonical(ip)) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = mask_v4(self.prefix);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = mask_v6(self.prefix);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

impl FromStr for IpNet {
    type Err = IpRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let entry = s.trim();
        let err = |reason| IpRuleError {
            entry: entry.to_string(),
            reason,
        };

        let (addr_part, prefix_part) = match entry.split_once('/') {
            Some((a, p)) => (a, Some(p)),
            None => (entry, None),
        };
        let raw = IpAddr::from_str(addr_part).map_err(|_| err("not an IP address"))?;
        let addr = canonical(raw);
        let mapped = raw.is_ipv6() && addr.is_ipv4();
        let max = if raw.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix_part {
            Some(p) => p.parse::<u8>().map_err(|_| err("bad prefix length"))?,
            None => max,
        };
        if prefix > max {
            return Err(err("prefix length too large"));
        }
        // Mapped blocks are stored in IPv4 form, so the prefix drops the 96-bit ::ffff:0:0 part.
        let prefix = if mapped {
            prefix
                .checked_sub(96)
                .ok_or_else(|| err("IPv4-mapped prefix must be at least 96"))?
        } else {
            prefix
        };
        Ok(Self { addr, prefix })
    }
}

impl fmt::Display for IpNet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// IPv4-mapped IPv6 addresses compare as their IPv4 form.
fn canonical(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(ip, IpAddr::V4),
        v4 => v4,
    }
}

fn mask_v4(prefix: u8) -> u32 {
    u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0)
}

fn mask_v6(prefix: u8) -> u128 {
    u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0)
}

/// Empty list admits everyone.
#[derive(Debug, Clone, Default)]
pub struct IpAllowList {
    rules: Vec<IpNet>,
}

impl IpAllowList {
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self, IpRuleError> {
        let rules = entries
            .iter()
            .map(|e| e.as_ref())
            .filter(|e| !e.trim().is_empty())
            .map(IpNet::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn is_restricted(&self) -> bool {
        !self.rules.is_empty()
    }

    /// Unparsable client addresses are refused whenever a list is configured.
    pub fn permits(&self, client_ip: &str) -> bool {
        if self.rules.is_empty() {
            return true;
        }
        match IpAddr::from_str(client_ip.trim()) {
            Ok(ip) => self.rules.iter().any(|net| net.contains(ip)),
            Err(_) => false,
        }
    }
}
