//! Declared entities that travel inside values: backends and ACLs.

use crate::ast::{AclDeclaration, BackendDeclaration, DirectorDeclaration, ExpressionKind};
use crate::error::ValueError;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};

/// What a backend name refers to.
#[derive(Debug, Clone)]
pub enum BackendKind {
    /// A concrete origin.
    Origin(BackendDeclaration),
    /// A director resolving to one of its member backends per request.
    Director(DirectorDeclaration),
}

/// A named backend. Health is the only runtime-mutable attribute and is
/// readable and writable without holding the request lock.
#[derive(Debug)]
pub struct Backend {
    name: String,
    kind: BackendKind,
    healthy: AtomicBool,
}

impl Backend {
    /// Origin backend built from its declaration; starts healthy.
    pub fn origin(declaration: BackendDeclaration) -> Self {
        Self {
            name: declaration.name.clone(),
            kind: BackendKind::Origin(declaration),
            healthy: AtomicBool::new(true),
        }
    }

    /// Director-backed backend.
    pub fn director(declaration: DirectorDeclaration) -> Self {
        Self {
            name: declaration.name.clone(),
            kind: BackendKind::Director(declaration),
            healthy: AtomicBool::new(true),
        }
    }

    /// Declared name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declaration behind this backend.
    pub fn kind(&self) -> &BackendKind {
        &self.kind
    }

    /// Director declaration, when this backend is a director.
    pub fn as_director(&self) -> Option<&DirectorDeclaration> {
        match &self.kind {
            BackendKind::Director(declaration) => Some(declaration),
            BackendKind::Origin(_) => None,
        }
    }

    /// Current health.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Flip health; called by health checkers and tests.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Release);
    }

    /// Literal text of a string or integer property such as `host` or `port`.
    pub fn property_text(&self, key: &str) -> Option<String> {
        let BackendKind::Origin(declaration) = &self.kind else {
            return None;
        };
        match &declaration.property(key)?.kind {
            ExpressionKind::String(value) => Some(value.clone()),
            ExpressionKind::Integer(value) => Some(value.to_string()),
            ExpressionKind::Ident(value) => Some(value.clone()),
            _ => None,
        }
    }
}

/// One parsed ACL rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclRule {
    /// Entry started with `!`.
    pub negated: bool,
    /// Network address.
    pub network: IpAddr,
    /// Prefix length.
    pub prefix: u8,
}

impl AclRule {
    fn contains(&self, ip: &IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(network), IpAddr::V4(ip)) => {
                let prefix = u32::from(self.prefix.min(32));
                let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
                (u32::from(network) & mask) == (u32::from(*ip) & mask)
            }
            (IpAddr::V6(network), IpAddr::V6(ip)) => {
                let prefix = u32::from(self.prefix.min(128));
                let mask = if prefix == 0 { 0 } else { u128::MAX << (128 - prefix) };
                (u128::from(network) & mask) == (u128::from(*ip) & mask)
            }
            _ => false,
        }
    }
}

/// Access-control list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acl {
    /// Declared name.
    pub name: String,
    /// Rules in declaration order.
    pub rules: Vec<AclRule>,
}

impl Acl {
    /// Parse every entry of a declaration.
    pub fn from_declaration(declaration: &AclDeclaration) -> Result<Self, ValueError> {
        let mut rules = Vec::with_capacity(declaration.entries.len());
        for entry in &declaration.entries {
            let network: IpAddr = entry.ip.parse().map_err(|_| ValueError::InvalidAcl {
                entry: entry.ip.clone(),
                reason: "not an IP address".into(),
            })?;
            let max = if network.is_ipv4() { 32 } else { 128 };
            let prefix = entry.mask.unwrap_or(max);
            if prefix > max {
                return Err(ValueError::InvalidAcl {
                    entry: format!("{}/{}", entry.ip, prefix),
                    reason: format!("prefix exceeds {max}"),
                });
            }
            rules.push(AclRule {
                negated: entry.negated,
                network,
                prefix,
            });
        }
        Ok(Self {
            name: declaration.name.clone(),
            rules,
        })
    }

    /// Longest-prefix match; a negated winning rule excludes the address.
    pub fn matches(&self, ip: &IpAddr) -> bool {
        self.rules
            .iter()
            .filter(|rule| rule.contains(ip))
            .max_by_key(|rule| rule.prefix)
            .is_some_and(|rule| !rule.negated)
    }
}
