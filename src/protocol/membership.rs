//! Copy-on-write replica membership
//!
//! A [`Membership`] holds two independent replica sets, preparers and
//! accepters. Each mutation publishes a fresh immutable [`ReplicaSet`];
//! rounds take an `Arc` of the set current at their start and never see
//! later changes, so the majority of a running round cannot shrink.

use crate::common::{Error, Result};
use crate::protocol::acceptor::Acceptor;
use std::sync::{Arc, PoisonError, RwLock};

/// Immutable, ordered set of replicas.
#[derive(Debug, Clone, Default)]
pub struct ReplicaSet {
    members: Vec<Arc<dyn Acceptor>>,
}

impl ReplicaSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// floor(n/2) + 1
    pub fn majority(&self) -> usize {
        self.members.len() / 2 + 1
    }

    pub fn contains(&self, address: &str) -> bool {
        self.members.iter().any(|m| m.address() == address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Acceptor>> {
        self.members.iter()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.members.iter().map(|m| m.address().to_string()).collect()
    }

    /// Copy with `acceptor` appended; `None` if already a member.
    fn with(&self, acceptor: Arc<dyn Acceptor>) -> Option<Self> {
        if self.contains(acceptor.address()) {
            return None;
        }
        let mut members = self.members.clone();
        members.push(acceptor);
        Some(Self { members })
    }

    /// Copy without `address`; `None` if not a member.
    fn without(&self, address: &str) -> Option<Self> {
        if !self.contains(address) {
            return None;
        }
        let members = self
            .members
            .iter()
            .filter(|m| m.address() != address)
            .cloned()
            .collect();
        Some(Self { members })
    }
}

impl FromIterator<Arc<dyn Acceptor>> for ReplicaSet {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Acceptor>>>(iter: I) -> Self {
        let mut set = ReplicaSet::new();
        for acceptor in iter {
            if let Some(next) = set.with(acceptor) {
                set = next;
            }
        }
        set
    }
}

/// Which of the two sets an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Preparer,
    Accepter,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Preparer => write!(f, "preparer"),
            Role::Accepter => write!(f, "accepter"),
        }
    }
}

/// Live preparer and accepter sets of one proposer.
#[derive(Debug, Default)]
pub struct Membership {
    preparers: RwLock<Arc<ReplicaSet>>,
    accepters: RwLock<Arc<ReplicaSet>>,
}

impl Membership {
    pub fn new(preparers: ReplicaSet, accepters: ReplicaSet) -> Self {
        Self {
            preparers: RwLock::new(Arc::new(preparers)),
            accepters: RwLock::new(Arc::new(accepters)),
        }
    }

    fn slot(&self, role: Role) -> &RwLock<Arc<ReplicaSet>> {
        match role {
            Role::Preparer => &self.preparers,
            Role::Accepter => &self.accepters,
        }
    }

    /// Snapshot of the current set for `role`
    pub fn snapshot(&self, role: Role) -> Arc<ReplicaSet> {
        self.slot(role)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn preparers(&self) -> Arc<ReplicaSet> {
        self.snapshot(Role::Preparer)
    }

    pub fn accepters(&self) -> Arc<ReplicaSet> {
        self.snapshot(Role::Accepter)
    }

    /// Add a replica. Returns false if it was already a member.
    pub fn add(&self, role: Role, acceptor: Arc<dyn Acceptor>) -> Result<bool> {
        validate_address(acceptor.address())?;
        let mut current = self
            .slot(role)
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match current.with(acceptor) {
            Some(next) => {
                *current = Arc::new(next);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove a replica by address. Returns false if it was not a member.
    pub fn remove(&self, role: Role, address: &str) -> Result<bool> {
        validate_address(address)?;
        let mut current = self
            .slot(role)
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match current.without(address) {
            Some(next) => {
                *current = Arc::new(next);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn validate_address(address: &str) -> Result<()> {
    if address.trim().is_empty() {
        return Err(Error::InvalidEndpoint("empty replica address".into()));
    }
    Ok(())
}
