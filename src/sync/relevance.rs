//! Relevance Set
//!
//! Addresses of contacts and companies that sit in a workspace's pipeline.
//! Only messages exchanged with one of these addresses are stored.

use crate::db::{Database, DbResult};
use std::collections::HashSet;

/// Tracked addresses of one workspace, normalized
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelevanceSet {
    addresses: HashSet<String>,
}

impl RelevanceSet {
    pub fn from_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            addresses: addresses
                .into_iter()
                .filter_map(|a| normalize_address(a.as_ref()))
                .collect(),
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        normalize_address(address).is_some_and(|a| self.addresses.contains(&a))
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }
}

/// Trim and lower-case an address; `None` when nothing is left
pub fn normalize_address(address: &str) -> Option<String> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Build the relevance set of a workspace from its pipeline entries
pub fn build_relevance_set(db: &Database, workspace_id: &str) -> DbResult<RelevanceSet> {
    let members = db.get_pipeline_members(workspace_id)?;

    let mut addresses = db.get_contact_emails(&members.contact_ids)?;
    addresses.extend(db.get_company_emails(&members.company_ids)?);

    Ok(RelevanceSet::from_addresses(addresses))
}
