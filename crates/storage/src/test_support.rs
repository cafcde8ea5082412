//! Fixtures shared by this crate's unit tests

use configstore_core::{Entity, EntityKey, PartitionId};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Account {
    pub key: EntityKey,
    pub email: String,
    pub region: Option<String>,
    pub credits: u64,
}

impl Entity for Account {
    const KIND: &'static str = "Account";

    fn key(&self) -> &EntityKey {
        &self.key
    }

    fn key_mut(&mut self) -> &mut EntityKey {
        &mut self.key
    }
}

pub(crate) fn account(name: &str, email: &str, credits: u64) -> Account {
    Account {
        key: EntityKey::named(PartitionId::default(), Account::KIND, name),
        email: email.to_string(),
        region: None,
        credits,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Region {
    pub key: EntityKey,
    pub label: String,
}

impl Entity for Region {
    const KIND: &'static str = "Region";

    fn key(&self) -> &EntityKey {
        &self.key
    }

    fn key_mut(&mut self) -> &mut EntityKey {
        &mut self.key
    }
}

pub(crate) fn region(name: &str, label: &str) -> Region {
    Region {
        key: EntityKey::named(PartitionId::default(), Region::KIND, name),
        label: label.to_string(),
    }
}
