//! Shared fixtures for replica engine integration tests

#![allow(dead_code)]

use std::sync::mpsc::{self, Receiver, Sender};

use configstore_core::hash::hash64_str;
use configstore_core::{ChangeEvent, Entity, EntityKey, PartitionId, Result};
use configstore_storage::{FieldSource, IndexDef, Replica};

pub const BY_EMAIL: &str = "by_email";
pub const BY_TEAM_ROLE: &str = "by_team_role";

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub key: EntityKey,
    pub email: String,
    pub team: Option<EntityKey>,
    pub role: String,
    pub quota: u64,
}

impl Entity for Member {
    const KIND: &'static str = "Member";

    fn key(&self) -> &EntityKey {
        &self.key
    }

    fn key_mut(&mut self) -> &mut EntityKey {
        &mut self.key
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Team {
    pub key: EntityKey,
    pub title: String,
}

impl Entity for Team {
    const KIND: &'static str = "Team";

    fn key(&self) -> &EntityKey {
        &self.key
    }

    fn key_mut(&mut self) -> &mut EntityKey {
        &mut self.key
    }
}

pub fn member_key(name: &str) -> EntityKey {
    EntityKey::named(PartitionId::default(), Member::KIND, name)
}

pub fn team_key(name: &str) -> EntityKey {
    EntityKey::named(PartitionId::default(), Team::KIND, name)
}

pub fn member(name: &str, email: &str, quota: u64) -> Member {
    Member {
        key: member_key(name),
        email: email.to_string(),
        team: None,
        role: "viewer".to_string(),
        quota,
    }
}

pub fn team(name: &str, title: &str) -> Team {
    Team {
        key: team_key(name),
        title: title.to_string(),
    }
}

fn email(m: &Member) -> Option<&[u8]> {
    Some(m.email.as_bytes())
}

fn team_name(m: &Member) -> Option<&[u8]> {
    m.team.as_ref().and_then(|k| k.name()).map(str::as_bytes)
}

fn role(m: &Member) -> Option<&[u8]> {
    Some(m.role.as_bytes())
}

/// Member replica indexed by email and by (team, role)
pub fn member_replica() -> Replica<Member> {
    Replica::builder()
        .index(IndexDef::field64(BY_EMAIL, FieldSource::bytes(email)))
        .index(IndexDef::pair64(
            BY_TEAM_ROLE,
            FieldSource::bytes(team_name),
            FieldSource::bytes(role),
        ))
        .build()
}

pub fn email_hash(email: &str) -> u64 {
    hash64_str(email)
}

/// Channel feeding a `WatchWorker`, standing in for a remote stream
pub fn event_channel<T: Entity>() -> (
    Sender<Result<ChangeEvent<T>>>,
    Receiver<Result<ChangeEvent<T>>>,
) {
    mpsc::channel()
}
