//! Shared fixtures for client integration tests

#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::thread;
use std::time::{Duration, Instant};

use configstore_client::{Configstore, InMemoryRemote, Remote};
use configstore_core::{Entity, EntityKey, PartitionId, ReplicationConfig, Timestamp};
use configstore_storage::{FieldSource, IndexDef, Replica};

pub const USER_BY_EMAIL: &str = "by_email";
pub const ACCESS_BY_PAIR64: &str = "by_user_project64";
pub const ACCESS_BY_PAIR32: &str = "by_user_project32";
pub const INDEX_TEST_BY_STRING64: &str = "by_string64";
pub const INDEX_TEST_BY_STRING32: &str = "by_string32";
pub const INDEX_TEST_BY_UINT: &str = "by_uint64";
pub const INTEGER_BY_VALUE: &str = "by_value";
pub const NIL_KEY_BY_REF: &str = "by_ref";

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

// ============================================================================
// Entities
// ============================================================================

macro_rules! entity {
    ($ty:ident) => {
        impl Entity for $ty {
            const KIND: &'static str = stringify!($ty);

            fn key(&self) -> &EntityKey {
                &self.key
            }

            fn key_mut(&mut self) -> &mut EntityKey {
                &mut self.key
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub key: EntityKey,
    pub email_address: String,
    pub password_hash: String,
    pub date_last_login_utc: Option<Timestamp>,
}
entity!(User);

#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub key: EntityKey,
    pub name: String,
}
entity!(Project);

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectAccess {
    pub key: EntityKey,
    pub user: EntityKey,
    pub project: EntityKey,
}
entity!(ProjectAccess);

#[derive(Debug, Clone, PartialEq)]
pub struct IndexTest {
    pub key: EntityKey,
    pub string_field: String,
    pub int64_field: i64,
    pub uint64_field: u64,
    pub boolean_field: bool,
    pub double_field: f64,
    pub timestamp_field: Option<Timestamp>,
    pub bytes_field: Option<Vec<u8>>,
    pub key_field: Option<EntityKey>,
}
entity!(IndexTest);

#[derive(Debug, Clone, PartialEq)]
pub struct IntegerTest {
    pub key: EntityKey,
    pub unsigned_int: u64,
}
entity!(IntegerTest);

#[derive(Debug, Clone, PartialEq)]
pub struct NilKeyTest {
    pub key: EntityKey,
    pub nil_key_test: Option<EntityKey>,
}
entity!(NilKeyTest);

pub fn new_key<T: Entity>() -> EntityKey {
    EntityKey::incomplete(PartitionId::default(), T::KIND)
}

pub fn named_key<T: Entity>(name: &str) -> EntityKey {
    EntityKey::named(PartitionId::default(), T::KIND, name)
}

pub fn user(email: &str, password_hash: &str) -> User {
    User {
        key: new_key::<User>(),
        email_address: email.to_string(),
        password_hash: password_hash.to_string(),
        date_last_login_utc: None,
    }
}

pub fn project(name: &str) -> Project {
    Project {
        key: new_key::<Project>(),
        name: name.to_string(),
    }
}

pub fn index_test(string_field: &str) -> IndexTest {
    IndexTest {
        key: new_key::<IndexTest>(),
        string_field: string_field.to_string(),
        int64_field: 1,
        uint64_field: 1,
        boolean_field: true,
        double_field: 0.2,
        timestamp_field: None,
        bytes_field: None,
        key_field: None,
    }
}

/// Fresh value no other test uses
pub fn unique_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

// ============================================================================
// Index field readers
// ============================================================================

fn user_email(u: &User) -> Option<&[u8]> {
    Some(u.email_address.as_bytes())
}

fn access_user(a: &ProjectAccess) -> Option<&[u8]> {
    a.user.name().map(str::as_bytes)
}

fn access_project(a: &ProjectAccess) -> Option<&[u8]> {
    a.project.name().map(str::as_bytes)
}

fn index_string(t: &IndexTest) -> Option<&[u8]> {
    Some(t.string_field.as_bytes())
}

fn index_uint(t: &IndexTest) -> Option<u64> {
    Some(t.uint64_field)
}

fn integer_value(t: &IntegerTest) -> Option<u64> {
    Some(t.unsigned_int)
}

fn nil_key_ref(t: &NilKeyTest) -> Option<&[u8]> {
    t.nil_key_test.as_ref().and_then(EntityKey::name).map(str::as_bytes)
}

// ============================================================================
// Connection helpers
// ============================================================================

pub fn test_config() -> ReplicationConfig {
    ReplicationConfig {
        poll_interval_ms: 10,
        ..ReplicationConfig::default()
    }
}

pub fn new_remote() -> Arc<InMemoryRemote> {
    init_tracing();
    Arc::new(InMemoryRemote::new().expect("remote starts"))
}

/// Connect a context replicating every fixture kind
pub fn connect(remote: &Arc<InMemoryRemote>) -> Configstore<InMemoryRemote> {
    Configstore::builder(Arc::clone(remote))
        .config(test_config())
        .replicate(
            Replica::<User>::builder()
                .index(IndexDef::field64(USER_BY_EMAIL, FieldSource::bytes(user_email))),
        )
        .replicate(Replica::<Project>::builder())
        .replicate(
            Replica::<ProjectAccess>::builder()
                .index(IndexDef::pair64(
                    ACCESS_BY_PAIR64,
                    FieldSource::bytes(access_user),
                    FieldSource::bytes(access_project),
                ))
                .index(IndexDef::pair32(
                    ACCESS_BY_PAIR32,
                    FieldSource::bytes(access_user),
                    FieldSource::bytes(access_project),
                )),
        )
        .replicate(
            Replica::<IndexTest>::builder()
                .index(IndexDef::field64(INDEX_TEST_BY_STRING64, FieldSource::bytes(index_string)))
                .index(IndexDef::field32(INDEX_TEST_BY_STRING32, FieldSource::bytes(index_string)))
                .index(IndexDef::field64(INDEX_TEST_BY_UINT, FieldSource::uint(index_uint))),
        )
        .replicate(
            Replica::<IntegerTest>::builder()
                .index(IndexDef::field64(INTEGER_BY_VALUE, FieldSource::uint(integer_value))),
        )
        .replicate(
            Replica::<NilKeyTest>::builder()
                .index(IndexDef::field64(NIL_KEY_BY_REF, FieldSource::bytes(nil_key_ref))),
        )
        .connect()
        .expect("context connects")
}

/// Poll `done` until it holds, failing after a generous propagation window
pub fn eventually(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

pub fn wait_drained<R: Remote>(remote: &R) {
    eventually(|| remote.pending_writes().unwrap() == 0);
}
