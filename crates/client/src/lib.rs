//! Client facade for configstore
//!
//! This crate ties the replica engine to a remote entity store:
//! - Remote: contract with the store that owns durable state
//! - InMemoryRemote: in-process store with an asynchronous commit queue
//! - Configstore: connection context owning one replica and one watch
//!   worker per registered kind
//! - EntitySet: typed per-kind access, writes to the remote and reads from
//!   the local replica
//!
//! # Example
//!
//! ```ignore
//! let remote = Arc::new(InMemoryRemote::new()?);
//! let store = Configstore::builder(Arc::clone(&remote))
//!     .replicate(Replica::<User>::builder().index(by_email))
//!     .connect()?;
//!
//! let users = store.entities::<User>()?;
//! let ada = users.create(user("ada@example.com"))?;
//! // Visible locally once the watch stream delivers it
//! let local = users.get(ada.key());
//! store.close()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod remote;
pub mod store;

pub use memory::InMemoryRemote;
pub use remote::Remote;
pub use store::{Configstore, ConfigstoreBuilder, EntitySet};
