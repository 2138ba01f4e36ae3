//! Document-collection persistence for casbin policy rules.
//!
//! # Purpose
//! Stores authorization rules as fixed-width documents (`ptype`, `v0`..`v5`) in a
//! rule collection and implements the load / save / incremental-update contract
//! a policy enforcement engine expects from its storage.
//!
//! # How it fits
//! - [`codec`] maps rules to documents and back.
//! - [`collection`] is the storage seam, with in-memory and Postgres backends.
//! - [`RuleAdapter`] loads, saves and mutates rules through a collection, and
//!   implements `casbin::Adapter` so an `Enforcer` can use it directly.
//!
//! # Key invariants
//! - Decoding stops at the first empty field.
//! - A full save is refused after a filtered load.
//! - Loads never deduplicate or reorder what storage returns.
//!
//! # Examples
//! ```rust
//! use rulestore_adapter::{AdapterConfig, InMemoryCollection, RuleAdapter, RuleModel};
//!
//! # async fn demo() -> rulestore_adapter::AdapterResult<()> {
//! let mut adapter = RuleAdapter::open(InMemoryCollection::new(), &AdapterConfig::default()).await?;
//! let rule = vec!["alice".to_string(), "data1".to_string(), "read".to_string()];
//! adapter.add_policy("p", "p", &rule).await?;
//!
//! let mut model = RuleModel::new();
//! adapter.load(&mut model).await?;
//! assert_eq!(model.rules("p", "p"), &[rule]);
//! # Ok(())
//! # }
//! ```
//!
//! # Common pitfalls
//! - Saving after `load_filtered` fails with [`AdapterError::FilteredSave`]; reload
//!   unfiltered first.
//! - Collections relying on the default `replace_all` are empty between the drop
//!   and the bulk insert of a save, and stay empty if the insert fails.

pub mod adapter;
mod casbin_adapter;
pub mod codec;
pub mod collection;
pub mod config;
mod errors;
mod filter_state;
pub mod model;
pub mod observability;
pub mod selector;

pub use adapter::RuleAdapter;
pub use codec::{DecodeError, DecodedRule, FIELD_COUNT, StoredDocument, decode, encode};
pub use collection::memory::InMemoryCollection;
#[cfg(feature = "postgres")]
pub use collection::postgres::PostgresCollection;
pub use collection::{CollectionError, CollectionResult, DocumentStream, RuleCollection};
pub use config::{AdapterConfig, PostgresConfig};
pub use errors::{AdapterError, AdapterResult};
pub use filter_state::FilterState;
pub use model::{PolicyModel, RuleModel};
pub use selector::Selector;
