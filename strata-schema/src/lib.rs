//! # strata-schema
//!
//! Model descriptors and structural snapshots for the Strata migration
//! engine.
//!
//! This crate is the "desired state" half of Strata: applications describe
//! their entities through an explicit descriptor API, a [`ModelRegistry`]
//! turns those descriptors into immutable [`ModelSnapshot`]s, and the
//! [`Dialect`] type owns everything that differs between database engines
//! (type spelling, identifier quoting, placeholder syntax, auto-increment
//! idiom).
//!
//! ## Example
//!
//! ```rust
//! use strata_schema::{Dialect, Entity, EntityDescriptor, FieldDescriptor, LogicalType, ModelRegistry};
//!
//! struct User;
//!
//! impl Entity for User {
//!     fn descriptor() -> EntityDescriptor {
//!         EntityDescriptor::new("User")
//!             .column(FieldDescriptor::new("id", LogicalType::Int64).primary_key())
//!             .column(
//!                 FieldDescriptor::new("email", LogicalType::String)
//!                     .max_length(255)
//!                     .unique(),
//!             )
//!     }
//! }
//!
//! let mut registry = ModelRegistry::new(Dialect::Postgres);
//! registry.register::<User>();
//!
//! let snapshot = registry.get("users").unwrap();
//! assert!(snapshot.columns.contains_key("email"));
//! ```

pub mod checksum;
pub mod descriptor;
pub mod dialect;
pub mod naming;
pub mod registry;
pub mod snapshot;
pub mod types;

// Re-exports
pub use descriptor::{Entity, EntityDescriptor, FieldDescriptor, FieldSpec};
pub use dialect::Dialect;
pub use registry::ModelRegistry;
pub use snapshot::{
    ColumnInfo, ConstraintInfo, ConstraintKind, ForeignKeyRef, IndexInfo, ModelSnapshot,
    TableSchema,
};
pub use types::LogicalType;
