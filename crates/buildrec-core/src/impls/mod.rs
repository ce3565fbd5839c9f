//! Port implementations that live in this crate.

pub mod inmem_store;

pub use self::inmem_store::InMemoryRecordStore;
