//! Core subsystem components
//!
//! - `checkout`: the checkout-index engine
//! - `index`: the staging area itself
//! - `object_store`: content-addressed blob storage
//! - `refs`: minimal symbolic reference handling
//! - `repository`: wiring and environment resolution
//! - `workspace`: working-tree filesystem operations

pub mod checkout;
pub mod index;
pub mod object_store;
pub mod refs;
pub mod repository;
pub mod workspace;
