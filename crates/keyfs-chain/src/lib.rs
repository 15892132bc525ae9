//! keyfs-chain: per-filesystem key chain persistence and traversal.
//!
//! A chain is an ordered sequence of keys where each one wraps (encrypts) the
//! next. The store persists the wrap relation keyed by the wrapping key's
//! public fingerprint; the "pointer" to the successor is ciphertext that only
//! the wrapping key can follow, so the relation is a forest keyed by content
//! identity rather than a linked list.

pub mod resolve;
pub mod store;

pub use resolve::{
    add_chain, add_chain_end, del_chain, random_chain, resolve, ChainLookup, RandomChainPolicy,
};
pub use store::{ChainStore, STORE_FILE};
