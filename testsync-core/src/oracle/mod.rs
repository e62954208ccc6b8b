//! Oracle Integration Module
//!
//! The oracle is the external natural-language analysis function that
//! proposes test-case content. It is modeled strictly as a stateless
//! text-to-text call behind the [`Oracle`] trait: every reply is untrusted
//! input that must pass a schema check before it can touch the store.

pub mod client;
pub mod prompts;
pub mod responses;

pub use client::{Oracle, OracleClient, OracleError, OracleMode};
pub use responses::{parse_pattern_reply, parse_sync_reply, RawTestCase, SyncReply};
