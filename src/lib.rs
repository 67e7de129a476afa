//! peerlearn: peer-to-peer mentorship marketplace backend on the Arkiv
//! data network.
//!
//! Typed entity access over the ledger, a cached public explorer with
//! reconstructed transaction history, and perf instrumentation comparing
//! direct RPC reads against the GraphQL façade.

pub mod arkiv;
pub mod clock;
pub mod config;
pub mod entities;
pub mod explorer;
pub mod flags;
pub mod identity;
pub mod metrics;
pub mod server;
pub mod types;
