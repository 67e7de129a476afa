pub mod client;
pub mod entity;
pub mod error;
pub mod graphql;
pub mod memory;
pub mod query;

pub use client::{ArkivClient, BlockInfo, CreateEntity, CreateReceipt, Ledger, SignedCreate, TxReceipt};
pub use entity::{Entity, EntityMeta};
pub use error::LedgerError;
pub use graphql::GraphqlClient;
pub use memory::MemoryLedger;
pub use query::Query;
