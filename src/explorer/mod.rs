//! Public read model: explorer index, transaction metadata and history.

pub mod index;
pub mod serializers;
pub mod transactions;
pub mod tx_meta;
pub mod types;

pub use index::{ExplorerIndex, ExplorerIndexCache, IndexError};
pub use transactions::{CursorError, HistoryError, PageCursor, TransactionFilter, TransactionPage};
pub use tx_meta::{TxMetadata, TxMetadataCache};
pub use types::{ExplorerEntity, PublicEntity};
