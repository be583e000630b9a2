//! Infrastructure layer: order storage, external collaborators, configuration
//! and the draft completion pipeline that ties them to the inventory ledger.

pub mod completion;
pub mod config;
pub mod external;
pub mod order_store;


pub use completion::{CompletedOrder, CompletionError, DraftOrderCompleter, ORDER_STREAM_TYPE};
pub use config::{CompletionConfig, ConfigError, ConsistencyMode};
pub use external::{
    CustomerDirectory, DefaultSearchDocument, DirectoryError, InMemoryCustomerDirectory,
    SearchDocumentBuilder,
};
pub use order_store::{InMemoryOrderStore, OrderStore, OrderStoreError};
