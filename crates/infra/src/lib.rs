//! Infrastructure layer: storage, number allocation, sessions, configuration
//! and the outbound collaborators (email, rendering, logo files).

pub mod config;
pub mod external;
pub mod numbering;
pub mod session;
pub mod store;

pub use config::BackOfficeConfig;
pub use numbering::InvoiceNumberAllocator;
pub use session::SessionStore;
pub use store::{
    BackOfficeStore, CatalogStore, InMemoryStore, InvoiceFilter, InvoiceStore, PartyStore, PostgresStore, Sequence,
    StoreError, seed_defaults,
};
