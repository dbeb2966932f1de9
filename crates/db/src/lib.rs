pub mod call_store;
pub mod connection;
pub mod indexes;
pub mod models;

pub use call_store::MongoCallStore;
pub use connection::connect;
pub use indexes::ensure_indexes;
