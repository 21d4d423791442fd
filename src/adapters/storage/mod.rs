pub mod snapshot_store;
pub mod upload_store;
