/// The key-value record model.
pub mod kv;
