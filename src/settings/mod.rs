// Settings: the persisted pipeline configuration and its JSON store.

pub mod store;
pub mod types;
