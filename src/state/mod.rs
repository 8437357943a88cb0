pub mod clock;
pub mod pick_store;

pub use pick_store::{MemoryPickStore, PickStore};
