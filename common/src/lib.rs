// Block cache common library - shared block and hash types

pub mod block;
pub mod hash;
pub mod stores;

// Flattened re-exports
pub use self::block::{Block, BlockHeader};
pub use self::hash::{BlockHash, Hash};
pub use self::stores::{ChainStore, StateStore};
