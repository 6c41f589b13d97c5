//! Item types of the response vocabulary.

pub mod chain;
pub mod root;
pub mod server_error;

pub use chain::ChainNode;
pub use root::{CompletionCallback, ResponseTree, Root, RootItem};
pub use server_error::ServerError;
