#![forbid(unsafe_code)]

pub mod config;
pub mod consts;
pub mod search;
pub mod storage;
pub mod transport;
mod contact;
mod heap;
mod id;
mod kbucket;
mod node;
mod table;

pub use contact::Contact;
pub use heap::BoundedHeap;
pub use id::{Id, IdError, IdRange};
pub use node::{KademliaNode, StoreError};
pub use table::{AddOutcome, RoutingTable};
