//! Classical and quantum communication channels.

mod classical;
mod quantum;

pub use classical::{ClassicalChannel, Message, MessageKind, Payload};
pub use quantum::{QuantumChannel, QuantumChannelSnapshot};
