//! # Data Model
//!
//! Plain data types shared by the planner, the streaming engine, the ledger and
//! the state machine. Nothing in here performs I/O.

pub mod node;
pub mod ring;
pub mod stream_plan;
pub mod token;
pub mod transfer;

pub use node::{AttemptId, MembershipState, NodeId, NodeStatus};
pub use ring::{KeyspaceReplication, RingTopology};
pub use stream_plan::{StreamPlan, StreamTask};
pub use token::{Token, TokenRange};
pub use transfer::{TransferRecord, TransferStatus};
