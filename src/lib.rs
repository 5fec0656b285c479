#![allow(clippy::doc_markdown)] // Allow technical terms like SimpleStrategy, JSONL in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Range Decommission
//!
//! Resumable, throttled removal of a storage node from a token-partitioned,
//! replicated cluster.
//!
//! ## Overview
//!
//! Decommissioning hands every token range the leaving node replicates to the
//! node that becomes responsible for it once the leaving node's tokens are
//! gone, then removes the node from the ring. Interrupted attempts resume:
//! ranges durably recorded as transferred are skipped on the next attempt.
//!
//! ## Architecture
//!
//! - A **concurrency guard** holds the node's `Leaving` status in cluster
//!   membership for the whole attempt; a second attempt is rejected at once
//! - The **range planner** walks the ring (SimpleStrategy) before and after
//!   removal to find `(keyspace, range, target)` stream tasks
//! - The **stream engine** moves each range through a staging session on the
//!   target under one shared outbound throttle
//! - The **transfer ledger** persists per-range outcomes so a retry can skip
//!   finished work
//! - The **state machine** sequences the attempt and publishes lifecycle
//!   events
//!
//! ## Module Organization
//!
//! - [`models`] - Tokens, ranges, ring topology, stream plans, ledger records
//! - [`membership`] - Cluster membership contract and in-memory implementation
//! - [`streaming`] - Range transfer engine, throttle, data source and transport
//! - [`ledger`] - Durable transfer history
//! - [`state_machine`] - Decommission lifecycle
//! - [`orchestration`] - Planning and the administrative service
//! - [`events`] - Lifecycle event publishing
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use range_decommission::config::ConfigManager;
//! use range_decommission::ledger::FileTransferLedger;
//! use range_decommission::membership::InMemoryMembership;
//! use range_decommission::models::NodeId;
//! use range_decommission::orchestration::DecommissionService;
//! use range_decommission::streaming::{InMemoryNodeStore, InMemoryTransport};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let config = manager.config();
//!
//! let local = NodeId::from("node2");
//! let membership = Arc::new(InMemoryMembership::new());
//! let store = Arc::new(InMemoryNodeStore::new());
//! let transport = Arc::new(InMemoryTransport::new());
//! let ledger = Arc::new(FileTransferLedger::open(config.ledger.path()).await?);
//!
//! let service = DecommissionService::new(config, local.clone(), membership, store, transport, ledger);
//! service.recover().await?;
//! let report = service.decommission(&local).await?;
//! println!("moved {} ranges, skipped {}", report.transferred, report.skipped);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod logging;
pub mod membership;
pub mod models;
pub mod orchestration;
pub mod state_machine;
pub mod streaming;

pub use config::{ConfigManager, DecommissionConfig, EventConfig, LedgerConfig, StreamingConfig};
pub use error::{DecommissionError, Result};
pub use events::{EventPublisher, LifecycleEvent, PublishedEvent};
pub use ledger::{FileTransferLedger, InMemoryTransferLedger, LedgerError, TransferLedger};
pub use membership::{ClusterMembership, InMemoryMembership, MembershipError};
pub use models::{
    AttemptId, KeyspaceReplication, MembershipState, NodeId, NodeStatus, RingTopology,
    StreamPlan, StreamTask, Token, TokenRange, TransferRecord, TransferStatus,
};
pub use orchestration::{DecommissionService, DecommissionStatus, RangeOwnershipPlanner};
pub use state_machine::{DecommissionReport, DecommissionState};
pub use streaming::{StreamThrottle, StreamTransferEngine, StreamingError};
