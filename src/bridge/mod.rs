//! Bridge orchestration over a fixed two-chain pair
//!
//! The orchestrator keeps the dependency graph of bridge-form fields
//! (token, account, amount, destination, fee, min/max) consistent while
//! recomputation runs against the pair's bridge services, and polls both
//! chains for the mirrored transaction after submission.

mod orchestrator;

pub use orchestrator::{
    BridgeFields, BridgeMirror, BridgeOrchestrator, BridgeWaitParams, WAIT_ATTEMPTS, WAIT_DELAY,
};
