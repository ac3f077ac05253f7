//! # zbox-consensus
//!
//! Multi-replica reads for zbox.
//!
//! A read fans out to several sharders, fingerprints every JSON body they
//! return and stops as soon as enough of them agree. The replicas that answer
//! well are pulled to the front of the [`NodeHolder`] so later reads go to
//! them first.
//!
//! - [`ConsensusMap`]: per-read tally of response fingerprints
//! - [`NodeHolder`]: process-wide replica ranking by recent outcomes
//! - [`QuorumReader`]: the fan-out/collect loop tying the two together

pub mod config;
pub mod consensus_map;
pub mod error;
pub mod node_holder;
pub mod reader;

pub use config::{NodeSelection, QuorumConfig};
pub use consensus_map::ConsensusMap;
pub use error::{QuorumError, QuorumResult};
pub use node_holder::{NodeHolder, NodeStats, STATS_WINDOW};
pub use reader::{QuorumReader, QuorumResponse};
