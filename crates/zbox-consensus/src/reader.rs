//! Quorum reads across replicas
//!
//! A read dispatches the same GET to every selected replica at once, feeds
//! the answers into a [`ConsensusMap`] as they arrive and returns as soon as
//! enough of them agree. Outstanding requests are aborted at that point.

use std::future::Future;
use std::sync::Arc;

use rand::seq::SliceRandom;
use serde::de::DeserializeOwned;
use tokio::task::JoinSet;
use tokio::time::error::Elapsed;
use tracing::{debug, info, warn};
use zbox_transport::{GetResponse, HttpClient, HttpClientConfig, HttpGet, TransportResult};

use crate::config::{NodeSelection, QuorumConfig};
use crate::consensus_map::ConsensusMap;
use crate::error::{QuorumError, QuorumResult};
use crate::node_holder::NodeHolder;

type ReplicaOutcome = (String, Result<TransportResult<GetResponse>, Elapsed>);

/// Result of one quorum read
#[derive(Debug)]
pub struct QuorumResponse {
    pub consensus: ConsensusMap,
    /// Replicas the read was sent to, in dispatch order
    pub replicas: Vec<String>,
    pub required: usize,
    pub consensus_reached: bool,
}

impl QuorumResponse {
    /// Winning body, whether or not it reached the threshold
    pub fn body(&self) -> Option<&str> {
        self.consensus.win_info()
    }

    /// Keep the tally only if it reached the threshold
    pub fn into_consensus(self) -> QuorumResult<ConsensusMap> {
        if self.consensus_reached {
            Ok(self.consensus)
        } else {
            Err(QuorumError::NoConsensus {
                agreed: self.consensus.max_consensus(),
                required: self.required,
                last_error: self.consensus.win_error().map(str::to_string),
            })
        }
    }
}

/// Multi-replica reader
pub struct QuorumReader<C: HttpGet> {
    client: Arc<C>,
    holder: Arc<NodeHolder>,
    config: QuorumConfig,
}

impl QuorumReader<HttpClient> {
    /// Reader over a pooled reqwest client
    pub fn with_http(
        holder: Arc<NodeHolder>,
        config: QuorumConfig,
        http: HttpClientConfig,
    ) -> QuorumResult<Self> {
        let client = HttpClient::new(http)?;
        Self::new(client, holder, config)
    }
}

impl<C: HttpGet + 'static> QuorumReader<C> {
    pub fn new(client: C, holder: Arc<NodeHolder>, config: QuorumConfig) -> QuorumResult<Self> {
        config.validate()?;
        Ok(Self {
            client: Arc::new(client),
            holder,
            config,
        })
    }

    pub fn holder(&self) -> &Arc<NodeHolder> {
        &self.holder
    }

    pub fn config(&self) -> &QuorumConfig {
        &self.config
    }

    fn select_replicas(&self) -> Vec<String> {
        let mut replicas = match self.config.selection {
            NodeSelection::Healthy => self.holder.healthy(),
            NodeSelection::All => self.holder.all(),
        };
        if self.config.shuffle {
            replicas.shuffle(&mut rand::thread_rng());
        }
        replicas
    }

    /// Read `query` (path and query string) from the selected replicas.
    ///
    /// Runs until consensus, until every replica has answered, or until the
    /// configured read timeout.
    pub async fn read(&self, query: &str) -> QuorumResult<QuorumResponse> {
        self.read_with_cancel(query, std::future::pending()).await
    }

    /// Like [`read`](Self::read), but also stops when `cancel` completes.
    ///
    /// A stopped read still returns whatever agreement it has gathered. It
    /// fails with [`QuorumError::Timeout`] only when no replica produced a
    /// usable body.
    pub async fn read_with_cancel<F>(&self, query: &str, cancel: F) -> QuorumResult<QuorumResponse>
    where
        F: Future<Output = ()>,
    {
        let replicas = self.select_replicas();
        let required = self.config.required_consensus(replicas.len());
        let mut consensus = ConsensusMap::new(required);

        let mut tasks: JoinSet<ReplicaOutcome> = JoinSet::new();
        for node in &replicas {
            let url = format!("{}{}", node, query);
            debug!(node = %node, url = %url, "Querying replica");

            let client = Arc::clone(&self.client);
            let node = node.clone();
            let request_timeout = self.config.request_timeout;
            tasks.spawn(async move {
                let outcome = tokio::time::timeout(request_timeout, client.get(&url)).await;
                (node, outcome)
            });
        }

        let deadline = tokio::time::sleep(self.config.read_timeout);
        tokio::pin!(deadline);
        tokio::pin!(cancel);

        let mut interrupted = false;
        loop {
            tokio::select! {
                joined = tasks.join_next() => {
                    let Some(joined) = joined else { break };
                    match joined {
                        Ok((node, outcome)) => self.absorb(&mut consensus, &node, outcome),
                        Err(e) => warn!(error = %e, "Replica task failed"),
                    }
                    if consensus.is_reached() {
                        break;
                    }
                }
                _ = &mut deadline => {
                    warn!(query = %query, "Quorum read deadline expired");
                    interrupted = true;
                    break;
                }
                _ = &mut cancel => {
                    debug!(query = %query, "Quorum read cancelled");
                    interrupted = true;
                    break;
                }
            }
        }
        tasks.abort_all();

        if interrupted && consensus.win_info().is_none() {
            return Err(QuorumError::Timeout);
        }

        let consensus_reached = consensus.is_reached();
        if consensus_reached {
            info!(
                query = %query,
                agreed = consensus.max_consensus(),
                required,
                replicas = replicas.len(),
                "Consensus reached"
            );
        } else {
            warn!(
                query = %query,
                agreed = consensus.max_consensus(),
                required,
                replicas = replicas.len(),
                rate = consensus.rate(replicas.len()),
                "Consensus not reached"
            );
        }

        Ok(QuorumResponse {
            consensus,
            replicas,
            required,
            consensus_reached,
        })
    }

    /// Quorum read that decodes one field of the agreed body
    pub async fn read_field<T: DeserializeOwned>(&self, query: &str, name: &str) -> QuorumResult<T> {
        let consensus = self.read(query).await?.into_consensus()?;
        consensus
            .decode_value(name)?
            .ok_or_else(|| QuorumError::MissingField(name.to_string()))
    }

    fn absorb(
        &self,
        consensus: &mut ConsensusMap,
        node: &str,
        outcome: Result<TransportResult<GetResponse>, Elapsed>,
    ) {
        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(node = %node, error = %e, "Replica request failed");
                self.holder.fail(node);
                return;
            }
            Err(_) => {
                warn!(node = %node, "Replica request timed out");
                self.holder.fail(node);
                return;
            }
        };

        if response.status_code >= 400 {
            self.holder.fail(node);
        } else {
            self.holder.success(node);
        }

        if response.status_code != 200 {
            warn!(
                node = %node,
                status = %response.status,
                "Replica returned an error status"
            );
        }

        if let Err(e) = consensus.add(response.status_code, &response.body) {
            warn!(node = %node, error = %e, "Discarding replica response");
        }
    }
}
