use crate::core::{Block, BlockTemplate, ProofOfWork};
use crate::error::{BlockchainError, Result};
use crate::network::NodeState;
use log::{error, info};
use serde_json::Value;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

/// Handle to the background mining worker
///
/// Jobs are mined one at a time in arrival order. A job whose tip is
/// replaced mid-search is abandoned and restarted on the new tip, so the
/// payload still ends up in a block.
#[derive(Clone)]
pub struct Miner {
    jobs: Sender<Value>,
}

impl Miner {
    pub fn spawn(state: Arc<NodeState>) -> Result<Miner> {
        let (jobs, receiver) = mpsc::channel();
        thread::Builder::new()
            .name("miner".to_string())
            .spawn(move || Self::run(state, receiver))?;
        Ok(Miner { jobs })
    }

    /// Queue a payload for mining
    pub fn submit(&self, data: Value) -> Result<()> {
        self.jobs
            .send(data)
            .map_err(|e| BlockchainError::Mining(format!("Mining worker is gone: {e}")))
    }

    fn run(state: Arc<NodeState>, jobs: Receiver<Value>) {
        for data in jobs {
            if let Err(e) = Self::mine_job(&state, data) {
                error!(target: "miner", "Mining failed: {e}");
            }
        }
        info!(target: "miner", "Mining worker stopped");
    }

    fn mine_job(state: &NodeState, data: Value) -> Result<()> {
        Self::mine_job_with(state, data, |template, version| {
            ProofOfWork::find_block(template, || state.chain_version() != version)
        })
    }

    /// Run one job, re-templating whenever `search` gives up or the tip moves
    /// before the found block is submitted
    fn mine_job_with<F>(state: &NodeState, data: Value, mut search: F) -> Result<()>
    where
        F: FnMut(&BlockTemplate, u64) -> Option<Block>,
    {
        loop {
            let (template, version) = state.mining_template(data.clone())?;

            match search(&template, version) {
                Some(block) => {
                    let index = block.get_index();
                    let hash = block.get_hash().to_string();
                    if state.submit_mined_block(block, version)? {
                        info!(target: "miner", "New block {index} is mined: {hash}");
                        return Ok(());
                    }
                    if state.chain_version() == version {
                        return Err(BlockchainError::Mining(format!(
                            "Mined block {index} was rejected by an unchanged chain"
                        )));
                    }
                    info!(
                        target: "miner",
                        "Chain changed before block {index} was added, restarting"
                    );
                }
                None => info!(
                    target: "miner",
                    "Chain changed while mining, restarting on the new tip"
                ),
            }
        }
    }
}
