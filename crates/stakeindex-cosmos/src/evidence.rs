//! Per-height validator evidence shared by the uptime and vote indexers.

use stakeindex_core::error::IndexerError;
use stakeindex_core::source::{all_active_validators, ConsensusSource};
use stakeindex_core::types::CommitSignature;
use stakeindex_core::uptime::ActiveSet;

/// Active set and commit signatures of one height.
pub(crate) struct HeightEvidence {
    pub height: u64,
    pub active: ActiveSet,
    pub signatures: Vec<CommitSignature>,
}

pub(crate) async fn fetch_evidence(
    source: &dyn ConsensusSource,
    height: u64,
) -> Result<HeightEvidence, IndexerError> {
    let (validators, signatures) = tokio::try_join!(
        all_active_validators(source, height),
        source.commit_at(height)
    )?;
    Ok(HeightEvidence {
        height,
        active: ActiveSet::resolve(&validators)?,
        signatures,
    })
}
