//! Proposal reconciliation
//!
//! A save that dies between writing its proposal and promoting or
//! discarding it leaves a `proposal` record behind. The sweep decides each
//! one from the live document:
//!
//! | Live document                        | Action                                  |
//! |--------------------------------------|-----------------------------------------|
//! | an entry already records the version | discard every proposal for it           |
//! | version moved past, within grace     | leave (the committing save promotes)    |
//! | version moved past, older than grace | promote one, discard the rest           |
//! | version unchanged, older than grace  | discard (the commit never landed)       |
//! | version unchanged, within grace      | leave (a save may still be in flight)   |
//! | gone, older than grace               | discard                                 |
//!
//! Every proposal for the same `(document, version)` copies the same stored
//! state, so promoting any one of them yields the same entry.

use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};
use verso_core::{DocId, Timestamp, Version, VersoError, VersoResult};

use crate::history::{Snapshot, VersionHistory};
use crate::repository::Repository;

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Proposals confirmed as entries
    pub promoted: usize,
    /// Proposals removed
    pub discarded: usize,
    /// Proposals left for a later sweep
    pub left_pending: usize,
}

impl ReconcileReport {
    /// Check if the sweep changed nothing
    pub fn is_clean(&self) -> bool {
        self.promoted == 0 && self.discarded == 0
    }
}

impl Repository {
    /// Reconcile stuck proposals using the configured grace period
    pub fn reconcile(&self) -> VersoResult<ReconcileReport> {
        self.reconcile_with_grace(self.config().proposal_grace())
    }

    /// Reconcile stuck proposals with an explicit grace period
    pub fn reconcile_with_grace(&self, grace: Duration) -> VersoResult<ReconcileReport> {
        self.reconcile_at(Timestamp::now(), grace)
    }

    /// Reconcile as of `now`
    pub fn reconcile_at(&self, now: Timestamp, grace: Duration) -> VersoResult<ReconcileReport> {
        let history = self.version_history().ok_or_else(|| {
            VersoError::invalid_input(format!(
                "{} is not versioned and has no proposals",
                self.model().doc_type()
            ))
        })?;
        history.refresh()?;

        let mut groups: BTreeMap<(DocId, Version), Vec<Snapshot>> = BTreeMap::new();
        for proposal in history.find_proposals()? {
            groups
                .entry((proposal.document_id().clone(), proposal.document_version()))
                .or_default()
                .push(proposal);
        }

        let mut report = ReconcileReport::default();
        for ((document_id, version), mut proposals) in groups {
            proposals.sort_by_key(Snapshot::written_at);
            self.reconcile_group(history, &document_id, version, proposals, now, grace, &mut report)?;
        }

        if !report.is_clean() {
            history.refresh()?;
        }
        info!(
            target: "verso::reconcile",
            doc_type = self.model().doc_type(),
            promoted = report.promoted,
            discarded = report.discarded,
            left_pending = report.left_pending,
            "reconciled proposals"
        );
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn reconcile_group(
        &self,
        history: &VersionHistory,
        document_id: &DocId,
        version: Version,
        proposals: Vec<Snapshot>,
        now: Timestamp,
        grace: Duration,
        report: &mut ReconcileReport,
    ) -> VersoResult<()> {
        if history
            .find_by_document_and_version(document_id, version)?
            .is_some()
        {
            for proposal in &proposals {
                self.discard_stuck(history, proposal, "entry already recorded", report)?;
            }
            return Ok(());
        }

        let live = self.store().get(self.index(), document_id)?;
        let superseded_by = live
            .as_ref()
            .filter(|stored| stored.version() > version)
            .map(|stored| (stored.version(), stored));

        if let Some((live_version, stored)) = superseded_by {
            // the committing save promotes its own proposal; give it time
            if proposals.iter().any(|p| is_young(p, now, grace)) {
                report.left_pending += proposals.len();
                return Ok(());
            }
            let mut proposals = proposals.into_iter();
            if let Some(mut winner) = proposals.next() {
                // only the write right after `version` knows the commit time
                let committed_at = if live_version == version.next() {
                    self.to_entity(stored)?.updated_at()
                } else {
                    None
                }
                .or(Some(winner.written_at()));

                warn!(
                    target: "verso::reconcile",
                    snapshot = %winner.id(),
                    document = %document_id,
                    version = %version,
                    live = %live_version,
                    "promoting stuck proposal"
                );
                history.promote(&mut winner, committed_at)?;
                report.promoted += 1;
            }
            for proposal in proposals {
                self.discard_stuck(history, &proposal, "duplicate proposal", report)?;
            }
            return Ok(());
        }

        for proposal in &proposals {
            if is_young(proposal, now, grace) {
                report.left_pending += 1;
            } else {
                self.discard_stuck(history, proposal, "commit never landed", report)?;
            }
        }
        Ok(())
    }

    fn discard_stuck(
        &self,
        history: &VersionHistory,
        proposal: &Snapshot,
        reason: &str,
        report: &mut ReconcileReport,
    ) -> VersoResult<()> {
        warn!(
            target: "verso::reconcile",
            snapshot = %proposal.id(),
            document = %proposal.document_id(),
            version = %proposal.document_version(),
            reason,
            "discarding stuck proposal"
        );
        history.discard(proposal)?;
        report.discarded += 1;
        Ok(())
    }
}

fn is_young(proposal: &Snapshot, now: Timestamp, grace: Duration) -> bool {
    now.duration_since(proposal.written_at()).unwrap_or_default() < grace
}
