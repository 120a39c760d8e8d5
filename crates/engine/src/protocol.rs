//! Save/Commit protocol for versioned models
//!
//! ```text
//! START ─► VALIDATE_VERSION ─► WRITE_PROPOSAL ─► COMMIT_MAIN ─► PROMOTE_SNAPSHOT ─► DONE
//!                 │                                   │
//!                 │ (mismatch: fail fast)             │ (store conflict)
//!                 ▼                                   ▼
//!         CONFLICT_REPORTED ◄──────────────── ROLLBACK_PROPOSAL
//! ```
//!
//! A successful save makes four store round trips (get, create proposal,
//! conditional update, promote); a save that loses the race at commit makes
//! four as well (get, create proposal, failed update, discard).
//!
//! ## Guarantees
//!
//! - The proposal copies the *stored* state being superseded, never the
//!   caller's pending edits.
//! - Version comparison is strict equality. A held version behind or ahead
//!   of the stored one is a conflict; nothing is merged or retried.
//! - On any failure the caller's entity is left exactly as it was, stale
//!   version included.
//! - A failed rollback is logged and never masks the conflict. The orphan
//!   keeps its `proposal` status and is picked up by reconciliation.
//! - A commit that fails for a reason other than a conflict may or may not
//!   have landed. Its proposal is left in place for reconciliation, which
//!   can tell the two cases apart by the live version.

use std::sync::Arc;
use tracing::{debug, warn};
use verso_core::{StoreError, Timestamp, VersoError, VersoResult};
use verso_store::DocumentStore;

use crate::entity::Entity;
use crate::history::VersionHistory;
use crate::model::Model;
use crate::stamp::stamp_updated;

/// Protocol states, as reported in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStage {
    /// Re-read the stored document and compare versions
    ValidateVersion,
    /// Record the stored state as a proposal
    WriteProposal,
    /// Conditional update of the live document
    CommitMain,
    /// Confirm the proposal as a history entry
    PromoteSnapshot,
    /// Remove the proposal after a lost race
    RollbackProposal,
    /// Save committed and recorded
    Done,
    /// Conflict surfaced to the caller
    ConflictReported,
}

/// One versioned save
pub(crate) struct SaveProtocol<'a> {
    pub(crate) store: &'a dyn DocumentStore,
    pub(crate) model: &'a Arc<Model>,
    pub(crate) index: &'a str,
    pub(crate) history: &'a VersionHistory,
}

impl SaveProtocol<'_> {
    fn enter(&self, stage: SaveStage, entity: &Entity) {
        debug!(
            target: "verso::save",
            doc_type = self.model.doc_type(),
            id = ?entity.id(),
            ?stage,
            "save stage"
        );
    }

    /// Run the protocol. On success `entity` carries the new version and
    /// stamps; on failure it is untouched.
    pub(crate) fn run(&self, entity: &mut Entity, now: Timestamp) -> VersoResult<()> {
        let doc_type = self.model.doc_type();
        let id = entity.require_id()?.clone();
        let held = entity.version().ok_or_else(|| {
            VersoError::invalid_input(format!(
                "{} {} was read without its version and cannot be saved",
                doc_type, id
            ))
        })?;

        // VALIDATE_VERSION
        self.enter(SaveStage::ValidateVersion, entity);
        let stored = self
            .store
            .get(self.index, &id)?
            .ok_or_else(|| VersoError::MissingPreviousVersion {
                doc_type: doc_type.to_string(),
                id: id.clone(),
            })?;
        if stored.version() != held {
            warn!(
                target: "verso::save",
                doc_type,
                id = %id,
                held = %held,
                stored = %stored.version(),
                "version mismatch before write"
            );
            self.enter(SaveStage::ConflictReported, entity);
            return Err(VersoError::Conflict {
                doc_type: doc_type.to_string(),
                id,
                held,
                stored: stored.version(),
            });
        }

        // WRITE_PROPOSAL
        self.enter(SaveStage::WriteProposal, entity);
        let mut proposal = self.history.write_proposal(&stored)?;

        // COMMIT_MAIN
        self.enter(SaveStage::CommitMain, entity);
        let mut pending = entity.clone();
        let committed_at = match stamp_updated(&mut pending, now) {
            Ok(stamp) => stamp,
            Err(e) => {
                self.rollback(&proposal, entity);
                return Err(e);
            }
        };

        let ack = match self
            .store
            .update(self.index, &id, pending.to_body(), Some(held))
        {
            Ok(ack) => ack,
            Err(StoreError::Conflict { actual, .. }) => {
                warn!(
                    target: "verso::save",
                    doc_type,
                    id = %id,
                    held = %held,
                    stored = %actual,
                    "lost race at commit"
                );
                self.rollback(&proposal, entity);
                self.enter(SaveStage::ConflictReported, entity);
                return Err(VersoError::Conflict {
                    doc_type: doc_type.to_string(),
                    id,
                    held,
                    stored: actual,
                });
            }
            Err(StoreError::DocumentMissing { .. }) => {
                self.rollback(&proposal, entity);
                return Err(VersoError::MissingPreviousVersion {
                    doc_type: doc_type.to_string(),
                    id,
                });
            }
            Err(e) => {
                warn!(
                    target: "verso::save",
                    doc_type,
                    id = %id,
                    proposal = %proposal.id(),
                    error = %e,
                    "commit outcome unknown, proposal left for reconciliation"
                );
                return Err(e.into());
            }
        };
        pending.set_version(Some(ack.version));

        // PROMOTE_SNAPSHOT
        self.enter(SaveStage::PromoteSnapshot, &pending);
        let promoted = self.history.promote(&mut proposal, committed_at);

        // the live write has landed either way
        entity.adopt(pending);
        if let Err(e) = promoted {
            warn!(
                target: "verso::save",
                doc_type,
                id = %id,
                proposal = %proposal.id(),
                error = %e,
                "committed but proposal not promoted, left for reconciliation"
            );
            return Err(e);
        }

        self.enter(SaveStage::Done, entity);
        Ok(())
    }

    fn rollback(&self, proposal: &crate::history::Snapshot, entity: &Entity) {
        self.enter(SaveStage::RollbackProposal, entity);
        if let Err(e) = self.history.discard(proposal) {
            warn!(
                target: "verso::save",
                doc_type = self.model.doc_type(),
                proposal = %proposal.id(),
                error = %e,
                "failed to discard proposal"
            );
        }
    }
}
