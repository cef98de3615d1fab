//! One-shot merge of local and remote notes after login.
//!
//! The pass pushes whatever the remote is missing, then rebuilds the local
//! store from a fresh remote listing. The remote set is authoritative after a
//! completed pass: a local note whose push failed is not in that listing and
//! is dropped by the rebuild. There is no retry queue.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use ideaflash_core::{FlashClock, FlashId, NewNote, OwnerToken, UserId};
use ideaflash_storage::{NoteStorage, StorageError};

use crate::error::EngineError;
use crate::remote::{RemoteDraft, RemoteNote, RemoteNotes};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStatus {
    /// All steps ran; the local store mirrors the remote listing.
    Completed,
    /// No user or no remote configured.
    Skipped,
    /// Another pass holds the guard.
    AlreadyRunning,
    /// A remote listing failed; the local store was not rebuilt.
    RemoteUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub status: ReconcileStatus,
    /// Remote notes inserted locally before pushing
    pub adopted: usize,
    /// Anonymous notes pushed under a user-scoped flash id
    pub promoted: usize,
    /// User notes the remote did not have, pushed under their own flash id
    pub pushed: usize,
    pub push_failures: usize,
    /// Notes in the local store after the rebuild
    pub rebuilt: usize,
    pub duplicates_dropped: usize,
    pub blank_dropped: usize,
}

impl ReconcileReport {
    fn new(status: ReconcileStatus) -> Self {
        Self {
            status,
            adopted: 0,
            promoted: 0,
            pushed: 0,
            push_failures: 0,
            rebuilt: 0,
            duplicates_dropped: 0,
            blank_dropped: 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ReconcileStatus::Completed
    }
}

/// Clears the in-progress flag when the pass ends, however it ends.
pub struct ReconcileGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ReconcileGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Debug, Default)]
pub struct Reconciler {
    running: AtomicBool,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// `None` while another pass is in progress.
    pub fn try_begin(&self) -> Option<ReconcileGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ReconcileGuard {
                flag: &self.running,
            })
    }

    /// Run a full pass. Remote failures are logged and reflected in the
    /// report; only local storage failures are returned as errors.
    pub fn reconcile(
        &self,
        storage: &mut NoteStorage,
        remote: Option<&dyn RemoteNotes>,
        user: Option<&UserId>,
        clock: &mut FlashClock,
    ) -> Result<ReconcileReport, EngineError> {
        let (Some(remote), Some(user)) = (remote, user) else {
            log::debug!("reconcile skipped: no authenticated remote");
            return Ok(ReconcileReport::new(ReconcileStatus::Skipped));
        };
        let Some(_guard) = self.try_begin() else {
            log::warn!("reconcile already in progress, ignoring second request");
            return Ok(ReconcileReport::new(ReconcileStatus::AlreadyRunning));
        };
        let owner = OwnerToken::User(user.clone());
        let mut report = ReconcileReport::new(ReconcileStatus::Completed);
        log::info!("reconciling notes for {user}");

        let remote_notes = match remote.list_notes() {
            Ok(notes) => notes,
            Err(e) => {
                log::warn!("reconcile aborted, could not list remote notes: {e}");
                report.status = ReconcileStatus::RemoteUnavailable;
                return Ok(report);
            }
        };
        for note in &remote_notes {
            clock.observe(note.flash_id.timestamp_ms());
        }
        let remote_ids: HashSet<FlashId> =
            remote_notes.iter().map(|n| n.flash_id.clone()).collect();

        // adopt remote-only notes
        for note in &remote_notes {
            if note.is_blank() || storage.find_by_flash_id(&note.flash_id)?.is_some() {
                continue;
            }
            match storage.add_note(note.to_new_note()) {
                Ok(_) => report.adopted += 1,
                // same flash id listed twice by the remote
                Err(StorageError::DuplicateKey(key)) => {
                    log::debug!("skipping duplicate remote note {key}");
                }
                Err(e) => return Err(e.into()),
            }
        }

        // push local-only notes
        for note in storage.get_notes(None)? {
            let (target, promote) = if note.flash_id.is_anonymous() {
                (FlashId::mint(clock.tick(), &owner), true)
            } else if !remote_ids.contains(&note.flash_id) {
                (note.flash_id.clone(), false)
            } else {
                continue;
            };

            match remote.create_note(&RemoteDraft::from_note(&note, target.clone())) {
                Ok(_) => {
                    log::debug!("pushed {} as {target}", note.flash_id);
                    // the anonymous original now lives on under `target`
                    if promote && remote_ids.contains(&note.flash_id) {
                        if let Err(e) = remote.delete_note(&note.flash_id) {
                            log::warn!(
                                "could not remove promoted remote note {}: {e}",
                                note.flash_id
                            );
                        }
                    }
                    match storage.delete_note(&note.local_id) {
                        Ok(()) | Err(StorageError::NotFound(_)) => {}
                        Err(e) => return Err(e.into()),
                    }
                    if promote {
                        report.promoted += 1;
                    } else {
                        report.pushed += 1;
                    }
                }
                Err(e) => {
                    log::warn!("failed to push note {}: {e}", note.flash_id);
                    report.push_failures += 1;
                }
            }
        }

        // rebuild from the authoritative remote set
        let fresh = match remote.list_notes() {
            Ok(notes) => notes,
            Err(e) => {
                log::warn!("reconcile stopped before rebuild, could not list remote notes: {e}");
                report.status = ReconcileStatus::RemoteUnavailable;
                return Ok(report);
            }
        };
        let rebuild = authoritative_set(fresh);
        report.duplicates_dropped = rebuild.duplicates;
        report.blank_dropped = rebuild.blank;
        if rebuild.duplicates > 0 || rebuild.blank > 0 {
            log::warn!(
                "remote listing had {} duplicate and {} blank notes, dropped",
                rebuild.duplicates,
                rebuild.blank
            );
        }
        report.rebuilt = storage.replace_all(rebuild.notes)?.len();
        if report.push_failures > 0 {
            log::warn!(
                "{} local notes could not be pushed and were dropped by the rebuild",
                report.push_failures
            );
        }
        log::info!(
            "reconcile finished: {} adopted, {} promoted, {} pushed, {} local notes",
            report.adopted,
            report.promoted,
            report.pushed,
            report.rebuilt
        );
        Ok(report)
    }
}

struct Rebuild {
    notes: Vec<NewNote>,
    duplicates: usize,
    blank: usize,
}

/// One note per flash id (latest `updated_at` wins), blank notes skipped,
/// otherwise in listing order.
fn authoritative_set(listing: Vec<RemoteNote>) -> Rebuild {
    let mut picked: Vec<RemoteNote> = Vec::with_capacity(listing.len());
    let mut index: HashMap<FlashId, usize> = HashMap::new();
    let mut duplicates = 0;
    let mut blank = 0;

    for note in listing {
        if note.is_blank() {
            blank += 1;
            continue;
        }
        match index.get(&note.flash_id) {
            Some(&i) => {
                duplicates += 1;
                if note.updated_at > picked[i].updated_at {
                    picked[i] = note;
                }
            }
            None => {
                index.insert(note.flash_id.clone(), picked.len());
                picked.push(note);
            }
        }
    }

    Rebuild {
        notes: picked.iter().map(RemoteNote::to_new_note).collect(),
        duplicates,
        blank,
    }
}
