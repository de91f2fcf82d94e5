// Concurrent competition runs
//
// Every invocation takes a slot in a process-wide registry and registers an
// activity file in the lock directory, so overlapping runs are seen across
// threads and processes. Lock and Fail also hold an OS file lock named after
// the competition id. The policy decides what happens on overlap:
// - Lock:    wait for the same competition to finish
// - Fail:    skip the run with a setup error
// - Default: run anyway, warn that timings may be affected
//
// File locks are advisory and released by the OS when the holder exits.

use crate::analysis::config::ConcurrencyPolicy;
use crate::limits::checksum;
use crate::messages::{MessageLog, MessageSource};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, OnceLock};

pub const PARALLEL_RUN_SKIPPED: &str = "Competitions cannot be run in parallel... run skipped.";
pub const PARALLEL_RUN_WARNING: &str =
    "Another competition is running in parallel; timings may be affected.";

const ACTIVITY_DIR: &str = "active";

#[derive(Debug)]
struct Slot {
    competition_id: String,
    /// Another competition was active at some point during this one
    overlapped: bool,
}

#[derive(Debug, Default)]
struct Registry {
    slots: Mutex<HashMap<u64, Slot>>,
    released: Condvar,
    next_token: AtomicU64,
}

impl Registry {
    fn global() -> &'static Registry {
        static REGISTRY: OnceLock<Registry> = OnceLock::new();
        REGISTRY.get_or_init(Registry::default)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn holds(slots: &HashMap<u64, Slot>, competition_id: &str) -> bool {
    slots.values().any(|s| s.competition_id == competition_id)
}

/// File-name stem for a competition: readable prefix plus a digest of the id
fn lock_stem(competition_id: &str) -> String {
    let readable: String = competition_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let digest = checksum(competition_id.as_bytes());
    format!("{}-{}", readable, &digest[..12])
}

/// Lock file guarding `competition_id` under the Lock and Fail policies
pub fn competition_lock_path(lock_dir: &Path, competition_id: &str) -> PathBuf {
    lock_dir.join(format!("{}.lock", lock_stem(competition_id)))
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
}

/// Competition file lock; `Ok(None)` when another holder has it and `wait` is off
fn acquire_competition_lock(
    lock_dir: &Path,
    competition_id: &str,
    wait: bool,
) -> io::Result<Option<File>> {
    let file = open_lock_file(&competition_lock_path(lock_dir, competition_id))?;
    match file.try_lock() {
        Ok(()) => Ok(Some(file)),
        Err(TryLockError::WouldBlock) if wait => {
            tracing::debug!(
                "Waiting for competition '{}' held by another process",
                competition_id
            );
            file.lock()?;
            Ok(Some(file))
        }
        Err(TryLockError::WouldBlock) => Ok(None),
        Err(TryLockError::Error(e)) => Err(e),
    }
}

/// Shared-locked marker of one running invocation
#[derive(Debug)]
struct ActivityFile {
    path: PathBuf,
    _file: File,
}

impl ActivityFile {
    fn register(lock_dir: &Path, competition_id: &str, token: u64) -> io::Result<Self> {
        let path = lock_dir.join(ACTIVITY_DIR).join(format!(
            "{}-{}-{}.lock",
            lock_stem(competition_id),
            std::process::id(),
            token
        ));
        let file = open_lock_file(&path)?;
        file.lock_shared()?;
        Ok(Self { path, _file: file })
    }
}

/// Whether any activity file other than `own` is held by a running invocation
fn other_activity(lock_dir: &Path, own: Option<&Path>) -> bool {
    let Ok(entries) = fs::read_dir(lock_dir.join(ACTIVITY_DIR)) else {
        return false;
    };
    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| Some(path.as_path()) != own)
        .any(|path| match File::open(&path) {
            // The lock taken on a free file is released when `file` drops
            Ok(file) => matches!(file.try_lock(), Err(TryLockError::WouldBlock)),
            Err(_) => false,
        })
}

/// Holds a competition slot until dropped
#[derive(Debug)]
pub struct CompetitionGuard {
    token: u64,
    id: String,
    policy: ConcurrencyPolicy,
    lock_dir: PathBuf,
    warned: bool,
    activity: Option<ActivityFile>,
    _lock: Option<File>,
}

impl CompetitionGuard {
    pub fn competition_id(&self) -> &str {
        &self.id
    }

    /// Whether another competition ran at the same time as this one
    pub fn overlapped(&self) -> bool {
        let flagged = Registry::global()
            .lock()
            .get(&self.token)
            .is_some_and(|slot| slot.overlapped);
        flagged
            || other_activity(
                &self.lock_dir,
                self.activity.as_ref().map(|a| a.path.as_path()),
            )
    }

    /// Warn about an overlap that started after this run entered
    ///
    /// Only the Default policy warns, at most once per invocation.
    pub fn report_overlap(&mut self, log: &mut MessageLog) {
        if self.policy == ConcurrencyPolicy::Default && !self.warned && self.overlapped() {
            log.warning(MessageSource::Concurrency, None, PARALLEL_RUN_WARNING);
            self.warned = true;
        }
    }
}

impl Drop for CompetitionGuard {
    fn drop(&mut self) {
        if let Some(activity) = &self.activity {
            let _ = fs::remove_file(&activity.path);
        }

        let registry = Registry::global();
        registry.lock().remove(&self.token);
        registry.released.notify_all();
        tracing::debug!("Competition '{}' released", self.id);
    }
}

/// Number of competitions currently holding a slot in this process
pub fn active_competitions() -> usize {
    Registry::global().lock().len()
}

/// Enter the slot of `competition_id` under `policy`
///
/// Returns `None` when the run must be skipped; the reason is logged.
pub fn enter_competition(
    competition_id: &str,
    policy: ConcurrencyPolicy,
    lock_dir: &Path,
    log: &mut MessageLog,
) -> Option<CompetitionGuard> {
    let registry = Registry::global();
    let token = registry.next_token.fetch_add(1, Ordering::Relaxed);

    {
        let mut slots = registry.lock();
        match policy {
            ConcurrencyPolicy::Lock => {
                while holds(&slots, competition_id) {
                    tracing::debug!("Waiting for competition '{}' to finish", competition_id);
                    slots = registry
                        .released
                        .wait(slots)
                        .unwrap_or_else(|e| e.into_inner());
                }
            }
            ConcurrencyPolicy::Fail if holds(&slots, competition_id) => {
                skip(log);
                return None;
            }
            _ => {}
        }
        slots.insert(
            token,
            Slot {
                competition_id: competition_id.to_string(),
                overlapped: false,
            },
        );
    }

    let mut guard = CompetitionGuard {
        token,
        id: competition_id.to_string(),
        policy,
        lock_dir: lock_dir.to_path_buf(),
        warned: false,
        activity: None,
        _lock: None,
    };

    if policy != ConcurrencyPolicy::Default {
        let wait = policy == ConcurrencyPolicy::Lock;
        match acquire_competition_lock(lock_dir, competition_id, wait) {
            Ok(Some(file)) => guard._lock = Some(file),
            Ok(None) => {
                skip(log);
                return None;
            }
            Err(e) => log.warning(
                MessageSource::Concurrency,
                None,
                format!(
                    "Could not lock competition '{}' in {}: {}; only runs in this process are coordinated.",
                    competition_id,
                    lock_dir.display(),
                    e
                ),
            ),
        }
    }

    match ActivityFile::register(lock_dir, competition_id, token) {
        Ok(activity) => guard.activity = Some(activity),
        Err(e) => tracing::warn!(
            "Could not register competition '{}' in {}: {}",
            competition_id,
            lock_dir.display(),
            e
        ),
    }

    let in_process = {
        let mut slots = registry.lock();
        let mut any = false;
        for (_, slot) in slots.iter_mut().filter(|(t, _)| **t != token) {
            slot.overlapped = true;
            any = true;
        }
        if let Some(own) = slots.get_mut(&token) {
            own.overlapped |= any;
        }
        any
    };
    let own = guard.activity.as_ref().map(|a| a.path.as_path());
    if policy == ConcurrencyPolicy::Default && (in_process || other_activity(lock_dir, own)) {
        log.warning(MessageSource::Concurrency, None, PARALLEL_RUN_WARNING);
        guard.warned = true;
    }

    Some(guard)
}

fn skip(log: &mut MessageLog) {
    log.setup_error(
        MessageSource::Concurrency,
        None,
        PARALLEL_RUN_SKIPPED,
        Some("Use the Lock concurrency policy to queue parallel runs.".to_string()),
    );
}
