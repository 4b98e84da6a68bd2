use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, mpsc, oneshot};
use tracing::{debug, warn};
use ulid::Ulid;

use super::{AuditSink, BookingFilter, BookingStore, LockedBooking, StoreError};
use crate::lifecycle::BookingStatus;
use crate::model::{ActorType, AuditEntry, Booking, Event, NewAuditEntry, NewBooking, Page, TimeRange};
use crate::observability;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type Pending = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Blocks for the first append, drains whatever else is already
/// queued, then commits the whole batch with a single fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<Pending>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[Pending]) -> io::Result<()> {
    let mut append_err = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after a failed append so a partial record never leaks into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

// ── Per-court slot index ─────────────────────────────────

/// Booking ranges on one court, sorted by start.
#[derive(Debug, Default)]
struct SlotIndex {
    entries: Vec<(TimeRange, Ulid)>,
}

impl SlotIndex {
    fn insert(&mut self, range: TimeRange, id: Ulid) {
        let pos = self.entries.partition_point(|(r, _)| r.start() <= range.start());
        self.entries.insert(pos, (range, id));
    }

    /// Ids whose range overlaps `query`. Only the prefix starting before
    /// `query.end` is scanned.
    fn overlapping(&self, query: &TimeRange) -> impl Iterator<Item = Ulid> + '_ {
        let q = *query;
        let end = self.entries.partition_point(|(r, _)| r.start() < q.end());
        self.entries[..end]
            .iter()
            .filter(move |(r, _)| r.end() > q.start())
            .map(|(_, id)| *id)
    }
}

// ── Store ────────────────────────────────────────────────

struct Inner {
    rows: DashMap<Ulid, Booking>,
    row_locks: DashMap<Ulid, Arc<Mutex<()>>>,
    by_court: DashMap<Ulid, SlotIndex>,
    audit: DashMap<Ulid, Vec<AuditEntry>>,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Appends hold it shared, compaction exclusive, so a snapshot never
    /// misses an event that is already in the journal.
    snapshot_gate: RwLock<()>,
}

/// WAL-backed booking and audit store.
///
/// Committed rows live in memory and are served without touching row locks.
/// Every mutation goes to the journal first and is applied only after the
/// group commit acknowledges it.
#[derive(Clone)]
pub struct WalStore {
    inner: Arc<Inner>,
}

impl WalStore {
    /// Replay `path` and start the background writer. Must run inside a tokio runtime.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let events = Wal::replay(path)?;
        let wal = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let inner = Inner {
            rows: DashMap::new(),
            row_locks: DashMap::new(),
            by_court: DashMap::new(),
            audit: DashMap::new(),
            wal_tx,
            snapshot_gate: RwLock::new(()),
        };
        for event in &events {
            inner.apply(event);
        }
        tracing::info!(
            path = %path.display(),
            events = events.len(),
            bookings = inner.rows.len(),
            "booking journal replayed"
        );
        Ok(Self { inner: Arc::new(inner) })
    }

    pub fn len(&self) -> usize {
        self.inner.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.rows.is_empty()
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .inner
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Rewrite the journal as one create per booking (at its current state)
    /// followed by every audit entry.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _gate = self.inner.snapshot_gate.write().await;

        let mut bookings: Vec<Booking> = self.inner.rows.iter().map(|r| r.value().clone()).collect();
        bookings.sort_by_key(|b| (b.created_at(), b.id()));
        let mut entries: Vec<AuditEntry> =
            self.inner.audit.iter().flat_map(|e| e.value().clone()).collect();
        entries.sort_by_key(|e| (e.created_at, e.id));

        let mut events: Vec<Event> = bookings
            .into_iter()
            .map(|booking| Event::BookingCreated { booking })
            .collect();
        events.extend(entries.into_iter().map(|entry| Event::AuditRecorded { entry }));

        let (tx, rx) = oneshot::channel();
        self.inner
            .wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Closed)?;
        rx.await.map_err(|_| StoreError::Closed)??;
        metrics::counter!(observability::WAL_COMPACTIONS_TOTAL).increment(1);
        Ok(())
    }

    async fn lock_row(&self, id: Ulid) -> OwnedMutexGuard<()> {
        let lock = self.inner.row_locks.entry(id).or_default().clone();
        lock.lock_owned().await
    }

    /// Shared by both batch sweeps: lock each candidate, re-check under the
    /// lock, then move it. Each move and its System audit entry go to the
    /// journal as one record.
    async fn sweep(
        &self,
        candidates: Vec<Ulid>,
        still_due: impl Fn(&Booking) -> bool,
        to: BookingStatus,
        note: &str,
    ) -> Result<Vec<Ulid>, StoreError> {
        let mut moved = Vec::with_capacity(candidates.len());
        for id in candidates {
            let _guard = self.lock_row(id).await;
            let Some(current) = self.inner.rows.get(&id).map(|r| r.value().clone()) else {
                continue;
            };
            if !still_due(&current) {
                debug!(booking_id = %id, status = %current.status(), "sweep skip: settled concurrently");
                continue;
            }
            let from = current.status();
            let mut next = current;
            next.transition(to, None, Utc::now())?;
            let entry = AuditEntry::from_new(
                Ulid::new(),
                NewAuditEntry {
                    booking_id: id,
                    from_status: Some(from),
                    to_status: to,
                    actor: ActorType::System,
                    actor_id: None,
                    note: Some(note.to_owned()),
                },
                next.updated_at(),
            );
            self.inner
                .persist_and_apply(Event::BookingTransitioned {
                    id,
                    to,
                    note: None,
                    at: next.updated_at(),
                    audit: Some(entry),
                })
                .await?;
            self.inner.forget_lock_if_settled(id);
            moved.push(id);
        }
        Ok(moved)
    }
}

impl Inner {
    fn apply(&self, event: &Event) {
        match event {
            Event::BookingCreated { booking } => {
                self.by_court
                    .entry(booking.court_id())
                    .or_default()
                    .insert(booking.range(), booking.id());
                self.rows.insert(booking.id(), booking.clone());
            }
            Event::BookingTransitioned { id, to, note, at, audit } => {
                {
                    let Some(mut row) = self.rows.get_mut(id) else {
                        warn!(booking_id = %id, "transition for unknown booking in journal");
                        return;
                    };
                    if let Err(e) = row.transition(*to, note.clone(), *at) {
                        warn!(booking_id = %id, "journal transition rejected: {e}");
                        return;
                    }
                }
                if let Some(entry) = audit {
                    self.audit.entry(entry.booking_id).or_default().push(entry.clone());
                }
            }
            Event::AuditRecorded { entry } => {
                self.audit.entry(entry.booking_id).or_default().push(entry.clone());
            }
        }
    }

    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { event: event.clone(), response: tx })
            .await
            .map_err(|_| StoreError::Closed)?;
        rx.await.map_err(|_| StoreError::Closed)??;
        Ok(())
    }

    async fn persist_and_apply(&self, event: Event) -> Result<(), StoreError> {
        let _gate = self.snapshot_gate.read().await;
        self.wal_append(&event).await?;
        self.apply(&event);
        Ok(())
    }

    /// Terminal rows never change again, so their lock entry can go.
    /// Waiters that already cloned the mutex still serialize on it.
    fn forget_lock_if_settled(&self, id: Ulid) {
        let settled = self.rows.get(&id).is_some_and(|r| r.status().is_terminal());
        if settled {
            self.row_locks.remove(&id);
        }
    }
}

struct LockedRow {
    inner: Arc<Inner>,
    booking: Booking,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl LockedBooking for LockedRow {
    fn booking(&self) -> &Booking {
        &self.booking
    }

    async fn update(&mut self, status: BookingStatus, note: Option<String>) -> Result<(), StoreError> {
        let mut next = self.booking.clone();
        next.transition(status, note.clone(), Utc::now())?;
        self.inner
            .persist_and_apply(Event::BookingTransitioned {
                id: next.id(),
                to: status,
                note,
                at: next.updated_at(),
                audit: None,
            })
            .await?;
        self.booking = next;
        Ok(())
    }
}

impl Drop for LockedRow {
    fn drop(&mut self) {
        if self.booking.status().is_terminal() {
            self.inner.forget_lock_if_settled(self.booking.id());
        }
    }
}

#[async_trait]
impl BookingStore for WalStore {
    async fn create(&self, new: NewBooking) -> Result<Booking, StoreError> {
        let booking = Booking::from_new(Ulid::new(), new, Utc::now());
        self.inner
            .persist_and_apply(Event::BookingCreated { booking: booking.clone() })
            .await?;
        Ok(booking)
    }

    async fn find_by_id(&self, id: Ulid) -> Result<Option<Booking>, StoreError> {
        Ok(self.inner.rows.get(&id).map(|r| r.value().clone()))
    }

    async fn find_by_id_for_update(&self, id: Ulid) -> Result<Option<Box<dyn LockedBooking>>, StoreError> {
        if !self.inner.rows.contains_key(&id) {
            return Ok(None);
        }
        let guard = self.lock_row(id).await;
        // Re-read under the lock: the previous holder may have just committed.
        let Some(booking) = self.inner.rows.get(&id).map(|r| r.value().clone()) else {
            return Ok(None);
        };
        Ok(Some(Box::new(LockedRow {
            inner: self.inner.clone(),
            booking,
            _guard: guard,
        })))
    }

    async fn find_overlapping(
        &self,
        court_id: Ulid,
        range: &TimeRange,
        statuses: &[BookingStatus],
        exclude: Option<Ulid>,
    ) -> Result<Vec<Booking>, StoreError> {
        let ids: Vec<Ulid> = match self.inner.by_court.get(&court_id) {
            Some(index) => index.overlapping(range).collect(),
            None => return Ok(Vec::new()),
        };
        Ok(ids
            .into_iter()
            .filter(|id| Some(*id) != exclude)
            .filter_map(|id| self.inner.rows.get(&id).map(|r| r.value().clone()))
            .filter(|b| statuses.contains(&b.status()))
            .collect())
    }

    async fn find_page(&self, filter: &BookingFilter) -> Result<Page<Booking>, StoreError> {
        let mut matched: Vec<Booking> = self
            .inner
            .rows
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        matched.sort_by(|a, b| (b.created_at(), b.id()).cmp(&(a.created_at(), a.id())));

        let page = filter.page.max(1);
        let size = filter.size.max(1);
        let total = matched.len();
        let items = matched.into_iter().skip((page - 1) * size).take(size).collect();
        Ok(Page { items, page, size, total })
    }

    async fn expire_all_past_holds(&self, now: DateTime<Utc>, note: &str) -> Result<Vec<Ulid>, StoreError> {
        let due = move |b: &Booking| {
            b.status() == BookingStatus::Hold && b.hold_expires_at().is_some_and(|exp| exp <= now)
        };
        let candidates: Vec<Ulid> =
            self.inner.rows.iter().filter(|r| due(r.value())).map(|r| *r.key()).collect();
        self.sweep(candidates, due, BookingStatus::Expired, note).await
    }

    async fn complete_all_finished(&self, now: DateTime<Utc>, note: &str) -> Result<Vec<Ulid>, StoreError> {
        let due = move |b: &Booking| b.can_complete(now);
        let candidates: Vec<Ulid> =
            self.inner.rows.iter().filter(|r| due(r.value())).map(|r| *r.key()).collect();
        self.sweep(candidates, due, BookingStatus::Completed, note).await
    }
}

#[async_trait]
impl AuditSink for WalStore {
    async fn record(&self, new: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        let entry = AuditEntry::from_new(Ulid::new(), new, Utc::now());
        self.inner
            .persist_and_apply(Event::AuditRecorded { entry: entry.clone() })
            .await?;
        Ok(entry)
    }

    async fn find_by_booking(&self, booking_id: Ulid) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self
            .inner
            .audit
            .get(&booking_id)
            .map(|e| e.value().clone())
            .unwrap_or_default())
    }
}
