use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info};
use ulid::Ulid;

use crate::model::*;
use crate::observability;
use crate::wal::Wal;

use super::memory::InMemoryStore;
use super::{HolidayStore, ReservationStore, RuleStore, StoreError};

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

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the log. Appends that queue up while one flush is in progress are
/// written and fsynced together, and every sender in the batch gets the
/// batch's result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_command(&mut wal, cmd);
            continue;
        };

        let mut batch: Vec<PendingAppend> = vec![(event, response)];
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
        if let Some(cmd) = deferred {
            handle_command(&mut wal, cmd);
        }
    }
    debug!("WAL writer stopped");
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let mut result = Ok(());
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            result = Err(e);
            break;
        }
    }
    // Flush even after a failed append so half-buffered bytes do not leak
    // into the next batch.
    let flushed = wal.flush_sync();
    if result.is_ok() {
        result = flushed;
    }

    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_command(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => commit_batch(wal, &mut vec![(event, response)]),
    }
}

/// In-memory store whose every mutation is logged before it is acknowledged.
///
/// Opening replays the log into memory. Unique claims (rule names, slots)
/// are taken in memory first so racing writers are decided there, then logged;
/// a failed log write rolls the claim back.
///
/// Mutations hold `gate` shared from the memory change to the log ack;
/// compaction holds it exclusively, so its snapshot matches the log it replaces.
pub struct DurableStore {
    memory: InMemoryStore,
    wal_tx: mpsc::Sender<WalCommand>,
    gate: RwLock<()>,
    replayed: usize,
}

impl DurableStore {
    /// Replay `path` and start the writer task. Must be called inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let events = Wal::replay(path)?;
        let memory = InMemoryStore::new();
        for event in &events {
            memory.apply_event(event);
        }
        info!(path = %path.display(), events = events.len(), "replayed store log");

        let wal = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self {
            memory,
            wal_tx,
            gate: RwLock::new(()),
            replayed: events.len(),
        })
    }

    async fn wal_append(&self, event: Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { event, response: tx })
            .await
            .map_err(|_| StoreError::Log("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Log("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Log(e.to_string()))
    }

    /// Rewrite the log as the minimal event set for the current state.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _gate = self.gate.write().await;
        let events = self.memory.snapshot_events();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Log("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Log("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Log(e.to_string()))
    }

    /// Number of log records read when the store was opened.
    pub fn replayed_events(&self) -> usize {
        self.replayed
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl RuleStore for DurableStore {
    async fn list_rules(&self, category: Category) -> Result<Vec<TimeRule>, StoreError> {
        self.memory.list_rules(category).await
    }

    async fn create_rule(&self, rule: TimeRule) -> Result<(), StoreError> {
        let _gate = self.gate.read().await;
        self.memory.claim_rule(rule.clone())?;
        if let Err(e) = self.wal_append(Event::RuleCreated(rule.clone())).await {
            let _ = self.memory.remove_rule(rule.category, &rule.name);
            return Err(e);
        }
        Ok(())
    }

    async fn update_rule(&self, rule: TimeRule) -> Result<(), StoreError> {
        let _gate = self.gate.read().await;
        if !self.memory.contains_rule(rule.category, &rule.name) {
            return Err(StoreError::NotFound(format!("rule {}/{}", rule.category, rule.name)));
        }
        self.wal_append(Event::RuleUpdated(rule.clone())).await?;
        self.memory.replace_rule(rule)
    }

    async fn delete_rule(&self, category: Category, name: &str) -> Result<TimeRule, StoreError> {
        let _gate = self.gate.read().await;
        if !self.memory.contains_rule(category, name) {
            return Err(StoreError::NotFound(format!("rule {category}/{name}")));
        }
        self.wal_append(Event::RuleDeleted {
            category,
            name: name.to_string(),
        })
        .await?;
        self.memory.remove_rule(category, name)
    }
}

#[async_trait]
impl HolidayStore for DurableStore {
    async fn list_holidays(&self) -> Result<Vec<Holiday>, StoreError> {
        self.memory.list_holidays().await
    }

    async fn get_holiday(&self, date: NaiveDate) -> Result<Option<Holiday>, StoreError> {
        self.memory.get_holiday(date).await
    }

    async fn upsert_holiday(&self, holiday: Holiday) -> Result<(), StoreError> {
        let _gate = self.gate.read().await;
        self.wal_append(Event::HolidayUpserted(holiday.clone())).await?;
        self.memory.put_holiday(holiday);
        Ok(())
    }

    async fn get_cache_entry(
        &self,
        year: i32,
        region: &str,
    ) -> Result<Option<Arc<HolidayCacheEntry>>, StoreError> {
        self.memory.get_cache_entry(year, region).await
    }

    async fn replace_cache_entry(
        &self,
        entry: HolidayCacheEntry,
    ) -> Result<Arc<HolidayCacheEntry>, StoreError> {
        let _gate = self.gate.read().await;
        self.wal_append(Event::CacheEntryReplaced(entry.clone())).await?;
        Ok(self.memory.put_cache_entry(entry))
    }
}

#[async_trait]
impl ReservationStore for DurableStore {
    async fn insert_if_absent(&self, reservation: Reservation) -> Result<(), StoreError> {
        let _gate = self.gate.read().await;
        self.memory.claim_slot(reservation.clone())?;
        if let Err(e) = self
            .wal_append(Event::ReservationCreated(reservation.clone()))
            .await
        {
            self.memory.unclaim_slot(&reservation);
            return Err(e);
        }
        Ok(())
    }

    async fn get_reservation(&self, id: Ulid) -> Result<Option<Reservation>, StoreError> {
        self.memory.get_reservation(id).await
    }

    async fn update_reservation(
        &self,
        reservation: Reservation,
        expected: ReservationState,
    ) -> Result<(), StoreError> {
        let _gate = self.gate.read().await;
        let previous = self.memory.put_reservation(reservation.clone(), expected)?;
        if let Err(e) = self
            .wal_append(Event::ReservationUpdated(reservation))
            .await
        {
            self.memory.restore_reservation(previous);
            return Err(e);
        }
        Ok(())
    }

    async fn reservations_for(
        &self,
        resource_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, StoreError> {
        self.memory.reservations_for(resource_id, date).await
    }
}
