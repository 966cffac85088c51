//! Hands out pending local changes to the uploader

use std::collections::{HashMap, HashSet, VecDeque};

use crate::config::FetchMode;
use crate::error::Result;
use crate::models::{ResourceKey, SquashedLocalChange};
use crate::services::FhirStore;

/// Upload progress as seen by the fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
    pub remaining: usize,
    pub initial_total: usize,
}

impl FetchProgress {
    pub const fn completed(&self) -> usize {
        self.initial_total.saturating_sub(self.remaining)
    }
}

/// Work the fetcher has not handed out yet.
#[derive(Debug)]
enum Pending {
    /// A resource whose changes go up squashed
    Resource(ResourceKey),
    /// One log row that goes up on its own
    Change { id: i64, key: ResourceKey },
}

impl Pending {
    const fn key(&self) -> &ResourceKey {
        match self {
            Self::Resource(key) | Self::Change { key, .. } => key,
        }
    }
}

/// Hands out the pending changes of one sync pass.
///
/// The upload order is computed once per pass, when the log is squashed and
/// ordered by references. Later calls only compare the queue with the row ids
/// still in the log: rows deleted meanwhile drop out at once and changes
/// recorded mid-pass join the end of the queue. Each entry is re-read from the
/// log when it is handed out, so edits made by earlier uploads (a
/// server-assigned id rewriting references, a conflict discarding changes)
/// are reflected.
///
/// Rows already handed out, and resources passed to [`skip`](Self::skip), are
/// excluded for the lifetime of this fetcher.
pub struct LocalChangeFetcher {
    store: FhirStore,
    mode: FetchMode,
    initial_total: usize,
    queue: Option<VecDeque<Pending>>,
    handed_out: HashSet<i64>,
    skipped: HashSet<ResourceKey>,
}

impl LocalChangeFetcher {
    pub fn new(store: FhirStore, mode: FetchMode) -> Self {
        Self {
            store,
            mode,
            initial_total: 0,
            queue: None,
            handed_out: HashSet::new(),
            skipped: HashSet::new(),
        }
    }

    /// Snapshot the pass's upload order and return its size.
    pub async fn init_total_count(&mut self) -> Result<usize> {
        let queue: VecDeque<Pending> = match self.mode {
            FetchMode::PerChange => self
                .store
                .local_change_keys()
                .await?
                .into_iter()
                .map(|(id, key)| Pending::Change { id, key })
                .collect(),
            FetchMode::PerResource | FetchMode::PerBatch { .. } => self
                .store
                .squashed_local_changes()
                .await?
                .iter()
                .map(|change| Pending::Resource(change.key()))
                .collect(),
        };
        self.queue = Some(queue);
        self.refresh().await?;
        self.initial_total = self.queue.as_ref().map_or(0, VecDeque::len);
        tracing::debug!("{} pending upload(s) in this pass", self.initial_total);
        Ok(self.initial_total)
    }

    pub async fn has_next(&mut self) -> Result<bool> {
        Ok(self.remaining().await? > 0)
    }

    /// Next changes in upload order: one for `PerResource` and `PerChange`,
    /// up to `size` for `PerBatch`.
    pub async fn next(&mut self) -> Result<Vec<SquashedLocalChange>> {
        let limit = match self.mode {
            FetchMode::PerResource | FetchMode::PerChange => 1,
            FetchMode::PerBatch { size } => size.max(1),
        };
        self.remaining().await?;

        let mut batch = Vec::new();
        while batch.len() < limit {
            let Some(pending) = self.queue.as_mut().and_then(VecDeque::pop_front) else {
                break;
            };
            let change = match pending {
                Pending::Resource(key) => self.store.squashed_local_change(&key).await?,
                Pending::Change { id, .. } => self
                    .store
                    .local_change(id)
                    .await?
                    .map(SquashedLocalChange::from),
            };
            if let Some(change) = change {
                self.handed_out.extend(change.token.ids().iter().copied());
                batch.push(change);
            }
        }
        Ok(batch)
    }

    pub async fn progress(&mut self) -> Result<FetchProgress> {
        let remaining = self.remaining().await?;
        Ok(FetchProgress {
            remaining,
            initial_total: self.initial_total.max(remaining),
        })
    }

    /// Exclude a resource whose upload failed from the rest of this pass.
    pub fn skip(&mut self, change: &SquashedLocalChange) {
        tracing::debug!("Skipping {} for the rest of this pass", change.key());
        self.skipped.insert(change.key());
    }

    async fn remaining(&mut self) -> Result<usize> {
        if self.queue.is_none() {
            return self.init_total_count().await;
        }
        self.refresh().await?;
        Ok(self.queue.as_ref().map_or(0, VecDeque::len))
    }

    /// Align the queue with the rows still waiting in the log.
    async fn refresh(&mut self) -> Result<()> {
        let live: Vec<(i64, ResourceKey)> = self
            .store
            .local_change_keys()
            .await?
            .into_iter()
            .filter(|(id, key)| !self.handed_out.contains(id) && !self.skipped.contains(key))
            .collect();
        let Some(queue) = self.queue.as_mut() else {
            return Ok(());
        };

        match self.mode {
            FetchMode::PerChange => {
                let keys: HashMap<i64, ResourceKey> = live.iter().cloned().collect();
                // a server-assigned id may have renamed the row's resource
                queue.retain_mut(|pending| match pending {
                    Pending::Change { id, key } => match keys.get(id) {
                        Some(live_key) => {
                            key.clone_from(live_key);
                            true
                        }
                        None => false,
                    },
                    Pending::Resource(_) => false,
                });
                let queued: HashSet<i64> = queue
                    .iter()
                    .filter_map(|pending| match pending {
                        Pending::Change { id, .. } => Some(*id),
                        Pending::Resource(_) => None,
                    })
                    .collect();
                queue.extend(
                    live.into_iter()
                        .filter(|(id, _)| !queued.contains(id))
                        .map(|(id, key)| Pending::Change { id, key }),
                );
            }
            FetchMode::PerResource | FetchMode::PerBatch { .. } => {
                let keys: HashSet<&ResourceKey> = live.iter().map(|(_, key)| key).collect();
                queue.retain(|pending| keys.contains(pending.key()));
                let mut queued: HashSet<ResourceKey> =
                    queue.iter().map(|pending| pending.key().clone()).collect();
                for (_, key) in &live {
                    if queued.insert(key.clone()) {
                        queue.push_back(Pending::Resource(key.clone()));
                    }
                }
            }
        }
        Ok(())
    }
}
