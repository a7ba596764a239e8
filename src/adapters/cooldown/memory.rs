//! In-memory cooldown ledger
//!
//! Per-key serialization through the dashmap entry lock. Not durable.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::ports::cooldown::{within_window, CooldownError, CooldownStore};

#[derive(Debug)]
pub struct MemoryCooldownStore {
    entries: DashMap<String, DateTime<Utc>>,
    cooldown: Duration,
}

impl MemoryCooldownStore {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            cooldown,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CooldownStore for MemoryCooldownStore {
    fn cooldown(&self) -> Duration {
        self.cooldown
    }

    async fn is_active(&self, key: &str, now: DateTime<Utc>) -> Result<bool, CooldownError> {
        Ok(self
            .entries
            .get(key)
            .map(|last| within_window(*last, now, self.cooldown))
            .unwrap_or(false))
    }

    async fn try_fire(&self, key: &str, now: DateTime<Utc>) -> Result<bool, CooldownError> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if within_window(*entry.get(), now, self.cooldown) {
                    Ok(false)
                } else {
                    entry.insert(now);
                    Ok(true)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                Ok(true)
            }
        }
    }

    async fn last_alert_at(&self, key: &str) -> Result<Option<DateTime<Utc>>, CooldownError> {
        Ok(self.entries.get(key).map(|last| *last))
    }
}
