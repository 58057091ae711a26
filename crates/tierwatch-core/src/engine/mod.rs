//! The scheduling authority.
//!
//! `Engine` owns all mutable scheduler state and is shared as `Arc<Engine>` by
//! the search cycle, the queue cycle, and manual actions. Each entity has its
//! own lock:
//!
//! - the item map (`RwLock`), and each item behind its own `Mutex`;
//! - the rate budget, escalation manager, queue monitor, and group-search map.
//!
//! Lock order is item map -> item -> escalation (or group map). No lock is
//! held across an upstream call: state is claimed first (slot reserved, item
//! marked in flight), the call runs unlocked, and the outcome is recorded
//! afterwards.

mod actions;
mod queue_cycle;
mod search_cycle;
mod status;
mod sync;

pub use actions::ManualSearchOutcome;
pub use queue_cycle::QueueCycleReport;
pub use search_cycle::SearchCycleReport;
pub use status::{EngineStatus, TierCount};

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{Mutex, RwLock};

use crate::budget::RateBudget;
use crate::config::Settings;
use crate::cooldown::CooldownTracker;
use crate::escalation::EscalationManager;
use crate::model::{Item, ItemKey};
use crate::queue_monitor::{QueueMonitor, ResolvePolicy};
use crate::selector::Selector;
use crate::store::StateStore;
use crate::upstream::Upstream;

type ItemMap = HashMap<ItemKey, Arc<Mutex<Item>>>;

pub struct Engine {
    settings: Settings,
    cooldown: CooldownTracker,
    selector: Selector,
    store: StateStore,
    upstreams: HashMap<String, Arc<dyn Upstream>>,
    items: RwLock<ItemMap>,
    budget: Mutex<RateBudget>,
    escalation: Mutex<EscalationManager>,
    queue: Mutex<QueueMonitor>,
    /// Last group search per `(instance, group_id)`; cleared at daily rollover.
    groups: Mutex<HashMap<(String, i64), DateTime<Utc>>>,
    rng: Mutex<StdRng>,
}

impl Engine {
    /// Build the engine and restore persisted state from `store`.
    pub async fn load(
        settings: Settings,
        store: StateStore,
        upstreams: Vec<Arc<dyn Upstream>>,
        now: DateTime<Utc>,
    ) -> Result<Arc<Self>> {
        let mut by_name: HashMap<String, Arc<dyn Upstream>> = HashMap::new();
        for up in upstreams {
            let name = up.instance().to_string();
            if by_name.insert(name.clone(), up).is_some() {
                bail!("duplicate upstream instance {:?}", name);
            }
        }

        let items: ItemMap = store
            .load_items()
            .await?
            .into_iter()
            .map(|item| (item.key.clone(), Arc::new(Mutex::new(item))))
            .collect();

        let mut escalation = EscalationManager::new(settings.milestone_months.clone());
        escalation.restore(
            store.load_escalations().await?,
            store.load_interventions().await?,
        );

        let mut queue = QueueMonitor::new(ResolvePolicy {
            enabled: settings.auto_resolve_enabled,
            grace_period: settings.grace_period,
            disabled_kinds: settings.disabled_kinds.clone(),
        });
        queue.restore(store.load_issues().await?);

        let mut budget = match settings.utc_offset {
            Some(offset) => {
                RateBudget::with_offset(settings.daily_api_limit, settings.quiet_hours, offset, now)
            }
            None => RateBudget::new(settings.daily_api_limit, settings.quiet_hours, now),
        };
        if let Some((day, used)) = store.load_budget().await? {
            budget.restore(day, used, now);
        }

        let mut groups = HashMap::new();
        if settings.prefer_group_search {
            for (instance, group, at) in store
                .group_searches_since(now - settings.group_dedup_window)
                .await?
            {
                let slot = groups.entry((instance, group)).or_insert(at);
                if at > *slot {
                    *slot = at;
                }
            }
        }

        tracing::info!(
            "engine loaded: {} items, {} upstreams, preset {}, {} of {} calls used today",
            items.len(),
            by_name.len(),
            settings.pacing.name.as_str(),
            budget.used(),
            budget.ceiling()
        );

        Ok(Arc::new(Self {
            cooldown: CooldownTracker::new(settings.tiers, settings.pacing.clone()),
            selector: Selector::new(settings.distribution, settings.randomize_selection),
            settings,
            store,
            upstreams: by_name,
            items: RwLock::new(items),
            budget: Mutex::new(budget),
            escalation: Mutex::new(escalation),
            queue: Mutex::new(queue),
            groups: Mutex::new(groups),
            rng: Mutex::new(StdRng::from_entropy()),
        }))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Snapshot of one tracked item.
    pub async fn item(&self, key: &ItemKey) -> Option<Item> {
        let entry = self.items.read().await.get(key).cloned()?;
        let item = entry.lock().await;
        Some(item.clone())
    }

    async fn item_entry(&self, key: &ItemKey) -> Option<Arc<Mutex<Item>>> {
        self.items.read().await.get(key).cloned()
    }

    async fn all_entries(&self) -> Vec<Arc<Mutex<Item>>> {
        self.items.read().await.values().cloned().collect()
    }

    /// Persist today's budget usage.
    async fn save_budget(&self, budget: &RateBudget) -> Result<()> {
        self.store.save_budget(budget.day(), budget.used()).await
    }
}

