//! Grant scheduler - Wakes each user's grant when their `next_grant_at` passes
//!
//! All users share one min-heap of `(due, user)` entries drained by a single
//! loop task. Re-arming a user does not search the heap: the new entry is
//! pushed and the user's current due time is recorded in `armed`, so older
//! entries for the same user are skipped when they surface.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info, warn};

use crate::application::ports::outbound::{
    GrantOutcome, GrantSchedulerPort, InventoryStorePort, StoreError,
};
use crate::application::services::GrantService;
use crate::domain::value_objects::UserId;

#[derive(Debug, Default)]
struct ScheduleQueue {
    heap: BinaryHeap<Reverse<(DateTime<Utc>, UserId)>>,
    armed: HashMap<UserId, DateTime<Utc>>,
}

impl ScheduleQueue {
    /// Returns true if `due` is now the earliest entry
    fn arm(&mut self, user: UserId, due: DateTime<Utc>) -> bool {
        let earliest = self.next_due().map_or(true, |next| due < next);
        self.armed.insert(user, due);
        self.heap.push(Reverse((due, user)));
        earliest
    }

    fn cancel(&mut self, user: UserId) -> bool {
        self.armed.remove(&user).is_some()
    }

    fn is_live(&self, due: DateTime<Utc>, user: UserId) -> bool {
        self.armed.get(&user) == Some(&due)
    }

    /// Earliest live due time, discarding superseded entries on the way
    fn next_due(&mut self) -> Option<DateTime<Utc>> {
        while let Some(Reverse((due, user))) = self.heap.peek().copied() {
            if self.is_live(due, user) {
                return Some(due);
            }
            self.heap.pop();
        }
        None
    }

    /// Remove and return every user due at or before `now`, earliest first
    fn take_due(&mut self, now: DateTime<Utc>) -> Vec<UserId> {
        let mut due_users = Vec::new();
        while let Some(Reverse((due, user))) = self.heap.peek().copied() {
            if due > now {
                break;
            }
            self.heap.pop();
            if self.is_live(due, user) {
                self.armed.remove(&user);
                due_users.push(user);
            }
        }
        due_users
    }
}

pub struct GrantScheduler {
    grants: Arc<GrantService>,
    store: Arc<dyn InventoryStorePort>,
    retry_delay: chrono::Duration,
    queue: Mutex<ScheduleQueue>,
    wakeup: Notify,
}

impl GrantScheduler {
    pub fn new(
        grants: Arc<GrantService>,
        store: Arc<dyn InventoryStorePort>,
        retry_delay: chrono::Duration,
    ) -> Self {
        Self {
            grants,
            store,
            retry_delay,
            queue: Mutex::new(ScheduleQueue::default()),
            wakeup: Notify::new(),
        }
    }

    /// Arm every stored user at their persisted `next_grant_at`.
    /// Called once at startup; returns how many users were armed.
    pub async fn arm_all(&self) -> Result<usize, StoreError> {
        let mut count = 0;
        for id in self.store.list_user_ids().await? {
            if let Some(user) = self.store.get_user(id).await? {
                self.arm(user.id, user.next_grant_at).await;
                count += 1;
            }
        }
        info!(users = count, "Armed grant schedule");
        Ok(count)
    }

    /// Due time currently armed for `user`, if any
    pub async fn due_for(&self, user: UserId) -> Option<DateTime<Utc>> {
        self.queue.lock().await.armed.get(&user).copied()
    }

    /// Drive the schedule forever. Due users are granted one at a time.
    pub async fn run(self: Arc<Self>) {
        info!("Starting grant scheduler");
        loop {
            let due_users = self.queue.lock().await.take_due(Utc::now());
            for user in due_users {
                self.fire(user).await;
            }

            let next = self.queue.lock().await.next_due();
            match next {
                Some(at) => {
                    let wait = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = self.wakeup.notified() => {}
                    }
                }
                None => self.wakeup.notified().await,
            }
        }
    }

    async fn fire(&self, user: UserId) {
        let err = match self.grants.grant_if_clear(user).await {
            Ok(GrantOutcome::Granted(batch)) => {
                debug!(user_id = %user, offers = batch.len(), "Scheduled grant fired");
                return;
            }
            Ok(GrantOutcome::AlreadyPending) => {
                debug!(user_id = %user, "Scheduled grant skipped, offers pending");
                return;
            }
            Err(err) => err,
        };

        match self.store.get_user(user).await {
            Ok(None) => {
                warn!(user_id = %user, error = %err, "Dropping grant for deleted user");
            }
            _ => {
                let retry_at = Utc::now() + self.retry_delay;
                error!(
                    user_id = %user,
                    error = %err,
                    retry_at = %retry_at,
                    "Grant failed, re-arming"
                );
                self.arm(user, retry_at).await;
            }
        }
    }
}

#[async_trait]
impl GrantSchedulerPort for GrantScheduler {
    async fn arm(&self, user: UserId, due: DateTime<Utc>) {
        let earliest = self.queue.lock().await.arm(user, due);
        if earliest {
            self.wakeup.notify_one();
        }
    }

    async fn cancel(&self, user: UserId) {
        if self.queue.lock().await.cancel(user) {
            debug!(user_id = %user, "Cancelled grant schedule");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::test_support::{add_user, seeded_store, small_policy};
    use crate::infrastructure::persistence::InMemoryInventoryStore;

    fn at(minutes: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(minutes * 60, 0).unwrap()
    }

    fn scheduler(store: Arc<dyn InventoryStorePort>) -> Arc<GrantScheduler> {
        let grants = Arc::new(GrantService::new(store.clone(), small_policy()));
        Arc::new(GrantScheduler::new(grants, store, chrono::Duration::seconds(30)))
    }

    #[test]
    fn test_queue_drains_in_due_order() {
        let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
        let mut queue = ScheduleQueue::default();
        queue.arm(a, at(30));
        queue.arm(b, at(10));
        queue.arm(c, at(20));

        assert_eq!(queue.take_due(at(25)), vec![b, c]);
        assert_eq!(queue.next_due(), Some(at(30)));
        assert_eq!(queue.take_due(at(30)), vec![a]);
        assert_eq!(queue.next_due(), None);
    }

    #[test]
    fn test_rearm_supersedes_previous_entry() {
        let user = UserId::new();
        let mut queue = ScheduleQueue::default();
        assert!(queue.arm(user, at(10)));
        assert!(!queue.arm(user, at(40)));

        assert!(queue.take_due(at(20)).is_empty());
        assert_eq!(queue.next_due(), Some(at(40)));
        assert_eq!(queue.take_due(at(40)), vec![user]);
    }

    #[test]
    fn test_cancel_skips_entry() {
        let (a, b) = (UserId::new(), UserId::new());
        let mut queue = ScheduleQueue::default();
        queue.arm(a, at(10));
        queue.arm(b, at(20));

        assert!(queue.cancel(a));
        assert!(!queue.cancel(a));
        assert_eq!(queue.next_due(), Some(at(20)));
        assert_eq!(queue.take_due(at(60)), vec![b]);
    }

    #[tokio::test]
    async fn test_past_due_user_is_granted() {
        let store: Arc<dyn InventoryStorePort> = seeded_store().await;
        let user = add_user(store.as_ref(), "ash").await;
        let scheduler = scheduler(store.clone());

        assert_eq!(scheduler.arm_all().await.unwrap(), 1);
        let handle = tokio::spawn(scheduler.clone().run());

        let granted = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let offers = store.pending_offers(user).await.unwrap();
                if !offers.is_empty() {
                    return offers;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        handle.abort();

        assert_eq!(granted.len(), 3);
        assert_eq!(scheduler.due_for(user).await, None);
    }

    #[tokio::test]
    async fn test_future_user_is_not_granted_early() {
        let store: Arc<dyn InventoryStorePort> = seeded_store().await;
        let user = add_user(store.as_ref(), "ash").await;
        let scheduler = scheduler(store.clone());
        let due = Utc::now() + chrono::Duration::minutes(25);

        scheduler.arm(user, due).await;
        let handle = tokio::spawn(scheduler.clone().run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert!(store.pending_offers(user).await.unwrap().is_empty());
        assert_eq!(scheduler.due_for(user).await, Some(due));
    }

    #[tokio::test]
    async fn test_cancelled_user_is_not_granted() {
        let store: Arc<dyn InventoryStorePort> = seeded_store().await;
        let user = add_user(store.as_ref(), "ash").await;
        let scheduler = scheduler(store.clone());

        scheduler.arm(user, Utc::now()).await;
        scheduler.cancel(user).await;
        assert!(scheduler.queue.lock().await.take_due(Utc::now()).is_empty());
        assert!(store.pending_offers(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_grant_is_rearmed() {
        // No catalog, so the grant fails on species lookup
        let store: Arc<dyn InventoryStorePort> = Arc::new(InMemoryInventoryStore::new());
        let user = add_user(store.as_ref(), "ash").await;
        let scheduler = scheduler(store.clone());
        let before = Utc::now();

        scheduler.fire(user).await;

        let retry_at = scheduler.due_for(user).await.unwrap();
        assert!(retry_at >= before + chrono::Duration::seconds(30));
    }

    #[tokio::test]
    async fn test_deleted_user_is_dropped() {
        let store: Arc<dyn InventoryStorePort> = seeded_store().await;
        let scheduler = scheduler(store);
        let ghost = UserId::new();

        scheduler.fire(ghost).await;

        assert_eq!(scheduler.due_for(ghost).await, None);
    }
}
