use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::value_objects::UserId;

/// Schedules offer grants for users
#[async_trait]
pub trait GrantSchedulerPort: Send + Sync {
    /// Schedule the user's next grant at `due`, replacing any earlier
    /// schedule. A due time in the past fires immediately.
    async fn arm(&self, user: UserId, due: DateTime<Utc>);

    /// Drop the user's schedule, if any
    async fn cancel(&self, user: UserId);
}
