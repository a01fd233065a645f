//! Digest batching across tasks.
//!
//! Fires within one batch window of the first fire in a group are delivered
//! together at the latest member's time, so no member fires early. A group
//! never grows past the earliest series end of its members.

use crate::model::notification::NotificationId;
use crate::scheduler::plan::PlannedFire;
use chrono::{DateTime, Duration, Utc};

/// What the scheduler hands to the bridge after batching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchedDelivery {
    Single(PlannedFire),
    Digest {
        fire_at: DateTime<Utc>,
        members: Vec<PlannedFire>,
    },
}

impl BatchedDelivery {
    pub fn fire_at(&self) -> DateTime<Utc> {
        match self {
            Self::Single(fire) => fire.fire_at,
            Self::Digest { fire_at, .. } => *fire_at,
        }
    }

    pub fn notification_id(&self) -> NotificationId {
        match self {
            Self::Single(fire) => fire.notification_id(),
            Self::Digest { fire_at, members } => {
                let ids = members
                    .iter()
                    .map(PlannedFire::notification_id)
                    .collect::<Vec<_>>();
                NotificationId::for_digest(*fire_at, &ids)
            }
        }
    }

    pub fn members(&self) -> &[PlannedFire] {
        match self {
            Self::Single(fire) => std::slice::from_ref(fire),
            Self::Digest { members, .. } => members,
        }
    }
}

/// Groups `fires` into deliveries. A zero window disables batching.
pub fn batch_fires(mut fires: Vec<PlannedFire>, window: Duration) -> Vec<BatchedDelivery> {
    fires.sort_by(|a, b| {
        a.fire_at
            .cmp(&b.fire_at)
            .then_with(|| a.task_id.cmp(&b.task_id))
    });
    if window <= Duration::zero() {
        return fires.into_iter().map(BatchedDelivery::Single).collect();
    }

    let mut deliveries = Vec::new();
    let mut group: Vec<PlannedFire> = Vec::new();
    let mut group_start: Option<DateTime<Utc>> = None;
    let mut group_limit: Option<DateTime<Utc>> = None;

    for fire in fires {
        let fits = match group_start {
            Some(start) => {
                start.checked_add_signed(window).map_or(true, |end| fire.fire_at < end)
                    && group_limit.map_or(true, |limit| fire.fire_at <= limit)
            }
            None => false,
        };
        if !fits && !group.is_empty() {
            deliveries.push(close_group(std::mem::take(&mut group)));
        }
        if group.is_empty() {
            group_start = Some(fire.fire_at);
            group_limit = None;
        }
        group_limit = match (group_limit, fire.not_after) {
            (Some(limit), Some(end)) => Some(limit.min(end)),
            (limit, end) => limit.or(end),
        };
        group.push(fire);
    }
    if !group.is_empty() {
        deliveries.push(close_group(group));
    }
    deliveries
}

fn close_group(mut group: Vec<PlannedFire>) -> BatchedDelivery {
    if group.len() == 1 {
        if let Some(fire) = group.pop() {
            return BatchedDelivery::Single(fire);
        }
    }
    let fire_at = group
        .iter()
        .map(|fire| fire.fire_at)
        .max()
        .unwrap_or_else(Utc::now);
    BatchedDelivery::Digest {
        fire_at,
        members: group,
    }
}
