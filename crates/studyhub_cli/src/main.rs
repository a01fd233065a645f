//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `studyhub_core` linkage.
//! - Print a sample reminder plan so scheduling can be eyeballed locally.

use chrono::{Duration, Utc};
use studyhub_core::{plan_task_reminders, Task, UserPreferences};

fn main() {
    println!("studyhub_core ping={}", studyhub_core::ping());
    println!("studyhub_core version={}", studyhub_core::core_version());

    let now = Utc::now();
    let task = Task::new("Sample task", Some(now + Duration::hours(2))).with_reminders(&[60, 15]);
    let plan = plan_task_reminders(&task, &[], &UserPreferences::default(), now);
    for fire in &plan.fires {
        println!("studyhub_core fire stage={} at={}", fire.stage, fire.fire_at.to_rfc3339());
    }
}
