//! Schedule parsing and the lead-time policy

use super::{HandlerEnv, HandlerError, HandlerResult, StateHandler};
use crate::config::EngineConfig;
use crate::state_machine::{Context, ContextUpdate, Input, Schedule, Transition, WorkflowState};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Utc};

const EXPLICIT_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Hour of day (UTC) used for "tomorrow" and "next week"
const MORNING_HOUR: u32 = 9;

/// Turn a schedule reply into a [`Schedule`], enforcing the lead-time policy.
///
/// The error is the message shown to the user.
pub fn resolve_schedule(
    token: &str,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Result<Schedule, String> {
    let time = match token {
        "now" | "post now" => return Ok(Schedule::Immediate),
        "later" | "later today" => now + Duration::hours(3),
        "tomorrow" => morning(now, 1),
        "next week" => morning(now, 7),
        explicit => NaiveDateTime::parse_from_str(explicit, EXPLICIT_FORMAT)
            .map_err(|_| {
                "I couldn't read that time. Use YYYY-MM-DD HH:MM (UTC), e.g. 2026-05-01 18:30."
                    .to_string()
            })?
            .and_utc(),
    };

    if time <= now {
        return Err("That time is in the past. Please choose a future time.".into());
    }
    if time - now < config.min_lead_time {
        return Err(format!(
            "Please schedule at least {} minutes ahead.",
            config.min_lead_time.num_minutes()
        ));
    }
    if time - now > config.max_schedule_horizon {
        return Err(format!(
            "Posts can be scheduled at most {} days ahead.",
            config.max_schedule_horizon.num_days()
        ));
    }
    Ok(Schedule::At { time })
}

fn morning(now: DateTime<Utc>, days_ahead: i64) -> DateTime<Utc> {
    let day = now.date_naive() + Duration::days(days_ahead);
    let nine = NaiveTime::from_hms_opt(MORNING_HOUR, 0, 0).unwrap_or(NaiveTime::MIN);
    day.and_time(nine).and_utc()
}

pub struct ScheduleHandler;

#[async_trait]
impl StateHandler for ScheduleHandler {
    fn state(&self) -> WorkflowState {
        WorkflowState::ScheduleSelection
    }

    async fn handle(&self, _ctx: &Context, input: &Input, env: &HandlerEnv) -> HandlerResult {
        let Some(token) = input.token() else {
            return Err(HandlerError::Unrecognized);
        };
        let schedule =
            resolve_schedule(token, env.clock.now(), &env.config).map_err(HandlerError::Validation)?;

        Ok(Transition::to(WorkflowState::Confirmation)
            .with_update(ContextUpdate::SetSchedule(schedule)))
    }
}
