//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::*;
use crate::config::EngineConfig;
use crate::handlers::resolve_schedule;
use crate::snapshots::{ErrorId, FailureOrigin};
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeSet;

// ============================================================================
// Test Helpers
// ============================================================================

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 15, 30, 0).unwrap()
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_state() -> impl Strategy<Value = WorkflowState> {
    proptest::sample::select(WorkflowState::ALL.to_vec())
}

fn arb_content_type() -> impl Strategy<Value = ContentType> {
    proptest::sample::select(ContentType::ALL.to_vec())
}

fn arb_platforms() -> impl Strategy<Value = BTreeSet<Platform>> {
    proptest::sample::subsequence(Platform::ALL.to_vec(), 0..=3)
        .prop_map(|v| v.into_iter().collect())
}

fn arb_update() -> impl Strategy<Value = ContextUpdate> {
    prop_oneof![
        arb_content_type().prop_map(ContextUpdate::SetContentType),
        arb_platforms().prop_map(ContextUpdate::SetPlatforms),
        "[a-z ]{1,30}".prop_map(ContextUpdate::SetCaptionPrompt),
        "[A-Za-z ]{1,30}".prop_map(ContextUpdate::SetCandidate),
        Just(ContextUpdate::RejectCandidate),
        Just(ContextUpdate::ApproveCandidate),
        any::<bool>().prop_map(ContextUpdate::SetIncludeMedia),
        Just(ContextUpdate::ClearMedia),
        Just(ContextUpdate::SetSchedule(Schedule::Immediate)),
        Just(ContextUpdate::Reset),
    ]
}

fn arb_origin() -> impl Strategy<Value = FailureOrigin> {
    prop_oneof![
        Just(FailureOrigin::Generation),
        Just(FailureOrigin::Media),
        Just(FailureOrigin::Publishing),
        Just(FailureOrigin::Concurrency),
        Just(FailureOrigin::Engine),
    ]
}

// ============================================================================
// Context Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_rejected_history_is_bounded(updates in proptest::collection::vec(arb_update(), 0..60)) {
        let mut ctx = Context::new(now());
        for update in updates {
            ctx.apply(update);
            prop_assert!(ctx.rejected_captions.len() <= MAX_REJECTED_CAPTIONS);
        }
    }

    #[test]
    fn prop_advanced_keeps_revision_and_sets_state(
        state in arb_state(),
        revision in 0u64..1000,
        updates in proptest::collection::vec(arb_update(), 0..10),
    ) {
        let mut ctx = Context::new(now());
        ctx.revision = revision;
        let later = now() + Duration::minutes(5);
        let next = ctx.advanced(state, updates, later);
        prop_assert_eq!(next.revision, revision);
        prop_assert_eq!(next.state, state);
        prop_assert_eq!(next.updated_at, later);
    }

    #[test]
    fn prop_reset_clears_collected_fields(updates in proptest::collection::vec(arb_update(), 0..20)) {
        let mut ctx = Context::new(now());
        ctx.state = WorkflowState::Confirmation;
        ctx.revision = 7;
        for update in updates {
            ctx.apply(update);
        }
        ctx.apply(ContextUpdate::Reset);
        prop_assert_eq!(ctx.state, WorkflowState::Confirmation);
        prop_assert_eq!(ctx.revision, 7);
        prop_assert!(ctx.content_type.is_none());
        prop_assert!(ctx.platforms.is_empty());
        prop_assert!(ctx.approved_caption.is_none());
        prop_assert!(ctx.rejected_captions.is_empty());
    }

    #[test]
    fn prop_fresh_context_schema_only_in_opening_states(state in arb_state()) {
        let mut ctx = Context::new(now());
        ctx.state = state;
        let opening = matches!(
            state,
            WorkflowState::Init | WorkflowState::ContentTypeSelection | WorkflowState::Cancelled
        );
        prop_assert_eq!(ctx.check_schema().is_ok(), opening);
    }
}

// ============================================================================
// Input Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_normalized_text_is_canonical(raw in "[ \\ta-zA-Z0-9,]{0,40}") {
        let Input::Text { raw: kept, normalized } = Input::text(raw.clone()) else {
            unreachable!()
        };
        prop_assert_eq!(kept, raw);
        prop_assert_eq!(normalized.trim(), normalized.as_str());
        prop_assert!(!normalized.contains("  "));
        prop_assert!(!normalized.contains('\t'));
        prop_assert_eq!(normalized.to_lowercase(), normalized.clone());

        let again = Input::text(normalized.clone());
        prop_assert_eq!(again.token(), Some(normalized.as_str()));
    }

    #[test]
    fn prop_yes_and_no_are_exclusive(raw in "[ yYnNeEsSoO]{0,6}") {
        let input = Input::text(raw);
        prop_assert!(!(input.is_affirmative() && input.is_negative()));
    }
}

// ============================================================================
// Schedule Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_explicit_schedule_respects_lead_and_horizon(offset in -600i64..200_000) {
        let config = EngineConfig::default();
        let target = now() + Duration::minutes(offset);
        let reply = target.format("%Y-%m-%d %H:%M").to_string();

        let result = resolve_schedule(&reply, now(), &config);
        let allowed = offset >= config.min_lead_time.num_minutes()
            && Duration::minutes(offset) <= config.max_schedule_horizon;
        prop_assert_eq!(result.is_ok(), allowed, "offset {} gave {:?}", offset, result);
        if let Ok(schedule) = result {
            prop_assert_eq!(schedule, Schedule::At { time: target });
        }
    }
}

// ============================================================================
// Error Id Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_generated_ids_parse_back(origin in arb_origin(), seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let id = ErrorId::generate(origin, &mut rng);

        prop_assert_eq!(id.origin(), Some(origin));
        let parsed = ErrorId::parse(id.as_str());
        prop_assert_eq!(parsed.as_ref(), Some(&id));
        let lowered = format!("  {}  ", id.as_str().to_lowercase());
        prop_assert_eq!(ErrorId::parse(&lowered), Some(id));
    }
}
