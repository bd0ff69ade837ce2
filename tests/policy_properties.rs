//! Property tests for policy evaluation.
//!
//! All evaluations run fail-open against an offline enforcer so that every
//! case produces a Decision; bundle verification then always lands on
//! `bundle_verification_unavailable`, which keeps it a denial.

mod common;

use proptest::prelude::*;
use serde_json::json;

use model_signature::{Decision, MAX_TOKEN_LIFETIME_SECS, PolicyConfig, PolicyEnforcer};

const ISSUED: i64 = 1_700_000_000;
const PROVIDERS: [&str; 3] = ["prov_openai", "prov_anthropic", "prov_local"];

#[derive(Debug, Clone)]
struct TokenShape {
    provider: usize,
    has_deployment: bool,
    has_digest: bool,
    lifetime: i64,
}

fn token_shape() -> impl Strategy<Value = TokenShape> {
    (0..PROVIDERS.len(), any::<bool>(), any::<bool>(), 1i64..=1_800).prop_map(
        |(provider, has_deployment, has_digest, lifetime)| TokenShape {
            provider,
            has_deployment,
            has_digest,
            lifetime,
        },
    )
}

fn policy_strategy() -> impl Strategy<Value = PolicyConfig> {
    (
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        prop::collection::btree_set(0..PROVIDERS.len(), 0..=2),
        0u64..=2_000,
    )
        .prop_map(|(dep, digest, bundle, providers, max_age)| PolicyConfig {
            require_deployment_id: dep,
            require_model_digest: digest,
            require_bundle_verification: bundle,
            fail_closed: false,
            ..PolicyConfig::default()
        }
        .with_allowed_providers(providers.into_iter().map(|i| PROVIDERS[i]))
        .with_max_token_age(max_age))
}

// Any i64, weighted toward the ends of the range and zero.
fn timestamp() -> impl Strategy<Value = i64> {
    prop_oneof![
        any::<i64>(),
        Just(i64::MIN),
        Just(i64::MIN + 1),
        Just(i64::MAX),
        Just(i64::MAX - 1),
        -2i64..=2,
        ISSUED - 10_000..ISSUED + 10_000,
    ]
}

fn validity_window() -> impl Strategy<Value = (i64, i64)> {
    (timestamp(), timestamp()).prop_filter_map("exp must differ from iat", |(a, b)| {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some((a, b)),
            std::cmp::Ordering::Greater => Some((b, a)),
            std::cmp::Ordering::Equal => None,
        }
    })
}

fn mint(shape: &TokenShape) -> String {
    mint_window(shape, ISSUED, ISSUED + shape.lifetime)
}

fn mint_window(shape: &TokenShape, iat: i64, exp: i64) -> String {
    let mut payload = json!({
        "model_id": "model_x",
        "provider_id": PROVIDERS[shape.provider],
        "user_fp": "fp",
        "iat": iat,
        "exp": exp,
        "jti": "tok_prop",
    });
    if shape.has_deployment {
        payload["deployment_id"] = json!("dep_1");
    }
    if shape.has_digest {
        payload["model_digest"] = json!(common::DIGEST);
    }
    common::mint(&payload)
}

fn evaluate(policy: &PolicyConfig, token: &str, now: i64) -> Decision {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    rt.block_on(PolicyEnforcer::offline().enforce_at(policy, token, now))
        .expect("fail-open evaluation always yields a decision")
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        ..ProptestConfig::default()
    })]

    #[test]
    fn expired_tokens_always_report_expired(
        shape in token_shape(),
        policy in policy_strategy(),
        past_expiry in 0i64..10_000,
    ) {
        let token = mint(&shape);
        let decision = evaluate(&policy, &token, ISSUED + shape.lifetime + past_expiry);

        prop_assert!(!decision.allowed());
        prop_assert!(decision.has_reason("expired"));
    }

    #[test]
    fn empty_allow_list_never_rejects_a_provider(
        shape in token_shape(),
        policy in policy_strategy(),
        elapsed in -60i64..3_000,
    ) {
        let policy = PolicyConfig { allowed_providers: Default::default(), ..policy };
        let decision = evaluate(&policy, &mint(&shape), ISSUED + elapsed);

        prop_assert!(!decision.has_reason("provider_not_allowed"));
    }

    #[test]
    fn evaluation_is_idempotent(
        shape in token_shape(),
        policy in policy_strategy(),
        elapsed in -60i64..3_000,
    ) {
        let token = mint(&shape);
        let first = evaluate(&policy, &token, ISSUED + elapsed);
        let second = evaluate(&policy, &token, ISSUED + elapsed);

        prop_assert_eq!(first, second);
    }

    #[test]
    fn adding_a_requirement_never_allows_more(
        shape in token_shape(),
        policy in policy_strategy(),
        flag in 0usize..3,
        elapsed in -60i64..3_000,
    ) {
        let token = mint(&shape);
        let now = ISSUED + elapsed;

        let mut stricter = policy.clone();
        match flag {
            0 => stricter.require_deployment_id = true,
            1 => stricter.require_model_digest = true,
            _ => stricter.require_bundle_verification = true,
        }

        let base = evaluate(&policy, &token, now);
        let strict = evaluate(&stricter, &token, now);

        if !base.allowed() {
            prop_assert!(!strict.allowed());
        }
        for code in base.reason_codes() {
            prop_assert!(strict.has_reason(code), "{} dropped", code);
        }
    }

    #[test]
    fn arbitrary_timestamps_never_slip_through(
        shape in token_shape(),
        policy in policy_strategy(),
        (iat, exp) in validity_window(),
        now in timestamp(),
    ) {
        let decision = evaluate(&policy, &mint_window(&shape, iat, exp), now);

        let lifetime = exp.abs_diff(iat);
        if lifetime > MAX_TOKEN_LIFETIME_SECS {
            prop_assert!(!decision.allowed());
            prop_assert!(decision.has_reason("excessive_lifetime"));
        }
        if now >= exp {
            prop_assert!(decision.has_reason("expired"));
        }
        if now > iat && now.abs_diff(iat) > policy.max_token_age {
            prop_assert!(decision.has_reason("exceeds_max_age"));
        }
        prop_assert_eq!(decision.allowed(), decision.reasons().is_empty());
    }

    #[test]
    fn denial_always_carries_a_reason(
        shape in token_shape(),
        policy in policy_strategy(),
        elapsed in -60i64..3_000,
    ) {
        let decision = evaluate(&policy, &mint(&shape), ISSUED + elapsed);
        prop_assert_eq!(decision.allowed(), decision.reasons().is_empty());
    }
}
