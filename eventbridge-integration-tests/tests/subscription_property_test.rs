//! Property tests for subscription establishment through the bridge facade.
//!
//! Scenario: Any mix of subscriptions is tracked slot for slot
//! - Given: an arbitrary list of catch-up, volatile and persistent specs
//! - When: a bridge starts with them over the in-memory transport
//! - Then: each kind reports one slot per spec, in input order, and the
//!   bridge reads live once every slot is live

mod common;

use common::{config, eventually, group, stream, Harness};
use eventbridge::{SubscriptionKind, SubscriptionSpec, SubscriptionState};
use eventbridge_memory::InMemoryTransport;
use proptest::prelude::*;

fn arb_spec() -> impl Strategy<Value = SubscriptionSpec> {
    ("[a-z]{1,8}", 0u8..3).prop_map(|(name, kind)| match kind {
        0 => SubscriptionSpec::catch_up(stream(&name)),
        1 => SubscriptionSpec::volatile(stream(&name)),
        _ => SubscriptionSpec::persistent(stream(&name), group("billing")),
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn every_spec_gets_a_slot_of_its_kind(specs in proptest::collection::vec(arb_spec(), 0..12)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime should build");

        let statuses = runtime.block_on(async {
            // Given: every persistent group exists on the log
            let transport = InMemoryTransport::new();
            for spec in &specs {
                if let SubscriptionSpec::Persistent { stream, group } = spec {
                    transport.create_persistent_subscription(stream, group);
                }
            }

            // When: the bridge starts with the generated specs
            let harness = Harness::start_on(transport, config(specs.clone())).await;
            eventually(|| harness.bridge.is_live()).await;
            let statuses = harness.bridge.subscription_statuses();
            harness.bridge.close().await;
            statuses
        });

        // Then: slots mirror the specs of each kind in order
        for kind in SubscriptionKind::ALL {
            let expected: Vec<_> = specs
                .iter()
                .filter(|spec| spec.kind() == kind)
                .map(|spec| spec.stream().clone())
                .collect();
            let slots: Vec<_> = statuses.iter().filter(|status| status.kind == kind).collect();

            prop_assert_eq!(slots.len(), expected.len());
            for (position, (slot, stream)) in slots.iter().zip(&expected).enumerate() {
                prop_assert_eq!(slot.index, position);
                prop_assert_eq!(&slot.stream, stream);
                prop_assert_eq!(slot.state, SubscriptionState::Live);
            }
        }
    }
}
