//! Property-based tests for item identity and serialization

use context_mediator::context::{ContextItemSet, ContextSubscriber, ManagedContext, ManagedSlot, SurveyResponse};
use context_mediator::coordinator::ContextCoordinator;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

fn item_name() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9]{0,6}\\.[A-Za-z][A-Za-z0-9]{0,6}"
}

fn item_value() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 =._-]{1,12}"
}

fn flip_case(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_uppercase() {
                c.to_ascii_lowercase()
            } else {
                c.to_ascii_uppercase()
            }
        })
        .collect()
}

/// Serialized text parses back to the same items
#[test]
fn test_text_round_trip_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &prop::collection::vec((item_name(), item_value()), 0..12),
            |entries| {
                let items: ContextItemSet = entries.iter().map(|(n, v)| (n.as_str(), v.as_str())).collect();
                let parsed = ContextItemSet::parse(&items.to_string());

                prop_assert_eq!(parsed.len(), items.len());
                for (name, value) in items.iter() {
                    prop_assert_eq!(parsed.get_item(name), Some(value));
                    prop_assert_eq!(parsed.get_item(&flip_case(name)), Some(value));
                }
                prop_assert_eq!(parsed.to_string(), items.to_string());

                Ok(())
            },
        )
        .unwrap();
}

/// Names differing only in case address a single item
#[test]
fn test_case_insensitive_identity_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(item_name(), item_value(), item_value()),
            |(name, first, second)| {
                let mut items = ContextItemSet::new();
                items.set_item(&name, Some(first.as_str()));
                items.set_item(&flip_case(&name), Some(second.as_str()));

                prop_assert_eq!(items.len(), 1);
                prop_assert_eq!(items.get_item(&name.to_uppercase()), Some(second.as_str()));

                items.set_item::<String>(&name.to_lowercase(), None);
                prop_assert!(items.is_empty());

                Ok(())
            },
        )
        .unwrap();
}

/// Later values win when item sets are merged, whatever the casing
#[test]
fn test_merge_matches_map_semantics_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(
                prop::collection::vec((item_name(), item_value()), 0..8),
                prop::collection::vec((item_name(), item_value()), 0..8),
            ),
            |(left, right)| {
                let mut merged: ContextItemSet = left.iter().map(|(n, v)| (n.as_str(), v.as_str())).collect();
                let other: ContextItemSet = right.iter().map(|(n, v)| (n.as_str(), v.as_str())).collect();
                merged.add_items(&other);

                let mut expected = BTreeMap::new();
                for (name, value) in left.iter().chain(right.iter()) {
                    expected.insert(name.to_lowercase(), value.clone());
                }

                prop_assert_eq!(merged.len(), expected.len());
                for (key, value) in &expected {
                    prop_assert_eq!(merged.get_item(key), Some(value.as_str()));
                }

                Ok(())
            },
        )
        .unwrap();
}

struct Objector;

impl ContextSubscriber for Objector {
    fn pending(&self, response: &SurveyResponse) -> anyhow::Result<()> {
        response.reject("objection")?;
        Ok(())
    }
}

/// Requesting the current value never surveys anyone
#[test]
fn test_equal_request_is_no_op_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&item_value(), |value| {
            let coordinator = ContextCoordinator::default();
            let slot = ManagedContext::new("Encounter", Some(value.clone()), &coordinator);
            slot.add_subscriber(Arc::new(Objector));

            let mut ticket = slot.request_context_change(value.clone()).unwrap();
            prop_assert!(ticket.try_verdict().unwrap().is_accepted());
            prop_assert!(!slot.is_pending());
            prop_assert_eq!(slot.get_context_object(false), Some(value));

            Ok(())
        })
        .unwrap();
}
