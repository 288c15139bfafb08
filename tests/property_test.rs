use change_trail::domain::change_log::{ChangeAction, next_timestamp};
use change_trail::domain::inventory::{Cable, Console};
use change_trail::domain::snapshot::{deserialize, diff, serialize};
use proptest::prelude::*;
use uuid::Uuid;

fn arb_uuid() -> impl Strategy<Value = Uuid> {
    any::<u128>().prop_map(Uuid::from_u128)
}

fn arb_console() -> impl Strategy<Value = Console> {
    (
        proptest::option::of(arb_uuid()),
        "[a-z0-9]{1,30}",
        any::<bool>(),
        arb_uuid(),
        1..=i32::MAX,
    )
        .prop_map(|(id, name, is_virtual, device_id, bauds)| Console {
            id,
            name,
            is_virtual,
            device_id,
            bauds,
        })
}

fn arb_cable() -> impl Strategy<Value = Cable> {
    (
        proptest::option::of(arb_uuid()),
        "\\PC{1,20}",
        proptest::option::of(arb_uuid()),
        proptest::option::of(arb_uuid()),
    )
        .prop_map(|(id, color, side_a, side_b)| Cable {
            id,
            color,
            side_a,
            side_b,
        })
}

fn arb_action() -> impl Strategy<Value = ChangeAction> {
    prop_oneof![
        Just(ChangeAction::Create),
        Just(ChangeAction::Update),
        Just(ChangeAction::Delete),
    ]
}

proptest! {
    /// deserialize(serialize(e)) == e.
    #[test]
    fn snapshot_roundtrip(console in arb_console(), cable in arb_cable()) {
        let snap = serialize(Some(&console)).unwrap().unwrap();
        prop_assert_eq!(deserialize::<Console>(&snap).unwrap(), console);

        let snap = serialize(Some(&cable)).unwrap().unwrap();
        prop_assert_eq!(deserialize::<Cable>(&snap).unwrap(), cable);
    }

    /// A state compared with itself never reports changes.
    #[test]
    fn diff_of_identical_states_is_none(console in arb_console()) {
        let snap = serialize(Some(&console)).unwrap().unwrap();
        prop_assert_eq!(diff(Some(&snap), &snap), None);
    }

    /// Mutating a chosen subset of fields reports exactly that subset, in
    /// declaration order.
    #[test]
    fn diff_names_exactly_the_mutated_fields(
        console in arb_console(),
        mask in proptest::array::uniform4(any::<bool>()),
    ) {
        let mut changed = console.clone();
        if mask[0] {
            changed.name.push('x');
        }
        if mask[1] {
            changed.is_virtual = !changed.is_virtual;
        }
        if mask[2] {
            changed.device_id = Uuid::from_u128(changed.device_id.as_u128() ^ 1);
        }
        if mask[3] {
            changed.bauds = changed.bauds.wrapping_add(1);
        }

        let expected: Vec<String> = ["name", "is_virtual", "device_id", "bauds"]
            .iter()
            .zip(mask)
            .filter(|(_, mutated)| *mutated)
            .map(|(field, _)| field.to_string())
            .collect();
        let expected = if expected.is_empty() { None } else { Some(expected) };

        let old = serialize(Some(&console)).unwrap().unwrap();
        let new = serialize(Some(&changed)).unwrap().unwrap();
        prop_assert_eq!(diff(Some(&old), &new), expected);
    }

    /// Without a prior state there is nothing to compare.
    #[test]
    fn diff_without_prior_is_none(cable in arb_cable()) {
        let snap = serialize(Some(&cable)).unwrap().unwrap();
        prop_assert_eq!(diff(None, &snap), None);
    }

    /// as_str -> try_from is identity for any action.
    #[test]
    fn action_roundtrip(action in arb_action()) {
        prop_assert_eq!(ChangeAction::try_from(action.as_str()).unwrap(), action);
    }

    /// Record timestamps never repeat or go backwards.
    #[test]
    fn timestamps_strictly_increase(n in 2usize..200) {
        let stamps: Vec<_> = (0..n).map(|_| next_timestamp()).collect();
        for pair in stamps.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
    }
}
