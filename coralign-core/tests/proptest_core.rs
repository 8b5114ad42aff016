//! Property-based tests for template population using proptest.

use proptest::prelude::*;
use serde_json::Value;

use coralign_core::{Settings, Template, populate, values_match};

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        (0i64..3).prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        "[xy]".prop_map(Value::from),
    ]
}

fn group() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[xyz]", leaf(), 0..3)
        .prop_map(|m| Value::Object(m.into_iter().collect()))
}

// Scalar fields are named a..c and option groups g1/g2, so a template never
// asks to merge a group into a scalar.
fn settings_strategy() -> impl Strategy<Value = Settings> {
    (
        prop::collection::btree_map("[abc]", leaf(), 0..3),
        prop::collection::btree_map("g[12]", prop_oneof![Just(Value::Null), group()], 0..2),
    )
        .prop_map(|(scalars, groups)| scalars.into_iter().chain(groups).collect())
}

fn template_strategy() -> impl Strategy<Value = Template> {
    (
        prop::collection::btree_map("[abc]", leaf(), 0..3),
        prop::collection::btree_map("g[12]", group(), 0..2),
    )
        .prop_map(|(scalars, groups)| scalars.into_iter().chain(groups).collect())
}

fn conflicts(settings: &Settings, template: &Template) -> bool {
    template.iter().any(|(key, val)| match val {
        Value::Object(group) => {
            let existing = settings.value(key).and_then(Value::as_object);
            group.iter().any(|(sub_key, sub_val)| {
                existing
                    .and_then(|m| m.get(sub_key))
                    .is_some_and(|cur| !cur.is_null() && !values_match(cur, sub_val))
            })
        }
        _ => settings
            .value(key)
            .is_some_and(|cur| !values_match(cur, val)),
    })
}

// --- Population properties ---

proptest! {
    #[test]
    fn populate_never_overwrites_set_fields(
        settings in settings_strategy(),
        template in template_strategy(),
    ) {
        let mut populated = settings.clone();
        populate(&mut populated, Some(&template), false).unwrap();

        for (key, value) in settings.iter() {
            match value {
                Value::Null => {}
                Value::Object(group) => {
                    let merged = populated.value(key).and_then(Value::as_object).unwrap();
                    for (sub_key, sub_val) in group.iter().filter(|(_, v)| !v.is_null()) {
                        prop_assert_eq!(merged.get(sub_key), Some(sub_val));
                    }
                }
                _ => prop_assert_eq!(populated.get(key), Some(value)),
            }
        }
    }

    #[test]
    fn populate_fills_unset_scalars_from_template(
        settings in settings_strategy(),
        template in template_strategy(),
    ) {
        let mut populated = settings.clone();
        populate(&mut populated, Some(&template), false).unwrap();

        for (key, value) in template.iter().filter(|(_, v)| !v.is_object()) {
            if !settings.is_set(key) {
                prop_assert_eq!(populated.get(key), Some(value));
            }
        }
    }

    #[test]
    fn populate_is_idempotent(
        settings in settings_strategy(),
        template in template_strategy(),
    ) {
        let mut once = settings.clone();
        populate(&mut once, Some(&template), false).unwrap();
        let mut twice = once.clone();
        populate(&mut twice, Some(&template), false).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn strict_mode_raises_exactly_on_differences(
        settings in settings_strategy(),
        template in template_strategy(),
    ) {
        let mut populated = settings.clone();
        let result = populate(&mut populated, Some(&template), true);
        prop_assert_eq!(result.is_err(), conflicts(&settings, &template));
    }

    #[test]
    fn strict_mode_accepts_its_own_output(
        settings in settings_strategy(),
        template in template_strategy(),
    ) {
        let mut populated = settings.clone();
        populate(&mut populated, Some(&template), false).unwrap();
        prop_assume!(!conflicts(&settings, &template));
        let mut again = populated.clone();
        prop_assert!(populate(&mut again, Some(&template), true).is_ok());
    }
}
