//! Property tests for posting exactness of field and combination indexes

use proptest::prelude::*;
use recpool_core::*;

const LANGS: [&str; 3] = ["en", "fr", "cn"];
const CATS: [&str; 4] = ["cat21", "cat22", "cat23", "cat24"];

fn catalog() -> SchemaCatalog {
    SchemaCatalog::new(Schema::new([
        ("lang", FieldType::String),
        ("level", FieldType::Int64),
        ("cat2", FieldType::StringList),
        ("ctr", FieldType::Float32),
    ]))
}

fn arb_items() -> impl Strategy<Value = ItemCollection> {
    prop::collection::vec(
        (0..LANGS.len(), 1i64..4, prop::collection::vec(0..CATS.len(), 0..4), 0u32..=100),
        0..40,
    )
    .prop_map(|rows| {
        let items = rows
            .into_iter()
            .enumerate()
            .map(|(i, (lang, level, cats, ctr))| {
                let cat2 = cats.into_iter().map(|c| CATS[c].to_string()).collect();
                Item::new(format!("item_id_{}", i))
                    .with_field("lang", FieldValue::String(LANGS[lang].to_string()))
                    .with_field("level", FieldValue::Int64(level))
                    .with_field("cat2", FieldValue::StringList(cat2))
                    .with_field("ctr", FieldValue::Float32(f64::from(ctr) / 100.0))
            })
            .collect();
        ItemCollection::new(items).unwrap()
    })
}

proptest! {
    #[test]
    fn scalar_field_postings_are_a_partition(items in arb_items()) {
        let index = FieldIndexer::build(&items, "level", FieldType::Int64).unwrap();
        for (ordinal, item) in items.enumerate() {
            let holders: Vec<&IndexValue> = index
                .iter()
                .filter(|(_, posting)| posting.contains(ordinal))
                .map(|(value, _)| value)
                .collect();
            prop_assert_eq!(holders.len(), 1);
            prop_assert!(item.get_field("level").unwrap().matches(holders[0]));
        }
    }

    #[test]
    fn list_field_postings_match_membership(items in arb_items()) {
        let index = FieldIndexer::build(&items, "cat2", FieldType::StringList).unwrap();
        for (ordinal, item) in items.enumerate() {
            let Some(FieldValue::StringList(list)) = item.get_field("cat2") else {
                unreachable!("every generated item carries cat2");
            };
            for value in index.values() {
                let IndexValue::Str(value_text) = value else { unreachable!("string list values") };
                let in_posting = index.get(value).unwrap().contains(ordinal);
                prop_assert_eq!(in_posting, list.contains(value_text));
            }
        }
    }

    #[test]
    fn combination_postings_are_exact_and_non_empty(items in arb_items()) {
        let group = FieldGroup::new(["cat2", "lang"]).unwrap();
        let index = CombinationJoiner::new().build(&items, &catalog(), &group).unwrap();

        for (key, posting) in index.iter() {
            prop_assert!(!posting.is_empty());
            for ordinal in posting.iter() {
                let item = items.get(ordinal).unwrap();
                prop_assert!(item.get_field("cat2").unwrap().matches(&key[0]));
                prop_assert!(item.get_field("lang").unwrap().matches(&key[1]));
            }
        }

        // nothing satisfying a key is left out
        for (ordinal, item) in items.enumerate() {
            let Some(FieldValue::StringList(cats)) = item.get_field("cat2") else { unreachable!() };
            let Some(FieldValue::String(lang)) = item.get_field("lang") else { unreachable!() };
            for cat in cats {
                let key = [IndexValue::from(cat.as_str()), IndexValue::from(lang.as_str())];
                prop_assert!(index.get(&key).is_some_and(|posting| posting.contains(ordinal)));
            }
        }
    }

    #[test]
    fn rebuild_is_idempotent(items in arb_items()) {
        let group = FieldGroup::new(["lang", "level", "cat2"]).unwrap();
        let joiner = CombinationJoiner::new();
        let first = joiner.build(&items, &catalog(), &group).unwrap();
        let second = joiner.build(&items, &catalog(), &group).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn selection_is_an_ordered_subset(
        items in arb_items(),
        level in 1i64..4,
        threshold in 0u32..=100,
    ) {
        let text = format!("level={} and ctr>{}", level, f64::from(threshold) / 100.0);
        let predicate = Predicate::parse(&text).unwrap();
        let selected = ConditionEvaluator::select(&items, &catalog(), &predicate).unwrap();

        let ordinals: Vec<u32> = selected.iter().map(|id| items.ordinal_of(id).unwrap()).collect();
        prop_assert!(ordinals.windows(2).all(|pair| pair[0] < pair[1]));
        for ordinal in ordinals {
            let item = items.get(ordinal).unwrap();
            prop_assert_eq!(item.get_field("level"), Some(&FieldValue::Int64(level)));
        }
    }
}
