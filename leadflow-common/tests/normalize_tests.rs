//! Identity key properties across the public API

use leadflow_common::normalize::{normalize_id, normalize_name, normalize_phone};
use leadflow_common::verdict::{is_approval_equivalent, is_rejection_equivalent};
use serde_json::json;

#[test]
fn test_same_subscriber_normalizes_identically() {
    let forms = [
        "31999972368",
        "5531999972368",
        "+55 31 99997-2368",
        "5531999972368@suffix",
        "(31) 99997-2368",
        "+55 (31) 9 9997 2368",
    ];
    let keys: Vec<String> = forms.iter().map(|f| normalize_phone(f)).collect();
    assert!(keys.iter().all(|k| k == "5531999972368"), "keys: {:?}", keys);
}

#[test]
fn test_normalizers_are_idempotent_over_a_mixed_corpus() {
    let corpus = [
        "31999972368",
        "3133334444",
        "553199972368",
        "5511987654321@s.whatsapp.net",
        "+44 20 7946 0958",
        "0800 123 4567",
        "abc",
        "123.456.789-09",
        "José  Silva",
    ];
    for raw in corpus {
        let phone = normalize_phone(raw);
        assert_eq!(normalize_phone(&phone), phone, "phone {raw:?}");
        let id = normalize_id(raw);
        assert_eq!(normalize_id(&id), id, "id {raw:?}");
        let name = normalize_name(raw);
        assert_eq!(normalize_name(&name), name, "name {raw:?}");
    }
}

#[test]
fn test_equivalence_sets_are_disjoint() {
    let values = [
        json!(true),
        json!(false),
        json!("true"),
        json!("false"),
        json!("approved"),
        json!("rejected"),
        json!("aprovado"),
        json!("reprovado"),
        json!(1),
        json!(0),
        json!(null),
        json!("pending"),
    ];
    for v in values {
        assert!(
            !(is_approval_equivalent(&v) && is_rejection_equivalent(&v)),
            "{v} is in both sets"
        );
    }
}
