//! Repair arbitrary stored JSON into a well-formed [`BackpackState`].
//!
//! Normalization is total and idempotent. Whatever is in storage (nothing,
//! a string, half a backpack written by an older client) comes out as a
//! state with every pocket present. Items without a usable string `id` are
//! dropped, duplicate ids within a pocket keep their first occurrence, and
//! numeric fields accept integers, floats or numeric strings.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use trailhead_types::{
    Answer, BackpackState, FeatureId, MissionId, Pocket, PocketItem, Pockets, Visits,
};

/// Normalize a raw stored string. Unparseable input yields defaults.
pub fn normalize_str(raw: &str) -> BackpackState {
    serde_json::from_str::<Value>(raw).map_or_else(|_| BackpackState::default(), |v| normalize_value(&v))
}

/// Normalize an arbitrary JSON value.
pub fn normalize_value(value: &Value) -> BackpackState {
    let Some(root) = value.as_object() else {
        return BackpackState::default();
    };

    let mut pockets = Pockets::default();
    if let Some(raw_pockets) = root.get("pockets").and_then(Value::as_object) {
        for pocket in Pocket::ALL {
            *pockets.get_mut(pocket) = raw_pockets
                .get(pocket.as_str())
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(parse_item).collect())
                .unwrap_or_default();
        }
    }

    normalize(BackpackState {
        points: root.get("points").and_then(whole_number).unwrap_or(0),
        pockets,
        answers: root
            .get("answers")
            .and_then(Value::as_object)
            .map(parse_answers)
            .unwrap_or_default(),
        visits: Visits {
            geofences: root
                .get("visits")
                .and_then(|v| v.get("geofences"))
                .and_then(Value::as_object)
                .map(|m| {
                    m.iter()
                        .filter_map(|(id, ts)| Some((FeatureId::from(id.as_str()), whole_number(ts)?)))
                        .collect()
                })
                .unwrap_or_default(),
        },
    })
}

/// Enforce the invariants typed code can still violate: non-empty item ids
/// and unique ids per pocket.
pub fn normalize(mut state: BackpackState) -> BackpackState {
    for pocket in Pocket::ALL {
        let items = state.pockets.get_mut(pocket);
        let mut seen = std::collections::HashSet::new();
        items.retain(|item| !item.id.is_empty() && seen.insert(item.id.clone()));
    }
    state
}

fn parse_item(value: &Value) -> Option<PocketItem> {
    let obj = value.as_object()?;
    let id = obj.get("id")?.as_str().filter(|id| !id.is_empty())?;
    let fields: Map<String, Value> = obj
        .iter()
        .filter(|(k, _)| k.as_str() != "id" && k.as_str() != "addedAt")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Some(PocketItem {
        id: id.to_owned(),
        added_at: obj.get("addedAt").and_then(whole_number),
        fields,
    })
}

fn parse_answers(raw: &Map<String, Value>) -> BTreeMap<MissionId, Answer> {
    raw.iter()
        .filter_map(|(mission, answer)| {
            let obj = answer.as_object()?;
            Some((
                MissionId::from(mission.as_str()),
                Answer {
                    correct: obj.get("correct").and_then(Value::as_bool).unwrap_or(false),
                    value: obj.get("value").cloned().unwrap_or(Value::Null),
                    ts: obj.get("ts").and_then(whole_number).unwrap_or(0),
                },
            ))
        })
        .collect()
}

/// Integer view of a JSON number or numeric string. Floats truncate toward
/// zero and saturate at the `i64` range.
#[allow(clippy::cast_possible_truncation)]
fn whole_number(value: &Value) -> Option<i64> {
    let float = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Some(i);
            }
            n.as_f64()?
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Some(i);
            }
            s.parse::<f64>().ok()?
        }
        _ => return None,
    };
    float.is_finite().then(|| float.trunc() as i64)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use serde_json::json;

    use super::*;

    fn renormalize(state: &BackpackState) -> BackpackState {
        normalize_value(&serde_json::to_value(state).unwrap())
    }

    #[test]
    fn garbage_becomes_defaults() {
        for raw in ["", "null", "42", "\"backpack\"", "[1,2]", "{\"pockets\": 7}"] {
            let state = normalize_str(raw);
            assert_eq!(state, BackpackState::default(), "input {raw:?}");
        }
    }

    #[test]
    fn partial_state_fills_missing_pockets() {
        let state = normalize_value(&json!({
            "points": 12,
            "pockets": { "finds": [{ "id": "x", "name": "Coin" }] }
        }));
        assert_eq!(state.points, 12);
        assert_eq!(state.pockets.finds.len(), 1);
        assert_eq!(state.pockets.finds[0].fields["name"], "Coin");
        assert!(state.pockets.clues.is_empty());
    }

    #[test]
    fn numbers_accept_floats_and_strings() {
        let state = normalize_value(&json!({
            "points": 7.9,
            "visits": { "geofences": { "a": 1.0e3, "b": "2000", "c": "soon" } },
            "answers": { "m1": { "correct": true, "value": "B", "ts": "15" } }
        }));
        assert_eq!(state.points, 7);
        assert_eq!(state.visits.geofences.len(), 2);
        assert_eq!(state.visits.geofences[&FeatureId::from("a")], 1_000);
        assert_eq!(state.answers[&MissionId::from("m1")].ts, 15);
        assert_eq!(normalize_value(&json!({ "points": "12" })).points, 12);
        assert_eq!(normalize_value(&json!({ "points": f64::MAX })).points, i64::MAX);
    }

    #[test]
    fn bad_items_are_dropped_and_duplicates_collapse() {
        let state = normalize_value(&json!({
            "pockets": {
                "clues": [
                    "loose string",
                    { "name": "no id" },
                    { "id": 5 },
                    { "id": "" },
                    { "id": "c1", "text": "first" },
                    { "id": "c1", "text": "second" },
                    { "id": "c2", "addedAt": 10.5 }
                ]
            }
        }));
        let ids: Vec<&str> = state.pockets.clues.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert_eq!(state.pockets.clues[0].fields["text"], "first");
        assert_eq!(state.pockets.clues[1].added_at, Some(10));
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            json!(null),
            json!({ "points": -3 }),
            json!({
                "points": 4.5,
                "pockets": {
                    "finds": [{ "id": "x", "addedAt": 1, "meta": { "deep": [1, 2] } }],
                    "photos": [{ "id": "p", "addedAt": "bad" }, { "id": "p" }],
                    "rewards": "none"
                },
                "answers": { "q": { "correct": "yes" }, "r": 3 },
                "visits": { "geofences": { "f1": 99 } }
            }),
        ];
        for input in inputs {
            let once = normalize_value(&input);
            let twice = renormalize(&once);
            assert_eq!(once, twice, "input {input}");
            assert_eq!(normalize(once.clone()), once);
        }
    }
}
