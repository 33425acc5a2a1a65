//! Serialized views of a protocol.
//!
//! The full view is a plain JSON tree of every record field. The methods
//! view prunes it for reproducibility reports: absent values and empty
//! collections drop out, placeholder identifiers normalize to absent, and
//! falsy scalars (`0`, `false`, `""`) survive — absence and zero are
//! different facts.

use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::protocol::Protocol;
use crate::stage::Stage;

/// Identifier strings that mean "nothing known".
const PLACEHOLDER_IDENTIFIERS: &[&str] = &["Unknown", "None", "N/A"];

/// What a walker emits when it re-enters a value it is already inside.
pub const CIRCULAR_REFERENCE: &str = "<circular reference>";

///
/// Re-entrancy guard for walking shared handles. Each shared value is
/// entered under its pointer identity; re-entering an identity that is
/// still on the walk stack yields the circular-reference marker instead of
/// recursing forever.
///
#[derive(Debug, Default)]
pub struct WalkGuard {
    active: Vec<usize>,
}

impl WalkGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity<F>(&mut self, identity: usize, walk: F) -> Value
    where
        F: FnOnce(&mut Self) -> Value,
    {
        if self.active.contains(&identity) {
            return Value::String(CIRCULAR_REFERENCE.to_string());
        }
        self.active.push(identity);
        let value = walk(self);
        self.active.pop();
        value
    }
}

fn record_value<T: serde::Serialize>(record: &Option<T>) -> Value {
    record
        .as_ref()
        .and_then(|r| serde_json::to_value(r).ok())
        .unwrap_or(Value::Null)
}

fn stage_view(stage: &Stage, guard: &mut WalkGuard) -> Value {
    let topology = match &stage.topology {
        None => Value::Null,
        Some(shared) => guard.with_identity(Arc::as_ptr(shared) as usize, |_| {
            serde_json::to_value(shared.as_ref()).unwrap_or(Value::Null)
        }),
    };

    json!({
        "name": stage.name,
        "stage_role": stage.role.map(|r| r.to_string()),
        "prmtop": topology,
        "inpcrd": record_value(&stage.restart),
        "mdin": record_value(&stage.input_deck),
        "mdout": record_value(&stage.log),
        "mdcrd": record_value(&stage.trajectory),
        "restart_path": stage.restart_path.as_ref().map(|p| p.display().to_string()),
        "expected_gap_ps": stage.expected_gap_ps,
        "gap_tolerance_ps": stage.gap_tolerance_ps,
        "observed_gap_ps": stage.observed_gap_ps,
        "validation": stage.validation,
        "continuity": stage.continuity,
        "notes": stage.notes,
        "summary": serde_json::to_value(stage.summary()).unwrap_or(Value::Null),
    })
}

pub fn full_view(protocol: &Protocol) -> Value {
    let mut guard = WalkGuard::new();
    let stages: Vec<Value> = protocol
        .stages
        .iter()
        .map(|s| stage_view(s, &mut guard))
        .collect();
    json!({
        "stages": stages,
        "totals": serde_json::to_value(protocol.totals()).unwrap_or(Value::Null),
    })
}

///
/// Prune a value tree: `null`, empty maps, empty lists, and placeholder
/// identifiers disappear; everything else survives, including `0`, `false`,
/// and the empty string.
///
pub fn prune(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) if PLACEHOLDER_IDENTIFIERS.contains(&s.as_str()) => None,
        Value::Object(map) => {
            let pruned: Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| prune(v).map(|v| (k, v)))
                .collect();
            if pruned.is_empty() {
                None
            } else {
                Some(Value::Object(pruned))
            }
        }
        Value::Array(items) => {
            let pruned: Vec<Value> = items.into_iter().filter_map(prune).collect();
            if pruned.is_empty() {
                None
            } else {
                Some(Value::Array(pruned))
            }
        }
        other => Some(other),
    }
}

pub fn methods_view(protocol: &Protocol) -> Value {
    prune(full_view(protocol)).unwrap_or(Value::Object(Map::new()))
}

impl Protocol {
    pub fn to_full_view(&self) -> Value {
        full_view(self)
    }

    pub fn to_methods_view(&self) -> Value {
        methods_view(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdmeta_core::ParamValue;
    use mdmeta_core::records::{InputDeckRecord, TopologyRecord};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::rc::Rc;

    fn deck_stage(name: &str) -> Stage {
        let mut deck = InputDeckRecord::new(PathBuf::from(format!("{name}.mdin")));
        deck.length_steps = Some(ParamValue::Int(1000));
        deck.dt = ParamValue::Float(0.002);
        deck.coord_freq = ParamValue::Int(0);
        deck.ensemble = "Unknown".to_string();
        let mut stage = Stage::new(name);
        stage.input_deck = Some(deck);
        stage
    }

    #[test]
    fn full_view_exposes_stage_fields() {
        let protocol = Protocol::new(vec![deck_stage("prod")]);
        let view = protocol.to_full_view();
        assert_eq!(view["stages"][0]["name"], json!("prod"));
        assert_eq!(view["stages"][0]["mdin"]["dt"], json!(0.002));
        assert_eq!(view["totals"]["steps"], json!(1000));
    }

    #[test]
    fn methods_view_keeps_falsy_scalars() {
        let protocol = Protocol::new(vec![deck_stage("prod")]);
        let view = protocol.to_methods_view();
        let mdin = &view["stages"][0]["mdin"];
        // 0 and false are facts, not absences.
        assert_eq!(mdin["coord_freq"], json!(0));
        assert_eq!(mdin["features"]["restraints_active"], json!(false));
    }

    #[test]
    fn methods_view_normalizes_placeholder_identifiers() {
        let protocol = Protocol::new(vec![deck_stage("prod")]);
        let view = protocol.to_methods_view();
        let mdin = &view["stages"][0]["mdin"];
        assert!(mdin.get("ensemble").is_none());
    }

    #[test]
    fn methods_view_drops_empty_collections() {
        let protocol = Protocol::new(vec![deck_stage("prod")]);
        let view = protocol.to_methods_view();
        let stage = &view["stages"][0];
        assert!(stage.get("validation").is_none());
        assert!(stage.get("prmtop").is_none());
    }

    #[test]
    fn prune_law_table() {
        assert_eq!(prune(json!(false)), Some(json!(false)));
        assert_eq!(prune(json!(0)), Some(json!(0)));
        assert_eq!(prune(json!("")), Some(json!("")));
        assert_eq!(prune(json!(null)), None);
        assert_eq!(prune(json!({})), None);
        assert_eq!(prune(json!([])), None);
        assert_eq!(prune(json!("Unknown")), None);
        assert_eq!(prune(json!("N/A")), None);
        assert_eq!(prune(json!({"a": null, "b": {}})), None);
        assert_eq!(
            prune(json!({"a": null, "b": 0})),
            Some(json!({"b": 0}))
        );
    }

    #[test]
    fn shared_topology_serializes_for_every_holder() {
        let shared = std::sync::Arc::new({
            let mut t = TopologyRecord::new(PathBuf::from("sys.prmtop"));
            t.natom = Some(42);
            t
        });
        let mut a = Stage::new("a");
        a.topology = Some(shared.clone());
        let mut b = Stage::new("b");
        b.topology = Some(shared);

        let view = Protocol::new(vec![a, b]).to_full_view();
        // Sequential stage walks both see the full record; sharing is not a
        // cycle.
        assert_eq!(view["stages"][0]["prmtop"]["natom"], json!(42));
        assert_eq!(view["stages"][1]["prmtop"]["natom"], json!(42));
    }

    struct CycleNode {
        label: String,
        next: RefCell<Option<Rc<CycleNode>>>,
    }

    impl CycleNode {
        fn walk(&self, guard: &mut WalkGuard) -> Value {
            guard.with_identity(self as *const _ as usize, |g| {
                let next = self
                    .next
                    .borrow()
                    .as_ref()
                    .map(|n| n.walk(g))
                    .unwrap_or(Value::Null);
                json!({"label": self.label, "next": next})
            })
        }
    }

    #[test]
    fn cycle_walk_terminates_with_marker() {
        let a = Rc::new(CycleNode {
            label: "a".to_string(),
            next: RefCell::new(None),
        });
        let b = Rc::new(CycleNode {
            label: "b".to_string(),
            next: RefCell::new(Some(a.clone())),
        });
        *a.next.borrow_mut() = Some(b.clone());

        let mut guard = WalkGuard::new();
        let value = a.walk(&mut guard);
        assert_eq!(value["label"], json!("a"));
        assert_eq!(value["next"]["label"], json!("b"));
        assert_eq!(value["next"]["next"], json!(CIRCULAR_REFERENCE));
        // The guard unwinds fully; a second walk behaves identically.
        assert_eq!(a.walk(&mut guard)["next"]["next"], json!(CIRCULAR_REFERENCE));
    }
}
