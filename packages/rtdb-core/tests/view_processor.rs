use rtdb_core::{
    order_changes, Change, ChangeKind, Index, Node, Operation, OperationSource, Path,
    PersistentTrie, QueryParams, ViewCache, ViewProcessor, WriteLog,
};
use rtdb_test_support::{node, path};
use serde_json::{json, Value};

struct Harness {
    processor: ViewProcessor,
    view: ViewCache,
    writes: WriteLog,
}

impl Harness {
    fn new(params: &QueryParams) -> Self {
        let processor = ViewProcessor::for_query(params);
        let view = processor.empty_view_cache();
        Self {
            processor,
            view,
            writes: WriteLog::new(),
        }
    }

    fn apply(&mut self, op: Operation) -> Vec<(ChangeKind, Option<String>, Option<String>)> {
        let result = self
            .processor
            .apply_operation(&self.view, &op, &self.writes.view(Path::root()), None)
            .unwrap();
        let ordered: Vec<Change> = order_changes(
            result.changes,
            result.view_cache.event_cache().indexed_node(),
            self.processor.filter().index(),
        );
        self.view = result.view_cache;
        ordered
            .into_iter()
            .map(|c| (c.kind, c.child_key, c.prev_key))
            .collect()
    }

    fn server(&mut self, at: &str, value: Value) -> Vec<(ChangeKind, Option<String>, Option<String>)> {
        self.apply(Operation::Overwrite {
            source: OperationSource::server(),
            path: path(at),
            snap: node(value),
        })
    }

    fn user(&mut self, id: u64, at: &str, value: Value) -> Vec<(ChangeKind, Option<String>, Option<String>)> {
        self.writes
            .add_overwrite(path(at), node(value.clone()), id, true)
            .unwrap();
        self.apply(Operation::Overwrite {
            source: OperationSource::User,
            path: path(at),
            snap: node(value),
        })
    }

    fn event_value(&self) -> Value {
        self.view.event_cache().node().val(false)
    }
}

fn child(kind: ChangeKind, key: &str, prev: Option<&str>) -> (ChangeKind, Option<String>, Option<String>) {
    (kind, Some(key.to_string()), prev.map(str::to_string))
}

const VALUE: (ChangeKind, Option<String>, Option<String>) = (ChangeKind::Value, None, None);

#[test]
fn value_range_tracks_children_entering_and_leaving() {
    let params = QueryParams::new()
        .order_by(Index::Value)
        .start_at(Node::from(2), None)
        .unwrap()
        .end_at(Node::from(4), None)
        .unwrap();
    let mut h = Harness::new(&params);

    assert_eq!(
        h.server("", json!({"a": 1, "b": 3, "c": 5})),
        vec![child(ChangeKind::ChildAdded, "b", None), VALUE]
    );
    assert_eq!(h.event_value(), json!({"b": 3}));

    assert_eq!(
        h.server("a", json!(3)),
        vec![child(ChangeKind::ChildAdded, "a", None), VALUE]
    );
    assert_eq!(
        h.server("b", json!(10)),
        vec![child(ChangeKind::ChildRemoved, "b", None), VALUE]
    );
    assert_eq!(h.event_value(), json!({"a": 3}));
    // The server cache still holds everything it was told.
    assert_eq!(
        h.view.server_cache().node().val(false),
        json!({"a": 3, "b": 10, "c": 5})
    );
}

#[test]
fn limit_to_last_window_moves_with_local_writes() {
    let params = QueryParams::new().order_by(Index::Key).limit_to_last(2);
    let mut h = Harness::new(&params);
    h.server("", json!({"a": 1, "b": 2, "c": 3}));
    assert_eq!(h.event_value(), json!({"b": 2, "c": 3}));

    assert_eq!(
        h.user(1, "d", json!(4)),
        vec![
            child(ChangeKind::ChildRemoved, "b", None),
            child(ChangeKind::ChildAdded, "d", Some("c")),
            VALUE,
        ]
    );
    assert_eq!(h.event_value(), json!({"c": 3, "d": 4}));

    h.writes.remove(1).unwrap();
    let reverted = h.apply(Operation::AckUserWrite {
        path: path("d"),
        affected: PersistentTrie::with_value(true),
        revert: true,
    });
    assert_eq!(
        reverted,
        vec![
            child(ChangeKind::ChildRemoved, "d", None),
            child(ChangeKind::ChildAdded, "b", None),
            VALUE,
        ]
    );
    assert_eq!(h.event_value(), json!({"b": 2, "c": 3}));
}

#[test]
fn priority_order_reports_moves() {
    let params = QueryParams::new().order_by(Index::Priority);
    let mut h = Harness::new(&params);
    h.server(
        "",
        json!({
            "a": {".value": "x", ".priority": 1},
            "b": {".value": "y", ".priority": 2},
        }),
    );

    let changes = h.server("a", json!({".value": "x", ".priority": 3}));
    assert_eq!(
        changes,
        vec![
            child(ChangeKind::ChildMoved, "a", Some("b")),
            child(ChangeKind::ChildChanged, "a", Some("b")),
            VALUE,
        ]
    );
}

#[test]
fn acked_write_keeps_data_without_new_events() {
    let mut h = Harness::new(&QueryParams::new());
    h.server("", json!({"a": 1}));
    h.user(1, "a", json!(2));
    // The server echoes the write before acknowledging it.
    assert!(h.server("a", json!(2)).is_empty());
    h.writes.remove(1).unwrap();
    let acked = h.apply(Operation::AckUserWrite {
        path: path("a"),
        affected: PersistentTrie::with_value(true),
        revert: false,
    });
    assert!(acked.is_empty());
    assert_eq!(h.event_value(), json!({"a": 2}));
}

#[test]
fn user_merge_before_server_data_is_partial() {
    let mut h = Harness::new(&QueryParams::new());
    let children = rtdb_core::CompoundWrite::empty()
        .add_write(&path("x"), Node::from(1))
        .add_write(&path("y/z"), Node::from(2));
    h.writes.add_merge(Path::root(), children.clone(), 1).unwrap();
    let changes = h.apply(Operation::Merge {
        source: OperationSource::User,
        path: Path::root(),
        children,
    });
    // Without server data only complete children are known; no value event.
    assert_eq!(changes, vec![child(ChangeKind::ChildAdded, "x", None)]);
    assert!(!h.view.event_cache().is_fully_initialized());

    let complete = h.server("", json!({"w": true}));
    assert_eq!(h.event_value(), json!({"w": true, "x": 1, "y": {"z": 2}}));
    assert!(complete.contains(&VALUE));
}
