use rtdb_core::{
    ChangeKind, CompoundWrite, Error, Index, LocalReplica, MemoryTransport, Node, OutgoingRequest,
    Path, QueryParams, QueryTag, RangeMerge, ReplicaConfig, SequentialWriteIds, ServerEvent,
    Transport,
};
use rtdb_test_support::{node, path};
use serde_json::{json, Map, Value};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn synced(value: Value) -> LocalReplica<MemoryTransport> {
    init_tracing();
    let mut replica = LocalReplica::new(MemoryTransport::new());
    replica
        .apply_server_event(ServerEvent::DataUpdate {
            path: Path::root(),
            data: node(value),
            tag: None,
        })
        .unwrap();
    replica.take_events();
    replica
}

fn kinds(replica: &mut LocalReplica<MemoryTransport>) -> Vec<(ChangeKind, Option<String>)> {
    replica
        .take_events()
        .into_iter()
        .map(|c| (c.kind, c.child_key))
        .collect()
}

/// Refuses every request after the first `accept` ones.
struct FlakyTransport {
    accept: usize,
    sent: Vec<OutgoingRequest>,
}

impl Transport for FlakyTransport {
    fn send(&mut self, request: OutgoingRequest) -> rtdb_core::Result<()> {
        if self.sent.len() >= self.accept {
            return Err(Error::Transport("connection closed".into()));
        }
        self.sent.push(request);
        Ok(())
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

#[test]
fn first_snapshot_raises_child_and_value_events() {
    init_tracing();
    let mut replica = LocalReplica::new(MemoryTransport::new());
    assert_eq!(replica.value_at(&Path::root()), None);
    replica
        .apply_server_event(ServerEvent::DataUpdate {
            path: Path::root(),
            data: node(json!({"b": 2, "a": 1})),
            tag: None,
        })
        .unwrap();
    assert_eq!(
        kinds(&mut replica),
        vec![
            (ChangeKind::ChildAdded, Some("a".into())),
            (ChangeKind::ChildAdded, Some("b".into())),
            (ChangeKind::Value, None),
        ]
    );
}

#[test]
fn acknowledged_set_survives_and_clears_pending() {
    let mut replica = synced(json!({"a": 1}));
    let id = replica.set(path("a/b"), &json!("x")).unwrap();
    assert_eq!(replica.pending_writes().len(), 1);
    assert_eq!(replica.value_at(&path("a")), Some(node(json!({"b": "x"}))));

    replica
        .apply_server_event(ServerEvent::DataUpdate {
            path: path("a/b"),
            data: Node::from("x"),
            tag: None,
        })
        .unwrap();
    replica
        .apply_server_event(ServerEvent::WriteAcked { write_id: id })
        .unwrap();
    assert!(replica.pending_writes().is_empty());
    assert_eq!(replica.value_at(&path("a")), Some(node(json!({"b": "x"}))));
}

#[test]
fn update_sends_merge_and_applies_each_child() {
    let mut replica = synced(json!({"a": 1, "b": 2}));
    let id = replica
        .update(Path::root(), &object(json!({"a": 10, "c/d": true})))
        .unwrap();
    assert_eq!(
        replica.value_at(&Path::root()),
        Some(node(json!({"a": 10, "b": 2, "c": {"d": true}})))
    );
    let sent = replica.transport_mut().take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].to_value(),
        json!({
            "action": "merge",
            "path": "/",
            "data": {"/a": 10, "/c/d": true},
            "write_id": id,
        })
    );
    assert_eq!(
        kinds(&mut replica),
        vec![
            (ChangeKind::ChildAdded, Some("c".into())),
            (ChangeKind::ChildChanged, Some("a".into())),
            (ChangeKind::Value, None),
        ]
    );
}

#[test]
fn overlapping_update_paths_are_rejected_before_sending() {
    let mut replica = synced(json!({}));
    let result = replica.update(Path::root(), &object(json!({"a": 1, "a/b": 2})));
    assert!(matches!(
        result,
        Err(Error::OverlappingUpdatePaths { .. })
    ));
    assert!(replica.transport().sent().is_empty());
    assert!(replica.pending_writes().is_empty());
}

#[test]
fn rejected_merge_restores_server_children() {
    let mut replica = synced(json!({"a": 1, "b": 2}));
    let id = replica
        .update(Path::root(), &object(json!({"a": 5, "b": null})))
        .unwrap();
    assert_eq!(replica.value_at(&Path::root()), Some(node(json!({"a": 5}))));
    replica.take_events();

    replica
        .apply_server_event(ServerEvent::WriteRejected {
            write_id: id,
            reason: "permission_denied".into(),
        })
        .unwrap();
    assert_eq!(
        replica.value_at(&Path::root()),
        Some(node(json!({"a": 1, "b": 2})))
    );
    let events = kinds(&mut replica);
    assert!(events.contains(&(ChangeKind::ChildAdded, Some("b".into()))));
    assert!(events.contains(&(ChangeKind::ChildChanged, Some("a".into()))));
}

#[test]
fn server_merge_and_range_merge_update_cache() {
    let mut replica = synced(json!({"list": {"a": 1, "b": 2, "c": 3, "d": 4}}));
    replica
        .apply_server_event(ServerEvent::DataMerge {
            path: path("list"),
            changed: CompoundWrite::empty().add_write(&path("e"), Node::from(5)),
            tag: None,
        })
        .unwrap();
    replica
        .apply_server_event(ServerEvent::RangeMerge {
            path: path("list"),
            ranges: vec![RangeMerge::new(
                Some(path("a")),
                Some(path("c")),
                node(json!({"c": 30})),
            )],
            tag: None,
        })
        .unwrap();
    assert_eq!(
        replica.value_at(&path("list")),
        Some(node(json!({"a": 1, "c": 30, "d": 4, "e": 5})))
    );
    assert_eq!(
        kinds(&mut replica),
        vec![
            (ChangeKind::ChildChanged, Some("list".into())),
            (ChangeKind::Value, None),
            (ChangeKind::ChildChanged, Some("list".into())),
            (ChangeKind::Value, None),
        ]
    );
}

#[test]
fn shadowed_ack_raises_no_events() {
    let mut replica = synced(json!({"a": 1}));
    let first = replica.set(path("a"), &json!(2)).unwrap();
    replica.set(path("a"), &json!(3)).unwrap();
    replica.take_events();
    replica
        .apply_server_event(ServerEvent::WriteAcked { write_id: first })
        .unwrap();
    assert!(replica.take_events().is_empty());
    assert_eq!(replica.value_at(&path("a")), Some(Node::from(3)));
    assert_eq!(replica.pending_writes().len(), 1);
}

#[test]
fn purge_reverts_every_pending_write() {
    let mut replica = synced(json!({"a": 1}));
    replica.set(path("a"), &json!(2)).unwrap();
    replica.set(path("z"), &json!(true)).unwrap();
    replica.take_events();

    let purged = replica.purge_pending_writes().unwrap();
    assert_eq!(purged.len(), 2);
    assert!(replica.pending_writes().is_empty());
    assert_eq!(replica.value_at(&Path::root()), Some(node(json!({"a": 1}))));
    assert_eq!(
        kinds(&mut replica),
        vec![
            (ChangeKind::ChildRemoved, Some("z".into())),
            (ChangeKind::ChildChanged, Some("a".into())),
            (ChangeKind::Value, None),
        ]
    );
    assert!(replica.purge_pending_writes().unwrap().is_empty());
}

#[test]
fn listen_sends_index_definition_and_tag() {
    let mut replica = synced(json!({}));
    let params = QueryParams::new()
        .order_by(Index::path(path("score")).unwrap())
        .limit_to_first(3);
    replica
        .listen(path("players"), &params, Some(QueryTag::new(4)))
        .unwrap();
    replica.unlisten(path("players"), Some(QueryTag::new(4))).unwrap();
    let sent = replica.transport().sent();
    assert_eq!(
        sent[0],
        OutgoingRequest::Listen {
            path: path("players"),
            index_definition: "/score".into(),
            tag: Some(QueryTag::new(4)),
        }
    );
    assert!(matches!(sent[1], OutgoingRequest::Unlisten { .. }));
}

#[test]
fn write_ids_resume_and_depth_limit_applies() {
    init_tracing();
    let config = ReplicaConfig {
        max_object_depth: 2,
        ..ReplicaConfig::default()
    };
    let mut replica = LocalReplica::with_parts(
        MemoryTransport::new(),
        SequentialWriteIds::starting_after(10),
        config,
    );
    assert_eq!(replica.set(path("a"), &json!({"b": 1})).unwrap(), 11);
    assert!(matches!(
        replica.set(path("a"), &json!({"b": {"c": {"d": 1}}})),
        Err(Error::MaxDepthExceeded(_))
    ));
    assert_eq!(replica.set(path("b"), &json!(1)).unwrap(), 12);
}

#[test]
fn listen_complete_on_empty_location_reports_value() {
    init_tracing();
    let mut replica = LocalReplica::new(MemoryTransport::new());
    replica
        .apply_server_event(ServerEvent::ListenComplete {
            path: Path::root(),
            tag: None,
        })
        .unwrap();
    assert_eq!(kinds(&mut replica), vec![(ChangeKind::Value, None)]);
    assert_eq!(replica.value_at(&Path::root()), Some(Node::empty()));
}

#[test]
fn failed_send_leaves_no_pending_write() {
    init_tracing();
    let mut replica = LocalReplica::new(FlakyTransport {
        accept: 1,
        sent: Vec::new(),
    });
    replica
        .apply_server_event(ServerEvent::DataUpdate {
            path: Path::root(),
            data: node(json!({"a": 1})),
            tag: None,
        })
        .unwrap();
    replica.take_events();

    let kept = replica.set(path("b"), &json!(true)).unwrap();
    replica.take_events();
    assert_eq!(
        replica.set(path("a"), &json!(2)),
        Err(Error::Transport("connection closed".into()))
    );
    assert!(matches!(
        replica.update(Path::root(), &object(json!({"c": 3}))),
        Err(Error::Transport(_))
    ));

    let pending: Vec<_> = replica.pending_writes().iter().map(|w| w.write_id).collect();
    assert_eq!(pending, vec![kept]);
    assert!(replica.take_events().is_empty());
    assert_eq!(
        replica.value_at(&Path::root()),
        Some(node(json!({"a": 1, "b": true})))
    );
    assert_eq!(replica.transport().sent.len(), 1);
}
