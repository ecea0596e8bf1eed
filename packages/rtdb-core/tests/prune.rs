use rtdb_core::{plan_prune, CachePolicy, Error, Path, PruneForest, TrackedQuery};
use rtdb_test_support::path;

fn tracked(id: u64, at: &str, last_use: i64, active: bool) -> TrackedQuery {
    TrackedQuery {
        id,
        path: path(at),
        last_use,
        active,
        complete: true,
    }
}

#[test]
fn deepest_decision_wins() {
    let forest = PruneForest::empty()
        .prune_path(&path("a"))
        .unwrap()
        .keep_path(&path("a/b"));
    assert!(forest.prunes_anything());
    assert!(forest.should_prune_unkept_descendants(&path("a/c")));
    assert!(forest.should_keep(&path("a/b/deep")));
    assert!(!forest.should_keep(&path("a")));
    assert!(forest.affects_path(&path("a/x")));
    assert!(!forest.affects_path(&path("z")));
    assert_eq!(forest.kept_paths(), vec![path("a/b")]);
}

#[test]
fn pruning_below_a_kept_path_is_refused() {
    let forest = PruneForest::empty().keep_path(&path("a"));
    assert_eq!(
        forest.prune_path(&path("a/b")),
        Err(Error::PruneKeptPath("/a/b".into()))
    );
    assert!(forest
        .prune_all(["x", "y"], &path("a"))
        .is_err());
}

#[test]
fn pruning_over_a_kept_descendant_is_refused() {
    let forest = PruneForest::empty().keep_path(&path("a/b"));
    assert_eq!(
        forest.prune_path(&path("a")),
        Err(Error::PruneKeptPath("/a".into()))
    );
    assert_eq!(
        forest.prune_all(["a", "z"], &Path::root()),
        Err(Error::PruneKeptPath("/a".into()))
    );
    assert!(forest.prune_all(["z"], &Path::root()).is_ok());
    assert!(forest.should_keep(&path("a/b")));
}

#[test]
fn child_views_inherit_decisions() {
    let forest = PruneForest::empty()
        .prune_all(["a", "b"], &Path::root())
        .unwrap()
        .keep_all(["k"], &path("a"));
    let a = forest.child("a");
    assert!(a.should_prune_unkept_descendants(&path("x")));
    assert!(a.should_keep(&path("k")));
    assert!(forest.child_at_path(&path("b/q")).should_prune_unkept_descendants(&Path::root()));
    assert!(!forest.child("c").prunes_anything());
}

#[test]
fn plan_prunes_least_recently_used_inactive_queries() {
    let queries = vec![
        tracked(1, "old", 10, false),
        tracked(2, "older", 5, false),
        tracked(3, "recent", 50, false),
        tracked(4, "live", 1, true),
        tracked(5, "fresh", 40, false),
    ];
    let policy = CachePolicy {
        percent_of_queries_to_prune_at_once: 0.5,
        max_number_of_queries_to_keep: 1000,
    };
    // Four inactive queries at 50% prune two, oldest first.
    let forest = plan_prune(&queries, &policy).unwrap();
    assert!(forest.should_prune_unkept_descendants(&path("older")));
    assert!(forest.should_prune_unkept_descendants(&path("old")));
    for kept in ["recent", "fresh", "live"] {
        assert!(forest.should_keep(&path(kept)), "{kept} should be kept");
    }
}

#[test]
fn plan_honours_max_queries_to_keep() {
    let queries: Vec<TrackedQuery> = (0..6)
        .map(|i| tracked(i, &format!("q{i}"), i as i64, false))
        .collect();
    let policy = CachePolicy {
        percent_of_queries_to_prune_at_once: 0.0,
        max_number_of_queries_to_keep: 2,
    };
    let forest = plan_prune(&queries, &policy).unwrap();
    let pruned: Vec<u64> = queries
        .iter()
        .filter(|q| forest.should_prune_unkept_descendants(&q.path))
        .map(|q| q.id)
        .collect();
    assert_eq!(pruned, vec![0, 1, 2, 3]);
    assert_eq!(forest.kept_paths().len(), 2);

    let nothing = plan_prune(&[], &CachePolicy::default()).unwrap();
    assert!(!nothing.prunes_anything());
}
