use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use rtdb_core::{LocalReplica, MemoryTransport, Node, Path, ServerEvent};
use serde_json::{json, Map, Value};

#[derive(serde::Serialize)]
struct Output {
    implementation: &'static str,
    storage: &'static str,
    workload: String,
    timestamp: String,
    name: String,
    total_ops: u64,
    duration_ms: f64,
    ops_per_sec: f64,
    extra: Extra,
    source_file: Option<String>,
}

#[derive(serde::Serialize)]
struct Extra {
    count: u64,
    pending_peak: usize,
}

fn main() {
    let mut count: u64 = 200;
    let mut out_file: Option<PathBuf> = None;
    for arg in env::args().skip(1) {
        if let Some(val) = arg.strip_prefix("--count=") {
            count = val.parse().unwrap_or(count);
        } else if let Some(val) = arg.strip_prefix("--out=") {
            out_file = Some(PathBuf::from(val));
        }
    }

    let mut replica = LocalReplica::new(MemoryTransport::new());
    replica
        .apply_server_event(ServerEvent::DataUpdate {
            path: Path::root(),
            data: Node::empty(),
            tag: None,
        })
        .unwrap();

    let start = Instant::now();
    let mut ids = Vec::with_capacity(count as usize);
    for i in 0..count {
        let mut children = Map::new();
        children.insert(format!("items/{i}/title"), json!(format!("item {i}")));
        children.insert(format!("items/{i}/done"), Value::Bool(false));
        children.insert("meta/last".to_string(), json!(i));
        ids.push(replica.update(Path::root(), &children).unwrap());
        let _ = replica.take_events();
    }
    let pending_peak = replica.pending_writes().len();
    for id in ids {
        replica
            .apply_server_event(ServerEvent::WriteAcked { write_id: id })
            .unwrap();
        let _ = replica.take_events();
    }
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

    let output = Output {
        implementation: "rtdb-core",
        storage: "memory",
        workload: format!("update-ack-{}", count),
        timestamp: chrono::Utc::now().to_rfc3339(),
        name: format!("update-ack-{}", count),
        total_ops: count * 2,
        duration_ms,
        ops_per_sec: if duration_ms > 0.0 {
            (count as f64 * 2.0) / duration_ms * 1000.0
        } else {
            f64::INFINITY
        },
        extra: Extra {
            count,
            pending_peak,
        },
        source_file: out_file.as_ref().map(|p| p.display().to_string()),
    };

    let json = serde_json::to_string_pretty(&output).expect("serialize");
    if let Some(path) = out_file {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdirs");
        }
        fs::write(&path, &json).expect("write output");
    }
    println!("{}", json);
}
