//! End-to-end supervisor specs
//!
//! Drive a real manager with real OS children through the public
//! operations and verify the observable contracts: reconciliation,
//! ordering, commit semantics, flapping back-off and the registry
//! round-trip.

use gaffer_core::config::{FlappingPolicy, JobConfig};
use gaffer_core::process::ProcessId;
use gaffer_core::session::JobName;
use gaffer_core::test_support::{channel_listener, crasher_config, sleeper_config};
use gaffer_daemon::manager::Manager;
use gaffer_daemon::process::decode_stream_data;
use std::time::Duration;
use tokio::time::{sleep, timeout};

fn data_text(payload: &serde_json::Value) -> String {
    let raw = decode_stream_data(payload["data"].as_str().unwrap_or_default());
    String::from_utf8_lossy(&raw).into_owned()
}

fn fq(name: &str) -> JobName {
    JobName::new("default", name)
}

async fn wait_until(what: &str, mut probe: impl FnMut() -> bool) {
    for _ in 0..240 {
        if probe() {
            return;
        }
        sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn basic_spawn_stop() {
    let manager = Manager::new();
    let (listener, mut events) = channel_listener();
    manager.events().subscribe("spawn", listener);
    let (exit_listener, mut exits) = channel_listener();
    manager.events().subscribe("exit", exit_listener);

    manager.load(sleeper_config("dummy", 1), None, None, true).unwrap();

    let (_, payload) = timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap();
    assert_eq!(payload["event"], "spawn");
    assert_eq!(payload["pid"], 1);

    manager.stop_job(&fq("dummy")).unwrap();
    let (_, payload) = timeout(Duration::from_secs(5), exits.recv()).await.unwrap().unwrap();
    assert_eq!(payload["pid"], 1);

    wait_until("empty pid set", || manager.pids(None).map(|p| p.is_empty()) == Ok(true)).await;
    manager.stop().await;
}

#[tokio::test]
async fn scale_up_then_down_reaps_oldest() {
    let manager = Manager::new();
    manager.load(sleeper_config("dummy", 1), None, None, true).unwrap();
    wait_until("initial spawn", || manager.pids(None).map(|p| p.len()) == Ok(1)).await;

    manager.scale(&fq("dummy"), "+3").unwrap();
    wait_until("four running", || manager.pids(None).map(|p| p.len()) == Ok(4)).await;
    assert_eq!(
        manager.pids(Some(&fq("dummy"))).unwrap(),
        vec![ProcessId(1), ProcessId(2), ProcessId(3), ProcessId(4)]
    );

    manager.scale(&fq("dummy"), "-2").unwrap();
    wait_until("oldest two reaped", || {
        manager.pids(Some(&fq("dummy"))).map(|p| p == vec![ProcessId(3), ProcessId(4)])
            == Ok(true)
    })
    .await;
    manager.stop().await;
}

#[tokio::test]
async fn signal_propagation_reaches_the_child() {
    let manager = Manager::new();
    // child logs markers for SIGHUP and SIGTERM on stdout
    let config = JobConfig::builder(
        "traps",
        "echo START; trap 'echo HUP' HUP; trap 'echo QUIT; exit 0' TERM; while true; do sleep 0.05; done",
    )
    .shell(true)
    .numprocesses(1)
    .redirect_output(["stdout"])
    .graceful_timeout(2.0)
    .build();
    manager.load(config, None, None, true).unwrap();
    let pid = manager.pids(None).unwrap()[0];

    let handle = manager.get_process(pid).unwrap();
    let (listener, mut rx) = channel_listener();
    handle.monitor_io("stdout", listener).unwrap();

    let mut log = String::new();
    // wait for the trap handlers to be installed
    while !log.contains("START") {
        let (_, payload) = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        log.push_str(&data_text(&payload));
    }

    manager.kill(pid, nix::sys::signal::Signal::SIGHUP).unwrap();
    while !log.contains("HUP") {
        let (_, payload) = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        log.push_str(&data_text(&payload));
    }

    manager.stop_job(&fq("traps")).unwrap();
    while !log.contains("QUIT") {
        let Ok(Some((_, payload))) = timeout(Duration::from_secs(5), rx.recv()).await else {
            break;
        };
        log.push_str(&data_text(&payload));
    }

    let positions: Vec<Option<usize>> =
        ["START", "HUP", "QUIT"].iter().map(|m| log.find(m)).collect();
    assert!(
        positions.windows(2).all(|w| w[0].is_some() && w[0] < w[1]),
        "markers out of order in {log:?}"
    );
    manager.stop().await;
}

#[tokio::test]
async fn flapping_restarts_exactly_max_retry_times() {
    let manager = Manager::new();
    let (listener, mut spawns) = channel_listener();
    manager.events().subscribe("spawn", listener);
    let (flap_listener, mut flaps) = channel_listener();
    manager.events().subscribe("flap", flap_listener);

    let policy = FlappingPolicy { attempts: 1, window: 1.0, retry_in: 0.1, max_retry: 2 };
    manager.load(crasher_config("crash", policy), None, None, true).unwrap();

    // initial spawn plus one per retry
    for _ in 0..3 {
        timeout(Duration::from_secs(5), spawns.recv()).await.expect("missing spawn").unwrap();
    }
    // terminal flap: the job stays stopped
    for _ in 0..3 {
        timeout(Duration::from_secs(5), flaps.recv()).await.expect("missing flap").unwrap();
    }

    sleep(Duration::from_millis(400)).await;
    assert!(
        timeout(Duration::from_millis(100), spawns.recv()).await.is_err(),
        "no further restarts after give-up"
    );
    assert!(manager.pids(None).unwrap().is_empty());
    manager.stop().await;
}

#[tokio::test]
async fn commit_spawns_outside_the_pool() {
    let manager = Manager::new();
    let config = JobConfig::builder("once", "echo one-shot")
        .shell(true)
        .numprocesses(0)
        .graceful_timeout(1.0)
        .build();
    manager.load(config, None, None, true).unwrap();

    let pid = manager.commit(&fq("once"), None, None).unwrap();
    assert_eq!(pid, ProcessId(1));

    wait_until("one-shot exit", || manager.pids(None).map(|p| p.is_empty()) == Ok(true)).await;
    sleep(Duration::from_millis(200)).await;
    assert!(manager.pids(Some(&fq("once"))).unwrap().is_empty(), "no respawn after commit");
    manager.stop().await;
}

#[tokio::test]
async fn load_unload_round_trip_is_identity() {
    let manager = Manager::new();
    let sessions_before = manager.sessions();
    let jobs_before = manager.jobs(None).unwrap();

    manager.load(sleeper_config("dummy", 1), None, None, true).unwrap();
    manager.unload(&fq("dummy")).unwrap();

    assert_eq!(manager.sessions(), sessions_before);
    assert_eq!(manager.jobs(None).unwrap(), jobs_before);
    manager.stop().await;
}

#[tokio::test]
async fn process_ids_are_never_reused() {
    let manager = Manager::new();
    manager.load(sleeper_config("dummy", 1), None, None, true).unwrap();
    wait_until("spawn", || manager.pids(None).map(|p| p.len()) == Ok(1)).await;

    for expected in 2..5u64 {
        let pid = manager.pids(None).unwrap()[0];
        manager.stop_process(pid).unwrap();
        wait_until("respawn with a fresh id", || {
            manager.pids(Some(&fq("dummy"))).map(|p| p == vec![ProcessId(expected)]) == Ok(true)
        })
        .await;
    }
    manager.stop().await;
}

#[tokio::test]
async fn lookup_registry_round_trip() {
    use gaffer_core::lookup::LookupMessage;
    use gaffer_lookupd::Registry;

    let registry = Registry::new();
    let node = registry.add_node();
    let reply = registry.dispatch(
        node,
        &LookupMessage::Identify {
            msgid: "m1".into(),
            name: "node-a".into(),
            origin: "http://10.0.0.1:5000".into(),
            version: "0.1.0".into(),
        },
    );
    assert!(reply.is_ok());

    registry.add_job(node, "default.dummy").unwrap();
    let sources = registry.find_job("default.dummy").unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0]["node"]["origin"], "http://10.0.0.1:5000");

    registry.remove_job(node, "default.dummy").unwrap();
    assert!(registry.find_job("default.dummy").is_err());
}
