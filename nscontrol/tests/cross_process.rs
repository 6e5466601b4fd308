//! Multi-process integration tests.
//!
//! Uses `fork()` so the two sides of each test live in different processes
//! and only share the arena:
//! - commands, realtime messages and published state cross the boundary
//! - a child that exits without detaching leaves a connection that the
//!   parent can prune

use nscontrol::{Control, ObserverDelta, Release, ShmControl, remove_arena};
use nscontrol_common::config::SegmentConfig;
use nscontrol_common::shm::layout::ClientType;
use std::time::{Duration, Instant};

fn config(tag: &str) -> SegmentConfig {
    SegmentConfig::named(format!("nsc_xproc_{tag}_{}", std::process::id()))
}

/// Poll `cond` until it holds or `timeout` expires.
fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    false
}

fn wait_child(pid: libc::pid_t) -> i32 {
    let mut status: libc::c_int = 0;
    // SAFETY: waiting on our own child.
    unsafe { libc::waitpid(pid, &mut status, 0) };
    if libc::WIFEXITED(status) {
        libc::WEXITSTATUS(status)
    } else {
        -1
    }
}

/// Engine side of `cross_process_channels`. Returns the exit code.
fn run_engine(config: &SegmentConfig) -> i32 {
    let Ok(engine) = ShmControl::open(config, ClientType::Engine) else {
        return 10;
    };
    if engine.connect().is_err() {
        return 11;
    }

    let mut received = 0;
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if Instant::now() > deadline {
            return 12;
        }
        match engine.read() {
            Ok(Some(command)) if command.as_bytes() == b"quit" => break,
            Ok(Some(_)) => received += 1,
            Ok(None) => std::thread::sleep(Duration::from_millis(1)),
            Err(_) => return 13,
        }
    }

    let replied = engine.write(format!("ack {received}").as_bytes());
    let rt = engine.write_rt(b"frame 1");
    let state = engine
        .set_observer(&ObserverDelta {
            latitude: Some(51.48),
            longitude: Some(0.0),
            ..Default::default()
        })
        .and_then(|_| engine.publish());
    if replied.is_err() || rt.is_err() || state.is_err() {
        return 14;
    }
    match engine.close() {
        Ok(Release::Detached { .. }) => 0,
        _ => 15,
    }
}

#[test]
fn cross_process_channels() {
    let config = config("channels");
    let console = ShmControl::open(&config, ClientType::Console).expect("parent: open");
    console.connect().expect("parent: connect");

    // Safety: fork() is unsafe but this is a controlled test environment.
    let pid = unsafe { libc::fork() };
    if pid == 0 {
        // ── CHILD PROCESS (engine) ──
        let code = run_engine(&config);
        // Skip destructors inherited from the parent.
        unsafe { libc::_exit(code) };
    }

    // ── PARENT PROCESS (console) ──
    assert!(pid > 0, "fork failed");
    assert!(
        wait_until(Duration::from_secs(5), || {
            console.stats().map(|s| s.connections == 2).unwrap_or(false)
        }),
        "timeout waiting for the engine to connect"
    );

    for i in 0..3 {
        assert_eq!(console.write(format!("cmd {i}").as_bytes()).unwrap(), 1);
    }
    console.write(b"quit").unwrap();

    let mut reply = None;
    assert!(
        wait_until(Duration::from_secs(5), || {
            reply = console.read().unwrap();
            reply.is_some()
        }),
        "no reply from the engine"
    );
    assert_eq!(reply.unwrap().to_text(), "ack 3");

    assert_eq!(wait_child(pid), 0, "engine child failed");

    assert_eq!(console.read_rt().unwrap().unwrap().to_text(), "frame 1");
    assert_eq!(console.observer().unwrap().latitude, 51.48);

    let stats = console.stats().unwrap();
    assert_eq!(stats.ref_count, 1);
    assert_eq!(stats.connections, 1);
    assert_eq!(console.close().unwrap(), Release::Destroyed);
    assert!(!config.path().exists());
}

#[test]
fn cross_process_dead_connection_pruned() {
    let config = config("prune");
    let engine = ShmControl::open(&config, ClientType::Engine).expect("parent: open");

    // Safety: see above.
    let pid = unsafe { libc::fork() };
    if pid == 0 {
        // ── CHILD PROCESS: attach, connect, exit without detaching ──
        let code = match ShmControl::open(&config, ClientType::Console) {
            Ok(console) => {
                let code = if console.connect().is_ok() { 0 } else { 2 };
                std::mem::forget(console);
                code
            }
            Err(_) => 1,
        };
        unsafe { libc::_exit(code) };
    }

    assert!(pid > 0, "fork failed");
    assert_eq!(wait_child(pid), 0, "child failed");

    let stats = engine.stats().unwrap();
    assert_eq!(stats.connections, 1);
    assert_eq!(stats.ref_count, 2);

    assert_eq!(engine.prune_dead().unwrap(), 1);
    assert_eq!(engine.stats().unwrap().connections, 0);

    // The leaked reference keeps the arena alive; remove it explicitly.
    assert_eq!(engine.close().unwrap(), Release::Detached { remaining: 1 });
    assert!(remove_arena(&config).unwrap());
}
