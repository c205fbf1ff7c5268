//! End-to-end lifecycle tests driving real `/bin/sh` children

#![cfg(unix)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use subproc::{OutputSink, ProcessSpec, Subprocess};

fn init_logs() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn collecting_sink() -> (Arc<Mutex<Vec<u8>>>, OutputSink) {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let clone = buf.clone();
    let sink: OutputSink = Box::new(move |chunk: &[u8]| {
        clone.lock().unwrap().extend_from_slice(chunk);
    });
    (buf, sink)
}

fn bytes(buf: &Arc<Mutex<Vec<u8>>>) -> Vec<u8> {
    buf.lock().unwrap().clone()
}

/// Run a spec to completion, returning (exit code, stdout, stderr)
fn run(spec: &ProcessSpec) -> (i32, Vec<u8>, Vec<u8>) {
    init_logs();
    let (stdout, stdout_sink) = collecting_sink();
    let (stderr, stderr_sink) = collecting_sink();

    let process = Subprocess::new();
    process.start(spec, stdout_sink, stderr_sink).unwrap();
    let code = process.join();
    assert!(!process.joinable());

    (code, bytes(&stdout), bytes(&stderr))
}

#[test]
fn echo_hello_reaches_stdout_sink() {
    let (code, stdout, stderr) = run(&ProcessSpec::shell("echo hello"));
    assert_eq!(code, 0);
    assert_eq!(stdout, b"hello\n");
    assert!(stderr.is_empty());
}

#[test]
fn declared_exit_codes_are_surfaced_exactly() {
    for n in [0, 1, 3, 42, 255] {
        let (code, stdout, stderr) = run(&ProcessSpec::shell(format!("exit {n}")));
        assert_eq!(code, n);
        assert!(stdout.is_empty());
        assert!(stderr.is_empty());
    }
}

#[test]
fn stderr_goes_to_the_stderr_sink_only() {
    let (code, stdout, stderr) = run(&ProcessSpec::shell("echo hello >&2"));
    assert_eq!(code, 0);
    assert!(stdout.is_empty());
    assert_eq!(stderr, b"hello\n");
}

#[test]
fn stdout_chunks_concatenate_in_read_order() {
    // A small chunk size forces many sink invocations over one stream.
    let spec = ProcessSpec::shell("seq 1 200").with_chunk_size(7);
    let (code, stdout, stderr) = run(&spec);

    let expected: String = (1..=200).map(|i| format!("{i}\n")).collect();
    assert_eq!(code, 0);
    assert_eq!(String::from_utf8(stdout).unwrap(), expected);
    assert!(stderr.is_empty());
}

#[test]
fn facade_is_reusable_after_join() {
    init_logs();
    let (stdout, stdout_sink) = collecting_sink();
    let (_, stderr_sink) = collecting_sink();

    let process = Subprocess::new();
    process
        .start(&ProcessSpec::shell("echo hello"), stdout_sink, stderr_sink)
        .unwrap();
    assert_eq!(process.join(), 0);
    assert!(!process.joinable());
    assert_eq!(bytes(&stdout), b"hello\n");

    // Second run on the same façade behaves like a fresh instance.
    let (stdout2, stdout_sink2) = collecting_sink();
    let (_, stderr_sink2) = collecting_sink();
    process
        .start(&ProcessSpec::shell("echo again"), stdout_sink2, stderr_sink2)
        .unwrap();
    assert_eq!(process.join(), 0);
    assert_eq!(bytes(&stdout2), b"again\n");
    // No state from the first run leaked into the first sink.
    assert_eq!(bytes(&stdout), b"hello\n");
}

#[test]
fn stdin_roundtrip_through_cat() {
    init_logs();
    let (stdout, stdout_sink) = collecting_sink();
    let (stderr, stderr_sink) = collecting_sink();

    let process = Subprocess::new();
    process
        .start(&ProcessSpec::shell("cat"), stdout_sink, stderr_sink)
        .unwrap();

    assert!(process.stdin_write(b"ping\n"));
    assert!(process.stdin_write(b"pong\n"));
    process.stdin_close();

    assert_eq!(process.join(), 0);
    assert_eq!(bytes(&stdout), b"ping\npong\n");
    assert!(bytes(&stderr).is_empty());
}

#[test]
fn stdin_write_fails_after_close_and_when_idle() {
    init_logs();
    let idle = Subprocess::new();
    assert!(!idle.stdin_write(b"nobody home"));

    let (_, stdout_sink) = collecting_sink();
    let (_, stderr_sink) = collecting_sink();
    let process = Subprocess::new();
    process
        .start(&ProcessSpec::shell("cat"), stdout_sink, stderr_sink)
        .unwrap();

    process.stdin_close();
    assert!(!process.stdin_write(b"too late"));
    process.stdin_close(); // idempotent

    assert_eq!(process.join(), 0);
}

#[test]
fn kill_unblocks_join_and_prevents_later_side_effects() {
    init_logs();
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("failed.txt");
    let cmdline = format!("sleep 2 && echo done > {}", marker.display());

    let (stdout, stdout_sink) = collecting_sink();
    let (stderr, stderr_sink) = collecting_sink();

    let process = Subprocess::new();
    process
        .start(&ProcessSpec::shell(cmdline), stdout_sink, stderr_sink)
        .unwrap();

    thread::scope(|s| {
        let joiner = s.spawn(|| process.join());

        thread::sleep(Duration::from_millis(500));
        process.kill();
        assert!(!process.joinable());

        // The join raced from the other thread must come back promptly
        // now that the process is dead.
        let killed_at = Instant::now();
        let code = joiner.join().unwrap();
        assert!(killed_at.elapsed() < Duration::from_secs(1));
        assert_ne!(code, 0, "killed process must not report success");
    });

    // Give the scheduled side effect time to have fired if the child's
    // process group had survived the kill.
    thread::sleep(Duration::from_millis(2200));
    assert!(!marker.exists(), "kill must prevent the post-sleep write");
    assert!(bytes(&stdout).is_empty());
    assert!(bytes(&stderr).is_empty());
}

#[test]
fn kill_alone_makes_facade_reusable() {
    init_logs();
    let (_, stdout_sink) = collecting_sink();
    let (_, stderr_sink) = collecting_sink();

    let process = Subprocess::new();
    process
        .start(&ProcessSpec::shell("sleep 30"), stdout_sink, stderr_sink)
        .unwrap();
    assert!(process.joinable());

    process.kill();
    assert!(!process.joinable());

    let (stdout, stdout_sink) = collecting_sink();
    let (_, stderr_sink) = collecting_sink();
    process
        .start(&ProcessSpec::shell("echo back"), stdout_sink, stderr_sink)
        .unwrap();
    assert_eq!(process.join(), 0);
    assert_eq!(bytes(&stdout), b"back\n");
}

#[test]
fn moving_a_facade_transfers_joinability() {
    init_logs();
    let (_, stdout_sink) = collecting_sink();
    let (_, stderr_sink) = collecting_sink();

    let original = Subprocess::new();
    original
        .start(&ProcessSpec::shell("exit 5"), stdout_sink, stderr_sink)
        .unwrap();

    // A Rust move transfers the owned process; the source binding is gone.
    let moved = original;
    assert!(moved.joinable());

    let code = thread::spawn(move || {
        let code = moved.join();
        assert!(!moved.joinable());
        code
    })
    .join()
    .unwrap();
    assert_eq!(code, 5);
}

#[test]
fn joinable_does_not_block_behind_a_long_join() {
    init_logs();
    let (_, stdout_sink) = collecting_sink();
    let (_, stderr_sink) = collecting_sink();

    let process = Subprocess::new();
    process
        .start(&ProcessSpec::shell("sleep 1"), stdout_sink, stderr_sink)
        .unwrap();

    thread::scope(|s| {
        let joiner = s.spawn(|| process.join());

        thread::sleep(Duration::from_millis(100));
        let probe = Instant::now();
        assert!(process.joinable());
        assert!(process.stdin_write(b"ignored by sleep"));
        assert!(
            probe.elapsed() < Duration::from_millis(500),
            "snapshot operations must not wait for the join to finish"
        );

        assert_eq!(joiner.join().unwrap(), 0);
    });
    assert!(!process.joinable());
}
