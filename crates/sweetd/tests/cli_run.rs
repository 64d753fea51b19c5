use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn sweetd(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sweetd"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to run sweetd")
}

fn event_types(journal: &str) -> Vec<String> {
    journal
        .lines()
        .map(|line| {
            let entry: Value = serde_json::from_str(line).expect("audit line is JSON");
            entry["event_type"].as_str().unwrap_or_default().to_string()
        })
        .collect()
}

#[test]
fn simulated_run_writes_audit_journal() {
    let dir = tempfile::tempdir().unwrap();
    let audit = dir.path().join("audit.jsonl");

    let output = sweetd(&[
        "--simulate",
        "--self-test",
        "--run-seconds",
        "2",
        "--audit-log",
        audit.to_str().unwrap(),
    ]);
    assert!(
        output.status.success(),
        "sweetd failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let journal = fs::read_to_string(&audit).unwrap();
    let events = event_types(&journal);

    assert_eq!(events.first().map(String::as_str), Some("machine_start"));
    assert_eq!(events.last().map(String::as_str), Some("machine_stop"));
    assert!(events.iter().any(|e| e == "self_test"));
    assert!(!events.iter().any(|e| e == "worker_fault"));

    let started = events.iter().filter(|e| *e == "touch_started").count();
    let ended = events.iter().filter(|e| *e == "touch_ended").count();
    assert!(started >= 1, "no touches recorded:\n{journal}");
    assert!(started == ended || started == ended + 1);

    let stop: Value = serde_json::from_str(journal.lines().last().unwrap()).unwrap();
    assert_eq!(stop["details"]["clean"], true);
    assert_eq!(
        stop["details"]["touch_events"].as_u64(),
        Some((started + ended) as u64)
    );
}

#[test]
fn hardware_run_without_a_board_fails() {
    let output = sweetd(&["--run-seconds", "1"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Hardware subsystem unavailable"), "{stderr}");
}

#[test]
fn bad_arguments_exit_with_failure() {
    assert_eq!(sweetd(&["--bogus"]).status.code(), Some(1));
    assert_eq!(sweetd(&["--touch-pin", "x"]).status.code(), Some(1));
    assert_eq!(
        sweetd(&["--simulate", "--buzzer-pin", "27", "--run-seconds", "1"])
            .status
            .code(),
        Some(1)
    );
}

#[test]
fn help_exits_cleanly() {
    let output = sweetd(&["--help"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("USAGE"));
}

fn wait_for_event(journal: &Path, event: &str, within: Duration) -> bool {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        let content = fs::read_to_string(journal).unwrap_or_default();
        if content.contains(&format!(r#""event_type":"{event}""#)) {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    false
}

#[cfg(unix)]
#[test]
fn termination_signal_stops_the_machine_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let audit = dir.path().join("audit.jsonl");

    let mut child = Command::new(env!("CARGO_BIN_EXE_sweetd"))
        .args(["--simulate", "--audit-log", audit.to_str().unwrap()])
        .env("RUST_LOG", "warn")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to start sweetd");

    if !wait_for_event(&audit, "machine_start", Duration::from_secs(5)) {
        let _ = child.kill();
        panic!("sweetd never reported machine_start");
    }

    let status = Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .status()
        .expect("Failed to send SIGTERM");
    assert!(status.success());

    let deadline = Instant::now() + Duration::from_secs(5);
    let exit = loop {
        if let Some(exit) = child.try_wait().unwrap() {
            break exit;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("sweetd did not exit after SIGTERM");
        }
        thread::sleep(Duration::from_millis(20));
    };
    assert!(exit.success());

    let journal = fs::read_to_string(&audit).unwrap();
    let stop: Value = serde_json::from_str(journal.lines().last().unwrap()).unwrap();
    assert_eq!(stop["event_type"], "machine_stop");
    assert_eq!(stop["details"]["clean"], true);
}
