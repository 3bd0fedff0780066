// [tests/mirror/apps/agent/engine_lifecycle_test.rs]
//! Cross-module certification of the subprocess lifecycle: argument
//! synthesis, stdout parsing and the single-instance guard against a real
//! (not simulated) child process.

use prospector_agent_lib::cracker;
use prospector_agent_lib::single_instance::SingleInstanceGuard;
use prospector_domain_models::{AgentReportedStatus, TaskAssignmentPayload};
use uuid::Uuid;

fn sample_payload() -> TaskAssignmentPayload {
    TaskAssignmentPayload {
        task_id: Uuid::new_v4(),
        job_execution_id: Uuid::new_v4(),
        hashlist_id: Uuid::new_v4(),
        hashlist_path: "hashlists/demo.txt".into(),
        attack_mode: "dictionary".into(),
        hash_type: 1000,
        keyspace_start: 500,
        keyspace_end: 1500,
        wordlist_paths: vec!["wordlists/rockyou.txt".into()],
        rule_paths: vec!["rules/best64.rule".into()],
        mask: None,
        binary_path: "binaries/hashcat".into(),
        chunk_duration: 1200,
        report_interval: 5,
        extra_parameters: vec!["--force".into()],
        enabled_devices: vec![0, 1],
        effective_keyspace_start: 500,
        effective_keyspace_end: 1500,
    }
}

#[test]
fn build_args_carries_the_skip_limit_window_and_every_referenced_input() {
    let payload = sample_payload();
    let args = cracker::build_args(
        &payload,
        std::path::Path::new("/cache/demo.txt"),
        &["/cache/rockyou.txt".to_string()],
        &["/cache/best64.rule".to_string()],
    );

    assert_eq!(args[0], "-m");
    assert_eq!(args[1], "1000");
    assert_eq!(args[2], "-a");
    assert_eq!(args[3], "0");
    assert_eq!(args[4], "--skip");
    assert_eq!(args[5], "500");
    assert_eq!(args[6], "--limit");
    assert_eq!(args[7], "1500");

    assert!(args.iter().any(|a| a == "-d"));
    assert!(args.contains(&"0".to_string()));
    assert!(args.contains(&"--force".to_string()));
    assert!(args.contains(&"/cache/demo.txt".to_string()));
    assert!(args.contains(&"/cache/rockyou.txt".to_string()));
    assert!(args.contains(&"-r".to_string()));
    assert!(args.contains(&"/cache/best64.rule".to_string()));
}

#[test]
fn a_simulated_engine_session_produces_progress_then_a_terminal_crack() {
    let stdout = [
        r#"{"status":3,"progress":[0,1000],"restore_point":0,"devices":[{"device_id":0,"speed":50000}]}"#,
        r#"{"status":3,"progress":[400,1000],"restore_point":400,"devices":[{"device_id":0,"speed":51000}]}deadbeefcafebabe:hunter2:400"#,
        r#"{"status":5,"progress":[1000,1000],"restore_point":1000,"devices":[],"all_hashes_cracked":true}"#,
    ];

    let parsed: Vec<_> = stdout.iter().map(|line| cracker::parse_line(line)).collect();

    assert!(parsed[0].status.is_some());
    assert!(parsed[0].crack.is_none());

    let mid_crack = parsed[1].crack.as_ref().expect("the mixed status+crack line should yield a crack");
    assert_eq!(mid_crack.hash, "deadbeefcafebabe");
    assert_eq!(mid_crack.plain, "hunter2");
    assert_eq!(mid_crack.crack_pos, Some(400));

    let last = parsed[2].status.as_ref().unwrap();
    assert!(last.all_hashes_cracked);
    assert_eq!(last.processed, last.total);

    assert_eq!(cracker::classify_exit(Some(0), ""), AgentReportedStatus::Completed);
}

#[tokio::test]
async fn single_instance_guard_rejects_a_claim_while_the_real_process_is_alive_and_frees_it_after_termination() {
    let tmp = tempfile::tempdir().unwrap();

    let mut child = tokio::process::Command::new("sleep").arg("30").spawn().expect("the `sleep` binary must be available to model a live cracker process");
    let pid = child.id().expect("a freshly spawned child must have a pid");

    let guard = SingleInstanceGuard::acquire(tmp.path(), "hashcat").unwrap();
    guard.claim(pid).unwrap();

    let blocked = SingleInstanceGuard::acquire(tmp.path(), "hashcat");
    assert_eq!(blocked.unwrap_err(), pid, "a live pid recorded in the pidfile must block a second claim");

    prospector_agent_lib::single_instance::terminate_process(pid).await;
    child.wait().await.ok();

    let reclaimed = SingleInstanceGuard::acquire(tmp.path(), "hashcat");
    assert!(reclaimed.is_ok(), "once the recorded process has exited, the pidfile must be reclaimable");
}
