// [apps/agent/src/cracker.rs]
//! Subprocess lifecycle for the external cracking engine: argument
//! synthesis from a task assignment, line-oriented stdout parsing, and
//! exit-code classification into an `AgentReportedStatus`.

use prospector_domain_models::{AgentReportedStatus, CrackedEntry, DeviceMetrics, TaskAssignmentPayload};
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Hashcat-style attack-mode codes. The engine is invoked as an external
/// subprocess speaking this CLI dialect; nothing upstream of this module
/// needs to know it.
fn attack_mode_code(attack_mode: &str) -> &'static str {
    match attack_mode {
        "dictionary" => "0",
        "combination" => "1",
        "mask" => "3",
        "hybrid-wordlist-mask" => "6",
        "hybrid-mask-wordlist" => "7",
        _ => "0",
    }
}

/// Builds the engine's argv from a task assignment and the locally
/// resolved paths for every referenced input file. A reconnect within
/// the grace period never needs a local resume offset: the coordinator
/// recomputes `keyspace_start` from the chunk's recorded progress before
/// resending the assignment, so the agent always starts exactly where
/// this payload says to.
pub fn build_args(payload: &TaskAssignmentPayload, local_hashlist: &Path, local_wordlists: &[String], local_rules: &[String]) -> Vec<String> {
    let mut args = vec![
        "-m".to_string(),
        payload.hash_type.to_string(),
        "-a".to_string(),
        attack_mode_code(&payload.attack_mode).to_string(),
        "--skip".to_string(),
        payload.keyspace_start.to_string(),
        "--limit".to_string(),
        payload.keyspace_end.to_string(),
        "--status".to_string(),
        "--status-json".to_string(),
        "--status-timer".to_string(),
        payload.report_interval.to_string(),
    ];

    if let Some(mask) = &payload.mask {
        args.push(mask.clone());
    }

    for device in &payload.enabled_devices {
        args.push("-d".to_string());
        args.push(device.to_string());
    }

    args.extend(payload.extra_parameters.iter().cloned());

    args.push(local_hashlist.display().to_string());
    args.extend(local_wordlists.iter().cloned());

    for rule in local_rules {
        args.push("-r".to_string());
        args.push(rule.clone());
    }

    args
}

pub fn spawn(binary_path: &Path, args: &[String]) -> std::io::Result<Child> {
    Command::new(binary_path)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
}

#[derive(Debug, Deserialize)]
struct EngineStatusLine {
    status: i32,
    progress: [u64; 2],
    #[serde(default)]
    restore_point: Option<u64>,
    #[serde(default)]
    devices: Vec<EngineDeviceStatus>,
    #[serde(default)]
    all_hashes_cracked: bool,
}

#[derive(Debug, Deserialize)]
struct EngineDeviceStatus {
    device_id: u32,
    speed: u64,
    #[serde(default)]
    temp: Option<f32>,
    #[serde(default)]
    util: Option<f32>,
    #[serde(default)]
    fan: Option<f32>,
}

/// One parsed unit of the engine's stdout: a status snapshot, a cracked
/// (hash, plaintext) pair, or both when a physical line carries both.
pub struct ParsedLine {
    pub status: Option<EngineProgress>,
    pub crack: Option<CrackedEntry>,
}

pub struct EngineProgress {
    pub processed: u64,
    pub total: u64,
    pub restore_point: Option<u64>,
    pub devices: Vec<DeviceMetrics>,
    pub all_hashes_cracked: bool,
}

/// Splits a raw stdout line into its JSON-status part and/or its crack
/// part. A leading `{` marks a status object; the parser walks brace
/// depth to find where the JSON object ends, since a status object and a
/// crack line can land concatenated on one physical line.
pub fn parse_line(line: &str) -> ParsedLine {
    let line = line.trim();
    if line.is_empty() {
        return ParsedLine { status: None, crack: None };
    }

    if !line.starts_with('{') {
        return ParsedLine { status: None, crack: Some(parse_crack_line(line)) };
    }

    let mut depth = 0i32;
    for (idx, ch) in line.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let json_part = &line[..=idx];
                    let remainder = line[idx + 1..].trim();
                    let status = serde_json::from_str::<EngineStatusLine>(json_part).ok().map(|raw| EngineProgress {
                        processed: raw.progress[0],
                        total: raw.progress[1],
                        restore_point: raw.restore_point,
                        all_hashes_cracked: raw.all_hashes_cracked,
                        devices: raw
                            .devices
                            .into_iter()
                            .map(|d| DeviceMetrics {
                                device_id: d.device_id,
                                hashrate: d.speed,
                                temperature_celsius: d.temp,
                                utilization_percent: d.util,
                                fan_speed_percent: d.fan,
                            })
                            .collect(),
                    });
                    let crack = if remainder.is_empty() { None } else { Some(parse_crack_line(remainder)) };
                    return ParsedLine { status, crack };
                }
            }
            _ => {}
        }
    }

    // Unterminated JSON on this line; not a recognizable status object.
    ParsedLine { status: None, crack: None }
}

/// Parses a `hash:plaintext[:position]` crack line. The trailing
/// `:position` segment is only recognized when it parses as an integer,
/// since the plaintext itself may legitimately contain colons.
fn parse_crack_line(line: &str) -> CrackedEntry {
    let (hash, remainder) = line.split_once(':').unwrap_or((line, ""));

    if let Some((plain, position)) = remainder.rsplit_once(':') {
        if let Ok(crack_pos) = position.parse::<u64>() {
            return CrackedEntry { hash: hash.to_string(), plain: plain.to_string(), crack_pos: Some(crack_pos) };
        }
    }

    CrackedEntry { hash: hash.to_string(), plain: remainder.to_string(), crack_pos: None }
}

/// Maps the engine's exit status (and, for the ambiguous 255/-1 case,
/// whether stderr mentions an existing instance) to the reported status
/// that gets carried in the terminal `task_progress` message.
pub fn classify_exit(code: Option<i32>, stderr_tail: &str) -> AgentReportedStatus {
    match code {
        Some(0) => AgentReportedStatus::Completed,
        Some(1) => AgentReportedStatus::ExhaustedNoCracks,
        Some(c) if (2..=5).contains(&c) => AgentReportedStatus::Aborted,
        Some(-2) => AgentReportedStatus::GpuWatchdogAlarm,
        Some(255) | Some(-1) if stderr_tail.contains("Already an instance") => AgentReportedStatus::AlreadyRunningRetryable,
        _ => AgentReportedStatus::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_plain_crack_line() {
        let parsed = parse_line("5f4dcc3b5aa765d61d8327deb882cf99:password");
        let crack = parsed.crack.unwrap();
        assert_eq!(crack.hash, "5f4dcc3b5aa765d61d8327deb882cf99");
        assert_eq!(crack.plain, "password");
        assert_eq!(crack.crack_pos, None);
    }

    #[test]
    fn parses_a_crack_line_with_position() {
        let parsed = parse_line("deadbeef:letmein:42");
        let crack = parsed.crack.unwrap();
        assert_eq!(crack.plain, "letmein");
        assert_eq!(crack.crack_pos, Some(42));
    }

    #[test]
    fn parses_a_status_json_line() {
        let parsed = parse_line(r#"{"status":3,"progress":[500,1000],"restore_point":500,"devices":[{"device_id":0,"speed":123456,"temp":65.5}]}"#);
        let status = parsed.status.unwrap();
        assert_eq!(status.processed, 500);
        assert_eq!(status.total, 1000);
        assert_eq!(status.devices.len(), 1);
        assert_eq!(status.devices[0].hashrate, 123456);
        assert!(parsed.crack.is_none());
    }

    #[test]
    fn splits_a_mixed_status_and_crack_line() {
        let parsed = parse_line(r#"{"status":3,"progress":[1,2],"restore_point":1,"devices":[]}deadbeef:hunter2"#);
        assert!(parsed.status.is_some());
        let crack = parsed.crack.unwrap();
        assert_eq!(crack.hash, "deadbeef");
        assert_eq!(crack.plain, "hunter2");
    }

    #[test]
    fn exit_code_zero_is_completed() {
        assert_eq!(classify_exit(Some(0), ""), AgentReportedStatus::Completed);
    }

    #[test]
    fn exit_code_one_is_exhausted_without_cracks() {
        assert_eq!(classify_exit(Some(1), ""), AgentReportedStatus::ExhaustedNoCracks);
    }

    #[test]
    fn already_running_stderr_is_retryable() {
        assert_eq!(classify_exit(Some(255), "clGetPlatformIDs... Already an instance is running"), AgentReportedStatus::AlreadyRunningRetryable);
    }

    #[test]
    fn unmatched_255_without_marker_is_failed() {
        assert_eq!(classify_exit(Some(255), "segfault"), AgentReportedStatus::Failed);
    }

    #[test]
    fn gpu_watchdog_alarm_maps_correctly() {
        assert_eq!(classify_exit(Some(-2), ""), AgentReportedStatus::GpuWatchdogAlarm);
    }
}
