use std::path::PathBuf;
use std::process::Command;

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_coursecast")
}

fn sample(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("data/sample")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

fn with_sample_data(command: &mut Command) -> &mut Command {
    command
        .env_remove("COURSECAST_CONFIG")
        .env("COURSECAST_LOG", "warn")
        .args(["--courses", &sample("courses.csv")])
        .args(["--z-table", &sample("z_table.csv")])
}

#[test]
fn optimize_command_dispatches_and_emits_json() {
    let output = with_sample_data(&mut Command::new(bin()))
        .args(["optimize", &sample("optimize_request.json")])
        .output()
        .expect("optimize should run");

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let payload: serde_json::Value =
        serde_json::from_str(&stdout).expect("optimize should emit json");
    assert_eq!(payload["status"], "Optimal");
    assert_eq!(payload["selection"].as_array().map(Vec::len), Some(7));
}

#[test]
fn simulate_command_dispatches_and_emits_json() {
    let output = with_sample_data(&mut Command::new(bin()))
        .args(["simulate", &sample("simulate_request.json"), "--workers", "2", "--progress"])
        .output()
        .expect("simulate should run");

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let payload: serde_json::Value =
        serde_json::from_str(&stdout).expect("simulate should emit json");
    assert_eq!(payload["total_runs"], 25);
    assert_eq!(payload["per_item"].as_array().map(Vec::len), Some(7));
}

#[test]
fn price_command_prints_csv() {
    let output = with_sample_data(&mut Command::new(bin()))
        .args(["price", "3", "1", "10"])
        .output()
        .expect("price should run");

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], "id,section_id,price");
    assert_eq!(lines[2], "10,STAT6130001,0.00");
}

#[test]
fn tokens_command_lists_time_slots() {
    let output = with_sample_data(&mut Command::new(bin()))
        .args(["tokens", "7"])
        .output()
        .expect("tokens should run");

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "7\tLGST8060001\tq3RE q3RF q4RE q4RF");
}

#[test]
fn validate_command_accepts_sample_data() {
    let output = with_sample_data(&mut Command::new(bin()))
        .arg("validate")
        .output()
        .expect("validate should run");

    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("ok: 12 courses"));
}

#[test]
fn validate_command_returns_non_zero_on_invalid_data() {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    std::io::Write::write_all(
        &mut file,
        b"uniqueid,primary_section_id,part_of_term,days_code,start_time_24hr,stop_time_24hr,credit_unit,price_predicted,resid_mean,resid_stdev\n1,ACCT6110001,1,MW,08:30,10:00,12,100,0,1\n",
    )
    .unwrap();

    let output = Command::new(bin())
        .env_remove("COURSECAST_CONFIG")
        .args(["--courses", &file.path().to_string_lossy()])
        .args(["--z-table", &sample("z_table.csv")])
        .arg("validate")
        .output()
        .expect("validate should run");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("credit weight 12"));
}

#[test]
fn unknown_command_returns_usage_error() {
    let output = Command::new(bin())
        .arg("serve")
        .output()
        .expect("binary should run");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn missing_request_file_fails() {
    let output = with_sample_data(&mut Command::new(bin()))
        .args(["optimize", "no-such-request.json"])
        .output()
        .expect("optimize should run");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no-such-request.json"));
}
