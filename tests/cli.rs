use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tempfile::TempDir;

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_goalforge"))
}

fn command(dir: &TempDir, args: &[&str]) -> Command {
    let mut cmd = Command::new(bin_path());
    cmd.arg("--home").arg(dir.path());
    cmd.env_remove("GOALFORGE_API_URL")
        .env_remove("GOALFORGE_TIMEOUT_MS")
        .env_remove("GOALFORGE_LOG");
    cmd.args(args);
    cmd
}

fn run_cmd(dir: &TempDir, args: &[&str], input: Option<&str>) -> Output {
    let mut cmd = command(dir, args);
    cmd.stdin(if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = cmd.spawn().expect("spawn command");
    if let Some(input) = input {
        let mut stdin = child.stdin.take().expect("stdin");
        stdin.write_all(input.as_bytes()).expect("write stdin");
    }
    child.wait_with_output().expect("wait output")
}

fn output_stdout(output: Output) -> String {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("stdout utf8")
}

fn output_stderr(output: Output) -> String {
    assert!(!output.status.success(), "command unexpectedly succeeded");
    String::from_utf8(output.stderr).expect("stderr utf8")
}

fn parse_created_id(stdout: &str, prefix: &str) -> i64 {
    let line = stdout
        .lines()
        .find(|line| line.starts_with(prefix))
        .unwrap_or_else(|| panic!("missing '{prefix}' in output: {stdout}"));
    let rest = line.strip_prefix(prefix).expect("prefix");
    let id_str = rest
        .split(|ch: char| ch == ':' || ch.is_whitespace())
        .next()
        .expect("id");
    id_str.parse().expect("id parse")
}

fn create_goal(dir: &TempDir, title: &str, category: &str) -> i64 {
    let stdout = output_stdout(run_cmd(
        dir,
        &["goal", "add", title, "--category", category],
        None,
    ));
    parse_created_id(&stdout, "Created goal ID: ")
}

fn create_roadmap(dir: &TempDir, goal_id: i64, steps: &[&str]) -> i64 {
    let goal_id = goal_id.to_string();
    let mut args = vec!["roadmap", "add", goal_id.as_str(), "Roadmap"];
    for step in steps {
        args.push("--step");
        args.push(step);
    }
    let stdout = output_stdout(run_cmd(dir, &args, None));
    parse_created_id(&stdout, "Created roadmap ID: ")
}

fn step_ids(dir: &TempDir, goal_id: i64) -> Vec<i64> {
    let stdout = output_stdout(run_cmd(
        dir,
        &["roadmap", "show", &goal_id.to_string()],
        None,
    ));
    stdout
        .lines()
        .filter_map(|line| line.trim_end().strip_suffix(')'))
        .filter_map(|line| line.rsplit_once("(step id "))
        .map(|(_, id)| id.parse().expect("step id"))
        .collect()
}

fn goal_status(dir: &TempDir, goal_id: i64) -> String {
    let stdout = output_stdout(run_cmd(dir, &["goal", "show", &goal_id.to_string()], None));
    stdout
        .lines()
        .find_map(|line| line.strip_prefix("Status: "))
        .expect("status line")
        .to_string()
}

#[test]
fn goal_lifecycle_round_trip() {
    let dir = TempDir::new().expect("temp dir");
    let goal_id = create_goal(&dir, "Run a marathon", "fitness");
    create_goal(&dir, "Read 20 books", "learning");

    let stdout = output_stdout(run_cmd(&dir, &["goal", "list", "--category", "fit"], None));
    assert!(stdout.contains("Run a marathon"));
    assert!(!stdout.contains("Read 20 books"));
    assert!(stdout.contains("Page 1 (1 of 1 goals)"));

    let stdout = output_stdout(run_cmd(
        &dir,
        &[
            "goal",
            "update",
            &goal_id.to_string(),
            "--title",
            "Run a half marathon",
            "--priority",
            "high",
            "--deadline",
            "2030-06-01",
        ],
        None,
    ));
    assert!(stdout.contains(&format!("Updated goal {goal_id}.")));

    let stdout = output_stdout(run_cmd(&dir, &["goal", "show", &goal_id.to_string()], None));
    assert!(stdout.contains("Title: Run a half marathon"));
    assert!(stdout.contains("Priority: high"));
    assert!(stdout.contains("Deadline: 2030-06-01"));
    assert!(stdout.contains("Roadmap: (none)"));

    let stdout = output_stdout(run_cmd(
        &dir,
        &["goal", "status", &goal_id.to_string(), "paused"],
        None,
    ));
    assert!(stdout.contains("status set to paused"));

    let stdout = output_stdout(run_cmd(&dir, &["goal", "stats"], None));
    assert!(stdout.contains("Total: 2"));
    assert!(stdout.contains("In progress: 1"));

    output_stdout(run_cmd(&dir, &["goal", "remove", &goal_id.to_string()], None));
    let stderr = output_stderr(run_cmd(&dir, &["goal", "show", &goal_id.to_string()], None));
    assert!(stderr.contains("Goal not found"));
}

#[test]
fn blank_title_is_rejected() {
    let dir = TempDir::new().expect("temp dir");
    let stderr = output_stderr(run_cmd(
        &dir,
        &["goal", "add", "   ", "--category", "misc"],
        None,
    ));
    assert!(stderr.contains("Error: Invalid input: goal title cannot be empty"));
}

#[test]
fn failures_are_reported_once() {
    let dir = TempDir::new().expect("temp dir");
    let stderr = output_stderr(run_cmd(&dir, &["goal", "show", "9999"], None));
    assert_eq!(stderr.trim_end(), "Error: Not found: Goal not found");

    let stderr = output_stderr(run_cmd(&dir, &["step", "toggle", "9999"], None));
    assert_eq!(stderr.trim_end(), "Error: Not found: Step not found");
}

#[test]
fn goal_update_can_clear_optional_fields() {
    let dir = TempDir::new().expect("temp dir");
    let goal_id = create_goal(&dir, "Trip", "travel").to_string();
    output_stdout(run_cmd(
        &dir,
        &[
            "goal",
            "update",
            &goal_id,
            "--description",
            "Book flights",
            "--deadline",
            "2030-06-01",
        ],
        None,
    ));
    let stdout = output_stdout(run_cmd(&dir, &["goal", "show", &goal_id], None));
    assert!(stdout.contains("Description: Book flights"));
    assert!(stdout.contains("Deadline: 2030-06-01"));

    output_stdout(run_cmd(
        &dir,
        &["goal", "update", &goal_id, "--clear-description", "--clear-deadline"],
        None,
    ));
    let stdout = output_stdout(run_cmd(&dir, &["goal", "show", &goal_id], None));
    assert!(!stdout.contains("Description:"));
    assert!(!stdout.contains("Deadline:"));
    assert!(stdout.contains("Title: Trip"));
}

#[test]
fn toggling_all_steps_completes_goal_and_reverts_on_untoggle() {
    let dir = TempDir::new().expect("temp dir");
    let goal_id = create_goal(&dir, "Learn Rust", "learning");
    create_roadmap(&dir, goal_id, &["Read the book", "Write a CLI"]);
    let steps = step_ids(&dir, goal_id);
    assert_eq!(steps.len(), 2);

    let stdout = output_stdout(run_cmd(&dir, &["step", "toggle", &steps[0].to_string()], None));
    assert!(stdout.contains("marked done"));
    assert!(!stdout.contains("auto-updated"));
    assert_eq!(goal_status(&dir, goal_id), "in-progress");

    let stdout = output_stdout(run_cmd(&dir, &["step", "toggle", &steps[1].to_string()], None));
    assert!(stdout.contains("Goal status auto-updated from in-progress to completed."));
    assert_eq!(goal_status(&dir, goal_id), "completed");

    let stdout = output_stdout(run_cmd(&dir, &["step", "toggle", &steps[1].to_string()], None));
    assert!(stdout.contains("Goal status auto-updated from completed to in-progress."));
    assert_eq!(goal_status(&dir, goal_id), "in-progress");

    let stdout = output_stdout(run_cmd(&dir, &["roadmap", "show", &goal_id.to_string()], None));
    assert!(stdout.contains("Progress: 50% (1/2 steps)"));
}

#[test]
fn removing_the_only_step_keeps_completed_status() {
    let dir = TempDir::new().expect("temp dir");
    let goal_id = create_goal(&dir, "Ship it", "work");
    create_roadmap(&dir, goal_id, &["Deploy"]);
    let step_id = step_ids(&dir, goal_id)[0].to_string();

    output_stdout(run_cmd(&dir, &["step", "toggle", &step_id], None));
    assert_eq!(goal_status(&dir, goal_id), "completed");

    let stdout = output_stdout(run_cmd(&dir, &["step", "remove", &step_id], None));
    assert!(stdout.contains(&format!("Step ID: {step_id} removed.")));
    assert!(!stdout.contains("auto-updated"));
    assert_eq!(goal_status(&dir, goal_id), "completed");
}

#[test]
fn steps_append_and_reorder() {
    let dir = TempDir::new().expect("temp dir");
    let goal_id = create_goal(&dir, "Garden", "home");
    let roadmap_id = create_roadmap(&dir, goal_id, &["Dig", "Plant"]).to_string();

    let stdout = output_stdout(run_cmd(&dir, &["step", "add", &roadmap_id, "Water"], None));
    let water = parse_created_id(&stdout, "Created step ID: ");
    let steps = step_ids(&dir, goal_id);
    assert_eq!(steps.len(), 3);
    assert_eq!(steps[2], water);

    let orders = [
        format!("{water}:0"),
        format!("{}:1", steps[0]),
        format!("{}:2", steps[1]),
    ];
    let stdout = output_stdout(run_cmd(
        &dir,
        &["step", "reorder", &roadmap_id, &orders[0], &orders[1], &orders[2]],
        None,
    ));
    assert!(stdout.contains("Reordered 3 steps"));
    assert_eq!(step_ids(&dir, goal_id), vec![water, steps[0], steps[1]]);
}

#[test]
fn second_roadmap_for_goal_is_rejected() {
    let dir = TempDir::new().expect("temp dir");
    let goal_id = create_goal(&dir, "Focus", "misc");
    create_roadmap(&dir, goal_id, &[]);
    let stderr = output_stderr(run_cmd(
        &dir,
        &["roadmap", "add", &goal_id.to_string(), "Again"],
        None,
    ));
    assert!(stderr.contains("already has a roadmap"));

    let stderr = output_stderr(run_cmd(&dir, &["roadmap", "show", "9999"], None));
    assert!(stderr.contains("No roadmap for this goal"));
}

#[test]
fn follow_search_reads_terms_from_stdin() {
    let dir = TempDir::new().expect("temp dir");
    create_goal(&dir, "Swim weekly", "fitness");
    create_goal(&dir, "Learn piano", "music");

    let stdout = output_stdout(run_cmd(
        &dir,
        &["--quiet", "goal", "search", "--follow"],
        Some("pia\npiano\n"),
    ));
    assert!(stdout.contains("Search: piano"));
    assert!(stdout.contains("Learn piano"));
    assert!(!stdout.contains("Swim weekly"));
}

#[test]
fn follow_search_leaves_database_usable_by_other_commands() {
    let dir = TempDir::new().expect("temp dir");
    create_goal(&dir, "Swim weekly", "fitness");

    let mut follow = command(&dir, &["--quiet", "goal", "search", "--follow"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn follow search");
    thread::sleep(Duration::from_millis(500));

    let mut add = command(&dir, &["goal", "add", "Learn piano", "--category", "music"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn goal add");
    let deadline = Instant::now() + Duration::from_secs(10);
    let status = loop {
        if let Some(status) = add.try_wait().expect("poll goal add") {
            break Some(status);
        }
        if Instant::now() >= deadline {
            break None;
        }
        thread::sleep(Duration::from_millis(50));
    };
    let Some(status) = status else {
        let _ = add.kill();
        let _ = follow.kill();
        panic!("goal add was blocked while a follow search was running");
    };
    assert!(status.success());

    let mut stdin = follow.stdin.take().expect("stdin");
    stdin.write_all(b"piano\n").expect("write stdin");
    drop(stdin);
    let stdout = output_stdout(follow.wait_with_output().expect("wait follow"));
    assert!(stdout.contains("Search: piano"));
    assert!(stdout.contains("Learn piano"));
}

#[test]
fn auth_token_is_persisted_and_cleared() {
    let dir = TempDir::new().expect("temp dir");
    let stdout = output_stdout(run_cmd(&dir, &["auth", "set-token", "secret-token"], None));
    assert!(stdout.contains("Token saved"));

    let raw = std::fs::read_to_string(dir.path().join("tokens.json")).expect("tokens file");
    let tokens: Value = serde_json::from_str(&raw).expect("tokens json");
    assert_eq!(tokens["access_token"], "secret-token");
    assert_eq!(tokens["token_type"], "bearer");

    let stdout = output_stdout(run_cmd(&dir, &["auth", "clear"], None));
    assert!(stdout.contains("Token cleared."));
    let stdout = output_stdout(run_cmd(&dir, &["auth", "clear"], None));
    assert!(stdout.contains("No token stored."));
}
