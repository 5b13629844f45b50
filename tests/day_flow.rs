mod support;

use chrono::Local;
use serde_json::Value;

use support::TestData;

fn id_of(value: &Value) -> String {
    value["id"].as_str().expect("id").to_string()
}

#[test]
fn end_of_day_archives_goals_and_carries_pending_reviews() {
    let data = TestData::new();
    data.json(&["task", "new", "FE-1", "Fix bug", "--status", "in-progress"]);
    data.json(&["day", "start-time", "09:00"]);

    assert_eq!(data.json(&["day", "goal", "add", "FE-1"])["added"], true);
    assert_eq!(data.json(&["day", "goal", "add", "fe-1"])["added"], false);

    let first = id_of(&data.json(&["day", "review", "add", "PR 1", "--url", "https://example.com/1"]));
    data.json(&["day", "review", "add", "PR 2"]);
    assert_eq!(data.json(&["day", "review", "toggle", first.as_str()])["completed"], true);

    data.json(&["task", "update", "FE-1", "--status", "done"]);

    let archived = data.json(&["day", "end"])["archived"].clone();
    assert_eq!(archived["startTime"], "09:00");
    assert_eq!(archived["date"], Local::now().date_naive().format("%Y-%m-%d").to_string());
    assert_eq!(archived["goals"][0]["title"], "Fix bug");
    assert_eq!(archived["goals"][0]["type"], "task");
    assert_eq!(archived["goals"][0]["completed"], true);
    let archived_reviews = archived["codeReviews"].as_array().expect("reviews");
    assert_eq!(archived_reviews.len(), 1);
    assert_eq!(archived_reviews[0]["title"], "PR 1");

    let status = data.json(&["day", "status"]);
    let session = &status["session"];
    assert!(session["startTime"].is_null());
    assert_eq!(session["todayGoals"].as_array().map(Vec::len), Some(0));
    let carried = session["codeReviews"].as_array().expect("reviews");
    assert_eq!(carried.len(), 1);
    assert_eq!(carried[0]["title"], "PR 2");
    assert_eq!(carried[0]["completed"], false);
    assert!(status["preview"].is_null());

    assert_eq!(data.json(&["day", "reports"])["total"], 1);
}

#[test]
fn ending_twice_archives_once() {
    let data = TestData::new();
    data.json(&["day", "start-time", "08:30"]);

    assert!(!data.json(&["day", "end"])["archived"].is_null());
    assert!(data.json(&["day", "end"])["archived"].is_null());
    assert_eq!(data.json(&["day", "reports"])["total"], 1);
}

#[test]
fn subtask_goals_follow_subtask_completion() {
    let data = TestData::new();
    data.json(&["task", "new", "BE-7", "Rate limiter"]);
    let added = data.json(&["task", "subtask", "add", "BE-7", "Write tests"]);
    let sub = added["subtask"]["id"].as_str().expect("subtask id").to_string();

    data.json(&["day", "start-time", "09:00"]);
    data.json(&["day", "goal", "add", "BE-7", "--subtask", sub.as_str()]);
    data.json(&["task", "subtask", "toggle", "BE-7", sub.as_str()]);

    let preview = data.json(&["day", "status"])["preview"].clone();
    assert_eq!(preview["goals"][0]["type"], "subtask");
    assert_eq!(preview["goals"][0]["title"], "Write tests (via Rate limiter)");
    assert_eq!(preview["goals"][0]["completed"], true);

    let removed = data.json(&["day", "goal", "rm", sub.as_str()]);
    assert_eq!(removed["goal"]["id"], sub.as_str());
}

#[test]
fn goal_for_missing_subtask_is_not_found() {
    let data = TestData::new();
    data.json(&["task", "new", "BE-7", "Rate limiter"]);
    data.cmd()
        .args(["day", "goal", "add", "BE-7", "--subtask", "missing"])
        .assert()
        .code(3);
}

#[test]
fn goal_rm_accepts_task_code() {
    let data = TestData::new();
    data.json(&["task", "new", "FE-2", "Polish"]);
    data.json(&["day", "goal", "add", "FE-2"]);

    data.json(&["day", "goal", "rm", "FE-2"]);
    let status = data.json(&["day", "status"]);
    assert_eq!(status["session"]["todayGoals"].as_array().map(Vec::len), Some(0));
}

#[test]
fn deleted_task_goal_is_archived_as_unknown() {
    let data = TestData::new();
    data.json(&["task", "new", "OPS-1", "Rotate keys"]);
    data.json(&["day", "start-time", "10:00"]);
    data.json(&["day", "goal", "add", "OPS-1"]);
    data.json(&["task", "delete", "OPS-1"]);

    let archived = data.json(&["day", "end"])["archived"].clone();
    assert_eq!(archived["goals"][0]["title"], "Unknown Task");
    assert_eq!(archived["goals"][0]["completed"], false);
}

#[test]
fn outcomes_and_summary_reach_the_report() {
    let data = TestData::new();
    data.json(&["day", "start-time", "09:00"]);
    data.json(&["day", "desired-end", "17:30"]);
    data.json(&["day", "outcome", "2", "Ship FE-1"]);
    data.json(&["day", "summary", "Good day"]);

    let archived = data.json(&["day", "end"])["archived"].clone();
    assert_eq!(archived["desiredEndTime"], "17:30");
    assert_eq!(archived["ruleOfThree"], serde_json::json!(["Ship FE-1"]));
    assert_eq!(archived["summary"], "Good day");

    let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
    assert_eq!(data.json(&["day", "reports", "--date", today.as_str()])["total"], 1);
    assert_eq!(data.json(&["day", "reports", "--to", "2000-01-01"])["total"], 0);
}
