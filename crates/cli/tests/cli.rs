use assert_cmd::Command;
use predicates::str::contains;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const SCHEMA: &str = r#"{
    "metadata": {"endpointPrefix": "things"},
    "operations": {
        "ListThings": {"output": {"shape": "ListThingsResponse"}},
        "DescribeThing": {
            "input": {"shape": "DescribeThingRequest"},
            "output": {"shape": "DescribeThingResponse"}
        },
        "DeleteThing": {"input": {"shape": "DescribeThingRequest"}}
    },
    "shapes": {
        "ListThingsResponse": {
            "type": "structure",
            "members": {
                "Arns": {"shape": "ArnList"},
                "NextToken": {"shape": "Token"}
            }
        },
        "ArnList": {"type": "list", "member": {"shape": "Arn"}},
        "Arn": {"type": "string"},
        "Token": {"type": "string"},
        "DescribeThingRequest": {
            "type": "structure",
            "members": {"Arn": {"shape": "Arn"}},
            "required": ["Arn"]
        },
        "DescribeThingResponse": {
            "type": "structure",
            "members": {"Name": {"shape": "ThingName"}}
        },
        "ThingName": {"type": "string"}
    }
}"#;

const PAGINATORS: &str = r#"{
    "pagination": {
        "ListThings": {"input_token": "NextToken", "output_token": "NextToken"}
    }
}"#;

fn write(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path.display().to_string()
}

#[allow(deprecated)]
fn grump() -> Command {
    Command::cargo_bin("grump").expect("binary")
}

fn run_json(args: &[&str]) -> Value {
    let output = grump().args(args).output().expect("command run");
    assert!(
        output.status.success(),
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid json")
}

/// Entities of `shape` under the `region -> namespace` dimension of a snapshot
fn harvested<'a>(domain: &'a Value, region: &str, shape: &str) -> Vec<&'a Value> {
    let region = domain["dimensions"]
        .as_array()
        .and_then(|dims| dims.iter().find(|dim| dim["key"] == region))
        .expect("region dimension");
    let service = &region["dimensions"][0];
    service["entities"][shape]
        .as_array()
        .map(|entities| entities.iter().map(|entity| &entity["value"]).collect())
        .unwrap_or_default()
}

#[test]
fn plan_lists_starters_and_dependents() {
    let temp = tempdir().unwrap();
    let schema = write(temp.path(), "service-2.json", SCHEMA);

    let plan = run_json(&["--quiet", "plan", "--schema", &schema]);

    assert_eq!(plan["namespace"], "things");
    assert_eq!(plan["starters"], json!(["ListThings"]));
    assert_eq!(
        plan["dependent"],
        json!([{"operation": "DescribeThing", "required": ["Arn"]}])
    );
    assert_eq!(plan["skipped"], json!(["DeleteThing"]));
}

#[test]
fn discover_replays_pages_and_feeds_dependents() {
    let temp = tempdir().unwrap();
    let schema = write(temp.path(), "service-2.json", SCHEMA);
    let paginators = write(temp.path(), "paginators-1.json", PAGINATORS);
    let responses = write(
        temp.path(),
        "responses.json",
        r#"{
            "ListThings": [{"pages": [
                {"Arns": ["arn:a"], "NextToken": "t1"},
                {"Arns": ["arn:b"]}
            ]}],
            "DescribeThing": [
                {"params": {"Arn": "arn:a"}, "response": {"Name": "alpha"}},
                {"error": {"kind": "AccessDenied", "message": "denied"}}
            ]
        }"#,
    );
    let config = write(
        temp.path(),
        "grump.toml",
        r#"
        [[non_fatal]]
        namespace = "things"
        kinds = ["AccessDenied"]
        "#,
    );

    let out = run_json(&[
        "--quiet",
        "discover",
        "--schema",
        &schema,
        "--paginators",
        &paginators,
        "--config",
        &config,
        "--responses",
        &responses,
        "--region",
        "us-east-1",
    ]);

    assert_eq!(out["regions"][0]["region"], "us-east-1");
    let report = &out["regions"][0]["report"];
    assert_eq!(report["starters"], json!(["ListThings"]));
    assert_eq!(report["invocations"], 3);
    assert_eq!(report["failures"][0]["kind"], "AccessDenied");
    assert_eq!(report["unresolved"], json!([]));

    let domain = &out["domain"];
    assert_eq!(
        harvested(domain, "us-east-1", "things:Arn"),
        vec![&json!("arn:a"), &json!("arn:b")]
    );
    assert_eq!(
        harvested(domain, "us-east-1", "things:ThingName"),
        vec![&json!("alpha")]
    );
    // Pagination tokens are bookkeeping, not resources
    assert!(harvested(domain, "us-east-1", "things:Token").is_empty());
}

#[test]
fn fatal_failure_exits_with_error() {
    let temp = tempdir().unwrap();
    let schema = write(temp.path(), "service-2.json", SCHEMA);
    let responses = write(
        temp.path(),
        "responses.json",
        r#"{"ListThings": [{"error": {"kind": "Throttling", "message": "slow down"}}]}"#,
    );

    grump()
        .args(["discover", "--schema", &schema, "--responses", &responses])
        .assert()
        .failure()
        .stderr(contains("Throttling"));
}

#[test]
fn failed_region_keeps_the_others_and_its_partial_harvest() {
    let temp = tempdir().unwrap();
    let schema = write(temp.path(), "service-2.json", SCHEMA);
    let responses = write(
        temp.path(),
        "responses.json",
        r#"{
            "ListThings": [{"response": {"Arns": ["arn:a"]}}],
            "DescribeThing": [
                {"response": {"Name": "alpha"}},
                {"region": "eu-west-1", "error": {"kind": "Throttling", "message": "slow down"}}
            ]
        }"#,
    );

    let output = grump()
        .args(["--quiet", "discover", "--schema", &schema])
        .args(["--responses", &responses])
        .args(["--region", "us-east-1", "--region", "eu-west-1"])
        .output()
        .expect("command run");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("eu-west-1"));

    let out: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    let regions = out["regions"].as_array().expect("regions");
    assert_eq!(regions[0]["report"]["region"], "us-east-1");
    assert!(regions[0].get("error").is_none());
    assert_eq!(regions[1]["region"], "eu-west-1");
    assert!(regions[1]["error"].as_str().unwrap().contains("Throttling"));

    let domain = &out["domain"];
    assert_eq!(
        harvested(domain, "us-east-1", "things:ThingName"),
        vec![&json!("alpha")]
    );
    assert_eq!(
        harvested(domain, "eu-west-1", "things:Arn"),
        vec![&json!("arn:a")]
    );
    assert!(harvested(domain, "eu-west-1", "things:ThingName").is_empty());
}

#[test]
fn invalid_config_is_rejected() {
    let temp = tempdir().unwrap();
    let schema = write(temp.path(), "service-2.json", SCHEMA);
    let config = write(temp.path(), "grump.toml", "regions = []\n");

    grump()
        .args(["plan", "--schema", &schema, "--config", &config])
        .assert()
        .failure()
        .stderr(contains("regions must not be empty"));
}

#[test]
fn output_can_be_written_to_a_file() {
    let temp = tempdir().unwrap();
    let schema = write(temp.path(), "service-2.json", SCHEMA);
    let out = temp.path().join("out.json");

    grump()
        .args(["--quiet", "discover", "--schema", &schema, "--out"])
        .arg(&out)
        .assert()
        .success();

    let written: Value = serde_json::from_str(&fs::read_to_string(out).unwrap()).unwrap();
    assert_eq!(written["regions"][0]["report"]["region"], "global");
    assert_eq!(written["regions"][0]["report"]["invocations"], 1);
}
