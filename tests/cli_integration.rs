use assert_cmd::Command;
use httpmock::{Method::DELETE, Method::GET, MockServer};
use predicates::prelude::*;

fn cmd_with_env(envs: &[(&str, &str)]) -> anyhow::Result<Command> {
    let mut cmd = Command::cargo_bin("discord-rest")?;
    cmd.env_remove("DISCORD_TOKEN")
        .env("DISCORD_MAX_ATTEMPTS", "2")
        .env("DISCORD_BACKOFF_BASE_MS", "10")
        .env("DISCORD_BACKOFF_JITTER_MS", "0")
        .arg("--log-level")
        .arg("warn");
    for (k, v) in envs {
        cmd.env(k, v);
    }
    Ok(cmd)
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn version_flag() -> anyhow::Result<()> {
    let mut cmd = Command::cargo_bin("discord-rest")?;
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("discord-rest "));
    Ok(())
}

#[test]
fn guild_happy_path() -> anyhow::Result<()> {
    let server = MockServer::start();
    let m = server.mock(|when, then| {
        when.method(GET)
            .path("/guilds/123")
            .header("authorization", "Bot t");
        then.status(200)
            .header("x-ratelimit-limit", "5")
            .header("x-ratelimit-remaining", "4")
            .header("x-ratelimit-reset-after", "1")
            .json_body(serde_json::json!({"id": "123", "name": "Test", "owner_id": "9"}));
    });
    let base = server.base_url();
    let assert = cmd_with_env(&[("DISCORD_TOKEN", "t"), ("DISCORD_API_URL", &base)])?
        .args(["guild", "123"])
        .assert()
        .success();
    let v = stdout_json(assert.get_output());
    assert_eq!(v["id"], "123");
    assert_eq!(v["name"], "Test");
    assert_eq!(v["owner_id"], "9");
    m.assert();
    Ok(())
}

#[test]
fn not_found_is_reported_as_json() -> anyhow::Result<()> {
    let server = MockServer::start();
    let m = server.mock(|when, then| {
        when.method(GET).path("/guilds/404");
        then.status(404)
            .json_body(serde_json::json!({"code": 10004, "message": "Unknown Guild"}));
    });
    let base = server.base_url();
    let assert = cmd_with_env(&[("DISCORD_TOKEN", "t"), ("DISCORD_API_URL", &base)])?
        .args(["guild", "404"])
        .assert()
        .failure();
    let v = stdout_json(assert.get_output());
    assert_eq!(v["error"]["code"], "not_found");
    assert_eq!(v["error"]["retriable"], false);
    assert_eq!(m.hits(), 1);
    Ok(())
}

#[test]
fn invalid_identifier_never_reaches_the_server() -> anyhow::Result<()> {
    let server = MockServer::start();
    let m = server.mock(|when, then| {
        when.any_request();
        then.status(200).json_body(serde_json::json!({}));
    });
    let base = server.base_url();
    let assert = cmd_with_env(&[("DISCORD_TOKEN", "t"), ("DISCORD_API_URL", &base)])?
        .args(["guild", "12ab"])
        .assert()
        .failure();
    let v = stdout_json(assert.get_output());
    assert_eq!(v["error"]["code"], "invalid_identifier");
    assert_eq!(m.hits(), 0);
    Ok(())
}

#[test]
fn channel_fetches_several_ids() -> anyhow::Result<()> {
    let server = MockServer::start();
    let a = server.mock(|when, then| {
        when.method(GET).path("/channels/1");
        then.status(200)
            .json_body(serde_json::json!({"id": "1", "type": 0, "name": "one"}));
    });
    let b = server.mock(|when, then| {
        when.method(GET).path("/channels/2");
        then.status(200)
            .json_body(serde_json::json!({"id": "2", "type": 2, "name": "two"}));
    });
    let base = server.base_url();
    let assert = cmd_with_env(&[("DISCORD_TOKEN", "t"), ("DISCORD_API_URL", &base)])?
        .args(["channel", "1", "2"])
        .assert()
        .success();
    let v = stdout_json(assert.get_output());
    assert_eq!(v[0]["name"], "one");
    assert_eq!(v[1]["type"], 2);
    a.assert();
    b.assert();
    Ok(())
}

#[test]
fn delete_message_sends_reason() -> anyhow::Result<()> {
    let server = MockServer::start();
    let m = server.mock(|when, then| {
        when.method(DELETE)
            .path("/channels/5/messages/6")
            .header("x-audit-log-reason", "spam");
        then.status(204);
    });
    let base = server.base_url();
    let assert = cmd_with_env(&[("DISCORD_TOKEN", "t"), ("DISCORD_API_URL", &base)])?
        .args(["delete-message", "5", "6", "--reason", "spam"])
        .assert()
        .success();
    let v = stdout_json(assert.get_output());
    assert_eq!(v["deleted"], "6");
    m.assert();
    Ok(())
}

#[test]
fn missing_token_fails() -> anyhow::Result<()> {
    cmd_with_env(&[])?
        .args(["me"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("DISCORD_TOKEN"));
    Ok(())
}
