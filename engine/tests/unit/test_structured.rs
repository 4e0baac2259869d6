//! Structured-request session tests

use netfanout::models::batch::{BatchKind, CommandGroup};
use netfanout::models::result::{SessionOutcome, SessionOutput};
use netfanout::session::structured::{self, NO_CONFIG_COMMANDS};
use netfanout::storage::settings::Profile;

use crate::common::{ios, strings, SpyCliFactory};

fn display(commands: &[&str]) -> CommandGroup {
    CommandGroup::new("R-1", strings(commands), BatchKind::Display)
}

fn configure(commands: &[&str]) -> CommandGroup {
    CommandGroup::new("R-1", strings(commands), BatchKind::Configure)
}

/// Run `group` on R-1 with the stock IOS profile
async fn run(factory: &SpyCliFactory, group: &CommandGroup) -> SessionOutcome {
    structured::run(factory, &ios("R-1"), &Profile::structured("cisco_ios"), group).await
}

#[tokio::test]
async fn test_display_per_command_independence() {
    let factory = SpyCliFactory::new();
    let group = display(&["show version", "show bad thing", "show clock"]);

    let outcome = run(&factory, &group).await;

    assert!(outcome.succeeded());
    let outputs = outcome.result.as_ref().unwrap().as_per_command().unwrap();
    assert_eq!(outputs.len(), 3);
    assert_eq!(outputs.get("show version"), Some("output of show version"));
    assert_eq!(outputs.get("show clock"), Some("output of show clock"));
    assert_eq!(
        outputs.get("show bad thing"),
        Some(
            "Error executing command 'show bad thing': \
             Command error: 'show bad thing' rejected by device (Invalid input)"
        )
    );
    assert_eq!(factory.opens(), 1);
    assert_eq!(factory.resyncs(), 1);
    assert_eq!(factory.closes(), 1);
}

#[tokio::test]
async fn test_display_lost_session_fails_remaining_commands() {
    let factory = SpyCliFactory::new().failing_resync("Connection closed by remote host");
    let group = display(&["show version", "show bad thing", "show clock", "show ip route"]);

    let outcome = run(&factory, &group).await;

    assert!(outcome.succeeded());
    let outputs = outcome.result.as_ref().unwrap().as_per_command().unwrap();
    assert_eq!(outputs.len(), 4);
    assert_eq!(outputs.get("show version"), Some("output of show version"));
    assert!(outputs.get("show bad thing").unwrap().contains("rejected by device"));
    for skipped in ["show clock", "show ip route"] {
        assert_eq!(
            outputs.get(skipped),
            Some(
                format!(
                    "Error executing command '{}': \
                     Transport error: Connection closed by remote host",
                    skipped
                )
                .as_str()
            )
        );
    }
    assert_eq!(factory.resyncs(), 1);
    assert_eq!(factory.closes(), 1);
}

#[tokio::test]
async fn test_display_output_serialises_as_object() {
    let factory = SpyCliFactory::new();
    let outcome = run(&factory, &display(&["show clock", "show version"])).await;

    let json = serde_json::to_string(outcome.result.as_ref().unwrap()).unwrap();
    assert_eq!(
        json,
        r#"{"show clock":"output of show clock","show version":"output of show version"}"#
    );
}

#[tokio::test]
async fn test_display_open_failure_fails_device() {
    let factory = SpyCliFactory::new()
        .failing_open("Unable to connect to 127.0.0.1:5000: Connection refused");

    let outcome = run(&factory, &display(&["show clock"])).await;

    assert!(outcome.error_detail().unwrap().contains("Connection refused"));
}

#[tokio::test]
async fn test_configure_retries_once_on_transient_failure() {
    let factory = SpyCliFactory::new().config_results(vec![
        Err("Pattern not detected: configuration mode prompt"),
        Ok("R-1(config)#hostname R-1\nR-1(config)#end\nR-1#"),
    ]);

    let outcome = run(&factory, &configure(&["hostname R-1"])).await;

    assert!(outcome.succeeded());
    assert_eq!(
        outcome.result.as_ref().unwrap().as_combined(),
        Some("R-1(config)#hostname R-1\nR-1(config)#end\nR-1#")
    );
    assert_eq!(factory.config_attempts(), 2);
    // every attempt runs on a fresh session
    assert_eq!(factory.opens(), 2);
    assert_eq!(factory.closes(), 2);
}

#[tokio::test]
async fn test_configure_never_makes_a_third_attempt() {
    let factory = SpyCliFactory::new().config_results(vec![
        Err("Pattern not detected: configuration mode prompt"),
        Err("Pattern not detected: configuration mode prompt"),
        Ok("should never be reached"),
    ]);

    let outcome = run(&factory, &configure(&["hostname R-1"])).await;

    assert!(!outcome.succeeded());
    assert!(outcome.error_detail().unwrap().starts_with("Configuration failed: "));
    assert!(outcome.error_detail().unwrap().contains("Pattern not detected"));
    assert_eq!(factory.config_attempts(), 2);
}

#[tokio::test]
async fn test_configure_does_not_retry_other_failures() {
    let factory = SpyCliFactory::new()
        .config_results(vec![Err("'interface Gi9/9' rejected by device (Invalid input)")]);

    let outcome = structured::run(
        &factory,
        &ios("R-1"),
        &Profile::structured("cisco_ios"),
        &configure(&["interface Gi9/9", "no shutdown"]),
    )
    .await;

    assert_eq!(
        outcome.error_detail(),
        Some(
            "Configuration failed: \
             Command error: 'interface Gi9/9' rejected by device (Invalid input)"
        )
    );
    assert_eq!(factory.config_attempts(), 1);
}

#[tokio::test]
async fn test_configure_custom_signature() {
    let mut profile = Profile::structured("cisco_ios");
    profile.transient_failure_signature = "% Console busy".to_string();
    let factory = SpyCliFactory::new().config_results(vec![Err("% Console busy"), Ok("done")]);

    let outcome =
        structured::run(&factory, &ios("R-1"), &profile, &configure(&["hostname R-1"])).await;

    assert!(outcome.succeeded());
    assert_eq!(factory.config_attempts(), 2);
}

#[tokio::test]
async fn test_configure_open_failure_counts_as_attempt() {
    let factory = SpyCliFactory::new()
        .failing_open("Pattern not detected: login did not reach a device prompt");

    let outcome = run(&factory, &configure(&["hostname R-1"])).await;

    assert!(!outcome.succeeded());
    assert_eq!(factory.opens(), 2);
    assert_eq!(factory.config_attempts(), 0);
}

#[tokio::test]
async fn test_configure_empty_list_succeeds_without_session() {
    let factory = SpyCliFactory::new();

    let outcome = run(&factory, &configure(&[])).await;

    assert_eq!(
        outcome.result,
        Ok(SessionOutput::Combined(NO_CONFIG_COMMANDS.to_string()))
    );
    assert_eq!(factory.opens(), 0);
}
