//! End-to-end batch engine tests with spy transports

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use netfanout::errors::ExecError;
use netfanout::models::batch::{BatchKind, DeviceEndpoint};
use netfanout::models::result::{ExecutionResult, ResultStatus, SessionOutput};
use netfanout::session::driver::SessionDriver;
use netfanout::storage::settings::{
    DispatchSettings, Profile, SessionStyle, CISCO_IOSV_TELNET, VPCS_TELNET,
};
use netfanout::topology::{StaticTopologyResolver, TopologyResolver};
use netfanout::{BatchEngine, BatchResponse};

use crate::common::{fast_vpcs_profile, ios, reply, vpcs, SpyCliFactory, SpyConnector, StubRunner};

struct DownResolver;

#[async_trait]
impl TopologyResolver for DownResolver {
    async fn resolve(
        &self,
        _names: &BTreeSet<String>,
    ) -> Result<HashMap<String, DeviceEndpoint>, ExecError> {
        Err(ExecError::TopologyError("503 Service Unavailable".to_string()))
    }
}

fn profiles() -> BTreeMap<String, Profile> {
    let mut profiles = BTreeMap::new();
    profiles.insert(VPCS_TELNET.to_string(), fast_vpcs_profile());
    profiles.insert(CISCO_IOSV_TELNET.to_string(), Profile::structured("cisco_ios"));
    profiles
}

fn engine(
    resolver: Arc<dyn TopologyResolver>,
    connector: Arc<SpyConnector>,
    cli: Arc<SpyCliFactory>,
) -> BatchEngine {
    let driver = SessionDriver::new(profiles(), connector, cli);
    BatchEngine::new(DispatchSettings::default(), resolver, Arc::new(driver))
}

fn results(response: BatchResponse) -> Vec<ExecutionResult> {
    match response {
        BatchResponse::Results(results) => results,
        BatchResponse::Invalid(issues) => panic!("batch rejected: {:?}", issues),
    }
}

#[tokio::test]
async fn test_found_and_missing_device() {
    let connector = Arc::new(
        SpyConnector::new().script("A", vec![reply("PC1> "), reply("x\r\nmocked\r\nPC1> ")]),
    );
    let resolver = Arc::new(StaticTopologyResolver::new(vec![vpcs("A")]));
    let engine = engine(resolver, connector.clone(), Arc::new(SpyCliFactory::new()));

    let raw = json!([
        {"device_name": "A", "commands": ["x"]},
        {"device_name": "B", "commands": ["y"]}
    ]);
    let results = results(engine.execute_batch(raw, BatchKind::Display).await);

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].device_name, "A");
    assert_eq!(results[0].status, ResultStatus::Success);
    assert_eq!(
        results[0].output,
        Some(SessionOutput::Combined("x\r\nmocked\r\nPC1> ".to_string()))
    );
    assert_eq!(results[0].commands, vec!["x"]);

    assert_eq!(results[1].device_name, "B");
    assert_eq!(results[1].status, ResultStatus::Error);
    assert_eq!(
        results[1].error.as_deref(),
        Some("Device 'B' not found in topology or missing management port")
    );

    let b = serde_json::to_value(&results[1]).unwrap();
    assert_eq!(
        b,
        json!({
            "device_name": "B",
            "status": "error",
            "commands": ["y"],
            "error": "Device 'B' not found in topology or missing management port",
            "elapsed_ms": 0
        })
    );

    // resolution gating
    assert_eq!(connector.connects_to("A"), 1);
    assert_eq!(connector.connects_to("B"), 0);
    assert_eq!(connector.close_count(), 1);
}

#[tokio::test]
async fn test_isolation_one_failing_device() {
    let names = ["PC1", "PC2", "PC3", "PC4", "PC5"];
    let mut connector = SpyConnector::new().refuse("PC3");
    for name in names {
        let ok = format!("{} ok\r\nPC1> ", name);
        connector = connector.script(name, vec![reply("PC1> "), reply(&ok)]);
    }
    let connector = Arc::new(connector);
    let resolver = Arc::new(StaticTopologyResolver::new(names.iter().map(|n| vpcs(n))));
    let engine = engine(resolver, connector.clone(), Arc::new(SpyCliFactory::new()));

    let raw: Vec<_> = names
        .iter()
        .map(|n| json!({"device_name": n, "commands": ["show ip"]}))
        .collect();
    let results = results(engine.execute_batch(json!(raw), BatchKind::Display).await);

    let errors: Vec<_> = results.iter().filter(|r| !r.is_success()).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].device_name, "PC3");
    let detail = errors[0].error.clone().unwrap();
    assert!(detail.contains("Connection refused"));

    for (result, name) in results.iter().zip(names) {
        assert_eq!(result.device_name, name);
        if let Some(SessionOutput::Combined(output)) = &result.output {
            assert!(!output.contains(&detail));
            assert!(output.starts_with(name));
        }
    }
    assert_eq!(connector.close_count(), 4);
}

#[tokio::test]
async fn test_resolver_outage_fails_every_device() {
    let connector = Arc::new(SpyConnector::new());
    let engine = engine(Arc::new(DownResolver), connector.clone(), Arc::new(SpyCliFactory::new()));

    let raw = r#"[
        {"device_name": "R-1", "commands": ["show clock"]},
        {"device_name": "PC1", "commands": []}
    ]"#;
    let results = results(engine.execute_batch(raw, BatchKind::Display).await);

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.status == ResultStatus::Error));
    assert!(results[0].error.as_deref().unwrap().contains("not found in topology"));
    assert!(connector.connects.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_configure_through_structured_driver() {
    let cli = Arc::new(SpyCliFactory::new().config_results(vec![
        Err("Pattern not detected: configuration mode prompt"),
        Ok("R-1(config)#"),
    ]));
    let resolver = Arc::new(StaticTopologyResolver::new(vec![ios("R-1"), ios("R-2")]));
    let engine = engine(resolver, Arc::new(SpyConnector::new()), cli.clone());

    let raw = json!([
        {"device_name": "R-1", "config_commands": ["hostname R-1"]},
        {"device_name": "R-2", "config_commands": []}
    ]);
    let results = results(engine.execute_batch(raw, BatchKind::Configure).await);

    assert_eq!(results[0].status, ResultStatus::Success);
    assert_eq!(results[0].output, Some(SessionOutput::Combined("R-1(config)#".to_string())));
    assert_eq!(
        results[1].output,
        Some(SessionOutput::Combined("No configuration commands to execute".to_string()))
    );
    assert_eq!(cli.config_attempts(), 2);
}

#[tokio::test]
async fn test_invalid_batch_contacts_nobody() {
    let connector = Arc::new(SpyConnector::new());
    let resolver = Arc::new(StaticTopologyResolver::new(vec![vpcs("PC1")]));
    let engine = engine(resolver, connector.clone(), Arc::new(SpyCliFactory::new()));

    let response = engine
        .execute_batch(r#"[{"device_name": "PC1"}, {"commands": []}]"#, BatchKind::Display)
        .await;

    let issues = response.issues().unwrap();
    assert_eq!(issues.len(), 2);
    assert!(connector.connects.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_structured_batches_use_bounded_pool() {
    let names: Vec<String> = (1..=12).map(|i| format!("R-{}", i)).collect();
    let mut runner = StubRunner::new().style(SessionStyle::StructuredRequest);
    for name in &names {
        runner = runner.delay(name, Duration::from_secs(1));
    }
    let runner = Arc::new(runner);
    let resolver = Arc::new(StaticTopologyResolver::new(names.iter().map(|n| ios(n))));
    let engine = BatchEngine::new(DispatchSettings::default(), resolver, runner.clone());

    let raw: Vec<_> = names
        .iter()
        .map(|n| json!({"device_name": n, "commands": ["show clock"]}))
        .collect();
    let results = results(engine.execute_batch(json!(raw), BatchKind::Display).await);

    assert_eq!(results.len(), 12);
    assert_eq!(runner.max_in_flight(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_interactive_batches_fan_out_fully() {
    let names: Vec<String> = (1..=12).map(|i| format!("PC{}", i)).collect();
    let mut runner = StubRunner::new().style(SessionStyle::InteractivePrompt);
    for name in &names {
        runner = runner.delay(name, Duration::from_secs(1));
    }
    let runner = Arc::new(runner);
    let resolver = Arc::new(StaticTopologyResolver::new(names.iter().map(|n| vpcs(n))));
    let engine = BatchEngine::new(DispatchSettings::default(), resolver, runner.clone());

    let raw: Vec<_> = names
        .iter()
        .map(|n| json!({"device_name": n, "commands": ["show ip"]}))
        .collect();
    engine.execute_batch(json!(raw), BatchKind::Display).await;

    assert_eq!(runner.max_in_flight(), 12);
}
