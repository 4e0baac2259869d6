//! GNS3 resolver tests against a fake REST server

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use netfanout::storage::settings::{Settings, CISCO_IOSV_TELNET, VPCS_TELNET};
use netfanout::topology::{Gns3TopologyResolver, TopologyResolver};

/// Requests seen by the fake server: (path, authorization header)
type RequestLog = Arc<Mutex<Vec<(String, Option<String>)>>>;

/// Serve canned JSON bodies keyed by path; unknown paths get a 404
async fn fake_gns3(routes: HashMap<String, Value>) -> (String, RequestLog) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());
    let log: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&log);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };

            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&chunk[..n]),
                }
            }

            let text = String::from_utf8_lossy(&request).to_string();
            let path = text
                .lines()
                .next()
                .and_then(|line| line.split_whitespace().nth(1))
                .unwrap_or("/")
                .to_string();
            let auth = text
                .lines()
                .find(|l| l.to_lowercase().starts_with("authorization:"))
                .map(|l| l["authorization:".len()..].trim().to_string());
            seen.lock().unwrap().push((path.clone(), auth));

            let (status, body) = match routes.get(&path) {
                Some(body) => ("200 OK", body.to_string()),
                None => ("404 Not Found", json!({"message": "not found"}).to_string()),
            };
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (url, log)
}

fn lab_routes() -> HashMap<String, Value> {
    let mut routes = HashMap::new();
    routes.insert(
        "/v2/projects".to_string(),
        json!([
            {"project_id": "p-closed", "name": "old lab", "status": "closed"},
            {"project_id": "p-open", "name": "ospf lab", "status": "opened"}
        ]),
    );
    routes.insert(
        "/v2/projects/p-open/nodes".to_string(),
        json!([
            {"name": "R-1", "node_type": "dynamips", "console": 5000, "console_host": "192.168.56.10", "console_type": "telnet"},
            {"name": "PC1", "node_type": "vpcs", "console": 5001, "console_host": "0.0.0.0", "console_type": "telnet"},
            {"name": "SW1", "node_type": "ethernet_switch", "console": null, "console_host": "0.0.0.0", "console_type": "none"}
        ]),
    );
    routes.insert(
        "/v2/projects/p-fixed/nodes".to_string(),
        json!([
            {"name": "R-7", "node_type": "qemu", "console": 5007, "console_host": "10.1.1.1"}
        ]),
    );
    routes
}

fn names(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn settings(url: &str) -> Settings {
    let mut settings = Settings::default();
    settings.topology.server_url = Some(url.to_string());
    settings.topology.request_timeout_secs = 5;
    settings
}

#[tokio::test]
async fn test_resolves_opened_project() {
    let (url, log) = fake_gns3(lab_routes()).await;
    let resolver = Gns3TopologyResolver::from_settings(&settings(&url)).unwrap();

    let endpoints = resolver.resolve(&names(&["R-1", "PC1", "SW1", "R-2"])).await.unwrap();

    assert_eq!(endpoints.len(), 2);
    assert_eq!(endpoints["R-1"].host, "192.168.56.10");
    assert_eq!(endpoints["R-1"].port, 5000);
    assert_eq!(endpoints["R-1"].profile_group, CISCO_IOSV_TELNET);
    assert_eq!(endpoints["PC1"].host, "127.0.0.1");
    assert_eq!(endpoints["PC1"].profile_group, VPCS_TELNET);

    let paths: Vec<String> = log.lock().unwrap().iter().map(|(p, _)| p.clone()).collect();
    assert_eq!(paths, vec!["/v2/projects", "/v2/projects/p-open/nodes"]);
}

#[tokio::test]
async fn test_configured_project_and_basic_auth() {
    let (url, log) = fake_gns3(lab_routes()).await;
    let mut settings = settings(&url);
    settings.apply_env_with(|key| match key {
        "GNS3_SERVER_USERNAME" => Some("admin".to_string()),
        "GNS3_SERVER_PASSWORD" => Some("admin".to_string()),
        _ => None,
    });
    settings.topology.project_id = Some("p-fixed".to_string());
    let resolver = Gns3TopologyResolver::from_settings(&settings).unwrap();

    let endpoints = resolver.resolve(&names(&["R-7"])).await.unwrap();
    assert_eq!(endpoints["R-7"].port, 5007);

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].0, "/v2/projects/p-fixed/nodes");
    // base64("admin:admin")
    assert_eq!(log[0].1.as_deref(), Some("Basic YWRtaW46YWRtaW4="));
}

#[tokio::test]
async fn test_no_opened_project_resolves_nothing() {
    let mut routes = HashMap::new();
    routes.insert(
        "/v2/projects".to_string(),
        json!([{"project_id": "p-closed", "name": "old lab", "status": "closed"}]),
    );
    let (url, _log) = fake_gns3(routes).await;
    let resolver = Gns3TopologyResolver::from_settings(&settings(&url)).unwrap();

    let endpoints = resolver.resolve(&names(&["R-1"])).await.unwrap();
    assert!(endpoints.is_empty());
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let (url, _log) = fake_gns3(HashMap::new()).await;
    let resolver = Gns3TopologyResolver::from_settings(&settings(&url)).unwrap();

    let err = resolver.resolve(&names(&["R-1"])).await.unwrap_err();
    assert!(err.to_string().starts_with("Topology error: 404"));
}
