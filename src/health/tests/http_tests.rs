//! Tests for the health probes, using a one-shot local HTTP stub.

use super::*;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::time::Duration;

struct Stub {
    url: String,
    requests: mpsc::Receiver<String>,
}

/// Serves a single request with `status_line`, after `delay`.
fn serve_once(status_line: &'static str, delay: Duration) -> Stub {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind stub listener");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let request = read_request(&mut stream);
            let _ = tx.send(request);
            std::thread::sleep(delay);
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                status_line
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });
    Stub {
        url: format!("http://{}/health", addr),
        requests: rx,
    }
}

fn read_request(stream: &mut TcpStream) -> String {
    let mut raw = Vec::new();
    let mut byte = [0u8; 1];
    while !raw.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte) {
            Ok(1) => raw.push(byte[0]),
            _ => break,
        }
    }
    let head = String::from_utf8_lossy(&raw).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; content_length];
    let _ = stream.read_exact(&mut body);
    format!("{}{}", head, String::from_utf8_lossy(&body))
}

fn probe_for(url: &str) -> HealthProbe {
    HealthProbe::from_config(Some(HealthCheckConfig::new(url)))
}

#[tokio::test]
async fn test_noop_probe_is_always_healthy() {
    assert!(HealthProbe::NoOp.is_healthy().await);
    assert!(matches!(HealthProbe::from_config(None), HealthProbe::NoOp));
}

#[tokio::test]
async fn test_get_2xx_is_healthy() {
    let stub = serve_once("204 No Content", Duration::ZERO);
    assert!(probe_for(&stub.url).is_healthy().await);

    let request = stub.requests.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(request.starts_with("GET /health HTTP/1.1"), "{}", request);
    assert!(
        request.to_lowercase().contains("content-type: application/json"),
        "default header missing: {}",
        request
    );
}

#[tokio::test]
async fn test_server_error_is_unhealthy() {
    let stub = serve_once("503 Service Unavailable", Duration::ZERO);
    assert!(!probe_for(&stub.url).is_healthy().await);
}

#[tokio::test]
async fn test_whitelisted_status_is_healthy() {
    let stub = serve_once("503 Service Unavailable", Duration::ZERO);
    let mut config = HealthCheckConfig::new(&stub.url);
    config.acceptable_status_codes = vec![503];
    assert!(HealthProbe::from_config(Some(config)).is_healthy().await);
}

#[tokio::test]
async fn test_post_sends_body_and_headers() {
    let stub = serve_once("200 OK", Duration::ZERO);
    let mut config = HealthCheckConfig::new(&stub.url);
    config.method = HttpMethod::Post;
    config.body = Some(r#"{"ping":true}"#.to_string());
    config
        .headers
        .insert("X-Probe".to_string(), "ranger".to_string());

    assert!(HealthProbe::from_config(Some(config)).is_healthy().await);

    let request = stub.requests.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(request.starts_with("POST /health HTTP/1.1"), "{}", request);
    assert!(request.to_lowercase().contains("x-probe: ranger"), "{}", request);
    assert!(request.ends_with(r#"{"ping":true}"#), "{}", request);
}

#[tokio::test]
async fn test_refused_connection_is_unhealthy() {
    let url = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        format!("http://{}/health", listener.local_addr().unwrap())
    };
    assert!(!probe_for(&url).is_healthy().await);
}

#[tokio::test]
async fn test_slow_endpoint_times_out_unhealthy() {
    let stub = serve_once("200 OK", Duration::from_secs(3));
    let mut config = HealthCheckConfig::new(&stub.url);
    config.timeout_secs = 0.2;
    assert!(!HealthProbe::from_config(Some(config)).is_healthy().await);
}

#[tokio::test]
async fn test_malformed_url_is_unhealthy() {
    assert!(!probe_for("not a url").is_healthy().await);
}

#[test]
fn test_acceptance_rules() {
    let mut config = HealthCheckConfig::new("http://localhost/health");
    config.acceptable_status_codes = vec![429];
    let probe = HttpProbe::new(config);

    assert!(probe.accepts(200));
    assert!(probe.accepts(299));
    assert!(probe.accepts(429));
    assert!(!probe.accepts(301));
    assert!(!probe.accepts(500));
}

#[test]
fn test_config_defaults_from_yaml() {
    let config: HealthCheckConfig = serde_yaml::from_str("url: http://localhost:8080/health").unwrap();
    assert_eq!(config.method, HttpMethod::Get);
    assert_eq!(config.timeout_secs, 1.0);
    assert_eq!(
        config.headers.get("Content-Type").map(String::as_str),
        Some("application/json")
    );
    assert!(config.acceptable_status_codes.is_empty());
}
