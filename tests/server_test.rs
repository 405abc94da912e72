//! Integration tests for the pinwatch HTTP server

#[cfg(feature = "server")]
mod server_tests {
    use pinwatch::server::{run, BroadcastSink, ServerConfig};
    use pinwatch::{Config, PinMonitor, PublishSink};
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn test_config() -> Config {
        Config {
            monitored_lines: vec![17, 27],
            update_interval: Duration::from_millis(10),
            simulation_flip_probability: 0.5,
            ..Config::default()
        }
    }

    /// Start a simulated monitor and a server on an ephemeral port.
    async fn start_server() -> (SocketAddr, Arc<PinMonitor>, oneshot::Sender<()>) {
        let sink = BroadcastSink::new();
        let updates = sink.sender();
        let sink: Arc<dyn PublishSink> = Arc::new(sink);

        let mut monitor = PinMonitor::new(test_config(), sink);
        monitor.set_simulation(true);
        let monitor = Arc::new(monitor);
        monitor.start().expect("Failed to start monitor");

        let config = ServerConfig::new("127.0.0.1".parse().unwrap(), 0);
        let (addr, shutdown_tx) = run(config, monitor.clone(), updates)
            .await
            .expect("Failed to start server");

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        (addr, monitor, shutdown_tx)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (addr, monitor, shutdown_tx) = start_server().await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());

        let _ = shutdown_tx.send(());
        monitor.stop();
    }

    #[tokio::test]
    async fn test_gpio_status_endpoint() {
        let (addr, monitor, shutdown_tx) = start_server().await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/api/gpio/status", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        let status = body.as_object().expect("status should be an object");
        assert_eq!(status.len(), 2);

        let pin = &status["17"];
        let state = pin["state"].as_u64().expect("state should be a number");
        assert!(state == 0 || state == 1);
        assert!(pin["label"].as_str().is_some());
        assert!(pin["transitions"].as_u64().is_some());
        assert!(pin["high_duration_history"].as_array().is_some());

        // A low pin never reports a live high duration.
        if state == 0 {
            assert_eq!(pin["current_high_duration"].as_f64(), Some(0.0));
        }

        let _ = shutdown_tx.send(());
        monitor.stop();
    }

    #[tokio::test]
    async fn test_transitions_and_reset() {
        let (addr, monitor, shutdown_tx) = start_server().await;

        // Let the sampler detect a few edges.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/api/gpio/transitions", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());

        let counts: HashMap<u8, u64> = response.json().await.expect("Failed to parse JSON");
        assert!(counts.contains_key(&17));
        assert!(counts.contains_key(&27));

        let response = client
            .post(format!("http://{}/api/gpio/reset", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());

        let counts: HashMap<u8, u64> = client
            .get(format!("http://{}/api/gpio/transitions", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(counts[&17], 0);
        assert_eq!(counts[&27], 0);

        let _ = shutdown_tx.send(());
        monitor.stop();
    }

    #[tokio::test]
    async fn test_history_endpoint() {
        let (addr, monitor, shutdown_tx) = start_server().await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/api/gpio/history/17?hours=1.5", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());

        let entries: Vec<serde_json::Value> = response.json().await.expect("Failed to parse JSON");
        for entry in &entries {
            assert!(entry["timestamp"].as_str().is_some());
            assert!(entry["duration"].as_f64().unwrap() >= 0.0);
        }

        // hours=0 means no window at all.
        let entries: Vec<serde_json::Value> = client
            .get(format!("http://{}/api/gpio/history/17?hours=0", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert!(entries.is_empty());

        // An absurdly large window is served rather than crashing the handler.
        let response = client
            .get(format!("http://{}/api/gpio/history/17?hours=1e12", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());
        let _: Vec<serde_json::Value> = response.json().await.expect("Failed to parse JSON");

        let _ = shutdown_tx.send(());
        monitor.stop();
    }

    #[tokio::test]
    async fn test_config_endpoints() {
        let (addr, monitor, shutdown_tx) = start_server().await;

        let client = reqwest::Client::new();
        let body: serde_json::Value = client
            .get(format!("http://{}/api/config", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");

        assert_eq!(body["pins_monitored"].as_array().unwrap().len(), 2);
        assert_eq!(body["source"], "running");

        // Only labels are updatable at runtime.
        let response = client
            .post(format!("http://{}/api/config", addr))
            .json(&serde_json::json!({"pin_labels": {"17": "Door sensor"}}))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());

        let status: serde_json::Value = client
            .get(format!("http://{}/api/gpio/status", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(status["17"]["label"], "Door sensor");

        let _ = shutdown_tx.send(());
        monitor.stop();
    }

    #[tokio::test]
    async fn test_index_and_unknown_routes() {
        let (addr, monitor, shutdown_tx) = start_server().await;

        let client = reqwest::Client::new();
        let body: serde_json::Value = client
            .get(format!("http://{}/", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(body["service"], "pinwatch");
        assert!(body["endpoints"].as_array().is_some());

        // Unknown routes get a JSON 404 body, not a bare status.
        let response = client
            .get(format!("http://{}/api/nope", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status().as_u16(), 404);
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["error"], "Not found");

        let _ = shutdown_tx.send(());
        monitor.stop();
    }

    #[tokio::test]
    async fn test_system_info_endpoint() {
        let (addr, monitor, shutdown_tx) = start_server().await;

        let client = reqwest::Client::new();
        let body: serde_json::Value = client
            .get(format!("http://{}/api/system/info", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");

        assert!(body["memory"]["total"].as_u64().unwrap() > 0);
        assert!(body["cpu"]["usage_per_core"].as_array().is_some());
        assert!(body["disks"].as_array().is_some());

        let _ = shutdown_tx.send(());
        monitor.stop();
    }

    #[tokio::test]
    async fn test_system_lightweight_endpoint() {
        let (addr, monitor, shutdown_tx) = start_server().await;

        let client = reqwest::Client::new();
        let body: serde_json::Value = client
            .get(format!("http://{}/api/system/lightweight", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");

        assert!(body["cpu_usage"].as_f64().is_some());
        assert!(body["memory_percent"].as_f64().is_some());
        assert!(body["uptime_seconds"].as_u64().is_some());

        let _ = shutdown_tx.send(());
        monitor.stop();
    }
}
