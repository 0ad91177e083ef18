#![cfg(unix)]

use anyhow::Result;
use httpmock::prelude::*;
use pmp_relay::utils::error::ErrorCategory;
use pmp_relay::utils::validation::Validate;
use pmp_relay::{
    CycleOutcome, NatpmpcMapper, OpnsenseFirewall, PortRelay, RelayConfig, RelaySettings,
    RelayState, Termination, TokioSleeper, TransmissionRemote,
};

const ALIAS_UUID: &str = "5d1e7b3a-96f4-4c2b-8f0e-2a9d4c6b1e70";

type RealRelay = PortRelay<NatpmpcMapper, OpnsenseFirewall, TransmissionRemote, TokioSleeper>;

/// Builds a config whose external tools are `sh -c` scripts and whose firewall is the mock server.
fn config_for(server: &MockServer, natpmpc_script: &str, remote_script: &str) -> RelayConfig {
    let toml_content = format!(
        r#"
[firewall]
url = "{}"
api_key = "relay-key"
api_secret = "relay-secret"
alias_name = "torrent_port"

[application]
url = "http://127.0.0.1:9091/transmission/rpc"
command = ["sh", "-c", '{}', "transmission-remote"]

[natpmp]
gateway = "10.2.0.1"
command = ["sh", "-c", '{}', "natpmpc"]

[relay]
refresh_delay_secs = 1
max_consecutive_failures = 2
"#,
        server.base_url(),
        remote_script,
        natpmpc_script
    );

    let config = RelayConfig::from_toml_str(&toml_content).unwrap();
    config.validate().unwrap();
    config
}

fn relay_from(config: &RelayConfig) -> RealRelay {
    PortRelay::new(
        NatpmpcMapper::from_config(&config.natpmp).unwrap(),
        OpnsenseFirewall::from_config(&config.firewall).unwrap(),
        TransmissionRemote::from_config(&config.application).unwrap(),
        TokioSleeper,
        RelaySettings::from_config(config),
    )
}

async fn mock_alias_lookup(server: &MockServer) -> httpmock::Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/firewall/alias/get_alias_u_u_i_d/torrent_port");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({ "uuid": ALIAS_UUID }));
        })
        .await
}

#[tokio::test]
async fn test_end_to_end_propagation_is_idempotent() -> Result<()> {
    let server = MockServer::start_async().await;
    let lookup_mock = mock_alias_lookup(&server).await;
    let set_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(format!("/api/firewall/alias/setItem/{}", ALIAS_UUID))
                .json_body(serde_json::json!({ "alias": { "content": "43122" } }));
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({ "result": "saved" }));
        })
        .await;
    let apply_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/firewall/alias/reconfigure");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({ "status": "ok" }));
        })
        .await;

    let config = config_for(
        &server,
        r#"echo "Mapped public port 43122 protocol $4 to local port 0 lifetime $5""#,
        r#"test "$2" = -l || test "$3" = 43122"#,
    );
    let mut relay = relay_from(&config);

    relay.startup().await?;
    lookup_mock.assert_async().await;
    assert_eq!(relay.state(), RelayState::Polling);

    let outcome = relay.run_cycle().await?;
    assert_eq!(
        outcome,
        CycleOutcome::Propagated {
            previous: None,
            port: 43122
        }
    );

    let outcome = relay.run_cycle().await?;
    assert_eq!(outcome, CycleOutcome::Unchanged { port: 43122 });

    set_mock.assert_hits_async(1).await;
    apply_mock.assert_hits_async(1).await;
    assert_eq!(relay.registered_port(), Some(43122));

    Ok(())
}

#[tokio::test]
async fn test_end_to_end_apply_failure_is_retried() -> Result<()> {
    let server = MockServer::start_async().await;
    mock_alias_lookup(&server).await;
    let set_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(format!("/api/firewall/alias/setItem/{}", ALIAS_UUID));
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({ "result": "saved" }));
        })
        .await;
    let mut failing_apply = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/firewall/alias/reconfigure");
            then.status(500).body("configd unavailable");
        })
        .await;

    let config = config_for(
        &server,
        r#"echo "Mapped public port 43122 protocol $4 to local port 0""#,
        "exit 0",
    );
    let mut relay = relay_from(&config);
    relay.startup().await?;

    let outcome = relay.run_cycle().await?;
    assert_eq!(
        outcome,
        CycleOutcome::Failed {
            category: ErrorCategory::Firewall,
            consecutive_failures: 1
        }
    );
    assert_eq!(relay.registered_port(), None);
    failing_apply.assert_hits_async(1).await;

    failing_apply.delete_async().await;
    let apply_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/firewall/alias/reconfigure");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({ "status": "ok" }));
        })
        .await;

    let outcome = relay.run_cycle().await?;
    assert_eq!(
        outcome,
        CycleOutcome::Propagated {
            previous: None,
            port: 43122
        }
    );
    set_mock.assert_hits_async(2).await;
    apply_mock.assert_hits_async(1).await;
    assert_eq!(relay.consecutive_failures(), 0);

    Ok(())
}

#[tokio::test]
async fn test_end_to_end_unknown_alias_stops_before_polling() -> Result<()> {
    let server = MockServer::start_async().await;
    let lookup_mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/firewall/alias/get_alias_u_u_i_d/torrent_port");
            then.status(404).body("not found");
        })
        .await;
    let set_mock = server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(200);
        })
        .await;

    let config = config_for(
        &server,
        r#"echo "Mapped public port 43122 protocol $4 to local port 0""#,
        "exit 0",
    );
    let mut relay = relay_from(&config);

    let termination = relay.run().await;

    assert_eq!(termination, Termination::StartupFailed);
    assert_eq!(termination.exit_code(), 1);
    lookup_mock.assert_async().await;
    set_mock.assert_hits_async(0).await;

    Ok(())
}

#[tokio::test]
async fn test_end_to_end_failing_gateway_terminates() -> Result<()> {
    let server = MockServer::start_async().await;
    mock_alias_lookup(&server).await;

    // max_consecutive_failures = 2, so the third failing cycle terminates
    let config = config_for(
        &server,
        r#"echo "readnatpmpresponseorretry() failed : 4""#,
        "exit 0",
    );
    let mut relay = relay_from(&config);

    let termination = relay.run().await;

    assert_eq!(termination, Termination::FailureThresholdExceeded);
    assert_eq!(relay.consecutive_failures(), 3);
    assert_eq!(relay.registered_port(), None);

    Ok(())
}
