use std::{env, fs};

use pws_webhooks::config::loader::load_config;
use pws_webhooks::{PolicyDecision, WebhookEvent};

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("pws.toml");

    let toml_content = r#"
[instance]
process_id = "ws-1"

[logging]
level = "debug"

[delivery]
timeout_ms = 5000
concurrency = 2

[delivery.retry]
enabled = true
max_attempts = 2
delays_secs = [1, 10]

[[apps]]
id = "1"
key = "app-key"
secret = "app-secret"

[[apps.webhooks]]
url = "https://example.com/hooks/occupancy"
event_types = ["channel_occupied", "channel_vacated"]

[[apps.webhooks]]
url = "https://example.com/hooks/members"
event_types = ["member_added", "subscription_count"]
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.instance.process_id, "ws-1");
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.delivery.timeout_ms, 5000);
    assert_eq!(cfg.delivery.connect_timeout_ms, 10_000);
    assert_eq!(cfg.delivery.concurrency, 2);

    let app = cfg.find_app("app-key").expect("app");
    assert_eq!(app.webhooks.len(), 2);
    assert_eq!(
        app.webhooks[0].event_types,
        [WebhookEvent::ChannelOccupied, WebhookEvent::ChannelVacated]
    );
    assert_eq!(app.webhooks[1].event_types, [WebhookEvent::MemberAdded]);
    assert_eq!(app.webhooks[1].ignored_event_types, ["subscription_count"]);

    let policy = cfg.delivery.retry.policy();
    let job = pws_webhooks::DeliveryJob {
        endpoint: app.webhooks[0].clone(),
        headers: Default::default(),
        payload: "{}".into(),
        attempt: 2,
    };
    assert_eq!(
        policy.decide(&job, &pws_webhooks::DeliveryResult::failure("timeout", 1)),
        PolicyDecision::DeadLetter
    );

    // 2) Env override should win over file
    unsafe {
        env::set_var("PWS__DELIVERY__CONCURRENCY", "9");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.delivery.concurrency, 9);
    unsafe {
        env::remove_var("PWS__DELIVERY__CONCURRENCY");
    }

    // 3) Invalid config should error
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[logging]
level = "loud"
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.to_string().contains("logging.level"));

    // 4) Missing explicit file is an error
    let missing = dir.path().join("missing.toml");
    assert!(load_config(missing.to_str()).is_err());
}
