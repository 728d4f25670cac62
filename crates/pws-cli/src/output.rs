use colored::Colorize;
use pws_webhooks::{DeliveryReport, PolicyDecision, WebhooksConfig};
use tabled::builder::Builder;
use tabled::settings::Style;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_report(report: &DeliveryReport) {
    let status = report
        .result
        .http_status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".into());
    let line = format!(
        "{} status={} attempt={} {}ms",
        report.job.endpoint.url, status, report.job.attempt, report.result.response_time_ms
    );
    if report.result.success {
        print_success(&line);
    } else {
        let error = report.result.error.as_deref().unwrap_or("unknown error");
        let next = match report.decision {
            PolicyDecision::Ack => "dropped",
            PolicyDecision::Retry { .. } => "retrying",
            PolicyDecision::DeadLetter => "dead-lettered",
        };
        print_error(&format!("{line} ({error}, {next})"));
    }
}

pub fn print_config_summary(cfg: &WebhooksConfig) {
    println!("{}: {}", "Process".cyan(), cfg.instance.process_id);
    println!(
        "{}: concurrency={} timeout={}ms retry={}",
        "Delivery".cyan(),
        cfg.delivery.concurrency,
        cfg.delivery.timeout_ms,
        if cfg.delivery.retry.enabled { "on" } else { "off" }
    );

    if cfg.apps.is_empty() {
        println!("No apps configured.");
        return;
    }

    let mut builder = Builder::default();
    builder.push_record(["App", "Key", "Webhook URL", "Events"]);
    for app in &cfg.apps {
        if app.webhooks.is_empty() {
            builder.push_record([app.id.as_str(), app.key.as_str(), "-", "-"]);
        }
        for webhook in &app.webhooks {
            let events: Vec<&str> = webhook.event_types.iter().map(|e| e.as_str()).collect();
            builder.push_record([
                app.id.as_str(),
                app.key.as_str(),
                webhook.url.as_str(),
                events.join(", ").as_str(),
            ]);
        }
    }
    let table = builder.build().with(Style::rounded()).to_string();
    println!("{table}");
}
