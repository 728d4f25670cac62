use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use pws_webhooks::{
    DeliveryWorker, HttpTransport, MemoryQueue, WEBHOOK_QUEUE, WebhookEvent, WebhookSender,
    WebhooksConfig,
};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::cli::SendArgs;
use crate::output::{print_report, print_success};

pub async fn send(cfg: &WebhooksConfig, args: &SendArgs) -> Result<()> {
    check_event_args(args)?;
    let app = cfg
        .find_app(&args.app)
        .ok_or_else(|| anyhow!("No app with key '{}' in config", args.app))?;

    let queue = Arc::new(MemoryQueue::new(cfg.delivery.concurrency));
    let transport = Arc::new(
        HttpTransport::new(cfg.delivery.timeout(), cfg.delivery.connect_timeout())
            .context("Failed to build HTTP client")?,
    );
    let (reports_tx, mut reports) = mpsc::unbounded_channel();
    Arc::new(
        DeliveryWorker::new(transport, queue.clone())
            .with_policy(cfg.delivery.retry.policy())
            .with_reports(reports_tx),
    )
    .start()?;

    let sender = WebhookSender::new(queue.clone(), &cfg.instance.process_id);
    let user_id = || {
        args.user_id
            .as_deref()
            .ok_or_else(|| anyhow!("--user-id is required for {}", args.event))
    };

    let count = match args.event {
        WebhookEvent::ClientEvent => {
            let event = args
                .client_event
                .as_deref()
                .ok_or_else(|| anyhow!("--client-event is required for client_event"))?;
            sender.notify_client_event(
                app,
                &args.channel,
                event,
                parse_data(args.data.as_deref())?,
                args.socket_id.as_deref(),
                args.user_id.as_deref(),
            )?
        }
        WebhookEvent::MemberAdded => sender.notify_member_added(app, &args.channel, user_id()?)?,
        WebhookEvent::MemberRemoved => {
            sender.notify_member_removed(app, &args.channel, user_id()?)?
        }
        WebhookEvent::ChannelVacated => sender.notify_channel_vacated(app, &args.channel)?,
        WebhookEvent::ChannelOccupied => sender.notify_channel_occupied(app, &args.channel)?,
    };

    if count == 0 {
        print_success(&format!("No webhook of app '{}' subscribes to {}", app.key, args.event));
        queue.shutdown().await;
        return Ok(());
    }

    let idle = queue.wait_idle(WEBHOOK_QUEUE);
    tokio::pin!(idle);
    loop {
        tokio::select! {
            () = &mut idle => break,
            Some(report) = reports.recv() => print_report(&report),
        }
    }
    while let Ok(report) = reports.try_recv() {
        print_report(&report);
    }

    queue.shutdown().await;
    Ok(())
}

/// Reject options the chosen event kind would silently ignore.
fn check_event_args(args: &SendArgs) -> Result<()> {
    if args.event == WebhookEvent::ClientEvent {
        return Ok(());
    }
    let client_only = [
        ("--client-event", args.client_event.is_some()),
        ("--socket-id", args.socket_id.is_some()),
        ("--data", args.data.is_some()),
    ];
    if let Some((flag, _)) = client_only.iter().find(|(_, set)| *set) {
        bail!("{flag} only applies to client_event, not {}", args.event);
    }
    let takes_user = matches!(args.event, WebhookEvent::MemberAdded | WebhookEvent::MemberRemoved);
    if args.user_id.is_some() && !takes_user {
        bail!("--user-id does not apply to {}", args.event);
    }
    Ok(())
}

fn parse_data(raw: Option<&str>) -> Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str(raw).context("--data is not valid JSON")? {
        Value::Object(map) => Ok(map),
        _ => bail!("--data must be a JSON object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(event: WebhookEvent) -> SendArgs {
        SendArgs {
            app: "app-key".into(),
            event,
            channel: "room".into(),
            user_id: None,
            socket_id: None,
            client_event: None,
            data: None,
        }
    }

    #[test]
    fn test_client_only_options_are_rejected_for_other_events() {
        let mut vacated = args(WebhookEvent::ChannelVacated);
        vacated.data = Some("{}".into());
        let err = check_event_args(&vacated).unwrap_err();
        assert!(err.to_string().contains("--data"));

        let mut added = args(WebhookEvent::MemberAdded);
        added.user_id = Some("u1".into());
        check_event_args(&added).unwrap();
        added.socket_id = Some("s1".into());
        assert!(check_event_args(&added).is_err());

        let mut occupied = args(WebhookEvent::ChannelOccupied);
        occupied.user_id = Some("u1".into());
        assert!(check_event_args(&occupied).is_err());

        let mut client = args(WebhookEvent::ClientEvent);
        client.client_event = Some("client-x".into());
        client.socket_id = Some("s1".into());
        client.data = Some("{}".into());
        client.user_id = Some("u1".into());
        check_event_args(&client).unwrap();
    }

    #[test]
    fn test_parse_data() {
        assert!(parse_data(None).unwrap().is_empty());
        assert_eq!(parse_data(Some(r#"{"foo": 1}"#)).unwrap()["foo"], 1);
        assert!(parse_data(Some("[1, 2]")).is_err());
        assert!(parse_data(Some("{")).is_err());
    }
}
