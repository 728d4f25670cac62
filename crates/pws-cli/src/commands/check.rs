use anyhow::Result;
use pws_webhooks::WebhooksConfig;

use crate::output::{print_config_summary, print_success};

pub fn check_config(cfg: &WebhooksConfig) -> Result<()> {
    print_config_summary(cfg);
    print_success("Config is valid");
    Ok(())
}
