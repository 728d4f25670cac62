use std::fs;

use anyhow::{Context, Result, anyhow};
use pws_webhooks::{sign_payload, verify_signature};

use crate::cli::{BodyArgs, SignArgs, VerifyArgs};
use crate::output::{print_error, print_success};

fn read_body(args: &BodyArgs) -> Result<Vec<u8>> {
    match (&args.body, &args.body_file) {
        (Some(body), _) => Ok(body.as_bytes().to_vec()),
        (None, Some(path)) => {
            fs::read(path).with_context(|| format!("Failed to read body from {}", path.display()))
        }
        (None, None) => Err(anyhow!("Either --body or --body-file is required")),
    }
}

pub fn sign(args: &SignArgs) -> Result<()> {
    let body = read_body(&args.body)?;
    let signature = sign_payload(&args.secret, &body).map_err(|e| anyhow!("{e}"))?;
    println!("{signature}");
    Ok(())
}

/// Returns whether the signature matched.
pub fn verify(args: &VerifyArgs) -> Result<bool> {
    let body = read_body(&args.body)?;
    let valid = verify_signature(&args.secret, &body, args.signature.trim());
    if valid {
        print_success("Signature is valid");
    } else {
        print_error("Signature does not match body");
    }
    Ok(valid)
}
