//! Then step definitions for account detection BDD tests.

use rstest_bdd_macros::then;

use super::state::{AccountDetectionState, ResolveOutcome, StepResult};

fn resolved(state: &AccountDetectionState) -> StepResult<(String, String, String, Option<String>)> {
    match state
        .outcome
        .get()
        .ok_or_else(|| String::from("outcome should be set"))?
    {
        ResolveOutcome::Resolved {
            cloud,
            username,
            endpoint,
            domain,
        } => Ok((cloud, username, endpoint, domain)),
        ResolveOutcome::Failed { message } => {
            Err(format!("expected an account, resolution failed: {message}"))
        }
    }
}

fn expect_eq(what: &str, actual: &str, expected: &str) -> StepResult<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {what} '{expected}', got '{actual}'"))
    }
}

#[then("the account uses the \"{cloud}\" backend")]
fn account_uses_backend(
    account_detection_state: &AccountDetectionState,
    cloud: String,
) -> StepResult<()> {
    let (actual, ..) = resolved(account_detection_state)?;
    expect_eq("backend", &actual, &cloud)
}

#[then("the account username is \"{username}\"")]
fn account_username(
    account_detection_state: &AccountDetectionState,
    username: String,
) -> StepResult<()> {
    let (_, actual, ..) = resolved(account_detection_state)?;
    expect_eq("username", &actual, &username)
}

#[then("the account endpoint is \"{endpoint}\"")]
fn account_endpoint(
    account_detection_state: &AccountDetectionState,
    endpoint: String,
) -> StepResult<()> {
    let (_, _, actual, _) = resolved(account_detection_state)?;
    expect_eq("endpoint", &actual, &endpoint)
}

#[then("the account domain is \"{domain}\"")]
fn account_domain(
    account_detection_state: &AccountDetectionState,
    domain: String,
) -> StepResult<()> {
    let (.., actual) = resolved(account_detection_state)?;
    let actual = actual.ok_or_else(|| String::from("account has no domain"))?;
    expect_eq("domain", &actual, &domain)
}

#[then("resolution fails mentioning \"{expected}\"")]
fn resolution_fails_mentioning(
    account_detection_state: &AccountDetectionState,
    expected: String,
) -> StepResult<()> {
    match account_detection_state
        .outcome
        .get()
        .ok_or_else(|| String::from("outcome should be set"))?
    {
        ResolveOutcome::Failed { message } if message.contains(&expected) => Ok(()),
        ResolveOutcome::Failed { message } => Err(format!(
            "expected error to contain '{expected}', got: {message}"
        )),
        ResolveOutcome::Resolved { cloud, .. } => {
            Err(format!("expected failure, resolved a {cloud} account"))
        }
    }
}
