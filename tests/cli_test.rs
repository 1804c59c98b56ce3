mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

fn sponsorpay() -> Command {
    let mut cmd = Command::new(cargo_bin!("sponsorpay"));
    cmd.env_remove("SPONSORPAY_DB_PATH")
        .env_remove("SPONSORPAY_GATEWAY_SECRET");
    cmd
}

#[test]
fn test_cli_history_header() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = sponsorpay();
    cmd.arg("history").arg("--status").arg("success");

    cmd.assert().success().stdout(predicate::str::starts_with(
        "id,reference,payer,type,target,amount,currency,gateway_fee,platform_fee,net_amount,status,failure_reason,created_at,paid_at",
    ));

    Ok(())
}

#[test]
fn test_cli_history_rejects_unknown_status() {
    sponsorpay()
        .arg("history")
        .arg("--status")
        .arg("refunded")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown payment status"));
}

#[test]
fn test_cli_seed_projects() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("projects.csv");
    common::generate_projects_csv(&path, 5).expect("Failed to generate CSV");

    sponsorpay()
        .arg("seed")
        .arg("--projects")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"projects\": 5"))
        .stdout(predicate::str::contains("\"rejected\": 0"));
}

#[test]
fn test_cli_seed_reports_bad_rows() {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "id, sponsor, recipient").unwrap();
    writeln!(csv, "adoption-1, sponsor-1, recipient-1").unwrap();
    writeln!(csv, "adoption-2, sponsor-2").unwrap();

    sponsorpay()
        .arg("seed")
        .arg("--adoptions")
        .arg(csv.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Error reading adoption"))
        .stdout(predicate::str::contains("\"adoptions\": 1"))
        .stdout(predicate::str::contains("\"rejected\": 1"));
}

#[test]
fn test_cli_webhook_bad_signature_fails() {
    let mut body = tempfile::NamedTempFile::new().unwrap();
    body.write_all(&common::charge_event("charge.success", "pay_1", 100_000))
        .unwrap();

    sponsorpay()
        .arg("--gateway-secret")
        .arg(common::SECRET)
        .arg("webhook")
        .arg("--body")
        .arg(body.path())
        .arg("--signature")
        .arg("00ff")
        .assert()
        .failure()
        .stderr(predicate::str::contains("signature"));
}

#[test]
fn test_cli_webhook_refuses_empty_secret() {
    let raw = common::charge_event("charge.success", "pay_1", 100_000);
    let mut body = tempfile::NamedTempFile::new().unwrap();
    body.write_all(&raw).unwrap();

    // Signed with an empty key, which anyone can compute.
    let forged = {
        use hmac::{Hmac, Mac};
        let mut mac = Hmac::<sha2::Sha512>::new_from_slice(b"").unwrap();
        mac.update(&raw);
        hex::encode(mac.finalize().into_bytes())
    };

    sponsorpay()
        .arg("--gateway-secret")
        .arg("")
        .arg("webhook")
        .arg("--body")
        .arg(body.path())
        .arg("--signature")
        .arg(forged)
        .assert()
        .failure()
        .stderr(predicate::str::contains("webhook secret is not configured"));
}

#[test]
fn test_cli_webhook_unknown_reference_is_acknowledged() {
    let raw = common::charge_event("charge.success", "pay_unknown", 100_000);
    let mut body = tempfile::NamedTempFile::new().unwrap();
    body.write_all(&raw).unwrap();

    sponsorpay()
        .env("SPONSORPAY_GATEWAY_SECRET", common::SECRET)
        .arg("webhook")
        .arg("--body")
        .arg(body.path())
        .arg("--signature")
        .arg(common::sign(&raw))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"disposition\": \"failed\""));
}

#[test]
fn test_cli_initialize_requires_secret() {
    sponsorpay()
        .args([
            "initialize",
            "--payer",
            "sponsor-1",
            "--email",
            "sponsor@example.org",
            "--amount",
            "1000",
            "--type",
            "project-backing",
            "--target",
            "project-1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("gateway secret key is not configured"));
}

#[test]
fn test_cli_initialize_validates_before_calling_gateway() {
    sponsorpay()
        .args([
            "--gateway-secret",
            "sk_test_cli",
            "--gateway-url",
            "http://127.0.0.1:9",
            "initialize",
            "--payer",
            "sponsor-1",
            "--email",
            "sponsor@example.org",
            "--amount",
            "10.005",
            "--type",
            "project-backing",
            "--target",
            "project-1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Validation error"));
}

#[test]
fn test_cli_rejects_invalid_fee_configuration() {
    sponsorpay()
        .args(["--platform-fee-rate", "1.2", "sweep"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("platform rate"));
}
