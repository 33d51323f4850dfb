use anyhow::Context;
use dotsign::{CancellationToken, SignOptions, SignOutcome, StrongNameKey, StrongNameSigner};
use serde::Serialize;

use crate::{
    app::Cli,
    output::{print_output, render_table},
};

#[derive(Debug, Serialize)]
pub struct KeyInfo {
    pub path: String,
    pub bits: u32,
    pub public_key_token: String,
}

#[derive(Debug, Serialize)]
pub struct FileReport {
    pub path: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_len: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SignReport {
    pub key: KeyInfo,
    pub files: Vec<FileReport>,
    pub signed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl From<&SignOutcome> for FileReport {
    fn from(outcome: &SignOutcome) -> Self {
        let path = outcome.path().display().to_string();
        match outcome {
            SignOutcome::Signed { signature_len, .. } => FileReport {
                path,
                status: "signed",
                signature_len: Some(*signature_len),
                error: None,
            },
            SignOutcome::Skipped { .. } => FileReport {
                path,
                status: "skipped",
                signature_len: None,
                error: None,
            },
            SignOutcome::Failed { error, .. } => FileReport {
                path,
                status: "failed",
                signature_len: None,
                error: Some(error.to_string()),
            },
        }
    }
}

impl SignReport {
    pub fn new(key: KeyInfo, outcomes: &[SignOutcome]) -> Self {
        let files: Vec<FileReport> = outcomes.iter().map(FileReport::from).collect();
        let count = |status: &str| files.iter().filter(|file| file.status == status).count();

        SignReport {
            signed: count("signed"),
            skipped: count("skipped"),
            failed: count("failed"),
            key,
            files,
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn display(report: &SignReport) {
    println!(
        "Key: {} ({}-bit, public key token {})",
        report.key.path, report.key.bits, report.key.public_key_token
    );
    println!();

    let rows = report
        .files
        .iter()
        .map(|file| {
            let detail = match (&file.signature_len, &file.error) {
                (Some(len), _) => format!("{len}-byte signature"),
                (None, Some(error)) => error.clone(),
                (None, None) => "no strong name slot".to_string(),
            };
            vec![file.path.clone(), file.status.to_string(), detail]
        })
        .collect();
    println!("{}", render_table(&["FILE", "STATUS", "DETAIL"], rows));

    println!();
    println!(
        "{} signed, {} skipped, {} failed",
        report.signed, report.skipped, report.failed
    );
}

/// Signs every file named on the command line. Returns `false` if any file failed.
pub fn run(cli: &Cli, cancellation: CancellationToken) -> anyhow::Result<bool> {
    let key = StrongNameKey::from_file(&cli.key)
        .with_context(|| format!("failed to load key {}", cli.key.display()))?;
    let token = key
        .public_key_token()
        .context("failed to derive the public key token")?;
    log::debug!("public key token {}", hex(&token));

    let options = SignOptions {
        verify_after_sign: cli.verify,
        cancellation,
        ..SignOptions::default()
    };
    let outcomes = StrongNameSigner::new(&key, options).sign_all(&cli.files);

    let report = SignReport::new(
        KeyInfo {
            path: cli.key.display().to_string(),
            bits: key.bit_length(),
            public_key_token: hex(&token),
        },
        &outcomes,
    );
    print_output(&report, &cli.global, display)?;

    Ok(report.failed == 0)
}
