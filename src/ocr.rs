use std::process::Stdio;

use compact_str::CompactString;
use tokio::{io::AsyncWriteExt as _, process::Command};

mod constants {
    macro_rules! env_or_default {
        ($name:expr, $default:expr) => {
            if let Some(s) = option_env!($name) {
                s
            } else {
                $default
            }
        };
    }

    pub const TESSERACT: &str = env_or_default!("TESSERACT_BIN", "tesseract");
}

pub async fn preflight() -> anyhow::Result<()> {
    let output = Command::new(constants::TESSERACT)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "cannot run {} --version: {e} (is tesseract installed?)",
                constants::TESSERACT,
            )
        })?;
    anyhow::ensure!(
        output.status.success(),
        "{} --version exited with {}",
        constants::TESSERACT,
        output.status,
    );

    // tesseract 5 prints the version to stdout, older builds to stderr
    let banner = if output.stdout.is_empty() {
        &output.stderr
    } else {
        &output.stdout
    };
    let banner = String::from_utf8_lossy(banner);
    tracing::info!(target: "ocr", "using {}", banner.lines().next().unwrap_or_default().trim());
    Ok(())
}

pub async fn recognize(image: &[u8], lang: &str) -> anyhow::Result<String> {
    let mut child = Command::new(constants::TESSERACT)
        .args(["stdin", "stdout", "-l", lang, "--psm", "7"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow::anyhow!("tesseract stdin not captured"))?;
    stdin.write_all(image).await?;
    drop(stdin);

    let output = child.wait_with_output().await?;
    anyhow::ensure!(
        output.status.success(),
        "tesseract exited with {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr).trim(),
    );

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

pub fn clean_answer(raw: &str) -> CompactString {
    raw.chars().filter(char::is_ascii_alphanumeric).collect()
}
