use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio::task;

/// Inserts text into the focused window.
#[async_trait]
pub trait TextInjector: Send + Sync {
    async fn inject(&self, text: String, paste_method: &str) -> Result<()>;
}

/// Injects through the Wayland clipboard and a synthetic paste keystroke.
pub struct ClipboardPaste;

/// ydotool key sequence for a configured paste method.
pub fn paste_keycodes(paste_method: &str) -> &'static str {
    match paste_method {
        "super" => "125:1 47:1 47:0 125:0",              // Super+V
        "ctrl_shift" => "29:1 42:1 47:1 47:0 42:0 29:0", // Ctrl+Shift+V
        _ => "29:1 47:1 47:0 29:0",                      // Ctrl+V
    }
}

#[async_trait]
impl TextInjector for ClipboardPaste {
    /// Copies the text via wl-copy, waits for the clipboard to settle, then
    /// triggers paste via ydotool.
    async fn inject(&self, text: String, paste_method: &str) -> Result<()> {
        tracing::info!("Injecting text: {} chars", text.len());

        let keycodes = paste_keycodes(paste_method);

        // Use spawn_blocking for external commands
        task::spawn_blocking(move || {
            let mut child = Command::new("wl-copy")
                .stdin(Stdio::piped())
                .spawn()
                .context("Failed to spawn wl-copy")?;

            child
                .stdin
                .as_mut()
                .context("Failed to get wl-copy stdin")?
                .write_all(text.as_bytes())
                .context("Failed to write to wl-copy")?;

            let status = child.wait().context("wl-copy failed")?;
            if !status.success() {
                anyhow::bail!("wl-copy exited with {}", status);
            }

            std::thread::sleep(Duration::from_millis(120));

            let output = Command::new("ydotool")
                .args(["key", keycodes])
                .output()
                .context("Failed to execute ydotool")?;
            if !output.status.success() {
                anyhow::bail!(
                    "ydotool exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }

            tracing::info!("Text injected successfully");
            Ok::<(), anyhow::Error>(())
        })
        .await
        .context("spawn_blocking failed")??;

        Ok(())
    }
}
