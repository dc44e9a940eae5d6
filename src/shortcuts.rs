use anyhow::{Context, Result, bail};
use evdev::{Device, EventType, KeyCode};
use futures::StreamExt;
use futures::stream;
use std::collections::HashSet;
use tokio::sync::mpsc;

use crate::messages::Trigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modifier {
    Super,
    Alt,
    Ctrl,
    Shift,
}

impl Modifier {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "SUPER" | "META" | "LOGO" | "WIN" => Some(Self::Super),
            "ALT" => Some(Self::Alt),
            "CTRL" | "CONTROL" => Some(Self::Ctrl),
            "SHIFT" => Some(Self::Shift),
            _ => None,
        }
    }

    /// Left and right variants both count.
    fn codes(self) -> [KeyCode; 2] {
        match self {
            Self::Super => [KeyCode::KEY_LEFTMETA, KeyCode::KEY_RIGHTMETA],
            Self::Alt => [KeyCode::KEY_LEFTALT, KeyCode::KEY_RIGHTALT],
            Self::Ctrl => [KeyCode::KEY_LEFTCTRL, KeyCode::KEY_RIGHTCTRL],
            Self::Shift => [KeyCode::KEY_LEFTSHIFT, KeyCode::KEY_RIGHTSHIFT],
        }
    }
}

/// Modifiers held plus one trigger key, e.g. `SUPER+ALT+D`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcut {
    modifiers: Vec<Modifier>,
    key: KeyCode,
}

pub fn parse_shortcut(shortcut: &str) -> Result<Shortcut> {
    let mut modifiers = Vec::new();
    let mut key = None;

    for part in shortcut.split('+') {
        let name = part.trim().to_ascii_uppercase();
        if name.is_empty() {
            bail!("empty key name");
        }

        if let Some(modifier) = Modifier::parse(&name) {
            if !modifiers.contains(&modifier) {
                modifiers.push(modifier);
            }
            continue;
        }

        if key.is_some() {
            bail!("more than one non-modifier key");
        }
        let code = format!("KEY_{}", name)
            .parse::<KeyCode>()
            .map_err(|_| anyhow::anyhow!("unknown key {:?}", part.trim()))?;
        key = Some(code);
    }

    let Some(key) = key else {
        bail!("no trigger key, only modifiers");
    };

    Ok(Shortcut { modifiers, key })
}

/// Turns raw key events into triggers for the configured shortcuts.
pub struct ShortcutTracker {
    bindings: Vec<(Shortcut, Trigger)>,
    pressed: HashSet<u16>,
}

impl ShortcutTracker {
    pub fn new(bindings: Vec<(Shortcut, Trigger)>) -> Self {
        Self {
            bindings,
            pressed: HashSet::new(),
        }
    }

    /// Feed one key event (`value` 1 = press, 0 = release, 2 = autorepeat).
    pub fn on_key(&mut self, code: u16, value: i32) -> Option<Trigger> {
        match value {
            0 => {
                self.pressed.remove(&code);
                None
            }
            1 => {
                self.pressed.insert(code);
                self.bindings
                    .iter()
                    .find(|(shortcut, _)| shortcut.key.code() == code && self.held(shortcut))
                    .map(|(_, trigger)| *trigger)
            }
            _ => None,
        }
    }

    fn held(&self, shortcut: &Shortcut) -> bool {
        shortcut.modifiers.iter().all(|modifier| {
            modifier
                .codes()
                .iter()
                .any(|code| self.pressed.contains(&code.code()))
        })
    }
}

fn keyboards() -> Vec<(std::path::PathBuf, Device)> {
    evdev::enumerate()
        .filter(|(_, device)| {
            device
                .supported_keys()
                .is_some_and(|keys| keys.contains(KeyCode::KEY_ENTER))
        })
        .collect()
}

/// Watch every keyboard for the bound shortcuts and send the matching
/// trigger on `tx` for each activation.
pub async fn monitor_keyboards(
    bindings: Vec<(Shortcut, Trigger)>,
    tx: mpsc::Sender<Trigger>,
) -> Result<()> {
    let devices = keyboards();
    if devices.is_empty() {
        bail!("No readable keyboard devices (is the user in the 'input' group?)");
    }

    let mut streams = Vec::new();
    for (path, device) in devices {
        tracing::debug!(
            "Watching {:?} ({})",
            path,
            device.name().unwrap_or("unnamed")
        );
        let events = device
            .into_event_stream()
            .with_context(|| format!("Failed to open event stream for {:?}", path))?;
        streams.push(
            stream::unfold(events, |mut events| async move {
                match events.next_event().await {
                    Ok(event) => Some((event, events)),
                    Err(e) => {
                        tracing::warn!("Keyboard device stopped: {}", e);
                        None
                    }
                }
            })
            .boxed(),
        );
    }

    tracing::info!("Watching {} keyboard device(s) for shortcuts", streams.len());

    let mut tracker = ShortcutTracker::new(bindings);
    let mut events = stream::select_all(streams);

    while let Some(event) = events.next().await {
        if event.event_type() != EventType::KEY {
            continue;
        }
        if let Some(trigger) = tracker.on_key(event.code(), event.value()) {
            tracing::debug!(?trigger, "Shortcut activated");
            if tx.send(trigger).await.is_err() {
                break;
            }
        }
    }

    Ok(())
}
