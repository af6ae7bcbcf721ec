use anyhow::{Context, Result, bail};
use evdev::{Device, EventType, KeyCode};
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// A key combination. Each group is satisfied by any one of its keys, so
/// `SUPER` matches either meta key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chord {
    groups: Vec<Vec<KeyCode>>,
}

impl Chord {
    pub fn is_held(&self, pressed: &HashSet<KeyCode>) -> bool {
        self.groups
            .iter()
            .all(|group| group.iter().any(|key| pressed.contains(key)))
    }
}

fn key_group(name: &str) -> Option<Vec<KeyCode>> {
    let group = match name {
        "SUPER" | "META" | "LOGO" => vec![KeyCode::KEY_LEFTMETA, KeyCode::KEY_RIGHTMETA],
        "ALT" => vec![KeyCode::KEY_LEFTALT, KeyCode::KEY_RIGHTALT],
        "CTRL" | "CONTROL" => vec![KeyCode::KEY_LEFTCTRL, KeyCode::KEY_RIGHTCTRL],
        "SHIFT" => vec![KeyCode::KEY_LEFTSHIFT, KeyCode::KEY_RIGHTSHIFT],
        "SPACE" => vec![KeyCode::KEY_SPACE],
        "ENTER" => vec![KeyCode::KEY_ENTER],
        _ => vec![single_key(name)?],
    };
    Some(group)
}

fn single_key(name: &str) -> Option<KeyCode> {
    let key = match name {
        "A" => KeyCode::KEY_A,
        "B" => KeyCode::KEY_B,
        "C" => KeyCode::KEY_C,
        "D" => KeyCode::KEY_D,
        "E" => KeyCode::KEY_E,
        "F" => KeyCode::KEY_F,
        "G" => KeyCode::KEY_G,
        "H" => KeyCode::KEY_H,
        "I" => KeyCode::KEY_I,
        "J" => KeyCode::KEY_J,
        "K" => KeyCode::KEY_K,
        "L" => KeyCode::KEY_L,
        "M" => KeyCode::KEY_M,
        "N" => KeyCode::KEY_N,
        "O" => KeyCode::KEY_O,
        "P" => KeyCode::KEY_P,
        "Q" => KeyCode::KEY_Q,
        "R" => KeyCode::KEY_R,
        "S" => KeyCode::KEY_S,
        "T" => KeyCode::KEY_T,
        "U" => KeyCode::KEY_U,
        "V" => KeyCode::KEY_V,
        "W" => KeyCode::KEY_W,
        "X" => KeyCode::KEY_X,
        "Y" => KeyCode::KEY_Y,
        "Z" => KeyCode::KEY_Z,
        "0" => KeyCode::KEY_0,
        "1" => KeyCode::KEY_1,
        "2" => KeyCode::KEY_2,
        "3" => KeyCode::KEY_3,
        "4" => KeyCode::KEY_4,
        "5" => KeyCode::KEY_5,
        "6" => KeyCode::KEY_6,
        "7" => KeyCode::KEY_7,
        "8" => KeyCode::KEY_8,
        "9" => KeyCode::KEY_9,
        "F1" => KeyCode::KEY_F1,
        "F2" => KeyCode::KEY_F2,
        "F3" => KeyCode::KEY_F3,
        "F4" => KeyCode::KEY_F4,
        "F5" => KeyCode::KEY_F5,
        "F6" => KeyCode::KEY_F6,
        "F7" => KeyCode::KEY_F7,
        "F8" => KeyCode::KEY_F8,
        "F9" => KeyCode::KEY_F9,
        "F10" => KeyCode::KEY_F10,
        "F11" => KeyCode::KEY_F11,
        "F12" => KeyCode::KEY_F12,
        _ => return None,
    };
    Some(key)
}

/// Parse a shortcut such as `SUPER+ALT+B`.
pub fn parse_shortcut(shortcut: &str) -> Result<Chord> {
    let mut groups = Vec::new();
    for part in shortcut.split('+') {
        let name = part.trim().to_ascii_uppercase();
        if name.is_empty() {
            bail!("Empty key in shortcut '{}'", shortcut);
        }
        let group = key_group(&name)
            .with_context(|| format!("Unknown key '{}' in shortcut '{}'", part.trim(), shortcut))?;
        groups.push(group);
    }
    Ok(Chord { groups })
}

fn is_keyboard(device: &Device) -> bool {
    device
        .supported_keys()
        .is_some_and(|keys| keys.contains(KeyCode::KEY_A) && keys.contains(KeyCode::KEY_ENTER))
}

/// Watch every keyboard under /dev/input and send `()` each time `chord`
/// goes from released to held.
pub async fn monitor_keyboards(chord: Chord, tx: mpsc::Sender<()>) -> Result<()> {
    let keyboards: Vec<(PathBuf, Device)> = evdev::enumerate()
        .filter(|(_, device)| is_keyboard(device))
        .collect();

    if keyboards.is_empty() {
        bail!("No readable keyboards found (is the user in the 'input' group?)");
    }

    let (key_tx, mut key_rx) = mpsc::channel::<(KeyCode, i32)>(64);
    for (path, device) in keyboards {
        let name = device.name().unwrap_or("unknown").to_string();
        let mut events = match device.into_event_stream() {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!("Cannot read {}: {}", path.display(), e);
                continue;
            }
        };
        tracing::debug!("Monitoring keyboard {} ({})", name, path.display());

        let key_tx = key_tx.clone();
        tokio::spawn(async move {
            loop {
                match events.next_event().await {
                    Ok(event) if event.event_type() == EventType::KEY => {
                        let key = KeyCode::new(event.code());
                        if key_tx.send((key, event.value())).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Keyboard {} went away: {}", name, e);
                        break;
                    }
                }
            }
        });
    }
    drop(key_tx);

    let mut pressed = HashSet::new();
    let mut held = false;
    while let Some((key, value)) = key_rx.recv().await {
        match value {
            0 => {
                pressed.remove(&key);
            }
            1 => {
                pressed.insert(key);
            }
            // autorepeat
            _ => continue,
        }

        let now_held = chord.is_held(&pressed);
        if now_held && !held {
            tracing::debug!("Shortcut pressed");
            if tx.send(()).await.is_err() {
                break;
            }
        }
        held = now_held;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_shortcut() {
        let chord = parse_shortcut("SUPER+ALT+B").unwrap();
        assert_eq!(
            chord.groups,
            vec![
                vec![KeyCode::KEY_LEFTMETA, KeyCode::KEY_RIGHTMETA],
                vec![KeyCode::KEY_LEFTALT, KeyCode::KEY_RIGHTALT],
                vec![KeyCode::KEY_B],
            ]
        );
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            parse_shortcut("ctrl + shift + f5").unwrap(),
            parse_shortcut("CTRL+SHIFT+F5").unwrap()
        );
    }

    #[test]
    fn test_parse_rejects_unknown_keys() {
        assert!(parse_shortcut("SUPER+HYPER").is_err());
        assert!(parse_shortcut("ALT++B").is_err());
        assert!(parse_shortcut("").is_err());
    }

    #[test]
    fn test_chord_matches_either_side_modifier() {
        let chord = parse_shortcut("SUPER+ALT+B").unwrap();
        let mut pressed = HashSet::from([KeyCode::KEY_RIGHTMETA, KeyCode::KEY_LEFTALT]);
        assert!(!chord.is_held(&pressed));

        pressed.insert(KeyCode::KEY_B);
        assert!(chord.is_held(&pressed));

        pressed.remove(&KeyCode::KEY_RIGHTMETA);
        assert!(!chord.is_held(&pressed));
    }
}
