use crate::detection::DetectionResult;
use std::process::Stdio;
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Environment handed to `on_detect` hooks.
pub fn detection_env(result: &DetectionResult) -> Vec<(&'static str, String)> {
    let mut env = vec![
        ("BELTWATCH_CONFIDENCE", result.percent().to_string()),
        ("BELTWATCH_OBJECTS", result.object_count.to_string()),
    ];
    if let Some(bbox) = &result.bbox {
        env.push((
            "BELTWATCH_BBOX",
            format!("{},{},{},{}", bbox.x1, bbox.y1, bbox.x2, bbox.y2),
        ));
    }
    if let Some(camera_id) = &result.camera_id {
        env.push(("BELTWATCH_CAMERA_ID", camera_id.clone()));
    }
    env
}

/// Run `command` through `sh -c` on a background task.
///
/// A failing hook is logged and otherwise ignored.
pub fn run_hook(label: &str, command: &str, env: Vec<(&'static str, String)>) -> JoinHandle<()> {
    let mut child = Command::new("sh");
    child
        .arg("-c")
        .arg(command)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let label = label.to_owned();
    let command = command.to_owned();
    tokio::spawn(async move {
        tracing::debug!("Running {} hook: {}", label, command);
        match child.output().await {
            Ok(output) if output.status.success() => {}
            Ok(output) => tracing::warn!(
                "{} hook `{}` failed ({}): {}",
                label,
                command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Err(e) => tracing::warn!("Cannot run {} hook `{}`: {}", label, command, e),
        }
    })
}
