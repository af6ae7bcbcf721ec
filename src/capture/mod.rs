pub mod directory;
pub mod pattern;
pub mod snapshot;
pub mod source;

pub use directory::DirectorySource;
pub use pattern::{PatternStyle, TestPattern};
pub use snapshot::SnapshotSource;
pub use source::CaptureSource;

use crate::config::SourceConfig;
use std::time::Duration;

/// Build the capture source described by the config.
pub fn from_config(source: &SourceConfig, timeout: Duration) -> Box<dyn CaptureSource> {
    match source {
        SourceConfig::TestPattern {
            width,
            height,
            style,
        } => Box::new(TestPattern::new(*width, *height, *style)),
        SourceConfig::Directory { path, repeat } => Box::new(DirectorySource::new(path, *repeat)),
        SourceConfig::Snapshot { url } => Box::new(SnapshotSource::new(url.clone(), timeout)),
    }
}
