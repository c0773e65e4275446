//! Artifact file names. The names carry the only metadata the cycle
//! reconstruction relies on besides modification times.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

use crate::config::model::ImagingSettings;

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const FULL_MARKER: &str = "_full_";
const DIFF_MARKER: &str = "_diff_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNaming {
    pub source_label: String,
    pub image_extension: String,
    pub companion_extension: String,
}

impl ArtifactNaming {
    pub fn new(
        source_label: impl Into<String>,
        image_extension: impl Into<String>,
        companion_extension: impl Into<String>,
    ) -> Self {
        Self {
            source_label: source_label.into(),
            image_extension: image_extension.into(),
            companion_extension: companion_extension.into(),
        }
    }

    pub fn from_settings(source_label: &str, imaging: &ImagingSettings) -> Self {
        Self::new(
            source_label,
            imaging.image_extension.clone(),
            imaging.companion_extension.clone(),
        )
    }

    /// `<source>_full_<YYYYMMDD>_<HHMMSS>.<ext>`
    pub fn full_name(&self, at: &DateTime<Local>) -> String {
        format!(
            "{}{}{}.{}",
            self.source_label,
            FULL_MARKER,
            at.format(TIMESTAMP_FORMAT),
            self.image_extension
        )
    }

    /// `<source>_diff_<YYYYMMDD>_<HHMMSS>_#<NN>.<ext>`
    pub fn differential_name(&self, at: &DateTime<Local>, sequence: u32) -> String {
        format!(
            "{}{}{}_#{:02}.{}",
            self.source_label,
            DIFF_MARKER,
            at.format(TIMESTAMP_FORMAT),
            sequence,
            self.image_extension
        )
    }

    pub fn companion_for(&self, image: &Path) -> PathBuf {
        image.with_extension(&self.companion_extension)
    }

    pub fn is_image(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(&self.image_extension))
            .unwrap_or(false)
    }
}

/// Extracts the timestamp of a full artifact named by [`ArtifactNaming::full_name`].
///
/// Returns `None` when the stem does not follow the scheme or the local time
/// is ambiguous or nonexistent (DST transitions).
pub fn full_timestamp(stem: &str) -> Option<DateTime<Local>> {
    let pos = stem.rfind(FULL_MARKER)?;
    let token = &stem[pos + FULL_MARKER.len()..];
    let naive = NaiveDateTime::parse_from_str(token, TIMESTAMP_FORMAT).ok()?;
    Local.from_local_datetime(&naive).single()
}

/// Sequence number of a differential artifact stem, if it has one.
pub fn differential_sequence(stem: &str) -> Option<u32> {
    let pos = stem.rfind(DIFF_MARKER)?;
    let rest = &stem[pos + DIFF_MARKER.len()..];
    let (_, number) = rest.rsplit_once("_#")?;
    number.parse().ok()
}
