//! Product version detection.
//!
//! A short-circuiting cascade of increasingly weak evidence, strongest first:
//!
//! | Method         | Confidence | Evidence                                   |
//! |----------------|-----------:|--------------------------------------------|
//! | MetadataFile   | 90         | explicit version field in a descriptor     |
//! | BinaryResource | 80         | embedded ProductVersion of the executable  |
//! | DirectoryName  | 60         | release year in a directory or file name   |
//! | ContentScan    | 40         | version token near a product token         |
//! | Default        | 0          | configured default bucket                  |
//!
//! A method that yields a token which does not map to a bucket falls through
//! to the next one.

pub mod bucket;
pub mod methods;
pub mod probe;

pub use bucket::BucketThresholds;
pub use probe::{ExifToolProbe, NoProbe, ResourceProbe};

use std::fmt;
use std::path::{Path, PathBuf};

use pfx_common::VersionBucket;
use pfx_config::VersionSettings;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::logging::event_names;

/// Which cascade step produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    MetadataFile,
    BinaryResource,
    DirectoryName,
    ContentScan,
    Default,
}

impl DetectionMethod {
    pub fn confidence(&self) -> u8 {
        match self {
            DetectionMethod::MetadataFile => 90,
            DetectionMethod::BinaryResource => 80,
            DetectionMethod::DirectoryName => 60,
            DetectionMethod::ContentScan => 40,
            DetectionMethod::Default => 0,
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DetectionMethod::MetadataFile => "metadata_file",
            DetectionMethod::BinaryResource => "binary_resource",
            DetectionMethod::DirectoryName => "directory_name",
            DetectionMethod::ContentScan => "content_scan",
            DetectionMethod::Default => "default",
        };
        f.write_str(s)
    }
}

/// Outcome of one cascade run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionSignal {
    pub method: DetectionMethod,
    /// Raw token, absent for [`DetectionMethod::Default`].
    pub detected_value: Option<String>,
    pub bucket: VersionBucket,
    pub confidence: u8,
    /// File or directory the evidence came from.
    pub source: Option<PathBuf>,
}

impl VersionSignal {
    fn found(method: DetectionMethod, value: String, bucket: VersionBucket, source: PathBuf) -> Self {
        Self {
            method,
            detected_value: Some(value),
            bucket,
            confidence: method.confidence(),
            source: Some(source),
        }
    }

    pub fn fallback(bucket: VersionBucket) -> Self {
        Self {
            method: DetectionMethod::Default,
            detected_value: None,
            bucket,
            confidence: 0,
            source: None,
        }
    }

    pub fn is_default(&self) -> bool {
        self.method == DetectionMethod::Default
    }
}

/// Runs the cascade over a directory tree.
pub struct VersionDetector {
    settings: VersionSettings,
    thresholds: BucketThresholds,
    probe: Box<dyn ResourceProbe>,
}

impl fmt::Debug for VersionDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionDetector")
            .field("thresholds", &self.thresholds)
            .field("default_bucket", &self.settings.default_bucket)
            .finish_non_exhaustive()
    }
}

impl VersionDetector {
    /// Detector using the configured resource tool when it is installed.
    pub fn from_settings(settings: &VersionSettings) -> Self {
        Self::with_probe(settings, Box::new(ExifToolProbe::locate(&settings.resource_tool)))
    }

    pub fn with_probe(settings: &VersionSettings, probe: Box<dyn ResourceProbe>) -> Self {
        Self {
            settings: settings.clone(),
            thresholds: BucketThresholds::from_settings(settings),
            probe,
        }
    }

    pub fn settings(&self) -> &VersionSettings {
        &self.settings
    }

    /// Run the cascade over `root`. Never fails; the last step is the default bucket.
    pub fn detect(&self, root: &Path) -> VersionSignal {
        let signal = self.cascade(root);
        info!(
            target: event_names::VERSION_DETECTED,
            root = %root.display(),
            method = %signal.method,
            value = signal.detected_value.as_deref().unwrap_or("-"),
            bucket = %signal.bucket,
            confidence = signal.confidence,
            "version detected"
        );
        signal
    }

    fn cascade(&self, root: &Path) -> VersionSignal {
        let s = &self.settings;

        if let Some(signal) = methods::metadata_file(root, &s.descriptor_files, s.metadata_depth)
            .and_then(|(value, path)| self.mapped(DetectionMethod::MetadataFile, value, path))
        {
            return signal;
        }

        let executable = methods::find_executable(root, &s.executables, s.directory_depth);
        if let Some(exe) = &executable {
            if let Some(signal) = self
                .probe
                .product_version(exe)
                .and_then(|value| self.mapped(DetectionMethod::BinaryResource, value, exe.clone()))
            {
                return signal;
            }
        }

        if let Some(signal) = methods::directory_name(root, s.directory_depth)
            .and_then(|(value, path)| self.mapped(DetectionMethod::DirectoryName, value, path))
        {
            return signal;
        }

        if let Some(exe) = &executable {
            if let Some(signal) =
                methods::content_scan(exe, &s.product_tokens, s.proximity_bytes, s.scan_cap_bytes)
                    .and_then(|value| self.mapped(DetectionMethod::ContentScan, value, exe.clone()))
            {
                return signal;
            }
        }

        VersionSignal::fallback(s.default_bucket)
    }

    fn mapped(&self, method: DetectionMethod, value: String, source: PathBuf) -> Option<VersionSignal> {
        match self.thresholds.bucket_for(&value) {
            Some(bucket) => Some(VersionSignal::found(method, value, bucket, source)),
            None => {
                debug!(method = %method, value = %value, "token does not map to a bucket");
                None
            }
        }
    }
}

/// Combine the pre-install guess with the post-install result.
///
/// The installed tree wins unless its cascade ended at the default, in which
/// case a concrete pre-install result is kept.
pub fn reconcile(pre: &VersionSignal, post: &VersionSignal) -> VersionSignal {
    if post.is_default() && !pre.is_default() {
        debug!(bucket = %pre.bucket, method = %pre.method, "keeping pre-install version signal");
        return pre.clone();
    }
    if !pre.is_default() && !post.is_default() && pre.bucket != post.bucket {
        warn!(
            target: event_names::VERSION_AMBIGUOUS,
            pre = %pre.bucket,
            pre_method = %pre.method,
            post = %post.bucket,
            post_method = %post.method,
            "installer source and installed tree disagree; using installed tree"
        );
    }
    post.clone()
}
