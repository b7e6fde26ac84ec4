//! Individual detection methods of the version cascade.
//!
//! Each returns the raw version token it found, or `None`. Bucket mapping is
//! done by the caller.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Descriptor files larger than this are not parsed.
const MAX_DESCRIPTOR_BYTES: u64 = 4 * 1024 * 1024;
/// Minimum run length for extracted strings.
const MIN_STRING_LEN: usize = 4;

struct Patterns {
    xml_declaration: Regex,
    descriptor: Vec<Regex>,
    year_token: Regex,
    version_token: Regex,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                xml_declaration: Regex::new(r"<\?xml[^>]*\?>").ok()?,
                descriptor: vec![
                    Regex::new(r"<(?:ProductVersion|CodexVersion)>\s*([0-9]+(?:\.[0-9]+)*)\s*<").ok()?,
                    Regex::new(
                        r#""(?:version|productVersion|ProductVersion|codexVersion)"\s*:\s*"?([0-9]+(?:\.[0-9]+)*)"#,
                    )
                    .ok()?,
                    Regex::new(r#"\bversion\s*=\s*"([0-9]+(?:\.[0-9]+)*)""#).ok()?,
                ],
                year_token: Regex::new(r"20[1-3][0-9]").ok()?,
                version_token: Regex::new(r"(?:^|[^0-9.])([0-9]{2}\.[0-9]+(?:\.[0-9]+)*|20[1-3][0-9])(?:[^0-9]|$)")
                    .ok()?,
            })
        })
        .as_ref()
}

/// Files under `root` up to `depth`, in sorted walk order.
fn files_under(root: &Path, depth: usize) -> impl Iterator<Item = walkdir::DirEntry> {
    WalkDir::new(root)
        .max_depth(depth)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
}

/// Explicit version field in the content of a descriptor file.
pub fn version_from_descriptor(content: &str) -> Option<String> {
    let patterns = patterns()?;
    let stripped = patterns.xml_declaration.replace_all(content, "");
    patterns
        .descriptor
        .iter()
        .find_map(|re| re.captures(&stripped).map(|caps| caps[1].to_string()))
}

/// Metadata method: the first descriptor (in `descriptors` priority order)
/// that declares a version.
pub fn metadata_file(root: &Path, descriptors: &[String], depth: usize) -> Option<(String, PathBuf)> {
    let files: Vec<PathBuf> = files_under(root, depth).map(|e| e.into_path()).collect();
    for descriptor in descriptors {
        let suffix = Path::new(descriptor);
        for path in files.iter().filter(|p| {
            p.strip_prefix(root)
                .map(|rel| rel.ends_with(suffix))
                .unwrap_or(false)
        }) {
            let Ok(meta) = std::fs::metadata(path) else { continue };
            if meta.len() > MAX_DESCRIPTOR_BYTES {
                debug!(path = %path.display(), size = meta.len(), "descriptor too large, skipped");
                continue;
            }
            let Ok(bytes) = std::fs::read(path) else { continue };
            let content = String::from_utf8_lossy(&bytes);
            if let Some(version) = version_from_descriptor(&content) {
                return Some((version, path.clone()));
            }
            trace!(path = %path.display(), "descriptor without version field");
        }
    }
    None
}

/// Name prefixes whose trailing year belongs to a runtime library or
/// toolchain, not the product.
const NON_PRODUCT_YEAR_PREFIXES: &[&str] = &["vcrun", "vcredist", "msvc", "vs", "vc", "dotnet"];

/// Release year token in a single file or directory name.
///
/// Any `2010`..`2039` run not adjacent to other digits counts, unless the
/// text right before it is a known library prefix (`vcrun2019`, `vs2017`).
pub fn year_in_name(name: &str) -> Option<String> {
    let lower = name.to_ascii_lowercase();
    patterns()?.year_token.find_iter(&lower).find_map(|m| {
        let bytes = lower.as_bytes();
        let digit_before = m.start() > 0 && bytes[m.start() - 1].is_ascii_digit();
        let digit_after = bytes.get(m.end()).map_or(false, u8::is_ascii_digit);
        if digit_before || digit_after {
            return None;
        }
        let before = lower[..m.start()].trim_end_matches(|c: char| c == '_' || c == '-');
        if NON_PRODUCT_YEAR_PREFIXES.iter().any(|p| before.ends_with(p)) {
            return None;
        }
        Some(m.as_str().to_string())
    })
}

/// Directory-name method: first entry under `root` (sorted walk, `root`
/// itself excluded) whose name carries a release year.
pub fn directory_name(root: &Path, depth: usize) -> Option<(String, PathBuf)> {
    WalkDir::new(root)
        .min_depth(1)
        .max_depth(depth)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .find_map(|entry| {
            let name = entry.file_name().to_string_lossy();
            year_in_name(&name).map(|year| (year, entry.path().to_path_buf()))
        })
}

/// Main executable under `root`: first match for the earliest name in `names`.
pub fn find_executable(root: &Path, names: &[String], depth: usize) -> Option<PathBuf> {
    let files: Vec<PathBuf> = files_under(root, depth).map(|e| e.into_path()).collect();
    names.iter().find_map(|name| {
        files
            .iter()
            .find(|p| {
                p.file_name()
                    .map(|f| f.to_string_lossy().eq_ignore_ascii_case(name))
                    .unwrap_or(false)
            })
            .cloned()
    })
}

/// A printable string found in binary data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedString {
    /// Byte offset in the scanned data.
    pub offset: usize,
    pub text: String,
    /// Bytes per character: 1 for ASCII, 2 for UTF-16LE.
    pub width: usize,
}

fn is_printable(b: u8) -> bool {
    b == b' ' || b.is_ascii_graphic()
}

/// ASCII and UTF-16LE printable runs of at least four characters.
pub fn extract_strings(data: &[u8]) -> Vec<ExtractedString> {
    let mut out = Vec::new();

    let mut start = None;
    for (i, &b) in data.iter().chain(std::iter::once(&0u8)).enumerate() {
        match (is_printable(b) && i < data.len(), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                if i - s >= MIN_STRING_LEN {
                    out.push(ExtractedString {
                        offset: s,
                        text: String::from_utf8_lossy(&data[s..i]).into_owned(),
                        width: 1,
                    });
                }
                start = None;
            }
            _ => {}
        }
    }

    // UTF-16LE runs at both alignments.
    for align in 0..2 {
        let mut run_start = None;
        let mut text = String::new();
        let mut i = align;
        loop {
            let unit = data.get(i..i + 2);
            let printable = matches!(unit, Some([lo, 0]) if is_printable(*lo));
            if printable {
                if run_start.is_none() {
                    run_start = Some(i);
                }
                if let Some([lo, _]) = unit {
                    text.push(*lo as char);
                }
            } else {
                if let Some(s) = run_start.take() {
                    if text.len() >= MIN_STRING_LEN {
                        out.push(ExtractedString {
                            offset: s,
                            text: std::mem::take(&mut text),
                            width: 2,
                        });
                    }
                }
                text.clear();
            }
            if unit.is_none() {
                break;
            }
            i += 2;
        }
    }

    out
}

/// Version token nearest to a product token, within `proximity` bytes.
pub fn version_near_product(
    strings: &[ExtractedString],
    product_tokens: &[String],
    proximity: usize,
) -> Option<String> {
    let patterns = patterns()?;
    let mut products: Vec<usize> = Vec::new();
    let mut versions: Vec<(usize, String)> = Vec::new();

    for s in strings {
        for token in product_tokens {
            for (idx, _) in s.text.match_indices(token.as_str()) {
                products.push(s.offset + idx * s.width);
            }
        }
        for caps in patterns.version_token.captures_iter(&s.text) {
            if let Some(m) = caps.get(1) {
                versions.push((s.offset + m.start() * s.width, m.as_str().to_string()));
            }
        }
    }

    versions
        .into_iter()
        .filter_map(|(offset, value)| {
            products
                .iter()
                .map(|&p| p.abs_diff(offset))
                .min()
                .filter(|&d| d <= proximity)
                .map(|d| (d, offset, value))
        })
        .min_by_key(|(d, offset, _)| (*d, *offset))
        .map(|(_, _, value)| value)
}

/// Content-scan method over the first `cap` bytes of `executable`.
pub fn content_scan(
    executable: &Path,
    product_tokens: &[String],
    proximity: usize,
    cap: u64,
) -> Option<String> {
    let file = File::open(executable).ok()?;
    let mut data = Vec::new();
    file.take(cap).read_to_end(&mut data).ok()?;
    let strings = extract_strings(&data);
    trace!(path = %executable.display(), bytes = data.len(), strings = strings.len(), "content scanned");
    version_near_product(&strings, product_tokens, proximity)
}
