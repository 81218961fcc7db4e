//! File names for downloaded items
//!
//! Names are derived from the message id plus something stable about the
//! object (its title for videos, its unique id otherwise), so the same item
//! always lands at the same path and partial transfers can be resumed.

use crate::types::{MediaItem, MediaKind};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

/// Longest file name, in UTF-8 bytes, that is written to disk
pub const MAX_FILE_NAME_BYTES: usize = 230;

/// Characters that are not allowed in file names on common filesystems
const INVALID_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\n'];

/// Multi-part extensions, tried in order before falling back to the last extension
static MULTI_EXTENSION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // split volumes: .7z.001, .rar.002, .z01.001
        r"(?i)\.(7z|rar|zip|r\d+|z\d+|s\d+|t\d+)\.\d+$",
        // stacked archive formats: .tar.gz, .zip.7z
        r"(?i)\.(tar|zip|7z|rar)(\.(gz|bz2|xz|zip|7z|rar))+$",
        r"(?i)\.(tar\.(gz|bz2|xz)|[a-z0-9]+\.\d+)$",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

static COMPRESSED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\.(7z|rar|zip|tar|gz|bz2|xz|arj|cab|lzh|lzma|tgz|tbz2|txz|z)$",
        r"(?i)\.(tar\.(gz|bz2|xz)|7z\.\d+|rar\.\d+|zip\.\d+)$",
        // old-style split volumes
        r"(?i)\.(r\d+|z\d+|s\d+|t\d+)$",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// File name for `item`, sanitised and truncated
///
/// `date` is the send time of the carrying message; it only appears in
/// names of items whose kind cannot be determined.
pub fn file_name(item: &MediaItem, date: DateTime<Utc>) -> String {
    let raw = match item.kind {
        MediaKind::Video => video_name(item),
        MediaKind::Photo => photo_name(item),
        MediaKind::Document => document_name(item, date),
        MediaKind::Audio | MediaKind::Voice | MediaKind::Animation => generic_name(item),
        MediaKind::Unknown => unknown_name(item, date),
    };
    truncate_file_name(&sanitize_file_name(&raw), MAX_FILE_NAME_BYTES)
}

fn video_name(item: &MediaItem) -> String {
    // Auto-generated titles ("video_2024-01-01_...") differ between uploads of the same file
    let title = item
        .file_name
        .as_deref()
        .filter(|name| !name.to_ascii_lowercase().starts_with("video_"))
        .map(|name| match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => name,
        })
        .unwrap_or("None");
    let extension = extension_for_mime(item.mime_type.as_deref().unwrap_or("video/mp4"))
        .unwrap_or(MediaKind::Video.default_extension());
    format!("{} - {}.{}", item.message_id, title, extension)
}

fn photo_name(item: &MediaItem) -> String {
    let extension = match item.kind {
        MediaKind::Photo => MediaKind::Photo.default_extension(),
        _ => extension_for_mime(item.mime_type.as_deref().unwrap_or("image/jpg"))
            .unwrap_or(MediaKind::Photo.default_extension()),
    };
    format!(
        "{} - {}.{}",
        item.message_id,
        item.file_unique_id.as_deref().unwrap_or("None"),
        extension
    )
}

fn document_name(item: &MediaItem, date: DateTime<Utc>) -> String {
    let Some(mime) = item.mime_type.as_deref().filter(|m| !m.is_empty()) else {
        return unknown_name(item, date);
    };
    if mime.contains("video") {
        return video_name(item);
    }
    if mime.contains("image") {
        return photo_name(item);
    }
    if let Some(original) = item.file_name.as_deref().filter(|n| is_compressed_file(n)) {
        // Split archives need their original names to be reassembled
        tracing::warn!(
            file_name = original,
            "keeping original name for compressed file"
        );
        return original.to_string();
    }
    generic_name(item)
}

fn generic_name(item: &MediaItem) -> String {
    let extension = item
        .file_name
        .as_deref()
        .and_then(extract_full_extension)
        .or_else(|| {
            item.mime_type
                .as_deref()
                .and_then(extension_for_mime)
                .map(str::to_string)
        })
        .unwrap_or_else(|| item.kind.default_extension().to_string());
    format!(
        "{} - {}.{}",
        item.message_id,
        item.file_unique_id.as_deref().unwrap_or("None"),
        extension
    )
}

fn unknown_name(item: &MediaItem, date: DateTime<Utc>) -> String {
    format!(
        "{} - {}.unknown",
        item.message_id,
        date.format("%Y-%m-%d_%H-%M-%S")
    )
}

/// Extension (without dot) for a MIME type
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let mime = mime.split(';').next().unwrap_or(mime).trim();
    let extension = match mime.to_ascii_lowercase().as_str() {
        "video/mp4" => "mp4",
        "video/x-matroska" => "mkv",
        "video/quicktime" => "mov",
        "video/webm" => "webm",
        "video/x-msvideo" => "avi",
        "video/mpeg" => "mpeg",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/heic" => "heic",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/ogg" => "ogg",
        "audio/mp4" | "audio/x-m4a" => "m4a",
        "audio/flac" | "audio/x-flac" => "flac",
        "audio/wav" | "audio/x-wav" => "wav",
        "application/zip" => "zip",
        "application/x-rar-compressed" | "application/vnd.rar" => "rar",
        "application/x-7z-compressed" => "7z",
        "application/x-tar" => "tar",
        "application/gzip" => "gz",
        "application/pdf" => "pdf",
        "application/epub+zip" => "epub",
        "application/json" => "json",
        "text/plain" => "txt",
        _ => return None,
    };
    Some(extension)
}

/// Replace characters that are invalid in file names with `_`
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if INVALID_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Truncate `name` to `limit` UTF-8 bytes, keeping its last extension intact
///
/// # Examples
///
/// ```
/// use media_dl::naming::truncate_file_name;
///
/// assert_eq!(truncate_file_name("abcdefgh.mp4", 8), "abcd.mp4");
/// assert_eq!(truncate_file_name("short.mp4", 230), "short.mp4");
/// ```
pub fn truncate_file_name(name: &str, limit: usize) -> String {
    if name.len() <= limit {
        return name.to_string();
    }
    let (stem, extension) = match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    };
    let budget = limit.saturating_sub(extension.len());
    let mut end = budget.min(stem.len());
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &stem[..end], extension)
}

/// Full extension of a file name, including multi-part forms like `tar.gz` or `7z.001`
pub fn extract_full_extension(name: &str) -> Option<String> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    for pattern in MULTI_EXTENSION_PATTERNS.iter() {
        if let Some(found) = pattern.find(name) {
            return Some(found.as_str().trim_start_matches('.').to_string());
        }
    }
    match name.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < name.len() => Some(name[dot + 1..].to_string()),
        _ => None,
    }
}

/// Whether the name looks like an archive or one volume of a split archive
pub fn is_compressed_file(name: &str) -> bool {
    !name.is_empty() && COMPRESSED_PATTERNS.iter().any(|p| p.is_match(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(kind: MediaKind) -> MediaItem {
        MediaItem {
            chat_id: -1001,
            message_id: 42,
            kind,
            file_name: None,
            file_unique_id: Some("AQADuniq".into()),
            mime_type: None,
            file_size: 100,
        }
    }

    fn date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).single().unwrap_or_default()
    }

    #[test]
    fn video_uses_title_and_mime_extension() {
        let mut video = item(MediaKind::Video);
        video.file_name = Some("My Clip.mov".into());
        video.mime_type = Some("video/quicktime".into());
        assert_eq!(file_name(&video, date()), "42 - My Clip.mov");

        video.file_name = Some("video_2025-01-01_10-00-00.mp4".into());
        video.mime_type = None;
        assert_eq!(file_name(&video, date()), "42 - None.mp4");
    }

    #[test]
    fn photo_and_generic_kinds_use_unique_id() {
        assert_eq!(file_name(&item(MediaKind::Photo), date()), "42 - AQADuniq.jpg");

        let mut voice = item(MediaKind::Voice);
        voice.mime_type = Some("audio/ogg".into());
        assert_eq!(file_name(&voice, date()), "42 - AQADuniq.ogg");

        let mut audio = item(MediaKind::Audio);
        audio.file_name = Some("song.flac".into());
        audio.mime_type = Some("audio/mpeg".into());
        assert_eq!(
            file_name(&audio, date()),
            "42 - AQADuniq.flac",
            "original extension wins over MIME"
        );
    }

    #[test]
    fn documents_dispatch_on_mime() {
        let mut doc = item(MediaKind::Document);
        doc.mime_type = Some("video/mp4".into());
        doc.file_name = Some("lecture.mp4".into());
        assert_eq!(file_name(&doc, date()), "42 - lecture.mp4");

        doc.mime_type = Some("image/png".into());
        assert_eq!(file_name(&doc, date()), "42 - AQADuniq.png");

        doc.mime_type = Some("application/x-7z-compressed".into());
        doc.file_name = Some("backup.7z.001".into());
        assert_eq!(file_name(&doc, date()), "backup.7z.001");

        doc.mime_type = Some("application/pdf".into());
        doc.file_name = Some("paper.pdf".into());
        assert_eq!(file_name(&doc, date()), "42 - AQADuniq.pdf");

        doc.mime_type = None;
        assert_eq!(file_name(&doc, date()), "42 - 2025-03-04_05-06-07.unknown");
    }

    #[test]
    fn unknown_kind_uses_message_date() {
        assert_eq!(
            file_name(&item(MediaKind::Unknown), date()),
            "42 - 2025-03-04_05-06-07.unknown"
        );
    }

    #[test]
    fn invalid_characters_are_replaced() {
        assert_eq!(sanitize_file_name("a/b\\c:d*e?f\"g<h>i|j\nk"), "a_b_c_d_e_f_g_h_i_j_k");

        let mut video = item(MediaKind::Video);
        video.file_name = Some("what: now?.mp4".into());
        assert_eq!(file_name(&video, date()), "42 - what_ now_.mp4");
    }

    #[test]
    fn truncation_respects_utf8_boundaries_and_extension() {
        let long = format!("{}.mp4", "é".repeat(200));
        let truncated = truncate_file_name(&long, MAX_FILE_NAME_BYTES);
        assert!(truncated.len() <= MAX_FILE_NAME_BYTES);
        assert!(truncated.ends_with(".mp4"));
        assert!(truncated.starts_with('é'));

        assert_eq!(truncate_file_name("noextension", 4), "noex");
    }

    #[test]
    fn full_extensions() {
        assert_eq!(extract_full_extension("a.tar.gz").as_deref(), Some("tar.gz"));
        assert_eq!(extract_full_extension("a.7z.001").as_deref(), Some("7z.001"));
        assert_eq!(extract_full_extension("a.ZIP.002").as_deref(), Some("ZIP.002"));
        assert_eq!(extract_full_extension("movie.mkv").as_deref(), Some("mkv"));
        assert_eq!(extract_full_extension("README"), None);
        assert_eq!(extract_full_extension("  "), None);
    }

    #[test]
    fn compressed_detection() {
        for name in ["a.zip", "a.RAR", "a.tar.gz", "a.7z.001", "a.r01", "a.tgz"] {
            assert!(is_compressed_file(name), "{name}");
        }
        for name in ["a.mp4", "a.pdf", "", "zip"] {
            assert!(!is_compressed_file(name), "{name}");
        }
    }

    #[test]
    fn mime_parameters_are_ignored() {
        assert_eq!(extension_for_mime("audio/ogg; codecs=opus"), Some("ogg"));
        assert_eq!(extension_for_mime("application/x-unknown"), None);
    }
}
