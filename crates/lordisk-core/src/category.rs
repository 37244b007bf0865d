//! Extension-based file categories.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Broad kind of file, derived from its extension.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FileCategory {
    Image,
    Video,
    Audio,
    Document,
    Spreadsheet,
    Presentation,
    Archive,
    Code,
    Data,
    Font,
    Executable,
    System,
    Design,
    Other,
}

impl FileCategory {
    /// Classify an extension. Accepts ".JPG", "jpg" or "".
    pub fn from_extension(extension: &str) -> Self {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "svg" | "webp" | "ico" | "tiff" | "tif"
            | "heic" | "heif" => Self::Image,
            "mp4" | "avi" | "mov" | "mkv" | "wmv" | "flv" | "webm" | "m4v" | "3gp" | "ogv"
            | "mpg" | "mpeg" => Self::Video,
            "mp3" | "wav" | "flac" | "aac" | "ogg" | "m4a" | "wma" | "aiff" | "aif" | "oga"
            | "opus" => Self::Audio,
            "pdf" | "doc" | "docx" | "txt" | "rtf" | "odt" | "pages" | "md" => Self::Document,
            "xls" | "xlsx" | "csv" | "ods" | "numbers" => Self::Spreadsheet,
            "ppt" | "pptx" | "odp" | "key" => Self::Presentation,
            "zip" | "rar" | "tar" | "gz" | "7z" | "bz2" | "xz" | "lzma" => Self::Archive,
            "js" | "ts" | "jsx" | "tsx" | "py" | "java" | "cpp" | "c" | "h" | "html" | "css"
            | "scss" | "sass" | "json" | "xml" | "yml" | "yaml" | "sql" | "php" | "rb" | "go"
            | "rs" | "swift" | "kt" | "sh" | "ps1" | "bat" | "vue" | "svelte" => Self::Code,
            "db" | "sqlite" | "mdb" | "accdb" => Self::Data,
            "ttf" | "otf" | "woff" | "woff2" => Self::Font,
            "exe" | "dmg" | "pkg" | "deb" | "rpm" | "app" => Self::Executable,
            "dll" | "so" | "dylib" | "sys" | "ini" | "cfg" | "conf" => Self::System,
            "psd" | "ai" | "sketch" | "fig" | "xd" | "indd" | "eps" => Self::Design,
            _ => Self::Other,
        }
    }
}
