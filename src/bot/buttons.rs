//! Paged inline-keyboard pickers over stored audio and transcription files.
//!
//! Callback data: `<kind>_process|<file name>` and `<kind>_page|<n>`.

use std::io;
use std::path::Path;

use crate::core::{InlineButton, InlineKeyboard};

pub const ITEMS_PER_PAGE: usize = 5;

/// Which artifact directory a picker lists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Audio,
    Transcription,
}

impl FileKind {
    /// Callback data prefix, without the trailing `_`
    pub fn prefix(self) -> &'static str {
        match self {
            FileKind::Audio => "audio",
            FileKind::Transcription => "transcription",
        }
    }

    /// Prefix registered with the router
    pub fn callback_prefix(self) -> String {
        format!("{}_", self.prefix())
    }

    pub fn emoji(self) -> &'static str {
        match self {
            FileKind::Audio => "🎧",
            FileKind::Transcription => "📄",
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            FileKind::Audio => "Select an audio file to process (latest first):",
            FileKind::Transcription => "Select a transcription file to process (latest first):",
        }
    }

    pub fn empty_message(self) -> &'static str {
        match self {
            FileKind::Audio => "❌ No audio files found.",
            FileKind::Transcription => "❌ No transcription files found.",
        }
    }

    fn accepts(self, name: &str) -> bool {
        match self {
            FileKind::Audio => name.ends_with(".ogg") || name.ends_with(".mp3"),
            FileKind::Transcription => name.ends_with(".txt"),
        }
    }
}

/// What a picker button asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerAction {
    Process(String),
    Page(usize),
}

/// Unix timestamp after the last `_` of a file name, 0 when absent
pub fn extract_timestamp(name: &str) -> i64 {
    let tail = name.rsplit('_').next().unwrap_or(name);
    tail.split('.').next().unwrap_or("").parse().unwrap_or(0)
}

/// File names of `kind` in `dir`, latest first. A missing directory is empty.
pub fn list_files(dir: &Path, kind: FileKind) -> io::Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if kind.accepts(&name) {
            files.push(name);
        }
    }

    sort_latest_first(&mut files);
    Ok(files)
}

pub fn sort_latest_first(files: &mut [String]) {
    files.sort_by(|a, b| {
        extract_timestamp(b)
            .cmp(&extract_timestamp(a))
            .then_with(|| b.cmp(a))
    });
}

/// One page of a file listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePage {
    pub files: Vec<String>,
    /// 1-based, clamped into range
    pub page: usize,
    pub total_pages: usize,
}

pub fn paginate(files: &[String], page: usize) -> FilePage {
    let total_pages = files.len().saturating_sub(1) / ITEMS_PER_PAGE + 1;
    let page = page.clamp(1, total_pages);
    let start = (page - 1) * ITEMS_PER_PAGE;

    FilePage {
        files: files.iter().skip(start).take(ITEMS_PER_PAGE).cloned().collect(),
        page,
        total_pages,
    }
}

/// One button per file, plus a navigation row when there are other pages
pub fn file_keyboard(kind: FileKind, page: &FilePage) -> InlineKeyboard {
    let prefix = kind.prefix();
    let mut rows: InlineKeyboard = page
        .files
        .iter()
        .map(|f| {
            vec![InlineButton::new(
                format!("{} {}", kind.emoji(), f),
                format!("{}_process|{}", prefix, f),
            )]
        })
        .collect();

    let mut nav = Vec::new();
    if page.page > 1 {
        nav.push(InlineButton::new(
            "⬅️ Prev",
            format!("{}_page|{}", prefix, page.page - 1),
        ));
    }
    if page.page < page.total_pages {
        nav.push(InlineButton::new(
            "➡️ Next",
            format!("{}_page|{}", prefix, page.page + 1),
        ));
    }
    if !nav.is_empty() {
        rows.push(nav);
    }
    rows
}

pub fn parse_picker_data(kind: FileKind, data: &str) -> Option<PickerAction> {
    let rest = data.strip_prefix(kind.prefix())?.strip_prefix('_')?;
    let (action, value) = rest.split_once('|')?;
    match action {
        "process" if !value.is_empty() => Some(PickerAction::Process(value.to_string())),
        "page" => value.parse().ok().map(PickerAction::Page),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(n: i64) -> Vec<String> {
        (1..=n).map(|i| format!("01_01_2025_10_00_{}.ogg", 1000 + i)).collect()
    }

    #[test]
    fn test_extract_timestamp() {
        assert_eq!(extract_timestamp("21_05_2025_18_30_1747848600.ogg"), 1747848600);
        assert_eq!(extract_timestamp("voice.ogg"), 0);
        assert_eq!(extract_timestamp("a_b.txt"), 0);
        assert_eq!(extract_timestamp("noext_17"), 17);
    }

    #[test]
    fn test_sort_latest_first_with_unparseable_last() {
        let mut files = vec![
            "x_100.ogg".to_string(),
            "odd.ogg".to_string(),
            "y_300.ogg".to_string(),
        ];
        sort_latest_first(&mut files);
        assert_eq!(files, vec!["y_300.ogg", "x_100.ogg", "odd.ogg"]);
    }

    #[test]
    fn test_paginate_clamps_page() {
        let files = names(12);
        let first = paginate(&files, 0);
        assert_eq!(first.page, 1);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.files.len(), 5);

        let last = paginate(&files, 99);
        assert_eq!(last.page, 3);
        assert_eq!(last.files.len(), 2);

        let empty = paginate(&[], 1);
        assert_eq!(empty.total_pages, 1);
        assert!(empty.files.is_empty());
    }

    #[test]
    fn test_keyboard_navigation_rows() {
        let files = names(12);

        let middle = file_keyboard(FileKind::Audio, &paginate(&files, 2));
        assert_eq!(middle.len(), 6);
        let nav = middle.last().unwrap();
        assert_eq!(nav[0].callback_data, "audio_page|1");
        assert_eq!(nav[1].callback_data, "audio_page|3");

        let single = file_keyboard(FileKind::Transcription, &paginate(&names(2), 1));
        assert_eq!(single.len(), 2);
        assert!(single[0][0].callback_data.starts_with("transcription_process|"));
        assert!(single[0][0].text.starts_with("📄 "));
    }

    #[test]
    fn test_parse_picker_data() {
        assert_eq!(
            parse_picker_data(FileKind::Audio, "audio_process|a_1.ogg"),
            Some(PickerAction::Process("a_1.ogg".to_string()))
        );
        assert_eq!(
            parse_picker_data(FileKind::Transcription, "transcription_page|4"),
            Some(PickerAction::Page(4))
        );
        assert_eq!(parse_picker_data(FileKind::Audio, "transcription_page|4"), None);
        assert_eq!(parse_picker_data(FileKind::Audio, "audio_page|x"), None);
        assert_eq!(parse_picker_data(FileKind::Audio, "audio_process|"), None);
    }

    #[test]
    fn test_list_files_filters_and_sorts() {
        let temp = TempDir::new().unwrap();
        for name in ["a_100.ogg", "b_300.mp3", "c_200.txt", "d_400.ogg.part"] {
            std::fs::write(temp.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(temp.path().join("sub_999.ogg")).unwrap();

        assert_eq!(
            list_files(temp.path(), FileKind::Audio).unwrap(),
            vec!["b_300.mp3", "a_100.ogg"]
        );
        assert_eq!(
            list_files(temp.path(), FileKind::Transcription).unwrap(),
            vec!["c_200.txt"]
        );
        assert!(list_files(&temp.path().join("missing"), FileKind::Audio)
            .unwrap()
            .is_empty());
    }
}
