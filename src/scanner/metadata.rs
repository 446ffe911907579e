use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::OnceLock;

/// Best-known capture time for an image.
///
/// Tries EXIF `DateTimeOriginal`, then a `YYYY-MM-DD_HH-MM-SS` stamp in the
/// file name (the capture script writes `photo_<stamp>.jpg`), then the file's
/// modification time.
pub fn capture_time(path: &Path) -> Option<NaiveDateTime> {
    exif_capture_time(path)
        .or_else(|| filename_capture_time(path))
        .or_else(|| modified_time(path))
}

fn exif_capture_time(path: &Path) -> Option<NaiveDateTime> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;
    let field = exif.get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY)?;

    if let exif::Value::Ascii(ref values) = field.value {
        let raw = values.first()?;
        let dt = exif::DateTime::from_ascii(raw).ok()?;
        return NaiveDate::from_ymd_opt(dt.year as i32, dt.month as u32, dt.day as u32)?
            .and_hms_opt(dt.hour as u32, dt.minute as u32, dt.second as u32);
    }
    None
}

fn filename_capture_time(path: &Path) -> Option<NaiveDateTime> {
    static STAMP: OnceLock<Regex> = OnceLock::new();
    let re = STAMP.get_or_init(|| {
        Regex::new(r"(\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2})").expect("valid stamp regex")
    });

    let name = path.file_stem()?.to_string_lossy();
    let caps = re.captures(&name)?;
    NaiveDateTime::parse_from_str(&caps[1], "%Y-%m-%d_%H-%M-%S").ok()
}

fn modified_time(path: &Path) -> Option<NaiveDateTime> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Local>::from(modified).naive_local())
}
