//! Reading images from the system clipboard through the platform's clipboard
//! tools. These calls block; run them on a blocking thread.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use percent_encoding::percent_decode_str;

use crate::core::attachments::{infer_mime, ClipboardItem};

/// Encodings tried, best first, when the clipboard holds one image in several
/// formats.
const PREFERRED_IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp", "image/gif"];

/// Returns every image on the clipboard.
///
/// A copied image is one clipboard entry in its preferred encoding. Files
/// copied from a file manager (`text/uri-list`) become one entry per image
/// file, in clipboard order.
pub fn read_clipboard_images() -> Result<Vec<ClipboardItem>, String> {
    #[cfg(target_os = "macos")]
    {
        let bytes = run_capture("pngpaste", &["-"])?;
        return Ok(vec![ClipboardItem::new("image/png", bytes)]);
    }
    #[cfg(target_os = "windows")]
    {
        return Err("Reading images from the clipboard is not supported on Windows".to_string());
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        if let Ok(listing) = run_capture("wl-paste", &["--list-types"]) {
            return read_with(&String::from_utf8_lossy(&listing), |mime| {
                run_capture("wl-paste", &["--no-newline", "--type", mime])
            });
        }
        if let Ok(listing) = run_capture("xclip", &["-selection", "clipboard", "-t", "TARGETS", "-o"])
        {
            return read_with(&String::from_utf8_lossy(&listing), |mime| {
                run_capture("xclip", &["-selection", "clipboard", "-t", mime, "-o"])
            });
        }
        Err("No clipboard command found (install wl-paste or xclip)".to_string())
    }
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn read_with<F>(listing: &str, fetch: F) -> Result<Vec<ClipboardItem>, String>
where
    F: Fn(&str) -> Result<Vec<u8>, String>,
{
    let types: Vec<&str> = listing.lines().map(str::trim).collect();

    if types.contains(&"text/uri-list") {
        let uris = fetch("text/uri-list")?;
        let items = image_files(&String::from_utf8_lossy(&uris));
        if !items.is_empty() {
            return Ok(items);
        }
    }

    match preferred_image_type(&types) {
        Some(mime) => Ok(vec![ClipboardItem::new(mime, fetch(mime)?)]),
        None => Ok(Vec::new()),
    }
}

/// Picks the best encoding among the advertised `types`.
pub fn preferred_image_type<'a>(types: &[&'a str]) -> Option<&'a str> {
    PREFERRED_IMAGE_TYPES
        .iter()
        .find_map(|wanted| types.iter().find(|t| t.eq_ignore_ascii_case(wanted)).copied())
        .or_else(|| types.iter().find(|t| t.starts_with("image/")).copied())
}

/// Local paths named by a `text/uri-list` payload. Comments, non-file URIs
/// and files on other hosts are skipped.
pub fn file_uris(list: &str) -> Vec<PathBuf> {
    list.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.strip_prefix("file://"))
        .filter_map(local_path)
        .map(|path| PathBuf::from(percent_decode_str(path).decode_utf8_lossy().into_owned()))
        .collect()
}

/// The path part of a `file://` URI body, when it names this machine.
fn local_path(rest: &str) -> Option<&str> {
    if rest.starts_with('/') {
        return Some(rest);
    }
    let slash = rest.find('/')?;
    rest[..slash]
        .eq_ignore_ascii_case("localhost")
        .then(|| &rest[slash..])
}

fn image_files(list: &str) -> Vec<ClipboardItem> {
    file_uris(list)
        .into_iter()
        .filter_map(|path| read_image_file(&path))
        .collect()
}

fn read_image_file(path: &Path) -> Option<ClipboardItem> {
    let bytes = std::fs::read(path).ok()?;
    let name = path.file_name()?.to_string_lossy();
    let mime = infer_mime(&name, &bytes);
    mime.starts_with("image/")
        .then(|| ClipboardItem::new(mime, bytes))
}

fn run_capture(cmd: &str, args: &[&str]) -> Result<Vec<u8>, String> {
    match Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
    {
        Ok(output) if output.status.success() => Ok(output.stdout),
        Ok(_) => Err(format!("Clipboard command `{}` failed", cmd)),
        Err(_) => Err(format!("Clipboard command `{}` not available", cmd)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn preferred_image_type_favors_png() {
        let types = ["TARGETS", "image/bmp", "image/jpeg", "image/png"];
        assert_eq!(preferred_image_type(&types), Some("image/png"));
        assert_eq!(preferred_image_type(&["image/bmp", "text/plain"]), Some("image/bmp"));
        assert_eq!(preferred_image_type(&["text/plain", "UTF8_STRING"]), None);
    }

    #[test]
    fn file_uris_decode_paths() {
        let list = "# copied\r\nfile:///home/me/My%20Shots/a.png\r\nhttps://example.com/b.png\r\nfile:///tmp/c.jpg\r\n";
        assert_eq!(
            file_uris(list),
            vec![
                PathBuf::from("/home/me/My Shots/a.png"),
                PathBuf::from("/tmp/c.jpg"),
            ]
        );
        assert_eq!(file_uris("file:///tmp/100%"), vec![PathBuf::from("/tmp/100%")]);
        assert_eq!(file_uris("file:///tmp/%zz.png"), vec![PathBuf::from("/tmp/%zz.png")]);
    }

    #[test]
    fn file_uris_accept_localhost_and_skip_remote_hosts() {
        let list = "file://localhost/tmp/d%C3%A9j%C3%A0.png\nfile://LOCALHOST/tmp/e.png\nfile://nas/share/f.png\n";
        assert_eq!(
            file_uris(list),
            vec![PathBuf::from("/tmp/déjà.png"), PathBuf::from("/tmp/e.png")]
        );
    }

    #[test]
    fn image_files_skip_non_images_and_missing_files() {
        let dir = TempDir::new().expect("temp dir");
        let png = dir.path().join("one.png");
        let notes = dir.path().join("notes.txt");
        std::fs::write(&png, [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]).expect("write png");
        std::fs::write(&notes, "hello").expect("write notes");

        let list = format!(
            "file://{}\nfile://{}\nfile://{}/missing.png\n",
            png.display(),
            notes.display(),
            dir.path().display()
        );
        let items = image_files(&list);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].mime, "image/png");
    }
}
