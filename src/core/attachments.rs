//! Pending attachments awaiting the next send.
//!
//! Decoding runs on spawned tasks; finished payloads come back over a channel
//! and are folded into the queue the next time its owner touches it. A send
//! that happens before a decode finishes simply does not carry that payload.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Largest attachment accepted, in bytes.
pub const MAX_ATTACHMENT_BYTES: usize = 5 * 1024 * 1024;

const IMAGE_TYPES: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("svg", "image/svg+xml"),
];

const FILE_TYPES: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("csv", "text/csv"),
    ("json", "application/json"),
];

const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub name: String,
    pub mime: String,
    /// Base64 payload without any data-URL prefix.
    pub data: String,
}

impl Attachment {
    pub fn encode(name: impl Into<String>, mime: impl Into<String>, bytes: &[u8]) -> Self {
        let mime = mime.into();
        let kind = if mime.starts_with("image/") {
            AttachmentKind::Image
        } else {
            AttachmentKind::File
        };
        Self {
            kind,
            name: name.into(),
            mime,
            data: STANDARD.encode(bytes),
        }
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.data)
    }
}

/// One entry of a clipboard snapshot.
#[derive(Debug, Clone)]
pub struct ClipboardItem {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ClipboardItem {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            bytes,
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }
}

#[derive(Debug)]
pub enum AttachmentError {
    Read { path: PathBuf, source: std::io::Error },
    Empty { name: String },
    TooLarge { name: String, size: usize, max: usize },
}

impl fmt::Display for AttachmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentError::Read { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
            AttachmentError::Empty { name } => write!(f, "{name} is empty"),
            AttachmentError::TooLarge { name, size, max } => {
                write!(f, "{name} is {size} bytes (limit {max})")
            }
        }
    }
}

impl std::error::Error for AttachmentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AttachmentError::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Picks a MIME type from the file extension, then from image magic bytes.
pub fn infer_mime(name: &str, bytes: &[u8]) -> &'static str {
    let extension = Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    if let Some(ext) = extension.as_deref() {
        if let Some((_, mime)) = IMAGE_TYPES
            .iter()
            .chain(FILE_TYPES)
            .find(|(candidate, _)| *candidate == ext)
        {
            return *mime;
        }
    }
    sniff_image(bytes).unwrap_or(FALLBACK_MIME)
}

fn sniff_image(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if bytes.starts_with(b"BM") {
        Some("image/bmp")
    } else {
        None
    }
}

fn encode_checked(name: String, mime: Option<String>, bytes: &[u8]) -> Result<Attachment, AttachmentError> {
    if bytes.is_empty() {
        return Err(AttachmentError::Empty { name });
    }
    if bytes.len() > MAX_ATTACHMENT_BYTES {
        return Err(AttachmentError::TooLarge {
            name,
            size: bytes.len(),
            max: MAX_ATTACHMENT_BYTES,
        });
    }
    let mime = mime.unwrap_or_else(|| infer_mime(&name, bytes).to_string());
    Ok(Attachment::encode(name, mime, bytes))
}

type DecodeResult = Result<Attachment, AttachmentError>;

/// Reads and encodes a file, checking its size before loading it.
async fn read_file(path: PathBuf) -> DecodeResult {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let size = match tokio::fs::metadata(&path).await {
        Ok(meta) => meta.len(),
        Err(source) => return Err(AttachmentError::Read { path, source }),
    };
    if size > MAX_ATTACHMENT_BYTES as u64 {
        return Err(AttachmentError::TooLarge {
            name,
            size: usize::try_from(size).unwrap_or(usize::MAX),
            max: MAX_ATTACHMENT_BYTES,
        });
    }
    match tokio::fs::read(&path).await {
        Ok(bytes) => encode_checked(name, None, &bytes),
        Err(source) => Err(AttachmentError::Read { path, source }),
    }
}


/// Ordered queue of attachments for the next message.
pub struct AttachmentQueue {
    items: Vec<Attachment>,
    tx: mpsc::UnboundedSender<DecodeResult>,
    rx: mpsc::UnboundedReceiver<DecodeResult>,
    in_flight: usize,
}

impl Default for AttachmentQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl AttachmentQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            items: Vec::new(),
            tx,
            rx,
            in_flight: 0,
        }
    }

    /// Reads and encodes `path` in the background. Must be called from within
    /// a tokio runtime.
    pub fn enqueue_from_file(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        let tx = self.tx.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            let _ = tx.send(read_file(path).await);
        });
    }

    /// Encodes an in-memory payload (drag and drop) in the background.
    pub fn enqueue_from_bytes(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.spawn_encode(name.into(), None, bytes);
    }

    /// Enqueues every image entry of a clipboard snapshot, in clipboard order.
    /// Non-image entries are ignored. Returns how many entries were taken.
    pub fn enqueue_from_clipboard(&mut self, items: Vec<ClipboardItem>) -> usize {
        let mut taken = 0;
        for item in items.into_iter().filter(ClipboardItem::is_image) {
            taken += 1;
            let extension = item
                .mime
                .strip_prefix("image/")
                .unwrap_or("bin")
                .split('+')
                .next()
                .unwrap_or("bin")
                .to_string();
            self.spawn_encode(
                format!("pasted-{taken}.{extension}"),
                Some(item.mime),
                item.bytes,
            );
        }
        taken
    }

    fn spawn_encode(&mut self, name: String, mime: Option<String>, bytes: Vec<u8>) {
        let tx = self.tx.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            let _ = tx.send(encode_checked(name, mime, &bytes));
        });
    }

    /// Folds finished decodes into the queue. Returns how many were added.
    pub fn sync(&mut self) -> usize {
        let mut added = 0;
        while let Ok(result) = self.rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            if self.accept(result) {
                added += 1;
            }
        }
        added
    }

    /// Waits until every decode started so far has finished.
    pub async fn settle(&mut self) {
        self.sync();
        while self.in_flight > 0 {
            match self.rx.recv().await {
                Some(result) => {
                    self.in_flight -= 1;
                    self.accept(result);
                }
                None => break,
            }
        }
    }

    fn accept(&mut self, result: DecodeResult) -> bool {
        match result {
            Ok(attachment) => {
                debug!(name = %attachment.name, mime = %attachment.mime, "attachment ready");
                self.items.push(attachment);
                true
            }
            Err(err) => {
                warn!(error = %err, "dropping attachment");
                false
            }
        }
    }

    /// Removes the item at `index`; out-of-range indexes are ignored.
    pub fn remove(&mut self, index: usize) -> Option<Attachment> {
        self.sync();
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    /// Takes every ready attachment, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<Attachment> {
        self.sync();
        std::mem::take(&mut self.items)
    }

    pub fn clear(&mut self) {
        self.sync();
        self.items.clear();
    }

    pub fn items(&mut self) -> &[Attachment] {
        self.sync();
        &self.items
    }

    pub fn len(&mut self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.items().is_empty()
    }

    pub fn pending_decodes(&self) -> usize {
        self.in_flight
    }
}
