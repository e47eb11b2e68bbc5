//! HTTP client for the remote detection service.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::model::{service_error_text, DetectionResult};

const MAX_RESPONSE_BYTES: u64 = 16 * 1024 * 1024;
const FILE_FIELD: &str = "file";

static BOUNDARY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Remote detection service seam.
///
/// Implementations perform exactly one attempt per call; there is no retry.
pub trait DetectService: Send + Sync {
    /// Service identifier for logs.
    fn name(&self) -> &str;

    /// Submit one image and return the parsed result.
    fn detect(&self, filename: &str, payload: &[u8]) -> Result<DetectionResult>;
}

/// `POST {base}/detect` over HTTP with a single multipart `file` part.
pub struct HttpDetectService {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpDetectService {
    /// `base_url` must already be normalised (see `config::normalize_base_url`).
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            base_url: base_url.to_string(),
            agent,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/detect", self.base_url)
    }
}

impl DetectService for HttpDetectService {
    fn name(&self) -> &str {
        &self.base_url
    }

    fn detect(&self, filename: &str, payload: &[u8]) -> Result<DetectionResult> {
        let form = MultipartForm::single_file(FILE_FIELD, filename, payload);
        let response = self
            .agent
            .post(&self.endpoint())
            .set("Content-Type", &form.content_type())
            .send_bytes(&form.body);

        match response {
            Ok(response) => {
                let body = read_body(response)?;
                DetectionResult::from_json(&body).map_err(|err| match service_error_text(&body) {
                    Some(text) => anyhow!("detection service error: {}", text),
                    None => err,
                })
            }
            Err(ureq::Error::Status(code, response)) => {
                let body = read_body(response).unwrap_or_default();
                match service_error_text(&body) {
                    Some(text) => Err(anyhow!("detection service returned {}: {}", code, text)),
                    None => Err(anyhow!("detection service returned status {}", code)),
                }
            }
            Err(err) => Err(err)
                .with_context(|| format!("connect to detection service at {}", self.endpoint())),
        }
    }
}

fn read_body(response: ureq::Response) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    response
        .into_reader()
        .take(MAX_RESPONSE_BYTES)
        .read_to_end(&mut body)
        .context("read detection response body")?;
    Ok(body)
}

/// A `multipart/form-data` body with one file part.
pub(crate) struct MultipartForm {
    boundary: String,
    pub(crate) body: Vec<u8>,
}

impl MultipartForm {
    pub(crate) fn single_file(field: &str, filename: &str, payload: &[u8]) -> Self {
        let boundary = pick_boundary(payload);
        let filename = sanitize_filename(filename);
        let mut body = Vec::with_capacity(payload.len() + 256);
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(
            format!("Content-Type: {}\r\n\r\n", guess_mime(&filename)).as_bytes(),
        );
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
        Self { boundary, body }
    }

    pub(crate) fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }
}

fn pick_boundary(payload: &[u8]) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    loop {
        let n = BOUNDARY_COUNTER.fetch_add(1, Ordering::Relaxed);
        let candidate = format!("----scene-scout-{:x}-{:x}", nanos, n);
        if !contains(payload, candidate.as_bytes()) {
            return candidate;
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\r' | '\n' | '\\' => '_',
            c => c,
        })
        .collect();
    if cleaned.trim().is_empty() {
        "upload.bin".to_string()
    } else {
        cleaned
    }
}

pub(crate) fn guess_mime(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipart_body_has_one_file_part() {
        let form = MultipartForm::single_file("file", "cat.JPG", b"\xff\xd8jpeg\xff\xd9");
        let text = String::from_utf8_lossy(&form.body).to_string();
        let boundary = form.content_type().split("boundary=").nth(1).unwrap().to_string();
        assert!(text.starts_with(&format!("--{}\r\n", boundary)));
        assert!(text.contains("name=\"file\"; filename=\"cat.JPG\""));
        assert!(text.contains("Content-Type: image/jpeg\r\n\r\n"));
        assert!(text.ends_with(&format!("\r\n--{}--\r\n", boundary)));
        assert_eq!(text.matches("Content-Disposition").count(), 1);
    }

    #[test]
    fn boundary_never_occurs_in_payload() {
        let payload = b"----scene-scout-deadbeef".repeat(8);
        let form = MultipartForm::single_file("file", "x.png", &payload);
        let boundary = form.content_type().split("boundary=").nth(1).unwrap().to_string();
        assert!(!contains(&payload, boundary.as_bytes()));
    }

    #[test]
    fn filename_quotes_are_escaped() {
        let form = MultipartForm::single_file("file", "a\"b.png", b"x");
        let text = String::from_utf8_lossy(&form.body).to_string();
        assert!(text.contains("filename=\"a_b.png\""));
    }

    #[test]
    fn mime_guess_falls_back_to_octet_stream() {
        assert_eq!(guess_mime("photo.webp"), "image/webp");
        assert_eq!(guess_mime("noext"), "application/octet-stream");
    }
}
