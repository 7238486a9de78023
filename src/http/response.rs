//! Status line + headers into the write buffer; body delivered as a
//! memory-mapped file region via vectored write. Mirrors
//! `examples/original_source/code/http/httpresponse.{h,cpp}`: same MIME
//! table, same error-code-to-page table, same unset-code sentinel.

use std::fs::File;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::buffer::Buffer;

pub const CODE_UNSET: u16 = u16::MAX;

fn reason_phrase(code: u16) -> &'static str {
    match code {
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        _ => "Bad Request",
    }
}

fn error_page(code: u16) -> Option<&'static str> {
    match code {
        400 => Some("/400.html"),
        403 => Some("/403.html"),
        404 => Some("/404.html"),
        _ => None,
    }
}

fn mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
        .as_str()
    {
        "html" => "text/html",
        "xml" => "text/xml",
        "xhtml" => "application/xhtml+xml",
        "txt" => "text/plain",
        "rtf" => "application/rtf",
        "pdf" => "application/pdf",
        "word" => "application/msword",
        "png" => "image/png",
        "gif" => "image/gif",
        "jpg" | "jpeg" => "image/jpeg",
        "au" => "audio/basic",
        "mpeg" | "mpg" => "video/mpeg",
        "avi" => "video/x-msvideo",
        "gz" => "application/x-gzip",
        "tar" => "application/x-tar",
        "css" => "text/css",
        "js" => "application/javascript",
        _ => "text/plain",
    }
}

const INLINE_ERROR_BODY: &str = "<html><body><h1>Server Error</h1></body></html>";

/// Status code, resolved path, and (when the resolved file mapped
/// successfully) the owning file and its mapping. Dropping the response
/// drops the mapping, satisfying the spec's "unmap exactly once" rule —
/// there is no separate explicit unmap call, `Drop` is the single release
/// path (reinit simply replaces `self` with a fresh one, which drops the
/// old mapping too).
pub struct HttpResponse {
    pub code: u16,
    pub keep_alive: bool,
    path: PathBuf,
    mapped: Option<(File, Mmap)>,
    body_offset: usize,
}

impl HttpResponse {
    /// `code` is `CODE_UNSET` for a normally-resolved request; pass an
    /// explicit 4xx (e.g. 400 for a malformed request line, whose `path` is
    /// meaningless) to force an error page regardless of stat result. An
    /// explicit code always wins: it is never re-derived from stat'ing
    /// `path`, so a malformed request's empty path (which resolves to `root`
    /// itself, a directory) can't get reinterpreted as a 404.
    pub fn make(root: &Path, path: &str, keep_alive: bool, code: u16) -> Self {
        let mut resolved = root.join(path.trim_start_matches('/'));
        let code = if code == CODE_UNSET {
            resolve_code(&resolved, code)
        } else {
            code
        };

        if let Some(page) = error_page(code) {
            resolved = root.join(page.trim_start_matches('/'));
        }

        let mapped = File::open(&resolved)
            .ok()
            .and_then(|f| unsafe { Mmap::map(&f) }.ok().map(|m| (f, m)));

        Self {
            code,
            keep_alive,
            path: resolved,
            mapped,
            body_offset: 0,
        }
    }

    pub fn content_length(&self) -> usize {
        self.mapped.as_ref().map(|(_, m)| m.len()).unwrap_or(INLINE_ERROR_BODY.len())
    }

    /// Remaining unsent portion of the mapped body.
    pub fn mapped_body(&self) -> Option<&[u8]> {
        self.mapped.as_ref().map(|(_, m)| &m[self.body_offset..])
    }

    /// Record that `n` bytes of the mapped body have been written.
    pub fn advance_body(&mut self, n: usize) {
        self.body_offset += n;
    }

    /// Writes the status line and headers into `buf`. The body, if mapped,
    /// is delivered separately by the connection's vectored write — it is
    /// never copied into `buf`.
    pub fn write_headers(&self, buf: &mut Buffer) {
        buf.append_str(&format!("HTTP/1.1 {} {}\r\n", self.code, reason_phrase(self.code)));

        if self.keep_alive {
            buf.append_str("Connection: keep-alive\r\n");
            buf.append_str("keep-alive: max=6,timeout=120\r\n");
        } else {
            buf.append_str("Connection: close\r\n");
        }

        buf.append_str(&format!("Content-type: {}\r\n", mime_type(&self.path)));
        buf.append_str(&format!("Content-length: {}\r\n\r\n", self.content_length()));

        if self.mapped.is_none() {
            buf.append_str(INLINE_ERROR_BODY);
        }
    }
}

fn resolve_code(path: &Path, code: u16) -> u16 {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => 404,
        Ok(meta) if meta.mode() & 0o004 == 0 => 403,
        Ok(_) if code == CODE_UNSET => 200,
        Ok(_) => code,
        Err(_) => 404,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn serves_existing_readable_file_as_200() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), b"hello").unwrap();

        let resp = HttpResponse::make(dir.path(), "/index.html", true, CODE_UNSET);
        assert_eq!(resp.code, 200);
        assert_eq!(resp.mapped_body(), Some(&b"hello"[..]));
    }

    #[test]
    fn missing_file_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let resp = HttpResponse::make(dir.path(), "/missing.png", true, CODE_UNSET);
        assert_eq!(resp.code, 404);
    }

    #[test]
    fn directory_target_is_404() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let resp = HttpResponse::make(dir.path(), "/sub", true, CODE_UNSET);
        assert_eq!(resp.code, 404);
    }

    #[test]
    fn unreadable_file_is_403() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("secret.html");
        let mut f = File::create(&file_path).unwrap();
        f.write_all(b"x").unwrap();
        std::fs::set_permissions(&file_path, std::fs::Permissions::from_mode(0o600)).unwrap();

        let resp = HttpResponse::make(dir.path(), "/secret.html", true, CODE_UNSET);
        assert_eq!(resp.code, 403);
    }

    #[test]
    fn forced_400_rewrites_to_error_page() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("400.html"), b"bad").unwrap();
        let resp = HttpResponse::make(dir.path(), "/anything", true, 400);
        assert_eq!(resp.code, 400);
        assert_eq!(resp.mapped_body(), Some(&b"bad"[..]));
    }

    #[test]
    fn malformed_request_line_with_empty_path_stays_400_not_404() {
        // A failed request-line parse leaves `HttpRequest::path` at its
        // default `""`, so `root.join("")` is `root` itself — a directory.
        // The explicit 400 passed in must win over the stat-based 404 that
        // `resolve_code` would otherwise derive from that.
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("400.html"), b"bad request").unwrap();
        let resp = HttpResponse::make(dir.path(), "", true, 400);
        assert_eq!(resp.code, 400);
        assert_eq!(resp.mapped_body(), Some(&b"bad request"[..]));
    }

    #[test]
    fn mime_lookup_covers_fixed_table_and_falls_back_to_text_plain() {
        assert_eq!(mime_type(Path::new("a.css")), "text/css");
        assert_eq!(mime_type(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(mime_type(Path::new("a.unknownext")), "text/plain");
    }
}
