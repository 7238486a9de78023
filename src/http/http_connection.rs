//! Owns one socket, one read buffer, one write buffer, the current request
//! and response, and the iovec pair describing outstanding write bytes.
//! Grounded in `examples/original_source/code/http/httpconn.{h,cpp}`.

use std::io::{self, IoSlice};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use mio::net::TcpStream;

use crate::buffer::{write_vectored_to_fd, Buffer};
use crate::http::request::{HttpRequest, ParseOutcome};
use crate::http::response::{HttpResponse, CODE_UNSET};

/// Process-wide live-connection counter (spec §5: "Genuine cross-thread
/// counter; keep it as a single atomic integer").
pub static LIVE_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

pub struct Connection {
    pub stream: TcpStream,
    pub peer_addr: SocketAddr,
    pub read_buf: Buffer,
    pub write_buf: Buffer,
    pub request: HttpRequest,
    pub response: Option<HttpResponse>,
    closed: bool,
    root: Arc<PathBuf>,
}

impl Connection {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr, root: Arc<PathBuf>) -> Self {
        LIVE_CONNECTIONS.fetch_add(1, Ordering::SeqCst);
        Self {
            stream,
            peer_addr,
            read_buf: Buffer::new(),
            write_buf: Buffer::new(),
            request: HttpRequest::new(),
            response: None,
            closed: false,
            root,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Drain the socket into the read buffer, repeating `read_from_fd`
    /// until it itself returns `<= 0` bytes (EOF) or a would-block/error.
    /// Returns that terminating call's own result (spec §4.4's "return the
    /// last syscall result") rather than the sum of bytes pulled across the
    /// drain loop — a `0` (peer FIN) seen only on the final call of the
    /// drain must still be visible to the caller as `Ok(0)`, not folded
    /// into an earlier nonzero total.
    pub fn read(&mut self) -> io::Result<usize> {
        loop {
            match self.read_buf.read_from_fd(&self.stream) {
                Ok(0) => return Ok(0),
                Ok(_) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Parse as far as possible, run the auth side-effect for the two form
    /// endpoints, build a response, and stage the write buffer. Returns
    /// whether the request was well-formed (drives the reactor's
    /// read-rearm vs write-arm decision).
    pub fn process(&mut self, db_pool: &crate::db::Pool) -> bool {
        let outcome = self.request.parse(&mut self.read_buf);
        let (code, ok) = match outcome {
            ParseOutcome::Complete => (CODE_UNSET, true),
            ParseOutcome::Incomplete => return false,
            ParseOutcome::Malformed(code) => (code, false),
        };

        if ok {
            self.run_auth_side_effect(db_pool);
        }

        let keep_alive = self.request.keep_alive();
        let response = HttpResponse::make(&self.root, &self.request.path, keep_alive, code);
        response.write_headers(&mut self.write_buf);
        self.response = Some(response);
        self.request.reset();
        ok
    }

    /// `writev` the header buffer and the mapped file body until pending
    /// bytes reach zero or the call would block/error.
    pub fn write(&mut self) -> io::Result<usize> {
        let mut total = 0usize;
        loop {
            if self.write_buf.readable_bytes() == 0
                && self
                    .response
                    .as_ref()
                    .and_then(|r| r.mapped_body())
                    .map(|b| b.is_empty())
                    .unwrap_or(true)
            {
                return Ok(total);
            }

            let header_slice = self.write_buf.peek();
            let body_slice = self
                .response
                .as_ref()
                .and_then(|r| r.mapped_body())
                .unwrap_or(&[]);

            let slices = [IoSlice::new(header_slice), IoSlice::new(body_slice)];
            let n = match write_vectored_to_fd(&self.stream, &slices) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(total),
                Err(e) => return Err(e),
            };
            if n == 0 {
                return Ok(total);
            }
            total += n;

            let header_len = header_slice.len();
            if n >= header_len {
                self.write_buf.retrieve(header_len);
                let consumed_from_body = n - header_len;
                self.advance_mapped_body(consumed_from_body);
            } else {
                self.write_buf.retrieve(n);
            }
        }
    }

    /// If this is a `POST` form submission to one of the two form
    /// endpoints, consult the DB and rewrite the path to `/welcome.html` or
    /// `/error.html`. Mirrors `httprequest.cpp`'s `ParsePost_`, which only
    /// calls `UserVerify` inside the `method_ == "POST" &&
    /// Content-Type == application/x-www-form-urlencoded` block — a plain
    /// `GET /register.html` (how a client ever sees the form) must fall
    /// through untouched.
    fn run_auth_side_effect(&mut self, db_pool: &crate::db::Pool) {
        if self.request.method != Some(crate::http::request::Method::Post) {
            return;
        }
        if self
            .request
            .header("Content-Type")
            .map(|v| v != "application/x-www-form-urlencoded")
            .unwrap_or(true)
        {
            return;
        }

        let is_register = self.request.path == "/register.html";
        let is_login = self.request.path == "/login.html";
        if !is_register && !is_login {
            return;
        }

        let username = self.request.form.get("username").cloned().unwrap_or_default();
        let password = self.request.form.get("password").cloned().unwrap_or_default();

        let success = (|| -> crate::error::Result<bool> {
            let conn = db_pool.get()?;
            if is_register {
                crate::db::register(&conn, &username, &password)
            } else {
                crate::db::login(&conn, &username, &password)
            }
        })()
        .unwrap_or(false);

        self.request.path = if success {
            "/welcome.html".to_string()
        } else {
            "/error.html".to_string()
        };
    }

    fn advance_mapped_body(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        if let Some(resp) = &mut self.response {
            resp.advance_body(n);
        }
    }

    pub fn pending_write_bytes(&self) -> usize {
        self.write_buf.readable_bytes()
            + self
                .response
                .as_ref()
                .and_then(|r| r.mapped_body())
                .map(|b| b.len())
                .unwrap_or(0)
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.response = None;
        LIVE_CONNECTIONS.fetch_sub(1, Ordering::SeqCst);
    }
}
