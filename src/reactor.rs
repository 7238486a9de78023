//! Owns the listen fd, the multiplexer, the timer, the worker pool, and the
//! fd -> connection map; dispatches ready events. Grounded in
//! `examples/original_source/code/server/webserver.{h,cpp}`, generalized per
//! the spec's Design Notes: the timer stores only the fd (no callback
//! closure capturing a connection reference), so there is no dangling-
//! pointer hazard if a connection is erased from the map for an unrelated
//! reason — the reactor looks the fd up in its own map when a deadline fires.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Token};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::Pool as DbPool;
use crate::http::http_connection::Connection;
use crate::net::Multiplexer;
use crate::timer::TimerHeap;
use crate::workers::WorkerPool;

const LISTEN_TOKEN: Token = Token(0);

/// Connections are keyed by their raw fd, reused directly as the mio
/// `Token` value (offset by one so it never collides with `LISTEN_TOKEN`).
fn token_for_fd(fd: i32) -> Token {
    Token(fd as usize + 1)
}

fn fd_for_token(token: Token) -> i32 {
    (token.0 - 1) as i32
}

struct Shared {
    connections: Mutex<HashMap<i32, Connection>>,
    mux: Mutex<Multiplexer>,
    timer: Mutex<TimerHeap>,
    workers: WorkerPool,
    db_pool: DbPool,
    root: Arc<PathBuf>,
    conn_interest: Interest,
    max_conns: usize,
}

pub struct Reactor {
    listener: TcpListener,
    shared: Arc<Shared>,
    timeout: Option<Duration>,
    closed: Arc<AtomicBool>,
}

impl Reactor {
    pub fn new(config: &Config, db_pool: DbPool) -> io::Result<Self> {
        let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse().unwrap();
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        if config.linger {
            socket.set_linger(Some(Duration::from_secs(3)))?;
        }
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(1024)?;

        let mut listener = TcpListener::from_std(socket.into());

        let mux = Multiplexer::new(1024)?;
        mux.register(&mut listener, LISTEN_TOKEN, Interest::READABLE)?;

        // mio's poller is backed by epoll in edge-triggered mode regardless
        // of the `Interest` requested, so `trigger_mode` only affects drain
        // discipline (always-drain-to-WouldBlock), already what
        // `Connection::read`/`write` do; it does not change what's
        // registered here.
        let conn_interest = Interest::READABLE;

        let shared = Arc::new(Shared {
            connections: Mutex::new(HashMap::new()),
            mux: Mutex::new(mux),
            timer: Mutex::new(TimerHeap::new()),
            workers: WorkerPool::new(config.workers),
            db_pool,
            root: Arc::new(PathBuf::from(&config.root)),
            conn_interest,
            max_conns: config.max_conns,
        });

        Ok(Self {
            listener,
            shared,
            timeout: config.timeout(),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    /// Main event loop. Runs until `shutdown_flag()` is set.
    pub fn run(&mut self) -> io::Result<()> {
        while !self.closed.load(Ordering::SeqCst) {
            let (expired, wait_ms) = self.shared.timer.lock().unwrap().next_tick_ms();
            for fd in expired {
                self.close_conn(fd);
            }

            let wait = self.timeout.map(|_| {
                wait_ms.map(|ms| Duration::from_millis(ms as u64)).unwrap_or(Duration::from_secs(1))
            });

            let events = {
                let mut mux = self.shared.mux.lock().unwrap();
                match mux.wait(wait) {
                    Ok(events) => events,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            };

            for event in events {
                if event.token == LISTEN_TOKEN {
                    self.accept_loop();
                    continue;
                }

                let fd = fd_for_token(event.token);
                if event.hangup || event.error {
                    self.close_conn(fd);
                    continue;
                }
                if event.readable {
                    self.extend_timer(fd);
                    self.submit_read(fd);
                }
                if event.writable {
                    self.extend_timer(fd);
                    self.submit_write(fd);
                }
            }
        }
        Ok(())
    }

    fn accept_loop(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => self.add_client(stream, addr),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    fn add_client(&mut self, mut stream: TcpStream, addr: SocketAddr) {
        use std::os::fd::AsRawFd;
        let fd = stream.as_raw_fd();

        let live = crate::http::http_connection::LIVE_CONNECTIONS.load(Ordering::SeqCst);
        if live as usize >= self.shared.max_conns {
            warn!(%addr, "rejecting connection: server at capacity");
            return;
        }

        if let Err(e) = self
            .shared
            .mux
            .lock()
            .unwrap()
            .register(&mut stream, token_for_fd(fd), self.shared.conn_interest)
        {
            error!(error = %e, "failed to register accepted connection");
            return;
        }

        info!(%addr, fd, "accepted connection");
        let conn = Connection::new(stream, addr, Arc::clone(&self.shared.root));
        self.shared.connections.lock().unwrap().insert(fd, conn);

        if let Some(timeout) = self.timeout {
            self.shared.timer.lock().unwrap().add(fd, timeout);
        }
    }

    fn extend_timer(&self, fd: i32) {
        if let Some(timeout) = self.timeout {
            self.shared.timer.lock().unwrap().adjust(fd, timeout);
        }
    }

    fn close_conn(&self, fd: i32) {
        let mut conns = self.shared.connections.lock().unwrap();
        if let Some(mut conn) = conns.remove(&fd) {
            self.shared.timer.lock().unwrap().remove(fd);
            let _ = self.shared.mux.lock().unwrap().deregister(&mut conn.stream);
            conn.close();
            debug!(fd, "connection closed");
        }
    }

    fn submit_read(&self, fd: i32) {
        let shared = Arc::clone(&self.shared);
        shared.workers.add_task(move || on_read(&shared, fd));
    }

    fn submit_write(&self, fd: i32) {
        let shared = Arc::clone(&self.shared);
        shared.workers.add_task(move || on_write(&shared, fd));
    }
}

fn on_read(shared: &Arc<Shared>, fd: i32) {
    let result = {
        let mut conns = shared.connections.lock().unwrap();
        match conns.get_mut(&fd) {
            Some(conn) => conn.read(),
            None => return,
        }
    };
    match result {
        // `Connection::read` only ever returns `Ok(0)` (peer EOF) or the
        // terminating call's own `Err` (would-block included) — never a
        // nonzero byte count, since it drains internally.
        Ok(0) => close_and_forget(shared, fd),
        Ok(_) => on_process(shared, fd),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => on_process(shared, fd),
        Err(_) => close_and_forget(shared, fd),
    }
}

fn on_write(shared: &Arc<Shared>, fd: i32) {
    let mut conns = shared.connections.lock().unwrap();
    let conn = match conns.get_mut(&fd) {
        Some(conn) => conn,
        None => return,
    };

    match conn.write() {
        Ok(_) if conn.pending_write_bytes() == 0 => {
            let keep_alive = conn.request.keep_alive();
            drop(conns);
            if keep_alive {
                on_process(shared, fd);
            } else {
                close_and_forget(shared, fd);
            }
        }
        Ok(_) => {
            rearm(shared, fd, Interest::WRITABLE);
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            rearm(shared, fd, Interest::WRITABLE);
        }
        Err(_) => {
            drop(conns);
            close_and_forget(shared, fd);
        }
    }
}

fn on_process(shared: &Arc<Shared>, fd: i32) {
    let ok = {
        let mut conns = shared.connections.lock().unwrap();
        match conns.get_mut(&fd) {
            Some(conn) => conn.process(&shared.db_pool),
            None => return,
        }
    };
    rearm(shared, fd, if ok { Interest::WRITABLE } else { Interest::READABLE });
}

fn rearm(shared: &Arc<Shared>, fd: i32, interest: Interest) {
    let mut conns = shared.connections.lock().unwrap();
    if let Some(conn) = conns.get_mut(&fd) {
        let mux = shared.mux.lock().unwrap();
        if let Err(e) = mux.reregister(&mut conn.stream, token_for_fd(fd), interest) {
            warn!(fd, error = %e, "failed to rearm connection");
        }
    }
}

fn close_and_forget(shared: &Arc<Shared>, fd: i32) {
    let mut conns = shared.connections.lock().unwrap();
    if let Some(mut conn) = conns.remove(&fd) {
        shared.timer.lock().unwrap().remove(fd);
        let mux = shared.mux.lock().unwrap();
        let _ = mux.deregister(&mut conn.stream);
        conn.close();
    }
}
