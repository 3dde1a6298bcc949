//! A TCP-bridged link: the byte stream a UART would carry, served to
//! one host client at a time over a socket.
//!
//! A background thread accepts clients and pumps received bytes into
//! the completion port whenever reception is armed. Transmits write
//! synchronously and complete immediately; with no client connected
//! the bytes fall on the floor, exactly like a UART with nothing
//! listening.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use hdc_device::{Link, LinkError, LinkPort};
use tracing::{debug, info, warn};

pub struct TcpLink {
    shared: Arc<Shared>,
}

struct Shared {
    port: OnceLock<Arc<LinkPort>>,
    stream: Mutex<Option<TcpStream>>,
    armed: AtomicBool,
    epoch: Instant,
}

impl TcpLink {
    /// Bind the listener and start accepting clients in the
    /// background.
    pub fn bind(addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        info!(%addr, "listening for HDC host");

        let shared = Arc::new(Shared {
            port: OnceLock::new(),
            stream: Mutex::new(None),
            armed: AtomicBool::new(false),
            epoch: Instant::now(),
        });

        let accept_side = Arc::clone(&shared);
        std::thread::spawn(move || accept_loop(&listener, &accept_side));

        Ok(Self { shared })
    }
}

fn accept_loop(listener: &TcpListener, shared: &Arc<Shared>) {
    loop {
        let Ok((stream, peer)) = listener.accept() else {
            return;
        };
        info!(%peer, "host connected");
        let _ = stream.set_nodelay(true);

        let mut reader = match stream.try_clone() {
            Ok(reader) => reader,
            Err(error) => {
                warn!(%error, "failed to clone client stream");
                continue;
            }
        };
        *shared.stream.lock().unwrap_or_else(|e| e.into_inner()) = Some(stream);

        // One client at a time: serve this one until it disconnects.
        let mut burst = [0u8; 256];
        loop {
            match reader.read(&mut burst) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if shared.armed.load(Ordering::SeqCst) {
                        if let Some(port) = shared.port.get() {
                            port.rx_event(&burst[..n]);
                        }
                    } else {
                        debug!(bytes = n, "dropping burst, reception not armed");
                    }
                }
            }
        }

        info!(%peer, "host disconnected");
        *shared.stream.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl Link for TcpLink {
    fn attach(&mut self, port: Arc<LinkPort>) {
        let _ = self.shared.port.set(port);
    }

    fn start_rx(&mut self) -> Result<(), LinkError> {
        if self.shared.port.get().is_none() {
            return Err(LinkError::Detached);
        }
        self.shared.armed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn abort_rx(&mut self) {
        self.shared.armed.store(false, Ordering::SeqCst);
    }

    fn start_tx(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        let port = self.shared.port.get().ok_or(LinkError::Detached)?;

        let mut guard = self.shared.stream.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(stream) = guard.as_mut() {
            if let Err(error) = stream.write_all(frame).and_then(|()| stream.flush()) {
                warn!(%error, "client write failed, dropping connection");
                *guard = None;
            }
        }
        drop(guard);

        port.complete_tx();
        Ok(())
    }

    fn now_ms(&self) -> u64 {
        self.shared.epoch.elapsed().as_millis() as u64
    }
}
