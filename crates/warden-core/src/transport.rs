//! Newline-delimited stdio transport. A dedicated reader thread decouples
//! blocking `stdin` reads from request processing; diagnostics go to
//! stderr only, since stdout is the wire.

use std::io::{BufRead, Write};
use std::sync::mpsc;

pub enum Line {
    Data(Vec<u8>),
    Eof,
}

/// Spawn a reader thread over `stdin` that sends each line (without the
/// trailing newline) to the returned channel, followed by `Line::Eof`.
pub fn spawn_stdin_reader() -> mpsc::Receiver<Line> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut lock = stdin.lock();
        loop {
            let mut buf = Vec::new();
            match lock.read_until(b'\n', &mut buf) {
                Ok(0) => {
                    let _ = tx.send(Line::Eof);
                    break;
                }
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                    }
                    if tx.send(Line::Data(buf)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "stdin read failed");
                    let _ = tx.send(Line::Eof);
                    break;
                }
            }
        }
    });
    rx
}

/// Writes one already-newline-terminated line to `stdout`, flushing after
/// every write since stdout is unbuffered from the client's perspective.
pub fn write_line(out: &str) {
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    if let Err(e) = lock.write_all(out.as_bytes()).and_then(|_| lock.flush()) {
        tracing::error!(error = %e, "stdout write failed");
    }
}
