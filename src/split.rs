//! Splits one byte source into two sequential streams at a separator byte.
//!
//! [`Left`] yields everything before the first separator, [`Right`] everything
//! after it. The separator itself is dropped. Both halves share one buffered
//! source; `Right` blocks until `Left` has reported end of stream, so the two
//! never read the source concurrently.
//!
//! A caller that abandons `Left` before draining it leaves `Right` blocked
//! forever. Wrap reads on `Right` in an external timeout if that matters.

use std::{
    io::{self, BufRead, BufReader, Read},
    sync::{Arc, Condvar, Mutex, MutexGuard},
};

use log::debug;

struct Shared<R> {
    source: Mutex<BufReader<R>>,
    drained: Mutex<bool>,
    signal: Condvar,
}

impl<R> Shared<R> {
    fn lock_source(&self) -> io::Result<MutexGuard<'_, BufReader<R>>> {
        self.source
            .lock()
            .map_err(|_| io::Error::other("shared source lock poisoned"))
    }

    fn finish_left(&self) -> io::Result<()> {
        let mut drained = self
            .drained
            .lock()
            .map_err(|_| io::Error::other("completion latch poisoned"))?;
        *drained = true;
        self.signal.notify_all();
        Ok(())
    }

    fn is_drained(&self) -> bool {
        self.drained.lock().map(|d| *d).unwrap_or(false)
    }

    fn wait_drained(&self) -> io::Result<()> {
        let guard = self
            .drained
            .lock()
            .map_err(|_| io::Error::other("completion latch poisoned"))?;
        let _guard = self
            .signal
            .wait_while(guard, |drained| !*drained)
            .map_err(|_| io::Error::other("completion latch poisoned"))?;
        Ok(())
    }
}

/// Bytes up to (not including) the first separator.
pub struct Left<R> {
    shared: Arc<Shared<R>>,
    separator: u8,
    done: bool,
}

/// Bytes after the first separator; readable once [`Left`] is drained.
pub struct Right<R> {
    shared: Arc<Shared<R>>,
}

pub fn split<R: Read>(source: R, separator: u8) -> (Left<R>, Right<R>) {
    let shared = Arc::new(Shared {
        source: Mutex::new(BufReader::new(source)),
        drained: Mutex::new(false),
        signal: Condvar::new(),
    });
    (
        Left {
            shared: Arc::clone(&shared),
            separator,
            done: false,
        },
        Right { shared },
    )
}

impl<R> Left<R> {
    pub fn is_drained(&self) -> bool {
        self.done
    }

    fn finish(&mut self) -> io::Result<()> {
        self.done = true;
        debug!("Left stream drained; releasing right stream");
        self.shared.finish_left()
    }
}

impl<R: Read> Read for Left<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done {
            return Ok(0);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let mut source = self.shared.lock_source()?;
        let available = source.fill_buf()?;
        if available.is_empty() {
            drop(source);
            self.finish()?;
            return Ok(0);
        }

        match available.iter().position(|&b| b == self.separator) {
            Some(idx) => {
                let n = idx.min(buf.len());
                buf[..n].copy_from_slice(&available[..n]);
                if n == idx {
                    // Swallow the separator itself.
                    source.consume(n + 1);
                    drop(source);
                    self.finish()?;
                } else {
                    source.consume(n);
                }
                Ok(n)
            }
            None => {
                let n = available.len().min(buf.len());
                buf[..n].copy_from_slice(&available[..n]);
                source.consume(n);
                Ok(n)
            }
        }
    }
}

impl<R> Right<R> {
    /// Non-blocking check whether a read would proceed immediately.
    pub fn is_ready(&self) -> bool {
        self.shared.is_drained()
    }
}

impl<R: Read> Read for Right<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.shared.wait_drained()?;
        self.shared.lock_source()?.read(buf)
    }
}
