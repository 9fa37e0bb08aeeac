// Copyright 2022 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use core::fmt;
use log::{LevelFilter, Metadata, Record, SetLoggerError};
use std::io::{Cursor, Write};

pub const MAX_MSG_LEN: usize = 256;

pub struct NnhalLogger;

// Log msgs are of the form: '<target>::<fmt'd-msg>'. Returns the length
// written to |buf|.
fn format_record(buf: &mut [u8; MAX_MSG_LEN], target: &str, args: &fmt::Arguments) -> usize {
    let mut cur = Cursor::new(&mut buf[..]);
    if write!(&mut cur, "{}::{}", target, args).is_err() {
        // Too big, indicate overflow with a trailing "...".
        cur.set_position((MAX_MSG_LEN - 3) as u64);
        let _ = cur.write_all(b"...");
    }
    cur.position() as usize
}

impl log::Log for NnhalLogger {
    fn enabled(&self, metadata: &Metadata) -> bool { metadata.level() <= log::max_level() }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let mut buf = [0u8; MAX_MSG_LEN];
            let pos = format_record(&mut buf, record.target(), record.args());
            let mut stderr = std::io::stderr().lock();
            // NB: nowhere to report a failed write
            let _ = stderr.write_all(&buf[..pos]);
            let _ = stderr.write_all(b"\n");
        }
    }

    fn flush(&self) { let _ = std::io::stderr().flush(); }
}

/// Installs NnhalLogger as the global logger at |level|.
pub fn init_logger(level: LevelFilter) -> Result<(), SetLoggerError> {
    static NNHAL_LOGGER: NnhalLogger = NnhalLogger;
    log::set_logger(&NNHAL_LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_record() {
        let mut buf = [0u8; MAX_MSG_LEN];
        let pos = format_record(&mut buf, "nnhal_driver::prepare", &format_args!("model {}", 3));
        assert_eq!(&buf[..pos], b"nnhal_driver::prepare::model 3");
    }

    #[test]
    fn test_format_record_truncates() {
        let mut buf = [0u8; MAX_MSG_LEN];
        let long = "x".repeat(2 * MAX_MSG_LEN);
        let pos = format_record(&mut buf, "target", &format_args!("{}", long));
        assert_eq!(pos, MAX_MSG_LEN);
        assert!(buf.starts_with(b"target::xxx"));
        assert!(buf.ends_with(b"x..."));
    }

    #[test]
    fn test_format_record_exact_fit() {
        let mut buf = [0u8; MAX_MSG_LEN];
        let msg = "y".repeat(MAX_MSG_LEN - "t::".len());
        let pos = format_record(&mut buf, "t", &format_args!("{}", msg));
        assert_eq!(pos, MAX_MSG_LEN);
        assert_eq!(buf[MAX_MSG_LEN - 1], b'y');
    }
}
