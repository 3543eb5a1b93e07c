//! Memory read-back command implementation.

use anyhow::{Context, Result};
use console::style;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::CliError;
use crate::commands::progress_bar;
use crate::session::Session;

const DUMP_WIDTH: u32 = 16;

/// Read command implementation.
pub(crate) fn cmd_read(
    session: &Session,
    address: u32,
    count: usize,
    output: Option<&Path>,
) -> Result<()> {
    if count == 0 {
        return Err(CliError::Usage("--count must be greater than zero".to_string()).into());
    }

    if !session.quiet {
        eprintln!(
            "{} Reading {count} bytes at {address:#010x} via {}",
            style("🔌").cyan(),
            session.interface
        );
    }

    let pb = progress_bar(session.quiet, count);
    let result = session.run(|flasher| {
        flasher.read_back(address, count, |current, _| pb.set_position(current as u64))
    });
    let data = match result {
        Ok(data) => {
            pb.finish_and_clear();
            data
        },
        Err(err) => {
            pb.abandon();
            return Err(err.context("Memory read-back failed"));
        },
    };

    if let Some(path) = output {
        fs::write(path, &data).with_context(|| format!("Failed to write {}", path.display()))?;
        if !session.quiet {
            eprintln!(
                "{} Wrote {} bytes to {}",
                style("✓").green().bold(),
                data.len(),
                path.display()
            );
        }
    } else {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        hex_dump(&mut out, address, &data)?;
        out.flush()?;
    }
    Ok(())
}

/// Write `data` as an address-prefixed hex dump with an ASCII column.
fn hex_dump<W: Write>(out: &mut W, base: u32, data: &[u8]) -> io::Result<()> {
    let mut address = base;
    for line in data.chunks(DUMP_WIDTH as usize) {
        write!(out, "{address:08x}:")?;
        for byte in line {
            write!(out, " {byte:02x}")?;
        }
        for _ in line.len()..DUMP_WIDTH as usize {
            write!(out, "   ")?;
        }
        write!(out, "  ")?;
        for &byte in line {
            let c = if byte.is_ascii_graphic() || byte == b' ' {
                char::from(byte)
            } else {
                '.'
            };
            write!(out, "{c}")?;
        }
        writeln!(out)?;
        address = address.wrapping_add(DUMP_WIDTH);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_dump_full_line() {
        let data: Vec<u8> = (0x41..0x51).collect();
        let mut out = Vec::new();
        hex_dump(&mut out, 0x1000, &data).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "00001000: 41 42 43 44 45 46 47 48 49 4a 4b 4c 4d 4e 4f 50  ABCDEFGHIJKLMNOP\n"
        );
    }

    #[test]
    fn test_hex_dump_partial_line() {
        let mut out = Vec::new();
        hex_dump(&mut out, 0x20, &[0xff; 18]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00000020: ff"));
        assert!(lines[0].ends_with("................"));
        assert_eq!(
            lines[1],
            format!("00000030: ff ff{}  ..", "   ".repeat(14))
        );
    }

    #[test]
    fn test_hex_dump_empty() {
        let mut out = Vec::new();
        hex_dump(&mut out, 0, &[]).unwrap();
        assert!(out.is_empty());
    }
}
