/// Classic 16-bytes-per-line dump of `buffer[start..=end]`.
pub fn hexdump(buffer: &[u8], start: u16, end: u16) -> String {
    if buffer.is_empty() {
        return String::new();
    }
    let end = (end as usize).min(buffer.len().saturating_sub(1));
    let mut dump = String::new();

    let mut addr = start as usize;
    while addr <= end {
        let line_end = (addr + 15).min(end);
        dump.push_str(&dump_line(addr, &buffer[addr..=line_end]));
        addr = line_end + 1;
    }

    dump
}

/// Like `hexdump`, but runs of identical lines collapse into a single `*`.
pub fn compact_hexdump(buffer: &[u8], start: u16, end: u16) -> String {
    if buffer.is_empty() {
        return String::new();
    }
    let end = (end as usize).min(buffer.len().saturating_sub(1));
    let mut dump = String::new();
    let mut previous: Option<&[u8]> = None;
    let mut skipping = false;

    let mut addr = start as usize;
    while addr <= end {
        let line_end = (addr + 15).min(end);
        let bytes = &buffer[addr..=line_end];

        if previous == Some(bytes) {
            if !skipping {
                dump.push_str("*\n");
                skipping = true;
            }
        } else {
            dump.push_str(&dump_line(addr, bytes));
            skipping = false;
        }

        previous = Some(bytes);
        addr = line_end + 1;
    }

    dump
}

fn dump_line(addr: usize, bytes: &[u8]) -> String {
    let mut line = format!("{:04x}: ", addr);
    let mut chars = String::new();
    for &byte in bytes {
        line.push_str(&format!("{:02x} ", byte));
        let c = byte as char;
        chars.push(if c.is_ascii_graphic() || c == ' ' {
            c
        } else {
            '.'
        });
    }
    format!("{:<54} {}\n", line, chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hexdump() {
        let mut buffer = vec![0u8; 0x40];
        buffer[0x10..0x14].copy_from_slice(b"GBC!");

        let dump = hexdump(&buffer, 0x10, 0x1F);
        assert_eq!(dump.lines().count(), 1);
        assert!(dump.starts_with("0010: 47 42 43 21 00"));
        assert!(dump.trim_end().ends_with("GBC!............"));

        assert_eq!(hexdump(&buffer, 0x00, 0x3F).lines().count(), 4);
        assert_eq!(hexdump(&buffer, 0x3E, 0xFFFF).lines().count(), 1);
    }

    #[test]
    fn test_compact_hexdump() {
        let buffer = vec![0u8; 0x100];
        let dump = compact_hexdump(&buffer, 0, 0xFF);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "*");
    }
}
