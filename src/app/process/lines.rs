use std::io::{self, ErrorKind, Read, Write};

/// Writes `line` followed by `\n` and flushes.
pub fn write_line<W: Write + ?Sized>(writer: &mut W, line: &str) -> io::Result<()> {
    let mut data = String::with_capacity(line.len() + 1);
    data.push_str(line);
    data.push('\n');
    writer.write_all(data.as_bytes())?;
    writer.flush()
}

/// Reads a single `\n`-terminated line one byte at a time.
///
/// A buffered reader would pull bytes past the line boundary out of the pipe, so the next
/// reply could be lost or the read could block waiting for data the child never sends.
/// Returns `Ok(None)` when the stream ends before a terminator.
pub fn read_line_unbuffered<R: Read + ?Sized>(reader: &mut R) -> io::Result<Option<String>> {
    let mut bytes = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => {
                if byte[0] == b'\n' {
                    return Ok(Some(String::from_utf8_lossy(&bytes).to_string()));
                }
                bytes.push(byte[0]);
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}
