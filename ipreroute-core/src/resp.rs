//! Minimal RESP (Redis serialization protocol) codec.
//!
//! Only what the flag store client needs: encoding commands as arrays of
//! bulk strings, and reading integer replies (`:<n>\r\n`).

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::{RerouteError, Result};

/// Longest reply line accepted, CRLF included.
pub const MAX_REPLY_LINE: u64 = 512;

/// Appends `args` to `buf` as a RESP array of bulk strings.
///
/// # Example
///
/// ```
/// use bytes::BytesMut;
/// use ipreroute_core::resp::encode_command;
///
/// let mut buf = BytesMut::new();
/// encode_command(&mut buf, &[b"EXISTS", b"attacker_ip_10.0.0.1"]);
/// assert_eq!(&buf[..], b"*2\r\n$6\r\nEXISTS\r\n$20\r\nattacker_ip_10.0.0.1\r\n");
/// ```
pub fn encode_command(buf: &mut BytesMut, args: &[&[u8]]) {
    buf.put_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        buf.put_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.put_slice(arg);
        buf.put_slice(b"\r\n");
    }
}

/// Reads one reply line into `line`, replacing its previous content.
///
/// Fails with a protocol error when the peer closes the connection, sends
/// a line longer than [`MAX_REPLY_LINE`] or the read itself fails.
pub async fn read_line<R>(reader: &mut R, line: &mut Vec<u8>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();
    let read = reader
        .take(MAX_REPLY_LINE)
        .read_until(b'\n', line)
        .await
        .map_err(|err| RerouteError::LookupProtocol(format!("read failed: {err}")))?;

    if read == 0 {
        return Err(RerouteError::LookupProtocol(
            "connection closed before reply".into(),
        ));
    }
    if line.last() != Some(&b'\n') {
        return Err(RerouteError::LookupProtocol("reply line too long".into()));
    }

    Ok(())
}

/// Parses an integer reply line such as `:1\r\n`.
///
/// Error replies (`-ERR ...`) and any other reply type are protocol errors.
///
/// # Example
///
/// ```
/// use ipreroute_core::resp::parse_integer;
///
/// assert_eq!(parse_integer(b":30\r\n").unwrap(), 30);
/// assert_eq!(parse_integer(b":-2\r\n").unwrap(), -2);
/// assert!(parse_integer(b"-ERR unknown command\r\n").is_err());
/// ```
pub fn parse_integer(line: &[u8]) -> Result<i64> {
    let line = trim_crlf(line);

    match line.split_first() {
        Some((b':', digits)) => std::str::from_utf8(digits)
            .ok()
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(|| {
                RerouteError::LookupProtocol(format!(
                    "invalid integer reply '{}'",
                    String::from_utf8_lossy(line)
                ))
            }),
        Some((b'-', message)) => Err(RerouteError::LookupProtocol(format!(
            "server error '{}'",
            String::from_utf8_lossy(message)
        ))),
        _ => Err(RerouteError::LookupProtocol(format!(
            "unexpected reply '{}'",
            String::from_utf8_lossy(line)
        ))),
    }
}

fn trim_crlf(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
