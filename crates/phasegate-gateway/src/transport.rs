//! Line-delimited transport.
//!
//! Reads newline-terminated requests and writes one newline-terminated
//! response per request. A bad line is answered and skipped; only transport
//! I/O errors end the loop.

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::server::{parse_error, SessionGateway};

/// Lines longer than this are discarded unread and answered with a parse error.
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

enum LineRead {
    Line(Vec<u8>),
    Oversized(usize),
    Eof,
}

/// Read up to the next `\n`, keeping at most `limit` bytes. The rest of an
/// oversized line is drained so the stream stays in sync.
async fn read_bounded_line<R>(reader: &mut R, limit: usize) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let mut total = 0usize;
    let mut saw_any = false;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if !saw_any {
                return Ok(LineRead::Eof);
            }
            break;
        }
        saw_any = true;
        let (chunk, consumed, done) = match available.iter().position(|b| *b == b'\n') {
            Some(pos) => (&available[..pos], pos + 1, true),
            None => (available, available.len(), false),
        };
        total += chunk.len();
        if total <= limit {
            line.extend_from_slice(chunk);
        } else if !line.is_empty() {
            line = Vec::new();
        }
        reader.consume(consumed);
        if done {
            break;
        }
    }
    if total > limit {
        Ok(LineRead::Oversized(total))
    } else {
        Ok(LineRead::Line(line))
    }
}

async fn write_response<W>(writer: &mut W, response: &Value) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut body = serde_json::to_vec(response)?;
    body.push(b'\n');
    writer.write_all(&body).await?;
    writer.flush().await
}

/// Serve requests from `reader` until end of input.
pub async fn serve<R, W>(gateway: &SessionGateway, mut reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let response = match read_bounded_line(&mut reader, MAX_LINE_BYTES).await? {
            LineRead::Eof => break,
            LineRead::Oversized(len) => {
                warn!(bytes = len, "Discarded oversized request line");
                Some(parse_error(&format!(
                    "Request too large: {len} bytes (max {MAX_LINE_BYTES})"
                )))
            }
            LineRead::Line(bytes) => {
                let line = String::from_utf8_lossy(&bytes);
                gateway.handle_line(&line).await
            }
        };
        if let Some(response) = response {
            write_response(&mut writer, &response).await?;
        }
    }
    info!("Gateway input closed");
    Ok(())
}

/// Serve over the process's stdin and stdout.
pub async fn serve_stdio(gateway: &SessionGateway) -> std::io::Result<()> {
    info!("Gateway listening on stdio");
    serve(gateway, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn lines(input: &[u8], limit: usize) -> Vec<Result<Vec<u8>, usize>> {
        let mut reader = BufReader::with_capacity(4, input);
        let mut out = Vec::new();
        loop {
            match read_bounded_line(&mut reader, limit).await.unwrap() {
                LineRead::Eof => break,
                LineRead::Line(l) => out.push(Ok(l)),
                LineRead::Oversized(n) => out.push(Err(n)),
            }
        }
        out
    }

    #[tokio::test]
    async fn test_bounded_lines() {
        let got = lines(b"ab\nthis-is-long\n\nlast", 5).await;
        assert_eq!(
            got,
            vec![
                Ok(b"ab".to_vec()),
                Err(12),
                Ok(Vec::new()),
                Ok(b"last".to_vec())
            ]
        );
    }
}
