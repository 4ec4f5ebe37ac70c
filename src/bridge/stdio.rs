//! Line-delimited JSON transport for a UI process that owns our stdin/stdout.

use crate::bridge::server::dispatch_blocking;
use crate::bridge::{Bridge, BridgeRequest, BridgeResponse};
use crate::error::{Result, ShellError};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

pub async fn serve(bridge: Bridge) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    serve_lines(&bridge, tokio::io::stdin(), &mut stdout).await
}

/// Answer each request line with one response line until EOF.
pub async fn serve_lines<R, W>(bridge: &Bridge, reader: R, writer: &mut W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut handled = 0usize;

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| ShellError::io("<stdin>", e))?
    {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<BridgeRequest>(line) {
            Ok(request) => dispatch_blocking(bridge, request).await,
            Err(e) => {
                debug!(error = %e, "Malformed bridge request");
                BridgeResponse::failure_message("invalidRequest", format!("Malformed request: {}", e))
            }
        };

        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        writer
            .write_all(&out)
            .await
            .map_err(|e| ShellError::io("<stdout>", e))?;
        writer
            .flush()
            .await
            .map_err(|e| ShellError::io("<stdout>", e))?;
        handled += 1;
    }

    info!(handled, "Stdio bridge reached end of input");
    Ok(())
}
