// ABOUTME: Renders DOT source to PNG/SVG by piping through the Graphviz CLI
// ABOUTME: A missing binary maps to RendererUnavailable, not a hard error

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{ExportError, ExportResult};

const RENDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Renders DOT source to the given format ("png" or "svg"). The scale
/// factor sets PNG DPI (scale * 72); SVG ignores it.
pub async fn render_dot(dot: &[u8], format: &str, scale: u32) -> ExportResult<Vec<u8>> {
    if format != "png" && format != "svg" {
        return Err(ExportError::UnsupportedFormat(format.to_string()));
    }

    let scale = scale.clamp(1, 4);

    let mut args = vec![format!("-T{format}")];
    if format == "png" {
        args.push(format!("-Gdpi={}", scale * 72));
    }

    let mut child = match Command::new("dot")
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ExportError::RendererUnavailable)
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(dot).await?;
        // Dropping stdin closes the pipe so dot can finish.
    }

    let output = match tokio::time::timeout(RENDER_TIMEOUT, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => return Err(ExportError::RenderTimeout(RENDER_TIMEOUT)),
    };

    if !output.status.success() {
        return Err(ExportError::RenderFailed(
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }
    Ok(output.stdout)
}

/// Whether the Graphviz `dot` binary is reachable on PATH.
pub fn graphviz_available() -> bool {
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path).any(|dir| dir.join("dot").is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_unknown_formats() {
        let err = render_dot(b"digraph {}", "gif", 2).await.unwrap_err();
        assert!(matches!(err, ExportError::UnsupportedFormat(_)));
    }
}
