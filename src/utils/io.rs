use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Write all bytes and flush, so the device sees each command or block immediately
pub async fn write_all<W: AsyncWrite + Unpin>(
    writer: &mut W,
    buf: &[u8],
) -> std::io::Result<()> {
    writer.write_all(buf).await?;
    writer.flush().await?;
    Ok(())
}
