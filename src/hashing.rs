//! SHA-256 content fingerprints used as change-detection keys.

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Hash an async byte stream to a lowercase hex SHA-256 digest, consuming it fully.
pub async fn hash_stream<R>(mut reader: R) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; READ_BUFFER_SIZE];
    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hash an in-memory buffer.
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
