use futures::StreamExt;
use tokio::task::JoinHandle;

use super::counters::CounterSlot;
use super::TestUrl;
use crate::error::StreamError;

/// Bytes between counter updates.
pub const CHUNK_SIZE: u64 = 100 * 1024;

/// Drives one long-lived download and reports its running byte total into a
/// counter slot.
pub struct StreamDownloader {
    client: reqwest::Client,
    url: TestUrl,
    slot: CounterSlot,
}

impl StreamDownloader {
    pub fn new(client: reqwest::Client, url: TestUrl, slot: CounterSlot) -> Self {
        Self { client, url, slot }
    }

    /// Download until the body ends or an error occurs. Returns the number of
    /// bytes received. No retries: on failure the slot keeps its last value.
    pub async fn run(self) -> Result<u64, StreamError> {
        let index = self.slot.index();
        let response = self
            .client
            .get(self.url.as_str())
            .send()
            .await
            .map_err(|source| StreamError::Request { index, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Status {
                index,
                status: status.as_u16(),
            });
        }

        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let mut next_publish = CHUNK_SIZE;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| StreamError::Request { index, source })?;
            downloaded += chunk.len() as u64;

            if downloaded >= next_publish {
                self.slot.publish(downloaded);
                next_publish = (downloaded / CHUNK_SIZE + 1) * CHUNK_SIZE;
            }
        }

        self.slot.publish(downloaded);
        Ok(downloaded)
    }

    /// Run on the tokio runtime without anyone waiting for it.
    ///
    /// Errors are local to the stream and only show up in debug logs.
    pub fn spawn(self) -> JoinHandle<()> {
        let index = self.slot.index();
        let url = self.url.clone();
        tokio::spawn(async move {
            match self.run().await {
                Ok(bytes) => tracing::debug!(index, %url, bytes, "stream finished"),
                Err(e) => tracing::debug!(%url, "stream stopped: {}", e),
            }
        })
    }
}
