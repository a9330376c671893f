pub mod blob;
pub mod recorder;

pub use blob::{BlobError, BlobStore, FsBlobStore, MemoryBlobStore};
pub use recorder::{record_stream, RecorderError};

use std::time::Duration;

use chrono::Utc;
use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error(transparent)]
    Recorder(#[from] RecorderError),
    #[error(transparent)]
    Blob(#[from] BlobError),
}

/// What the caller gets back after an upload. Thumbnails need server-side
/// transcoding and stay absent for now.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoUpload {
    pub video_url: String,
    pub video_thumbnail: Option<String>,
    pub duration_secs: u64,
}

/// Records the stream for up to `duration` and uploads the captured blob
/// under `sos-videos/<userId>/sos_<epoch-millis>.mp4`, returning the
/// download URL.
pub async fn upload_sos_video<S>(
    blobs: &dyn BlobStore,
    stream: S,
    user_id: &str,
    duration: Duration,
    stop: CancellationToken,
) -> Result<VideoUpload, UploadError>
where
    S: Stream<Item = Result<Vec<u8>, RecorderError>> + Unpin,
{
    info!("recording emergency video for {}", user_id);
    let blob = record_stream(stream, duration, stop).await?;

    let key = format!(
        "sos-videos/{}/sos_{}.mp4",
        user_id,
        Utc::now().timestamp_millis()
    );
    info!("uploading emergency video ({} bytes) to {}", blob.len(), key);
    let video_url = blobs.put(&key, &blob).await?;
    info!("emergency video uploaded: {}", video_url);

    Ok(VideoUpload {
        video_url,
        video_thumbnail: None,
        duration_secs: duration.as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn upload_stores_blob_under_user_scoped_key() {
        let blobs = MemoryBlobStore::new();
        let chunks = stream::iter(vec![Ok(vec![1u8, 2]), Ok(vec![3u8])]);

        let upload = upload_sos_video(
            &blobs,
            chunks,
            "u1",
            Duration::from_secs(15),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(upload.video_url.contains("sos-videos/u1/sos_"));
        assert!(upload.video_url.ends_with(".mp4"));
        assert!(upload.video_thumbnail.is_none());
        assert_eq!(upload.duration_secs, 15);

        let (key, bytes) = blobs.entries().pop().unwrap();
        assert!(key.starts_with("sos-videos/u1/"));
        assert_eq!(bytes, vec![1, 2, 3]);
    }
}
