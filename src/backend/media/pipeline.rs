/**
 * Media Pipeline
 *
 * # Attachment Writes
 *
 * Attachments are decoded and written to the media store before the message
 * row exists. If any attachment fails to decode or save, files already written
 * for the same message are removed and the send is rejected, so a message row
 * never points at a missing file. If the row insert fails afterwards the
 * caller hands the files back through [`MediaPipeline::discard`].
 *
 * # Derived Metadata
 *
 * Once the row is committed, [`MediaPipeline::spawn_metadata`] starts one
 * background task per message. The task never runs on the session's own
 * worker, is bounded by the transcoder's timeout and is cancelled when the
 * pipeline shuts down. When it writes results back it fires the installed
 * [`MetadataHook`].
 */

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, RwLockReadGuard};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::attachment::{self, DecodedAttachment, MediaKind};
use super::storage::MediaStore;
use super::transcoder::Transcoder;
use super::MediaError;
use crate::backend::store::Store;
use crate::shared::event::{AttachmentKind, EncodedAttachment};
use crate::shared::messaging::{ConnectionId, Message, MessageMedia, MetadataUpdate};

/// Notified after derived metadata has been written onto a message
#[async_trait]
pub trait MetadataHook: Send + Sync + 'static {
    async fn metadata_ready(&self, message: &Message);
}

/// Hook that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

#[async_trait]
impl MetadataHook for NoopHook {
    async fn metadata_ready(&self, _message: &Message) {}
}

/// Attachments written for a message that is about to be created
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredAttachments {
    pub media: MessageMedia,
}

impl StoredAttachments {
    pub fn references(&self) -> Vec<&str> {
        self.media.references()
    }
}

/// Coordinates media storage, transcoding and the metadata hook
#[derive(Clone)]
pub struct MediaPipeline {
    media: Arc<dyn MediaStore>,
    transcoder: Arc<dyn Transcoder>,
    store: Arc<dyn Store>,
    hook: Arc<dyn MetadataHook>,
    /// Readers copy references onto new rows, the writer releases files
    references: Arc<RwLock<()>>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl MediaPipeline {
    pub fn new(
        media: Arc<dyn MediaStore>,
        transcoder: Arc<dyn Transcoder>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            media,
            transcoder,
            store,
            hook: Arc::new(NoopHook),
            references: Arc::new(RwLock::new(())),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Install the hook fired when derived metadata lands
    pub fn with_hook(mut self, hook: Arc<dyn MetadataHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn media_store(&self) -> &Arc<dyn MediaStore> {
        &self.media
    }

    /// Decode and store every attachment of a new message
    ///
    /// # Arguments
    ///
    /// * `connection_id` - Connection the message will belong to
    /// * `attachments` - Encoded attachments, at most one per kind
    ///
    /// # Returns
    ///
    /// Media references to put on the message row. On error nothing remains
    /// stored.
    pub async fn store_attachments(
        &self,
        connection_id: ConnectionId,
        attachments: &[EncodedAttachment],
    ) -> Result<StoredAttachments, MediaError> {
        let decoded = attachments
            .iter()
            .map(DecodedAttachment::decode)
            .collect::<Result<Vec<_>, _>>()?;

        let mut stored = StoredAttachments::default();
        for attachment in decoded {
            let reference = attachment::message_media_reference(
                connection_id,
                attachment.kind.into(),
                &attachment.extension,
            );
            if let Err(e) = self.media.save(&reference, &attachment.bytes).await {
                self.discard(&stored).await;
                return Err(e);
            }
            let slot = match attachment.kind {
                AttachmentKind::Image => &mut stored.media.image,
                AttachmentKind::Voice => &mut stored.media.voice,
                AttachmentKind::Video => &mut stored.media.video,
            };
            *slot = Some(reference);
        }
        Ok(stored)
    }

    /// Remove files written by [`Self::store_attachments`]
    pub async fn discard(&self, stored: &StoredAttachments) {
        for reference in stored.references() {
            self.delete_reference(reference).await;
        }
    }

    /// Delete a stored file, logging failures
    pub async fn delete_reference(&self, reference: &str) {
        if let Err(e) = self.media.delete(reference).await {
            warn!("[Media] Failed to delete {}: {}", reference, e);
        }
    }

    /// Hold while reading a message and storing a copy that shares its files
    ///
    /// [`Self::release_media`] waits for every outstanding guard, so a file is
    /// never removed between a copy reading its source and the copy landing.
    pub async fn share_references(&self) -> RwLockReadGuard<'_, ()> {
        self.references.read().await
    }

    /// Delete the files of a removed message that no other message still uses
    ///
    /// Forwarded copies share references with their source, so a file is kept
    /// while any remaining message points at it.
    pub async fn release_media(&self, message: &Message) {
        let _exclusive = self.references.write().await;
        for reference in message.media.references() {
            match self.store.is_media_referenced(reference).await {
                Ok(false) => self.delete_reference(reference).await,
                Ok(true) => debug!("[Media] Keeping shared file {}", reference),
                Err(e) => warn!("[Media] Could not check references to {}: {}", reference, e),
            }
        }
    }

    /// Store a new avatar for `username`
    ///
    /// # Returns
    ///
    /// The avatar's reference, `thumbnails/<username>.<ext>`
    pub async fn store_avatar(
        &self,
        username: &str,
        data: &str,
        filename: &str,
    ) -> Result<String, MediaError> {
        let bytes = attachment::decode_payload(data)?;
        let extension = attachment::extension_for(filename, MediaKind::Avatar);
        let reference = attachment::avatar_reference(username, &extension);
        self.media.save(&reference, &bytes).await?;
        Ok(reference)
    }

    /// Start background metadata extraction for a freshly created message
    ///
    /// Does nothing when the message has no voice or video, or when its
    /// derived fields are already present (forwarded copies).
    pub fn spawn_metadata(&self, message: &Message) {
        let media = &message.media;
        let needs_waveform = media.voice.is_some() && media.waveform.is_none();
        let needs_video = media.video.is_some()
            && media.video_duration.is_none()
            && media.video_thumbnail.is_none();
        if !needs_waveform && !needs_video {
            return;
        }

        let pipeline = self.clone();
        let message = message.clone();
        let token = self.shutdown.child_token();
        self.tasks.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("[Media] Metadata for message {} cancelled", message.id);
                }
                _ = pipeline.derive_metadata(&message, needs_waveform, needs_video) => {}
            }
        });
    }

    async fn derive_metadata(&self, message: &Message, waveform: bool, video: bool) {
        let mut update = MetadataUpdate::default();
        let mut thumbnail_reference = None;

        if waveform {
            if let Some(voice) = message.media.voice.as_deref() {
                match self.extract_waveform(voice).await {
                    Ok(samples) => update.waveform = Some(samples),
                    Err(e) => warn!("[Media] Waveform failed for message {}: {}", message.id, e),
                }
            }
        }

        if video {
            if let Some(video) = message.media.video.as_deref() {
                let reference = attachment::message_media_reference(
                    message.connection_id,
                    MediaKind::VideoThumbnail,
                    MediaKind::VideoThumbnail.default_extension(),
                );
                match (self.media.local_path(video), self.media.local_path(&reference)) {
                    (Ok(video_path), Ok(thumb_path)) => {
                        let metadata = self.transcoder.video_metadata(&video_path, &thumb_path).await;
                        update.video_duration = metadata.duration;
                        if metadata.thumbnail_written {
                            update.video_thumbnail = Some(reference.clone());
                            thumbnail_reference = Some(reference);
                        }
                    }
                    (Err(e), _) | (_, Err(e)) => {
                        warn!("[Media] Video metadata skipped for message {}: {}", message.id, e)
                    }
                }
            }
        }

        if update.is_empty() {
            return;
        }

        match self.store.update_metadata(message.id, &update).await {
            Ok(Some(updated)) => {
                info!("[Media] Metadata ready for message {}", updated.id);
                self.hook.metadata_ready(&updated).await;
            }
            Ok(None) => {
                debug!("[Media] Message {} gone before metadata landed", message.id);
                if let Some(reference) = thumbnail_reference {
                    self.delete_reference(&reference).await;
                }
            }
            Err(e) => warn!("[Media] Failed to save metadata for message {}: {}", message.id, e),
        }
    }

    async fn extract_waveform(&self, voice: &str) -> Result<Vec<f32>, MediaError> {
        let path = self.media.local_path(voice)?;
        self.transcoder.voice_waveform(&path).await
    }

    /// Cancel running metadata tasks and wait for them to stop
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }

    /// Wait for in-flight metadata tasks without cancelling them
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }
}
