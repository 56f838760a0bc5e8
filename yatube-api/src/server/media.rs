use std::{io, path::PathBuf};
use thiserror::Error;
use tracing::debug;
use yatube_common::snowflake::Snowflake;

#[derive(Debug, Error)]
#[error("Could not access {}: {source}", .path.display())]
pub struct MediaError {
    path: PathBuf,
    source: io::Error,
}

/// Image formats accepted for post uploads, told apart by magic bytes.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum ImageFormat {
    Gif,
    Png,
    Jpeg,
    WebP,
}

impl ImageFormat {
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(Self::Gif),
            [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n', ..] => Some(Self::Png),
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::WebP),
            _ => None,
        }
    }

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Gif => "gif",
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }
}

/// Uploaded files below a root directory. Paths handed out are relative to it.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct MediaStorage {
    root: PathBuf,
}

impl MediaStorage {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Writes a post image as `posts/<id>.<ext>` and returns that path.
    pub async fn save_post_image(
        &self,
        id: Snowflake,
        format: ImageFormat,
        bytes: &[u8],
    ) -> Result<String, MediaError> {
        let relative = format!("posts/{id}.{}", format.extension());
        let path = self.root.join(&relative);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| MediaError {
                    path: parent.to_owned(),
                    source,
                })?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| MediaError {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), "Stored upload");
        Ok(relative)
    }

    /// Deletes a file handed out by [`Self::save_post_image`]. A file that is
    /// already gone is not an error.
    pub async fn remove(&self, relative: &str) -> Result<(), MediaError> {
        let path = self.root.join(relative);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed upload");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(MediaError { path, source }),
        }
    }
}
