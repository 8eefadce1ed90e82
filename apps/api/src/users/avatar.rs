use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Webp,
}

impl ImageKind {
    pub fn content_type(&self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpg",
            ImageKind::Webp => "webp",
        }
    }

    fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type.trim().to_lowercase().as_str() {
            "image/png" => Some(ImageKind::Png),
            "image/jpeg" | "image/jpg" => Some(ImageKind::Jpeg),
            "image/webp" => Some(ImageKind::Webp),
            _ => None,
        }
    }

    fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(ImageKind::Png)
        } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageKind::Jpeg)
        } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            Some(ImageKind::Webp)
        } else {
            None
        }
    }
}

/// Checks declared type, size and magic bytes agree.
pub fn classify_upload(
    declared_type: Option<&str>,
    data: &[u8],
    max_bytes: usize,
) -> Result<ImageKind, AppError> {
    if data.is_empty() {
        return Err(AppError::Validation("avatar file is empty".to_string()));
    }
    if data.len() > max_bytes {
        return Err(AppError::Validation(format!(
            "avatar must be at most {max_bytes} bytes"
        )));
    }
    let declared = declared_type
        .and_then(ImageKind::from_content_type)
        .ok_or_else(|| {
            AppError::Validation("avatar must be a PNG, JPEG or WebP image".to_string())
        })?;
    match ImageKind::sniff(data) {
        Some(actual) if actual == declared => Ok(actual),
        _ => Err(AppError::Validation(
            "avatar content does not match its declared type".to_string(),
        )),
    }
}

pub fn avatar_key(user_id: Uuid, kind: ImageKind) -> String {
    format!("avatars/{}/{}.{}", user_id, Uuid::new_v4(), kind.extension())
}

pub async fn put_avatar(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    kind: ImageKind,
    data: Bytes,
) -> Result<(), AppError> {
    s3.put_object()
        .bucket(bucket)
        .key(key)
        .body(ByteStream::from(data))
        .content_type(kind.content_type())
        .send()
        .await
        .map_err(|e| AppError::S3(format!("avatar upload failed: {e}")))?;
    info!("Uploaded avatar to s3://{}/{}", bucket, key);
    Ok(())
}

pub async fn get_avatar(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
) -> Result<Bytes, AppError> {
    let object = s3
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| AppError::S3(format!("avatar download failed: {e}")))?;
    let data = object
        .body
        .collect()
        .await
        .map_err(|e| AppError::S3(format!("avatar read failed: {e}")))?;
    Ok(data.into_bytes())
}

/// Best-effort removal; a leftover object is logged, not surfaced.
pub async fn delete_avatar(s3: &aws_sdk_s3::Client, bucket: &str, key: &str) {
    if let Err(e) = s3.delete_object().bucket(bucket).key(key).send().await {
        warn!("Failed to delete avatar s3://{}/{}: {}", bucket, key, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 16, b'J', b'F', b'I', b'F'];
    const WEBP: &[u8] = b"RIFF\x24\x00\x00\x00WEBPVP8 ";

    #[test]
    fn test_accepts_matching_types() {
        assert_eq!(classify_upload(Some("image/png"), PNG, 1024).unwrap(), ImageKind::Png);
        assert_eq!(classify_upload(Some("image/jpeg"), JPEG, 1024).unwrap(), ImageKind::Jpeg);
        assert_eq!(classify_upload(Some("IMAGE/WEBP"), WEBP, 1024).unwrap(), ImageKind::Webp);
    }

    #[test]
    fn test_rejects_mismatched_magic() {
        assert!(classify_upload(Some("image/png"), JPEG, 1024).is_err());
    }

    #[test]
    fn test_rejects_unsupported_type() {
        assert!(classify_upload(Some("image/gif"), b"GIF89a....", 1024).is_err());
        assert!(classify_upload(None, PNG, 1024).is_err());
    }

    #[test]
    fn test_rejects_oversized_and_empty() {
        assert!(classify_upload(Some("image/png"), PNG, 4).is_err());
        assert!(classify_upload(Some("image/png"), &[], 1024).is_err());
    }

    #[test]
    fn test_avatar_key_layout() {
        let user = Uuid::new_v4();
        let key = avatar_key(user, ImageKind::Jpeg);
        assert!(key.starts_with(&format!("avatars/{user}/")));
        assert!(key.ends_with(".jpg"));
    }
}
