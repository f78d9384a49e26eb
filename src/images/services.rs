use anyhow::Context;
use bytes::Bytes;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::UserError;
use crate::state::AppState;
use crate::users::{repo_types::UserRecord, services};

pub struct UploadItem<'a> {
    pub body: Bytes,
    pub content_type: &'a str,
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

fn image_key(user_id: Uuid, ext: &str) -> String {
    format!("uploads/user/image/{}/{}.{}", user_id, Uuid::new_v4(), ext)
}

/// Stores `upload` as the user's profile image and saves the new reference.
///
/// The previous object is removed once the record is saved; if the save
/// fails the new object is removed instead and the record keeps its old image.
#[instrument(skip(st, upload), fields(content_type = upload.content_type))]
pub async fn attach_image(
    st: &AppState,
    user_id: Uuid,
    upload: UploadItem<'_>,
) -> Result<UserRecord, UserError> {
    let ext = ext_from_mime(upload.content_type)
        .ok_or_else(|| UserError::UnsupportedImage(upload.content_type.to_string()))?;
    let mut user = services::find(st, user_id).await?;

    let key = image_key(user_id, ext);
    st.storage
        .put_object(&key, upload.body, upload.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;

    let previous = user.image.replace(key.clone());
    if let Err(e) = services::save(st, &mut user).await {
        if let Err(cleanup) = st.storage.delete_object(&key).await {
            warn!(error = %cleanup, %key, "failed to remove orphaned upload");
        }
        return Err(e);
    }

    if let Some(old) = previous.filter(|old| *old != key) {
        if let Err(e) = st.storage.delete_object(&old).await {
            warn!(error = %e, key = %old, "failed to remove previous profile image");
        }
    }
    info!(%user_id, %key, "profile image attached");
    Ok(user)
}

/// Presigned URL for the user's profile image, if one is stored.
pub async fn image_url(st: &AppState, user: &UserRecord) -> Result<Option<String>, UserError> {
    let Some(key) = user.image.as_deref() else {
        return Ok(None);
    };
    let url = st
        .storage
        .presign_get(key, st.config.image_url_ttl_secs)
        .await
        .with_context(|| format!("presign url for {}", key))?;
    Ok(Some(url))
}

#[cfg(test)]
mod image_tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::Secret;
    use crate::config::AppConfig;
    use crate::storage::MemoryStorage;
    use crate::users::memory::MemoryUserRepo;
    use crate::users::repo_types::NewUser;

    fn state() -> (AppState, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let st = AppState::from_parts(
            Arc::new(AppConfig::local()),
            Arc::new(MemoryUserRepo::new()),
            storage.clone(),
        );
        (st, storage)
    }

    async fn user(st: &AppState) -> UserRecord {
        services::create(
            st,
            NewUser {
                name: "Example User".into(),
                email: "pic@example.com".into(),
                password: Some(Secret::from("foobar")),
                password_confirmation: Some(Secret::from("foobar")),
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }

    fn png() -> UploadItem<'static> {
        UploadItem {
            body: Bytes::from_static(b"\x89PNG\r\n\x1a\n"),
            content_type: "image/png",
        }
    }

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/gif"), Some("gif"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("application/pdf"), None);
    }

    #[tokio::test]
    async fn attach_stores_object_and_reference() {
        let (st, storage) = state();
        let u = user(&st).await;

        let saved = attach_image(&st, u.id, png()).await.unwrap();
        let key = saved.image.clone().unwrap();

        assert!(key.starts_with(&format!("uploads/user/image/{}/", u.id)));
        assert!(key.ends_with(".png"));
        assert!(storage.contains(&key));
        assert_eq!(storage.content_type(&key).as_deref(), Some("image/png"));
        assert_eq!(services::find(&st, u.id).await.unwrap().image, Some(key.clone()));

        let url = image_url(&st, &saved).await.unwrap().unwrap();
        assert!(url.contains(&key));
    }

    #[tokio::test]
    async fn replacing_image_removes_previous_object() {
        let (st, storage) = state();
        let u = user(&st).await;

        let first = attach_image(&st, u.id, png()).await.unwrap().image.unwrap();
        let second = attach_image(&st, u.id, png()).await.unwrap().image.unwrap();

        assert_ne!(first, second);
        assert!(!storage.contains(&first));
        assert!(storage.contains(&second));
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn rejects_unsupported_content_type() {
        let (st, storage) = state();
        let u = user(&st).await;
        let err = attach_image(
            &st,
            u.id,
            UploadItem {
                body: Bytes::from_static(b"%PDF"),
                content_type: "application/pdf",
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, UserError::UnsupportedImage(ct) if ct == "application/pdf"));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn failed_save_discards_upload() {
        let (st, storage) = state();
        let u = user(&st).await;

        // an over-long bio stored out of band makes the next save invalid
        let mut broken = services::find(&st, u.id).await.unwrap();
        broken.bio = Some("x".repeat(501));
        st.users.update(&broken).await.unwrap();

        assert!(attach_image(&st, u.id, png()).await.is_err());
        assert!(storage.is_empty());
        assert_eq!(services::find(&st, u.id).await.unwrap().image, None);
    }

    #[tokio::test]
    async fn destroy_removes_image() {
        let (st, storage) = state();
        let u = user(&st).await;
        attach_image(&st, u.id, png()).await.unwrap();
        assert_eq!(storage.len(), 1);

        services::destroy(&st, u.id).await.unwrap();
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn no_image_no_url() {
        let (st, _) = state();
        let u = user(&st).await;
        assert_eq!(image_url(&st, &u).await.unwrap(), None);
    }
}
