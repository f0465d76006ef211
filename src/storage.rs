use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use axum::async_trait;
use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use crate::config::StorageConfig;

#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Writes the whole object or nothing.
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
    /// URL a client can fetch the object from for at least `seconds`.
    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String>;
}

pub async fn from_config(cfg: &StorageConfig) -> anyhow::Result<Arc<dyn StorageClient>> {
    let storage: Arc<dyn StorageClient> = match cfg {
        StorageConfig::Local { root, public_base } => {
            Arc::new(LocalStorage::new(root.clone(), public_base.clone()))
        }
        StorageConfig::S3 {
            endpoint,
            bucket,
            access_key,
            secret_key,
            region,
        } => Arc::new(S3Storage::new(endpoint, bucket, access_key, secret_key, region).await?),
    };
    Ok(storage)
}

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub async fn new(
        endpoint: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
        region: &str,
    ) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(Credentials::new(
                access_key, secret_key, None, None, "static",
            ))
            .endpoint_url(endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: bucket.to_string(),
        })
    }
}

#[async_trait]
impl StorageClient for S3Storage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .context("s3 put_object")?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("s3 delete_object")?;
        Ok(())
    }

    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String> {
        let req = self.client.get_object().bucket(&self.bucket).key(key);
        let presigned = req
            .presigned(PresigningConfig::expires_in(
                std::time::Duration::from_secs(seconds),
            )?)
            .await
            .context("s3 presign_get")?;
        Ok(presigned.uri().to_string())
    }
}

/// Files under a root directory, served statically under `public_base`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    public_base: String,
}

impl LocalStorage {
    pub fn new(root: PathBuf, public_base: String) -> Self {
        Self {
            root,
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        let rel = Path::new(key);
        let clean = !key.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            bail!("refusing storage key `{key}`");
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl StorageClient for LocalStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create dir {}", dir.display()))?;
        }
        let tmp = path.with_extension(format!("{}.part", Uuid::new_v4().simple()));
        if let Err(e) = tokio::fs::write(&tmp, &body).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("write {}", tmp.display()));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("rename into {}", path.display()));
        }
        debug!(key, bytes = body.len(), "stored object");
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }

    async fn presign_get(&self, key: &str, _seconds: u64) -> anyhow::Result<String> {
        self.path_for(key)?;
        Ok(format!("{}/{}", self.public_base, key))
    }
}

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

/// `results/{subject}/{subject}_{file}.{ext}`: one namespace per subject and a
/// fresh id per file, so concurrent uploads never collide.
pub fn result_image_key(subject_id: Uuid, content_type: &str) -> String {
    let ext = ext_from_mime(content_type).unwrap_or("bin");
    format!(
        "results/{subject_id}/{subject_id}_{}.{ext}",
        Uuid::new_v4().simple()
    )
}

pub async fn presign_many(
    storage: &dyn StorageClient,
    keys: &[String],
    expires_seconds: u64,
) -> anyhow::Result<Vec<String>> {
    let mut out = Vec::with_capacity(keys.len());
    for k in keys {
        out.push(
            storage
                .presign_get(k, expires_seconds)
                .await
                .with_context(|| format!("presign url for {k}"))?,
        );
    }
    Ok(out)
}
