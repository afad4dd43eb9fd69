//! Persists decoded image payloads to the local filesystem.
//!
//! Placement follows the caller's hint: an existing directory (or a hint
//! ending in a path separator) receives generated file names, anything else is
//! treated as an exact file path. Generated names embed a timestamp and a
//! random suffix. Files are opened with `create_new` unless the caller asked
//! to overwrite.

use std::io;
use std::path::{Path, PathBuf};

use base64::Engine;
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ImageError, Result};
use crate::openai::GeneratedImage;
use crate::options::OutputFormat;

const FILE_PREFIX: &str = "image";

/// A file written by [`ArtifactWriter`]. The writer keeps no reference to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifact {
    pub path: PathBuf,
    pub format: OutputFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Directory(PathBuf),
    File(PathBuf),
}

impl Destination {
    /// Target for the `index`-th image of a batch of `total`. Exact file
    /// targets get a numeric suffix when more than one image is written.
    fn for_index(&self, index: usize, total: usize) -> Destination {
        match self {
            Destination::File(path) if total > 1 => {
                let stem = path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| FILE_PREFIX.to_string());
                let name = match path.extension() {
                    Some(ext) => format!("{stem}-{}.{}", index + 1, ext.to_string_lossy()),
                    None => format!("{stem}-{}", index + 1),
                };
                Destination::File(path.with_file_name(name))
            }
            other => other.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    default_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(default_dir: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            default_dir: std::path::absolute(default_dir)?,
        })
    }

    pub fn in_current_dir() -> io::Result<Self> {
        Self::new(std::env::current_dir()?)
    }

    pub async fn resolve_destination(&self, hint: Option<&str>) -> Result<Destination> {
        let Some(raw) = hint.map(str::trim).filter(|value| !value.is_empty()) else {
            return Ok(Destination::Directory(self.default_dir.clone()));
        };
        let path = if Path::new(raw).is_absolute() {
            PathBuf::from(raw)
        } else {
            self.default_dir.join(raw)
        };
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => return Ok(Destination::Directory(path)),
            Ok(_) => return Ok(Destination::File(path)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(ImageError::write(&path, err)),
        }
        if raw.ends_with('/') || raw.ends_with(std::path::MAIN_SEPARATOR) {
            Ok(Destination::Directory(path))
        } else {
            Ok(Destination::File(path))
        }
    }

    /// Decodes one payload and writes it under `hint`.
    pub async fn save(
        &self,
        payload: &str,
        format: OutputFormat,
        hint: Option<&str>,
        overwrite: bool,
    ) -> Result<SavedArtifact> {
        let destination = self.resolve_destination(hint).await?;
        self.write_payload(payload, format, &destination, overwrite).await
    }

    /// Saves every image in order. Images written before a failure stay on
    /// disk; there is no rollback.
    pub async fn save_batch(
        &self,
        images: &[GeneratedImage],
        format: OutputFormat,
        hint: Option<&str>,
        overwrite: bool,
    ) -> Result<Vec<SavedArtifact>> {
        let destination = self.resolve_destination(hint).await?;
        let total = images.len();
        let mut saved = Vec::with_capacity(total);
        for (index, image) in images.iter().enumerate() {
            let target = destination.for_index(index, total);
            let artifact = self
                .write_payload(&image.b64_json, format, &target, overwrite)
                .await?;
            saved.push(artifact);
        }
        Ok(saved)
    }

    async fn write_payload(
        &self,
        payload: &str,
        format: OutputFormat,
        destination: &Destination,
        overwrite: bool,
    ) -> Result<SavedArtifact> {
        let bytes = decode_payload(payload)?;
        let path = match destination {
            Destination::Directory(dir) => dir.join(generate_file_name(format)),
            Destination::File(path) => path.clone(),
        };
        if bytes.is_empty() {
            return Err(ImageError::write(&path, "decoded image payload is empty"));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| ImageError::write(parent, err))?;
        }

        let mut options = fs::OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let mut file = options.open(&path).await.map_err(|err| {
            if err.kind() == io::ErrorKind::AlreadyExists {
                ImageError::write(&path, "file already exists; pass overwrite=true to replace it")
            } else {
                ImageError::write(&path, err)
            }
        })?;
        file.write_all(&bytes)
            .await
            .map_err(|err| ImageError::write(&path, err))?;
        file.flush().await.map_err(|err| ImageError::write(&path, err))?;

        debug!(path = %path.display(), bytes = bytes.len(), "saved image artifact");
        Ok(SavedArtifact { path, format })
    }
}

fn decode_payload(payload: &str) -> Result<Vec<u8>> {
    let data = match payload.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => payload,
    };
    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(base64::engine::general_purpose::STANDARD.decode(compact)?)
}

fn generate_file_name(format: OutputFormat) -> String {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{FILE_PREFIX}-{stamp}-{}.{}", &suffix[..12], format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[tokio::test]
    async fn saves_into_default_dir_with_format_extension() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = ArtifactWriter::new(temp.path())?;
        let saved = writer.save(&encoded(b"webp-bytes"), OutputFormat::Webp, None, false).await?;

        assert!(saved.path.starts_with(temp.path()));
        assert_eq!(saved.path.extension().and_then(|e| e.to_str()), Some("webp"));
        assert_eq!(std::fs::read(&saved.path)?, b"webp-bytes");
        Ok(())
    }

    #[tokio::test]
    async fn existing_directory_hint_gets_unique_names() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let out = temp.path().join("out");
        std::fs::create_dir(&out)?;
        let writer = ArtifactWriter::new(temp.path())?;
        let hint = out.to_string_lossy().into_owned();

        let first = writer.save(&encoded(b"a"), OutputFormat::Png, Some(&hint), false).await?;
        let second = writer.save(&encoded(b"b"), OutputFormat::Png, Some(&hint), false).await?;
        assert_ne!(first.path, second.path);
        assert_eq!(first.path.parent(), Some(out.as_path()));
        Ok(())
    }

    #[tokio::test]
    async fn file_hint_creates_parents() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = ArtifactWriter::new(temp.path())?;
        let target = temp.path().join("nested/deeper/cube.png");
        let hint = target.to_string_lossy().into_owned();

        let saved = writer.save(&encoded(b"png"), OutputFormat::Png, Some(&hint), false).await?;
        assert_eq!(saved.path, target);
        assert!(target.is_file());
        Ok(())
    }

    #[tokio::test]
    async fn refuses_to_clobber_unless_asked() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = ArtifactWriter::new(temp.path())?;
        let target = temp.path().join("existing.png");
        std::fs::write(&target, b"old")?;
        let hint = target.to_string_lossy().into_owned();

        let refused = writer.save(&encoded(b"new"), OutputFormat::Png, Some(&hint), false).await;
        assert!(matches!(refused, Err(ImageError::Write { .. })));
        assert_eq!(std::fs::read(&target)?, b"old");

        writer.save(&encoded(b"new"), OutputFormat::Png, Some(&hint), true).await?;
        assert_eq!(std::fs::read(&target)?, b"new");
        Ok(())
    }

    #[tokio::test]
    async fn batch_with_file_hint_numbers_each_image() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = ArtifactWriter::new(temp.path())?;
        let images = vec![
            GeneratedImage { b64_json: encoded(b"1") },
            GeneratedImage { b64_json: encoded(b"2") },
        ];

        let saved = writer
            .save_batch(&images, OutputFormat::Jpeg, Some("shots/cube.jpg"), false)
            .await?;
        let names: Vec<_> = saved
            .iter()
            .filter_map(|artifact| artifact.path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["cube-1.jpg", "cube-2.jpg"]);
        Ok(())
    }

    #[tokio::test]
    async fn rejects_invalid_base64() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = ArtifactWriter::new(temp.path())?;
        let result = writer.save("not base64!!", OutputFormat::Png, None, false).await;
        assert!(matches!(result, Err(ImageError::Decode(_))));
        Ok(())
    }

    #[test]
    fn strips_data_url_prefix() {
        let payload = format!("data:image/png;base64,{}", encoded(b"xyz"));
        assert_eq!(decode_payload(&payload).ok(), Some(b"xyz".to_vec()));
    }
}
