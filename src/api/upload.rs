/// Multipart form collection
///
/// File parts are streamed into the temporary upload directory under random
/// names; text parts are kept in memory. Files the blob store has not
/// consumed are removed when the form is dropped.
use crate::error::{ApiError, ApiResult};
use axum::extract::{multipart::Field, Multipart};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tokio::{fs::File, io::AsyncWriteExt};

#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    files: HashMap<String, PathBuf>,
}

impl UploadForm {
    pub async fn collect(mut multipart: Multipart, tmp_dir: &Path) -> ApiResult<Self> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::InvalidInput(format!("Malformed multipart body: {}", e)))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if field.file_name().is_some() {
                let path = temp_path(tmp_dir, field.file_name());
                // Registered before writing so a failed write is cleaned up too
                form.files.insert(name, path.clone());
                write_part(field, &path).await?;
            } else {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::InvalidInput(format!("Malformed multipart body: {}", e)))?;
                form.fields.insert(name, text);
            }
        }

        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.fields.get(name).cloned()
    }

    pub fn file(&self, name: &str) -> Option<PathBuf> {
        self.files.get(name).cloned()
    }
}

impl Drop for UploadForm {
    fn drop(&mut self) {
        for path in self.files.values() {
            // Consumed uploads are already gone
            let _ = std::fs::remove_file(path);
        }
    }
}

fn temp_path(tmp_dir: &Path, original_name: Option<&str>) -> PathBuf {
    let extension = original_name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()));

    let name = match extension {
        Some(ext) => format!("{}.{}", uuid::Uuid::new_v4(), ext.to_ascii_lowercase()),
        None => uuid::Uuid::new_v4().to_string(),
    };
    tmp_dir.join(name)
}

async fn write_part(mut field: Field<'_>, path: &Path) -> ApiResult<()> {
    let mut file = File::create(path)
        .await
        .map_err(|e| ApiError::UploadFailed(format!("Failed to create temporary upload: {}", e)))?;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::InvalidInput(format!("Malformed multipart body: {}", e)))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|e| ApiError::UploadFailed(format!("Failed to write temporary upload: {}", e)))?;
    }

    file.flush()
        .await
        .map_err(|e| ApiError::UploadFailed(format!("Failed to write temporary upload: {}", e)))?;
    Ok(())
}
