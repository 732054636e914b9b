use axum::body::Body;
use multer::{Constraints, Field, Multipart, SizeLimit};
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use crate::cleanup;
use crate::error::AppError;
use crate::storage::{extension_of, generate_name, Storage};

const MAX_TEXT_FIELD_SIZE: u64 = 20 * 1024 * 1024;

/// A staged video plus the form fields that came with it.
#[derive(Debug)]
pub struct ReceivedUpload {
    pub video_name: String,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
}

#[derive(Default)]
struct Fields {
    video_name: Option<String>,
    title: Option<String>,
    description: Option<String>,
    thumbnail: Option<String>,
}

fn multipart_error(e: multer::Error) -> AppError {
    match e {
        multer::Error::FieldSizeExceeded { .. } | multer::Error::StreamSizeExceeded { .. } => {
            AppError::PayloadTooLarge(format!("Upload too large: {}", e))
        }
        other => AppError::Validation(format!("Error parsing multipart request: {}", other)),
    }
}

/// Parse a multipart upload, streaming the `file` part into storage.
///
/// On any failure after the file was staged, the staged file is removed
/// before returning.
pub async fn receive(
    storage: &Storage,
    max_file_size: u64,
    content_type: Option<&str>,
    body: Body,
) -> Result<ReceivedUpload, AppError> {
    let content_type = content_type
        .ok_or_else(|| AppError::Validation("Missing Content-Type header".to_string()))?;
    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| AppError::Validation(format!("Invalid multipart request: {}", e)))?;

    let constraints = Constraints::new().size_limit(
        SizeLimit::new()
            .whole_stream(max_file_size.saturating_add(4 * MAX_TEXT_FIELD_SIZE))
            .per_field(MAX_TEXT_FIELD_SIZE)
            .for_field("file", max_file_size),
    );
    let mut multipart = Multipart::with_constraints(body.into_data_stream(), boundary, constraints);

    let mut fields = Fields::default();
    if let Err(e) = read_fields(storage, &mut multipart, &mut fields).await {
        if let Some(name) = &fields.video_name {
            cleanup::rollback_staged(storage, &[name.as_str()]).await;
        }
        return Err(e);
    }

    let missing = || AppError::Validation("file and title are required".to_string());
    let video_name = fields.video_name.ok_or_else(missing)?;
    let title = match fields.title.map(|t| t.trim().to_string()) {
        Some(title) if !title.is_empty() => title,
        _ => {
            cleanup::rollback_staged(storage, &[video_name.as_str()]).await;
            return Err(missing());
        }
    };

    Ok(ReceivedUpload {
        video_name,
        title,
        description: fields.description,
        thumbnail: fields.thumbnail,
    })
}

async fn read_fields(
    storage: &Storage,
    multipart: &mut Multipart<'_>,
    fields: &mut Fields,
) -> Result<(), AppError> {
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" if fields.video_name.is_none() => {
                let extension = field.file_name().and_then(extension_of);
                let staged = stage_file(storage, field, extension.as_deref()).await?;
                fields.video_name = Some(staged);
            }
            "title" => fields.title = Some(field.text().await.map_err(multipart_error)?),
            "description" => {
                fields.description = Some(field.text().await.map_err(multipart_error)?)
            }
            "thumbnail" => fields.thumbnail = Some(field.text().await.map_err(multipart_error)?),
            _ => {
                // Drain unknown and duplicate fields
                while field.chunk().await.map_err(multipart_error)?.is_some() {}
            }
        }
    }

    Ok(())
}

async fn stage_file(
    storage: &Storage,
    mut field: Field<'_>,
    extension: Option<&str>,
) -> Result<String, AppError> {
    let name = generate_name(extension);
    let mut file = tokio::fs::File::create(storage.path(&name)).await?;

    let written = async {
        let mut written: u64 = 0;
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.sync_all().await?;
        Ok::<u64, AppError>(written)
    }
    .await;

    match written {
        Ok(bytes) => {
            info!(
                "[upload] 📦 Staged {} ({:.2} MB)",
                name,
                bytes as f64 / 1024.0 / 1024.0
            );
            Ok(name)
        }
        Err(e) => {
            drop(file);
            if let Err(remove_err) = storage.remove_if_present(&name).await {
                error!("[upload] Failed to remove partial file {}: {}", name, remove_err);
            }
            Err(e)
        }
    }
}
