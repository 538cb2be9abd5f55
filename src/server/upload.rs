use std::collections::HashMap;

use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;

use crate::documents::{file_type_of, format_size};
use crate::server::response::ApiError;
use crate::server::validation::validate_file_name;
use crate::storage::{FileStore, FileStoreError, StagedUpload};
use crate::system::RuntimeSettings;

/// A file received through multipart and staged on disk.
pub struct UploadedFile {
    pub file_name: String,
    pub file_type: String,
    pub staged: StagedUpload,
}

/// A parsed multipart form: at most one `file` part plus text fields.
pub struct UploadForm {
    pub file: Option<UploadedFile>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn take_file(&mut self) -> Result<UploadedFile, ApiError> {
        self.file
            .take()
            .ok_or_else(|| ApiError::bad_request("File field is required"))
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    ApiError {
        status: e.status(),
        message: format!("Failed to read multipart: {}", e.body_text()),
    }
}

fn storage_error(e: FileStoreError) -> ApiError {
    match e {
        FileStoreError::TooLarge { limit } => ApiError::payload_too_large(format!(
            "File exceeds the maximum size of {}",
            format_size(limit)
        )),
        e => {
            tracing::error!("Failed to stage upload: {e}");
            ApiError::internal("Failed to store upload")
        }
    }
}

/// Reads a multipart upload, streaming the `file` part into staging while
/// enforcing the allowed types and the size limit.
pub async fn read_upload(
    multipart: &mut Multipart,
    files: &FileStore,
    settings: &RuntimeSettings,
) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm {
        file: None,
        fields: HashMap::new(),
    };

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "file" {
            if form.file.is_some() {
                return Err(ApiError::bad_request("Only one file may be uploaded"));
            }

            let file_name = validate_file_name(field.file_name().unwrap_or_default())?;
            let file_type = file_type_of(&file_name);
            if !settings.is_allowed_file_type(&file_type) {
                return Err(ApiError::bad_request(format!(
                    "File type '{file_type}' is not allowed"
                )));
            }

            let mut staging = files
                .stage(settings.max_file_size_bytes())
                .await
                .map_err(storage_error)?;
            while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                staging.write(&chunk).await.map_err(storage_error)?;
            }
            let staged = staging.finish().await.map_err(storage_error)?;

            form.file = Some(UploadedFile {
                file_name,
                file_type,
                staged,
            });
        } else {
            let value = field.text().await.map_err(multipart_error)?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}
