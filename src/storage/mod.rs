mod files;

pub use files::{FileStore, FileStoreError, StagedUpload, StagingFile, open_file};
