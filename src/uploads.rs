//! Attachment intake rules: how many files, which extensions, what they are
//! called on disk.

use uuid::Uuid;

use crate::error::ServiceError;

/// One file pulled out of a multipart request, not yet stored.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_files: usize,
    /// Lowercase extensions without the dot.
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        UploadPolicy {
            max_files: 3,
            allowed_extensions: vec!["pdf".into()],
        }
    }
}

impl UploadPolicy {
    pub fn check_count(&self, files: &[IncomingFile]) -> Result<(), ServiceError> {
        if files.len() > self.max_files {
            return Err(ServiceError::Validation(format!(
                "Only up to {} documents are allowed.",
                self.max_files
            )));
        }
        Ok(())
    }

    pub fn allows(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((_, ext)) => {
                let ext = ext.to_ascii_lowercase();
                self.allowed_extensions.iter().any(|a| *a == ext)
            }
            None => false,
        }
    }
}

/// Reduce an client-supplied file name to a safe, flat ASCII name.
/// Directory parts are dropped; anything outside `[A-Za-z0-9._-]` becomes `_`.
pub fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Unique on-disk name: 32 hex chars, underscore, sanitized original.
pub fn stored_name_for(sanitized: &str) -> String {
    format!("{}_{}", Uuid::new_v4().simple(), sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> IncomingFile {
        IncomingFile {
            filename: name.into(),
            content_type: "application/pdf".into(),
            data: vec![1, 2, 3],
        }
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        let policy = UploadPolicy::default();
        assert!(policy.allows("report.pdf"));
        assert!(policy.allows("REPORT.PDF"));
        assert!(!policy.allows("report.exe"));
        assert!(!policy.allows("pdf"));
    }

    #[test]
    fn too_many_files_rejected() {
        let policy = UploadPolicy::default();
        let files: Vec<_> = (0..4).map(|i| file(&format!("{i}.pdf"))).collect();
        assert!(matches!(policy.check_count(&files), Err(ServiceError::Validation(_))));
        assert!(policy.check_count(&files[..3]).is_ok());
    }

    #[test]
    fn filenames_are_flattened_and_cleaned() {
        assert_eq!(secure_filename("../../etc/passwd"), "passwd");
        assert_eq!(secure_filename("C:\\Users\\me\\my report.pdf"), "my_report.pdf");
        assert_eq!(secure_filename("résumé.pdf"), "r_sum_.pdf");
        assert_eq!(secure_filename(".hidden.pdf"), "hidden.pdf");
    }

    #[test]
    fn stored_names_are_unique() {
        let a = stored_name_for("x.pdf");
        let b = stored_name_for("x.pdf");
        assert_ne!(a, b);
        assert!(a.ends_with("_x.pdf"));
        assert_eq!(a.len(), 32 + 1 + "x.pdf".len());
    }
}
