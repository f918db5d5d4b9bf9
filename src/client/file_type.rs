//! File-type allow-list.
//!
//! Detection is by extension (`mime_guess`), done before any byte is read or
//! sent, so an unsupported file never reaches the network.

use crate::error::ClientError;
use std::fmt;
use std::path::Path;

/// File kinds the provider's OCR accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportedFileType {
    Pdf,
    Png,
    Jpeg,
    Webp,
    Bmp,
    Tiff,
}

impl SupportedFileType {
    pub const ALL: [SupportedFileType; 6] = [
        SupportedFileType::Pdf,
        SupportedFileType::Png,
        SupportedFileType::Jpeg,
        SupportedFileType::Webp,
        SupportedFileType::Bmp,
        SupportedFileType::Tiff,
    ];

    /// Canonical MIME type sent with the upload.
    pub fn mime(&self) -> &'static str {
        match self {
            SupportedFileType::Pdf => "application/pdf",
            SupportedFileType::Png => "image/png",
            SupportedFileType::Jpeg => "image/jpeg",
            SupportedFileType::Webp => "image/webp",
            SupportedFileType::Bmp => "image/bmp",
            SupportedFileType::Tiff => "image/tiff",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_lowercase().as_str() {
            "application/pdf" => Some(SupportedFileType::Pdf),
            "image/png" => Some(SupportedFileType::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(SupportedFileType::Jpeg),
            "image/webp" => Some(SupportedFileType::Webp),
            "image/bmp" | "image/x-bmp" | "image/x-ms-bmp" => Some(SupportedFileType::Bmp),
            "image/tiff" | "image/tiff-fx" => Some(SupportedFileType::Tiff),
            _ => None,
        }
    }

    /// Classify `path` by extension.
    ///
    /// # Errors
    /// [`ClientError::UnsupportedFileType`] for anything outside the allow-list,
    /// including files without a recognisable extension.
    pub fn detect(path: &Path) -> Result<Self, ClientError> {
        let guess = mime_guess::from_path(path);
        guess
            .iter_raw()
            .find_map(Self::from_mime)
            .ok_or_else(|| ClientError::UnsupportedFileType {
                path: path.to_path_buf(),
                mime: guess.first_raw().unwrap_or("unknown").to_string(),
            })
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self, SupportedFileType::Pdf)
    }
}

impl fmt::Display for SupportedFileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupportedFileType::Pdf => "PDF",
            SupportedFileType::Png => "PNG",
            SupportedFileType::Jpeg => "JPEG",
            SupportedFileType::Webp => "WEBP",
            SupportedFileType::Bmp => "BMP",
            SupportedFileType::Tiff => "TIFF",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_allowed_extensions() {
        let cases = [
            ("report.pdf", SupportedFileType::Pdf),
            ("scan.PNG", SupportedFileType::Png),
            ("photo.jpg", SupportedFileType::Jpeg),
            ("photo.jpeg", SupportedFileType::Jpeg),
            ("pic.webp", SupportedFileType::Webp),
            ("old.bmp", SupportedFileType::Bmp),
            ("fax.tif", SupportedFileType::Tiff),
            ("fax.tiff", SupportedFileType::Tiff),
        ];
        for (name, expected) in cases {
            assert_eq!(
                SupportedFileType::detect(Path::new(name)).unwrap(),
                expected,
                "{name}"
            );
        }
    }

    #[test]
    fn rejects_other_types() {
        for name in ["notes.txt", "slides.pptx", "archive.zip", "README"] {
            match SupportedFileType::detect(Path::new(name)) {
                Err(ClientError::UnsupportedFileType { path, .. }) => {
                    assert_eq!(path, Path::new(name))
                }
                other => panic!("{name}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn mime_round_trip_for_all() {
        for kind in SupportedFileType::ALL {
            assert_eq!(SupportedFileType::from_mime(kind.mime()), Some(kind));
        }
    }
}
