//! Multipart form decoding for book and profile uploads

use std::{collections::HashMap, fmt::Display, str::FromStr};

use axum_extra::extract::Multipart;

use crate::{
    error::{AppError, AppResult},
    services::uploads::UploadedFile,
};

/// Text fields and files of a `multipart/form-data` body
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl MultipartForm {
    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if field.file_name().is_some() {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                // Browsers send an empty part when no file was chosen
                if bytes.is_empty() {
                    continue;
                }
                form.files.insert(
                    name,
                    UploadedFile { file_name, content_type, bytes: bytes.to_vec() },
                );
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    /// Trimmed text value; blank counts as absent
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn parse<T>(&self, name: &str) -> AppResult<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.text(name)
            .map(|v| {
                v.parse::<T>()
                    .map_err(|e| AppError::Validation(format!("Invalid value for {}: {}", name, e)))
            })
            .transpose()
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }

    #[cfg(test)]
    pub fn with_text(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_blank_text_is_absent() {
        let form = MultipartForm::default().with_text("title", "  ").with_text("author", " Tere Liye ");
        assert_eq!(form.text("title"), None);
        assert_eq!(form.text("author").as_deref(), Some("Tere Liye"));
        assert_eq!(form.text("missing"), None);
    }

    #[test]
    fn test_parse_fields() {
        let form = MultipartForm::default()
            .with_text("year", "2005")
            .with_text("stock", "many")
            .with_text("birth_date", "1990-04-12");

        assert_eq!(form.parse::<i32>("year").unwrap(), Some(2005));
        assert_eq!(form.parse::<i32>("publisher").unwrap(), None);
        assert_eq!(
            form.parse::<NaiveDate>("birth_date").unwrap(),
            NaiveDate::from_ymd_opt(1990, 4, 12)
        );

        let err = form.parse::<i32>("stock").unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("stock")));
    }
}
