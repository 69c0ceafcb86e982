//! Wire format and HTTP client for the remote field-detection service.

use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::page::{Field, Label};
use base64::{engine::general_purpose, Engine as _};
use image::DynamicImage;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

/// One detected bounding box as reported by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedBox {
    pub top: i32,
    pub left: i32,
    pub width: i32,
    pub height: i32,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub related_field: Option<Box<DetectedBox>>,
}

impl DetectedBox {
    pub fn rect(&self) -> Rect {
        Rect::new(self.left, self.top, self.width, self.height)
    }

    pub fn into_field(self) -> Field {
        Field {
            rect: Rect::new(self.left, self.top, self.width, self.height),
            class_name: self.class_name.unwrap_or_default(),
            text: self.text,
            related_field: self.related_field.map(|b| Box::new(b.into_field())),
        }
    }

    pub fn into_label(self) -> Label {
        Label {
            rect: Rect::new(self.left, self.top, self.width, self.height),
            text: self.text.unwrap_or_default(),
        }
    }
}

/// Response of one detection call: all fields and labels found in the image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionResponse {
    #[serde(default)]
    pub fields: Vec<DetectedBox>,
    #[serde(default)]
    pub labels: Vec<DetectedBox>,
}

impl DetectionResponse {
    pub fn into_fields_and_labels(self) -> (Vec<Field>, Vec<Label>) {
        let fields = self.fields.into_iter().map(DetectedBox::into_field).collect();
        let labels = self.labels.into_iter().map(DetectedBox::into_label).collect();
        (fields, labels)
    }
}

/// External field-detection collaborator.
pub trait FieldDetector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<DetectionResponse>;
}

/// Blocking HTTP client for the detection service.
pub struct HttpFieldDetector {
    client: Client,
    url: String,
}

impl HttpFieldDetector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

impl FieldDetector for HttpFieldDetector {
    fn detect(&self, image: &DynamicImage) -> Result<DetectionResponse> {
        let mut png_bytes = Vec::new();
        image
            .write_to(
                &mut std::io::Cursor::new(&mut png_bytes),
                image::ImageFormat::Png,
            )
            .map_err(|e| Error::ScreenshotFailed(format!("PNG encoding failed: {}", e)))?;

        let image_base64 = general_purpose::STANDARD.encode(&png_bytes);
        let body = json!({ "image": image_base64 });

        debug!(url = %self.url, "calling field detection service");
        let response = self.client.post(&self.url).json(&body).send()?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Configuration(format!(
                "Field detection service error {}: {}",
                status, error_text
            )));
        }

        let detected: DetectionResponse = response.json()?;
        debug!(
            fields = detected.fields.len(),
            labels = detected.labels.len(),
            "field detection service replied"
        );
        Ok(detected)
    }
}
