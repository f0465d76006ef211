//! Client side of the external image classifier.

use std::time::Duration;

use anyhow::{bail, Context};
use axum::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::debug;

use crate::config::ClassifierConfig;
use crate::results::repo_types::Verdict;

/// One image's verdict; `confidence` is in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: Verdict,
    pub confidence: f64,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn predict(&self, image: Bytes, content_type: &str) -> anyhow::Result<Prediction>;
}

#[derive(Debug, Deserialize)]
struct RawPrediction {
    label: String,
    confidence: f64,
}

impl RawPrediction {
    fn validate(self) -> anyhow::Result<Prediction> {
        let Some(label) = Verdict::parse(&self.label) else {
            bail!("classifier returned unknown label `{}`", self.label);
        };
        if !(0.0..=1.0).contains(&self.confidence) {
            bail!("classifier confidence {} outside [0, 1]", self.confidence);
        }
        Ok(Prediction {
            label,
            confidence: self.confidence,
        })
    }
}

/// POSTs raw image bytes and expects `{"label": .., "confidence": ..}` back.
#[derive(Clone)]
pub struct HttpClassifier {
    url: String,
    http: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(cfg: &ClassifierConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build classifier http client")?;
        Ok(Self {
            url: cfg.url.clone(),
            http,
        })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn predict(&self, image: Bytes, content_type: &str) -> anyhow::Result<Prediction> {
        let bytes = image.len();
        let raw: RawPrediction = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, content_type)
            .body(image)
            .send()
            .await
            .context("classifier request")?
            .error_for_status()
            .context("classifier status")?
            .json()
            .await
            .context("classifier response body")?;
        debug!(bytes, label = %raw.label, confidence = raw.confidence, "classified image");
        raw.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(label: &str, confidence: f64) -> RawPrediction {
        RawPrediction {
            label: label.into(),
            confidence,
        }
    }

    #[test]
    fn accepts_known_labels_in_range() {
        let p = raw("NON CANCER", 0.42).validate().unwrap();
        assert_eq!(p.label, Verdict::NonCancer);
        assert_eq!(p.confidence, 0.42);
        assert!(raw("CANCER", 1.0).validate().is_ok());
    }

    #[test]
    fn rejects_malformed_predictions() {
        assert!(raw("BENIGN", 0.5).validate().is_err());
        assert!(raw("CANCER", 1.2).validate().is_err());
        assert!(raw("CANCER", -0.1).validate().is_err());
        assert!(raw("CANCER", f64::NAN).validate().is_err());
    }
}
