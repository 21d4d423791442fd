use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::application::ports::AlertSinkPort;
use crate::domain::{
    alert::{Alert, AlertPayload},
    errors::{DomainError, DomainResult},
};

pub const SERVICE_KEY_HEADER: &str = "x-service-key";

/// Cliente del backend de alertas (POST JSON con clave de servicio).
pub struct HttpAlertSink {
    client: reqwest::Client,
    url: String,
    service_key: String,
    timeout: Duration,
}

impl HttpAlertSink {
    pub fn new(url: impl Into<String>, service_key: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.into(), service_key: service_key.into(), timeout })
    }
}

#[async_trait]
impl AlertSinkPort for HttpAlertSink {
    async fn send(&self, alert: &Alert) -> DomainResult<u16> {
        let payload = AlertPayload::new(alert, &self.service_key);
        let res = self
            .client
            .post(&self.url)
            .header(SERVICE_KEY_HEADER, &self.service_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DomainError::Timeout(self.timeout)
                } else {
                    DomainError::ResourceUnavailable(format!("alert backend: {e}"))
                }
            })?;

        let status = res.status().as_u16();
        if !res.status().is_success() {
            let body = res.text().await.unwrap_or_default();
            debug!(status, body = %body, "Respuesta del backend de alertas");
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::detection::BBox;
    use chrono::{TimeZone, Utc};
    use mockito::Matcher;
    use serde_json::json;

    fn alert() -> Alert {
        Alert {
            camera_id: "cam1".into(),
            class_label: "fire".into(),
            confidence: 0.5,
            bbox: BBox::new(1.0, 2.0, 3.0, 4.0),
            image_id: "abc.jpg".into(),
            image_base64: None,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn posts_payload_with_service_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/alerts/trigger")
            .match_header(SERVICE_KEY_HEADER, "secret")
            .match_body(Matcher::Json(json!({
                "serviceKey": "secret",
                "cameraId": "cam1",
                "className": "fire",
                "confidence": 0.5,
                "bbox": [1.0, 2.0, 3.0, 4.0],
                "imageId": "abc.jpg",
                "timestamp": "2024-05-01T12:00:00+00:00"
            })))
            .with_status(201)
            .create_async()
            .await;

        let sink = HttpAlertSink::new(
            format!("{}/api/alerts/trigger", server.url()),
            "secret",
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(sink.send(&alert()).await.unwrap(), 201);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_status_is_returned_not_raised() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("POST", "/").with_status(401).with_body("bad key").create_async().await;
        let sink = HttpAlertSink::new(server.url(), "wrong", Duration::from_secs(5)).unwrap();
        assert_eq!(sink.send(&alert()).await.unwrap(), 401);
    }

    #[tokio::test]
    async fn unreachable_backend_is_unavailable() {
        let sink = HttpAlertSink::new("http://127.0.0.1:9/alerts", "k", Duration::from_secs(2)).unwrap();
        assert!(sink.send(&alert()).await.is_err());
    }
}
