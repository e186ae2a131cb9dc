//! Checkpoint codes: scannable tokens attached to every order.
//!
//! A checkpoint code identifies an order at physical handoff points. It
//! carries no authority of its own; whoever scans it is authorized against
//! the stored order, never against the payload.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{Cid, OrderId, ProductId};
use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::OrderSource;

const PAYLOAD_KIND: &str = "order";

/// Errors producing or reading a checkpoint code.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The payload could not be rendered into an image.
    #[error("Failed to render checkpoint code: {0}")]
    Render(String),

    /// The scanned text is not a checkpoint payload.
    #[error("Malformed checkpoint code")]
    Malformed,

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What a checkpoint code encodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub order_id: OrderId,
    pub mode: OrderSource,
    pub buyer_cid: Cid,
    pub product_id: ProductId,
    pub product_name: String,
    pub qty: u32,
    /// Milliseconds since the Unix epoch.
    pub ts: i64,
}

impl CheckpointPayload {
    pub fn new(
        order_id: OrderId,
        mode: OrderSource,
        buyer_cid: Cid,
        product_id: ProductId,
        product_name: impl Into<String>,
        qty: u32,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: PAYLOAD_KIND.to_string(),
            order_id,
            mode,
            buyer_cid,
            product_id,
            product_name: product_name.into(),
            qty,
            ts: at.timestamp_millis(),
        }
    }
}

/// A generated checkpoint code: the encoded text and its rendered image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointCode {
    /// The text a scanner reads back.
    pub payload: String,
    /// The rendered image (SVG markup).
    pub image: String,
}

/// Turns payload text into a scannable image.
pub trait CheckpointRenderer: Send + Sync {
    fn render(&self, text: &str) -> Result<String, CheckpointError>;
}

/// Renders QR codes as SVG with medium error correction.
#[derive(Debug, Clone, Copy)]
pub struct QrSvgRenderer {
    min_size: u32,
}

impl QrSvgRenderer {
    pub fn new(min_size: u32) -> Self {
        Self { min_size }
    }
}

impl Default for QrSvgRenderer {
    fn default() -> Self {
        Self::new(256)
    }
}

impl CheckpointRenderer for QrSvgRenderer {
    fn render(&self, text: &str) -> Result<String, CheckpointError> {
        let code = QrCode::with_error_correction_level(text.as_bytes(), EcLevel::M)
            .map_err(|e| CheckpointError::Render(e.to_string()))?;
        Ok(code
            .render::<svg::Color>()
            .min_dimensions(self.min_size, self.min_size)
            .build())
    }
}

/// Produces and reads checkpoint codes.
#[derive(Clone)]
pub struct CheckpointGenerator {
    renderer: Arc<dyn CheckpointRenderer>,
}

impl CheckpointGenerator {
    pub fn new(renderer: impl CheckpointRenderer + 'static) -> Self {
        Self {
            renderer: Arc::new(renderer),
        }
    }

    /// Encodes and renders a payload.
    pub fn generate(&self, payload: &CheckpointPayload) -> Result<CheckpointCode, CheckpointError> {
        let text = serde_json::to_string(payload)?;
        let image = self.renderer.render(&text)?;
        Ok(CheckpointCode {
            payload: text,
            image,
        })
    }

    /// Reads back scanned checkpoint text.
    pub fn decode(text: &str) -> Result<CheckpointPayload, CheckpointError> {
        let payload: CheckpointPayload =
            serde_json::from_str(text.trim()).map_err(|_| CheckpointError::Malformed)?;
        if payload.kind != PAYLOAD_KIND {
            return Err(CheckpointError::Malformed);
        }
        Ok(payload)
    }
}

impl Default for CheckpointGenerator {
    fn default() -> Self {
        Self::new(QrSvgRenderer::default())
    }
}
