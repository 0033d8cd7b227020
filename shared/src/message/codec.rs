//! 帧编解码
//!
//! ```text
//! ┌──────────┬──────────────┬──────────────────┬─────────────┬─────────┐
//! │ type (1) │ request (16) │ correlation (16) │ len (4, LE) │ payload │
//! └──────────┴──────────────┴──────────────────┴─────────────┴─────────┘
//! ```
//!
//! correlation 为 nil UUID 表示无关联 ID。

use super::{BusMessage, EventType};
use thiserror::Error;
use uuid::Uuid;

/// 帧头长度
pub const HEADER_LEN: usize = 1 + 16 + 16 + 4;

/// 单帧最大载荷 (16 MiB)
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Invalid event type: {0}")]
    InvalidEventType(u8),

    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),
}

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub event_type: EventType,
    pub request_id: Uuid,
    pub correlation_id: Option<Uuid>,
    pub payload_len: usize,
}

impl FrameHeader {
    /// 解析帧头
    pub fn decode(buf: &[u8; HEADER_LEN]) -> Result<Self, FrameError> {
        let event_type =
            EventType::try_from(buf[0]).map_err(|_| FrameError::InvalidEventType(buf[0]))?;

        let mut uuid_buf = [0u8; 16];
        uuid_buf.copy_from_slice(&buf[1..17]);
        let request_id = Uuid::from_bytes(uuid_buf);

        uuid_buf.copy_from_slice(&buf[17..33]);
        let correlation_raw = Uuid::from_bytes(uuid_buf);
        let correlation_id = if correlation_raw.is_nil() {
            None
        } else {
            Some(correlation_raw)
        };

        let mut len_buf = [0u8; 4];
        len_buf.copy_from_slice(&buf[33..37]);
        let payload_len = u32::from_le_bytes(len_buf) as usize;
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLarge(payload_len));
        }

        Ok(Self {
            event_type,
            request_id,
            correlation_id,
            payload_len,
        })
    }

    /// 与载荷组合为完整消息
    pub fn into_message(self, payload: Vec<u8>) -> BusMessage {
        BusMessage {
            request_id: self.request_id,
            event_type: self.event_type,
            correlation_id: self.correlation_id,
            payload,
        }
    }
}

/// 编码完整帧
pub fn encode(msg: &BusMessage) -> Result<Vec<u8>, FrameError> {
    if msg.payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge(msg.payload.len()));
    }

    let mut data = Vec::with_capacity(HEADER_LEN + msg.payload.len());
    data.push(msg.event_type as u8);
    data.extend_from_slice(msg.request_id.as_bytes());

    let correlation_bytes = msg.correlation_id.unwrap_or(Uuid::nil()).into_bytes();
    data.extend_from_slice(&correlation_bytes);

    data.extend_from_slice(&(msg.payload.len() as u32).to_le_bytes());
    data.extend_from_slice(&msg.payload);
    Ok(data)
}
