//! 消息总线消息类型定义
//!
//! 订单存储通过消息总线广播 `Sync` 信号，变更订阅端 (TCP feed)
//! 读取这些消息并转换为 `ChangeEvent`。

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use uuid::Uuid;

pub mod codec;
pub mod payload;
pub use payload::*;

/// 协议版本号
pub const PROTOCOL_VERSION: u16 = 2;

/// 消息总线事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// 握手消息
    Handshake = 0,
    /// 系统通知
    Notification = 1,
    /// 服务器指令
    ServerCommand = 2,
    /// 客户端请求
    RequestCommand = 3,
    /// 同步信号
    Sync = 4,
    /// 请求响应
    Response = 5,
}

impl TryFrom<u8> for EventType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EventType::Handshake),
            1 => Ok(EventType::Notification),
            2 => Ok(EventType::ServerCommand),
            3 => Ok(EventType::RequestCommand),
            4 => Ok(EventType::Sync),
            5 => Ok(EventType::Response),
            _ => Err(()),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Handshake => write!(f, "handshake"),
            EventType::Notification => write!(f, "notification"),
            EventType::ServerCommand => write!(f, "server_command"),
            EventType::RequestCommand => write!(f, "request_command"),
            EventType::Sync => write!(f, "sync"),
            EventType::Response => write!(f, "response"),
        }
    }
}

/// 消息总线消息体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub request_id: Uuid,
    pub event_type: EventType,
    pub correlation_id: Option<Uuid>,
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(event_type: EventType, payload: Vec<u8>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            event_type,
            correlation_id: None,
            payload,
        }
    }

    /// 设置关联 ID (用于 RPC 响应)
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// 创建 JSON 载荷消息
    pub fn json<T: Serialize>(event_type: EventType, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(event_type, serde_json::to_vec(payload)?))
    }

    /// 创建握手消息
    pub fn handshake(payload: &HandshakePayload) -> Result<Self, serde_json::Error> {
        Self::json(EventType::Handshake, payload)
    }

    /// 创建同步信号消息
    pub fn sync(payload: &SyncPayload) -> Result<Self, serde_json::Error> {
        Self::json(EventType::Sync, payload)
    }

    /// 创建响应消息
    pub fn response(payload: &ResponsePayload) -> Result<Self, serde_json::Error> {
        Self::json(EventType::Response, payload)
    }

    /// 解析载荷为指定类型
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}
