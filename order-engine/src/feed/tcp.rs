// order-engine/src/feed/tcp.rs
// 消息总线变更订阅 - TCP 连接、握手、指数退避重连

use crate::config::{EngineConfig, FeedConfig};
use crate::error::{EngineError, EngineResult};
use crate::store::{ChangeFeed, FeedSignal, FeedSink, Subscription};
use async_trait::async_trait;
use shared::message::codec::{self, FrameHeader, HEADER_LEN};
use shared::message::{
    BusMessage, EventType, HandshakePayload, PROTOCOL_VERSION, ResponsePayload, SyncPayload,
};
use shared::order::ChangeEvent;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// Change feed backed by the message bus
///
/// Every `Sync` frame for resource `order` becomes a [`ChangeEvent`].
#[derive(Debug, Clone)]
pub struct TcpChangeFeed {
    addr: String,
    config: FeedConfig,
}

/// Why a session ended
enum SessionEnd {
    /// Transport lost; `connected` tells whether the handshake had completed
    Lost { connected: bool, reason: String },
    /// The listener dropped its receiver
    ListenerClosed,
}

impl TcpChangeFeed {
    pub fn new(addr: impl Into<String>, config: FeedConfig) -> Self {
        Self {
            addr: addr.into(),
            config,
        }
    }

    /// Build from `feed_addr` / `feed`
    pub fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        let addr = config
            .feed_addr
            .clone()
            .ok_or_else(|| EngineError::config("Message bus address not configured"))?;
        Ok(Self::new(addr, config.feed.clone()))
    }
}

#[async_trait]
impl ChangeFeed for TcpChangeFeed {
    async fn subscribe_to_changes(
        &self,
        tenant_id: &str,
        sink: FeedSink,
    ) -> EngineResult<Subscription> {
        let token = CancellationToken::new();
        let id = format!("tcp-{}-{}", self.addr, uuid::Uuid::new_v4());

        tokio::spawn(run_feed(
            self.addr.clone(),
            self.config.clone(),
            tenant_id.to_string(),
            sink,
            token.clone(),
        ));

        Ok(Subscription::new(id, move || token.cancel()))
    }
}

/// 连接循环: 断开后按退避策略重连，直到取消或超过重试次数
async fn run_feed(
    addr: String,
    config: FeedConfig,
    tenant_id: String,
    sink: FeedSink,
    token: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        if sink.send(FeedSignal::Connecting).is_err() {
            return;
        }

        let end = tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!(addr = %addr, "Feed subscription cancelled");
                return;
            }
            end = run_session(&addr, &config, &tenant_id, &sink) => end,
        };

        let (connected, reason) = match end {
            SessionEnd::ListenerClosed => return,
            SessionEnd::Lost { connected, reason } => (connected, reason),
        };

        tracing::warn!(addr = %addr, reason = %reason, "Change feed disconnected");
        if sink.send(FeedSignal::Disconnected(reason)).is_err() {
            return;
        }

        // 成功握手过则重置退避
        attempt = if connected { 1 } else { attempt + 1 };
        if !config.may_retry(attempt) {
            tracing::error!(addr = %addr, attempts = attempt, "Change feed gave up reconnecting");
            return;
        }

        let delay = config.backoff(attempt);
        tracing::info!(addr = %addr, attempt, delay_ms = delay.as_millis() as u64, "Reconnecting change feed");
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn run_session(
    addr: &str,
    config: &FeedConfig,
    tenant_id: &str,
    sink: &FeedSink,
) -> SessionEnd {
    let lost = |connected: bool, reason: String| SessionEnd::Lost { connected, reason };

    let stream = match tokio::time::timeout(config.handshake_timeout, TcpStream::connect(addr)).await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return lost(false, format!("connect failed: {}", e)),
        Err(_) => return lost(false, "connect timed out".to_string()),
    };
    let (mut reader, mut writer) = stream.into_split();

    // 🤝 握手
    let handshake = HandshakePayload {
        version: PROTOCOL_VERSION,
        client_name: Some(config.client_name.clone()),
        client_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        client_id: None,
        tenant_id: Some(tenant_id.to_string()),
    };
    let request = match BusMessage::handshake(&handshake) {
        Ok(msg) => msg,
        Err(e) => return lost(false, format!("handshake encode failed: {}", e)),
    };
    if let Err(e) = write_frame(&mut writer, &request).await {
        return lost(false, e.to_string());
    }

    let ack = tokio::time::timeout(config.handshake_timeout, async {
        loop {
            let msg = read_frame(&mut reader).await?;
            if msg.event_type == EventType::Response && msg.correlation_id == Some(request.request_id)
            {
                return Ok::<_, EngineError>(msg);
            }
        }
    })
    .await;

    let ack = match ack {
        Ok(Ok(msg)) => msg,
        Ok(Err(e)) => return lost(false, e.to_string()),
        Err(_) => return lost(false, "handshake timed out".to_string()),
    };
    match ack.parse_payload::<ResponsePayload>() {
        Ok(response) if response.success => {}
        Ok(response) => return lost(false, format!("handshake rejected: {}", response.message)),
        Err(e) => return lost(false, format!("invalid handshake response: {}", e)),
    }

    tracing::info!(addr = %addr, tenant_id = %tenant_id, "Change feed connected");
    if sink.send(FeedSignal::Connected).is_err() {
        return SessionEnd::ListenerClosed;
    }

    loop {
        let msg = match read_frame(&mut reader).await {
            Ok(msg) => msg,
            Err(e) => return lost(true, e.to_string()),
        };

        if msg.event_type != EventType::Sync {
            tracing::trace!(event_type = %msg.event_type, "Ignoring non-sync frame");
            continue;
        }

        let payload: SyncPayload = match msg.parse_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable sync payload");
                continue;
            }
        };

        if let Some(event) = ChangeEvent::from_sync(&payload, tenant_id)
            && sink.send(FeedSignal::Event(event)).is_err()
        {
            return SessionEnd::ListenerClosed;
        }
    }
}

/// 读取一帧
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> EngineResult<BusMessage> {
    let mut header = [0u8; HEADER_LEN];
    reader
        .read_exact(&mut header)
        .await
        .map_err(|e| EngineError::feed(format!("read failed: {}", e)))?;

    let header =
        FrameHeader::decode(&header).map_err(|e| EngineError::feed(format!("bad frame: {}", e)))?;

    let mut payload = vec![0u8; header.payload_len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| EngineError::feed(format!("read failed: {}", e)))?;

    Ok(header.into_message(payload))
}

/// 写入一帧
async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, msg: &BusMessage) -> EngineResult<()> {
    let data = codec::encode(msg).map_err(|e| EngineError::feed(e.to_string()))?;
    writer
        .write_all(&data)
        .await
        .map_err(|e| EngineError::feed(format!("write failed: {}", e)))
}
