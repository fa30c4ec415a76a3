//! Sled-based Durable Message Queue Implementation
//!
//! 三棵树：
//! - `{name}:ready`    等待投递
//! - `{name}:inflight` 已投递未确认
//! - `{name}:dead`     死信
//!
//! key 是 `Db::generate_id()` 的大端字节，sled 有序遍历即 FIFO。
//! 领取消息用 (ready, inflight) 多树事务，保证并发接收方不会拿到同一条消息。
//! 打开队列时 inflight 中的残留消息（上个进程崩溃留下的）全部退回 ready。

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, IVec, Tree};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::application::ports::{
    Delivery, MessageQueuePort, QueueError, QueueMessage, QueueStats,
};

/// Sled 队列配置
#[derive(Debug, Clone)]
pub struct SledQueueConfig {
    /// 数据库路径
    pub db_path: String,
    /// 队列名称（决定使用的树）
    pub name: String,
    /// 临时库（关闭即删除，测试用）
    pub temporary: bool,
}

impl Default for SledQueueConfig {
    fn default() -> Self {
        Self {
            db_path: "data/queue.sled".to_string(),
            name: "task_queue".to_string(),
            temporary: false,
        }
    }
}

impl SledQueueConfig {
    pub fn temporary(name: impl Into<String>) -> Self {
        Self {
            db_path: String::new(),
            name: name.into(),
            temporary: true,
        }
    }
}

/// 存储在树中的消息信封
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    /// JSON 消息体
    body: Vec<u8>,
    delivery_count: u32,
    enqueued_at: i64,
    dead_reason: Option<String>,
}

fn encode(envelope: &Envelope) -> Result<Vec<u8>, QueueError> {
    bincode::serialize(envelope).map_err(|e| QueueError::SerializationError(e.to_string()))
}

fn decode(raw: &[u8]) -> Result<Envelope, QueueError> {
    bincode::deserialize(raw).map_err(|e| QueueError::SerializationError(e.to_string()))
}

/// 信封本身无法解码时，把原始字节包进新信封，送入死信
fn quarantine(raw: &[u8], error: &QueueError) -> Envelope {
    Envelope {
        body: raw.to_vec(),
        delivery_count: 0,
        enqueued_at: Utc::now().timestamp_millis(),
        dead_reason: Some(format!("undecodable envelope: {}", error)),
    }
}

/// 一次领取尝试的结果
enum Claim {
    Taken(Envelope),
    /// 已被其他接收方领取
    Gone,
    /// 信封损坏，已移入死信
    Quarantined(String),
}

fn tag_of(key: &[u8]) -> Result<u64, QueueError> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| QueueError::SerializationError(format!("bad queue key length {}", key.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

fn db_error(e: sled::Error) -> QueueError {
    QueueError::DatabaseError(e.to_string())
}

fn tx_error(e: TransactionError<QueueError>) -> QueueError {
    match e {
        TransactionError::Abort(inner) => inner,
        TransactionError::Storage(e) => db_error(e),
    }
}

/// Sled 持久化消息队列
///
/// 整个进程共享一个实例（一个 sled 句柄），不按请求创建连接
pub struct SledMessageQueue {
    db: Db,
    name: String,
    ready: Tree,
    inflight: Tree,
    dead: Tree,
    /// 新消息到达时唤醒等待中的接收方
    notify: Notify,
}

impl SledMessageQueue {
    /// 打开队列，并把上次遗留的 in-flight 消息退回就绪队列
    pub fn open(config: &SledQueueConfig) -> Result<Self, QueueError> {
        let db = if config.temporary {
            sled::Config::new().temporary(true).open()
        } else {
            sled::open(&config.db_path)
        }
        .map_err(db_error)?;

        let queue = Self {
            ready: db.open_tree(format!("{}:ready", config.name)).map_err(db_error)?,
            inflight: db.open_tree(format!("{}:inflight", config.name)).map_err(db_error)?,
            dead: db.open_tree(format!("{}:dead", config.name)).map_err(db_error)?,
            name: config.name.clone(),
            db,
            notify: Notify::new(),
        };

        let recovered = queue.recover()?;

        tracing::info!(
            db_path = %config.db_path,
            queue = %queue.name,
            ready = queue.ready.len(),
            recovered = recovered,
            dead_lettered = queue.dead.len(),
            "SledMessageQueue initialized"
        );

        Ok(queue)
    }

    /// 打开指定路径的队列
    pub fn open_path<P: AsRef<Path>>(path: P, name: &str) -> Result<Self, QueueError> {
        let config = SledQueueConfig {
            db_path: path.as_ref().to_string_lossy().to_string(),
            name: name.to_string(),
            temporary: false,
        };
        Self::open(&config)
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 把所有 in-flight 消息退回 ready，返回数量
    pub fn recover(&self) -> Result<usize, QueueError> {
        let mut recovered = 0;
        for item in self.inflight.iter() {
            let (key, _) = item.map_err(db_error)?;
            if self.move_entry(&self.inflight, &self.ready, &key, None)? {
                recovered += 1;
            }
        }
        if recovered > 0 {
            tracing::warn!(
                queue = %self.name,
                count = recovered,
                "Requeued unacknowledged messages from previous run"
            );
        }
        Ok(recovered)
    }

    /// 刷新数据库
    pub async fn flush(&self) -> Result<(), QueueError> {
        self.db.flush_async().await.map_err(db_error)?;
        Ok(())
    }

    /// 在两棵树之间原子移动一条消息，可选写入死信原因
    fn move_entry(
        &self,
        from: &Tree,
        to: &Tree,
        key: &[u8],
        dead_reason: Option<&str>,
    ) -> Result<bool, QueueError> {
        let key = IVec::from(key);
        (from, to)
            .transaction(|(from, to)| {
                let Some(raw) = from.remove(key.clone())? else {
                    return Ok(false);
                };
                let mut envelope = match decode(&raw) {
                    Ok(envelope) => envelope,
                    Err(e) => quarantine(&raw, &e),
                };
                if let Some(reason) = dead_reason {
                    envelope.dead_reason = Some(reason.to_string());
                }
                let bytes = encode(&envelope).map_err(ConflictableTransactionError::Abort)?;
                to.insert(key.clone(), bytes)?;
                Ok(true)
            })
            .map_err(tx_error)
    }

    /// 尝试领取最早的一条就绪消息
    fn try_claim(&self) -> Result<Option<Delivery>, QueueError> {
        for item in self.ready.iter() {
            let (key, _) = item.map_err(db_error)?;

            let claim = (&self.ready, &self.inflight, &self.dead)
                .transaction(|(ready, inflight, dead)| {
                    let Some(raw) = ready.remove(key.clone())? else {
                        return Ok(Claim::Gone);
                    };
                    let mut envelope = match decode(&raw) {
                        Ok(envelope) => envelope,
                        Err(e) => {
                            let quarantined = quarantine(&raw, &e);
                            let bytes = encode(&quarantined)
                                .map_err(ConflictableTransactionError::Abort)?;
                            dead.insert(key.clone(), bytes)?;
                            return Ok(Claim::Quarantined(e.to_string()));
                        }
                    };
                    envelope.delivery_count += 1;
                    let bytes = encode(&envelope).map_err(ConflictableTransactionError::Abort)?;
                    inflight.insert(key.clone(), bytes)?;
                    Ok(Claim::Taken(envelope))
                })
                .map_err(tx_error)?;

            let envelope = match claim {
                Claim::Taken(envelope) => envelope,
                // 被其他接收方抢先领取，继续看下一条
                Claim::Gone => continue,
                Claim::Quarantined(error) => {
                    tracing::error!(
                        queue = %self.name,
                        key = ?key,
                        error = %error,
                        "Undecodable envelope, dead-lettering"
                    );
                    continue;
                }
            };

            let tag = tag_of(&key)?;
            let message = match QueueMessage::from_body(&envelope.body) {
                Ok(message) => message,
                Err(e) => {
                    tracing::error!(
                        queue = %self.name,
                        delivery_tag = tag,
                        error = %e,
                        "Undecodable message body, dead-lettering"
                    );
                    self.move_entry(&self.inflight, &self.dead, &key, Some("undecodable body"))?;
                    continue;
                }
            };

            return Ok(Some(Delivery {
                tag,
                message,
                delivery_count: envelope.delivery_count,
            }));
        }
        Ok(None)
    }
}

#[async_trait]
impl MessageQueuePort for SledMessageQueue {
    async fn publish(&self, message: &QueueMessage) -> Result<(), QueueError> {
        let id = self.db.generate_id().map_err(db_error)?;
        let envelope = Envelope {
            body: message.to_body()?,
            delivery_count: 0,
            enqueued_at: Utc::now().timestamp_millis(),
            dead_reason: None,
        };

        self.ready
            .insert(id.to_be_bytes(), encode(&envelope)?)
            .map_err(db_error)?;
        self.ready.flush_async().await.map_err(db_error)?;
        self.notify.notify_waiters();

        tracing::debug!(
            queue = %self.name,
            delivery_tag = id,
            task_id = %message.task_id,
            "Message published"
        );
        Ok(())
    }

    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, QueueError> {
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            // 先注册唤醒再检查队列，避免错过检查与等待之间的 publish
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.try_claim()? {
                tracing::debug!(
                    queue = %self.name,
                    delivery_tag = delivery.tag,
                    task_id = %delivery.message.task_id,
                    delivery_count = delivery.delivery_count,
                    "Message delivered"
                );
                return Ok(Some(delivery));
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
            }
        }
    }

    async fn ack(&self, tag: u64) -> Result<(), QueueError> {
        self.inflight
            .remove(tag.to_be_bytes())
            .map_err(db_error)?
            .ok_or(QueueError::UnknownDelivery(tag))?;
        self.inflight.flush_async().await.map_err(db_error)?;

        tracing::debug!(queue = %self.name, delivery_tag = tag, "Message acknowledged");
        Ok(())
    }

    async fn nack(&self, tag: u64) -> Result<(), QueueError> {
        if !self.move_entry(&self.inflight, &self.ready, &tag.to_be_bytes(), None)? {
            return Err(QueueError::UnknownDelivery(tag));
        }
        self.db.flush_async().await.map_err(db_error)?;
        self.notify.notify_waiters();

        tracing::debug!(queue = %self.name, delivery_tag = tag, "Message requeued");
        Ok(())
    }

    async fn dead_letter(&self, tag: u64, reason: &str) -> Result<(), QueueError> {
        if !self.move_entry(&self.inflight, &self.dead, &tag.to_be_bytes(), Some(reason))? {
            return Err(QueueError::UnknownDelivery(tag));
        }
        self.db.flush_async().await.map_err(db_error)?;

        tracing::warn!(
            queue = %self.name,
            delivery_tag = tag,
            reason = %reason,
            "Message dead-lettered"
        );
        Ok(())
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        Ok(QueueStats {
            ready: self.ready.len(),
            in_flight: self.inflight.len(),
            dead_lettered: self.dead.len(),
        })
    }
}
