//! 변경 피드: 커밋된 변경을 구독자에게 브로드캐스트합니다.
//!
//! 순서는 발행자 단위로만 보장되고 중복 제거는 하지 않습니다.
//! 느린 구독자는 `RecvError::Lagged`를 받고 계속 진행합니다.

use std::sync::Arc;

use ecuscan_core::event::{ChangeEvent, ChangeKind, ChangeTable};
use ecuscan_core::metrics as m;
use tokio::sync::broadcast;
use tracing::trace;

/// 기본 채널 용량
pub const DEFAULT_CAPACITY: usize = 1024;

/// `tokio::sync::broadcast` 기반 변경 피드
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<Arc<ChangeEvent>>,
}

impl ChangeFeed {
    /// 주어진 용량으로 피드를 생성합니다. 0은 1로 보정합니다.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// 새 구독자를 등록합니다. 등록 이후 발행된 이벤트만 받습니다.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ChangeEvent>> {
        self.tx.subscribe()
    }

    /// 현재 구독자 수
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// 이벤트를 발행합니다. 구독자가 없어도 에러가 아닙니다.
    pub fn publish(&self, event: ChangeEvent) {
        metrics::counter!(m::STORE_CHANGE_EVENTS_TOTAL, m::LABEL_TABLE => event.table.as_str())
            .increment(1);
        trace!(table = event.table.as_str(), kind = ?event.kind, scan_id = %event.scan_id, "change published");
        // 구독자가 없으면 SendError, 무시
        let _ = self.tx.send(Arc::new(event));
    }

    /// 테이블/종류/ID로 이벤트를 만들어 발행합니다.
    pub fn emit(&self, table: ChangeTable, kind: ChangeKind, scan_id: &str, record_id: &str) {
        self.publish(ChangeEvent::new(table, kind, scan_id, record_id));
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
