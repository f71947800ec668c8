use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// 按交易引用号串行化状态变更的锁表。
///
/// 并发的IPN、浏览器回跳、对账查询可能同时命中同一笔交易，
/// 所有终态迁移和退款记账都必须先拿到对应引用号的锁。
/// 最后一个guard释放时条目随之回收，锁表不随交易量增长。
#[derive(Clone, Default)]
pub struct ReferenceLocks {
    inner: LockTable,
}

/// 持有期间独占该引用号；drop时若无其他持有者或等待者则回收表项
pub struct ReferenceGuard {
    guard: Option<OwnedMutexGuard<()>>,
    table: LockTable,
    reference: String,
}

impl Drop for ReferenceGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        // 等待者在表锁内克隆Arc，计数为1说明只剩表自己持有
        if map.get(&self.reference).map(Arc::strong_count) == Some(1) {
            map.remove(&self.reference);
        }
    }
}

impl ReferenceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, reference: &str) -> ReferenceGuard {
        let lock = {
            let mut map = self
                .inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            map.entry(reference.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;
        ReferenceGuard {
            guard: Some(guard),
            table: self.inner.clone(),
            reference: reference.to_string(),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
