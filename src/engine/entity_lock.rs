// ==========================================
// 车间执行追踪系统 - 实体锁
// ==========================================
// 职责: 串行化同一流转卡/同一订单上的 "解析-校验-变更" 序列
// 规则: 一次请求需要的所有键一次性获取 (全有或全无), 键按字典序排列
// 说明: 不同订单的不同流转卡互不阻塞
// ==========================================

use crate::engine::error::{EngineError, EngineResult};
use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};

/// 流转卡锁键
pub fn sheet_key(sheet_id: &str) -> String {
    format!("sheet:{}", sheet_id)
}

/// 订单锁键
pub fn order_key(order_id: &str) -> String {
    format!("order:{}", order_id)
}

// ==========================================
// EntityLockRegistry - 进程内实体锁注册表
// ==========================================
#[derive(Debug, Default)]
pub struct EntityLockRegistry {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl EntityLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取一组实体锁, 阻塞直到全部可用
    ///
    /// # 参数
    /// - `keys`: 锁键 (重复键会被合并)
    ///
    /// # 返回
    /// 守卫对象, 析构时释放全部键
    pub fn acquire(self: &Arc<Self>, keys: &[String]) -> EngineResult<EntityLockGuard> {
        let mut keys: Vec<String> = keys.to_vec();
        keys.sort();
        keys.dedup();

        let mut held = self
            .held
            .lock()
            .map_err(|e| EngineError::LockPoisoned(e.to_string()))?;

        while keys.iter().any(|k| held.contains(k)) {
            held = self
                .released
                .wait(held)
                .map_err(|e| EngineError::LockPoisoned(e.to_string()))?;
        }

        for key in &keys {
            held.insert(key.clone());
        }
        tracing::trace!(keys = ?keys, "实体锁已获取");

        Ok(EntityLockGuard {
            registry: Arc::clone(self),
            keys,
        })
    }

    /// 当前持有的锁数量
    pub fn held_count(&self) -> usize {
        match self.held.lock() {
            Ok(held) => held.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

// ==========================================
// EntityLockGuard - 实体锁守卫
// ==========================================
pub struct EntityLockGuard {
    registry: Arc<EntityLockRegistry>,
    keys: Vec<String>,
}

impl EntityLockGuard {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl Drop for EntityLockGuard {
    fn drop(&mut self) {
        let mut held = match self.registry.held.lock() {
            Ok(held) => held,
            Err(poisoned) => poisoned.into_inner(),
        };
        for key in &self.keys {
            held.remove(key);
        }
        drop(held);
        self.registry.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_keys_are_sorted_and_released_on_drop() {
        let registry = Arc::new(EntityLockRegistry::new());
        {
            let guard = registry
                .acquire(&[order_key("B"), sheet_key("A"), order_key("B")])
                .unwrap();
            assert_eq!(guard.keys(), &["order:B".to_string(), "sheet:A".to_string()]);
            assert_eq!(registry.held_count(), 2);
        }
        assert_eq!(registry.held_count(), 0);
    }

    #[test]
    fn test_same_key_is_mutually_exclusive() {
        let registry = Arc::new(EntityLockRegistry::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    let _guard = registry.acquire(&[sheet_key("S1")]).unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disjoint_keys_do_not_block() {
        let registry = Arc::new(EntityLockRegistry::new());
        let _a = registry.acquire(&[sheet_key("S1"), order_key("O1")]).unwrap();
        let b = registry.acquire(&[sheet_key("S2"), order_key("O2")]);
        assert!(b.is_ok());
    }
}
