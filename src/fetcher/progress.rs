// src/fetcher/progress.rs

use crate::error::*;
use log::{debug, info, warn};
use std::fs;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// 定长位向量，按字节紧凑存放。序列化格式为 8 字节小端位长前缀 + 数据字节。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BitVec {
    len: u64,
    bytes: Vec<u8>,
}

impl BitVec {
    pub(crate) fn with_len(len: u64) -> Self {
        Self {
            len,
            bytes: vec![0u8; len.div_ceil(8) as usize],
        }
    }

    pub(crate) fn len(&self) -> u64 {
        self.len
    }

    pub(crate) fn get(&self, index: u64) -> bool {
        debug_assert!(index < self.len);
        self.bytes[(index / 8) as usize] & (1 << (index % 8)) != 0
    }

    pub(crate) fn set(&mut self, index: u64) {
        debug_assert!(index < self.len);
        self.bytes[(index / 8) as usize] |= 1 << (index % 8);
    }

    pub(crate) fn count_ones(&self) -> u64 {
        self.bytes.iter().map(|b| b.count_ones() as u64).sum()
    }

    /// 自低位起的第一个未置位下标。
    pub(crate) fn first_zero(&self) -> Option<u64> {
        for (i, byte) in self.bytes.iter().enumerate() {
            if *byte != 0xff {
                let bit = byte.trailing_ones() as u64;
                let index = i as u64 * 8 + bit;
                if index < self.len {
                    return Some(index);
                }
            }
        }
        None
    }

    /// 只增不减；目标长度小于当前长度时不变。
    pub(crate) fn grow(&mut self, new_len: u64) {
        if new_len <= self.len {
            return;
        }
        self.len = new_len;
        self.bytes.resize(new_len.div_ceil(8) as usize, 0);
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.bytes.len());
        out.extend_from_slice(&self.len.to_le_bytes());
        out.extend_from_slice(&self.bytes);
        out
    }

    pub(crate) fn from_bytes(data: &[u8]) -> AppResult<Self> {
        if data.len() < 8 {
            return Err(AppError::Storage("进度文件过短，缺少长度前缀".to_string()));
        }
        let len = u64::from_le_bytes(data[..8].try_into().unwrap());
        let expected = len.div_ceil(8) as usize;
        let bytes = &data[8..];
        if bytes.len() != expected {
            return Err(AppError::Storage(format!(
                "进度文件损坏: 位长 {} 需要 {} 字节，实际 {} 字节",
                len,
                expected,
                bytes.len()
            )));
        }
        Ok(Self {
            len,
            bytes: bytes.to_vec(),
        })
    }
}

struct Ledger {
    /// 已完成位图，落盘。
    record: BitVec,
    /// 当前进程的认领位图，仅驻留内存；重启后未完成的认领会被重新分配。
    claims: BitVec,
}

/// 持久化的工作认领台账。`acquire_next` 与 `mark_completed` 是仅有的两个
/// 变更入口，都在同一把锁下的短临界区内完成。
pub struct ProgressStore {
    path: PathBuf,
    inner: Mutex<Ledger>,
}

impl ProgressStore {
    /// 打开（或创建）台账。新建时序号 `< start_index` 的条目直接记为已完成；
    /// 已有文件则只在内存认领位图上屏蔽这些序号，不伪造落盘的完成记录。
    pub fn open(
        start_index: u32,
        catalog_size: u32,
        path: impl Into<PathBuf>,
    ) -> AppResult<Self> {
        let path = path.into();
        if start_index == 0 {
            return Err(AppError::Config("起始序号必须从 1 开始".to_string()));
        }

        let (record, claims) = if path.is_file() {
            let data = fs::read(&path).map_err(|e| {
                AppError::Storage(format!("读取进度文件 '{}' 失败: {}", path.display(), e))
            })?;
            let mut record = BitVec::from_bytes(&data)?;
            if (catalog_size as u64) < record.len() {
                warn!(
                    "目录大小 {} 小于已有台账长度 {}，沿用较大的台账长度。",
                    catalog_size,
                    record.len()
                );
            }
            record.grow(catalog_size as u64);
            info!(
                "加载进度台账: {} 条，其中 {} 条已完成",
                record.len(),
                record.count_ones()
            );

            let mut claims = record.clone();
            for index in 0..u64::from(start_index - 1).min(claims.len()) {
                claims.set(index);
            }
            (record, claims)
        } else {
            let mut record = BitVec::with_len(catalog_size as u64);
            for index in 0..u64::from(start_index - 1).min(record.len()) {
                record.set(index);
            }
            Self::persist(&record, &path)?;
            info!("创建进度台账: {} 条，起始序号 {}", catalog_size, start_index);
            let claims = record.clone();
            (record, claims)
        };

        Ok(Self {
            path,
            inner: Mutex::new(Ledger { record, claims }),
        })
    }

    /// 认领下一个未处理序号（1-based）。同一序号在进程生命周期内至多被
    /// 认领一次；没有剩余工作时返回 None。
    pub fn acquire_next(&self) -> Option<u32> {
        let mut guard = self.inner.lock().unwrap();
        let index = guard.claims.first_zero()?;
        guard.claims.set(index);
        debug!("认领序号 {}", index + 1);
        Some((index + 1) as u32)
    }

    /// 标记一个序号完成并同步落盘。落盘失败对调用方是致命错误，
    /// 静默丢失完成状态会破坏至多一次完成的保证。
    pub fn mark_completed(&self, index: u32) -> AppResult<()> {
        let mut guard = self.inner.lock().unwrap();
        if index == 0 || u64::from(index) > guard.record.len() {
            return Err(AppError::OutOfRange(index));
        }
        let bit = u64::from(index - 1);
        guard.claims.set(bit);
        guard.record.set(bit);
        Self::persist(&guard.record, &self.path)
    }

    pub fn is_finished(&self) -> bool {
        let guard = self.inner.lock().unwrap();
        guard.record.count_ones() == guard.record.len()
    }

    pub fn size(&self) -> u32 {
        self.inner.lock().unwrap().record.len() as u32
    }

    pub fn completed(&self) -> u32 {
        self.inner.lock().unwrap().record.count_ones() as u32
    }

    /// 全量重写：写临时文件后原子替换，保证落盘内容始终自洽。
    fn persist(record: &BitVec, path: &Path) -> AppResult<()> {
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut tmp = match dir {
            Some(dir) => tempfile::NamedTempFile::new_in(dir),
            None => tempfile::NamedTempFile::new(),
        }
        .map_err(|e| AppError::Storage(format!("创建临时进度文件失败: {}", e)))?;
        tmp.write_all(&record.to_bytes())
            .map_err(|e| AppError::Storage(format!("写入进度文件失败: {}", e)))?;
        tmp.flush()
            .map_err(|e| AppError::Storage(format!("刷新进度文件失败: {}", e)))?;
        tmp.persist(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("test.progress")
    }

    #[test]
    fn test_bitvec_basics() {
        let mut bits = BitVec::with_len(10);
        assert_eq!(bits.count_ones(), 0);
        assert_eq!(bits.first_zero(), Some(0));

        bits.set(0);
        bits.set(2);
        assert!(bits.get(0));
        assert!(!bits.get(1));
        assert_eq!(bits.first_zero(), Some(1));
        assert_eq!(bits.count_ones(), 2);

        // 全部置位后无空闲位（包括末字节的填充位不可见）
        for i in 0..10 {
            bits.set(i);
        }
        assert_eq!(bits.first_zero(), None);
        assert_eq!(bits.count_ones(), 10);
    }

    #[test]
    fn test_bitvec_serialization_round_trip() {
        let mut bits = BitVec::with_len(13);
        bits.set(0);
        bits.set(7);
        bits.set(12);
        let restored = BitVec::from_bytes(&bits.to_bytes()).unwrap();
        assert_eq!(bits, restored);

        // 损坏数据
        assert!(BitVec::from_bytes(&[1, 2, 3]).is_err());
        let mut bad = bits.to_bytes();
        bad.pop();
        assert!(BitVec::from_bytes(&bad).is_err());
    }

    #[test]
    fn test_acquire_in_order_and_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::open(1, 3, temp_store_path(&dir)).unwrap();
        assert_eq!(store.acquire_next(), Some(1));
        assert_eq!(store.acquire_next(), Some(2));
        assert_eq!(store.acquire_next(), Some(3));
        assert_eq!(store.acquire_next(), None);
    }

    #[test]
    fn test_start_index_skipping() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::open(3, 5, temp_store_path(&dir)).unwrap();
        // [1, 3) 不可认领
        assert_eq!(store.acquire_next(), Some(3));
        assert_eq!(store.acquire_next(), Some(4));
        assert_eq!(store.acquire_next(), Some(5));
        assert_eq!(store.acquire_next(), None);
    }

    #[test]
    fn test_resume_never_returns_completed() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_store_path(&dir);
        {
            let store = ProgressStore::open(1, 4, &path).unwrap();
            assert_eq!(store.acquire_next(), Some(1));
            store.mark_completed(1).unwrap();
            assert_eq!(store.acquire_next(), Some(2));
            // 序号 2 已认领但未完成：重启后应被重新分配
        }
        let store = ProgressStore::open(1, 4, &path).unwrap();
        let mut seen = Vec::new();
        while let Some(id) = store.acquire_next() {
            seen.push(id);
        }
        assert_eq!(seen, vec![2, 3, 4]);
    }

    #[test]
    fn test_monotonic_growth() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_store_path(&dir);
        {
            let store = ProgressStore::open(1, 3, &path).unwrap();
            store.mark_completed(1).unwrap();
            store.mark_completed(3).unwrap();
        }
        let store = ProgressStore::open(1, 5, &path).unwrap();
        assert_eq!(store.size(), 5);
        let mut seen = Vec::new();
        while let Some(id) = store.acquire_next() {
            seen.push(id);
        }
        // 先前的完成保留，(3, 5] 变为可用
        assert_eq!(seen, vec![2, 4, 5]);
    }

    #[test]
    fn test_shrinking_catalog_keeps_ledger_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_store_path(&dir);
        {
            ProgressStore::open(1, 8, &path).unwrap();
        }
        let store = ProgressStore::open(1, 4, &path).unwrap();
        assert_eq!(store.size(), 8);
    }

    #[test]
    fn test_finished_detection() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::open(1, 2, temp_store_path(&dir)).unwrap();
        assert!(!store.is_finished());
        store.mark_completed(1).unwrap();
        assert!(!store.is_finished());
        store.mark_completed(2).unwrap();
        assert!(store.is_finished());
    }

    #[test]
    fn test_mark_completed_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::open(1, 2, temp_store_path(&dir)).unwrap();
        assert!(matches!(
            store.mark_completed(0),
            Err(AppError::OutOfRange(0))
        ));
        assert!(matches!(
            store.mark_completed(3),
            Err(AppError::OutOfRange(3))
        ));
    }

    #[test]
    fn test_start_index_on_existing_ledger_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_store_path(&dir);
        {
            ProgressStore::open(1, 4, &path).unwrap();
        }
        {
            // 本次运行屏蔽 [1, 3)，但不落盘
            let store = ProgressStore::open(3, 4, &path).unwrap();
            assert_eq!(store.acquire_next(), Some(3));
        }
        let store = ProgressStore::open(1, 4, &path).unwrap();
        assert_eq!(store.acquire_next(), Some(1));
    }
}
