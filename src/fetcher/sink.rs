// src/fetcher/sink.rs

use crate::{drive::ByteStream, error::*, utils};
use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, info};
use std::{
    fs,
    io::Write as IoWrite,
    path::{Path, PathBuf},
};

/// 字节流的落地端。编排器与驱动只面向这个边界，
/// 测试可以替换为内存实现。
#[async_trait]
pub trait Sink: Send + Sync {
    /// `total` 为 0 表示内容长度未知。
    async fn write(&self, file_name: &str, total: u64, stream: ByteStream) -> AppResult<()>;
}

/// 默认实现：写入输出目录，经临时文件原子落位，已完整存在的文件跳过。
pub struct FileSink {
    output_dir: PathBuf,
}

impl FileSink {
    pub fn new(output_dir: &Path) -> AppResult<Self> {
        fs::create_dir_all(output_dir)?;
        Ok(Self {
            output_dir: dunce::canonicalize(output_dir)?,
        })
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn write(&self, file_name: &str, total: u64, mut stream: ByteStream) -> AppResult<()> {
        let safe_name = utils::sanitize_filename(file_name);
        let final_path = utils::secure_join_path(&self.output_dir, Path::new(&safe_name))?;

        if total > 0
            && let Ok(metadata) = final_path.metadata()
            && metadata.len() == total
        {
            debug!("文件 '{}' 已完整存在，跳过写入", safe_name);
            return Ok(());
        }

        let mut tmp = tempfile::NamedTempFile::new_in(&self.output_dir)?;
        let pbar = if total > 0 {
            crate::ui::new_bytes_progress_bar(total, &utils::truncate_text(&safe_name, 24))
        } else {
            crate::ui::new_spinner(&utils::truncate_text(&safe_name, 24))
        };

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;
            tmp.write_all(&chunk)?;
            pbar.inc(chunk.len() as u64);
        }
        tmp.flush()?;
        pbar.finish_and_clear();

        tmp.persist(&final_path)?;
        info!("文件已保存: {}", final_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn stream_of(chunks: Vec<&'static [u8]>) -> ByteStream {
        Box::pin(futures::stream::iter(
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c))),
        ))
    }

    #[tokio::test]
    async fn test_write_and_skip_existing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path()).unwrap();

        sink.write("某书.epub", 10, stream_of(vec![b"hello", b"world"]))
            .await
            .unwrap();
        let path = dir.path().join("某书.epub");
        assert_eq!(fs::read(&path).unwrap(), b"helloworld");

        // 同尺寸文件再次写入：跳过，内容不被截断破坏
        sink.write("某书.epub", 10, stream_of(vec![b"xxxxxxxxxx"]))
            .await
            .unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"helloworld");
    }

    #[tokio::test]
    async fn test_write_sanitizes_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path()).unwrap();
        sink.write("bad/name?.txt", 0, stream_of(vec![b"data"]))
            .await
            .unwrap();
        assert!(dir.path().join("bad name .txt").is_file());
    }
}
