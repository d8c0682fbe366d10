//! KV 存储模块 - 基于 sled 的键值存储
//!
//! 值统一用 JSON 编码，供游标等小状态使用。
//! SDK 内一个实例对应一棵命名 Tree，互不干扰。

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sled::{Db, Tree};

use crate::error::{OpenGroupSDKError, Result};

/// KV 存储组件
#[derive(Debug, Clone)]
pub struct KvStore {
    db: Arc<Db>,
    tree: Tree,
}

impl KvStore {
    /// 打开 base_path/kv 下的 sled 数据库并定位到命名 Tree
    pub fn open(base_path: &Path, tree_name: &str) -> Result<Self> {
        let kv_path = base_path.join("kv");
        std::fs::create_dir_all(&kv_path)
            .map_err(|e| OpenGroupSDKError::IO(format!("创建 KV 存储目录失败: {}", e)))?;

        let db = sled::open(&kv_path)
            .map_err(|e| OpenGroupSDKError::KvStore(format!("打开 sled 数据库失败: {}", e)))?;
        let tree = db
            .open_tree(tree_name)
            .map_err(|e| OpenGroupSDKError::KvStore(format!("打开 Tree 失败: {}", e)))?;

        Ok(Self {
            db: Arc::new(db),
            tree,
        })
    }

    /// 设置键值对
    pub fn set<K, V>(&self, key: K, value: &V) -> Result<()>
    where
        K: AsRef<[u8]>,
        V: Serialize,
    {
        let value_bytes = serde_json::to_vec(value)
            .map_err(|e| OpenGroupSDKError::Serialization(format!("序列化值失败: {}", e)))?;
        self.tree
            .insert(key, value_bytes)
            .map_err(|e| OpenGroupSDKError::KvStore(format!("设置键值对失败: {}", e)))?;
        Ok(())
    }

    /// 获取键值对
    pub fn get<K, V>(&self, key: K) -> Result<Option<V>>
    where
        K: AsRef<[u8]>,
        V: for<'de> Deserialize<'de>,
    {
        let result = self
            .tree
            .get(key)
            .map_err(|e| OpenGroupSDKError::KvStore(format!("获取键值对失败: {}", e)))?;

        match result {
            Some(value_bytes) => {
                let value = serde_json::from_slice(&value_bytes)
                    .map_err(|e| OpenGroupSDKError::Serialization(format!("反序列化值失败: {}", e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// 删除键值对
    pub fn remove<K>(&self, key: K) -> Result<()>
    where
        K: AsRef<[u8]>,
    {
        self.tree
            .remove(key)
            .map_err(|e| OpenGroupSDKError::KvStore(format!("删除键值对失败: {}", e)))?;
        Ok(())
    }

    /// 获取指定前缀的所有键
    pub fn scan_prefix_keys(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut keys = Vec::new();
        for result in self.tree.scan_prefix(prefix) {
            let (key, _) = result
                .map_err(|e| OpenGroupSDKError::KvStore(format!("扫描前缀失败: {}", e)))?;
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    /// 落盘
    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| OpenGroupSDKError::KvStore(format!("flush 失败: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn set_get_remove_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let kv = KvStore::open(temp_dir.path(), "test").unwrap();

        assert_eq!(kv.get::<_, u64>("cursor").unwrap(), None);

        kv.set("cursor", &42u64).unwrap();
        assert_eq!(kv.get::<_, u64>("cursor").unwrap(), Some(42));

        kv.remove("cursor").unwrap();
        assert_eq!(kv.get::<_, u64>("cursor").unwrap(), None);
    }

    #[test]
    fn scan_prefix_lists_matching_keys() {
        let temp_dir = TempDir::new().unwrap();
        let kv = KvStore::open(temp_dir.path(), "test").unwrap();

        kv.set("a:1", &1u64).unwrap();
        kv.set("a:2", &2u64).unwrap();
        kv.set("b:1", &3u64).unwrap();

        let keys = kv.scan_prefix_keys(b"a:").unwrap();
        assert_eq!(keys.len(), 2);
    }
}
