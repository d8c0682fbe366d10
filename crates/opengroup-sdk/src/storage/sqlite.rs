//! SQLite 存储 - 会话与消息落库
//!
//! 功能包括：
//! - 开放群组会话（thread）的注册与查询
//! - 消息的写入、按 server_id 解析、删除
//! - 会话裁剪（仅保留最新 N 条）

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection};

use super::LocalMessageRef;
use crate::error::{OpenGroupSDKError, Result};
use crate::open_group::OpenGroup;

/// SQLite 存储组件
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// 打开（或创建）数据库文件并建表
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let storage = Self { conn };
        storage.create_tables()?;
        Ok(storage)
    }

    /// 内存数据库，测试用
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self { conn };
        storage.create_tables()?;
        Ok(storage)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS thread (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                address TEXT NOT NULL UNIQUE,
                server TEXT NOT NULL,
                room TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS message (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id INTEGER NOT NULL,
                server_id INTEGER,
                sender TEXT,
                timestamp INTEGER NOT NULL,
                body BLOB,
                is_short INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_message_thread_server
                ON message (thread_id, server_id);",
        )?;
        Ok(())
    }

    /// 注册开放群组会话，已存在时返回现有 thread ID
    pub fn register_open_group(&self, group: &OpenGroup) -> Result<i64> {
        if let Some(id) = self.thread_id_by_address(&group.address())? {
            return Ok(id);
        }
        let now = Utc::now().timestamp_millis();
        self.conn.execute(
            "INSERT INTO thread (address, server, room, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![group.address(), group.server, group.room, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// 按会话地址查 thread ID
    pub fn thread_id_by_address(&self, address: &str) -> Result<Option<i64>> {
        let sql = "SELECT id FROM thread WHERE address = ?1";
        match self.conn.query_row(sql, params![address], |row| row.get(0)) {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(OpenGroupSDKError::Database(format!("查询会话失败: {}", e))),
        }
    }

    /// 本服务器上已注册的全部房间名
    pub fn rooms_for_server(&self, server: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT room FROM thread WHERE server = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![server], |row| row.get::<_, String>(0))?;

        let mut rooms = Vec::new();
        for row in rows {
            rooms.push(row.map_err(|e| {
                OpenGroupSDKError::Database(format!("查询房间列表失败: {}", e))
            })?);
        }
        Ok(rooms)
    }

    /// 写入一条消息，返回行 ID
    pub fn insert_message(
        &self,
        thread_id: i64,
        server_id: Option<u64>,
        sender: Option<&str>,
        timestamp: i64,
        body: &[u8],
        is_short: bool,
    ) -> Result<i64> {
        let now = Utc::now().timestamp_millis();
        self.conn.execute(
            "INSERT INTO message (thread_id, server_id, sender, timestamp, body, is_short, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                thread_id,
                server_id.map(|id| id as i64),
                sender,
                timestamp,
                body,
                is_short,
                now
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// 按 (server_id, thread_id) 解析本地消息，未入库的返回 None
    pub fn resolve_by_server_id(
        &self,
        server_id: u64,
        thread_id: i64,
    ) -> Result<Option<LocalMessageRef>> {
        let sql = "SELECT id, is_short FROM message WHERE server_id = ?1 AND thread_id = ?2";
        match self
            .conn
            .query_row(sql, params![server_id as i64, thread_id], |row| {
                Ok(LocalMessageRef {
                    message_id: row.get(0)?,
                    is_short: row.get(1)?,
                })
            }) {
            Ok(message) => Ok(Some(message)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(OpenGroupSDKError::Database(format!("解析消息失败: {}", e))),
        }
    }

    /// 删除一条消息
    pub fn delete_message(&self, message_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM message WHERE id = ?1", params![message_id])?;
        Ok(())
    }

    /// 裁剪会话，仅保留时间上最新的 retain 条，返回删除数量
    pub fn trim_thread(&self, thread_id: i64, retain: usize) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM message WHERE thread_id = ?1 AND id NOT IN (
                SELECT id FROM message WHERE thread_id = ?1
                ORDER BY timestamp DESC, id DESC LIMIT ?2
            )",
            params![thread_id, retain as i64],
        )?;
        Ok(deleted)
    }

    /// 会话内消息数
    pub fn message_count(&self, thread_id: i64) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM message WHERE thread_id = ?1",
            params![thread_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_group() -> OpenGroup {
        OpenGroup::new("https://open.example.org", "rust")
    }

    #[test]
    fn register_is_idempotent() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let group = open_group();

        let first = storage.register_open_group(&group).unwrap();
        let second = storage.register_open_group(&group).unwrap();
        assert_eq!(first, second);

        assert_eq!(
            storage.thread_id_by_address(&group.address()).unwrap(),
            Some(first)
        );
        assert_eq!(
            storage.rooms_for_server("https://open.example.org").unwrap(),
            vec!["rust".to_string()]
        );
    }

    #[test]
    fn resolve_and_delete_by_server_id() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let thread_id = storage.register_open_group(&open_group()).unwrap();

        let row_id = storage
            .insert_message(thread_id, Some(7), Some("05abc"), 1000, b"hi", false)
            .unwrap();

        let resolved = storage.resolve_by_server_id(7, thread_id).unwrap().unwrap();
        assert_eq!(resolved.message_id, row_id);
        assert!(!resolved.is_short);

        // 未入库的 server_id 解析为 None
        assert!(storage.resolve_by_server_id(99, thread_id).unwrap().is_none());

        storage.delete_message(row_id).unwrap();
        assert!(storage.resolve_by_server_id(7, thread_id).unwrap().is_none());
    }

    #[test]
    fn trim_keeps_latest_messages() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let thread_id = storage.register_open_group(&open_group()).unwrap();

        for i in 0..10i64 {
            storage
                .insert_message(thread_id, Some(i as u64 + 1), None, i * 100, b"m", false)
                .unwrap();
        }

        let deleted = storage.trim_thread(thread_id, 4).unwrap();
        assert_eq!(deleted, 6);
        assert_eq!(storage.message_count(thread_id).unwrap(), 4);

        // 留下的应是时间戳最大的几条
        assert!(storage.resolve_by_server_id(10, thread_id).unwrap().is_some());
        assert!(storage.resolve_by_server_id(1, thread_id).unwrap().is_none());
    }
}
