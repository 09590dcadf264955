//! Index Store - SQLite file holding one log's summary tables
//!
//! Three tables, all append-only:
//!
//! - `logInfo`: a single fingerprint row, written last when indexing completes
//! - `strata`: one packed [`LogInstant`] per committed timestep, keyed by time
//! - `wblocks`: one raw block snapshot per block dirtied in a timestep
//!
//! A store without a `logInfo` row is incomplete and is never reused.

use crate::error::{IndexError, IndexResult};
use crate::trace::{LogInstant, LogReader, LogStrata, BLOCK_SIZE, STRATUM_SIZE, TIMESTEP_SIZE};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};

/// Identity of the log and geometry an index was built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub name: String,
    /// Source modification time, milliseconds since the Unix epoch
    pub mtime: i64,
    pub timestep_size: u64,
    pub block_size: u64,
    pub stratum_size: u64,
}

impl Fingerprint {
    /// Fingerprint of `reader`'s log with the compiled-in geometry
    pub fn of(reader: &dyn LogReader) -> IndexResult<Self> {
        let modified: DateTime<Utc> = reader.modified()?.into();
        Ok(Self {
            name: reader.file_name().to_string_lossy().into_owned(),
            mtime: modified.timestamp_millis(),
            timestep_size: TIMESTEP_SIZE,
            block_size: BLOCK_SIZE,
            stratum_size: STRATUM_SIZE,
        })
    }
}

/// The `logInfo` row of a completed index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogInfo {
    pub fingerprint: Fingerprint,
    /// Clock ticks covered by the whole log
    pub duration: u64,
}

/// One `wblocks` row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSnapshot {
    /// Time of the timestep the snapshot was flushed in
    pub time: u64,
    pub block: u64,
    /// Log offset of the first write to the block in that timestep
    pub first_offset: u64,
    /// Log offset of the last write to the block in that timestep
    pub last_offset: u64,
    /// Block contents at the end of the timestep
    pub data: Vec<u8>,
}

/// Rows staged by the indexer between commits
#[derive(Debug, Default)]
pub struct TimestepBatch {
    pub instants: Vec<LogInstant>,
    pub blocks: Vec<BlockSnapshot>,
}

impl TimestepBatch {
    pub fn is_empty(&self) -> bool {
        self.instants.is_empty() && self.blocks.is_empty()
    }

    pub fn clear(&mut self) {
        self.instants.clear();
        self.blocks.clear();
    }
}

/// Row counts, for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub strata_rows: u64,
    pub wblock_rows: u64,
}

/// Location of the store for `source` inside `data_dir`
///
/// The name combines the source's file stem with a CRC32 of its full path so
/// logs with the same name in different directories do not collide.
pub fn store_path(data_dir: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "log".to_string());
    let crc = crc32fast::hash(source.to_string_lossy().as_bytes());
    data_dir.join(format!("{}-{:08x}.tdx", stem, crc))
}

/// SQLite-backed summary tables for one log
pub struct IndexStore {
    conn: Connection,
    path: PathBuf,
}

impl IndexStore {
    /// Create a fresh, empty store at `path`
    pub fn create(path: &Path) -> IndexResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = DELETE;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = 10000;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS logInfo (
                name TEXT NOT NULL,
                mtime INTEGER NOT NULL,
                timestepSize INTEGER NOT NULL,
                blockSize INTEGER NOT NULL,
                stratumSize INTEGER NOT NULL,
                duration INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS strata (
                time INTEGER PRIMARY KEY,
                offset INTEGER NOT NULL,
                readTotals BLOB NOT NULL,
                writeTotals BLOB NOT NULL,
                zeroTotals BLOB NOT NULL
            );
            CREATE TABLE IF NOT EXISTS wblocks (
                time INTEGER NOT NULL,
                block INTEGER NOT NULL,
                firstOffset INTEGER NOT NULL,
                lastOffset INTEGER NOT NULL,
                data BLOB NOT NULL
            );
            ",
        )?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing store without write access
    pub fn open_read_only(path: &Path) -> IndexResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Delete the store at `path` along with any journal files
    pub fn remove(path: &Path) -> IndexResult<()> {
        let mut names = vec![path.as_os_str().to_owned()];
        for suffix in ["-journal", "-wal", "-shm"] {
            let mut name = path.as_os_str().to_owned();
            name.push(suffix);
            names.push(name);
        }

        for name in names {
            match std::fs::remove_file(&name) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// The fingerprint row, if indexing completed
    pub fn load_info(&self) -> IndexResult<Option<LogInfo>> {
        let info = self
            .conn
            .query_row(
                "SELECT name, mtime, timestepSize, blockSize, stratumSize, duration
                 FROM logInfo LIMIT 1",
                [],
                |row| {
                    Ok(LogInfo {
                        fingerprint: Fingerprint {
                            name: row.get(0)?,
                            mtime: row.get(1)?,
                            timestep_size: row.get::<_, i64>(2)? as u64,
                            block_size: row.get::<_, i64>(3)? as u64,
                            stratum_size: row.get::<_, i64>(4)? as u64,
                        },
                        duration: row.get::<_, i64>(5)? as u64,
                    })
                },
            )
            .optional()?;

        Ok(info)
    }

    /// Append one batch of timesteps in a single transaction
    pub fn write_batch(&mut self, batch: &TimestepBatch) -> IndexResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        {
            let mut insert_block = tx.prepare_cached(
                "INSERT INTO wblocks (time, block, firstOffset, lastOffset, data)
                 VALUES (?, ?, ?, ?, ?)",
            )?;
            for block in &batch.blocks {
                insert_block.execute(params![
                    block.time as i64,
                    block.block as i64,
                    block.first_offset as i64,
                    block.last_offset as i64,
                    block.data,
                ])?;
            }

            let mut insert_instant = tx.prepare_cached(
                "INSERT INTO strata (time, offset, readTotals, writeTotals, zeroTotals)
                 VALUES (?, ?, ?, ?, ?)",
            )?;
            for instant in &batch.instants {
                insert_instant.execute(params![
                    instant.time as i64,
                    instant.offset as i64,
                    instant.reads.pack(),
                    instant.writes.pack(),
                    instant.zeros.pack(),
                ])?;
            }
        }
        tx.commit()?;

        Ok(())
    }

    /// Build secondary indexes and write the fingerprint row
    pub fn finish(&mut self, info: &LogInfo) -> IndexResult<()> {
        self.conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS wblocks_block_time ON wblocks(block, time);
             ANALYZE;",
        )?;

        let fp = &info.fingerprint;
        self.conn.execute(
            "INSERT INTO logInfo (name, mtime, timestepSize, blockSize, stratumSize, duration)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                fp.name,
                fp.mtime,
                fp.timestep_size as i64,
                fp.block_size as i64,
                fp.stratum_size as i64,
                info.duration as i64,
            ],
        )?;

        Ok(())
    }

    /// Latest stored instant at or before `time`
    pub fn instant_floor(&self, time: u64) -> IndexResult<Option<LogInstant>> {
        self.query_instant(
            "SELECT time, offset, readTotals, writeTotals, zeroTotals FROM strata
             WHERE time <= ? ORDER BY time DESC LIMIT 1",
            time,
        )
    }

    /// Earliest stored instant at or after `time`
    pub fn instant_ceiling(&self, time: u64) -> IndexResult<Option<LogInstant>> {
        self.query_instant(
            "SELECT time, offset, readTotals, writeTotals, zeroTotals FROM strata
             WHERE time >= ? ORDER BY time ASC LIMIT 1",
            time,
        )
    }

    /// Stored instant with the smallest distance to `time`; ties go earlier
    pub fn nearest_instant(&self, time: u64) -> IndexResult<Option<LogInstant>> {
        let floor = self.instant_floor(time)?;
        if floor.as_ref().is_some_and(|i| i.time == time) {
            return Ok(floor);
        }
        let ceiling = self.instant_ceiling(time)?;

        Ok(match (floor, ceiling) {
            (Some(lo), Some(hi)) => {
                if time - lo.time <= hi.time - time {
                    Some(lo)
                } else {
                    Some(hi)
                }
            }
            (lo, hi) => lo.or(hi),
        })
    }

    fn query_instant(&self, sql: &str, time: u64) -> IndexResult<Option<LogInstant>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let row = stmt
            .query_row(params![time as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                    row.get::<_, Vec<u8>>(4)?,
                ))
            })
            .optional()?;

        let Some((time, offset, reads, writes, zeros)) = row else {
            return Ok(None);
        };

        let instant = LogInstant {
            time: time as u64,
            offset: offset as u64,
            reads: LogStrata::unpack(&reads)?,
            writes: LogStrata::unpack(&writes)?,
            zeros: LogStrata::unpack(&zeros)?,
        };
        if instant.writes.len() != instant.reads.len() || instant.zeros.len() != instant.reads.len()
        {
            return Err(IndexError::Corruption(format!(
                "strata row at time {} has mismatched lengths",
                instant.time
            )));
        }
        Ok(Some(instant))
    }

    /// Latest snapshot of `block` flushed at or before `time`
    pub fn block_at(&self, block: u64, time: u64) -> IndexResult<Option<BlockSnapshot>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT time, firstOffset, lastOffset, data FROM wblocks
             WHERE block = ? AND time <= ?
             ORDER BY time DESC, rowid DESC LIMIT 1",
        )?;

        let snapshot = stmt
            .query_row(params![block as i64, time as i64], |row| {
                Ok(BlockSnapshot {
                    time: row.get::<_, i64>(0)? as u64,
                    block,
                    first_offset: row.get::<_, i64>(1)? as u64,
                    last_offset: row.get::<_, i64>(2)? as u64,
                    data: row.get(3)?,
                })
            })
            .optional()?;

        Ok(snapshot)
    }

    /// Every stored instant time, ascending
    pub fn instant_times(&self) -> IndexResult<Vec<u64>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT time FROM strata ORDER BY time")?;
        let times = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .map(|r| r.map(|t| t as u64))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(times)
    }

    /// Row counts; `block` restricts the `wblocks` count to one block
    pub fn stats(&self, block: Option<u64>) -> IndexResult<StoreStats> {
        let strata_rows: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM strata", [], |row| row.get(0))?;
        let wblock_rows: i64 = match block {
            Some(block) => self.conn.query_row(
                "SELECT COUNT(*) FROM wblocks WHERE block = ?",
                params![block as i64],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM wblocks", [], |row| row.get(0))?,
        };

        Ok(StoreStats {
            strata_rows: strata_rows as u64,
            wblock_rows: wblock_rows as u64,
        })
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}
