//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `groups` - Group records (key: group_id)
//! - `expenses` - Expense records (key: expense_id)
//! - `shares` - Participant shares (key: expense_id || user_id)
//! - `summaries` - Canonical debt rows (key: scope || debtor || creditor)
//! - `settlements` - Append-only settlement log (key: scope || settlement_id)
//! - `activity` - Audit records (key: activity_id)
//! - `indices` - Secondary indices for fast lookups
//!
//! All mutation goes through [`WriteOps`], a typed wrapper over a RocksDB
//! `WriteBatch`: one reconciliation pass stages every row change and commits
//! them as a single atomic unit.

use crate::{
    error::{Error, Result},
    types::{
        Activity, DebtSummary, Expense, ExpenseId, Group, GroupId, ParticipantShare, Settlement,
        UserId,
    },
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use std::sync::Arc;

/// Column family names
const CF_GROUPS: &str = "groups";
const CF_EXPENSES: &str = "expenses";
const CF_SHARES: &str = "shares";
const CF_SUMMARIES: &str = "summaries";
const CF_SETTLEMENTS: &str = "settlements";
const CF_ACTIVITY: &str = "activity";
const CF_INDICES: &str = "indices";

/// Index tags (first key byte in `indices`)
const IDX_SCOPE_EXPENSE: u8 = 1;
const IDX_USER_ACTIVITY: u8 = 2;

/// Length of an encoded scope prefix: tag byte + group UUID bytes
const SCOPE_PREFIX_LEN: usize = 17;

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        // Column family descriptors
        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_GROUPS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_EXPENSES, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_SHARES, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_SUMMARIES, Self::cf_options_hot()),
            ColumnFamilyDescriptor::new(CF_SETTLEMENTS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_ACTIVITY, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        // Open database
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_records() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_hot() -> Options {
        let mut opts = Options::default();
        // Summaries are read on every reconciliation, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_log() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Indices benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    /// Collect all values under a key prefix
    fn prefix_scan(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let cf = self.cf_handle(cf_name)?;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        let mut out = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key, value));
        }
        Ok(out)
    }

    // Group operations

    /// Get group by ID
    pub fn get_group(&self, group_id: GroupId) -> Result<Group> {
        let cf = self.cf_handle(CF_GROUPS)?;
        let value = self
            .db
            .get_cf(cf, group_id.as_bytes())?
            .ok_or_else(|| Error::GroupNotFound(group_id.to_string()))?;

        let group: Group = bincode::deserialize(&value)?;
        Ok(group)
    }

    // Expense operations

    /// Get expense by ID
    pub fn get_expense(&self, expense_id: ExpenseId) -> Result<Expense> {
        let cf = self.cf_handle(CF_EXPENSES)?;
        let value = self
            .db
            .get_cf(cf, expense_id.as_bytes())?
            .ok_or_else(|| Error::ExpenseNotFound(expense_id.to_string()))?;

        let expense: Expense = bincode::deserialize(&value)?;
        Ok(expense)
    }

    /// Get all live expenses in a scope (via index)
    pub fn list_scope_expenses(&self, scope: Option<GroupId>) -> Result<Vec<Expense>> {
        let prefix = index_key_scope_expense(scope, None);

        let mut expenses = Vec::new();
        for (key, _) in self.prefix_scan(CF_INDICES, &prefix)? {
            // Extract expense_id from key tail
            if key.len() == 1 + SCOPE_PREFIX_LEN + 16 {
                let id_bytes: [u8; 16] = key[1 + SCOPE_PREFIX_LEN..].try_into().unwrap();
                let expense_id = ExpenseId::from_uuid(uuid::Uuid::from_bytes(id_bytes));
                expenses.push(self.get_expense(expense_id)?);
            }
        }

        Ok(expenses)
    }

    /// Get all participant shares of an expense
    pub fn get_expense_shares(&self, expense_id: ExpenseId) -> Result<Vec<ParticipantShare>> {
        let mut shares = Vec::new();
        for (_, value) in self.prefix_scan(CF_SHARES, expense_id.as_bytes())? {
            let share: ParticipantShare = bincode::deserialize(&value)?;
            shares.push(share);
        }
        Ok(shares)
    }

    // Debt summary operations

    /// Get the summary row for an exact (scope, debtor, creditor) key
    pub fn get_summary(
        &self,
        scope: Option<GroupId>,
        debtor: UserId,
        creditor: UserId,
    ) -> Result<Option<DebtSummary>> {
        let cf = self.cf_handle(CF_SUMMARIES)?;
        let key = summary_key(scope, debtor, creditor);

        match self.db.get_cf(cf, key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Get every live summary row in a scope
    pub fn list_scope_summaries(&self, scope: Option<GroupId>) -> Result<Vec<DebtSummary>> {
        let prefix = scope_prefix(scope);

        let mut summaries = Vec::new();
        for (_, value) in self.prefix_scan(CF_SUMMARIES, &prefix)? {
            let summary: DebtSummary = bincode::deserialize(&value)?;
            summaries.push(summary);
        }
        Ok(summaries)
    }

    // Settlement operations

    /// Get every settlement recorded in a scope
    pub fn list_scope_settlements(&self, scope: Option<GroupId>) -> Result<Vec<Settlement>> {
        let prefix = scope_prefix(scope);

        let mut settlements = Vec::new();
        for (_, value) in self.prefix_scan(CF_SETTLEMENTS, &prefix)? {
            let settlement: Settlement = bincode::deserialize(&value)?;
            settlements.push(settlement);
        }
        Ok(settlements)
    }

    // Activity operations

    /// Get a user's activity records (via index)
    pub fn list_user_activities(&self, user_id: UserId) -> Result<Vec<Activity>> {
        let mut prefix = Vec::with_capacity(17);
        prefix.push(IDX_USER_ACTIVITY);
        prefix.extend_from_slice(user_id.as_bytes());

        let cf_activity = self.cf_handle(CF_ACTIVITY)?;

        let mut activities = Vec::new();
        for (key, _) in self.prefix_scan(CF_INDICES, &prefix)? {
            if key.len() == 1 + 16 + 16 {
                let id_bytes = &key[17..33];
                let value = self
                    .db
                    .get_cf(cf_activity, id_bytes)?
                    .ok_or_else(|| Error::Storage("Dangling activity index".to_string()))?;
                let activity: Activity = bincode::deserialize(&value)?;
                activities.push(activity);
            }
        }

        Ok(activities)
    }

    // Batch operations (atomic)

    /// Start a typed write batch
    pub fn batch(&self) -> WriteOps<'_> {
        WriteOps {
            storage: self,
            batch: WriteBatch::default(),
        }
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

/// Typed, atomic write batch over the store
///
/// Every mutation of one logical operation is staged here and made visible
/// in a single RocksDB write; readers never observe a partial update.
pub struct WriteOps<'a> {
    storage: &'a Storage,
    batch: WriteBatch,
}

impl WriteOps<'_> {
    /// Stage an expense upsert (with scope index)
    pub fn put_expense(&mut self, expense: &Expense) -> Result<()> {
        let cf = self.storage.cf_handle(CF_EXPENSES)?;
        let value = bincode::serialize(expense)?;
        self.batch.put_cf(cf, expense.expense_id.as_bytes(), &value);

        let cf_indices = self.storage.cf_handle(CF_INDICES)?;
        let idx = index_key_scope_expense(expense.group_id, Some(expense.expense_id));
        self.batch.put_cf(cf_indices, &idx, []);

        Ok(())
    }

    /// Stage an expense delete (with scope index)
    pub fn delete_expense(&mut self, expense: &Expense) -> Result<()> {
        let cf = self.storage.cf_handle(CF_EXPENSES)?;
        self.batch.delete_cf(cf, expense.expense_id.as_bytes());

        let cf_indices = self.storage.cf_handle(CF_INDICES)?;
        let idx = index_key_scope_expense(expense.group_id, Some(expense.expense_id));
        self.batch.delete_cf(cf_indices, &idx);

        Ok(())
    }

    /// Stage a participant share upsert
    pub fn put_share(&mut self, share: &ParticipantShare) -> Result<()> {
        let cf = self.storage.cf_handle(CF_SHARES)?;
        let value = bincode::serialize(share)?;
        self.batch
            .put_cf(cf, share_key(share.expense_id, share.user_id), &value);
        Ok(())
    }

    /// Stage a participant share delete
    pub fn delete_share(&mut self, expense_id: ExpenseId, user_id: UserId) -> Result<()> {
        let cf = self.storage.cf_handle(CF_SHARES)?;
        self.batch.delete_cf(cf, share_key(expense_id, user_id));
        Ok(())
    }

    /// Stage a summary row upsert
    pub fn put_summary(&mut self, summary: &DebtSummary) -> Result<()> {
        let cf = self.storage.cf_handle(CF_SUMMARIES)?;
        let key = summary_key(summary.group_id, summary.debtor, summary.creditor);
        let value = bincode::serialize(summary)?;
        self.batch.put_cf(cf, key, &value);
        Ok(())
    }

    /// Stage a summary row delete
    pub fn delete_summary(
        &mut self,
        scope: Option<GroupId>,
        debtor: UserId,
        creditor: UserId,
    ) -> Result<()> {
        let cf = self.storage.cf_handle(CF_SUMMARIES)?;
        self.batch.delete_cf(cf, summary_key(scope, debtor, creditor));
        Ok(())
    }

    /// Stage the transactional replacement of every summary row in a scope
    ///
    /// Deletes the current row set and inserts `rows`, all within this batch.
    pub fn replace_scope_summaries(
        &mut self,
        scope: Option<GroupId>,
        rows: &[DebtSummary],
    ) -> Result<()> {
        let cf = self.storage.cf_handle(CF_SUMMARIES)?;
        let prefix = scope_prefix(scope);

        for (key, _) in self.storage.prefix_scan(CF_SUMMARIES, &prefix)? {
            self.batch.delete_cf(cf, key);
        }

        for row in rows {
            self.put_summary(row)?;
        }

        Ok(())
    }

    /// Stage an append-only settlement record
    pub fn put_settlement(&mut self, settlement: &Settlement) -> Result<()> {
        let cf = self.storage.cf_handle(CF_SETTLEMENTS)?;
        let mut key = scope_prefix(settlement.group_id).to_vec();
        key.extend_from_slice(settlement.settlement_id.as_bytes());
        let value = bincode::serialize(settlement)?;
        self.batch.put_cf(cf, &key, &value);
        Ok(())
    }

    /// Stage a group upsert
    pub fn put_group(&mut self, group: &Group) -> Result<()> {
        let cf = self.storage.cf_handle(CF_GROUPS)?;
        let value = bincode::serialize(group)?;
        self.batch.put_cf(cf, group.group_id.as_bytes(), &value);
        Ok(())
    }

    /// Stage an audit record (with user index)
    pub fn put_activity(&mut self, activity: &Activity) -> Result<()> {
        let cf = self.storage.cf_handle(CF_ACTIVITY)?;
        let value = bincode::serialize(activity)?;
        self.batch
            .put_cf(cf, activity.activity_id.as_bytes(), &value);

        let cf_indices = self.storage.cf_handle(CF_INDICES)?;
        let mut idx = Vec::with_capacity(33);
        idx.push(IDX_USER_ACTIVITY);
        idx.extend_from_slice(activity.user_id.as_bytes());
        idx.extend_from_slice(activity.activity_id.as_bytes());
        self.batch.put_cf(cf_indices, &idx, []);

        Ok(())
    }

    /// Atomic commit of every staged mutation
    pub fn commit(self) -> Result<()> {
        self.storage.db.write(self.batch)?;
        Ok(())
    }
}

impl std::fmt::Debug for WriteOps<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteOps")
            .field("staged", &self.batch.len())
            .finish()
    }
}

// Key helpers

/// Encode a scope as a fixed-width key prefix
///
/// Tag byte distinguishes the ungrouped scope from a group whose UUID
/// happens to be nil.
fn scope_prefix(scope: Option<GroupId>) -> [u8; SCOPE_PREFIX_LEN] {
    let mut prefix = [0u8; SCOPE_PREFIX_LEN];
    if let Some(group_id) = scope {
        prefix[0] = 1;
        prefix[1..].copy_from_slice(group_id.as_bytes());
    }
    prefix
}

fn summary_key(scope: Option<GroupId>, debtor: UserId, creditor: UserId) -> Vec<u8> {
    let mut key = Vec::with_capacity(SCOPE_PREFIX_LEN + 32);
    key.extend_from_slice(&scope_prefix(scope));
    key.extend_from_slice(debtor.as_bytes());
    key.extend_from_slice(creditor.as_bytes());
    key
}

fn share_key(expense_id: ExpenseId, user_id: UserId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(expense_id.as_bytes());
    key.extend_from_slice(user_id.as_bytes());
    key
}

fn index_key_scope_expense(scope: Option<GroupId>, expense_id: Option<ExpenseId>) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + SCOPE_PREFIX_LEN + 16);
    key.push(IDX_SCOPE_EXPENSE);
    key.extend_from_slice(&scope_prefix(scope));
    if let Some(id) = expense_id {
        key.extend_from_slice(id.as_bytes());
    }
    key
}
