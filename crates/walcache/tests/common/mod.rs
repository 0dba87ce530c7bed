//! Shared harness: a small account domain exercised over both back ends.
//!
//! The account keeps a balance with a reserved portion. Try reserves funds,
//! Confirm settles them, Cancel releases them, Must deposits unconditionally.

// not every suite uses every helper
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use walcache::{
    Cache, Error, KvBackend, KvBusinessProvider, LockerKey, LockerValue, Reservation, Result,
    SqlBackend, SqlBusinessProvider, SqlSession, TccContext, WalDecision, WalRecord,
    ERR_RESERVATION_NOT_FOUND,
};
use walcache_core::config::BarrierConfig;
use walcache_storage::KvStore;

// === Domain ===

/// A cached account balance with a reserved portion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    pub balance: i64,
    pub reserved: i64,
    pub version: u64,
    pub db_version: u64,
    pub dirty: bool,
}

impl LockerValue for Account {
    fn version(&self) -> u64 {
        self.version
    }

    fn db_version(&self) -> u64 {
        self.db_version
    }

    fn set_db_version(&mut self, version: u64) {
        self.db_version = version;
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }
}

/// Body of a Try (reserve) or Must (deposit) request.
#[derive(Debug, Clone, Copy)]
pub struct AccountRequest {
    pub amount: i64,
}

/// One account mutation, as recorded in the WAL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AccountWal {
    Reserve { amount: i64 },
    Settle { amount: i64 },
    Release { amount: i64 },
    Deposit { amount: i64 },
}

pub fn apply_wal_op(account: &mut Account, wal: &AccountWal) {
    match wal {
        AccountWal::Reserve { amount } => account.reserved += amount,
        AccountWal::Settle { amount } => {
            account.balance -= amount;
            account.reserved -= amount;
        }
        AccountWal::Release { amount } => account.reserved -= amount,
        AccountWal::Deposit { amount } => account.balance += amount,
    }
    account.version += 1;
}

/// Persisted account snapshot (what `persist_value` writes through).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    balance: i64,
    reserved: i64,
    version: u64,
}

impl Snapshot {
    fn of(account: &Account) -> Self {
        Self { balance: account.balance, reserved: account.reserved, version: account.version }
    }

    fn into_account(self) -> Account {
        Account {
            balance: self.balance,
            reserved: self.reserved,
            version: self.version,
            db_version: self.version,
            dirty: false,
        }
    }
}

// === KV provider ===

/// Account provider for the KV back end. Snapshots live in the same store
/// under `val_<key>`; WAL records use the `wal_<key>_<version>` scheme so
/// replay can walk versions upward with point reads.
pub struct AccountKvProvider {
    store: Arc<dyn KvStore>,
    pub replayed: AtomicU64,
    pub fail_persist: AtomicBool,
}

impl AccountKvProvider {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store, replayed: AtomicU64::new(0), fail_persist: AtomicBool::new(false) }
    }

    fn snapshot_key(key: &LockerKey) -> Vec<u8> {
        format!("val_{key}").into_bytes()
    }

    pub fn wal_key(key: &LockerKey, version: u64) -> String {
        WalRecord::build_key(key, version)
    }

    /// Seeds the persisted snapshot for a key.
    pub async fn seed(&self, key: &LockerKey, balance: i64) -> Result<()> {
        let snap = Snapshot { balance, reserved: 0, version: 0 };
        let bytes = serde_json::to_vec(&snap).map_err(Error::storage)?;
        self.store.put(&Self::snapshot_key(key), &bytes).await
    }
}

#[async_trait]
impl KvBusinessProvider for AccountKvProvider {
    type Value = Account;
    type Body = AccountRequest;

    async fn load_value(&self, key: &LockerKey) -> Result<Option<Account>> {
        match self.store.get(&Self::snapshot_key(key)).await? {
            None => Ok(None),
            Some(bytes) => {
                let snap: Snapshot = serde_json::from_slice(&bytes).map_err(Error::storage)?;
                Ok(Some(snap.into_account()))
            }
        }
    }

    fn materialize(&self, _key: &LockerKey) -> Option<Account> {
        Some(Account::default())
    }

    async fn persist_value(&self, key: &LockerKey, value: &Account) -> Result<()> {
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(Error::storage("injected persist failure"));
        }
        let bytes = serde_json::to_vec(&Snapshot::of(value)).map_err(Error::storage)?;
        self.store.put(&Self::snapshot_key(key), &bytes).await
    }

    async fn catchup_wals(
        &self,
        store: &dyn KvStore,
        key: &LockerKey,
        value: &mut Account,
    ) -> Result<bool> {
        let mut applied = false;
        loop {
            let wal_key = Self::wal_key(key, value.version + 1);
            let Some(payload) = store.get(wal_key.as_bytes()).await? else {
                break;
            };
            let wal: AccountWal = serde_json::from_slice(&payload).map_err(Error::storage)?;
            apply_wal_op(value, &wal);
            self.replayed.fetch_add(1, Ordering::SeqCst);
            applied = true;
        }
        Ok(applied)
    }

    fn generate_wal_try(
        &self,
        _ctx: &TccContext,
        key: &LockerKey,
        value: &Account,
        body: &AccountRequest,
    ) -> Result<WalDecision<WalRecord>> {
        let available = value.balance - value.reserved;
        if body.amount > available {
            return Ok(WalDecision::Veto {
                code: "INSUFFICIENT".to_string(),
                message: format!("cannot reserve {} from available {available}", body.amount),
            });
        }
        let wal = AccountWal::Reserve { amount: body.amount };
        let payload = serde_json::to_vec(&wal).map_err(Error::storage)?;
        Ok(WalDecision::Wal(WalRecord::new(Self::wal_key(key, value.version + 1), payload)))
    }

    fn generate_wal_must(
        &self,
        _ctx: &TccContext,
        key: &LockerKey,
        value: &Account,
        body: &AccountRequest,
    ) -> Result<WalDecision<WalRecord>> {
        if body.amount < 0 {
            return Ok(WalDecision::Veto {
                code: "INVALID".to_string(),
                message: "negative deposit".to_string(),
            });
        }
        let wal = AccountWal::Deposit { amount: body.amount };
        let payload = serde_json::to_vec(&wal).map_err(Error::storage)?;
        Ok(WalDecision::Wal(WalRecord::new(Self::wal_key(key, value.version + 1), payload)))
    }

    fn generate_wal_confirm(
        &self,
        _ctx: &TccContext,
        key: &LockerKey,
        value: &Account,
        reservation: &WalRecord,
    ) -> Option<WalRecord> {
        let AccountWal::Reserve { amount } = serde_json::from_slice(&reservation.payload).ok()?
        else {
            return None;
        };
        if amount == 0 {
            return None;
        }
        let payload = serde_json::to_vec(&AccountWal::Settle { amount }).ok()?;
        Some(WalRecord::new(Self::wal_key(key, value.version + 1), payload))
    }

    fn generate_wal_cancel(
        &self,
        _ctx: &TccContext,
        key: &LockerKey,
        value: &Account,
        reservation: &WalRecord,
    ) -> Option<WalRecord> {
        let AccountWal::Reserve { amount } = serde_json::from_slice(&reservation.payload).ok()?
        else {
            return None;
        };
        if amount == 0 {
            return None;
        }
        let payload = serde_json::to_vec(&AccountWal::Release { amount }).ok()?;
        Some(WalRecord::new(Self::wal_key(key, value.version + 1), payload))
    }

    fn apply_wal(&self, value: &mut Account, wals: &[WalRecord]) -> Result<()> {
        for record in wals {
            let wal: AccountWal =
                serde_json::from_slice(&record.payload).map_err(Error::storage)?;
            apply_wal_op(value, &wal);
        }
        Ok(())
    }
}

/// Counts WAL records for `key` by walking the version chain from 1.
pub async fn kv_wal_count(store: &dyn KvStore, key: &LockerKey) -> usize {
    let mut count = 0;
    loop {
        let wal_key = AccountKvProvider::wal_key(key, count as u64 + 1);
        match store.get(wal_key.as_bytes()).await.unwrap() {
            Some(_) => count += 1,
            None => break,
        }
    }
    count
}

/// Builds a KV cache plus handles to its provider.
pub fn kv_cache(
    store: Arc<dyn KvStore>,
) -> (Cache<KvBackend<AccountKvProvider>>, Arc<AccountKvProvider>) {
    let provider = Arc::new(AccountKvProvider::new(Arc::clone(&store)));
    let backend = KvBackend::new(store, Arc::clone(&provider), &BarrierConfig::default());
    (Cache::new("test-kv", backend), provider)
}

// === In-memory SQL fake ===

/// One WAL row as the SQL business provider stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRow {
    pub gid: String,
    pub bid: String,
    pub key: String,
    pub version: u64,
    pub wal: AccountWal,
}

#[derive(Default)]
struct SqlState {
    barrier: HashSet<String>,
    wals: Vec<WalRow>,
    snapshots: HashMap<String, Snapshot>,
}

/// In-memory stand-in for the host's SQL database: a barrier table with a
/// primary key, a WAL table and a snapshot table, with staged writes that
/// only land on commit.
#[derive(Default)]
pub struct MemSqlDb {
    state: tokio::sync::Mutex<SqlState>,
}

/// Staged writes of one transaction.
#[derive(Default)]
pub struct MemTxn {
    staged_barrier: Vec<String>,
    staged_wals: Vec<WalRow>,
}

impl MemSqlDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, key: &LockerKey, balance: i64) {
        let mut state = self.state.lock().await;
        state.snapshots.insert(key.to_string(), Snapshot { balance, reserved: 0, version: 0 });
    }

    pub async fn wal_count(&self) -> usize {
        self.state.lock().await.wals.len()
    }

    pub async fn barrier_contains(&self, barrier_key: &str) -> bool {
        self.state.lock().await.barrier.contains(barrier_key)
    }
}

#[async_trait]
impl SqlSession for MemSqlDb {
    type Txn = MemTxn;

    async fn begin(&self) -> Result<MemTxn> {
        Ok(MemTxn::default())
    }

    async fn commit(&self, txn: MemTxn) -> Result<()> {
        let mut state = self.state.lock().await;
        for key in txn.staged_barrier {
            state.barrier.insert(key);
        }
        for row in txn.staged_wals {
            state.wals.push(row);
        }
        Ok(())
    }

    async fn rollback(&self, _txn: MemTxn) -> Result<()> {
        Ok(())
    }

    async fn insert_barrier(
        &self,
        txn: &mut MemTxn,
        _table: &str,
        barrier_key: &str,
    ) -> Result<bool> {
        let state = self.state.lock().await;
        let exists = state.barrier.contains(barrier_key)
            || txn.staged_barrier.iter().any(|k| k == barrier_key);
        drop(state);
        if exists {
            return Ok(false);
        }
        txn.staged_barrier.push(barrier_key.to_string());
        Ok(true)
    }
}

/// Account provider for the SQL back end, sharing the fake database.
pub struct AccountSqlProvider {
    db: Arc<MemSqlDb>,
    pub replayed: AtomicU64,
}

impl AccountSqlProvider {
    pub fn new(db: Arc<MemSqlDb>) -> Self {
        Self { db, replayed: AtomicU64::new(0) }
    }
}

#[async_trait]
impl SqlBusinessProvider for AccountSqlProvider {
    type Value = Account;
    type Body = AccountRequest;
    type Wal = WalRow;
    type Txn = MemTxn;

    async fn load_value(&self, key: &LockerKey) -> Result<Option<Account>> {
        let state = self.db.state.lock().await;
        Ok(state.snapshots.get(key.as_str()).cloned().map(Snapshot::into_account))
    }

    fn materialize(&self, _key: &LockerKey) -> Option<Account> {
        Some(Account::default())
    }

    async fn persist_value(&self, key: &LockerKey, value: &Account) -> Result<()> {
        let mut state = self.db.state.lock().await;
        state.snapshots.insert(key.to_string(), Snapshot::of(value));
        Ok(())
    }

    async fn catchup_wals(&self, key: &LockerKey, value: &mut Account) -> Result<bool> {
        let mut outstanding: Vec<WalRow> = {
            let state = self.db.state.lock().await;
            state
                .wals
                .iter()
                .filter(|row| row.key == key.as_str() && row.version > value.version)
                .cloned()
                .collect()
        };
        outstanding.sort_by_key(|row| row.version);

        let mut applied = false;
        for row in outstanding {
            apply_wal_op(value, &row.wal);
            self.replayed.fetch_add(1, Ordering::SeqCst);
            applied = true;
        }
        Ok(applied)
    }

    fn generate_wal_try(
        &self,
        ctx: &TccContext,
        key: &LockerKey,
        value: &Account,
        body: &AccountRequest,
    ) -> Result<WalDecision<WalRow>> {
        let available = value.balance - value.reserved;
        if body.amount > available {
            return Ok(WalDecision::Veto {
                code: "INSUFFICIENT".to_string(),
                message: format!("cannot reserve {} from available {available}", body.amount),
            });
        }
        Ok(WalDecision::Wal(WalRow {
            gid: ctx.global_id.clone(),
            bid: ctx.branch_id.clone(),
            key: key.to_string(),
            version: value.version + 1,
            wal: AccountWal::Reserve { amount: body.amount },
        }))
    }

    fn generate_wal_must(
        &self,
        ctx: &TccContext,
        key: &LockerKey,
        value: &Account,
        body: &AccountRequest,
    ) -> Result<WalDecision<WalRow>> {
        if body.amount < 0 {
            return Ok(WalDecision::Veto {
                code: "INVALID".to_string(),
                message: "negative deposit".to_string(),
            });
        }
        Ok(WalDecision::Wal(WalRow {
            gid: ctx.global_id.clone(),
            bid: ctx.branch_id.clone(),
            key: key.to_string(),
            version: value.version + 1,
            wal: AccountWal::Deposit { amount: body.amount },
        }))
    }

    fn generate_wal_confirm(
        &self,
        ctx: &TccContext,
        key: &LockerKey,
        value: &Account,
        reservation: &WalRow,
    ) -> Option<WalRow> {
        let AccountWal::Reserve { amount } = reservation.wal else {
            return None;
        };
        if amount == 0 {
            return None;
        }
        Some(WalRow {
            gid: ctx.global_id.clone(),
            bid: ctx.branch_id.clone(),
            key: key.to_string(),
            version: value.version + 1,
            wal: AccountWal::Settle { amount },
        })
    }

    fn generate_wal_cancel(
        &self,
        ctx: &TccContext,
        key: &LockerKey,
        value: &Account,
        reservation: &WalRow,
    ) -> Option<WalRow> {
        let AccountWal::Reserve { amount } = reservation.wal else {
            return None;
        };
        if amount == 0 {
            return None;
        }
        Some(WalRow {
            gid: ctx.global_id.clone(),
            bid: ctx.branch_id.clone(),
            key: key.to_string(),
            version: value.version + 1,
            wal: AccountWal::Release { amount },
        })
    }

    async fn load_reservation(
        &self,
        _txn: &mut MemTxn,
        ctx: &TccContext,
    ) -> Result<Reservation<WalRow>> {
        let state = self.db.state.lock().await;
        let found = state.wals.iter().find(|row| {
            row.gid == ctx.global_id
                && row.bid == ctx.branch_id
                && matches!(row.wal, AccountWal::Reserve { .. })
        });
        match found {
            Some(row) => Ok(Reservation::Found(row.clone())),
            None => Ok(Reservation::Missing {
                code: ERR_RESERVATION_NOT_FOUND.to_string(),
                message: format!("no reservation for {ctx}"),
            }),
        }
    }

    async fn flush_wal(&self, txn: &mut MemTxn, wal: &WalRow) -> Result<()> {
        txn.staged_wals.push(wal.clone());
        Ok(())
    }

    fn apply_wal(&self, value: &mut Account, wals: &[WalRow]) -> Result<()> {
        for row in wals {
            apply_wal_op(value, &row.wal);
        }
        Ok(())
    }
}

/// Builds a SQL cache plus handles to its session and provider.
pub fn sql_cache(
    db: Arc<MemSqlDb>,
) -> (Cache<SqlBackend<MemSqlDb, AccountSqlProvider>>, Arc<AccountSqlProvider>) {
    let provider = Arc::new(AccountSqlProvider::new(Arc::clone(&db)));
    let backend = SqlBackend::new(db, Arc::clone(&provider), &BarrierConfig::default());
    (Cache::new("test-sql", backend), provider)
}
