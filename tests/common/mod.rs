// Shared fixtures for the integration tests: a throwaway SQLite database with
// the full schema, mirror rows, and counting channel senders.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sea_orm::{ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, Schema, Set};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

use timelock_backend::db::entities::{
    compound_timelock, notification_config, notification_log, openzeppelin_timelock,
    timelock_transaction,
};
use timelock_backend::db::enums::{ChannelType, TimelockStandard, TransactionStatus};
use timelock_backend::db::models::CreateTransactionRequest;
use timelock_backend::db::services::{
    NotificationConfigService, NotificationLogService, SeaOrmContractMirror, TransactionStore,
};
use timelock_backend::lifecycle::events::StatusChangeEvent;
use timelock_backend::lifecycle::{EventPublisher, TimelockService};
use timelock_backend::notifications::encryption::EncryptionService;
use timelock_backend::notifications::models::{ChainInfo, ChannelConfig};
use timelock_backend::notifications::senders::{NotificationSender, SenderError, SenderRegistry};
use timelock_backend::notifications::service::NotificationService;
use timelock_backend::services::clock::FixedClock;
use timelock_backend::services::contract_mirror::{ContractMirror, MirrorRecipientResolver};

pub const T0: i64 = 1_700_000_000;
pub const CHAIN: i32 = 1;

pub const COMPOUND_CONTRACT: &str = "0x1000000000000000000000000000000000000abc";
pub const OZ_CONTRACT: &str = "0x2000000000000000000000000000000000000002";
pub const TARGET: &str = "0x3000000000000000000000000000000000000003";

pub const ADMIN: &str = "0xa000000000000000000000000000000000000001";
pub const PENDING_ADMIN: &str = "0xa000000000000000000000000000000000000002";
pub const DEPLOYER: &str = "0xa000000000000000000000000000000000000003";
pub const PROPOSER: &str = "0xb000000000000000000000000000000000000001";
pub const EXECUTOR: &str = "0xb000000000000000000000000000000000000002";
pub const CANCELLER: &str = "0xb000000000000000000000000000000000000003";
pub const OUTSIDER: &str = "0xc000000000000000000000000000000000000001";

pub const ENCRYPTION_KEY: &str =
    "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

pub struct TestContext {
    _dir: TempDir,
    pub db: Arc<DatabaseConnection>,
    pub clock: Arc<FixedClock>,
    pub mirror: Arc<dyn ContractMirror>,
    pub store: TransactionStore,
    pub events: EventPublisher,
    pub event_rx: tokio::sync::mpsc::UnboundedReceiver<StatusChangeEvent>,
    pub service: TimelockService,
}

pub async fn setup() -> TestContext {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timelock.db");
    let db = Database::connect(format!("sqlite://{}?mode=rwc", path.display()))
        .await
        .unwrap();
    create_schema(&db).await;
    let db = Arc::new(db);

    seed_mirror(&db).await;

    let clock = Arc::new(FixedClock::new(T0));
    let mirror: Arc<dyn ContractMirror> = Arc::new(SeaOrmContractMirror::new(db.clone()));
    let store = TransactionStore::new(db.clone());
    let (events, event_rx) = EventPublisher::new();
    let service = TimelockService::new(store.clone(), mirror.clone(), events.clone(), clock.clone());

    TestContext {
        _dir: dir,
        db,
        clock,
        mirror,
        store,
        events,
        event_rx,
        service,
    }
}

async fn create_schema(db: &DatabaseConnection) {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let statements = [
        schema.create_table_from_entity(timelock_transaction::Entity),
        schema.create_table_from_entity(compound_timelock::Entity),
        schema.create_table_from_entity(openzeppelin_timelock::Entity),
        schema.create_table_from_entity(notification_config::Entity),
        schema.create_table_from_entity(notification_log::Entity),
    ];
    for statement in statements {
        db.execute(backend.build(&statement)).await.unwrap();
    }
}

async fn seed_mirror(db: &DatabaseConnection) {
    let now = Utc.timestamp_opt(T0, 0).unwrap();
    compound_timelock::ActiveModel {
        chain_id: Set(CHAIN),
        // Mixed case as some listeners write checksummed addresses.
        contract_address: Set(COMPOUND_CONTRACT.to_uppercase().replacen("0X", "0x", 1)),
        creator_address: Set(DEPLOYER.to_string()),
        admin: Set(ADMIN.to_string()),
        pending_admin: Set(Some(PENDING_ADMIN.to_string())),
        delay_seconds: Set(172_800),
        remark: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap();

    openzeppelin_timelock::ActiveModel {
        chain_id: Set(CHAIN),
        contract_address: Set(OZ_CONTRACT.to_string()),
        creator_address: Set(DEPLOYER.to_string()),
        proposers: Set(PROPOSER.to_string()),
        executors: Set(format!("{EXECUTOR},{PROPOSER}")),
        cancellers: Set(CANCELLER.to_string()),
        delay_seconds: Set(3_600),
        remark: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap();
}

/// Deterministic 32-byte hash for fixture number `n`.
pub fn tx_hash(n: u64) -> String {
    format!("0x{n:064x}")
}

pub fn create_request(
    standard: TimelockStandard,
    hash: &str,
    eta: i64,
) -> CreateTransactionRequest {
    let contract_address = match standard {
        TimelockStandard::Compound => COMPOUND_CONTRACT,
        TimelockStandard::OpenZeppelin => OZ_CONTRACT,
    };
    CreateTransactionRequest {
        chain_id: CHAIN,
        contract_address: contract_address.to_string(),
        standard,
        tx_hash: hash.to_string(),
        target: TARGET.to_string(),
        value: "0".to_string(),
        call_data: "0xa9059cbb".to_string(),
        function_signature: Some("transfer(address,uint256)".to_string()),
        description: "fixture".to_string(),
        eta,
        operation_id: None,
    }
}

pub fn proposer_for(standard: TimelockStandard) -> &'static str {
    match standard {
        TimelockStandard::Compound => ADMIN,
        TimelockStandard::OpenZeppelin => PROPOSER,
    }
}

/// Creates a transaction and lets the listener confirm it as queued.
pub async fn queued_transaction(
    ctx: &TestContext,
    standard: TimelockStandard,
    n: u64,
    eta: i64,
) -> timelock_transaction::Model {
    let hash = tx_hash(n);
    ctx.service
        .create_transaction(proposer_for(standard), create_request(standard, &hash, eta))
        .await
        .unwrap();
    ctx.service
        .update_status_by_hash(&hash, TransactionStatus::Queued, None)
        .await
        .unwrap()
}

pub fn drain_events(ctx: &mut TestContext) -> Vec<StatusChangeEvent> {
    let mut events = Vec::new();
    while let Ok(event) = ctx.event_rx.try_recv() {
        events.push(event);
    }
    events
}

/// Sender that counts calls and optionally fails every delivery.
#[derive(Default)]
pub struct CountingSender {
    pub calls: AtomicUsize,
    pub fail: bool,
    pub messages: std::sync::Mutex<Vec<String>>,
}

impl CountingSender {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSender for CountingSender {
    async fn send(&self, _config: &ChannelConfig, message: &str) -> Result<(), SenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.messages.lock().unwrap().push(message.to_string());
        if self.fail {
            return Err(SenderError::SendFailed("channel unavailable".to_string()));
        }
        Ok(())
    }
}

pub fn encryption() -> Arc<EncryptionService> {
    Arc::new(EncryptionService::from_hex_key(ENCRYPTION_KEY).unwrap())
}

pub fn config_service(ctx: &TestContext) -> NotificationConfigService {
    NotificationConfigService::new(ctx.db.clone(), encryption())
}

pub fn notification_service(
    ctx: &TestContext,
    senders: Vec<(ChannelType, Arc<dyn NotificationSender>)>,
) -> NotificationService {
    let registry: SenderRegistry = senders.into_iter().collect::<HashMap<_, _>>();
    NotificationService::new(
        Arc::new(MirrorRecipientResolver::new(ctx.mirror.clone())),
        config_service(ctx),
        NotificationLogService::new(ctx.db.clone()),
        registry,
        vec![ChainInfo {
            chain_id: CHAIN,
            display_name: "Ethereum".to_string(),
            explorer_url: Some("https://etherscan.io".to_string()),
        }],
    )
}
