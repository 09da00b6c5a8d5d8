use crate::{
    entities::{
        wallet, wallet_transaction, Wallet, WalletTransaction, WalletTransactionStatus,
        WalletTransactionType,
    },
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Wallet ledger.
///
/// The wallet holds a single running balance per user backed by an
/// append-only transaction log. The balance always equals the signed sum of
/// completed entries; every mutation appends an entry and adjusts the
/// balance inside the caller's transaction.
#[derive(Clone)]
pub struct WalletService {
    db: Arc<DatabaseConnection>,
}

impl WalletService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Current balance; zero when the user has no wallet yet.
    pub async fn balance(&self, user_id: Uuid) -> Result<Decimal, ServiceError> {
        let wallet = Wallet::find()
            .filter(wallet::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?;
        Ok(wallet.map_or(Decimal::ZERO, |w| w.balance))
    }

    /// Ledger entries for a user, newest first, paginated.
    #[instrument(skip(self))]
    pub async fn transactions(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<wallet_transaction::Model>, u64), ServiceError> {
        let wallet = Wallet::find()
            .filter(wallet::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?;

        let Some(wallet) = wallet else {
            return Ok((Vec::new(), 0));
        };

        let paginator = WalletTransaction::find()
            .filter(wallet_transaction::Column::WalletId.eq(wallet.id))
            .order_by_desc(wallet_transaction::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((data, total))
    }
}

/// Balance law for one completed ledger entry: credits add, debits subtract
/// and must be covered by the current balance. Amounts are strictly positive.
pub fn apply_entry(
    balance: Decimal,
    tx_type: WalletTransactionType,
    amount: Decimal,
) -> Result<Decimal, ServiceError> {
    if amount <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Transaction amount must be positive".to_string(),
        ));
    }
    match tx_type {
        WalletTransactionType::Credit => Ok(balance + amount),
        WalletTransactionType::Debit if balance < amount => Err(ServiceError::PaymentFailed(
            "Insufficient wallet balance".to_string(),
        )),
        WalletTransactionType::Debit => Ok(balance - amount),
    }
}

/// Fetches or creates the user's wallet within the caller's transaction.
pub(crate) async fn get_or_create_wallet<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<wallet::Model, ServiceError> {
    if let Some(wallet) = Wallet::find()
        .filter(wallet::Column::UserId.eq(user_id))
        .one(conn)
        .await?
    {
        return Ok(wallet);
    }

    let wallet = wallet::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        balance: Set(Decimal::ZERO),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    };
    Ok(wallet.insert(conn).await?)
}

/// Credits the user's wallet: appends a completed `credit` entry and raises
/// the balance. Runs inside the caller's transaction so refunds commit (or
/// roll back) together with the order/item state change that caused them.
pub(crate) async fn credit<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    amount: Decimal,
    order_id: Option<Uuid>,
    order_item_id: Option<Uuid>,
    note: &str,
) -> Result<wallet_transaction::Model, ServiceError> {
    let wallet = get_or_create_wallet(conn, user_id).await?;
    let new_balance = apply_entry(wallet.balance, WalletTransactionType::Credit, amount)?;

    let entry = wallet_transaction::ActiveModel {
        id: Set(Uuid::new_v4()),
        wallet_id: Set(wallet.id),
        order_id: Set(order_id),
        order_item_id: Set(order_item_id),
        tx_type: Set(WalletTransactionType::Credit),
        status: Set(WalletTransactionStatus::Completed),
        amount: Set(amount),
        note: Set(Some(note.to_string())),
        created_at: Set(Utc::now()),
    };
    let entry = entry.insert(conn).await?;

    let mut wallet: wallet::ActiveModel = wallet.into();
    wallet.balance = Set(new_balance);
    wallet.updated_at = Set(Utc::now());
    wallet.update(conn).await?;

    Ok(entry)
}

/// Debits the user's wallet for a payment. Fails without appending anything
/// when the balance does not cover the amount.
pub(crate) async fn debit<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    amount: Decimal,
    order_id: Option<Uuid>,
    note: &str,
) -> Result<wallet_transaction::Model, ServiceError> {
    let wallet = get_or_create_wallet(conn, user_id).await?;
    let new_balance = apply_entry(wallet.balance, WalletTransactionType::Debit, amount)?;

    let entry = wallet_transaction::ActiveModel {
        id: Set(Uuid::new_v4()),
        wallet_id: Set(wallet.id),
        order_id: Set(order_id),
        order_item_id: Set(None),
        tx_type: Set(WalletTransactionType::Debit),
        status: Set(WalletTransactionStatus::Completed),
        amount: Set(amount),
        note: Set(Some(note.to_string())),
        created_at: Set(Utc::now()),
    };
    let entry = entry.insert(conn).await?;

    let mut wallet: wallet::ActiveModel = wallet.into();
    wallet.balance = Set(new_balance);
    wallet.updated_at = Set(Utc::now());
    wallet.update(conn).await?;

    Ok(entry)
}
