//! Database ID type definitions.

/// Alias for the integer type used for account IDs.
pub type AccountId = i64;
/// Alias for the integer type used for category IDs.
pub type CategoryId = i64;
/// Alias for the integer type used for transaction (ledger entry) IDs.
pub type TransactionId = i64;
/// Alias for the integer type used for budget IDs.
pub type BudgetId = i64;
/// Alias for the integer type used for subscription IDs.
pub type SubscriptionId = i64;
/// Alias for the integer type used for transfer IDs.
pub type TransferId = i64;
