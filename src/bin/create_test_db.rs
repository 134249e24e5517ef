use std::error::Error;
use std::path::Path;
use std::process::exit;

use clap::Parser;
use rusqlite::Connection;
use time::Duration;

use budget_ledger::{
    AccountType, Frequency, NewAccount, NewBudget, NewSubscription, NewTransfer, PassScope,
    ReconcileScheduler, SystemClock, Transaction, TransactionStatus, TransactionType,
    create_account, create_budget, create_category, create_subscription, create_transaction,
    create_transfer, create_user, initialize_db, local_noon, local_now, resolve_timezone,
    run_pass,
};

/// A utility for creating a populated test database.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,

    /// The IANA timezone of the test user.
    #[arg(long, default_value = "Pacific/Auckland")]
    timezone: String,
}

/// Ignores requests, everything is reconciled once the data is in place.
struct SweepAtEnd;

impl ReconcileScheduler for SweepAtEnd {
    fn schedule(&self, _scope: PassScope) {}
}

/// Create and populate a database for manual testing.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let output_path = Path::new(&args.output_path);

    match output_path.extension() {
        None => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        _ => {}
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let conn = Connection::open(output_path)?;

    initialize_db(&conn)?;

    println!("Creating test user...");
    let user = create_user(Some(&args.timezone), &conn)?;
    let tz = resolve_timezone(&user)?;
    let today = local_now(&SystemClock, tz).date();

    println!("Creating accounts and categories...");
    let checking = create_account(
        NewAccount {
            user_id: user.id,
            name: "Everyday".to_owned(),
            kind: AccountType::Checking,
            credit_limit: None,
        },
        &conn,
    )?;
    let savings = create_account(
        NewAccount {
            user_id: user.id,
            name: "Rainy Day".to_owned(),
            kind: AccountType::Savings,
            credit_limit: None,
        },
        &conn,
    )?;
    let salary = create_category(user.id, "Salary", "", &conn)?;
    let groceries = create_category(user.id, "Groceries", "Food and household", &conn)?;
    let phone = create_category(user.id, "Phone", "", &conn)?;
    let transfers = create_category(user.id, "Transfers", "", &conn)?;

    println!("Creating transactions...");
    let entries = [
        (salary.id, 2500.0, TransactionType::Income, 20, TransactionStatus::Cleared),
        (groceries.id, 84.2, TransactionType::Expense, 12, TransactionStatus::Cleared),
        (groceries.id, 12.5, TransactionType::Expense, 3, TransactionStatus::Cleared),
        (groceries.id, 47.0, TransactionType::Expense, 0, TransactionStatus::Pending),
        (groceries.id, 30.0, TransactionType::Expense, 1, TransactionStatus::Cancelled),
        (salary.id, 2500.0, TransactionType::Income, -5, TransactionStatus::Pending),
    ];

    for (category_id, amount, kind, days_ago, status) in entries {
        create_transaction(
            Transaction::build(
                user.id,
                checking.id,
                category_id,
                amount,
                kind,
                local_noon(today - Duration::days(days_ago), tz),
            )
            .status(status),
            &conn,
        )?;
    }

    create_budget(
        NewBudget {
            user_id: user.id,
            category_id: groceries.id,
            description: "Weekly shop".to_owned(),
            goal: 600.0,
            start_date: None,
            end_date: None,
        },
        &conn,
    )?;

    println!("Creating subscription and transfer...");
    create_subscription(
        NewSubscription {
            user_id: user.id,
            account_id: checking.id,
            category_id: phone.id,
            description: "Phone plan".to_owned(),
            amount: 39.99,
            frequency: Frequency::Monthly,
            start_date: local_noon(today - Duration::days(90), tz),
            end_date: None,
        },
        &conn,
    )?;

    create_transfer(
        NewTransfer {
            user_id: user.id,
            from_account_id: checking.id,
            to_account_id: savings.id,
            category_id: transfers.id,
            amount: 200.0,
            date: today - Duration::days(2),
            description: "Saving up".to_owned(),
            status: TransactionStatus::Cleared,
        },
        &conn,
        &SweepAtEnd,
    )?;

    println!("Reconciling...");
    let report = run_pass(PassScope::All, &conn, &SystemClock);

    if !report.is_success() {
        eprintln!("Reconciliation failed: {:#?}", report.failures);
        exit(1);
    }

    println!("Created {} subscription entries.", report.materialized);
    println!("Success!");

    Ok(())
}
