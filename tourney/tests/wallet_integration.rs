//! Ledger trail left by enrollment and settlement.

mod common;

use common::Harness;
use tourney::wallet::{EntryDirection, EntryType, WalletError};

#[tokio::test]
async fn test_wallet_exists_after_first_credit() {
    let h = Harness::new().await;
    let player = h.user("player").await;
    let wallet = h.manager.wallet();

    assert!(matches!(
        wallet.get_wallet(player.id).await,
        Err(WalletError::WalletNotFound(id)) if id == player.id
    ));

    h.fund(player.id, 250).await;
    let opened = wallet.get_wallet(player.id).await.unwrap();
    assert_eq!(opened.user_id, player.id);
    assert_eq!(opened.balance, 250);
}

#[tokio::test]
async fn test_entries_record_fee_and_refund() {
    let h = Harness::new().await;
    let t = h.individual(40).await;
    let player = h.user("player").await;
    h.fund(player.id, 100).await;
    h.enroll(&t, &[&player]).await;
    h.settlement.refund_entry_fees(t.id, player.id).await.unwrap();

    let entries = h.manager.wallet().get_entries(player.id, 10).await.unwrap();
    let trail: Vec<_> = entries
        .iter()
        .map(|e| (e.entry_type, e.direction, e.amount, e.balance_after))
        .collect();
    assert_eq!(
        trail,
        vec![
            (EntryType::Refund, EntryDirection::Credit, 40, 100),
            (EntryType::EntryFee, EntryDirection::Debit, -40, 60),
            (EntryType::Deposit, EntryDirection::Credit, 100, 100),
        ],
        "newest first"
    );
    assert_eq!(entries[1].tournament_id, Some(t.id));
    assert_eq!(entries[1].idempotency_key, format!("entry_fee:{}:{}", t.id, player.id));

    let latest = h.manager.wallet().get_entries(player.id, 1).await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].entry_type, EntryType::Refund);
}
