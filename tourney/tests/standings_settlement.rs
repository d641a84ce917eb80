//! Standings, prize payouts, refunds and winner submission review.

mod common;

use common::Harness;
use tourney::settlement::{SettlementKind, SubmissionStatus};
use tourney::tournament::{Tournament, TournamentError};
use tourney::users::User;

/// Paid individual tournament with funded, enrolled players scored in order
async fn scored_tournament(h: &Harness, fee: i64, scores: &[i64]) -> (Tournament, Vec<User>, User) {
    let t = h.individual(fee).await;
    let staff = h.staff("scorekeeper").await;
    let mut players = Vec::with_capacity(scores.len());
    for (i, score) in scores.iter().enumerate() {
        let player = h.user(&format!("player{i}")).await;
        h.fund(player.id, fee).await;
        h.manager.join(t.id, player.id, None, None).await.unwrap();
        h.manager
            .set_score(t.id, staff.id, player.id, *score)
            .await
            .unwrap();
        players.push(player);
    }
    (t, players, staff)
}

#[tokio::test]
async fn test_ties_go_to_earlier_enrollment() {
    let h = Harness::new().await;
    let (t, players, _staff) = scored_tournament(&h, 10, &[50, 80, 80]).await;

    let winners = h.manager.get_tournament_winners(t.id).await.unwrap();
    let order: Vec<_> = winners.iter().map(|s| (s.rank, s.user_id)).collect();
    assert_eq!(
        order,
        vec![(1, players[1].id), (2, players[2].id), (3, players[0].id)]
    );
}

#[tokio::test]
async fn test_winners_capped_at_top_five() {
    let h = Harness::new().await;
    let (t, players, _staff) = scored_tournament(&h, 10, &[1, 2, 3, 4, 5, 6, 7]).await;

    let winners = h.manager.get_tournament_winners(t.id).await.unwrap();
    assert_eq!(winners.len(), 5);
    assert_eq!(winners[0].user_id, players[6].id);
    assert_eq!(winners[4].user_id, players[2].id);

    assert_eq!(h.manager.scores(t.id).await.unwrap().len(), 7);
}

#[tokio::test]
async fn test_only_staff_record_scores() {
    let h = Harness::new().await;
    let (t, players, _staff) = scored_tournament(&h, 10, &[1]).await;

    let result = h.manager.set_score(t.id, players[0].id, players[0].id, 99).await;
    assert!(matches!(result, Err(TournamentError::PermissionDenied(_))));
}

#[tokio::test]
async fn test_prize_is_paid_exactly_once() {
    let h = Harness::new().await;
    let (t, players, _staff) = scored_tournament(&h, 100, &[30, 20, 10]).await;
    let champion = &players[0];

    // 3 paying entries: winner takes the whole 300 pool
    let settlement = h.settlement.pay_prize(t.id, champion.id).await.unwrap();
    assert_eq!(settlement.kind, SettlementKind::Prize);
    assert_eq!(settlement.amount, 300);
    assert_eq!(h.balance(champion.id).await, 300);

    let again = h.settlement.pay_prize(t.id, champion.id).await;
    assert!(matches!(again, Err(TournamentError::AlreadySettled { .. })));
    assert_eq!(h.balance(champion.id).await, 300, "second payout must not credit");

    assert_eq!(h.settlement.total_prize_money().await.unwrap(), 300);
}

#[tokio::test]
async fn test_rank_without_payout_records_zero_marker() {
    let h = Harness::new().await;
    let (t, players, _staff) = scored_tournament(&h, 100, &[30, 20, 10]).await;

    let runner_up = h.settlement.pay_prize(t.id, players[1].id).await.unwrap();
    assert_eq!(runner_up.amount, 0);
    assert_eq!(h.balance(players[1].id).await, 0);

    let markers = h.settlement.settlements(t.id).await.unwrap();
    assert_eq!(markers.len(), 1);
    assert_eq!(h.settlement.total_prize_money().await.unwrap(), 0);
}

#[tokio::test]
async fn test_fixed_prize_table_is_used() {
    let h = Harness::new().await;
    let game = h.game().await;
    let start = chrono::Utc::now() + chrono::Duration::days(1);
    let t = h
        .tournament(
            tourney::tournament::NewTournament::individual(
                "Sponsored",
                game.id,
                start,
                start + chrono::Duration::hours(2),
            )
            .with_prizes(vec![1_000, 400]),
        )
        .await;
    let staff = h.staff("scorekeeper").await;
    let a = h.user("a").await;
    let b = h.user("b").await;
    h.enroll(&t, &[&a, &b]).await;
    h.manager.set_score(t.id, staff.id, a.id, 5).await.unwrap();
    h.manager.set_score(t.id, staff.id, b.id, 9).await.unwrap();

    h.settlement.pay_prize(t.id, b.id).await.unwrap();
    h.settlement.pay_prize(t.id, a.id).await.unwrap();

    assert_eq!(h.balance(b.id).await, 1_000);
    assert_eq!(h.balance(a.id).await, 400);
}

#[tokio::test]
async fn test_prize_requires_top_rank() {
    let h = Harness::new().await;
    let (t, players, _staff) = scored_tournament(&h, 10, &[1, 2, 3, 4, 5, 6]).await;

    let result = h.settlement.pay_prize(t.id, players[0].id).await;
    assert!(matches!(result, Err(TournamentError::PermissionDenied(_))));
}

#[tokio::test]
async fn test_refund_returns_fee_once() {
    let h = Harness::new().await;
    let (t, players, _staff) = scored_tournament(&h, 75, &[1]).await;
    let player = &players[0];
    assert_eq!(h.balance(player.id).await, 0);

    let refund = h.settlement.refund_entry_fees(t.id, player.id).await.unwrap();
    assert_eq!(refund.kind, SettlementKind::Refund);
    assert_eq!(refund.user_id, player.id);
    assert_eq!(refund.amount, 75);
    assert_eq!(h.balance(player.id).await, 75);

    assert!(matches!(
        h.settlement.refund_entry_fees(t.id, player.id).await,
        Err(TournamentError::AlreadySettled { .. })
    ));
    assert_eq!(h.balance(player.id).await, 75);

    let stranger = h.user("stranger").await;
    assert!(matches!(
        h.settlement.refund_entry_fees(t.id, stranger.id).await,
        Err(TournamentError::PermissionDenied(_))
    ));
}

#[tokio::test]
async fn test_team_refund_goes_to_paying_captain() {
    let h = Harness::new().await;
    let t = h.team_tournament(50).await;
    let captain = h.user("captain").await;
    let m1 = h.user("m1").await;
    let m2 = h.user("m2").await;
    let team = h.team("Rooks", &captain, &[&m1, &m2]).await;
    h.fund(captain.id, 50).await;
    h.manager
        .join(t.id, captain.id, Some(team.id), Some(&[m1.id, m2.id]))
        .await
        .unwrap();
    assert_eq!(h.balance(captain.id).await, 0);

    let refund = h.settlement.refund_entry_fees(t.id, m1.id).await.unwrap();
    assert_eq!(refund.user_id, captain.id);
    assert_eq!(refund.amount, 50);
    assert_eq!(h.balance(captain.id).await, 50);
    assert_eq!(h.balance(m1.id).await, 0);

    // One fee was paid, so the team is refunded once
    assert!(matches!(
        h.settlement.refund_entry_fees(t.id, m2.id).await,
        Err(TournamentError::AlreadySettled { user_id, .. }) if user_id == captain.id
    ));
}

#[tokio::test]
async fn test_submission_requires_top_rank_and_video() {
    let h = Harness::new().await;
    let (t, players, _staff) = scored_tournament(&h, 10, &[1, 2, 3, 4, 5, 6]).await;

    assert!(matches!(
        h.settlement.submit_winner(t.id, players[5].id, " ").await,
        Err(TournamentError::Validation(_))
    ));
    assert!(matches!(
        h.settlement
            .submit_winner(t.id, players[0].id, "videos/run.mp4")
            .await,
        Err(TournamentError::PermissionDenied(_))
    ));

    let submission = h
        .settlement
        .submit_winner(t.id, players[5].id, "videos/run.mp4")
        .await
        .unwrap();
    assert_eq!(submission.status, SubmissionStatus::Pending);
    assert_eq!(submission.winner_id, players[5].id);
}

#[tokio::test]
async fn test_approval_pays_prize_in_same_review() {
    let h = Harness::new().await;
    let (t, players, staff) = scored_tournament(&h, 100, &[50, 40]).await;
    let champion = &players[0];

    let submission = h
        .settlement
        .submit_winner(t.id, champion.id, "videos/final.mp4")
        .await
        .unwrap();

    assert!(matches!(
        h.settlement.approve(submission.id, champion.id).await,
        Err(TournamentError::PermissionDenied(_))
    ));

    let review = h.settlement.approve(submission.id, staff.id).await.unwrap();
    assert_eq!(review.submission.status, SubmissionStatus::Approved);
    assert_eq!(review.submission.decided_by, Some(staff.id));
    assert_eq!(review.settlement.kind, SettlementKind::Prize);
    assert_eq!(review.settlement.amount, 200);
    assert_eq!(review.settlement.submission_id, Some(submission.id));
    assert_eq!(h.balance(champion.id).await, 200);

    assert!(matches!(
        h.settlement.approve(submission.id, staff.id).await,
        Err(TournamentError::InvalidSubmissionState { .. })
    ));
    assert!(matches!(
        h.settlement.reject(submission.id, staff.id).await,
        Err(TournamentError::InvalidSubmissionState { .. })
    ));
    assert_eq!(h.balance(champion.id).await, 200, "no second credit");
}

#[tokio::test]
async fn test_rejection_refunds_entry_fee() {
    let h = Harness::new().await;
    let (t, players, staff) = scored_tournament(&h, 100, &[50, 40]).await;
    let claimant = &players[1];

    let submission = h
        .settlement
        .submit_winner(t.id, claimant.id, "videos/claim.mp4")
        .await
        .unwrap();
    let review = h.settlement.reject(submission.id, staff.id).await.unwrap();

    assert_eq!(review.submission.status, SubmissionStatus::Rejected);
    assert_eq!(review.settlement.kind, SettlementKind::Refund);
    assert_eq!(review.settlement.amount, 100);
    assert_eq!(h.balance(claimant.id).await, 100);
}

#[tokio::test]
async fn test_failed_settlement_leaves_submission_pending() {
    let h = Harness::new().await;
    let (t, players, staff) = scored_tournament(&h, 100, &[50, 40]).await;
    let champion = &players[0];

    let submission = h
        .settlement
        .submit_winner(t.id, champion.id, "videos/final.mp4")
        .await
        .unwrap();
    h.settlement.pay_prize(t.id, champion.id).await.unwrap();

    let result = h.settlement.approve(submission.id, staff.id).await;
    assert!(matches!(result, Err(TournamentError::AlreadySettled { .. })));

    let mine = h.settlement.submissions_for(champion.id).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(
        mine[0].status,
        SubmissionStatus::Pending,
        "review and payout commit together"
    );
    assert_eq!(h.balance(champion.id).await, 200);
}

#[tokio::test]
async fn test_one_submission_per_winner() {
    let h = Harness::new().await;
    let (t, players, staff) = scored_tournament(&h, 100, &[50, 40]).await;
    let champion = &players[0];

    let first = h
        .settlement
        .submit_winner(t.id, champion.id, "videos/final.mp4")
        .await
        .unwrap();
    assert!(matches!(
        h.settlement
            .submit_winner(t.id, champion.id, "videos/again.mp4")
            .await,
        Err(TournamentError::SubmissionExists { user_id, .. }) if user_id == champion.id
    ));

    h.settlement.approve(first.id, staff.id).await.unwrap();
    assert_eq!(h.balance(champion.id).await, 200);

    // A prized entry cannot also be refunded
    assert!(matches!(
        h.settlement.refund_entry_fees(t.id, champion.id).await,
        Err(TournamentError::AlreadySettled { kind, .. }) if kind == "prize"
    ));
    assert_eq!(h.balance(champion.id).await, 200, "prize only");
}

#[tokio::test]
async fn test_refunded_entry_collects_no_prize() {
    let h = Harness::new().await;
    let (t, players, staff) = scored_tournament(&h, 100, &[50, 40]).await;
    let champion = &players[0];

    let submission = h
        .settlement
        .submit_winner(t.id, champion.id, "videos/final.mp4")
        .await
        .unwrap();
    h.settlement.refund_entry_fees(t.id, champion.id).await.unwrap();
    assert_eq!(h.balance(champion.id).await, 100);

    assert!(matches!(
        h.settlement.pay_prize(t.id, champion.id).await,
        Err(TournamentError::AlreadySettled { kind, .. }) if kind == "refund"
    ));
    assert!(matches!(
        h.settlement.approve(submission.id, staff.id).await,
        Err(TournamentError::AlreadySettled { kind, .. }) if kind == "refund"
    ));

    // Rejection closes against the refund already made
    let review = h.settlement.reject(submission.id, staff.id).await.unwrap();
    assert_eq!(review.submission.status, SubmissionStatus::Rejected);
    assert_eq!(review.settlement.kind, SettlementKind::Refund);
    assert_eq!(h.balance(champion.id).await, 100, "no second refund");
}

#[tokio::test]
async fn test_team_rejections_share_one_refund() {
    let h = Harness::new().await;
    let t = h.team_tournament(50).await;
    let staff = h.staff("judge").await;
    let captain = h.user("captain").await;
    let m1 = h.user("m1").await;
    let m2 = h.user("m2").await;
    let team = h.team("Rooks", &captain, &[&m1, &m2]).await;
    h.fund(captain.id, 50).await;
    h.manager
        .join(t.id, captain.id, Some(team.id), Some(&[m1.id, m2.id]))
        .await
        .unwrap();
    for (member, score) in [(&m1, 30), (&m2, 20)] {
        h.manager.set_score(t.id, staff.id, member.id, score).await.unwrap();
    }

    let first = h
        .settlement
        .submit_winner(t.id, m1.id, "videos/m1.mp4")
        .await
        .unwrap();
    let second = h
        .settlement
        .submit_winner(t.id, m2.id, "videos/m2.mp4")
        .await
        .unwrap();

    let refunded = h.settlement.reject(first.id, staff.id).await.unwrap();
    assert_eq!(refunded.settlement.user_id, captain.id);
    assert_eq!(refunded.settlement.amount, 50);

    let closed = h.settlement.reject(second.id, staff.id).await.unwrap();
    assert_eq!(closed.submission.status, SubmissionStatus::Rejected);
    assert_eq!(closed.settlement.id, refunded.settlement.id);
    assert_eq!(h.balance(captain.id).await, 50, "team refunded once");

    let pending: Vec<_> = h
        .settlement
        .submissions_for(staff.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|s| s.status == SubmissionStatus::Pending)
        .collect();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn test_submissions_visibility() {
    let h = Harness::new().await;
    let (t, players, staff) = scored_tournament(&h, 10, &[50, 40]).await;

    for player in &players {
        h.settlement
            .submit_winner(t.id, player.id, "videos/clip.mp4")
            .await
            .unwrap();
    }

    assert_eq!(h.settlement.submissions_for(players[0].id).await.unwrap().len(), 1);
    assert_eq!(h.settlement.submissions_for(staff.id).await.unwrap().len(), 2);
}
