//! Bracket generation tests.
//!
//! Pairing properties are checked with proptest; round progression runs
//! against an in-memory database.

mod common;

use common::Harness;
use proptest::prelude::*;
use std::collections::HashSet;
use tourney::tournament::{
    BracketOutcome, Entrant, ParticipantStatus, TournamentError, pair_entrants,
};

fn entrant_pool() -> impl Strategy<Value = Vec<Entrant>> {
    prop::collection::hash_set(1i64..10_000, 0..64)
        .prop_map(|ids| ids.into_iter().map(Entrant::User).collect())
}

proptest! {
    #[test]
    fn test_pairing_covers_every_entrant_once(pool in entrant_pool()) {
        let pairings = pair_entrants(&pool);

        prop_assert_eq!(pairings.len(), pool.len().div_ceil(2));

        let placed: Vec<Entrant> = pairings
            .iter()
            .flat_map(|p| std::iter::once(p.first).chain(p.second))
            .collect();
        prop_assert_eq!(&placed, &pool, "pairing must keep the pool order");

        let unique: HashSet<Entrant> = placed.iter().copied().collect();
        prop_assert_eq!(unique.len(), pool.len());
    }

    #[test]
    fn test_only_the_last_pairing_can_be_a_bye(pool in entrant_pool()) {
        let pairings = pair_entrants(&pool);
        let byes: Vec<usize> = pairings
            .iter()
            .enumerate()
            .filter(|(_, p)| p.second.is_none())
            .map(|(i, _)| i)
            .collect();

        if pool.len() % 2 == 1 {
            prop_assert_eq!(byes, vec![pairings.len() - 1]);
        } else {
            prop_assert!(byes.is_empty());
        }
    }
}

/// Confirm every open match of a round for its first side
async fn confirm_first_sides(h: &Harness, tournament_id: i64, round: i64) {
    for m in h.arbiter.matches_for(tournament_id, Some(round)).await.unwrap() {
        if m.is_confirmed {
            continue;
        }
        let Entrant::User(actor) = m.participant1 else {
            panic!("individual bracket expected");
        };
        h.arbiter
            .confirm_result(m.id, actor, m.participant1)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_first_round_needs_two_entrants() {
    let h = Harness::new().await;
    let t = h.individual(0).await;
    let lonely = h.user("lonely").await;
    h.enroll(&t, &[&lonely]).await;

    let result = h.manager.generate_matches(t.id).await;
    assert!(matches!(
        result,
        Err(TournamentError::NotEnoughParticipants {
            needed: 2,
            current: 1
        })
    ));
}

#[tokio::test]
async fn test_odd_pool_gets_confirmed_bye() {
    let h = Harness::new().await;
    let t = h.individual(0).await;
    let a = h.user("a").await;
    let b = h.user("b").await;
    let c = h.user("c").await;
    h.enroll(&t, &[&a, &b, &c]).await;

    let outcome = h.manager.generate_matches(t.id).await.unwrap();
    let BracketOutcome::Round {
        round,
        match_ids,
        byes,
    } = outcome
    else {
        panic!("expected a new round");
    };
    assert_eq!(round, 1);
    assert_eq!(match_ids.len(), 2);
    assert_eq!(byes, 1);

    let matches = h.arbiter.matches_for(t.id, Some(1)).await.unwrap();
    assert_eq!(matches[0].participant1, Entrant::User(a.id));
    assert_eq!(matches[0].participant2, Some(Entrant::User(b.id)));
    assert!(!matches[0].is_confirmed);

    let bye = &matches[1];
    assert!(bye.is_bye());
    assert!(bye.is_confirmed);
    assert_eq!(bye.winner, Some(Entrant::User(c.id)));
}

#[tokio::test]
async fn test_next_round_waits_for_confirmations() {
    let h = Harness::new().await;
    let t = h.individual(0).await;
    let a = h.user("a").await;
    let b = h.user("b").await;
    h.enroll(&t, &[&a, &b]).await;

    h.manager.generate_matches(t.id).await.unwrap();
    let result = h.manager.generate_matches(t.id).await;
    assert!(matches!(result, Err(TournamentError::RoundInProgress(1))));
}

#[tokio::test]
async fn test_disputed_match_blocks_progression() {
    let h = Harness::new().await;
    let t = h.individual(0).await;
    let a = h.user("a").await;
    let b = h.user("b").await;
    h.enroll(&t, &[&a, &b]).await;
    h.manager.generate_matches(t.id).await.unwrap();

    let m = h.arbiter.matches_for(t.id, Some(1)).await.unwrap().remove(0);
    h.arbiter
        .confirm_result(m.id, a.id, Entrant::User(a.id))
        .await
        .unwrap();
    h.arbiter
        .dispute_result(m.id, b.id, "opponent used an alt account")
        .await
        .unwrap();

    let result = h.manager.generate_matches(t.id).await;
    assert!(matches!(result, Err(TournamentError::RoundInProgress(1))));
}

#[tokio::test]
async fn test_bracket_runs_to_a_champion() {
    let h = Harness::new().await;
    let t = h.individual(0).await;
    let mut players = Vec::new();
    for name in ["a", "b", "c", "d", "e"] {
        players.push(h.user(name).await);
    }
    let refs: Vec<&_> = players.iter().collect();
    h.enroll(&t, &refs).await;

    // 5 entrants: a-b, c-d, e bye
    h.manager.generate_matches(t.id).await.unwrap();
    confirm_first_sides(&h, t.id, 1).await;

    // Winners a, c, e: a-c, e bye
    let second = h.manager.generate_matches(t.id).await.unwrap();
    assert!(matches!(second, BracketOutcome::Round { round: 2, byes: 1, .. }));
    confirm_first_sides(&h, t.id, 2).await;

    // Winners a, e: a-e
    let third = h.manager.generate_matches(t.id).await.unwrap();
    assert!(matches!(third, BracketOutcome::Round { round: 3, byes: 0, .. }));
    confirm_first_sides(&h, t.id, 3).await;

    let champion = Entrant::User(players[0].id);
    let done = h.manager.generate_matches(t.id).await.unwrap();
    assert_eq!(done, BracketOutcome::Complete { champion });

    // Further calls report the same outcome
    let again = h.manager.generate_matches(t.id).await.unwrap();
    assert_eq!(again, BracketOutcome::Complete { champion });

    let tournament = h.manager.get_tournament(t.id).await.unwrap();
    assert!(tournament.is_complete());
    assert_eq!(tournament.champion, Some(champion));

    let statuses: Vec<ParticipantStatus> = h
        .manager
        .participants(t.id)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            ParticipantStatus::Registered,
            ParticipantStatus::Eliminated,
            ParticipantStatus::Eliminated,
            ParticipantStatus::Eliminated,
            ParticipantStatus::Eliminated,
        ],
        "every loser is eliminated and the champion keeps their status"
    );
}

#[tokio::test]
async fn test_eliminated_participants_are_not_paired() {
    let h = Harness::new().await;
    let t = h.individual(0).await;
    let a = h.user("a").await;
    let b = h.user("b").await;
    let c = h.user("c").await;
    h.enroll(&t, &[&a, &b, &c]).await;
    h.manager.eliminate(t.id, b.id).await.unwrap();

    h.manager.generate_matches(t.id).await.unwrap();
    let matches = h.arbiter.matches_for(t.id, Some(1)).await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].participant1, Entrant::User(a.id));
    assert_eq!(matches[0].participant2, Some(Entrant::User(c.id)));
}

#[tokio::test]
async fn test_team_bracket_pairs_teams() {
    let h = Harness::new().await;
    let t = h.team_tournament(0).await;
    let first = h.user("first").await;
    let second = h.user("second").await;
    let rooks = h.team("Rooks", &first, &[]).await;
    let knights = h.team("Knights", &second, &[]).await;
    h.manager
        .join(t.id, first.id, Some(rooks.id), None)
        .await
        .unwrap();
    h.manager
        .join(t.id, second.id, Some(knights.id), None)
        .await
        .unwrap();

    h.manager.generate_matches(t.id).await.unwrap();
    let m = h.arbiter.matches_for(t.id, None).await.unwrap().remove(0);
    assert_eq!(m.participant1, Entrant::Team(rooks.id));
    assert_eq!(m.participant2, Some(Entrant::Team(knights.id)));

    h.arbiter
        .confirm_result(m.id, second.id, Entrant::Team(knights.id))
        .await
        .unwrap();
    let done = h.manager.generate_matches(t.id).await.unwrap();
    assert_eq!(
        done,
        BracketOutcome::Complete {
            champion: Entrant::Team(knights.id)
        }
    );
}
