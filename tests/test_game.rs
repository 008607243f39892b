use fog_coalsim::combinatorics::subsets;
use fog_coalsim::game::{CoalitionId, CooperativeGame};

const TOL: f64 = 1e-9;

/// Superadditive 4-player game: v(S) = |S|^2.
fn quadratic_game(n: usize) -> CooperativeGame {
    let mut game = CooperativeGame::new(n);
    for mask in subsets(n) {
        let cid = CoalitionId::from_mask(mask);
        let size = cid.num_players() as f64;
        game.set_value(cid, size * size).unwrap();
    }
    game
}

#[test]
fn test_shapley_is_efficient() {
    let game = quadratic_game(4);
    let payoffs = game.shapley_value().unwrap();
    let total: f64 = payoffs.iter().sum();
    let grand = game.value(game.grand_coalition()).unwrap();
    assert!((total - grand).abs() < 1e-9);
}

#[test]
fn test_shapley_treats_symmetric_players_equally() {
    let game = quadratic_game(4);
    let payoffs = game.shapley_value().unwrap();
    for p in &payoffs {
        assert!((p - payoffs[0]).abs() < 1e-12);
    }
}

#[test]
fn test_dummy_player_gets_its_own_value() {
    // Player 2 adds exactly 5 to every coalition it joins.
    let mut game = CooperativeGame::new(3);
    for mask in subsets(3) {
        let cid = CoalitionId::from_mask(mask);
        let mut v = if cid.contains(0) && cid.contains(1) {
            10.0
        } else {
            0.0
        };
        if cid.contains(2) {
            v += 5.0;
        }
        game.set_value(cid, v).unwrap();
    }
    let payoffs = game.shapley_value().unwrap();
    assert!((payoffs[2] - 5.0).abs() < 1e-12);
    assert!((payoffs[0] - 5.0).abs() < 1e-12);
    assert!((payoffs[1] - 5.0).abs() < 1e-12);
}

#[test]
fn test_core_point_passes_the_membership_check() {
    let game = quadratic_game(4);
    let point = game.find_core(TOL).unwrap().expect("core is non-empty");
    assert!(game.belongs_to_core(&point, TOL).unwrap());
    let total: f64 = point.iter().sum();
    assert!((total - 16.0).abs() < 1e-6);
}

#[test]
fn test_unbalanced_game_has_an_empty_core() {
    // Three-player majority game.
    let mut game = CooperativeGame::new(3);
    for mask in subsets(3) {
        let cid = CoalitionId::from_mask(mask);
        let v = if cid.num_players() >= 2 { 1.0 } else { 0.0 };
        game.set_value(cid, v).unwrap();
    }
    assert!(game.find_core(TOL).unwrap().is_none());
}

#[test]
fn test_subgame_preserves_parent_values() {
    let game = quadratic_game(4);
    let cid = CoalitionId::from_members(&[1, 3]);
    let sub = game.subgame(cid).unwrap();
    assert_eq!(sub.players(), &[1, 3]);
    // {1} maps to local player 0, {1,3} to the local grand coalition.
    assert_eq!(sub.value(CoalitionId::singleton(0)), Some(1.0));
    assert_eq!(sub.value(sub.grand_coalition()), Some(4.0));

    let payoffs = sub.shapley_value().unwrap();
    assert!((payoffs[0] - 2.0).abs() < 1e-12);
    assert!((payoffs[1] - 2.0).abs() < 1e-12);
}
