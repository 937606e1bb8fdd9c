//! Swap settlement against a real ledger: the two-step flip-then-
//! withdraw flow, the no-partial-fill rule, and the write-conflict
//! backstop against settling the same pair twice in one transaction.

use tandem_contracts::error::EscrowError;
use tandem_contracts::swap::{SwapEscrow, SwapPhase};
use tandem_protocol::crypto::Keypair;
use tandem_protocol::ledger::{
    AccountId, AccountUpdate, Ledger, LedgerError, Receipt, SignedTransaction, TokenId,
    Transaction,
};
use tandem_protocol::tokens::FungibleToken;

const FEE: u64 = 1_000;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

struct Pair {
    ledger: Ledger,
    payer: Keypair,
    alice: Keypair,
    alice_id: AccountId,
    bob: Keypair,
    bob_id: AccountId,
    token_a: FungibleToken,
    token_b: FungibleToken,
    swap_a: SwapEscrow,
    swap_b: SwapEscrow,
}

fn keyed() -> (Keypair, AccountId) {
    let kp = Keypair::generate();
    let id = AccountId::from_public_key(&kp.public_key());
    (kp, id)
}

fn apply(
    ledger: &mut Ledger,
    payer: &Keypair,
    updates: Vec<AccountUpdate>,
    signers: &[&Keypair],
) -> Result<Receipt, LedgerError> {
    let payer_id = AccountId::from_public_key(&payer.public_key());
    let mut builder = Transaction::builder(payer_id)
        .fee(FEE)
        .nonce(ledger.account_nonce(&payer_id));
    for update in updates {
        builder = builder.update(update);
    }
    let mut signed = SignedTransaction::new(builder.build()).sign(payer);
    for kp in signers {
        signed = signed.sign(kp);
    }
    ledger.apply_transaction(&signed)
}

/// Two token families, two swap instances, 500 units minted to each
/// trader in their own family.
fn pair() -> Pair {
    let mut ledger = Ledger::new();
    let (payer, payer_id) = keyed();
    let (alice, alice_id) = keyed();
    let (bob, bob_id) = keyed();
    let (_, owner_a) = keyed();
    let (_, owner_b) = keyed();
    let (_, account_a) = keyed();
    let (_, account_b) = keyed();

    ledger.fund(payer_id, TokenId::NATIVE, 1_000_000);
    ledger.register_token(owner_a);
    ledger.register_token(owner_b);
    let token_a = FungibleToken::new(owner_a);
    let token_b = FungibleToken::new(owner_b);

    apply(&mut ledger, &payer, vec![token_a.mint(alice_id, 500)], &[]).unwrap();
    apply(&mut ledger, &payer, vec![token_b.mint(bob_id, 500)], &[]).unwrap();

    Pair {
        ledger,
        payer,
        alice,
        alice_id,
        bob,
        bob_id,
        token_a,
        token_b,
        swap_a: SwapEscrow::new(account_a, token_a),
        swap_b: SwapEscrow::new(account_b, token_b),
    }
}

/// Offer `amount_a` on Alice's side and `amount_b` on Bob's, each
/// wanting the other's family.
fn offer_both(m: &mut Pair, amount_a: u64, amount_b: u64) {
    let open_a = m
        .swap_a
        .offer(&m.ledger, m.alice_id, amount_a, m.token_b.token_id())
        .unwrap();
    apply(&mut m.ledger, &m.payer, open_a, &[&m.alice]).unwrap();

    let open_b = m
        .swap_b
        .offer(&m.ledger, m.bob_id, amount_b, m.token_a.token_id())
        .unwrap();
    apply(&mut m.ledger, &m.payer, open_b, &[&m.bob]).unwrap();
}

// ---------------------------------------------------------------------------
// Two-Step Settlement
// ---------------------------------------------------------------------------

#[test]
fn full_swap_round_trip() {
    let mut m = pair();
    offer_both(&mut m, 100, 100);
    let (tok_a, tok_b) = (m.token_a.token_id(), m.token_b.token_id());

    // 1. Settle: ownership flips, nothing moves, nobody signs.
    let records = m.swap_a.settle(&m.ledger, &m.swap_b).unwrap();
    apply(&mut m.ledger, &m.payer, records, &[]).unwrap();

    let rec_a = m.swap_a.record(&m.ledger).unwrap();
    let rec_b = m.swap_b.record(&m.ledger).unwrap();
    assert_eq!(rec_a.phase, SwapPhase::Settled);
    assert_eq!(rec_b.phase, SwapPhase::Settled);
    assert_eq!(rec_a.owner, m.bob_id);
    assert_eq!(rec_b.owner, m.alice_id);
    assert_eq!(m.ledger.balance(&m.swap_a.account(), &tok_a), 100);
    assert_eq!(m.ledger.balance(&m.swap_b.account(), &tok_b), 100);

    // 2. Each side withdraws what it now owns, separately.
    let withdraw_a = m.swap_a.withdraw(&m.ledger).unwrap();
    apply(&mut m.ledger, &m.payer, withdraw_a, &[]).unwrap();
    assert_eq!(m.ledger.balance(&m.bob_id, &tok_a), 100);
    assert_eq!(m.swap_a.record(&m.ledger).unwrap().phase, SwapPhase::Open);

    let withdraw_b = m.swap_b.withdraw(&m.ledger).unwrap();
    apply(&mut m.ledger, &m.payer, withdraw_b, &[]).unwrap();
    assert_eq!(m.ledger.balance(&m.alice_id, &tok_b), 100);
    assert_eq!(m.ledger.balance(&m.swap_b.account(), &tok_b), 0);

    // 3. Both instances are reusable.
    assert!(m.swap_b.record(&m.ledger).unwrap().owner.is_empty());
}

#[test]
fn withdraw_before_settlement_is_refused() {
    let mut m = pair();
    offer_both(&mut m, 100, 100);

    match m.swap_a.withdraw(&m.ledger) {
        Err(EscrowError::StateGuard {
            current, expected, ..
        }) => {
            assert_eq!(current, "Offered");
            assert_eq!(expected, "Settled");
        }
        other => panic!("expected StateGuard, got {other:?}"),
    }
    // The deposit never moved.
    assert_eq!(
        m.ledger.balance(&m.swap_a.account(), &m.token_a.token_id()),
        100
    );
}

// ---------------------------------------------------------------------------
// No Partial Fills
// ---------------------------------------------------------------------------

#[test]
fn unequal_amounts_refuse_to_settle() {
    let mut m = pair();
    offer_both(&mut m, 100, 90);

    match m.swap_a.settle(&m.ledger, &m.swap_b) {
        Err(EscrowError::TermMismatch {
            field: "amount",
            ours: 90,
            theirs: 100,
        }) => {}
        other => panic!("expected amount mismatch, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Replay and Double-Settle
// ---------------------------------------------------------------------------

#[test]
fn replayed_settlement_is_rejected() {
    let mut m = pair();
    offer_both(&mut m, 100, 100);

    let records = m.swap_a.settle(&m.ledger, &m.swap_b).unwrap();
    apply(&mut m.ledger, &m.payer, records.clone(), &[]).unwrap();

    // Same records, fresh transaction: every pinned phase word has
    // moved on.
    match apply(&mut m.ledger, &m.payer, records, &[]) {
        Err(LedgerError::PreconditionMismatch { .. }) => {}
        other => panic!("expected PreconditionMismatch, got {other:?}"),
    }
    assert_eq!(m.swap_a.record(&m.ledger).unwrap().owner, m.bob_id);
}

#[test]
fn settling_both_directions_in_one_transaction_conflicts() {
    let mut m = pair();
    offer_both(&mut m, 100, 100);

    // Each direction's tree writes both escrows' records.
    let mut updates = m.swap_a.settle(&m.ledger, &m.swap_b).unwrap();
    updates.extend(m.swap_b.settle(&m.ledger, &m.swap_a).unwrap());

    match apply(&mut m.ledger, &m.payer, updates, &[]) {
        Err(LedgerError::WriteConflict { .. }) => {}
        other => panic!("expected WriteConflict, got {other:?}"),
    }

    // Neither escrow settled.
    assert_eq!(m.swap_a.record(&m.ledger).unwrap().phase, SwapPhase::Offered);
    assert_eq!(m.swap_b.record(&m.ledger).unwrap().phase, SwapPhase::Offered);
}
